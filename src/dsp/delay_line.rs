//! # Delay Line (Ring Buffer with Independent Read Cursor)
//!
//! A circular buffer that stores past samples and hands them back after a
//! fractional delay. Unlike a plain single-head ring buffer, this one keeps
//! two cursors:
//!
//! - the **write cursor**, advanced by every [`DelayLine::push`], and
//! - the **read cursor**, advanced only when a [`DelayLine::pop`] asks for it.
//!
//! This lets several taps read the same line within one sample period. The
//! first taps pass `advance = false`, the last one passes `advance = true`,
//! so the read cursor moves exactly once per sample no matter how many taps
//! there are. As long as the caller does one push and one advancing pop per
//! sample period the two cursors stay in lockstep.
//!
//! ## Read Position
//!
//! A tap at `delay` samples reads `read_pos - delay` (wrapped). With the
//! cursors in lockstep that is the sample pushed `delay` periods ago,
//! whether the tap is read before or after this period's push:
//!
//! ```text
//!   push then pop(0)  -> the sample just written
//!   pop(d) then push  -> the sample written d periods earlier
//! ```
//!
//! ## Linear Interpolation
//!
//! Fractional delays blend the two neighbouring slots:
//!
//! ```text
//! result = newer * (1 - frac) + older * frac
//! ```

/// A fixed-capacity delay line.
///
/// The buffer is allocated once in [`DelayLine::new`] (called from the
/// processor's `prepare`), so nothing here allocates on the audio thread.
pub struct DelayLine {
    /// The circular buffer. All slots start at 0.0 (silence).
    buffer: Vec<f32>,

    /// Where the next pushed sample lands.
    write_pos: usize,

    /// The "now" position taps are measured back from.
    read_pos: usize,

    /// Delay used by [`DelayLine::pop_default`], set with
    /// [`DelayLine::set_delay`].
    delay: f32,

    /// Cached buffer length.
    capacity: usize,
}

impl DelayLine {
    /// Create a silent delay line holding `capacity` samples.
    ///
    /// The longest usable delay is `capacity - 1` samples.
    pub fn new(capacity: std::num::NonZeroUsize) -> Self {
        let capacity = capacity.get();
        Self {
            buffer: vec![0.0; capacity],
            write_pos: 0,
            read_pos: 0,
            delay: 0.0,
            capacity,
        }
    }

    /// Largest delay a tap may ask for, in samples.
    pub fn max_delay(&self) -> f32 {
        (self.capacity - 1) as f32
    }

    /// Write `sample` at the write cursor and advance it by one.
    ///
    /// Once the line is full this overwrites the oldest sample, which is
    /// the normal steady state for a ring buffer.
    pub fn push(&mut self, sample: f32) {
        self.buffer[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.capacity;
    }

    /// Read one tap `delay_samples` behind the read cursor.
    ///
    /// The delay is clamped to `[0, capacity - 1]`, so no value can index
    /// outside the buffer. When `advance` is true the read cursor moves one
    /// sample forward after the read.
    pub fn pop(&mut self, delay_samples: f32, advance: bool) -> f32 {
        let sample = self.tap(delay_samples);
        if advance {
            self.read_pos = (self.read_pos + 1) % self.capacity;
        }
        sample
    }

    /// [`DelayLine::pop`] using the delay stored by [`DelayLine::set_delay`].
    pub fn pop_default(&mut self, advance: bool) -> f32 {
        self.pop(self.delay, advance)
    }

    /// Store a default tap delay, clamped to `[0, capacity - 1]`.
    pub fn set_delay(&mut self, delay_samples: f32) {
        self.delay = self.clamp_delay(delay_samples);
    }

    /// Zero the buffer and rewind both cursors.
    ///
    /// Called on stream (re)start so stale echoes from the last session
    /// never bleed into the next one.
    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
        self.read_pos = 0;
    }

    fn clamp_delay(&self, delay_samples: f32) -> f32 {
        // NaN would survive `clamp`, so map it to the shortest delay.
        if delay_samples.is_nan() {
            return 0.0;
        }
        delay_samples.clamp(0.0, self.max_delay())
    }

    fn tap(&self, delay_samples: f32) -> f32 {
        let delay = self.clamp_delay(delay_samples);

        // For 441.3: slots 441 and 442 back, weighted 0.7 / 0.3.
        let delay_int = delay as usize;
        let delay_frac = delay - delay_int as f32;

        let index_a = (self.read_pos + self.capacity - delay_int) % self.capacity;
        let index_b = (index_a + self.capacity - 1) % self.capacity;

        let newer = self.buffer[index_a];
        if delay_frac == 0.0 {
            return newer;
        }
        let older = self.buffer[index_b];
        newer * (1.0 - delay_frac) + older * delay_frac
    }
}
