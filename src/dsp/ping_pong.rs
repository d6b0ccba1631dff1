//! # Ping-Pong Delay Core
//!
//! Two delay lines, one per channel, each read by two taps per sample:
//!
//! ```text
//!              primary tap   secondary tap
//! left line    delay         delay × 0.79
//! right line   delay × 0.79  delay
//! ```
//!
//! Each channel's **primary** tap is what you hear, and it is also fed back
//! into its own line. Each channel's **secondary** tap is fed across into
//! the *other* line. That cross-feed is the ping-pong: an echo that starts
//! on the left keeps coming back on the right, and vice versa. The 0.79
//! ratio between the taps keeps the bounces off-grid, which is the
//! character of the effect.
//!
//! ```text
//! left line  <- in L + fb/2 · (primary L + secondary R)
//! right line <- in R + fb/2 · (primary R + secondary L)
//!
//! wet L = sin(mix · π/2) · primary L
//! wet R = sin(mix · π/2) · primary R
//! ```
//!
//! Every line receives two returning taps (its own primary and the other
//! line's secondary), so the feedback amount is shared between them. With
//! the full amount on each, any feedback above 50% would grow forever.
//!
//! ## Block Flow
//!
//! [`PingPongProcessor::process`] runs, once per host block:
//!
//! 1. copy the untouched input into the dry buffer,
//! 2. redesign the lowpass from the current cutoff/resonance and run it
//!    over the whole block,
//! 3. run the delay network per sample, writing the wet signal only,
//! 4. add the dry copy back with the equal-power dry gain, ramped from the
//!    previous block's gain so mix changes never click.

use std::f32::consts::FRAC_PI_2;
use std::num::NonZeroUsize;
use std::sync::Arc;

use nih_plug::prelude::*;
use thiserror::Error;

use super::delay_line::DelayLine;
use super::filter::LowPassFilter;
use crate::state::{ParameterState, DELAY_TIME_MAX_MS};

/// Channels the processor runs on.
pub const NUM_CHANNELS: usize = 2;

/// Share of the feedback amount each returning tap gets.
const FEEDBACK_SPLIT: f32 = 0.5;

/// Extra slots past the longest delay, for the interpolation neighbour.
const CAPACITY_HEADROOM: usize = 2;

/// Why [`PingPongProcessor::prepare`] rejected a stream configuration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PrepareError {
    #[error("sample rate must be finite and positive, got {0}")]
    InvalidSampleRate(f32),
    #[error("maximum block size must be at least one sample")]
    ZeroBlockSize,
    #[error("only stereo is supported, got {0} channel(s)")]
    UnsupportedChannelCount(usize),
}

/// Tap positions in samples for one block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TapTimes {
    /// The left line's primary tap (and the right line's secondary tap).
    pub delay: f32,
    /// The right line's primary tap (and the left line's secondary tap).
    pub secondary: f32,
}

impl TapTimes {
    pub fn from_ms(delay_ms: f32, secondary_ms: f32, sample_rate: f32) -> Self {
        Self {
            delay: ms_to_samples(delay_ms, sample_rate),
            secondary: ms_to_samples(secondary_ms, sample_rate),
        }
    }
}

/// `delay_samples = delay_ms * sample_rate / 1000`
pub const fn ms_to_samples(delay_ms: f32, sample_rate: f32) -> f32 {
    delay_ms * sample_rate / 1000.0
}

/// Equal-power `(dry, wet)` gains for a mix position in `[0, 1]`.
///
/// `dry² + wet² = 1` everywhere, so perceived loudness holds steady across
/// the knob. The dry leg is floored at zero so a fully wet mix carries no
/// trace of `cos(π/2)`'s rounding error.
pub fn equal_power_gains(wet_dry: f32) -> (f32, f32) {
    let (wet, dry) = (wet_dry.clamp(0.0, 1.0) * FRAC_PI_2).sin_cos();
    (dry.max(0.0), wet)
}

/// The cross-coupled pair of delay lines.
///
/// The mixer owns both lines outright. Within a sample period it reads
/// all four taps first and only then pushes into either line, so the
/// result doesn't depend on which channel is handled first.
pub struct PingPongMixer {
    left: DelayLine,
    right: DelayLine,
}

impl PingPongMixer {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            left: DelayLine::new(capacity),
            right: DelayLine::new(capacity),
        }
    }

    /// Longest tap delay either line can serve, in samples.
    pub fn max_delay(&self) -> f32 {
        self.left.max_delay()
    }

    pub fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }

    /// Run the delay network over one block in place.
    ///
    /// On return `left` and `right` hold the wet signal only: each
    /// channel's primary tap scaled by `wet_gain`.
    pub fn process(
        &mut self,
        left: &mut [f32],
        right: &mut [f32],
        taps: TapTimes,
        feedback: f32,
        wet_gain: f32,
    ) {
        self.left.set_delay(taps.delay);
        self.right.set_delay(taps.secondary);
        let share = feedback * FEEDBACK_SPLIT;

        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            // Reads first. The second tap on each line advances its cursor.
            let primary_l = self.left.pop_default(false);
            let secondary_l = self.left.pop(taps.secondary, true);
            let primary_r = self.right.pop_default(false);
            let secondary_r = self.right.pop(taps.delay, true);

            // Own primary loops back, the other line's secondary crosses over.
            self.left.push(*l + share * (primary_l + secondary_r));
            self.right.push(*r + share * (primary_r + secondary_l));

            *l = primary_l * wet_gain;
            *r = primary_r * wet_gain;
        }
    }
}

/// JUCE-style `addFromWithRamp`: `dst += src * gain`, with `gain` moving
/// linearly from `start_gain` by `(end_gain - start_gain) / len` per sample.
fn add_with_ramp(dst: &mut [f32], src: &[f32], start_gain: f32, end_gain: f32) {
    if dst.is_empty() {
        return;
    }
    if start_gain == end_gain {
        for (d, s) in dst.iter_mut().zip(src) {
            *d += s * start_gain;
        }
        return;
    }

    let increment = (end_gain - start_gain) / dst.len() as f32;
    let mut gain = start_gain;
    for (d, s) in dst.iter_mut().zip(src) {
        *d += s * gain;
        gain += increment;
    }
}

/// The complete effect without any host attached: stream negotiation,
/// per-block processing and reset.
///
/// Scalars come from the shared [`ParameterState`]; cutoff and resonance
/// are passed in by the caller every block because they are read straight
/// from the host's parameter store.
pub struct PingPongProcessor {
    state: Arc<ParameterState>,
    sample_rate: f32,
    /// Zero until [`prepare`](Self::prepare) succeeds.
    max_block_size: usize,
    mixer: Option<PingPongMixer>,
    filter: LowPassFilter,
    /// Pre-filter copy of the current block, one buffer per channel.
    dry: [Vec<f32>; NUM_CHANNELS],
    /// Dry gain at the end of the previous block; the next ramp starts here.
    dry_gain: f32,
}

impl PingPongProcessor {
    pub fn new(state: Arc<ParameterState>) -> Self {
        let (dry_gain, _) = equal_power_gains(state.wet_dry());
        Self {
            state,
            sample_rate: 44_100.0,
            max_block_size: 0,
            mixer: None,
            filter: LowPassFilter::new(),
            dry: [Vec::new(), Vec::new()],
            dry_gain,
        }
    }

    pub fn state(&self) -> &Arc<ParameterState> {
        &self.state
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    pub fn is_prepared(&self) -> bool {
        self.mixer.is_some()
    }

    /// Size every buffer for a new stream and clear all state.
    ///
    /// This is the only place the processor allocates. Calling it again
    /// with a new configuration rebuilds everything from scratch.
    pub fn prepare(
        &mut self,
        sample_rate: f32,
        max_block_size: usize,
        num_channels: usize,
    ) -> Result<(), PrepareError> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(PrepareError::InvalidSampleRate(sample_rate));
        }
        if max_block_size == 0 {
            return Err(PrepareError::ZeroBlockSize);
        }
        if num_channels != NUM_CHANNELS {
            return Err(PrepareError::UnsupportedChannelCount(num_channels));
        }

        let max_delay = ms_to_samples(DELAY_TIME_MAX_MS, sample_rate).ceil() as usize;
        let capacity = NonZeroUsize::new(max_delay + CAPACITY_HEADROOM)
            .ok_or(PrepareError::InvalidSampleRate(sample_rate))?;

        self.sample_rate = sample_rate;
        self.max_block_size = max_block_size;
        self.mixer = Some(PingPongMixer::new(capacity));
        for dry in &mut self.dry {
            dry.clear();
            dry.resize(max_block_size, 0.0);
        }
        self.reset();

        nih_log!(
            "prepared ping-pong delay: {} Hz, {} samples per block, {} samples per line",
            sample_rate,
            max_block_size,
            capacity
        );
        Ok(())
    }

    /// Silence both lines, clear the filter memory and snap the dry ramp to
    /// the current mix. Must not run concurrently with [`process`](Self::process).
    pub fn reset(&mut self) {
        if let Some(mixer) = &mut self.mixer {
            mixer.reset();
        }
        self.filter.reset();
        for dry in &mut self.dry {
            dry.fill(0.0);
        }
        self.dry_gain = equal_power_gains(self.state.wet_dry()).0;
    }

    /// Process one host block in place.
    ///
    /// `channels` must hold the two stereo channels; anything else is left
    /// untouched. Blocks longer than the negotiated maximum are handled in
    /// chunks so the dry buffer never has to grow. Returns the effect's
    /// tail length in samples for the current settings.
    pub fn process(
        &mut self,
        channels: &mut [&mut [f32]],
        cutoff_hz: f32,
        resonance_q: f32,
    ) -> u32 {
        let taps = TapTimes::from_ms(
            self.state.delay_time_ms(),
            self.state.secondary_delay_ms(),
            self.sample_rate,
        );
        let feedback = self.state.feedback();
        let (dry_target, wet_gain) = equal_power_gains(self.state.wet_dry());
        let tail = tail_samples(taps, feedback);

        let Some(mixer) = self.mixer.as_mut() else {
            return tail;
        };
        let [left, right, ..] = channels else {
            return tail;
        };

        // Fresh coefficients every block, whether or not the knobs moved.
        self.filter
            .set_coefficients(self.sample_rate, cutoff_hz, resonance_q);

        let block_len = left.len().min(right.len());
        let dry_start = self.dry_gain;
        let dry_step = (dry_target - dry_start) / block_len.max(1) as f32;

        let [dry_l, dry_r] = &mut self.dry;
        let mut offset = 0;
        for (l, r) in left[..block_len]
            .chunks_mut(self.max_block_size)
            .zip(right[..block_len].chunks_mut(self.max_block_size))
        {
            let len = l.len();
            let dry_l = &mut dry_l[..len];
            let dry_r = &mut dry_r[..len];

            dry_l.copy_from_slice(l);
            dry_r.copy_from_slice(r);

            self.filter.process_block(&mut [&mut *l, &mut *r]);
            mixer.process(l, r, taps, feedback, wet_gain);

            let start = dry_start + dry_step * offset as f32;
            let end = dry_start + dry_step * (offset + len) as f32;
            add_with_ramp(l, dry_l, start, end);
            add_with_ramp(r, dry_r, start, end);
            offset += len;
        }

        self.dry_gain = dry_target;
        tail
    }
}

/// How long the echoes stay audible after the input stops.
///
/// Each trip around the loop scales the signal by at most `feedback`, so
/// reaching -60 dB takes `log(0.001) / log(feedback)` trips of the longer
/// tap.
pub fn tail_samples(taps: TapTimes, feedback: f32) -> u32 {
    let period = taps.delay.max(taps.secondary);
    if feedback > 0.001 {
        let repeats = -3.0 / feedback.log10();
        ((repeats + 1.0) * period) as u32
    } else {
        period as u32
    }
}
