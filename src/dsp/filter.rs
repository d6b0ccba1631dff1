//! # Resonant Lowpass (RBJ Biquad)
//!
//! A second-order (12 dB/octave) lowpass with a resonance control, designed
//! with the well-known "Audio EQ Cookbook" formulas by Robert
//! Bristow-Johnson:
//!
//! ```text
//! w0    = 2π · cutoff / sample_rate
//! alpha = sin(w0) / (2 · Q)
//!
//! b0 = (1 - cos w0) / 2      a0 = 1 + alpha
//! b1 =  1 - cos w0           a1 = -2 · cos w0
//! b2 = (1 - cos w0) / 2      a2 = 1 - alpha
//! ```
//!
//! All five coefficients are divided by `a0` so the difference equation
//! needs no division:
//!
//! ```text
//! y[n] = b0·x[n] + b1·x[n-1] + b2·x[n-2] - a1·y[n-1] - a2·y[n-2]
//! ```
//!
//! We run it in Transposed Direct Form II, which only needs two state
//! registers per channel and behaves well with `f32` precision.
//!
//! ## One Design, Two Memories
//!
//! Both channels share one coefficient set (there is only one cutoff knob),
//! but each channel has its own state registers. Otherwise the left
//! channel's history would leak into the right channel.
//!
//! ## Stability
//!
//! The design blows up as the cutoff approaches Nyquist (`sample_rate / 2`),
//! so the cutoff is clamped to 49% of the sample rate before any trig runs.

use std::f32::consts::PI;

use nih_plug::prelude::*;

/// Lowest cutoff the coefficient design accepts, in Hz.
const MIN_CUTOFF_HZ: f32 = 1.0;

/// Cutoff ceiling as a fraction of the sample rate. Just under Nyquist.
const MAX_CUTOFF_RATIO: f32 = 0.49;

/// Guards the `alpha` division against a zero or negative Q.
const MIN_Q: f32 = 0.01;

/// Normalized biquad coefficients (`a0` already divided out).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoefficients {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl BiquadCoefficients {
    /// Coefficients that pass the signal through untouched.
    pub const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// RBJ lowpass design for the given cutoff and resonance.
    ///
    /// The cutoff is clamped into `[1 Hz, 0.49 · sample_rate]` and the Q to
    /// at least 0.01, so any finite sample rate yields finite coefficients.
    pub fn lowpass(sample_rate: f32, cutoff_hz: f32, q: f32) -> Self {
        let max_cutoff = sample_rate * MAX_CUTOFF_RATIO;
        let cutoff = if cutoff_hz.is_nan() {
            max_cutoff
        } else {
            cutoff_hz.clamp(MIN_CUTOFF_HZ, max_cutoff)
        };
        let q = if q.is_nan() { MIN_Q } else { q.max(MIN_Q) };

        let w0 = 2.0 * PI * cutoff / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);

        let inv_a0 = 1.0 / (1.0 + alpha);
        let b1 = (1.0 - cos_w0) * inv_a0;

        Self {
            b0: b1 * 0.5,
            b1,
            b2: b1 * 0.5,
            a1: -2.0 * cos_w0 * inv_a0,
            a2: (1.0 - alpha) * inv_a0,
        }
    }

    pub fn is_finite(&self) -> bool {
        [self.b0, self.b1, self.b2, self.a1, self.a2]
            .iter()
            .all(|c| c.is_finite())
    }
}

/// The two TDF-II registers for one channel.
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    z1: f32,
    z2: f32,
}

impl BiquadState {
    #[inline]
    fn process(&mut self, c: &BiquadCoefficients, input: f32) -> f32 {
        let output = c.b0 * input + self.z1;
        self.z1 = c.b1 * input - c.a1 * output + self.z2;
        self.z2 = c.b2 * input - c.a2 * output;
        output
    }
}

/// A stereo resonant lowpass: one coefficient set, one memory per channel.
pub struct LowPassFilter {
    coefficients: BiquadCoefficients,
    states: [BiquadState; 2],
}

impl Default for LowPassFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl LowPassFilter {
    /// A passthrough filter with cleared memory. Call
    /// [`set_coefficients`](Self::set_coefficients) before use.
    pub fn new() -> Self {
        Self {
            coefficients: BiquadCoefficients::IDENTITY,
            states: [BiquadState::default(); 2],
        }
    }

    /// Redesign the filter for the current cutoff and resonance.
    ///
    /// The processor calls this at the top of every block, whether or not
    /// the knobs moved. The state registers are left alone, so there is no
    /// click when the coefficients change.
    pub fn set_coefficients(&mut self, sample_rate: f32, cutoff_hz: f32, resonance_q: f32) {
        let coefficients = BiquadCoefficients::lowpass(sample_rate, cutoff_hz, resonance_q);
        nih_debug_assert!(
            coefficients.is_finite(),
            "non-finite lowpass coefficients for sr={} cutoff={} q={}",
            sample_rate,
            cutoff_hz,
            resonance_q
        );
        self.coefficients = coefficients;
    }

    pub fn coefficients(&self) -> BiquadCoefficients {
        self.coefficients
    }

    /// Filter one sample of `channel`. Channels beyond the second are
    /// passed through unchanged.
    #[cfg(test)]
    fn process_sample(&mut self, channel: usize, input: f32) -> f32 {
        match self.states.get_mut(channel) {
            Some(state) => state.process(&self.coefficients, input),
            None => input,
        }
    }

    /// Filter a whole block in place, channel by channel.
    ///
    /// The registers carry over between calls, so splitting a signal into
    /// blocks gives exactly the same output as processing it in one go.
    pub fn process_block(&mut self, channels: &mut [&mut [f32]]) {
        let coefficients = self.coefficients;
        for (channel, state) in channels.iter_mut().zip(self.states.iter_mut()) {
            for sample in channel.iter_mut() {
                *sample = state.process(&coefficients, *sample);
            }
        }
    }

    /// Clear both channels' memory. Coefficients are kept.
    pub fn reset(&mut self) {
        self.states = [BiquadState::default(); 2];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// A DC signal settles to unity gain: a lowpass never touches 0 Hz.
    #[test]
    fn test_dc_passes_through() {
        let mut filter = LowPassFilter::new();
        filter.set_coefficients(44100.0, 600.0, 1.0);

        let mut output = 0.0;
        for _ in 0..20_000 {
            output = filter.process_sample(0, 1.0);
        }
        assert_abs_diff_eq!(output, 1.0, epsilon = 1e-3);
    }

    /// The highest representable frequency (+1, -1, +1, ...) is crushed by
    /// a low cutoff.
    #[test]
    fn test_attenuates_nyquist() {
        let mut filter = LowPassFilter::new();
        filter.set_coefficients(44100.0, 200.0, 0.707);

        let mut max_output = 0.0_f32;
        for i in 0..4000 {
            let input = if i % 2 == 0 { 1.0 } else { -1.0 };
            let output = filter.process_sample(0, input);
            if i > 2000 {
                max_output = max_output.max(output.abs());
            }
        }
        assert!(max_output < 1e-3, "expected heavy attenuation, got {max_output}");
    }

    /// Every cutoff and Q the parameters allow, at the common sample rates,
    /// must yield finite and bounded output for bounded input.
    #[test]
    fn test_stable_across_parameter_domain() {
        let cutoffs = [20.0, 100.0, 600.0, 2_000.0, 10_000.0, 20_000.0];
        let resonances = [0.1, 0.707, 1.0, 5.0, 15.0];

        for sample_rate in [44_100.0_f32, 48_000.0, 96_000.0] {
            for cutoff in cutoffs {
                for q in resonances {
                    let mut filter = LowPassFilter::new();
                    filter.set_coefficients(sample_rate, cutoff, q);
                    assert!(filter.coefficients().is_finite());

                    let mut peak = 0.0_f32;
                    for n in 0..8192 {
                        // Resonant sine plus a square: worst realistic drive.
                        let phase = 2.0 * PI * cutoff * n as f32 / sample_rate;
                        let square = if (n / 32) % 2 == 0 { 0.5 } else { -0.5 };
                        let input = 0.5 * phase.sin() + square;
                        let output = filter.process_sample(n % 2, input);
                        assert!(
                            output.is_finite(),
                            "non-finite output at sr={sample_rate} cutoff={cutoff} q={q}"
                        );
                        peak = peak.max(output.abs());
                    }
                    assert!(
                        peak < 64.0,
                        "runaway gain {peak} at sr={sample_rate} cutoff={cutoff} q={q}"
                    );
                }
            }
        }
    }

    /// A cutoff at or above Nyquist is clamped instead of producing
    /// garbage coefficients.
    #[test]
    fn test_cutoff_above_nyquist_is_clamped() {
        for cutoff in [22_050.0, 30_000.0, f32::INFINITY, f32::NAN] {
            let c = BiquadCoefficients::lowpass(44_100.0, cutoff, 1.0);
            assert!(c.is_finite(), "cutoff {cutoff} gave {c:?}");
            assert_eq!(c, BiquadCoefficients::lowpass(44_100.0, 44_100.0 * 0.49, 1.0));
        }
        assert!(BiquadCoefficients::lowpass(44_100.0, 600.0, 0.0).is_finite());
        assert!(BiquadCoefficients::lowpass(44_100.0, -5.0, 1.0).is_finite());
    }

    /// Splitting a signal across blocks matches processing it whole.
    #[test]
    fn test_state_persists_across_blocks() {
        let signal: Vec<f32> = (0..256).map(|n| ((n * 7) % 13) as f32 / 13.0 - 0.5).collect();

        let mut whole = LowPassFilter::new();
        whole.set_coefficients(48_000.0, 1_000.0, 2.0);
        let mut whole_l = signal.clone();
        let mut whole_r = signal.clone();
        whole.process_block(&mut [whole_l.as_mut_slice(), whole_r.as_mut_slice()]);

        let mut split = LowPassFilter::new();
        split.set_coefficients(48_000.0, 1_000.0, 2.0);
        let mut split_l = signal.clone();
        let mut split_r = signal;
        let (l_head, l_tail) = split_l.split_at_mut(100);
        let (r_head, r_tail) = split_r.split_at_mut(100);
        split.process_block(&mut [l_head, r_head]);
        split.set_coefficients(48_000.0, 1_000.0, 2.0);
        split.process_block(&mut [l_tail, r_tail]);

        assert_eq!(whole_l, split_l);
        assert_eq!(whole_r, split_r);
    }

    /// Left and right keep separate memories.
    #[test]
    fn test_channels_are_independent() {
        let mut filter = LowPassFilter::new();
        filter.set_coefficients(44_100.0, 600.0, 1.0);

        let mut left = [1.0, 0.0, 0.0, 0.0];
        let mut right = [0.0; 4];
        filter.process_block(&mut [&mut left[..], &mut right[..]]);

        assert!(left.iter().any(|s| *s != 0.0));
        assert!(right.iter().all(|s| *s == 0.0), "left leaked into right: {right:?}");
    }

    #[test]
    fn test_reset_clears_memory() {
        let mut filter = LowPassFilter::new();
        filter.set_coefficients(44_100.0, 600.0, 1.0);
        for _ in 0..100 {
            filter.process_sample(0, 1.0);
            filter.process_sample(1, -1.0);
        }

        filter.reset();

        let mut left = [0.0; 32];
        let mut right = [0.0; 32];
        filter.process_block(&mut [&mut left[..], &mut right[..]]);
        assert!(left.iter().chain(right.iter()).all(|s| *s == 0.0));
    }
}
