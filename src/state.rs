//! # Parameter State
//!
//! The scalars the delay loop reads every sample: delay time, the derived
//! secondary delay time, feedback and wet/dry. They live in atomic slots so
//! the host's parameter callbacks (running on whatever thread the host
//! likes) can write them while the audio thread reads, with no lock
//! anywhere in between.
//!
//! Each slot is independently valid over its whole range, so there is no
//! need for a transactional update across several slots. The only coupled
//! pair is the secondary delay, which is always written together with the
//! primary one and is itself in range on its own.
//!
//! ## Persisted State
//!
//! Four floats in a fixed order: delay time, secondary delay time,
//! feedback, wet/dry. Cutoff and resonance are regular host parameters and
//! are saved by the host together with the other parameter values.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use atomic_float::AtomicF32;
use nih_plug::params::persist::PersistentField;
use nih_plug::prelude::*;
use serde::{Deserialize, Serialize};

pub const PARAM_DELAY_TIME: &str = "delayTime";
pub const PARAM_FEEDBACK: &str = "feedback";
pub const PARAM_WET_DRY: &str = "wetDry";
pub const PARAM_CUTOFF: &str = "lpf";
pub const PARAM_RESONANCE: &str = "Q";

pub const DELAY_TIME_MIN_MS: f32 = 1.0;
pub const DELAY_TIME_MAX_MS: f32 = 3000.0;
pub const DELAY_TIME_DEFAULT_MS: f32 = 1000.0;

/// Ratio of the secondary tap to the primary tap. The mismatch between the
/// two taps is what gives the bounce its lopsided, off-grid feel.
pub const SECONDARY_DELAY_RATIO: f32 = 0.79;

pub const FEEDBACK_MAX: f32 = 0.99;
pub const FEEDBACK_DEFAULT: f32 = 0.3;

pub const WET_DRY_DEFAULT: f32 = 0.3;

pub const CUTOFF_MIN_HZ: f32 = 20.0;
pub const CUTOFF_MAX_HZ: f32 = 20_000.0;
pub const CUTOFF_DEFAULT_HZ: f32 = 600.0;

pub const RESONANCE_MIN: f32 = 0.1;
pub const RESONANCE_MAX: f32 = 15.0;
pub const RESONANCE_DEFAULT: f32 = 1.0;

/// Number of floats in the persisted state.
pub const PERSISTED_LEN: usize = 4;

/// Lock-free scalar parameter slots shared between the parameter
/// callbacks and the audio thread.
#[derive(Debug)]
pub struct ParameterState {
    delay_time_ms: AtomicF32,
    secondary_delay_ms: AtomicF32,
    feedback: AtomicF32,
    wet_dry: AtomicF32,
}

impl Default for ParameterState {
    fn default() -> Self {
        Self {
            delay_time_ms: AtomicF32::new(DELAY_TIME_DEFAULT_MS),
            secondary_delay_ms: AtomicF32::new(DELAY_TIME_DEFAULT_MS * SECONDARY_DELAY_RATIO),
            feedback: AtomicF32::new(FEEDBACK_DEFAULT),
            wet_dry: AtomicF32::new(WET_DRY_DEFAULT),
        }
    }
}

impl ParameterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a changed control value. `O(1)`, never blocks, never touches
    /// audio.
    ///
    /// Values are clamped into their declared range. Non-finite values and
    /// ids this state does not track (cutoff and resonance are read straight
    /// from the parameter store) are ignored.
    pub fn on_parameter_changed(&self, id: &str, value: f32) {
        if !value.is_finite() {
            nih_debug_assert_failure!("ignoring non-finite value {} for '{}'", value, id);
            return;
        }

        match id {
            PARAM_DELAY_TIME => self.set_delay_time_ms(value),
            PARAM_FEEDBACK => self.set_feedback(value),
            PARAM_WET_DRY => self.set_wet_dry(value),
            _ => {}
        }
    }

    /// Set the primary delay time and derive the secondary one from it.
    pub fn set_delay_time_ms(&self, value: f32) {
        let delay = clamp_delay_ms(value);
        self.delay_time_ms.store(delay, Ordering::Release);
        self.secondary_delay_ms
            .store(delay * SECONDARY_DELAY_RATIO, Ordering::Release);
    }

    pub fn set_feedback(&self, value: f32) {
        self.feedback
            .store(value.clamp(0.0, FEEDBACK_MAX), Ordering::Release);
    }

    pub fn set_wet_dry(&self, value: f32) {
        self.wet_dry.store(value.clamp(0.0, 1.0), Ordering::Release);
    }

    pub fn delay_time_ms(&self) -> f32 {
        self.delay_time_ms.load(Ordering::Acquire)
    }

    pub fn secondary_delay_ms(&self) -> f32 {
        self.secondary_delay_ms.load(Ordering::Acquire)
    }

    pub fn feedback(&self) -> f32 {
        self.feedback.load(Ordering::Acquire)
    }

    pub fn wet_dry(&self) -> f32 {
        self.wet_dry.load(Ordering::Acquire)
    }

    /// The persisted scalars in their fixed order.
    pub fn save_state(&self) -> [f32; PERSISTED_LEN] {
        [
            self.delay_time_ms(),
            self.secondary_delay_ms(),
            self.feedback(),
            self.wet_dry(),
        ]
    }

    /// Restore the persisted scalars.
    ///
    /// Short input restores only the leading fields; the rest keep their
    /// current values. Non-finite entries are skipped and everything is
    /// clamped, so a corrupt session can never push a slot out of range.
    pub fn load_state(&self, values: &[f32]) {
        let mut fields = values.iter().copied();

        if let Some(delay) = fields.next().filter(|v| v.is_finite()) {
            self.set_delay_time_ms(delay);
        }
        if let Some(secondary) = fields.next().filter(|v| v.is_finite()) {
            self.secondary_delay_ms
                .store(clamp_secondary_delay_ms(secondary), Ordering::Release);
        }
        if let Some(feedback) = fields.next().filter(|v| v.is_finite()) {
            self.set_feedback(feedback);
        }
        if let Some(wet_dry) = fields.next().filter(|v| v.is_finite()) {
            self.set_wet_dry(wet_dry);
        }

        if values.len() < PERSISTED_LEN {
            nih_log!(
                "persisted state holds {} of {} values, keeping the rest",
                values.len(),
                PERSISTED_LEN
            );
        }
    }

    /// The persisted scalars as little-endian 32-bit floats.
    pub fn to_bytes(&self) -> [u8; PERSISTED_LEN * 4] {
        let mut bytes = [0u8; PERSISTED_LEN * 4];
        for (chunk, value) in bytes.chunks_exact_mut(4).zip(self.save_state()) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    /// Restore from [`to_bytes`](Self::to_bytes) output. A trailing partial
    /// word is ignored; missing words keep their current values.
    pub fn load_bytes(&self, bytes: &[u8]) {
        let mut values = [0.0f32; PERSISTED_LEN];
        let mut count = 0;
        for (slot, chunk) in values.iter_mut().zip(bytes.chunks_exact(4)) {
            *slot = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            count += 1;
        }
        self.load_state(&values[..count]);
    }
}

fn clamp_delay_ms(value: f32) -> f32 {
    value.clamp(DELAY_TIME_MIN_MS, DELAY_TIME_MAX_MS)
}

/// The secondary tap only ever holds `SECONDARY_DELAY_RATIO` times a valid
/// primary delay.
fn clamp_secondary_delay_ms(value: f32) -> f32 {
    value.clamp(
        DELAY_TIME_MIN_MS * SECONDARY_DELAY_RATIO,
        DELAY_TIME_MAX_MS * SECONDARY_DELAY_RATIO,
    )
}

/// The persisted scalars as the host stores them: a plain list of floats
/// in [`ParameterState::save_state`] order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersistedScalars(pub Vec<f32>);

/// Lets the host save and restore the scalars with the rest of the plugin
/// state through a `#[persist]` field.
impl<'a> PersistentField<'a, PersistedScalars> for Arc<ParameterState> {
    fn set(&self, new_value: PersistedScalars) {
        self.load_state(&new_value.0);
    }

    fn map<F, R>(&self, f: F) -> R
    where
        F: Fn(&PersistedScalars) -> R,
    {
        f(&PersistedScalars(self.save_state().to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults() {
        let state = ParameterState::new();
        assert_eq!(state.delay_time_ms(), DELAY_TIME_DEFAULT_MS);
        assert_relative_eq!(state.secondary_delay_ms(), 790.0);
        assert_eq!(state.feedback(), FEEDBACK_DEFAULT);
        assert_eq!(state.wet_dry(), WET_DRY_DEFAULT);
    }

    #[test]
    fn test_delay_change_updates_secondary_tap() {
        let state = ParameterState::new();
        state.on_parameter_changed(PARAM_DELAY_TIME, 500.0);
        assert_eq!(state.delay_time_ms(), 500.0);
        assert_relative_eq!(state.secondary_delay_ms(), 395.0);
    }

    #[test]
    fn test_out_of_range_values_clamp() {
        let state = ParameterState::new();

        state.on_parameter_changed(PARAM_DELAY_TIME, 10_000.0);
        assert_eq!(state.delay_time_ms(), DELAY_TIME_MAX_MS);
        state.on_parameter_changed(PARAM_DELAY_TIME, -3.0);
        assert_eq!(state.delay_time_ms(), DELAY_TIME_MIN_MS);

        state.on_parameter_changed(PARAM_FEEDBACK, 1.5);
        assert_eq!(state.feedback(), FEEDBACK_MAX);
        state.on_parameter_changed(PARAM_WET_DRY, -0.2);
        assert_eq!(state.wet_dry(), 0.0);
    }

    #[test]
    fn test_unknown_and_non_finite_values_are_ignored() {
        let state = ParameterState::new();
        let before = state.save_state();

        state.on_parameter_changed(PARAM_CUTOFF, 1234.0);
        state.on_parameter_changed(PARAM_RESONANCE, 4.0);
        state.on_parameter_changed("bogus", 1.0);
        state.on_parameter_changed(PARAM_FEEDBACK, f32::NAN);
        state.on_parameter_changed(PARAM_DELAY_TIME, f32::INFINITY);

        assert_eq!(state.save_state(), before);
    }

    /// Saving then loading into a fresh state reproduces all four scalars.
    #[test]
    fn test_persistence_round_trip() {
        let saved = ParameterState::new();
        saved.set_delay_time_ms(1234.5);
        saved.set_feedback(0.81);
        saved.set_wet_dry(0.62);

        let restored = ParameterState::new();
        restored.load_state(&saved.save_state());
        assert_eq!(restored.save_state(), saved.save_state());

        let from_bytes = ParameterState::new();
        from_bytes.load_bytes(&saved.to_bytes());
        assert_eq!(from_bytes.save_state(), saved.save_state());
    }

    /// The host-facing persistent field goes through the same path.
    #[test]
    fn test_persistent_field_round_trip() {
        let saved = Arc::new(ParameterState::new());
        saved.set_delay_time_ms(250.0);
        saved.set_wet_dry(1.0);

        let stored = PersistentField::map(&saved, |values: &PersistedScalars| values.clone());
        assert_eq!(stored.0.len(), PERSISTED_LEN);

        let restored = Arc::new(ParameterState::new());
        PersistentField::set(&restored, stored);
        assert_eq!(restored.save_state(), saved.save_state());
    }

    /// Short data restores a prefix; the remaining fields keep defaults.
    #[test]
    fn test_short_state_restores_prefix() {
        let state = ParameterState::new();
        state.load_state(&[2000.0, 1580.0]);

        assert_eq!(state.delay_time_ms(), 2000.0);
        assert_eq!(state.secondary_delay_ms(), 1580.0);
        assert_eq!(state.feedback(), FEEDBACK_DEFAULT);
        assert_eq!(state.wet_dry(), WET_DRY_DEFAULT);

        let bytes = ParameterState::new().to_bytes();
        let partial = ParameterState::new();
        partial.set_feedback(0.9);
        // Two whole words and half of the third.
        partial.load_bytes(&bytes[..10]);
        assert_eq!(partial.feedback(), 0.9);

        let empty = ParameterState::new();
        empty.load_state(&[]);
        empty.load_bytes(&[1, 2, 3]);
        assert_eq!(empty.save_state(), ParameterState::new().save_state());
    }

    #[test]
    fn test_corrupt_state_is_clamped() {
        let state = ParameterState::new();
        state.load_state(&[f32::NAN, 1e9, 7.0, -1.0]);

        assert_eq!(state.delay_time_ms(), DELAY_TIME_DEFAULT_MS);
        assert_eq!(
            state.secondary_delay_ms(),
            DELAY_TIME_MAX_MS * SECONDARY_DELAY_RATIO
        );
        assert_eq!(state.feedback(), FEEDBACK_MAX);
        assert_eq!(state.wet_dry(), 0.0);

        state.load_state(&[DELAY_TIME_DEFAULT_MS, -50.0]);
        assert_eq!(
            state.secondary_delay_ms(),
            DELAY_TIME_MIN_MS * SECONDARY_DELAY_RATIO
        );
    }

    /// The secondary tap at either end of the delay range survives a save
    /// and load unchanged.
    #[test]
    fn test_round_trip_at_delay_extremes() {
        for delay in [DELAY_TIME_MIN_MS, DELAY_TIME_MAX_MS] {
            let saved = ParameterState::new();
            saved.set_delay_time_ms(delay);

            let restored = ParameterState::new();
            restored.load_state(&saved.save_state());
            assert_eq!(
                restored.save_state(),
                saved.save_state(),
                "delay {delay} ms did not round trip"
            );
            assert_eq!(restored.secondary_delay_ms(), delay * SECONDARY_DELAY_RATIO);
        }
    }

    /// A writer thread hammering the slots must never expose an
    /// out-of-range value to a reader.
    #[test]
    fn test_concurrent_updates_stay_in_range() {
        let state = Arc::new(ParameterState::new());
        let writer = {
            let state = Arc::clone(&state);
            std::thread::spawn(move || {
                for i in 0..10_000 {
                    let x = i as f32;
                    state.on_parameter_changed(PARAM_DELAY_TIME, x * 0.7 - 500.0);
                    state.on_parameter_changed(PARAM_FEEDBACK, (x * 0.013).sin() * 2.0);
                    state.on_parameter_changed(PARAM_WET_DRY, (x * 0.007).cos() * 2.0);
                }
            })
        };

        for _ in 0..10_000 {
            let delay = state.delay_time_ms();
            assert!((DELAY_TIME_MIN_MS..=DELAY_TIME_MAX_MS).contains(&delay));
            let secondary = state.secondary_delay_ms();
            assert!((0.0..=DELAY_TIME_MAX_MS).contains(&secondary));
            assert!((0.0..=FEEDBACK_MAX).contains(&state.feedback()));
            assert!((0.0..=1.0).contains(&state.wet_dry()));
        }

        writer.join().unwrap();
    }
}
