//! # Plugin Parameters
//!
//! The five knobs the host sees. Every parameter has a stable string ID
//! (`#[id = "..."]`) the host uses to save sessions and automation, so
//! these IDs must never change once published.
//!
//! ## Two Ways In
//!
//! The delay loop never touches these `FloatParam`s directly:
//!
//! - **Delay time, feedback and mix** carry a value-change callback. When
//!   the host moves one of them, the callback pushes the new value into
//!   the shared [`ParameterState`], whose lock-free slots the audio thread
//!   reads.
//! - **Cutoff and resonance** have no callback. The processor reads them
//!   with `FloatParam::value()` at the top of every block and redesigns
//!   the filter from them.

use std::sync::Arc;

use nih_plug::prelude::*;

use crate::state::{
    ParameterState, CUTOFF_DEFAULT_HZ, CUTOFF_MAX_HZ, CUTOFF_MIN_HZ, DELAY_TIME_DEFAULT_MS,
    DELAY_TIME_MAX_MS, DELAY_TIME_MIN_MS, FEEDBACK_DEFAULT, FEEDBACK_MAX, PARAM_DELAY_TIME,
    PARAM_FEEDBACK, PARAM_WET_DRY, RESONANCE_DEFAULT, RESONANCE_MAX, RESONANCE_MIN,
    WET_DRY_DEFAULT,
};

/// Skew for the cutoff knob. Below 1.0 gives the low frequencies more knob
/// travel, matching how we hear pitch.
const CUTOFF_SKEW: f32 = 0.35;

#[derive(Params)]
pub struct PluginParams {
    /// **Delay Time**: distance to the first left echo. The right channel's
    /// tap sits at 79% of this.
    #[id = "delayTime"]
    pub delay_time: FloatParam,

    /// **Feedback**: how much of each echo comes back around. Capped at
    /// 99% so the repeats always die out eventually.
    #[id = "feedback"]
    pub feedback: FloatParam,

    /// **Mix**: equal-power balance between dry input and echoes.
    #[id = "wetDry"]
    pub wet_dry: FloatParam,

    /// **Cutoff** of the resonant lowpass in front of the delay lines.
    #[id = "lpf"]
    pub cutoff: FloatParam,

    /// **Resonance** (Q) of that lowpass.
    #[id = "Q"]
    pub resonance: FloatParam,

    /// The scalar slots the audio thread reads, also saved with the
    /// session as four floats.
    #[persist = "scalars"]
    pub scalars: Arc<ParameterState>,
}

impl Default for PluginParams {
    fn default() -> Self {
        Self::new(Arc::new(ParameterState::new()))
    }
}

impl PluginParams {
    /// Build the parameter set around `state`, wiring the delay, feedback
    /// and mix callbacks into it.
    pub fn new(state: Arc<ParameterState>) -> Self {
        Self {
            delay_time: FloatParam::new(
                "Delay Time",
                DELAY_TIME_DEFAULT_MS,
                FloatRange::Linear {
                    min: DELAY_TIME_MIN_MS,
                    max: DELAY_TIME_MAX_MS,
                },
            )
            .with_unit(" ms")
            .with_step_size(1.0)
            .with_callback(notify(&state, PARAM_DELAY_TIME)),

            feedback: FloatParam::new(
                "Feedback",
                FEEDBACK_DEFAULT,
                FloatRange::Linear {
                    min: 0.0,
                    max: FEEDBACK_MAX,
                },
            )
            .with_unit("%")
            .with_value_to_string(formatters::v2s_f32_percentage(0))
            .with_string_to_value(formatters::s2v_f32_percentage())
            .with_callback(notify(&state, PARAM_FEEDBACK)),

            wet_dry: FloatParam::new(
                "Mix",
                WET_DRY_DEFAULT,
                FloatRange::Linear { min: 0.0, max: 1.0 },
            )
            .with_unit("%")
            .with_value_to_string(formatters::v2s_f32_percentage(0))
            .with_string_to_value(formatters::s2v_f32_percentage())
            .with_callback(notify(&state, PARAM_WET_DRY)),

            cutoff: FloatParam::new(
                "Cutoff",
                CUTOFF_DEFAULT_HZ,
                FloatRange::Skewed {
                    min: CUTOFF_MIN_HZ,
                    max: CUTOFF_MAX_HZ,
                    factor: CUTOFF_SKEW,
                },
            )
            .with_unit(" Hz")
            .with_step_size(1.0),

            resonance: FloatParam::new(
                "Resonance",
                RESONANCE_DEFAULT,
                FloatRange::Linear {
                    min: RESONANCE_MIN,
                    max: RESONANCE_MAX,
                },
            )
            .with_step_size(0.01),

            scalars: state,
        }
    }
}

/// A value-change callback that forwards `id`'s new value to `state`.
fn notify(state: &Arc<ParameterState>, id: &'static str) -> Arc<dyn Fn(f32) + Send + Sync> {
    let state = Arc::clone(state);
    Arc::new(move |value| state.on_parameter_changed(id, value))
}
