//! # Table Tennis Delay: A Stereo Ping-Pong Delay Plugin
//!
//! A cross-fed stereo delay built with
//! [nih-plug](https://github.com/robbert-vdh/nih-plug), exported as CLAP,
//! VST3 and (through clap-wrapper) AUv2. Echoes bounce between the two
//! channels on two taps whose lengths differ by a factor of 0.79, after the
//! input has passed through a resonant lowpass.
//!
//! ## Signal Flow
//!
//! ```text
//! Input ──┬────────────────────────────────────────── × cos(mix·π/2) ──┐
//!         │                                                            │
//!         └──► [Resonant Lowpass] ──► [Left line ⇄ Right line] ──┐     │
//!               cutoff, Q,             primary taps heard,       │     │
//!               redesigned per block   secondary taps cross-fed  │     │
//!                                                                ▼     ▼
//!                                                  × sin(mix·π/2) ──►(+)──► Output
//! ```
//!
//! The DSP lives in [`dsp`] and [`state`] and does not depend on a host;
//! this file only adapts nih-plug's lifecycle onto it.

pub mod dsp;
pub mod params;
pub mod state;

use std::num::NonZeroU32;
use std::sync::Arc;

use dsp::ping_pong::{PingPongProcessor, NUM_CHANNELS};
use nih_plug::prelude::*;
use params::PluginParams;
use state::ParameterState;

/// The plugin as the host sees it.
///
/// `params` is shared with the host and the UI thread. `processor` is
/// owned by the audio thread: nih-plug only touches it from `initialize`,
/// `reset` and `process`, which never run concurrently.
pub struct TableTennisDelay {
    params: Arc<PluginParams>,
    processor: PingPongProcessor,
}

impl Default for TableTennisDelay {
    fn default() -> Self {
        // One state, written by the parameter callbacks and read by the
        // processor.
        let state = Arc::new(ParameterState::new());
        Self {
            params: Arc::new(PluginParams::new(Arc::clone(&state))),
            processor: PingPongProcessor::new(state),
        }
    }
}

impl Plugin for TableTennisDelay {
    const NAME: &'static str = "Table Tennis Delay";
    const VENDOR: &'static str = "Table Tennis Audio";
    const URL: &'static str = "";
    const EMAIL: &'static str = "";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    // Stereo only. The whole effect is about left/right interplay.
    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[AudioIOLayout {
        main_input_channels: NonZeroU32::new(2),
        main_output_channels: NonZeroU32::new(2),
        aux_input_ports: &[],
        aux_output_ports: &[],
        names: PortNames::const_default(),
    }];

    const MIDI_INPUT: MidiConfig = MidiConfig::None;

    // Parameters are picked up once per block, so there is no point in
    // having the wrapper split blocks at automation points.
    const SAMPLE_ACCURATE_AUTOMATION: bool = false;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    /// Stream negotiation. Sizes the delay lines for the 3 second maximum
    /// at this sample rate and the dry buffer for the largest block.
    fn initialize(
        &mut self,
        audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        _context: &mut impl InitContext<Self>,
    ) -> bool {
        let num_channels = audio_io_layout
            .main_output_channels
            .map(|c| c.get() as usize)
            .unwrap_or(NUM_CHANNELS);

        match self.processor.prepare(
            buffer_config.sample_rate,
            buffer_config.max_buffer_size as usize,
            num_channels,
        ) {
            Ok(()) => true,
            Err(err) => {
                nih_error!("cannot run with this stream configuration: {}", err);
                false
            }
        }
    }

    /// Playback stopped or the plugin was bypassed: drop all echoes and
    /// filter memory.
    fn reset(&mut self) {
        self.processor.reset();
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        _context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        // Cutoff and resonance come straight from the parameter store,
        // every block.
        let cutoff = self.params.cutoff.value();
        let resonance = self.params.resonance.value();

        let tail = self
            .processor
            .process(buffer.as_slice(), cutoff, resonance);

        ProcessStatus::Tail(tail)
    }
}

impl ClapPlugin for TableTennisDelay {
    const CLAP_ID: &'static str = "com.table-tennis-audio.table-tennis-delay";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("Stereo ping-pong delay with a resonant lowpass");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Stereo,
        ClapFeature::Delay,
        ClapFeature::Filter,
    ];
}

impl Vst3Plugin for TableTennisDelay {
    // `*b"..."` turns a 16-character ASCII literal into the `[u8; 16]`
    // class ID.
    const VST3_CLASS_ID: [u8; 16] = *b"TblTennisPingPng";

    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] = &[
        Vst3SubCategory::Fx,
        Vst3SubCategory::Delay,
        Vst3SubCategory::Stereo,
    ];
}

nih_export_clap!(TableTennisDelay);
nih_export_vst3!(TableTennisDelay);

// AUv2 entry point for Logic Pro, built on top of the CLAP export.
clap_wrapper::export_auv2!();
