//! Helper cue playback, independent of the audio grid.
//!
//! The enter/exit cues are loaded on their own and play through their own output, so they are
//! available before the grid is built and stay available if it never is.

use std::path::Path;

use cpal::Sample;
use rtrb::{Consumer, Producer, RingBuffer};

use crate::audio_engine::OutputTarget;
use crate::audio_engine::audio_stream::{AudioStreamHandle, BlockRenderer, OutputFormat};
use crate::audio_engine::clip_loader::load_clip;
use crate::audio_engine::constants::{CUE_QUEUE_CAPACITY, NUM_CUES};
use crate::audio_engine::cue_voice::CueVoice;
use crate::audio_engine::errors::EngineError;
use crate::messages::{ClipBuffer, CueKind};

/// Loads `in.wav` and `out.wav` from `audio_dir`, indexed by cue slot.
///
/// A missing or broken file leaves that cue `None`.
pub fn load_cues(audio_dir: &Path, format: OutputFormat) -> [Option<ClipBuffer>; NUM_CUES] {
    CueKind::ALL.map(|cue| {
        let path = audio_dir.join(cue.file_name());
        if !path.exists() {
            log::debug!("No helper cue at {}", path.display());
            return None;
        }

        load_clip(&path, format)
            .inspect_err(|err| log::warn!("Helper cue {} unavailable: {}", path.display(), err))
            .ok()
    })
}

/// Real-time side of the cue player.
pub struct CueRenderer {
    voices: [CueVoice; NUM_CUES],
    channels: usize,
    consumer: Consumer<CueKind>,
}

impl BlockRenderer for CueRenderer {
    fn render(&mut self, output: &mut [f32]) {
        output.fill(Sample::EQUILIBRIUM);

        while let Ok(cue) = self.consumer.pop() {
            self.voices[cue.slot()].trigger();
        }

        for voice in &mut self.voices {
            voice.mix_into(output, self.channels);
        }
    }
}

enum CueOutput {
    Device(AudioStreamHandle),
    Offline(CueRenderer),
}

/// Control side of the cue player.
pub struct CuePlayer {
    producer: Producer<CueKind>,
    output: CueOutput,
    format: OutputFormat,
    available: [bool; NUM_CUES],
}

impl CuePlayer {
    /// Starts the cue output. `cues` must be conformed to the target's format.
    pub fn start(
        cues: [Option<ClipBuffer>; NUM_CUES],
        target: OutputTarget,
    ) -> Result<Self, EngineError> {
        let format = target.format();
        let available = cues.each_ref().map(Option::is_some);
        let (producer, consumer) = RingBuffer::<CueKind>::new(CUE_QUEUE_CAPACITY);
        let renderer = CueRenderer {
            voices: cues.map(CueVoice::new),
            channels: format.channels,
            consumer,
        };

        let output = match target {
            OutputTarget::Device(device) => CueOutput::Device(device.start(renderer)?),
            OutputTarget::Offline(_) => CueOutput::Offline(renderer),
        };

        Ok(Self {
            producer,
            output,
            format,
            available,
        })
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn has_cue(&self, cue: CueKind) -> bool {
        self.available[cue.slot()]
    }

    /// Plays `cue` once from its start. Unloaded cues are ignored.
    pub fn play(&mut self, cue: CueKind) {
        if !self.has_cue(cue) {
            return;
        }

        if self.producer.push(cue).is_err() {
            log::warn!("Cue queue full, dropping {:?} cue", cue);
        }
    }

    /// Renders one block when running offline; `false` when driven by a device.
    pub fn render_offline(&mut self, output: &mut [f32]) -> bool {
        match &mut self.output {
            CueOutput::Offline(renderer) => {
                renderer.render(output);
                true
            }
            CueOutput::Device(_) => false,
        }
    }
}
