//! Audio Engine Module
//!
//! This module provides the real-time audio grid behind the listener canvas.
//! It is organized into sub-modules, each with a specific responsibility:
//!
//! - [`audio_stream`]: CPAL output device, stream management and the real-time renderer
//! - [`constants`]: Configuration constants and limits
//! - [`errors`]: Audio-specific error types
//! - [`clip_loader`]: Staged clip loading (fetch, decode, conform)
//! - [`conform`]: Resampling and channel mapping to the output format
//! - [`clip_bank`]: Bulk asynchronous loading of one clip per cell
//! - [`cell_channel`]: Looping per-cell playback with a smoothed gain
//! - [`cue_voice`]: One-shot helper cue voice
//! - [`cue_player`]: Helper cue loading and output, separate from the grid
//! - [`output_filter`]: Shared low-pass output stage
//! - [`mixer`]: Real-time mixing engine
//!
//! The main [`AudioGridEngine`] owns the control side: it tracks the active cell and the
//! pressed flag and turns pointer actions into gain ramps pushed to the audio thread.

use rtrb::{Producer, PushError, RingBuffer};

use crate::audio_engine::audio_stream::{
    AudioStreamHandle, BlockRenderer, GridRenderer, OutputDevice, OutputFormat,
};
use crate::audio_engine::clip_bank::ClipBank;
use crate::audio_engine::constants::{
    CONTROL_QUEUE_CAPACITY, DEFAULT_MAX_GAIN, DEFAULT_MIN_GAIN, FADE_TIME_CONSTANT_S, GAIN_MAX,
    GAIN_MIN, PREFADE_DELAY_S,
};
use crate::audio_engine::errors::EngineError;
use crate::audio_engine::mixer::GridMixer;
use crate::grid::CellIndex;
use crate::messages::ControlMessage;

pub mod audio_stream;
pub mod cell_channel;
pub mod clip_bank;
pub mod clip_loader;
pub mod conform;
pub mod constants;
pub mod cue_player;
pub mod cue_voice;
pub mod errors;
pub mod mixer;
pub mod output_filter;

/// Gain levels and ramp timing used for every crossfade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainSettings {
    /// Resting gain of every inactive channel.
    pub min_gain: f32,
    /// Gain the active channel is raised to.
    pub max_gain: f32,
    /// Exponential time constant of each ramp, in seconds.
    pub time_constant_s: f32,
    /// Delay before each ramp starts, in seconds.
    pub start_delay_s: f32,
}

impl Default for GainSettings {
    fn default() -> Self {
        Self {
            min_gain: DEFAULT_MIN_GAIN,
            max_gain: DEFAULT_MAX_GAIN,
            time_constant_s: FADE_TIME_CONSTANT_S,
            start_delay_s: PREFADE_DELAY_S,
        }
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() { value } else { fallback }
}

/// Where the built grid sends its audio.
pub enum OutputTarget {
    /// A running cpal stream on the given device.
    Device(OutputDevice),
    /// No device; blocks are rendered on demand with [`AudioGridEngine::render_offline`].
    Offline(OutputFormat),
}

impl OutputTarget {
    pub fn format(&self) -> OutputFormat {
        match self {
            OutputTarget::Device(device) => device.format(),
            OutputTarget::Offline(format) => *format,
        }
    }
}

enum GridOutput {
    Device(AudioStreamHandle),
    Offline(GridRenderer),
}

struct BuiltGrid {
    producer: Producer<ControlMessage>,
    output: GridOutput,
    /// Last target scheduled on each channel, mirrored on the control side.
    targets: Vec<f32>,
}

impl BuiltGrid {
    /// Queues `message` for the mixer. Returns `false` if it had to be dropped.
    ///
    /// Offline nothing drains the queue between renders, so a full queue is applied to the
    /// mixer first.
    fn push(&mut self, message: ControlMessage) -> bool {
        let Err(PushError::Full(message)) = self.producer.push(message) else {
            return true;
        };

        if let GridOutput::Offline(renderer) = &mut self.output {
            renderer.apply_pending();
            if self.producer.push(message).is_ok() {
                return true;
            }
        }

        log::warn!("Control queue full, dropping message");
        false
    }
}

/// Control side of the audio grid.
///
/// Before [`AudioGridEngine::build`] succeeds every pointer action is a no-op. After it, the
/// grid lives until [`AudioGridEngine::shut_down`]; channels are never rebuilt.
pub struct AudioGridEngine {
    n: usize,
    settings: GainSettings,
    active: Option<CellIndex>,
    pressed: bool,
    grid: Option<BuiltGrid>,
}

impl AudioGridEngine {
    pub fn new(n: usize, settings: GainSettings) -> Self {
        let min_gain = finite_or(settings.min_gain, DEFAULT_MIN_GAIN).clamp(GAIN_MIN, GAIN_MAX);
        let max_gain = finite_or(settings.max_gain, DEFAULT_MAX_GAIN).clamp(min_gain, GAIN_MAX);
        Self {
            n,
            settings: GainSettings {
                min_gain,
                max_gain,
                ..settings
            },
            active: None,
            pressed: false,
            grid: None,
        }
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn is_built(&self) -> bool {
        self.grid.is_some()
    }

    pub fn settings(&self) -> GainSettings {
        self.settings
    }

    /// Builds every cell channel and the output stage, then starts playback at `min_gain`.
    ///
    /// Fails without side effects if the grid already exists, the bank is still loading, or the
    /// bank was loaded for another grid size or output format.
    pub fn build(&mut self, bank: &ClipBank, target: OutputTarget) -> Result<(), EngineError> {
        if self.grid.is_some() {
            return Err(EngineError::AlreadyBuilt);
        }

        let expected = self.n * self.n;
        if bank.cell_count() != expected {
            return Err(EngineError::GridSizeMismatch {
                expected,
                found: bank.cell_count(),
            });
        }

        let Some(clips) = bank.clips_in_order() else {
            return Err(EngineError::ClipBankNotReady {
                resolved: bank.resolved(),
                total: bank.cell_count(),
            });
        };

        let format = target.format();
        if bank.format() != format {
            return Err(EngineError::FormatMismatch {
                bank_channels: bank.format().channels,
                bank_rate: bank.format().sample_rate,
                output_channels: format.channels,
                output_rate: format.sample_rate,
            });
        }

        let mixer = GridMixer::new(clips, format, self.settings.min_gain);
        let (producer, consumer) = RingBuffer::<ControlMessage>::new(CONTROL_QUEUE_CAPACITY);
        let renderer = GridRenderer::new(mixer, consumer);

        let output = match target {
            OutputTarget::Device(device) => GridOutput::Device(device.start(renderer)?),
            OutputTarget::Offline(_) => GridOutput::Offline(renderer),
        };

        log::info!(
            "Audio grid built: {} channels ({} silent)",
            expected,
            bank.failures().len()
        );

        self.grid = Some(BuiltGrid {
            producer,
            output,
            targets: vec![self.settings.min_gain; expected],
        });
        self.active = None;
        self.pressed = false;

        Ok(())
    }

    /// Schedules a ramp on one channel, keeping it within `[min_gain, max_gain]`.
    ///
    /// The mirrored target only changes once the mixer is certain to receive the ramp.
    fn ramp(&mut self, index: CellIndex, target: f32) {
        let GainSettings {
            min_gain,
            max_gain,
            start_delay_s,
            time_constant_s,
        } = self.settings;
        let target = target.clamp(min_gain, max_gain);
        let Some(grid) = self.grid.as_mut() else {
            return;
        };
        if index.get() >= grid.targets.len() {
            return;
        }

        let queued = grid.push(ControlMessage::RampGain {
            index: index.get(),
            target,
            start_delay_s,
            time_constant_s,
        });
        if queued {
            grid.targets[index.get()] = target;
        }
    }

    fn accepts(&self, index: CellIndex) -> bool {
        self.grid.is_some() && index.get() < self.n * self.n
    }

    /// Pointer pressed on `index`: the cell becomes active and ramps up to `max_gain`.
    pub fn press(&mut self, index: CellIndex) {
        if !self.accepts(index) {
            return;
        }

        let previous = self.active.filter(|previous| self.pressed && *previous != index);
        if let Some(previous) = previous {
            self.ramp(previous, self.settings.min_gain);
        }

        self.active = Some(index);
        self.pressed = true;
        self.ramp(index, self.settings.max_gain);
    }

    /// Pointer moved onto `index`. While pressed and on a new cell this crossfades from the
    /// active cell; otherwise nothing changes.
    pub fn drag_to(&mut self, index: CellIndex) {
        if !self.accepts(index) || !self.pressed || self.active == Some(index) {
            return;
        }

        if let Some(previous) = self.active {
            self.ramp(previous, self.settings.min_gain);
        }
        self.ramp(index, self.settings.max_gain);
        self.active = Some(index);
    }

    /// Pointer released or left the canvas: the active cell fades out, but stays active.
    pub fn release(&mut self) {
        if self.grid.is_none() || !self.pressed {
            return;
        }

        if let Some(active) = self.active {
            self.ramp(active, self.settings.min_gain);
        }
        self.pressed = false;
    }

    /// Sets the ceiling used by ramps scheduled from now on, clamped to `[min_gain, 1]`.
    ///
    /// Ramps already in flight keep their target.
    pub fn set_max_gain(&mut self, max_gain: f32) {
        if !max_gain.is_finite() {
            return;
        }

        self.settings.max_gain = max_gain.clamp(self.settings.min_gain, GAIN_MAX);
        log::debug!("Max gain set to {:.2}", self.settings.max_gain);
    }

    /// Maps a volume percentage (0..=100) linearly onto the max gain.
    pub fn set_volume_percent(&mut self, percent: f32) {
        if !percent.is_finite() {
            return;
        }

        self.set_max_gain((percent / 100.0).clamp(0.0, 1.0));
    }

    pub fn max_gain(&self) -> f32 {
        self.settings.max_gain
    }

    pub fn active_index(&self) -> Option<CellIndex> {
        self.active
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    /// The last gain target scheduled for `index`, or `None` before the grid is built.
    pub fn channel_target(&self, index: CellIndex) -> Option<f32> {
        self.grid.as_ref()?.targets.get(index.get()).copied()
    }

    pub fn output_format(&self) -> Option<OutputFormat> {
        let grid = self.grid.as_ref()?;
        Some(match &grid.output {
            GridOutput::Device(handle) => handle.format,
            GridOutput::Offline(renderer) => renderer.mixer().format(),
        })
    }

    /// Renders one interleaved block when the grid runs offline.
    ///
    /// Returns `false` (leaving `output` untouched) when not built or driven by a device.
    pub fn render_offline(&mut self, output: &mut [f32]) -> bool {
        match self.grid.as_mut().map(|grid| &mut grid.output) {
            Some(GridOutput::Offline(renderer)) => {
                renderer.render(output);
                true
            }
            _ => false,
        }
    }

    /// The offline mixer, for inspecting channel state.
    pub fn offline_mixer(&self) -> Option<&GridMixer> {
        match &self.grid.as_ref()?.output {
            GridOutput::Offline(renderer) => Some(renderer.mixer()),
            GridOutput::Device(_) => None,
        }
    }

    /// Tears the grid down. Dropping the stream handle stops audio.
    pub fn shut_down(&mut self) {
        if self.grid.take().is_some() {
            log::info!("Audio grid shut down");
        }
        self.active = None;
        self.pressed = false;
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::audio_engine::clip_bank::clip_path;
    use crate::audio_engine::clip_loader::tests::write_pcm16_wav;
    use crate::grid::CellCoord;

    const FORMAT: OutputFormat = OutputFormat {
        channels: 1,
        sample_rate: 8_000,
    };

    fn write_grid(dir: &Path, n: usize, skip: Option<CellCoord>) {
        for coord in CellCoord::all(n) {
            if Some(coord) == skip {
                continue;
            }
            write_pcm16_wav(&clip_path(dir, coord), 1, 8_000, &[16_384; 64]).unwrap();
        }
    }

    fn built_engine(n: usize, skip: Option<CellCoord>) -> AudioGridEngine {
        let tmp = tempfile::tempdir().unwrap();
        write_grid(tmp.path(), n, skip);
        let bank = ClipBank::load_all(tmp.path(), n, FORMAT);

        let mut engine = AudioGridEngine::new(n, GainSettings::default());
        engine.build(&bank, OutputTarget::Offline(FORMAT)).unwrap();
        engine
    }

    fn targets(engine: &AudioGridEngine) -> Vec<f32> {
        (0..engine.n() * engine.n())
            .map(|i| engine.channel_target(CellIndex(i)).unwrap())
            .collect()
    }

    fn render_seconds(engine: &mut AudioGridEngine, seconds: f32) -> Vec<f32> {
        let mut output = vec![0.0; (FORMAT.sample_rate as f32 * seconds) as usize];
        assert!(engine.render_offline(&mut output));
        output
    }

    #[test]
    fn test_actions_before_build_are_ignored() {
        let mut engine = AudioGridEngine::new(2, GainSettings::default());
        engine.press(CellIndex(1));
        engine.drag_to(CellIndex(2));
        engine.release();

        assert!(!engine.is_built());
        assert_eq!(engine.active_index(), None);
        assert!(!engine.is_pressed());
        assert_eq!(engine.channel_target(CellIndex(0)), None);
        assert!(!engine.render_offline(&mut [0.0; 16]));
    }

    #[test]
    fn test_build_starts_all_channels_at_min_gain() {
        let mut engine = built_engine(2, None);
        assert!(engine.is_built());
        assert_eq!(engine.output_format(), Some(FORMAT));
        assert_eq!(targets(&engine), vec![0.0; 4]);

        let output = render_seconds(&mut engine, 0.1);
        assert!(output.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_build_twice_fails() {
        let tmp = tempfile::tempdir().unwrap();
        write_grid(tmp.path(), 1, None);
        let bank = ClipBank::load_all(tmp.path(), 1, FORMAT);

        let mut engine = AudioGridEngine::new(1, GainSettings::default());
        engine.build(&bank, OutputTarget::Offline(FORMAT)).unwrap();
        assert!(matches!(
            engine.build(&bank, OutputTarget::Offline(FORMAT)),
            Err(EngineError::AlreadyBuilt)
        ));
    }

    #[test]
    fn test_build_rejects_mismatched_bank() {
        let tmp = tempfile::tempdir().unwrap();
        write_grid(tmp.path(), 2, None);
        let bank = ClipBank::load_all(tmp.path(), 2, FORMAT);

        let mut engine = AudioGridEngine::new(3, GainSettings::default());
        assert!(matches!(
            engine.build(&bank, OutputTarget::Offline(FORMAT)),
            Err(EngineError::GridSizeMismatch {
                expected: 9,
                found: 4
            })
        ));

        let mut engine = AudioGridEngine::new(2, GainSettings::default());
        let stereo = OutputFormat {
            channels: 2,
            sample_rate: 8_000,
        };
        assert!(matches!(
            engine.build(&bank, OutputTarget::Offline(stereo)),
            Err(EngineError::FormatMismatch { .. })
        ));
        assert!(!engine.is_built());
    }

    #[test]
    fn test_build_waits_for_loading_bank() {
        let tmp = tempfile::tempdir().unwrap();
        write_grid(tmp.path(), 2, None);
        let bank = ClipBank::load_all_async(tmp.path().to_path_buf(), 2, FORMAT);

        // nothing has been polled yet, so no cell is resolved
        let mut engine = AudioGridEngine::new(2, GainSettings::default());
        assert!(matches!(
            engine.build(&bank, OutputTarget::Offline(FORMAT)),
            Err(EngineError::ClipBankNotReady { total: 4, .. })
        ));
    }

    #[test]
    fn test_press_raises_only_the_pressed_cell() {
        let mut engine = built_engine(3, None);
        engine.press(CellIndex(4));

        assert_eq!(engine.active_index(), Some(CellIndex(4)));
        assert!(engine.is_pressed());
        let mut expected = vec![0.0; 9];
        expected[4] = 0.9;
        assert_eq!(targets(&engine), expected);
    }

    #[test]
    fn test_drag_crossfades_between_cells() {
        let mut engine = built_engine(3, None);
        engine.press(CellIndex(1));
        engine.drag_to(CellIndex(7));

        let mut expected = vec![0.0; 9];
        expected[7] = 0.9;
        assert_eq!(targets(&engine), expected);
        assert_eq!(engine.active_index(), Some(CellIndex(7)));

        let output = render_seconds(&mut engine, 0.5);
        let mixer = engine.offline_mixer().unwrap();
        assert_eq!(mixer.cell(7).unwrap().gain().value(), 0.9);
        assert_eq!(mixer.cell(1).unwrap().gain().value(), 0.0);
        assert!((output[output.len() - 1] - 0.45).abs() < 1e-3);
    }

    #[test]
    fn test_drag_within_same_cell_is_a_no_op() {
        let mut engine = built_engine(2, None);
        engine.press(CellIndex(2));
        let before = targets(&engine);

        engine.drag_to(CellIndex(2));
        assert_eq!(targets(&engine), before);
    }

    #[test]
    fn test_release_fades_out_and_hover_is_silent() {
        let mut engine = built_engine(2, None);
        engine.press(CellIndex(3));
        engine.release();

        assert!(!engine.is_pressed());
        assert_eq!(engine.active_index(), Some(CellIndex(3)));
        assert_eq!(targets(&engine), vec![0.0; 4]);

        engine.drag_to(CellIndex(0));
        assert_eq!(targets(&engine), vec![0.0; 4]);
        assert_eq!(engine.active_index(), Some(CellIndex(3)));

        let output = render_seconds(&mut engine, 0.5);
        assert!(output[output.len() - 1].abs() < 1e-3);
    }

    #[test]
    fn test_second_press_ramps_previous_cell_down() {
        let mut engine = built_engine(2, None);
        engine.press(CellIndex(0));
        engine.press(CellIndex(1));

        assert_eq!(targets(&engine), vec![0.0, 0.9, 0.0, 0.0]);
    }

    #[test]
    fn test_max_gain_is_not_retroactive() {
        let mut engine = built_engine(2, None);
        engine.press(CellIndex(0));
        engine.set_volume_percent(50.0);

        assert_eq!(engine.channel_target(CellIndex(0)), Some(0.9));
        assert_eq!(engine.max_gain(), 0.5);

        engine.drag_to(CellIndex(1));
        assert_eq!(engine.channel_target(CellIndex(1)), Some(0.5));
    }

    #[test]
    fn test_volume_percent_is_clamped() {
        let mut engine = AudioGridEngine::new(1, GainSettings::default());
        engine.set_volume_percent(250.0);
        assert_eq!(engine.max_gain(), 1.0);

        engine.set_volume_percent(-10.0);
        assert_eq!(engine.max_gain(), 0.0);

        engine.set_volume_percent(f32::NAN);
        assert_eq!(engine.max_gain(), 0.0);
    }

    #[test]
    fn test_failed_cell_is_silent_but_playable() {
        let missing = CellCoord::new(1, 0);
        let mut engine = built_engine(2, Some(missing));
        let index = missing.index(2).unwrap();

        engine.press(index);
        assert_eq!(engine.channel_target(index), Some(0.9));

        let output = render_seconds(&mut engine, 0.5);
        assert!(output.iter().all(|s| *s == 0.0));

        engine.drag_to(CellIndex(0));
        let output = render_seconds(&mut engine, 0.5);
        assert!((output[output.len() - 1] - 0.45).abs() < 1e-3);
    }

    #[test]
    fn test_mixer_follows_targets_past_queue_capacity() {
        let mut engine = built_engine(2, None);
        engine.press(CellIndex(0));
        for i in 0..CONTROL_QUEUE_CAPACITY + 1 {
            engine.drag_to(CellIndex((i + 1) % 2));
        }
        assert_eq!(engine.active_index(), Some(CellIndex(1)));

        let output = render_seconds(&mut engine, 0.5);
        let mixer = engine.offline_mixer().unwrap();
        for i in 0..4 {
            assert_eq!(
                mixer.cell(i).unwrap().gain().value(),
                engine.channel_target(CellIndex(i)).unwrap()
            );
        }
        assert_eq!(targets(&engine), vec![0.0, 0.9, 0.0, 0.0]);
        assert!((output[output.len() - 1] - 0.45).abs() < 1e-3);
    }

    #[test]
    fn test_ramps_stay_within_configured_bounds() {
        let tmp = tempfile::tempdir().unwrap();
        write_grid(tmp.path(), 1, None);
        let bank = ClipBank::load_all(tmp.path(), 1, FORMAT);

        let settings = GainSettings {
            min_gain: 0.2,
            ..GainSettings::default()
        };
        let mut engine = AudioGridEngine::new(1, settings);
        engine.build(&bank, OutputTarget::Offline(FORMAT)).unwrap();
        assert_eq!(engine.channel_target(CellIndex(0)), Some(0.2));

        engine.set_max_gain(0.1);
        assert_eq!(engine.max_gain(), 0.2);

        engine.press(CellIndex(0));
        assert_eq!(engine.channel_target(CellIndex(0)), Some(0.2));

        render_seconds(&mut engine, 0.5);
        let gain = engine.offline_mixer().unwrap().cell(0).unwrap().gain().value();
        assert_eq!(gain, 0.2);
    }

    #[test]
    fn test_out_of_range_index_is_ignored() {
        let mut engine = built_engine(2, None);
        engine.press(CellIndex(4));
        assert_eq!(engine.active_index(), None);
        assert!(!engine.is_pressed());
    }

    #[test]
    fn test_shut_down_resets_state() {
        let mut engine = built_engine(1, None);
        engine.press(CellIndex(0));
        engine.shut_down();

        assert!(!engine.is_built());
        assert!(!engine.is_pressed());
        assert_eq!(engine.active_index(), None);
    }
}
