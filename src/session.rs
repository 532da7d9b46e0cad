//! Listener session: one owned object holding every piece of runtime state.
//!
//! A session opens its data tables up front, waits for the first pointer press to start the
//! audio side, loads the clips in the background and builds the grid once they have all
//! resolved. Each subsystem fails on its own: a missing table leaves audio working and a
//! missing device leaves the spectrum working. Helper cues have their own player, so they
//! play before the grid exists and after it failed to build.

use std::path::PathBuf;

use crate::audio_engine::audio_stream::{OutputDevice, OutputFormat};
use crate::audio_engine::clip_bank::ClipBank;
use crate::audio_engine::constants::CANVAS_SIZE_PX;
use crate::audio_engine::cue_player::{CuePlayer, load_cues};
use crate::audio_engine::{AudioGridEngine, GainSettings, OutputTarget};
use crate::grid::{CellCoord, GridLayout};
use crate::interaction::{InteractionController, PointerEvent};
use crate::messages::CueKind;
use crate::spectrum_sync::{SpectrumPlot, SpectrumSync};
use crate::tables::{IntegratedSpectrum, PixelColorTable, SpectrumTable, TableError};

const PIXEL_TABLE_FILE: &str = "pixcols.csv";
const SPECTRUM_TABLE_FILE: &str = "spec.csv";
const INTEGRATED_SPECTRUM_FILE: &str = "intspec.csv";
const AUDIO_DIR: &str = "audio";

/// Where the session plays its audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// The host's default output device.
    Device,
    /// No device; blocks are pulled with [`Session::render_offline`].
    Offline(OutputFormat),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Directory holding the tables and the `audio/` clip directory.
    pub assets_dir: PathBuf,
    /// Grid side length; derived from the pixel table when `None`.
    pub n: Option<usize>,
    /// Cell size in pixels; `floor(400 / n)` when `None`.
    pub cell_size_px: Option<f64>,
    /// Top-left corner of the canvas in pointer coordinates.
    pub canvas_origin: (f64, f64),
    pub gains: GainSettings,
    pub helper_sounds: bool,
    pub output: OutputMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            assets_dir: PathBuf::from("static"),
            n: None,
            cell_size_px: None,
            canvas_origin: (0.0, 0.0),
            gains: GainSettings::default(),
            helper_sounds: false,
            output: OutputMode::Device,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Tables are loaded; audio waits for the first press.
    AwaitingGesture,
    /// Clips are loading in the background.
    LoadingClips,
    /// The audio grid is built and playing.
    Running,
    /// Audio could not be started; the spectrum keeps working.
    AudioUnavailable,
    /// The session was shut down and ignores further events.
    Closed,
}

enum CueState {
    /// Not started; the player is created on the first cue.
    Idle,
    Ready(CuePlayer),
    /// No output or no cue files; cues stay silent until shutdown.
    Unavailable,
}

pub struct Session<P> {
    config: SessionConfig,
    n: usize,
    state: SessionState,
    controller: InteractionController<P>,
    pixel_colors: Option<PixelColorTable>,
    integrated_spectrum: Option<IntegratedSpectrum>,
    bank: Option<ClipBank>,
    device: Option<OutputDevice>,
    helper_sounds: bool,
    cues: CueState,
}

impl<P: SpectrumPlot> Session<P> {
    /// Loads the data tables and prepares the controller.
    ///
    /// Only a grid size that cannot be determined is fatal; any other table failure is
    /// logged and the matching feature stays empty.
    pub fn open(config: SessionConfig, plot: P) -> Result<Self, TableError> {
        let pixel_path = config.assets_dir.join(PIXEL_TABLE_FILE);
        let pixel_colors = PixelColorTable::load(&pixel_path);

        let (n, pixel_colors) = match (config.n, pixel_colors) {
            (Some(n), Ok(table)) if table.n() != n => {
                log::error!(
                    "{} describes a {}x{} grid, session uses {}x{}",
                    pixel_path.display(),
                    table.n(),
                    table.n(),
                    n,
                    n
                );
                (n, None)
            }
            (Some(n), Ok(table)) => (n, Some(table)),
            (Some(n), Err(err)) => {
                log::error!("Failed to load {}: {}", pixel_path.display(), err);
                (n, None)
            }
            (None, Ok(table)) => (table.n(), Some(table)),
            (None, Err(err)) => return Err(err),
        };

        if n == 0 {
            return Err(TableError::Empty);
        }

        let spectrum_path = config.assets_dir.join(SPECTRUM_TABLE_FILE);
        let spectra = SpectrumTable::load(&spectrum_path, n)
            .inspect_err(|err| log::error!("Failed to load {}: {}", spectrum_path.display(), err))
            .ok();

        let integrated_path = config.assets_dir.join(INTEGRATED_SPECTRUM_FILE);
        let integrated_spectrum = IntegratedSpectrum::load(&integrated_path)
            .inspect_err(|err| log::error!("Failed to load {}: {}", integrated_path.display(), err))
            .ok();

        let cell_size = config
            .cell_size_px
            .unwrap_or_else(|| (CANVAS_SIZE_PX / n as f64).floor());
        let (left, top) = config.canvas_origin;
        let layout = GridLayout::from_top_left(left, top, cell_size, n);

        let engine = AudioGridEngine::new(n, config.gains);
        let controller =
            InteractionController::new(layout, engine, SpectrumSync::new(spectra, plot));
        let helper_sounds = config.helper_sounds;

        log::info!("Session opened: {n}x{n} grid, {cell_size} px cells");

        Ok(Self {
            config,
            n,
            state: SessionState::AwaitingGesture,
            controller,
            pixel_colors,
            integrated_spectrum,
            bank: None,
            device: None,
            helper_sounds,
            cues: CueState::Idle,
        })
    }

    /// Handles one pointer event. The first press also starts the audio side, entering or
    /// leaving the canvas plays the matching helper cue.
    pub fn handle(&mut self, event: PointerEvent) {
        match self.state {
            SessionState::Closed => return,
            SessionState::AwaitingGesture if matches!(event, PointerEvent::Down { .. }) => {
                self.begin_audio();
            }
            _ => {}
        }

        self.controller.handle(event);

        match event {
            PointerEvent::Enter => self.play_cue(CueKind::Enter),
            PointerEvent::Leave => self.play_cue(CueKind::Exit),
            _ => {}
        }
    }

    fn play_cue(&mut self, cue: CueKind) {
        if !self.helper_sounds {
            return;
        }

        if matches!(self.cues, CueState::Idle) {
            self.cues = self.start_cues();
        }

        if let CueState::Ready(player) = &mut self.cues {
            player.play(cue);
        }
    }

    fn start_cues(&self) -> CueState {
        let target = match self.config.output {
            OutputMode::Device => match OutputDevice::open_default() {
                Ok(device) => OutputTarget::Device(device),
                Err(err) => {
                    log::error!("Helper cues unavailable: {}", err);
                    return CueState::Unavailable;
                }
            },
            OutputMode::Offline(format) => OutputTarget::Offline(format),
        };

        let cues = load_cues(&self.config.assets_dir.join(AUDIO_DIR), target.format());
        if cues.iter().all(Option::is_none) {
            log::info!("No helper cues found, cues disabled");
            return CueState::Unavailable;
        }

        match CuePlayer::start(cues, target) {
            Ok(player) => CueState::Ready(player),
            Err(err) => {
                log::error!("Failed to start helper cues: {}", err);
                CueState::Unavailable
            }
        }
    }

    fn begin_audio(&mut self) {
        log::info!("User gesture received, starting audio");

        let format = match self.config.output {
            OutputMode::Device => match OutputDevice::open_default() {
                Ok(device) => {
                    let format = device.format();
                    self.device = Some(device);
                    format
                }
                Err(err) => {
                    log::error!("Audio unavailable: {}", err);
                    self.state = SessionState::AudioUnavailable;
                    return;
                }
            },
            OutputMode::Offline(format) => format,
        };

        let audio_dir = self.config.assets_dir.join(AUDIO_DIR);
        self.bank = Some(ClipBank::load_all_async(audio_dir, self.n, format));
        self.state = SessionState::LoadingClips;
    }

    /// Folds in loader progress and builds the grid once every clip has resolved.
    pub fn poll(&mut self) -> SessionState {
        if self.state != SessionState::LoadingClips {
            return self.state;
        }

        let Some(bank) = self.bank.as_mut() else {
            return self.state;
        };
        bank.poll();
        if !bank.is_ready() {
            return self.state;
        }

        let target = match self.device.take() {
            Some(device) => OutputTarget::Device(device),
            None => OutputTarget::Offline(bank.format()),
        };

        self.state = match self.controller.engine_mut().build(bank, target) {
            Ok(()) => SessionState::Running,
            Err(err) => {
                log::error!("Failed to build audio grid: {}", err);
                SessionState::AudioUnavailable
            }
        };

        self.state
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn layout(&self) -> &GridLayout {
        self.controller.layout()
    }

    pub fn pixel_colors(&self) -> Option<&PixelColorTable> {
        self.pixel_colors.as_ref()
    }

    pub fn spectrum_table(&self) -> Option<&SpectrumTable> {
        self.controller.spectrum().table()
    }

    pub fn integrated_spectrum(&self) -> Option<&IntegratedSpectrum> {
        self.integrated_spectrum.as_ref()
    }

    /// Fraction of clips resolved so far; 0 before loading starts.
    pub fn load_progress(&self) -> f32 {
        self.bank.as_ref().map_or(0.0, ClipBank::progress)
    }

    /// Cells whose clip failed to load and play silence instead.
    pub fn clip_failures(&self) -> &[(CellCoord, String)] {
        match self.bank.as_ref() {
            Some(bank) => bank.failures(),
            None => &[],
        }
    }

    pub fn set_volume_percent(&mut self, percent: f32) {
        self.controller.engine_mut().set_volume_percent(percent);
    }

    pub fn set_helper_sounds(&mut self, enabled: bool) {
        self.helper_sounds = enabled;
    }

    pub fn helper_sounds(&self) -> bool {
        self.helper_sounds
    }

    pub fn controller(&self) -> &InteractionController<P> {
        &self.controller
    }

    pub fn engine(&self) -> &AudioGridEngine {
        self.controller.engine()
    }

    /// Renders one block in [`OutputMode::Offline`]; `false` when nothing was rendered.
    pub fn render_offline(&mut self, output: &mut [f32]) -> bool {
        self.controller.engine_mut().render_offline(output)
    }

    /// Renders one block of helper cues in [`OutputMode::Offline`]; `false` when no cue player
    /// is running offline.
    pub fn render_cues_offline(&mut self, output: &mut [f32]) -> bool {
        match &mut self.cues {
            CueState::Ready(player) => player.render_offline(output),
            CueState::Idle | CueState::Unavailable => false,
        }
    }

    /// Stops audio and ignores every later event.
    pub fn shut_down(&mut self) {
        self.controller.engine_mut().shut_down();
        self.bank = None;
        self.device = None;
        self.cues = CueState::Idle;
        self.state = SessionState::Closed;
        log::info!("Session closed");
    }
}
