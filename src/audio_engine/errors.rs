//! Audio-specific error types.

use thiserror::Error;

/// Errors that can occur while fetching, decoding or conforming a clip.
#[derive(Debug, Error)]
pub enum ClipLoadError {
    /// Failed to read the clip file.
    #[error("failed to fetch clip: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to decode the clip.
    #[error("failed to decode clip: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    /// Failed to create resampler.
    #[error("failed to create resampler: {0}")]
    ResamplerConstruction(#[from] rubato::ResamplerConstructionError),

    /// Failed to resample audio.
    #[error("failed to resample clip: {0}")]
    Resample(#[from] rubato::ResampleError),

    /// Clip has no default track.
    #[error("clip has no default track")]
    NoDefaultTrack,

    /// Clip is missing sample rate information.
    #[error("clip is missing a sample rate")]
    MissingSampleRate,

    /// Clip is missing channel information.
    #[error("clip is missing channel information")]
    MissingChannels,

    /// Clip decoded to zero frames and cannot loop.
    #[error("clip contains no audio frames")]
    EmptyClip,

    /// Unsupported channel mapping configuration.
    #[error(
        "unsupported channel mapping: clip has {file_channels} channels, output has {output_channels} channels (only mono↔stereo supported)"
    )]
    UnsupportedChannels {
        /// Number of channels in the source clip.
        file_channels: usize,
        /// Number of channels expected for output.
        output_channels: usize,
    },
}

/// Errors that can occur while building the audio grid.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The grid was already built; channels live for the whole session.
    #[error("audio grid already built")]
    AlreadyBuilt,

    /// The clip bank has not resolved every cell yet.
    #[error("clip bank is not ready ({resolved}/{total} cells resolved)")]
    ClipBankNotReady { resolved: usize, total: usize },

    /// The clip bank was loaded for a different grid size.
    #[error("clip bank holds {found} cells, engine expects {expected}")]
    GridSizeMismatch { expected: usize, found: usize },

    /// The clip bank was conformed to a different output format.
    #[error(
        "clip bank was conformed to {bank_channels} ch@{bank_rate} Hz, output is {output_channels} ch@{output_rate} Hz"
    )]
    FormatMismatch {
        bank_channels: usize,
        bank_rate: u32,
        output_channels: usize,
        output_rate: u32,
    },

    /// No output device available.
    #[error("no audio output device found")]
    NoOutputDevice,

    /// Failed to query the output device configuration.
    #[error("failed to query output config: {0}")]
    DeviceConfig(#[from] cpal::DefaultStreamConfigError),

    /// Failed to build the output stream.
    #[error("failed to build audio stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    /// Failed to start the output stream.
    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}
