//! Audio Stream Module
//!
//! This module handles CPAL audio stream management including:
//! - Output device discovery and format query
//! - The grid renderer that drains control messages and mixes a block
//! - Stream construction around any [`BlockRenderer`]
//! - Logger setup

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Stream, StreamConfig};
use env_logger::{Builder, Env};
use rtrb::Consumer;

use crate::audio_engine::constants::OUTPUT_BUFFER_FRAMES;
use crate::audio_engine::errors::EngineError;
use crate::audio_engine::mixer::GridMixer;
use crate::messages::ControlMessage;

/// Channel count and sample rate every clip is conformed to before playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    pub channels: usize,
    pub sample_rate: u32,
}

/// Real-time side of an output stream: fills one interleaved block per callback.
pub trait BlockRenderer: Send + 'static {
    fn render(&mut self, output: &mut [f32]);
}

/// Setup and configure the logger for audio operations
pub fn setup_logger() {
    // Users can override via `RUST_LOG`, e.g. `RUST_LOG=debug` when troubleshooting.
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .try_init()
        .unwrap_or(()); // Ignore initialization errors
}

/// Default output device together with the format it will be driven at.
pub struct OutputDevice {
    device: cpal::Device,
    format: OutputFormat,
}

impl OutputDevice {
    /// Opens the host's default output device and queries its default config.
    pub fn open_default() -> Result<Self, EngineError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(EngineError::NoOutputDevice)?;

        let config = device.default_output_config()?;
        let format = OutputFormat {
            channels: usize::from(config.channels()),
            sample_rate: config.sample_rate(),
        };

        Ok(Self { device, format })
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Builds the output stream around `renderer` and starts it.
    pub fn start<R: BlockRenderer>(self, mut renderer: R) -> Result<AudioStreamHandle, EngineError> {
        let format = self.format;

        log::info!(
            "Starting output stream... ({} ch@{} Hz)",
            format.channels,
            format.sample_rate
        );

        let stream_config = StreamConfig {
            channels: format.channels as u16,
            sample_rate: format.sample_rate,
            buffer_size: BufferSize::Fixed(OUTPUT_BUFFER_FRAMES),
        };

        let stream = self.device.build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                renderer.render(data);
            },
            |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )?;

        stream.play()?;

        Ok(AudioStreamHandle {
            _stream: stream,
            format,
        })
    }
}

/// Handle to a running output stream. Dropping it stops audio.
pub struct AudioStreamHandle {
    _stream: Stream,
    pub format: OutputFormat,
}

/// Real-time side of the grid: applies queued control messages, then renders.
///
/// Runs inside the CPAL callback, or is driven by hand for offline rendering.
pub struct GridRenderer {
    mixer: GridMixer,
    consumer: Consumer<ControlMessage>,
}

impl GridRenderer {
    pub fn new(mixer: GridMixer, consumer: Consumer<ControlMessage>) -> Self {
        Self { mixer, consumer }
    }

    /// Applies every queued message without rendering.
    pub fn apply_pending(&mut self) {
        while let Ok(message) = self.consumer.pop() {
            self.mixer.handle(message);
        }
    }

    pub fn mixer(&self) -> &GridMixer {
        &self.mixer
    }
}

impl BlockRenderer for GridRenderer {
    /// Renders one interleaved block, processing every message queued before it.
    fn render(&mut self, output: &mut [f32]) {
        self.apply_pending();
        self.mixer.render(output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_setup() {
        // Multiple calls should be safe (though only the first takes effect)
        setup_logger();
        setup_logger();
    }

    #[test]
    fn test_open_default_device() {
        // Actual stream creation requires audio hardware
        if cpal::default_host().default_output_device().is_none() {
            return;
        }

        if let Ok(device) = OutputDevice::open_default() {
            assert!(device.format().channels > 0);
            assert!(device.format().sample_rate > 0);
        }
    }
}
