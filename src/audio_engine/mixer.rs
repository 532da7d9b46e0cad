//! Real-time grid mixer.
//!
//! This module provides the [`GridMixer`] which sums every [`CellChannel`] of the grid through
//! the shared [`OutputFilter`]. It only ever receives scheduled values through
//! [`ControlMessage`]s; nothing on the control side reads its state while a stream is running.

use cpal::Sample;

use crate::audio_engine::audio_stream::OutputFormat;
use crate::audio_engine::cell_channel::CellChannel;
use crate::audio_engine::constants::OUTPUT_LOWPASS_HZ;
use crate::audio_engine::output_filter::OutputFilter;
use crate::messages::{ClipBuffer, ControlMessage};

/// Real-time mixer holding the complete grid.
///
/// All cell channels are created once in [`GridMixer::new`] and loop for the lifetime of the
/// mixer; there is no way to stop or remove one.
pub struct GridMixer {
    /// Output format every clip was conformed to.
    format: OutputFormat,

    /// One channel per cell, in cell index order.
    cells: Vec<CellChannel>,

    /// Shared low-pass the cell sum passes through.
    filter: OutputFilter,
}

impl GridMixer {
    /// Creates a mixer that immediately loops every clip at `initial_gain`.
    ///
    /// `clips` holds one clip per cell in index order, conformed to `format`.
    pub fn new(clips: Vec<ClipBuffer>, format: OutputFormat, initial_gain: f32) -> Self {
        let cells = clips
            .into_iter()
            .map(|clip| CellChannel::new(clip, initial_gain))
            .collect();

        Self {
            format,
            cells,
            filter: OutputFilter::low_pass(format.channels, format.sample_rate, OUTPUT_LOWPASS_HZ),
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn cell(&self, index: usize) -> Option<&CellChannel> {
        self.cells.get(index)
    }

    /// Applies one control message.
    pub fn handle(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::RampGain {
                index,
                target,
                start_delay_s,
                time_constant_s,
            } => self.ramp_cell(index, target, start_delay_s, time_constant_s),
        }
    }

    /// Schedules a gain ramp on one cell, converting seconds to frames.
    ///
    /// Invalid indices are silently ignored.
    pub fn ramp_cell(&mut self, index: usize, target: f32, start_delay_s: f32, time_constant_s: f32) {
        let sample_rate = self.format.sample_rate as f32;
        let Some(cell) = self.cells.get_mut(index) else {
            return;
        };

        let start_delay_frames = if start_delay_s.is_finite() && start_delay_s > 0.0 {
            (start_delay_s * sample_rate).round() as u64
        } else {
            0
        };

        cell.ramp_to(target, start_delay_frames, time_constant_s * sample_rate);
    }

    /// Renders audio frames to the output buffer.
    ///
    /// The output buffer must contain interleaved samples with the mixer's channel count.
    pub fn render(&mut self, output: &mut [f32]) {
        output.fill(Sample::EQUILIBRIUM);

        let channels = self.format.channels;
        if channels == 0 || output.len() < channels {
            return;
        }

        for cell in &mut self.cells {
            cell.mix_into(output, channels);
        }

        self.filter.process(output);
    }
}
