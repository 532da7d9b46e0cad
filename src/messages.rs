//! Message definitions for communication between the control, loader and audio threads.
//!
//! [`ControlMessage`]s travel through the lock-free ring buffer from the control thread into
//! the real-time grid callback, and [`CueKind`]s travel the same way into the cue callback.
//! [`LoaderEvent`]s travel from the background clip loader back to the control thread.

use std::sync::Arc;

use crate::grid::CellCoord;

/// Decoded, immutable audio clip conformed to the output format.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipBuffer {
    pub channels: usize,
    pub samples: Arc<[f32]>,
}

impl ClipBuffer {
    /// One frame of silence, used in place of clips that failed to load.
    pub fn silent(channels: usize) -> Self {
        Self {
            channels,
            samples: Arc::from(vec![0.0; channels.max(1)].into_boxed_slice()),
        }
    }

    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels
    }

    pub fn is_silent(&self) -> bool {
        self.samples.iter().all(|s| *s == 0.0)
    }
}

/// Fixed one-shot cues played when the pointer enters or leaves the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CueKind {
    Enter,
    Exit,
}

impl CueKind {
    pub const ALL: [CueKind; 2] = [CueKind::Enter, CueKind::Exit];

    pub fn file_name(self) -> &'static str {
        match self {
            CueKind::Enter => "in.wav",
            CueKind::Exit => "out.wav",
        }
    }

    pub(crate) fn slot(self) -> usize {
        match self {
            CueKind::Enter => 0,
            CueKind::Exit => 1,
        }
    }
}

/// Message that is emitted from the control thread.
#[derive(Debug, Clone)]
pub enum ControlMessage {
    /// Approach `target` exponentially, starting after `start_delay_s`, with time constant
    /// `time_constant_s`. Supersedes any ramp on the same cell that has not started yet.
    ///
    /// # Parameters
    /// * `index` - Linear cell index
    /// * `target` - Target gain (0.0 to 1.0)
    RampGain {
        index: usize,
        target: f32,
        start_delay_s: f32,
        time_constant_s: f32,
    },
}

/// Events emitted from the background clip loader.
#[derive(Debug, Clone, PartialEq)]
pub enum LoaderEvent {
    /// Loading started for a grid of `total` cells.
    Started { total: usize },

    /// A throttled progress update: fraction of cells resolved (0.0..=1.0).
    Progress { percent: f32 },

    /// One cell's clip was fetched, decoded and conformed.
    CellLoaded { coord: CellCoord, clip: ClipBuffer },

    /// One cell's clip failed at some stage; the bank substitutes silence.
    CellFailed { coord: CellCoord, error: String },

    /// Every cell has been resolved.
    Finished { failed: usize },
}
