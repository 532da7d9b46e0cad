//! Audio engine configuration constants and limits.

/// Lowest gain a cell channel may be ramped to.
pub const GAIN_MIN: f32 = 0.0;

/// Highest gain a cell channel may be ramped to.
pub const GAIN_MAX: f32 = 1.0;

/// Ambient gain of cells that are not selected.
pub const DEFAULT_MIN_GAIN: f32 = 0.0;

/// Gain of the selected cell (user-adjustable through the volume control).
pub const DEFAULT_MAX_GAIN: f32 = 0.9;

/// Characteristic time of the exponential gain approach, in seconds.
pub const FADE_TIME_CONSTANT_S: f32 = 0.03;

/// Delay between scheduling a ramp and the ramp starting, in seconds.
pub const PREFADE_DELAY_S: f32 = 0.03;

/// Once a ramp is this close to its target the gain snaps onto it.
pub const RAMP_SETTLE_EPSILON: f32 = 1.0e-5;

/// Cutoff of the shared output low-pass filter.
pub const OUTPUT_LOWPASS_HZ: f32 = 4_000.0;

/// Side length of the listener canvas in pixels; cells are `CANVAS_SIZE_PX / n` wide.
pub const CANVAS_SIZE_PX: f64 = 400.0;

/// Capacity of the control -> audio ring buffer.
///
/// Each pointer move between cells pushes two messages.
pub const CONTROL_QUEUE_CAPACITY: usize = 4_096;

/// Number of frames requested per output callback.
pub const OUTPUT_BUFFER_FRAMES: u32 = 512;

/// Number of one-shot helper cue voices.
pub const NUM_CUES: usize = 2;

/// Minimum interval between two loader progress events, in milliseconds.
pub const PROGRESS_MIN_INTERVAL_MS: u64 = 100;

/// Capacity of the control -> cue player ring buffer.
pub const CUE_QUEUE_CAPACITY: usize = 16;
