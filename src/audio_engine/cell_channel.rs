//! Per-cell playback unit: one endlessly looping clip routed through one gain.
//!
//! A [`CellChannel`] starts looping the moment it is created and never stops or restarts;
//! loudness is controlled exclusively through its [`CellGain`], so moving between cells never
//! retriggers a clip.

use crate::audio_engine::constants::{GAIN_MAX, GAIN_MIN, RAMP_SETTLE_EPSILON};
use crate::messages::ClipBuffer;

#[derive(Debug, Clone, Copy, PartialEq)]
struct GainRamp {
    target: f32,
    /// Per-frame smoothing factor `1 - e^(-1/τ)`.
    coeff: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingRamp {
    ramp: GainRamp,
    frames_until_start: u64,
}

/// Gain whose value is either constant or exponentially approaching a target.
///
/// A newly scheduled ramp always continues from the instantaneous value at its start frame,
/// so superseding a ramp midway never produces a jump.
#[derive(Debug, Clone, PartialEq)]
pub struct CellGain {
    value: f32,
    active: Option<GainRamp>,
    pending: Option<PendingRamp>,
}

impl CellGain {
    pub fn new(value: f32) -> Self {
        Self {
            value: value.clamp(GAIN_MIN, GAIN_MAX),
            active: None,
            pending: None,
        }
    }

    /// Instantaneous gain.
    pub fn value(&self) -> f32 {
        self.value
    }

    /// The value the gain is heading to once every scheduled ramp has played out.
    pub fn target(&self) -> f32 {
        if let Some(pending) = self.pending {
            return pending.ramp.target;
        }

        self.active.map_or(self.value, |ramp| ramp.target)
    }

    /// True when neither an active nor a pending ramp is left.
    pub fn is_idle(&self) -> bool {
        self.active.is_none() && self.pending.is_none()
    }

    /// Schedules an exponential approach to `target`.
    ///
    /// The ramp begins after `start_delay_frames` frames with a time constant of
    /// `time_constant_frames`; a non-positive time constant jumps straight to the target.
    /// A ramp that has not started yet is replaced, a running one keeps running until the
    /// new ramp takes over.
    ///
    /// `target` is only clamped to the absolute `[GAIN_MIN, GAIN_MAX]` range. Keeping it
    /// inside a grid's `[min_gain, max_gain]` is up to the caller; `AudioGridEngine` clamps
    /// every ramp it schedules.
    pub fn schedule(&mut self, target: f32, start_delay_frames: u64, time_constant_frames: f32) {
        if !target.is_finite() {
            return;
        }

        let coeff = if time_constant_frames.is_finite() && time_constant_frames > 0.0 {
            1.0 - (-1.0 / time_constant_frames).exp()
        } else {
            1.0
        };
        let ramp = GainRamp {
            target: target.clamp(GAIN_MIN, GAIN_MAX),
            coeff,
        };

        if start_delay_frames == 0 {
            self.active = Some(ramp);
            self.pending = None;
        } else {
            self.pending = Some(PendingRamp {
                ramp,
                frames_until_start: start_delay_frames,
            });
        }
    }

    /// Advances one frame and returns the gain for it.
    pub fn next(&mut self) -> f32 {
        if let Some(pending) = self.pending.as_mut() {
            if pending.frames_until_start == 0 {
                self.active = Some(pending.ramp);
                self.pending = None;
            } else {
                pending.frames_until_start -= 1;
            }
        }

        if let Some(ramp) = self.active {
            let next = self.value + (ramp.target - self.value) * ramp.coeff;
            // long time constants stall in f32 before reaching the epsilon
            if next == self.value || (ramp.target - next).abs() <= RAMP_SETTLE_EPSILON {
                self.value = ramp.target;
                self.active = None;
            } else {
                self.value = next;
            }
        }

        self.value
    }

    /// Advances `frames` frames without producing output.
    pub fn skip(&mut self, frames: usize) {
        if self.is_idle() {
            return;
        }

        for _ in 0..frames {
            let _ = self.next();
        }
    }
}

/// One looping clip and its gain.
#[derive(Debug, Clone)]
pub struct CellChannel {
    clip: ClipBuffer,
    frame_pos: usize,
    gain: CellGain,
}

impl CellChannel {
    /// Creates the channel and starts looping immediately at `initial_gain`.
    pub fn new(clip: ClipBuffer, initial_gain: f32) -> Self {
        Self {
            clip,
            frame_pos: 0,
            gain: CellGain::new(initial_gain),
        }
    }

    pub fn gain(&self) -> &CellGain {
        &self.gain
    }

    pub fn frame_pos(&self) -> usize {
        self.frame_pos
    }

    pub fn is_silent(&self) -> bool {
        self.clip.is_silent()
    }

    /// Re-targets the gain from its current instantaneous value.
    pub fn ramp_to(&mut self, target: f32, start_delay_frames: u64, time_constant_frames: f32) {
        self.gain.schedule(target, start_delay_frames, time_constant_frames);
    }

    /// Adds this channel's looped clip, scaled by its gain, into an interleaved block.
    ///
    /// The loop position advances even when the gain is resting at zero.
    pub fn mix_into(&mut self, output: &mut [f32], channels: usize) {
        let clip_frames = self.clip.frames();
        if channels == 0 || clip_frames == 0 {
            return;
        }

        let frames = output.len() / channels;
        if self.clip.channels != channels || (self.gain.is_idle() && self.gain.value() == 0.0) {
            self.frame_pos = (self.frame_pos + frames) % clip_frames;
            self.gain.skip(frames);
            return;
        }

        for frame in output.chunks_exact_mut(channels) {
            let gain = self.gain.next();
            let base = self.frame_pos * channels;
            for (out, sample) in frame.iter_mut().zip(&self.clip.samples[base..base + channels]) {
                *out += sample * gain;
            }

            self.frame_pos += 1;
            if self.frame_pos == clip_frames {
                self.frame_pos = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn constant_clip(channels: usize, frames: usize, value: f32) -> ClipBuffer {
        ClipBuffer {
            channels,
            samples: Arc::from(vec![value; channels * frames].into_boxed_slice()),
        }
    }

    #[test]
    fn test_gain_starts_constant() {
        let mut gain = CellGain::new(0.0);
        assert!(gain.is_idle());
        assert_eq!(gain.next(), 0.0);
        assert_eq!(gain.target(), 0.0);
    }

    #[test]
    fn test_gain_waits_for_start_delay() {
        let mut gain = CellGain::new(0.0);
        gain.schedule(0.9, 10, 5.0);

        for _ in 0..10 {
            assert_eq!(gain.next(), 0.0);
        }
        assert!(gain.next() > 0.0);
        assert_eq!(gain.target(), 0.9);
    }

    #[test]
    fn test_gain_approaches_target_exponentially() {
        let mut gain = CellGain::new(0.0);
        gain.schedule(1.0, 0, 100.0);

        let mut value = 0.0;
        for _ in 0..100 {
            value = gain.next();
        }
        // one time constant reaches 1 - 1/e of the distance
        assert!((value - (1.0 - (-1.0f32).exp())).abs() < 0.01);

        for _ in 0..5_000 {
            value = gain.next();
        }
        assert_eq!(value, 1.0);
        assert!(gain.is_idle());
    }

    #[test]
    fn test_gain_is_monotonic_and_bounded() {
        let mut gain = CellGain::new(0.2);
        gain.schedule(0.9, 0, 20.0);

        let mut previous = gain.value();
        for _ in 0..1_000 {
            let value = gain.next();
            assert!(value >= previous);
            assert!(value <= 0.9);
            previous = value;
        }
    }

    #[test]
    fn test_superseding_ramp_continues_from_current_value() {
        let mut gain = CellGain::new(0.0);
        gain.schedule(0.9, 0, 10.0);
        for _ in 0..10 {
            gain.next();
        }
        let midway = gain.value();
        assert!(midway > 0.3 && midway < 0.9);

        gain.schedule(0.0, 0, 10.0);
        let next = gain.next();
        // falls from the instantaneous value, no jump back to the old start or target
        assert!(next < midway);
        assert!(midway - next < 0.1);
    }

    #[test]
    fn test_pending_ramp_is_superseded_but_active_ramp_runs_on() {
        let mut gain = CellGain::new(0.0);
        gain.schedule(0.9, 0, 10.0);
        gain.schedule(0.0, 100, 10.0);
        gain.schedule(0.5, 5, 10.0);
        assert_eq!(gain.target(), 0.5);

        let mut values = Vec::new();
        for _ in 0..5 {
            values.push(gain.next());
        }
        // still rising towards 0.9 until the new ramp starts
        assert!(values.windows(2).all(|w| w[1] > w[0]));

        for _ in 0..5_000 {
            gain.next();
        }
        assert_eq!(gain.value(), 0.5);
    }

    #[test]
    fn test_gain_target_is_clamped() {
        let mut gain = CellGain::new(0.0);
        gain.schedule(4.0, 0, 0.0);
        assert_eq!(gain.next(), 1.0);

        gain.schedule(f32::NAN, 0, 0.0);
        assert_eq!(gain.target(), 1.0);
    }

    #[test]
    fn test_channel_loops_clip() {
        let clip = ClipBuffer {
            channels: 1,
            samples: Arc::from(vec![0.1, 0.2, 0.3].into_boxed_slice()),
        };
        let mut channel = CellChannel::new(clip, 1.0);

        let mut output = vec![0.0; 7];
        channel.mix_into(&mut output, 1);

        let expected = [0.1, 0.2, 0.3, 0.1, 0.2, 0.3, 0.1];
        assert!(output.iter().zip(expected).all(|(a, b)| (a - b).abs() < 1e-6));
        assert_eq!(channel.frame_pos(), 1);
    }

    #[test]
    fn test_silent_channel_keeps_loop_position() {
        let mut channel = CellChannel::new(constant_clip(2, 10, 0.5), 0.0);

        let mut output = vec![0.0; 2 * 14];
        channel.mix_into(&mut output, 2);

        assert!(output.iter().all(|s| *s == 0.0));
        assert_eq!(channel.frame_pos(), 4);
    }

    #[test]
    fn test_channel_mixes_additively() {
        let mut a = CellChannel::new(constant_clip(1, 4, 0.25), 1.0);
        let mut b = CellChannel::new(constant_clip(1, 4, 0.5), 0.5);

        let mut output = vec![0.0; 8];
        a.mix_into(&mut output, 1);
        b.mix_into(&mut output, 1);

        assert!(output.iter().all(|s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_ramp_on_silent_clip_stays_silent() {
        let mut channel = CellChannel::new(ClipBuffer::silent(1), 0.0);
        channel.ramp_to(0.9, 0, 1.0);

        let mut output = vec![0.0; 64];
        channel.mix_into(&mut output, 1);

        assert!(channel.is_silent());
        assert!(output.iter().all(|s| *s == 0.0));
        assert!(channel.gain().value() > 0.0);
    }
}
