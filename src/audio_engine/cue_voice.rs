//! One-shot helper cue playback.
//!
//! Cues are short fixed sounds played when the pointer enters or leaves the canvas. They
//! bypass the cell channels and the output filter entirely.

use crate::messages::ClipBuffer;

/// A single cue voice: plays its clip once per trigger, from the start.
#[derive(Debug, Clone)]
pub struct CueVoice {
    /// The cue clip, if one was loaded.
    clip: Option<ClipBuffer>,

    /// Current playback position in frames.
    frame_pos: usize,

    /// Whether the voice is currently sounding.
    active: bool,
}

impl CueVoice {
    pub fn new(clip: Option<ClipBuffer>) -> Self {
        Self {
            clip,
            frame_pos: 0,
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Restarts the cue from its first frame. Does nothing when no clip is loaded.
    pub fn trigger(&mut self) {
        if self.clip.is_none() {
            return;
        }

        self.frame_pos = 0;
        self.active = true;
    }

    /// Adds the remainder of the cue into an interleaved block.
    pub fn mix_into(&mut self, output: &mut [f32], channels: usize) {
        if !self.active {
            return;
        }

        let Some(clip) = self.clip.as_ref() else {
            self.active = false;
            return;
        };

        if channels == 0 || clip.channels != channels {
            self.active = false;
            return;
        }

        let clip_frames = clip.frames();
        for frame in output.chunks_exact_mut(channels) {
            if self.frame_pos >= clip_frames {
                self.active = false;
                return;
            }

            let base = self.frame_pos * channels;
            for (out, sample) in frame.iter_mut().zip(&clip.samples[base..base + channels]) {
                *out += sample;
            }
            self.frame_pos += 1;
        }

        if self.frame_pos >= clip_frames {
            self.active = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn clip(samples: Vec<f32>) -> ClipBuffer {
        ClipBuffer {
            channels: 1,
            samples: Arc::from(samples.into_boxed_slice()),
        }
    }

    #[test]
    fn test_cue_plays_once() {
        let mut voice = CueVoice::new(Some(clip(vec![0.5, 0.25])));
        voice.trigger();
        assert!(voice.is_active());

        let mut output = vec![0.0; 4];
        voice.mix_into(&mut output, 1);

        assert_eq!(output, vec![0.5, 0.25, 0.0, 0.0]);
        assert!(!voice.is_active());
    }

    #[test]
    fn test_cue_spans_blocks() {
        let mut voice = CueVoice::new(Some(clip(vec![0.1, 0.2, 0.3])));
        voice.trigger();

        let mut first = vec![0.0; 2];
        voice.mix_into(&mut first, 1);
        assert!(voice.is_active());

        let mut second = vec![0.0; 2];
        voice.mix_into(&mut second, 1);
        assert_eq!(second, vec![0.3, 0.0]);
        assert!(!voice.is_active());
    }

    #[test]
    fn test_retrigger_restarts() {
        let mut voice = CueVoice::new(Some(clip(vec![0.1, 0.2, 0.3])));
        voice.trigger();
        let mut block = vec![0.0; 2];
        voice.mix_into(&mut block, 1);

        voice.trigger();
        let mut block = vec![0.0; 1];
        voice.mix_into(&mut block, 1);
        assert_eq!(block, vec![0.1]);
    }

    #[test]
    fn test_missing_cue_never_activates() {
        let mut voice = CueVoice::new(None);
        voice.trigger();
        assert!(!voice.is_active());
    }
}
