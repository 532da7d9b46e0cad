//! Shared output stage: a Butterworth low-pass every cell channel is summed into.

use std::f32::consts::PI;

const BUTTERWORTH_Q: f32 = 0.70710677;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl BiquadCoeffs {
    fn identity() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    z1: f32,
    z2: f32,
}

fn biquad_process(coeffs: BiquadCoeffs, state: &mut BiquadState, x: f32) -> f32 {
    let y = coeffs.b0 * x + state.z1;
    state.z1 = coeffs.b1 * x - coeffs.a1 * y + state.z2;
    state.z2 = coeffs.b2 * x - coeffs.a2 * y;
    y
}

fn clamp_freq_hz(fs_hz: f32, freq_hz: f32) -> f32 {
    let nyquist = fs_hz * 0.5;
    let max_hz = (nyquist * 0.9).max(1.0);
    freq_hz.clamp(1.0, max_hz)
}

fn normalize_biquad(b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) -> BiquadCoeffs {
    if !a0.is_finite() || a0.abs() < 1e-12 {
        return BiquadCoeffs::identity();
    }

    let inv_a0 = 1.0 / a0;
    let coeffs = BiquadCoeffs {
        b0: b0 * inv_a0,
        b1: b1 * inv_a0,
        b2: b2 * inv_a0,
        a1: a1 * inv_a0,
        a2: a2 * inv_a0,
    };

    if [coeffs.b0, coeffs.b1, coeffs.b2, coeffs.a1, coeffs.a2]
        .iter()
        .all(|v| v.is_finite())
    {
        coeffs
    } else {
        BiquadCoeffs::identity()
    }
}

/// RBJ cookbook low-pass with Butterworth Q. Invalid rates yield a pass-through filter.
pub fn low_pass_coeffs(fs_hz: f32, cutoff_hz: f32) -> BiquadCoeffs {
    if !fs_hz.is_finite() || fs_hz <= 0.0 || !cutoff_hz.is_finite() {
        return BiquadCoeffs::identity();
    }

    let cutoff_hz = clamp_freq_hz(fs_hz, cutoff_hz);
    let w0 = 2.0 * PI * cutoff_hz / fs_hz;
    let cos_w0 = w0.cos();
    let alpha = w0.sin() / (2.0 * BUTTERWORTH_Q);

    let b0 = (1.0 - cos_w0) * 0.5;
    let b1 = 1.0 - cos_w0;
    let b2 = (1.0 - cos_w0) * 0.5;
    let a0 = 1.0 + alpha;
    let a1 = -2.0 * cos_w0;
    let a2 = 1.0 - alpha;

    normalize_biquad(b0, b1, b2, a0, a1, a2)
}

/// Low-pass filter applied in place to interleaved output blocks.
///
/// Coefficients are fixed at construction; only the per-channel delay state changes.
#[derive(Debug, Clone)]
pub struct OutputFilter {
    coeffs: BiquadCoeffs,
    states: Vec<BiquadState>,
}

impl OutputFilter {
    pub fn low_pass(channels: usize, sample_rate: u32, cutoff_hz: f32) -> Self {
        Self {
            coeffs: low_pass_coeffs(sample_rate as f32, cutoff_hz),
            states: vec![BiquadState::default(); channels],
        }
    }

    pub fn coeffs(&self) -> BiquadCoeffs {
        self.coeffs
    }

    pub fn process(&mut self, buffer: &mut [f32]) {
        let channels = self.states.len();
        if channels == 0 {
            return;
        }

        for frame in buffer.chunks_exact_mut(channels) {
            for (sample, state) in frame.iter_mut().zip(self.states.iter_mut()) {
                *sample = biquad_process(self.coeffs, state, *sample);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_pass_passes_dc() {
        let mut filter = OutputFilter::low_pass(1, 48_000, 4_000.0);
        let mut buffer = vec![0.5; 2_048];
        filter.process(&mut buffer);

        assert!((buffer[2_047] - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_low_pass_attenuates_nyquist() {
        let mut filter = OutputFilter::low_pass(1, 48_000, 4_000.0);
        let mut buffer: Vec<f32> = (0..2_048)
            .map(|i| if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        filter.process(&mut buffer);

        let tail_peak = buffer[1_024..].iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!(tail_peak < 0.01);
    }

    #[test]
    fn test_channels_are_filtered_independently() {
        let mut filter = OutputFilter::low_pass(2, 48_000, 4_000.0);
        let mut buffer: Vec<f32> = (0..1_024).flat_map(|_| [0.25, 0.0]).collect();
        filter.process(&mut buffer);

        assert!((buffer[2_046] - 0.25).abs() < 1e-4);
        assert!(buffer.iter().skip(1).step_by(2).all(|s| *s == 0.0));
    }

    #[test]
    fn test_cutoff_is_clamped_below_nyquist() {
        let coeffs = low_pass_coeffs(8_000.0, 20_000.0);
        assert!([coeffs.b0, coeffs.b1, coeffs.b2, coeffs.a1, coeffs.a2]
            .iter()
            .all(|v| v.is_finite()));
        assert_eq!(low_pass_coeffs(0.0, 4_000.0), BiquadCoeffs::identity());
    }
}
