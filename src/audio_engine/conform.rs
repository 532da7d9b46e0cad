//! Conforms decoded clips to the output format: sample rate first, then channel layout.

use std::sync::Arc;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::audio_engine::audio_stream::OutputFormat;
use crate::audio_engine::clip_loader::DecodedClip;
use crate::audio_engine::errors::ClipLoadError;
use crate::messages::ClipBuffer;

/// Input chunk size fed to the sinc resampler.
const RESAMPLE_CHUNK_FRAMES: usize = 1024;

/// Resamples and channel-maps a decoded clip so the mixer can loop it without conversion.
pub fn conform_clip(
    decoded: DecodedClip,
    format: OutputFormat,
) -> Result<ClipBuffer, ClipLoadError> {
    let resampled = resample(
        decoded.samples,
        decoded.channels,
        decoded.sample_rate,
        format.sample_rate,
    )?;
    let mapped = map_channels(resampled, decoded.channels, format.channels)?;

    if mapped.is_empty() {
        return Err(ClipLoadError::EmptyClip);
    }

    Ok(ClipBuffer {
        channels: format.channels,
        samples: Arc::from(mapped.into_boxed_slice()),
    })
}

/// Maps audio samples from one channel configuration to another.
///
/// Currently supports:
/// - Mono (1 channel) → Stereo (2 channels): duplicates mono signal to both channels
/// - Stereo (2 channels) → Mono (1 channel): averages both channels
/// - Same channel count: no conversion needed
pub fn map_channels(
    samples: Vec<f32>,
    file_channels: usize,
    output_channels: usize,
) -> Result<Vec<f32>, ClipLoadError> {
    if file_channels == output_channels {
        return Ok(samples);
    }

    match (file_channels, output_channels) {
        (1, 2) => Ok(samples.into_iter().flat_map(|s| [s, s]).collect()),
        (2, 1) => Ok(samples
            .chunks_exact(2)
            .map(|frame| (frame[0] + frame[1]) * 0.5)
            .collect()),
        _ => Err(ClipLoadError::UnsupportedChannels {
            file_channels,
            output_channels,
        }),
    }
}

/// Converts interleaved samples from `from_hz` to `to_hz`.
///
/// The result holds exactly `round(frames * to_hz / from_hz)` frames with the resampler's
/// latency trimmed off the front, so loop points stay where the clip author put them.
pub fn resample(
    samples: Vec<f32>,
    channels: usize,
    from_hz: u32,
    to_hz: u32,
) -> Result<Vec<f32>, ClipLoadError> {
    if from_hz == to_hz || channels == 0 || samples.is_empty() || from_hz == 0 || to_hz == 0 {
        return Ok(samples);
    }

    let frames = samples.len() / channels;
    let planar = deinterleave(&samples, channels);
    let ratio = f64::from(to_hz) / f64::from(from_hz);
    let expected = (frames as f64 * ratio).round() as usize;

    let parameters = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler =
        SincFixedIn::<f32>::new(ratio, 1.0, parameters, RESAMPLE_CHUNK_FRAMES, channels)?;

    let delay = resampler.output_delay();
    let wanted = delay + expected;
    let mut out: Vec<Vec<f32>> = vec![Vec::with_capacity(wanted); channels];

    let mut pos = 0;
    while frames - pos >= resampler.input_frames_next() {
        let len = resampler.input_frames_next();
        let chunk: Vec<&[f32]> = planar.iter().map(|c| &c[pos..pos + len]).collect();
        append_planar(&mut out, resampler.process(&chunk, None)?);
        pos += len;
    }

    if pos < frames {
        let chunk: Vec<&[f32]> = planar.iter().map(|c| &c[pos..]).collect();
        append_planar(
            &mut out,
            resampler.process_partial(Some(chunk.as_slice()), None)?,
        );
    }

    // flush the filter tail until the delayed output is complete
    while out[0].len() < wanted {
        append_planar(
            &mut out,
            resampler.process_partial(None::<&[Vec<f32>]>, None)?,
        );
    }

    let trimmed: Vec<&[f32]> = out.iter().map(|c| &c[delay..wanted]).collect();
    Ok(interleave(&trimmed))
}

fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    (0..channels)
        .map(|channel| {
            samples
                .chunks_exact(channels)
                .map(|frame| frame[channel])
                .collect()
        })
        .collect()
}

fn interleave(planar: &[&[f32]]) -> Vec<f32> {
    let frames = planar.first().map_or(0, |c| c.len());
    let mut out = Vec::with_capacity(frames * planar.len());
    for frame in 0..frames {
        for channel in planar {
            out.push(channel[frame]);
        }
    }
    out
}

fn append_planar(out: &mut [Vec<f32>], block: Vec<Vec<f32>>) {
    for (channel, data) in out.iter_mut().zip(block) {
        channel.extend_from_slice(&data);
    }
}
