//! Per-cell clip loading pipeline.
//!
//! Loading a clip runs three explicit stages, each with its own typed result:
//!
//! 1. [`fetch_clip`]: read the encoded bytes from disk
//! 2. [`decode_clip`]: decode them with Symphonia into interleaved `f32` samples
//! 3. [`conform_clip`]: resample and channel-map to the output format
//!
//! [`load_clip`] chains them and tags a failure with the stage it happened in, so the
//! clip bank can report exactly where a cell went wrong.

use std::fmt;
use std::io::Cursor;
use std::path::Path;

use symphonia::core::{
    audio::SampleBuffer as SymphoniaSampleBuffer, codecs::DecoderOptions,
    errors::Error as SymphoniaError, formats::FormatOptions, io::MediaSourceStream,
    meta::MetadataOptions, probe::Hint,
};
use symphonia::default::{get_codecs, get_probe};
use thiserror::Error;

use crate::audio_engine::audio_stream::OutputFormat;
use crate::audio_engine::conform::conform_clip;
use crate::audio_engine::errors::ClipLoadError;
use crate::messages::ClipBuffer;

/// Encoded clip bytes as read from disk.
#[derive(Debug, Clone)]
pub struct FetchedClip {
    pub bytes: Vec<u8>,
    pub extension: Option<String>,
}

/// Clip decoded into interleaved samples in its native format.
#[derive(Debug, Clone)]
pub struct DecodedClip {
    pub channels: usize,
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

/// Pipeline stage a clip load failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    Fetch,
    Decode,
    Conform,
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Fetch => "fetch",
            Self::Decode => "decode",
            Self::Conform => "conform",
        };
        f.write_str(label)
    }
}

/// A clip load failure tagged with its stage.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct StageError {
    pub stage: LoadStage,
    #[source]
    pub source: ClipLoadError,
}

impl StageError {
    fn at(stage: LoadStage) -> impl FnOnce(ClipLoadError) -> Self {
        move |source| Self { stage, source }
    }
}

/// Reads a clip file into memory.
pub fn fetch_clip(path: &Path) -> Result<FetchedClip, ClipLoadError> {
    let bytes = std::fs::read(path)?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_owned);

    Ok(FetchedClip { bytes, extension })
}

/// Decodes fetched bytes into interleaved `f32` samples.
///
/// # Errors
///
/// - Audio format not recognized or corrupted
/// - No default track, or a track without sample rate / channel information
/// - A clip without any frames
pub fn decode_clip(fetched: FetchedClip) -> Result<DecodedClip, ClipLoadError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(fetched.bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = fetched.extension.as_deref() {
        hint.with_extension(ext);
    }

    let probed = get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or(ClipLoadError::NoDefaultTrack)?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or(ClipLoadError::MissingSampleRate)?;
    let channels = track
        .codec_params
        .channels
        .ok_or(ClipLoadError::MissingChannels)?
        .count();

    let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(err) => return Err(ClipLoadError::Decode(err)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let audio_buf = decoder.decode(&packet)?;
        let spec = *audio_buf.spec();
        let duration = audio_buf.capacity() as u64;

        let mut sample_buf = SymphoniaSampleBuffer::<f32>::new(duration, spec);
        sample_buf.copy_interleaved_ref(audio_buf);
        samples.extend_from_slice(sample_buf.samples());
    }

    if samples.is_empty() {
        return Err(ClipLoadError::EmptyClip);
    }

    Ok(DecodedClip {
        channels,
        sample_rate,
        samples,
    })
}

/// Runs the full fetch → decode → conform pipeline for one clip.
pub fn load_clip(path: &Path, format: OutputFormat) -> Result<ClipBuffer, StageError> {
    let fetched = fetch_clip(path).map_err(StageError::at(LoadStage::Fetch))?;
    let decoded = decode_clip(fetched).map_err(StageError::at(LoadStage::Decode))?;
    conform_clip(decoded, format).map_err(StageError::at(LoadStage::Conform))
}
