//! Audio file decoding and encoding
//!
//! WAV goes through hound in both directions. MP3, Ogg Vorbis and FLAC are
//! decoded with symphonia; there is no encoder for the compressed formats.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use symphonia::core::audio::SampleBuffer as DecodeBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;
use tracing::{debug, info, warn};
use waved_core::{BufferError, BufferInfo, SampleBuffer};

/// Bit depth of written WAV files
pub const WAV_BITS_PER_SAMPLE: u16 = 24;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to decode {path}: {reason}")]
    Decode { path: String, reason: String },
    #[error("Unsupported channel count {channels} in {path} (only mono and stereo)")]
    UnsupportedChannels { path: String, channels: usize },
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("No encoder available for .{0} files")]
    EncoderUnavailable(String),
    #[error("Failed to encode {path}: {reason}")]
    Encode { path: String, reason: String },
    #[error("Invalid audio data: {0}")]
    Buffer(#[from] BufferError),
}

impl CodecError {
    fn decode(path: &Path, reason: impl ToString) -> Self {
        CodecError::Decode {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    fn encode(path: &Path, reason: impl ToString) -> Self {
        CodecError::Encode {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// True for errors raised while reading a file
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            CodecError::Decode { .. } | CodecError::UnsupportedChannels { .. } | CodecError::Buffer(_)
        )
    }
}

/// Decoded interleaved audio, not yet loaded into an editor buffer
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn into_buffer(self) -> Result<SampleBuffer, BufferError> {
        SampleBuffer::from_interleaved(self.samples, self.channels, self.sample_rate)
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Read an audio file, picking the decoder by extension
pub fn decode(path: impl AsRef<Path>) -> Result<DecodedAudio, CodecError> {
    let path = path.as_ref();
    let ext = extension(path);
    let decoded = match ext.as_str() {
        "wav" => decode_wav(path)?,
        "mp3" | "ogg" | "flac" => decode_compressed(path, &ext)?,
        _ => return Err(CodecError::UnsupportedFormat(ext)),
    };

    if !(1..=2).contains(&decoded.channels) {
        return Err(CodecError::UnsupportedChannels {
            path: path.display().to_string(),
            channels: decoded.channels as usize,
        });
    }

    info!(
        path = %path.display(),
        channels = decoded.channels,
        sample_rate = decoded.sample_rate,
        frames = decoded.samples.len() / decoded.channels as usize,
        "Decoded audio file"
    );
    Ok(decoded)
}

/// Decode `path` into `buffer`. The buffer is untouched on failure.
pub fn load_into(path: impl AsRef<Path>, buffer: &mut SampleBuffer) -> Result<BufferInfo, CodecError> {
    let decoded = decode(path)?;
    buffer.load(decoded.samples, decoded.channels, decoded.sample_rate)?;
    Ok(buffer.info())
}

fn decode_wav(path: &Path) -> Result<DecodedAudio, CodecError> {
    let reader = WavReader::open(path).map_err(|e| CodecError::decode(path, e))?;
    let spec = reader.spec();

    let samples = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<f32>, _>>()
            .map_err(|e| CodecError::decode(path, e))?,
        SampleFormat::Int => {
            let bits = spec.bits_per_sample.clamp(1, 32);
            let max_val = (1u64 << (bits - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<f32>, _>>()
                .map_err(|e| CodecError::decode(path, e))?
        }
    };

    Ok(DecodedAudio {
        samples,
        channels: spec.channels,
        sample_rate: spec.sample_rate,
    })
}

fn decode_compressed(path: &Path, ext: &str) -> Result<DecodedAudio, CodecError> {
    let file = File::open(path).map_err(|e| CodecError::decode(path, e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(ext);

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| CodecError::decode(path, e))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| CodecError::decode(path, "no supported audio tracks"))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count());

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| CodecError::decode(path, e))?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            // Chained streams are not followed
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(CodecError::decode(path, e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate.get_or_insert(spec.rate);
                channels.get_or_insert(spec.channels.count());
                let mut buf = DecodeBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                warn!(path = %path.display(), error = e, "Skipping corrupt packet");
            }
            Err(e) => return Err(CodecError::decode(path, e)),
        }
    }

    let sample_rate = sample_rate.ok_or_else(|| CodecError::decode(path, "unknown sample rate"))?;
    let channels = channels.ok_or_else(|| CodecError::decode(path, "unknown channel layout"))?;
    let channels = u16::try_from(channels).map_err(|_| CodecError::UnsupportedChannels {
        path: path.display().to_string(),
        channels,
    })?;

    Ok(DecodedAudio {
        samples,
        channels,
        sample_rate,
    })
}

/// Write `buffer` to `path`, picking the encoder by extension.
///
/// Data goes to a sibling temp file first and is renamed over `path` only
/// once complete.
pub fn encode(path: impl AsRef<Path>, buffer: &SampleBuffer) -> Result<(), CodecError> {
    let path = path.as_ref();
    let ext = extension(path);
    match ext.as_str() {
        "wav" => {}
        "mp3" | "ogg" => return Err(CodecError::EncoderUnavailable(ext)),
        _ => return Err(CodecError::UnsupportedFormat(ext)),
    }
    if buffer.channel_count() == 0 {
        return Err(CodecError::encode(path, "buffer is not initialized"));
    }

    let tmp = temp_path(path);
    if let Err(e) = write_wav(&tmp, buffer) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        CodecError::encode(path, e)
    })?;

    info!(
        path = %path.display(),
        frames = buffer.frame_count(),
        bits = WAV_BITS_PER_SAMPLE,
        "Saved audio file"
    );
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

fn write_wav(path: &Path, buffer: &SampleBuffer) -> Result<(), CodecError> {
    let spec = WavSpec {
        channels: buffer.channel_count(),
        sample_rate: buffer.sample_rate(),
        bits_per_sample: WAV_BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    };
    debug!(path = %path.display(), ?spec, "Writing WAV");

    let mut writer = WavWriter::create(path, spec).map_err(|e| CodecError::encode(path, e))?;
    let max_val = ((1i32 << (WAV_BITS_PER_SAMPLE - 1)) - 1) as f32;
    for &sample in buffer.samples() {
        let value = (sample.clamp(-1.0, 1.0) * max_val).round() as i32;
        writer
            .write_sample(value)
            .map_err(|e| CodecError::encode(path, e))?;
    }
    writer.finalize().map_err(|e| CodecError::encode(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use tempfile::tempdir;

    fn stereo_tone(frames: usize) -> SampleBuffer {
        let samples = (0..frames)
            .flat_map(|i| {
                let s = (i as f32 * 0.01).sin() * 0.8;
                [s, -s]
            })
            .collect();
        SampleBuffer::from_interleaved(samples, 2, 48000).unwrap()
    }

    #[test]
    fn test_wav_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let original = stereo_tone(1000);

        encode(&path, &original).unwrap();
        let decoded = decode(&path).unwrap();
        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.sample_rate, 48000);
        assert_eq!(decoded.samples.len(), original.samples().len());
        for (a, b) in decoded.samples.iter().zip(original.samples()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-5);
        }

        let spec = WavReader::open(&path).unwrap().spec();
        assert_eq!(spec.bits_per_sample, 24);
        assert!(!dir.path().join(".tone.wav.tmp").exists());
    }

    #[test]
    fn test_encode_clips_out_of_range() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hot.wav");
        let buffer = SampleBuffer::from_interleaved(vec![1.5, -3.0], 1, 8000).unwrap();
        encode(&path, &buffer).unwrap();

        let decoded = decode(&path).unwrap();
        assert_abs_diff_eq!(decoded.samples[0], 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(decoded.samples[1], -1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_decode_16_bit_int() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("int16.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for v in [0i16, 16384, -32768] {
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();

        let decoded = decode(&path).unwrap();
        assert_eq!(decoded.samples, vec![0.0, 0.5, -1.0]);
        assert_eq!(decoded.sample_rate, 22050);
    }

    #[test]
    fn test_decode_rejects_multichannel() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("quad.wav");
        let spec = WavSpec {
            channels: 4,
            sample_rate: 44100,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for _ in 0..8 {
            writer.write_sample(0.0f32).unwrap();
        }
        writer.finalize().unwrap();

        let err = decode(&path).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedChannels { channels: 4, .. }));
        assert!(err.is_decode_error());
    }

    #[test]
    fn test_encoder_selection_by_extension() {
        let dir = tempdir().unwrap();
        let buffer = stereo_tone(10);

        let err = encode(dir.path().join("out.mp3"), &buffer).unwrap_err();
        assert!(matches!(err, CodecError::EncoderUnavailable(ref e) if e == "mp3"));
        let err = encode(dir.path().join("out.OGG"), &buffer).unwrap_err();
        assert!(matches!(err, CodecError::EncoderUnavailable(ref e) if e == "ogg"));
        let err = encode(dir.path().join("out.aiff"), &buffer).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedFormat(_)));
        assert!(!err.is_decode_error());
    }

    #[test]
    fn test_failed_load_keeps_buffer() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.wav");
        fs::write(&path, b"not a wav file").unwrap();

        let mut buffer = stereo_tone(5);
        let before = buffer.clone();
        assert!(matches!(
            load_into(&path, &mut buffer),
            Err(CodecError::Decode { .. })
        ));
        assert_eq!(buffer, before);

        assert!(matches!(
            load_into(dir.path().join("missing.flac"), &mut buffer),
            Err(CodecError::Decode { .. })
        ));
        assert_eq!(buffer, before);
    }

    #[test]
    fn test_failed_save_keeps_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keep.wav");
        encode(&path, &stereo_tone(10)).unwrap();
        let before = fs::read(&path).unwrap();

        assert!(encode(&path, &SampleBuffer::default()).is_err());
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_load_into_reports_info() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("info.wav");
        encode(&path, &stereo_tone(480)).unwrap();

        let mut buffer = SampleBuffer::default();
        let info = load_into(&path, &mut buffer).unwrap();
        assert_eq!(info.frame_count, 480);
        assert_eq!(info.channels, 2);
        assert_abs_diff_eq!(info.duration_secs, 0.01);
    }
}
