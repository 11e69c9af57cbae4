//! Channel and sample-rate conversion for reconciling buffers of different formats

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::debug;

use crate::buffer::SampleBuffer;
use crate::error::{BufferError, Result};

/// Split interleaved samples into one Vec per channel
pub fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let channels = channels.max(1);
    let mut planes = vec![Vec::with_capacity(samples.len() / channels); channels];
    for frame in samples.chunks_exact(channels) {
        for (plane, &sample) in planes.iter_mut().zip(frame) {
            plane.push(sample);
        }
    }
    planes
}

/// Inverse of [`deinterleave`]. Planes are truncated to the shortest one.
pub fn interleave(planes: &[Vec<f32>]) -> Vec<f32> {
    let frames = planes.iter().map(Vec::len).min().unwrap_or(0);
    let mut out = Vec::with_capacity(frames * planes.len());
    for i in 0..frames {
        out.extend(planes.iter().map(|plane| plane[i]));
    }
    out
}

/// Mono planes become stereo by duplication, stereo becomes mono by averaging
fn remix(planes: Vec<Vec<f32>>, channels: usize) -> Vec<Vec<f32>> {
    match (planes.len(), channels) {
        (from, to) if from == to => planes,
        (1, 2) => vec![planes[0].clone(), planes[0].clone()],
        (2, 1) => vec![
            planes[0]
                .iter()
                .zip(&planes[1])
                .map(|(l, r)| (l + r) * 0.5)
                .collect(),
        ],
        _ => planes,
    }
}

/// Smallest chunk handed to the resampler; short clips are zero padded
const MIN_RESAMPLE_CHUNK: usize = 1024;

/// Upper bound on flush calls while draining the resampler's delay line
const MAX_FLUSH_CALLS: usize = 64;

/// Resample every plane to `to_rate`. Output is aligned with the input
/// (filter delay removed) and holds `ceil(frames * ratio)` frames.
fn resample(planes: &[Vec<f32>], from_rate: u32, to_rate: u32) -> Result<Vec<Vec<f32>>> {
    let frames = planes.first().map(Vec::len).unwrap_or(0);
    if from_rate == to_rate || frames == 0 {
        return Ok(planes.to_vec());
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let expected = (frames as f64 * ratio).ceil() as usize;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(
        ratio,
        2.0,
        params,
        frames.max(MIN_RESAMPLE_CHUNK),
        planes.len(),
    )
    .map_err(|e| BufferError::Resample(format!("init: {e}")))?;

    let delay = resampler.output_delay();
    let wanted = delay + expected;

    let mut out = resampler
        .process_partial(Some(planes), None)
        .map_err(|e| BufferError::Resample(e.to_string()))?;

    let mut flushes = 0;
    while out.first().map_or(0, Vec::len) < wanted && flushes < MAX_FLUSH_CALLS {
        let tail = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| BufferError::Resample(e.to_string()))?;
        for (plane, more) in out.iter_mut().zip(tail) {
            plane.extend(more);
        }
        flushes += 1;
    }

    for plane in &mut out {
        plane.drain(..delay.min(plane.len()));
        plane.truncate(expected);
    }
    Ok(out)
}

impl SampleBuffer {
    /// Copy of this buffer converted to `channels` and `sample_rate`.
    ///
    /// Returns a cheap clone when the format already matches.
    pub fn conformed_to(&self, channels: u16, sample_rate: u32) -> Result<SampleBuffer> {
        if self.channel_count() == channels && self.sample_rate() == sample_rate {
            return Ok(self.clone());
        }
        if !(1..=2).contains(&channels) {
            return Err(BufferError::UnsupportedChannelCount(channels));
        }
        debug!(
            from_channels = self.channel_count(),
            to_channels = channels,
            from_rate = self.sample_rate(),
            to_rate = sample_rate,
            "Conforming buffer format"
        );

        let planes = deinterleave(self.samples(), self.channel_count() as usize);
        let planes = remix(planes, channels as usize);
        let planes = resample(&planes, self.sample_rate(), sample_rate)?;
        SampleBuffer::from_interleaved(interleave(&planes), channels, sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_deinterleave_interleave() {
        let samples = vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
        let planes = deinterleave(&samples, 2);
        assert_eq!(planes, vec![vec![0.1, 0.3, 0.5], vec![0.2, 0.4, 0.6]]);
        assert_eq!(interleave(&planes), samples);
    }

    #[test]
    fn test_mono_to_stereo_duplicates() {
        let buffer = SampleBuffer::from_interleaved(vec![0.25, -0.5], 1, 44100).unwrap();
        let stereo = buffer.conformed_to(2, 44100).unwrap();
        assert_eq!(stereo.samples(), &[0.25, 0.25, -0.5, -0.5]);
        assert_eq!(stereo.frame_count(), 2);
    }

    #[test]
    fn test_stereo_to_mono_averages() {
        let buffer = SampleBuffer::from_interleaved(vec![1.0, 0.0, 0.5, -0.5], 2, 44100).unwrap();
        let mono = buffer.conformed_to(1, 44100).unwrap();
        assert_relative_eq!(mono.samples()[0], 0.5);
        assert_relative_eq!(mono.samples()[1], 0.0);
    }

    #[test]
    fn test_resample_length_and_alignment() {
        let buffer = SampleBuffer::from_interleaved(vec![0.5; 2000], 1, 44100).unwrap();
        let out = buffer.conformed_to(1, 48000).unwrap();
        assert_eq!(out.sample_rate(), 48000);

        let expected = (2000.0f64 * 48000.0 / 44100.0).ceil() as usize;
        assert!(out.frame_count().abs_diff(expected) <= 1, "got {}", out.frame_count());
        // Delay trimmed: the middle of the clip is the original level
        let mid = out.samples()[out.frame_count() / 2];
        assert_relative_eq!(mid, 0.5, epsilon = 0.01);
    }

    #[test]
    fn test_resample_keeps_short_clips() {
        let buffer = SampleBuffer::from_interleaved(vec![0.25; 16], 1, 44100).unwrap();
        let out = buffer.conformed_to(1, 8000).unwrap();
        assert_eq!(out.frame_count(), 3);

        let single = SampleBuffer::from_interleaved(vec![0.25, -0.25], 2, 44100).unwrap();
        let out = single.conformed_to(2, 8000).unwrap();
        assert_eq!(out.frame_count(), 1);
        assert_eq!(out.channel_count(), 2);
    }

    #[test]
    fn test_matching_format_is_identity() {
        let buffer = SampleBuffer::from_interleaved(vec![0.1, 0.2], 2, 48000).unwrap();
        assert_eq!(buffer.conformed_to(2, 48000).unwrap(), buffer);
        assert!(buffer.conformed_to(4, 48000).is_err());
    }
}
