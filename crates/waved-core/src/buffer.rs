//! Interleaved sample buffer with frame-indexed region editing

use std::ops::Range;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::error::{BufferError, InvalidRegion, Result};

/// Peak floor used by normalize so near-silent regions don't blow up
pub const MIN_NORMALIZE_PEAK: f32 = 0.0001;

/// `(max, min)` returned by [`SampleBuffer::sample_extrema`] when nothing was scanned
pub const EMPTY_EXTREMA: (f32, f32) = (-2.0, 2.0);

/// Summary of a buffer's format, for status displays
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BufferInfo {
    pub channels: u16,
    pub sample_rate: u32,
    pub frame_count: usize,
    pub duration_secs: f64,
}

/// Interleaved multi-channel audio.
///
/// Storage is shared copy-on-write, so `clone()` is cheap and yields an
/// independent value snapshot: the first mutation after a clone detaches
/// the mutated copy. Undo history and the playback thread both rely on this.
///
/// A default-constructed buffer is uninitialized (0 channels, 0 Hz) and
/// every operation on it is a no-op.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleBuffer {
    samples: Arc<Vec<f32>>,
    channels: u16,
    sample_rate: u32,
}

fn validate_format(channels: u16, sample_rate: u32) -> Result<()> {
    if !(1..=2).contains(&channels) {
        return Err(BufferError::UnsupportedChannelCount(channels));
    }
    if sample_rate == 0 {
        return Err(BufferError::InvalidSampleRate(sample_rate));
    }
    Ok(())
}

impl SampleBuffer {
    /// Empty buffer with the given format
    pub fn new(channels: u16, sample_rate: u32) -> Result<Self> {
        validate_format(channels, sample_rate)?;
        Ok(Self {
            samples: Arc::new(Vec::new()),
            channels,
            sample_rate,
        })
    }

    /// Buffer holding `samples`, which must be interleaved for `channels`
    pub fn from_interleaved(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Result<Self> {
        let mut buffer = Self::default();
        buffer.load(samples, channels, sample_rate)?;
        Ok(buffer)
    }

    /// Reset to zero frames with a new format
    pub fn init(&mut self, channels: u16, sample_rate: u32) -> Result<()> {
        *self = Self::new(channels, sample_rate)?;
        Ok(())
    }

    /// Replace the contents wholesale. The buffer is unchanged on error.
    pub fn load(&mut self, samples: Vec<f32>, channels: u16, sample_rate: u32) -> Result<()> {
        validate_format(channels, sample_rate)?;
        if samples.len() % channels as usize != 0 {
            return Err(BufferError::MisalignedSamples {
                len: samples.len(),
                channels,
            });
        }
        self.samples = Arc::new(samples);
        self.channels = channels;
        self.sample_rate = sample_rate;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn channel_count(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frame_count(&self) -> usize {
        match self.channels {
            0 => 0,
            ch => self.samples.len() / ch as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frame_count() == 0
    }

    pub fn is_stereo(&self) -> bool {
        self.channels == 2
    }

    /// Length in seconds
    pub fn duration(&self) -> f64 {
        self.time_at(self.frame_count() as u64)
    }

    /// Frame at `time` seconds (floored, negative times map to 0)
    pub fn frame_at(&self, time: f64) -> u64 {
        (time * self.sample_rate as f64).floor().max(0.0) as u64
    }

    /// Time in seconds of `frame`
    pub fn time_at(&self, frame: u64) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        frame as f64 / self.sample_rate as f64
    }

    pub fn info(&self) -> BufferInfo {
        BufferInfo {
            channels: self.channels,
            sample_rate: self.sample_rate,
            frame_count: self.frame_count(),
            duration_secs: self.duration(),
        }
    }

    /// Raw interleaved samples
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Shared handle to the current storage. Later edits to this buffer
    /// detach from it, so the handle stays frozen.
    pub fn shared_samples(&self) -> Arc<Vec<f32>> {
        Arc::clone(&self.samples)
    }

    /// Samples of one channel in frame order
    pub fn channel_iter(&self, channel: usize) -> impl Iterator<Item = f32> + '_ {
        let frames = if channel < self.channels as usize {
            self.frame_count()
        } else {
            0
        };
        self.samples
            .iter()
            .skip(channel)
            .step_by(self.channels.max(1) as usize)
            .take(frames)
            .copied()
    }

    // ------------------------------------------------------------------
    // Index arithmetic
    // ------------------------------------------------------------------

    /// Element offset of `frame` in the interleaved storage. Every
    /// frame-to-storage conversion goes through here.
    #[inline]
    fn raw_offset(&self, frame: usize) -> usize {
        frame * self.channels as usize
    }

    /// [`Self::raw_offset`] for frame positions that come from outside
    /// and may not fit in memory
    #[inline]
    fn checked_raw_offset(&self, frame: usize) -> Option<usize> {
        frame.checked_mul(self.channels as usize)
    }

    #[inline]
    fn raw_range(&self, frames: Range<usize>) -> Range<usize> {
        self.raw_offset(frames.start)..self.raw_offset(frames.end)
    }

    /// Clamp a frame position into `[0, frame_count]`
    fn limit_bounds(&self, frame: u64) -> usize {
        usize::try_from(frame)
            .unwrap_or(usize::MAX)
            .min(self.frame_count())
    }

    /// Validate and clamp `[start, end)`. Requires `start < end` before
    /// clamping and a non-empty range after it.
    pub fn region(&self, start: u64, end: u64) -> std::result::Result<Range<usize>, InvalidRegion> {
        let invalid = InvalidRegion {
            start,
            end,
            frame_count: self.frame_count(),
        };
        if start >= end {
            return Err(invalid);
        }
        let (start, end) = (self.limit_bounds(start), self.limit_bounds(end));
        if start == end {
            return Err(invalid);
        }
        Ok(start..end)
    }

    fn checked_region(&self, start: u64, end: u64) -> Option<Range<usize>> {
        self.region(start, end)
            .inspect_err(|err| trace!(%err, "region operation skipped"))
            .ok()
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Highest and lowest sample of `channel` over `[start, end)`, as
    /// `(max, min)`. A zero-width range scans one frame. Out-of-range
    /// indices are skipped; an empty scan yields [`EMPTY_EXTREMA`].
    pub fn sample_extrema(&self, channel: usize, start: u64, end: u64) -> (f32, f32) {
        if end < start || channel >= self.channels as usize {
            return EMPTY_EXTREMA;
        }
        let end = if start == end { end.saturating_add(1) } else { end };
        let end = self.limit_bounds(end);
        let start = self.limit_bounds(start);

        let (mut max, mut min) = EMPTY_EXTREMA;
        for frame in start..end {
            let Some(&sample) = self.samples.get(self.raw_offset(frame) + channel) else {
                continue;
            };
            max = max.max(sample);
            min = min.min(sample);
        }
        (max, min)
    }

    // ------------------------------------------------------------------
    // Region operations
    // ------------------------------------------------------------------

    /// Remove `[start, end)`. Returns false when the region is empty.
    pub fn delete_region(&mut self, start: u64, end: u64) -> bool {
        let Some(range) = self.checked_region(start, end) else {
            return false;
        };
        let raw = self.raw_range(range);
        Arc::make_mut(&mut self.samples).drain(raw);
        true
    }

    /// Append `num_frames` frames of silence to the end of the buffer.
    ///
    /// Only meaningful with `at == frame_count`; paste uses it to pad
    /// before an insert past the end. Returns false, leaving the buffer
    /// alone, when the padded length can't be represented or allocated.
    pub fn insert_silence(&mut self, _at: u64, num_frames: u64) -> bool {
        if self.channels == 0 {
            return false;
        }
        let extra = usize::try_from(num_frames)
            .ok()
            .and_then(|n| self.checked_raw_offset(n));
        let Some(new_len) = extra.and_then(|extra| self.samples.len().checked_add(extra)) else {
            warn!(num_frames, "silence padding too large");
            return false;
        };
        let samples = Arc::make_mut(&mut self.samples);
        if samples.try_reserve(new_len - samples.len()).is_err() {
            warn!(num_frames, "could not allocate silence padding");
            return false;
        }
        samples.resize(new_len, 0.0);
        true
    }

    /// Scale `[start, end)` so its loudest sample reaches unit amplitude.
    ///
    /// Gain comes from channel 0's peak and is applied to every channel.
    pub fn normalize_region(&mut self, start: u64, end: u64) -> bool {
        let (start, end) = (self.limit_bounds(start), self.limit_bounds(end));
        if start >= end {
            return false;
        }
        let (max, min) = self.sample_extrema(0, start as u64, end as u64);
        let peak = max.abs().max(min.abs()).max(MIN_NORMALIZE_PEAK);
        let gain = 1.0 / peak;

        for channel in 0..self.channels as usize {
            self.amplify_region(channel, start as u64, end as u64, gain);
        }
        true
    }

    /// Multiply one channel over `[start, end)` by `gain`
    pub fn amplify_region(&mut self, channel: usize, start: u64, end: u64, gain: f32) -> bool {
        if channel >= self.channels as usize {
            return false;
        }
        let Some(range) = self.checked_region(start, end) else {
            return false;
        };
        let channels = self.channels as usize;
        let raw = self.raw_range(range);
        let samples = Arc::make_mut(&mut self.samples);
        for sample in samples[raw].iter_mut().skip(channel).step_by(channels) {
            *sample *= gain;
        }
        true
    }

    /// Copy `[start, end)` into `out`, which takes this buffer's format
    pub fn copy_region(&self, start: u64, end: u64, out: &mut SampleBuffer) -> bool {
        let Some(range) = self.checked_region(start, end) else {
            return false;
        };
        *out = self.slice(range);
        true
    }

    /// Copy `[start, end)` into `out`, then remove it from this buffer
    pub fn cut_region(&mut self, start: u64, end: u64, out: &mut SampleBuffer) -> bool {
        let Some(range) = self.checked_region(start, end) else {
            return false;
        };
        *out = self.slice(range.clone());
        let raw = self.raw_range(range);
        Arc::make_mut(&mut self.samples).drain(raw);
        true
    }

    /// Insert `from` at frame `at`, padding with silence when `at` is past
    /// the end. Rejects a source with a different channel count.
    pub fn paste_from(&mut self, at: u64, from: &SampleBuffer) -> bool {
        if self.channels == 0 || from.is_empty() {
            return false;
        }
        if from.channels != self.channels {
            warn!(
                source = from.channels,
                target = self.channels,
                "paste rejected: channel count mismatch"
            );
            return false;
        }
        // Validate the whole insert before touching the storage
        let offset = usize::try_from(at)
            .ok()
            .and_then(|frame| self.checked_raw_offset(frame));
        let fits = offset.and_then(|offset| {
            offset
                .max(self.samples.len())
                .checked_add(from.samples.len())
        });
        let (Some(offset), Some(_)) = (offset, fits) else {
            warn!(at, "paste rejected: position out of range");
            return false;
        };

        let frame_count = self.frame_count();
        let at_frame = offset / self.channels as usize;
        if at_frame > frame_count
            && !self.insert_silence(frame_count as u64, (at_frame - frame_count) as u64)
        {
            return false;
        }
        Arc::make_mut(&mut self.samples).splice(offset..offset, from.samples.iter().copied());
        true
    }

    fn slice(&self, range: Range<usize>) -> SampleBuffer {
        SampleBuffer {
            samples: Arc::new(self.samples[self.raw_range(range)].to_vec()),
            channels: self.channels,
            sample_rate: self.sample_rate,
        }
    }
}
