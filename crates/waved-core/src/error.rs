//! Error types for waved-core

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BufferError {
    #[error("Unsupported channel count: {0} (only mono and stereo are supported)")]
    UnsupportedChannelCount(u16),
    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),
    #[error("{len} samples do not divide into {channels} channels")]
    MisalignedSamples { len: usize, channels: u16 },
    #[error("Resample error: {0}")]
    Resample(String),
}

/// A frame range that is empty after clamping, or was given backwards.
///
/// Region operations degrade to a no-op when they hit this; it never
/// propagates out of the buffer API.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Invalid region [{start}, {end}) for a buffer of {frame_count} frames")]
pub struct InvalidRegion {
    pub start: u64,
    pub end: u64,
    pub frame_count: usize,
}

pub type Result<T> = std::result::Result<T, BufferError>;
