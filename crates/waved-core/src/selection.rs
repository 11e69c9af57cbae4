//! Selection handed to the edit engine by the UI

use serde::{Deserialize, Serialize};

/// What the user has selected on the waveform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Selection {
    #[default]
    None,
    /// Zero-width insertion point
    Marker(u64),
    /// Half-open frame range, `start < end`
    Region { start: u64, end: u64 },
}

impl Selection {
    /// Selection between two frame positions given in either order.
    /// Equal positions make a marker.
    pub fn from_frames(a: u64, b: u64) -> Self {
        match a.cmp(&b) {
            std::cmp::Ordering::Equal => Selection::Marker(a),
            std::cmp::Ordering::Less => Selection::Region { start: a, end: b },
            std::cmp::Ordering::Greater => Selection::Region { start: b, end: a },
        }
    }

    /// Same as [`Selection::from_frames`] with positions in seconds
    pub fn from_times(a: f64, b: f64, sample_rate: u32) -> Self {
        let to_frame = |t: f64| (t * sample_rate as f64).floor().max(0.0) as u64;
        Self::from_frames(to_frame(a), to_frame(b))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Selection::None)
    }

    /// `(start, end)` of a region selection
    pub fn region(&self) -> Option<(u64, u64)> {
        match *self {
            Selection::Region { start, end } => Some((start, end)),
            _ => None,
        }
    }

    /// Frame where a paste lands: the marker, or the start of the region
    pub fn anchor(&self) -> Option<u64> {
        match *self {
            Selection::None => None,
            Selection::Marker(frame) => Some(frame),
            Selection::Region { start, .. } => Some(start),
        }
    }
}
