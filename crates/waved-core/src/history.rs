//! Snapshot-based undo history

use std::collections::VecDeque;

use crate::buffer::SampleBuffer;

/// Stack of buffer snapshots, most recent last. There is no redo.
#[derive(Debug, Clone, Default)]
pub struct EditHistory {
    snapshots: VecDeque<SampleBuffer>,
    max_depth: Option<usize>,
}

impl EditHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// History that drops its oldest snapshot beyond `max_depth` entries
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            snapshots: VecDeque::new(),
            max_depth: Some(max_depth.max(1)),
        }
    }

    pub fn push(&mut self, snapshot: SampleBuffer) {
        if let Some(max) = self.max_depth {
            while self.snapshots.len() >= max {
                self.snapshots.pop_front();
            }
        }
        self.snapshots.push_back(snapshot);
    }

    pub fn pop(&mut self) -> Option<SampleBuffer> {
        self.snapshots.pop_back()
    }

    pub fn peek(&self) -> Option<&SampleBuffer> {
        self.snapshots.back()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }
}
