//! Single-slot clipboard for copied audio

use crate::buffer::SampleBuffer;

/// Holds the last copied or cut region. Its format is whatever the source
/// buffer had; paste reconciles formats.
#[derive(Debug, Clone, Default)]
pub struct Clipboard {
    contents: SampleBuffer,
}

impl Clipboard {
    pub fn store(&mut self, buffer: SampleBuffer) {
        self.contents = buffer;
    }

    pub fn contents(&self) -> &SampleBuffer {
        &self.contents
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}
