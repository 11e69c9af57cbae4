//! waved-core: Sample buffer, edit engine and undo history for the waved editor

mod buffer;
mod clipboard;
pub mod convert;
mod edit;
mod error;
mod history;
mod selection;

pub use buffer::{BufferInfo, SampleBuffer, EMPTY_EXTREMA, MIN_NORMALIZE_PEAK};
pub use clipboard::Clipboard;
pub use edit::{EditAction, EditEngine, EditOutcome};
pub use error::{BufferError, InvalidRegion, Result};
pub use history::EditHistory;
pub use selection::Selection;
