//! Edit engine: region operations with undo snapshots and a clipboard

use std::fmt;

use tracing::{debug, warn};

use crate::buffer::SampleBuffer;
use crate::clipboard::Clipboard;
use crate::error::Result;
use crate::history::EditHistory;
use crate::selection::Selection;

/// User-facing edit commands
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EditAction {
    Delete,
    Copy,
    Cut,
    Paste,
    Trim,
    Normalize,
    Amplify(f32),
}

impl fmt::Display for EditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditAction::Delete => write!(f, "Delete"),
            EditAction::Copy => write!(f, "Copy"),
            EditAction::Cut => write!(f, "Cut"),
            EditAction::Paste => write!(f, "Paste"),
            EditAction::Trim => write!(f, "Trim"),
            EditAction::Normalize => write!(f, "Normalize"),
            EditAction::Amplify(gain) => write!(f, "Amplify x{gain}"),
        }
    }
}

/// What an edit did, so the UI knows what to refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EditOutcome {
    /// The buffer or clipboard changed
    pub applied: bool,
    /// The document now has unsaved changes
    pub dirty: bool,
    /// The selection was reset to `Selection::None`
    pub selection_cleared: bool,
}

impl EditOutcome {
    pub fn skipped() -> Self {
        Self::default()
    }
}

/// Owns the live buffer and everything edits touch.
///
/// Every mutating edit snapshots the buffer into the history before it
/// changes anything. An edit that turns out to be a no-op leaves no
/// snapshot behind.
#[derive(Debug, Clone, Default)]
pub struct EditEngine {
    buffer: SampleBuffer,
    history: EditHistory,
    clipboard: Clipboard,
    selection: Selection,
    dirty: bool,
}

impl EditEngine {
    /// Engine with an empty buffer in the given format
    pub fn new(channels: u16, sample_rate: u32) -> Result<Self> {
        Ok(Self::with_buffer(SampleBuffer::new(channels, sample_rate)?))
    }

    pub fn with_buffer(buffer: SampleBuffer) -> Self {
        Self {
            buffer,
            ..Default::default()
        }
    }

    pub fn with_history(mut self, history: EditHistory) -> Self {
        self.history = history;
        self
    }

    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    pub fn history(&self) -> &EditHistory {
        &self.history
    }

    pub fn clipboard(&self) -> &Clipboard {
        &self.clipboard
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = selection;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clear the unsaved-changes flag after a successful save
    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    /// Swap in a whole new document (New / Open). History, selection and
    /// the dirty flag start over; the clipboard survives.
    pub fn replace_buffer(&mut self, buffer: SampleBuffer) {
        self.buffer = buffer;
        self.history.clear();
        self.selection = Selection::None;
        self.dirty = false;
    }

    /// Replace the document with an empty buffer
    pub fn reset(&mut self, channels: u16, sample_rate: u32) -> Result<()> {
        self.replace_buffer(SampleBuffer::new(channels, sample_rate)?);
        Ok(())
    }

    pub fn delete(&mut self) -> EditOutcome {
        self.perform(EditAction::Delete)
    }

    pub fn copy(&mut self) -> EditOutcome {
        self.perform(EditAction::Copy)
    }

    pub fn cut(&mut self) -> EditOutcome {
        self.perform(EditAction::Cut)
    }

    pub fn paste(&mut self) -> EditOutcome {
        self.perform(EditAction::Paste)
    }

    pub fn trim(&mut self) -> EditOutcome {
        self.perform(EditAction::Trim)
    }

    pub fn normalize(&mut self) -> EditOutcome {
        self.perform(EditAction::Normalize)
    }

    pub fn amplify(&mut self, gain: f32) -> EditOutcome {
        self.perform(EditAction::Amplify(gain))
    }

    /// Run one edit against the current selection
    pub fn perform(&mut self, action: EditAction) -> EditOutcome {
        let selection = self.selection;
        let whole = (0, self.buffer.frame_count() as u64);

        let outcome = match (action, selection) {
            (EditAction::Copy, Selection::Region { start, end }) => {
                let mut clip = SampleBuffer::default();
                if self.buffer.copy_region(start, end, &mut clip) {
                    self.clipboard.store(clip);
                    EditOutcome {
                        applied: true,
                        dirty: self.dirty,
                        selection_cleared: false,
                    }
                } else {
                    EditOutcome::skipped()
                }
            }
            (EditAction::Delete, Selection::Region { start, end }) => {
                self.mutate(true, |buffer, _| buffer.delete_region(start, end))
            }
            (EditAction::Cut, Selection::Region { start, end }) => {
                self.mutate(true, |buffer, clipboard| {
                    let mut clip = SampleBuffer::default();
                    let cut = buffer.cut_region(start, end, &mut clip);
                    if cut {
                        clipboard.store(clip);
                    }
                    cut
                })
            }
            (EditAction::Paste, selection) => match (selection.anchor(), self.conformed_clip()) {
                (Some(at), Some(clip)) => {
                    // Pasting over a region replaces it; a marker just inserts
                    let region = selection.region();
                    self.mutate(region.is_some(), |buffer, _| {
                        let deleted = region.is_some_and(|(start, end)| buffer.delete_region(start, end));
                        let pasted = buffer.paste_from(at, &clip);
                        deleted | pasted
                    })
                }
                _ => EditOutcome::skipped(),
            },
            (EditAction::Trim, Selection::Region { start, end }) => {
                self.mutate(true, |buffer, _| {
                    let mut kept = SampleBuffer::default();
                    let copied = buffer.copy_region(start, end, &mut kept);
                    if copied {
                        *buffer = kept;
                    }
                    copied
                })
            }
            (EditAction::Normalize, selection) => {
                let (start, end) = selection.region().unwrap_or(whole);
                self.mutate(true, |buffer, _| buffer.normalize_region(start, end))
            }
            (EditAction::Amplify(gain), selection) => {
                let (start, end) = selection.region().unwrap_or(whole);
                self.mutate(true, |buffer, _| {
                    let mut changed = false;
                    for channel in 0..buffer.channel_count() as usize {
                        changed |= buffer.amplify_region(channel, start, end, gain);
                    }
                    changed
                })
            }
            _ => EditOutcome::skipped(),
        };

        if outcome.applied {
            debug!(
                %action,
                frames = self.buffer.frame_count(),
                history = self.history.len(),
                "Edit applied"
            );
        } else {
            debug!(%action, ?selection, "Edit skipped");
        }
        outcome
    }

    /// Restore the most recent snapshot. Returns false when there is
    /// nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(snapshot) = self.history.pop() else {
            return false;
        };
        self.buffer = snapshot;
        self.dirty = true;
        debug!(
            frames = self.buffer.frame_count(),
            history = self.history.len(),
            "Undo"
        );
        true
    }

    /// Snapshot, apply `op`, and keep the snapshot only if `op` changed
    /// something
    fn mutate<F>(&mut self, clears_selection: bool, op: F) -> EditOutcome
    where
        F: FnOnce(&mut SampleBuffer, &mut Clipboard) -> bool,
    {
        let snapshot = self.buffer.clone();
        if !op(&mut self.buffer, &mut self.clipboard) {
            return EditOutcome::skipped();
        }
        self.history.push(snapshot);
        self.dirty = true;
        if clears_selection {
            self.selection = Selection::None;
        }
        EditOutcome {
            applied: true,
            dirty: true,
            selection_cleared: clears_selection,
        }
    }

    /// Clipboard contents in the live buffer's format
    fn conformed_clip(&self) -> Option<SampleBuffer> {
        if self.clipboard.is_empty() {
            return None;
        }
        self.clipboard
            .contents()
            .conformed_to(self.buffer.channel_count(), self.buffer.sample_rate())
            .inspect_err(|e| warn!(error = %e, "Clipboard could not be converted for paste"))
            .ok()
            .filter(|clip| !clip.is_empty())
    }
}
