//! Editing session: one open document, its file and its playback

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;
use waved_core::{
    BufferError, BufferInfo, EditAction, EditEngine, EditHistory, EditOutcome, Selection,
};

use crate::audio_io::{AudioOutputError, OutputBackend};
use crate::codec::{self, CodecError};
use crate::transport::{DEFAULT_BLOCK_SIZE, PlaybackTransport, TransportEvent};

const APP_NAME: &str = "waved";
const UNTITLED: &str = "Untitled";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Output(#[from] AudioOutputError),
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error("Document has never been saved; choose a file name")]
    NoPath,
}

/// Settings a session is created with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Format of new documents
    pub channels: u16,
    pub sample_rate: u32,
    /// Frames per output callback
    pub block_size: u32,
    /// Undo depth, unbounded when `None`
    pub history_depth: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            sample_rate: 44100,
            block_size: DEFAULT_BLOCK_SIZE,
            history_depth: None,
        }
    }
}

/// Owns everything the editor works on: the edit engine, the transport and
/// the document's location on disk
pub struct Session {
    engine: EditEngine,
    transport: PlaybackTransport,
    config: SessionConfig,
    file_path: Option<PathBuf>,
    last_dir: Option<PathBuf>,
}

impl Session {
    /// Session with an empty document in the configured format
    pub fn new(backend: Box<dyn OutputBackend>, config: SessionConfig) -> Result<Self, SessionError> {
        let history = match config.history_depth {
            Some(depth) => EditHistory::with_max_depth(depth),
            None => EditHistory::new(),
        };
        let engine = EditEngine::new(config.channels, config.sample_rate)?.with_history(history);
        Ok(Self {
            engine,
            transport: PlaybackTransport::new(backend, config.block_size),
            config,
            file_path: None,
            last_dir: None,
        })
    }

    pub fn engine(&self) -> &EditEngine {
        &self.engine
    }

    pub fn transport(&self) -> &PlaybackTransport {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut PlaybackTransport {
        &mut self.transport
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// Directory of the last file opened or saved
    pub fn last_dir(&self) -> Option<&Path> {
        self.last_dir.as_deref()
    }

    pub fn set_last_dir(&mut self, dir: impl Into<PathBuf>) {
        self.last_dir = Some(dir.into());
    }

    /// Window title, `*` marking unsaved changes
    pub fn title(&self) -> String {
        let name = self
            .file_path
            .as_deref()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| UNTITLED.to_string());
        let marker = if self.engine.is_dirty() { "*" } else { "" };
        format!("{marker}{name} - {APP_NAME}")
    }

    /// Discard the document and start an empty one
    pub fn new_document(&mut self) -> Result<(), SessionError> {
        self.transport.stop();
        self.engine.reset(self.config.channels, self.config.sample_rate)?;
        self.file_path = None;
        info!(
            channels = self.config.channels,
            sample_rate = self.config.sample_rate,
            "New document"
        );
        Ok(())
    }

    /// Replace the document with the contents of `path`. The current
    /// document is kept if decoding fails.
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<BufferInfo, SessionError> {
        let path = path.as_ref();
        let buffer = codec::decode(path)?.into_buffer()?;
        self.transport.stop();
        self.engine.replace_buffer(buffer);
        self.remember_path(path);
        Ok(self.engine.buffer().info())
    }

    pub fn save(&mut self) -> Result<(), SessionError> {
        let path = self.file_path.clone().ok_or(SessionError::NoPath)?;
        self.save_as(path)
    }

    pub fn save_as(&mut self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let path = path.as_ref();
        codec::encode(path, self.engine.buffer())?;
        self.engine.mark_saved();
        self.remember_path(path);
        Ok(())
    }

    fn remember_path(&mut self, path: &Path) {
        self.file_path = Some(path.to_path_buf());
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            self.last_dir = Some(dir.to_path_buf());
        }
    }

    pub fn select(&mut self, selection: Selection) {
        self.engine.set_selection(selection);
    }

    /// Select between two times in seconds
    pub fn select_times(&mut self, a: f64, b: f64) {
        let rate = self.engine.buffer().sample_rate();
        self.engine.set_selection(Selection::from_times(a, b, rate));
    }

    pub fn perform(&mut self, action: EditAction) -> EditOutcome {
        self.engine.perform(action)
    }

    pub fn undo(&mut self) -> bool {
        self.engine.undo()
    }

    /// Play the selected region, or from the marker (or cursor) to the end
    pub fn play_selection(&mut self) -> Result<bool, SessionError> {
        let (start, stop) = match self.engine.selection() {
            Selection::Region { start, end } => (start, Some(end)),
            Selection::Marker(frame) => (frame, None),
            Selection::None => (self.transport.position(), None),
        };
        Ok(self.transport.play(self.engine.buffer(), start, stop)?)
    }

    pub fn play_from(&mut self, frame: u64) -> Result<bool, SessionError> {
        Ok(self.transport.play(self.engine.buffer(), frame, None)?)
    }

    /// Request a stop. The audio thread acknowledges on its next block;
    /// call [`Session::poll_events`] afterwards to release the device.
    pub fn stop(&self) {
        self.transport.stop();
    }

    /// Periodic tick for the owner of the session: drains transport
    /// notifications and closes the output stream once playback is idle
    pub fn poll_events(&mut self) -> Vec<TransportEvent> {
        self.transport.poll_events()
    }
}
