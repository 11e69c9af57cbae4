//! Playback transport: plays a frozen snapshot of a buffer span through an
//! output backend, with looping and a lock-free render path

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, bounded};
use tracing::{debug, info};
use waved_core::SampleBuffer;

use crate::audio_io::{AudioOutputError, OutputBackend, OutputStream, StreamSpec};

/// Default frames per device callback
pub const DEFAULT_BLOCK_SIZE: u32 = 64;

const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransportState {
    Idle = 0,
    Playing = 1,
    /// Reserved; nothing enters this state yet
    Recording = 2,
}

impl TransportState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => TransportState::Playing,
            2 => TransportState::Recording,
            _ => TransportState::Idle,
        }
    }
}

/// Notifications from the audio thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    /// Reached the end of the span
    Finished { position: u64 },
    /// Acknowledged a stop request
    Stopped { position: u64 },
}

/// State shared between the control side and the audio thread
#[derive(Debug)]
struct SharedState {
    state: AtomicU8,
    cursor: AtomicU64,
    looping: AtomicBool,
    stop_requested: AtomicBool,
}

impl SharedState {
    fn state(&self) -> TransportState {
        TransportState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: TransportState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Everything the audio thread needs for one play request. Owned by the
/// render callback; the samples are frozen for its lifetime.
struct PlaybackSession {
    samples: Arc<Vec<f32>>,
    channels: usize,
    start: u64,
    stop: u64,
    cursor: u64,
    shared: Arc<SharedState>,
    events: Sender<TransportEvent>,
    done: bool,
}

impl PlaybackSession {
    /// Fill `out` with the next block. Never allocates or blocks.
    fn render(&mut self, out: &mut [f32]) {
        if self.done {
            out.fill(0.0);
            return;
        }
        if self.shared.stop_requested.load(Ordering::Acquire) {
            out.fill(0.0);
            self.complete(TransportEvent::Stopped {
                position: self.cursor,
            });
            return;
        }

        let ch = self.channels;
        let frames = out.len() / ch;
        let mut written = 0;

        while written < frames {
            if self.cursor >= self.stop {
                if self.shared.looping.load(Ordering::Relaxed) {
                    self.cursor = self.start;
                    continue;
                }
                out[written * ch..].fill(0.0);
                self.shared.cursor.store(self.cursor, Ordering::Release);
                self.complete(TransportEvent::Finished {
                    position: self.cursor,
                });
                return;
            }

            let n = (frames - written).min((self.stop - self.cursor) as usize);
            let src = self.cursor as usize * ch;
            let dst = written * ch;
            match self.samples.get(src..src + n * ch) {
                Some(block) => out[dst..dst + n * ch].copy_from_slice(block),
                None => out[dst..dst + n * ch].fill(0.0),
            }
            self.cursor += n as u64;
            written += n;
        }

        // Trailing partial frame, if the host hands us one
        out[frames * ch..].fill(0.0);
        self.shared.cursor.store(self.cursor, Ordering::Release);
    }

    fn complete(&mut self, event: TransportEvent) {
        self.done = true;
        self.shared.stop_requested.store(false, Ordering::Release);
        self.shared.set_state(TransportState::Idle);
        let _ = self.events.try_send(event);
    }
}

/// Plays spans of a [`SampleBuffer`] on an output backend.
///
/// `play` freezes the buffer, so the caller may keep editing while audio
/// runs. The transition back to `Idle` is made by the audio thread, either
/// at the end of the span or when it sees a stop request.
pub struct PlaybackTransport {
    backend: Box<dyn OutputBackend>,
    block_size: u32,
    shared: Arc<SharedState>,
    stream: Option<Box<dyn OutputStream>>,
    start_pos: u64,
    stop_pos: Option<u64>,
    events_tx: Sender<TransportEvent>,
    events_rx: Receiver<TransportEvent>,
}

impl PlaybackTransport {
    pub fn new(backend: Box<dyn OutputBackend>, block_size: u32) -> Self {
        let (events_tx, events_rx) = bounded(EVENT_CAPACITY);
        Self {
            backend,
            block_size: block_size.max(1),
            shared: Arc::new(SharedState {
                state: AtomicU8::new(TransportState::Idle as u8),
                cursor: AtomicU64::new(0),
                looping: AtomicBool::new(false),
                stop_requested: AtomicBool::new(false),
            }),
            stream: None,
            start_pos: 0,
            stop_pos: None,
            events_tx,
            events_rx,
        }
    }

    pub fn state(&self) -> TransportState {
        self.shared.state()
    }

    pub fn is_playing(&self) -> bool {
        self.state() == TransportState::Playing
    }

    /// Current playback frame
    pub fn position(&self) -> u64 {
        self.shared.cursor.load(Ordering::Acquire)
    }

    /// Move the cursor. Ignored unless idle.
    pub fn set_pos(&mut self, frame: u64) {
        if self.state() != TransportState::Idle {
            return;
        }
        self.shared.cursor.store(frame, Ordering::Release);
    }

    /// Takes effect at the next block boundary
    pub fn set_loop(&self, looping: bool) {
        self.shared.looping.store(looping, Ordering::Relaxed);
    }

    pub fn is_looping(&self) -> bool {
        self.shared.looping.load(Ordering::Relaxed)
    }

    /// Bounds of the last play request. `None` stop means end of buffer.
    pub fn span(&self) -> (u64, Option<u64>) {
        (self.start_pos, self.stop_pos)
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Start playing `buffer` over `[start, stop)`.
    ///
    /// Returns `Ok(false)` without doing anything when already playing or
    /// when the clamped span is empty. On a backend error the transport
    /// stays idle.
    pub fn play(
        &mut self,
        buffer: &SampleBuffer,
        start: u64,
        stop: Option<u64>,
    ) -> Result<bool, AudioOutputError> {
        if self.state() != TransportState::Idle {
            return Ok(false);
        }

        let frames = buffer.frame_count() as u64;
        let start = start.min(frames);
        let end = stop.unwrap_or(frames).min(frames);
        if start >= end {
            debug!(start, end, frames, "Nothing to play");
            return Ok(false);
        }

        // Previous stream has finished; close it before opening the device again
        self.stream = None;
        while self.events_rx.try_recv().is_ok() {}

        let spec = StreamSpec {
            channels: buffer.channel_count(),
            sample_rate: buffer.sample_rate(),
            block_size: self.block_size,
        };

        self.shared.stop_requested.store(false, Ordering::Release);
        self.shared.cursor.store(start, Ordering::Release);
        self.shared.set_state(TransportState::Playing);

        let mut session = PlaybackSession {
            samples: buffer.shared_samples(),
            channels: buffer.channel_count() as usize,
            start,
            stop: end,
            cursor: start,
            shared: Arc::clone(&self.shared),
            events: self.events_tx.clone(),
            done: false,
        };

        match self
            .backend
            .open(&spec, Box::new(move |out: &mut [f32]| session.render(out)))
        {
            Ok(stream) => self.stream = Some(stream),
            Err(e) => {
                self.shared.set_state(TransportState::Idle);
                return Err(e);
            }
        }

        self.start_pos = start;
        self.stop_pos = stop.map(|s| s.min(frames));

        info!(
            start,
            stop = end,
            channels = spec.channels,
            sample_rate = spec.sample_rate,
            looping = self.is_looping(),
            "Playback started"
        );
        Ok(true)
    }

    /// Ask the audio thread to stop. The state stays `Playing` until the
    /// next block acknowledges it; [`PlaybackTransport::poll_events`] then
    /// closes the stream.
    pub fn stop(&self) {
        if self.state() == TransportState::Idle
            || self.shared.stop_requested.swap(true, Ordering::AcqRel)
        {
            return;
        }
        debug!(position = self.position(), "Stop requested");
    }

    /// Receiver for completion notifications
    pub fn events(&self) -> Receiver<TransportEvent> {
        self.events_rx.clone()
    }

    /// Drain pending notifications. Closes the output stream once playback
    /// has ended.
    pub fn poll_events(&mut self) -> Vec<TransportEvent> {
        let events: Vec<_> = self.events_rx.try_iter().collect();
        if self.state() == TransportState::Idle && self.stream.take().is_some() {
            info!(position = self.position(), "Playback ended");
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::audio_io::RenderFn;

    struct ManualStream;

    impl OutputStream for ManualStream {}

    /// Backend that hands the render callback to the test instead of a device
    #[derive(Clone, Default)]
    struct ManualBackend {
        render: Arc<Mutex<Option<RenderFn>>>,
        spec: Arc<Mutex<Option<StreamSpec>>>,
    }

    impl ManualBackend {
        fn pull(&self, len: usize) -> Vec<f32> {
            let mut out = vec![9.0; len];
            if let Some(render) = self.render.lock().unwrap().as_mut() {
                render(&mut out);
            }
            out
        }
    }

    impl OutputBackend for ManualBackend {
        fn open(
            &self,
            spec: &StreamSpec,
            render: RenderFn,
        ) -> Result<Box<dyn OutputStream>, AudioOutputError> {
            *self.render.lock().unwrap() = Some(render);
            *self.spec.lock().unwrap() = Some(*spec);
            Ok(Box::new(ManualStream))
        }
    }

    struct FailingBackend;

    impl OutputBackend for FailingBackend {
        fn open(&self, _: &StreamSpec, _: RenderFn) -> Result<Box<dyn OutputStream>, AudioOutputError> {
            Err(AudioOutputError::NoDevices)
        }
    }

    fn ramp(frames: usize) -> SampleBuffer {
        SampleBuffer::from_interleaved((0..frames).map(|i| i as f32).collect(), 1, 8000).unwrap()
    }

    fn transport(block: u32) -> (PlaybackTransport, ManualBackend) {
        let backend = ManualBackend::default();
        (PlaybackTransport::new(Box::new(backend.clone()), block), backend)
    }

    #[test]
    fn test_plays_span_then_finishes_once() {
        let (mut transport, backend) = transport(4);
        let buffer = ramp(10);
        assert!(transport.play(&buffer, 0, None).unwrap());
        assert_eq!(transport.state(), TransportState::Playing);
        assert_eq!(
            *backend.spec.lock().unwrap(),
            Some(StreamSpec { channels: 1, sample_rate: 8000, block_size: 4 })
        );

        assert_eq!(backend.pull(4), vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(transport.position(), 4);
        assert_eq!(backend.pull(4), vec![4.0, 5.0, 6.0, 7.0]);
        // End of stream mid-block: tail is silence
        assert_eq!(backend.pull(4), vec![8.0, 9.0, 0.0, 0.0]);
        assert_eq!(transport.state(), TransportState::Idle);
        assert_eq!(transport.position(), 10);

        assert_eq!(backend.pull(4), vec![0.0; 4]);
        let events = transport.poll_events();
        assert_eq!(events, vec![TransportEvent::Finished { position: 10 }]);
        assert!(transport.poll_events().is_empty());
    }

    #[test]
    fn test_position_is_monotonic_without_loop() {
        let (mut transport, backend) = transport(3);
        transport.play(&ramp(20), 2, Some(17)).unwrap();

        let mut last = transport.position();
        while transport.is_playing() {
            backend.pull(3);
            let pos = transport.position();
            assert!(pos >= last);
            last = pos;
        }
        assert_eq!(last, 17);
        assert_eq!(transport.span(), (2, Some(17)));
    }

    #[test]
    fn test_loop_wraps_within_block() {
        let (mut transport, backend) = transport(4);
        transport.set_loop(true);
        transport.play(&ramp(10), 2, Some(5)).unwrap();

        assert_eq!(backend.pull(4), vec![2.0, 3.0, 4.0, 2.0]);
        assert_eq!(backend.pull(4), vec![3.0, 4.0, 2.0, 3.0]);
        assert!(transport.is_playing());

        // Turning the loop off lets the current pass run out
        transport.set_loop(false);
        assert_eq!(backend.pull(4), vec![4.0, 0.0, 0.0, 0.0]);
        assert_eq!(transport.state(), TransportState::Idle);
    }

    #[test]
    fn test_stop_is_acknowledged_by_next_block() {
        let (mut transport, backend) = transport(2);
        transport.play(&ramp(10), 0, None).unwrap();
        backend.pull(2);

        transport.stop();
        assert_eq!(transport.state(), TransportState::Playing);
        transport.stop();

        assert_eq!(backend.pull(2), vec![0.0, 0.0]);
        assert_eq!(transport.state(), TransportState::Idle);
        assert_eq!(
            transport.poll_events(),
            vec![TransportEvent::Stopped { position: 2 }]
        );

        // Stopping while idle is a no-op
        transport.stop();
        assert!(!transport.shared.stop_requested.load(Ordering::Acquire));
    }

    #[test]
    fn test_play_is_ignored_unless_idle() {
        let (mut transport, backend) = transport(4);
        let buffer = ramp(8);
        assert!(transport.play(&buffer, 0, None).unwrap());
        assert!(!transport.play(&buffer, 4, None).unwrap());

        transport.set_pos(6);
        assert_eq!(transport.position(), 0);
        assert_eq!(backend.pull(4), vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_empty_span_does_nothing() {
        let (mut transport, backend) = transport(4);
        let buffer = ramp(8);
        assert!(!transport.play(&buffer, 8, None).unwrap());
        assert!(!transport.play(&buffer, 5, Some(5)).unwrap());
        assert!(!transport.play(&buffer, 6, Some(2)).unwrap());
        assert!(!transport.play(&SampleBuffer::default(), 0, None).unwrap());
        assert_eq!(transport.state(), TransportState::Idle);
        assert!(backend.render.lock().unwrap().is_none());
    }

    #[test]
    fn test_stop_is_clamped_to_buffer() {
        let (mut transport, backend) = transport(4);
        assert!(transport.play(&ramp(3), 1, Some(100)).unwrap());
        assert_eq!(transport.span(), (1, Some(3)));
        assert_eq!(backend.pull(4), vec![1.0, 2.0, 0.0, 0.0]);
        assert_eq!(transport.state(), TransportState::Idle);
    }

    #[test]
    fn test_backend_failure_leaves_idle() {
        let mut transport = PlaybackTransport::new(Box::new(FailingBackend), 64);
        let err = transport.play(&ramp(8), 0, None).unwrap_err();
        assert!(matches!(err, AudioOutputError::NoDevices));
        assert_eq!(transport.state(), TransportState::Idle);
    }

    #[test]
    fn test_edits_during_playback_do_not_reach_audio() {
        let (mut transport, backend) = transport(4);
        let mut buffer = ramp(8);
        transport.play(&buffer, 0, None).unwrap();

        assert!(buffer.delete_region(0, 6));
        assert_eq!(backend.pull(4), vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(backend.pull(4), vec![4.0, 5.0, 6.0, 7.0]);
        assert_eq!(buffer.frame_count(), 2);
    }

    #[test]
    fn test_stereo_frames_stay_interleaved() {
        let (mut transport, backend) = transport(2);
        let buffer =
            SampleBuffer::from_interleaved(vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.5], 2, 44100).unwrap();
        transport.play(&buffer, 1, None).unwrap();
        assert_eq!(backend.pull(4), vec![1.0, 1.5, 2.0, 2.5]);
        assert_eq!(transport.position(), 3);
    }

    #[test]
    fn test_set_pos_while_idle() {
        let (mut transport, _backend) = transport(4);
        transport.set_pos(42);
        assert_eq!(transport.position(), 42);
    }

    #[test]
    fn test_replay_after_finish() {
        let (mut transport, backend) = transport(4);
        let buffer = ramp(4);
        transport.play(&buffer, 0, None).unwrap();
        backend.pull(4);
        backend.pull(4);
        assert_eq!(transport.state(), TransportState::Idle);

        assert!(transport.play(&buffer, 2, None).unwrap());
        assert!(transport.poll_events().is_empty());
        assert_eq!(backend.pull(4), vec![2.0, 3.0, 0.0, 0.0]);
        assert_eq!(
            transport.poll_events(),
            vec![TransportEvent::Finished { position: 4 }]
        );
    }
}
