//! End-to-end edit scenarios against the public waved-core API

use approx::assert_relative_eq;
use waved_core::{EditEngine, EditHistory, SampleBuffer, Selection};

fn sine(frames: usize, channels: u16) -> SampleBuffer {
    let samples = (0..frames)
        .flat_map(|i| {
            let s = (i as f32 * 0.05).sin() * 0.3;
            std::iter::repeat_n(s, channels as usize)
        })
        .collect();
    SampleBuffer::from_interleaved(samples, channels, 44100).unwrap()
}

#[test]
fn copy_then_paste_reproduces_region() {
    let mut engine = EditEngine::with_buffer(sine(200, 2));
    let original = engine.buffer().clone();

    engine.set_selection(Selection::Region { start: 50, end: 80 });
    assert!(engine.copy().applied);
    engine.set_selection(Selection::Marker(200));
    assert!(engine.paste().applied);

    let buffer = engine.buffer();
    assert_eq!(buffer.frame_count(), 230);
    assert_eq!(&buffer.samples()[400..], &original.samples()[100..160]);
}

#[test]
fn cut_and_paste_back_restores_buffer() {
    let mut engine = EditEngine::with_buffer(sine(100, 1));
    let original = engine.buffer().clone();

    engine.set_selection(Selection::Region { start: 10, end: 40 });
    assert!(engine.cut().applied);
    assert_eq!(engine.buffer().frame_count(), 70);

    engine.set_selection(Selection::Marker(10));
    assert!(engine.paste().applied);
    assert_eq!(engine.buffer().samples(), original.samples());
}

#[test]
fn delete_past_end_twice_is_idempotent() {
    let mut engine = EditEngine::with_buffer(sine(100, 1));
    engine.set_selection(Selection::Region { start: 90, end: 500 });
    assert!(engine.delete().applied);
    assert_eq!(engine.buffer().frame_count(), 90);

    engine.set_selection(Selection::Region { start: 90, end: 500 });
    assert!(!engine.delete().applied);
    assert_eq!(engine.buffer().frame_count(), 90);
    assert_eq!(engine.history().len(), 1);
}

#[test]
fn normalize_brings_peak_to_unity() {
    let mut engine = EditEngine::with_buffer(sine(400, 1));
    engine.set_selection(Selection::Region { start: 0, end: 400 });
    assert!(engine.normalize().applied);

    let peak = engine
        .buffer()
        .samples()
        .iter()
        .fold(0.0f32, |acc, s| acc.max(s.abs()));
    assert!(peak <= 1.0 + 1e-6);
    assert_relative_eq!(peak, 1.0, epsilon = 1e-5);
}

#[test]
fn undo_walks_back_every_edit() {
    let mut engine = EditEngine::with_buffer(sine(100, 1));
    let original = engine.buffer().clone();

    for _ in 0..3 {
        engine.set_selection(Selection::Region { start: 0, end: 10 });
        assert!(engine.delete().applied);
    }
    assert_eq!(engine.buffer().frame_count(), 70);

    assert!(engine.undo());
    assert!(engine.undo());
    assert!(engine.undo());
    assert_eq!(engine.buffer(), &original);
    assert!(!engine.undo());
    assert_eq!(engine.buffer(), &original);
}

#[test]
fn bounded_history_forgets_oldest_edit() {
    let mut engine =
        EditEngine::with_buffer(sine(100, 1)).with_history(EditHistory::with_max_depth(2));

    for _ in 0..3 {
        engine.set_selection(Selection::Region { start: 0, end: 10 });
        engine.delete();
    }
    assert!(engine.undo());
    assert!(engine.undo());
    assert!(!engine.undo());
    assert_eq!(engine.buffer().frame_count(), 90);
}

#[test]
fn stereo_copy_keeps_frames_together() {
    let samples = (0..20).map(|i| i as f32 / 20.0).collect();
    let buffer = SampleBuffer::from_interleaved(samples, 2, 48000).unwrap();
    let mut engine = EditEngine::with_buffer(buffer);

    engine.set_selection(Selection::Region { start: 2, end: 5 });
    engine.copy();

    let clip = engine.clipboard().contents();
    assert_eq!(clip.channel_count(), 2);
    assert_eq!(clip.sample_rate(), 48000);
    assert_eq!(clip.frame_count(), 3);
    assert_eq!(clip.samples(), &engine.buffer().samples()[4..10]);
}
