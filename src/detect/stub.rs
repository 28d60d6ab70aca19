use std::collections::VecDeque;

use crate::detect::backend::DetectionBackend;
use crate::detect::RawMarker;
use crate::extract::PixelBuffer;

/// Scripted backend for tests and the demo binary: replays a queue of
/// per-frame detection results, then reports nothing.
#[derive(Default)]
pub struct StubBackend {
    frames: VecDeque<Vec<RawMarker>>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the detections to report for the next frame.
    pub fn push_frame(&mut self, markers: Vec<RawMarker>) {
        self.frames.push_back(markers);
    }
}

impl DetectionBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _buffer: &PixelBuffer) -> Vec<RawMarker> {
        self.frames.pop_front().unwrap_or_default()
    }
}
