//! Marker detection wrapper.
//!
//! Adapts a [`DetectionBackend`]'s raw output into the pipeline's marker
//! shape and guards the frame loop against an uninitialized backend or a
//! zero-area buffer. No pose math happens here.

pub mod backend;
pub mod stub;

pub use backend::DetectionBackend;
pub use stub::StubBackend;

use tracing::{debug, warn};

use crate::extract::PixelBuffer;
use crate::Point2;

/// A detected marker before pose estimation: dictionary id plus the four
/// ordered corner points in image pixel space.
#[derive(Debug, Clone)]
pub struct RawMarker {
    pub id: i32,
    pub corners: [Point2; 4],
}

pub struct MarkerDetector {
    backend: Box<dyn DetectionBackend>,
    initialized: bool,
}

impl MarkerDetector {
    pub fn new(backend: Box<dyn DetectionBackend>) -> Self {
        Self {
            backend,
            initialized: false,
        }
    }

    /// Warm up the backend. Must run before `detect` reports anything.
    pub fn initialize(&mut self) {
        if self.initialized {
            return;
        }
        self.backend.warm_up();
        self.initialized = true;
        debug!("detector initialized: backend={}", self.backend.name());
    }

    /// Detect markers in the buffer. Returns an empty list (never an
    /// error) when the detector is uninitialized or the buffer has zero
    /// area; a frame without markers is a normal tick.
    pub fn detect(&mut self, buffer: &PixelBuffer) -> Vec<RawMarker> {
        if !self.initialized {
            warn!("detect called before detector initialization; skipping frame");
            return Vec::new();
        }
        if buffer.width == 0 || buffer.height == 0 || buffer.samples.is_empty() {
            return Vec::new();
        }
        self.backend.detect(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(id: i32) -> RawMarker {
        RawMarker {
            id,
            corners: [
                Point2::new(0.0, 0.0),
                Point2::new(1.0, 0.0),
                Point2::new(1.0, 1.0),
                Point2::new(0.0, 1.0),
            ],
        }
    }

    #[test]
    fn uninitialized_detector_reports_nothing() {
        let mut backend = StubBackend::new();
        backend.push_frame(vec![marker(3)]);
        let mut detector = MarkerDetector::new(Box::new(backend));

        let samples = [0u8; 16];
        let buffer = PixelBuffer {
            width: 2,
            height: 2,
            samples: &samples,
        };
        assert!(detector.detect(&buffer).is_empty());
    }

    #[test]
    fn zero_area_buffer_reports_nothing() {
        let mut backend = StubBackend::new();
        backend.push_frame(vec![marker(3)]);
        let mut detector = MarkerDetector::new(Box::new(backend));
        detector.initialize();

        let buffer = PixelBuffer {
            width: 0,
            height: 2,
            samples: &[],
        };
        assert!(detector.detect(&buffer).is_empty());
    }

    #[test]
    fn backend_output_passes_through() {
        let mut backend = StubBackend::new();
        backend.push_frame(vec![marker(3), marker(7)]);
        let mut detector = MarkerDetector::new(Box::new(backend));
        detector.initialize();

        let samples = [0u8; 16];
        let buffer = PixelBuffer {
            width: 2,
            height: 2,
            samples: &samples,
        };
        let markers = detector.detect(&buffer);
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].id, 3);
        assert_eq!(markers[1].id, 7);

        // Script exhausted: later frames are empty.
        assert!(detector.detect(&buffer).is_empty());
    }
}
