use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// One frame as delivered by a video source, in whatever pixel format the
/// source produces. The payload is shared, not copied, on clone.
#[derive(Clone)]
pub struct RawFrame {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub sequence: u64,
    /// Acquisition timestamp for latency tracking.
    pub timestamp: Instant,
}

/// Pixel formats the extractor can normalize to RGBA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgba32,
    Rgb24,
    Yuyv,
    Mjpeg,
}
