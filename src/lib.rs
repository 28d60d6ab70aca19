pub mod detect;
pub mod error;
pub mod extract;
pub mod manager;
pub mod pose;
pub mod source;

use serde::{Deserialize, Serialize};

use crate::source::frame::PixelFormat;

/// 2D point in image coordinates (pixel space or centered pose space,
/// depending on the consumer).
pub type Point2 = nalgebra::Vector2<f64>;

/// System configuration, owned by the composition root and passed by
/// reference to the components that need it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub video: VideoConfig,
    pub tracking: TrackingConfig,
}

/// Which video source to acquire, plus its source-specific options.
/// Immutable once handed to the factory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum VideoConfig {
    Camera(CameraConfig),
    TestClip(ClipConfig),
    Network(NetworkConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Device path, e.g. "/dev/video0". Empty triggers auto-detection.
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: PixelFormat,
    pub buffer_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipConfig {
    /// Directory of numbered PNG/JPEG frames, or "synthetic://" for
    /// generated frames.
    pub path: String,
    /// Dimensions of generated frames; ignored for on-disk clips, which
    /// report their own.
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// Placeholder for the streaming source. Declared so configs can name it;
/// the factory fails fast until an implementation lands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Physical edge length of the printed markers. Pose translation is
    /// reported in the same unit.
    pub marker_size_mm: f64,
    pub tick_hz: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            video: VideoConfig::TestClip(ClipConfig {
                path: "synthetic://".into(),
                width: 640,
                height: 480,
                fps: 30,
            }),
            tracking: TrackingConfig {
                marker_size_mm: 50.0,
                tick_hz: 60,
            },
        }
    }
}
