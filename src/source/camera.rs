//! Live camera source backed by V4L2 with memory-mapped capture buffers.

use std::time::Instant;

use bytes::Bytes;
use tracing::info;
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::error::SourceError;
use crate::source::frame::{PixelFormat, RawFrame};
use crate::source::{SourceKind, VideoSource};
use crate::VideoConfig;

pub struct CameraSource {
    device: Option<Box<Device>>,
    stream: Option<MmapStream<'static>>,
    dimensions: (u32, u32),
    format: PixelFormat,
    sequence: u64,
}

impl CameraSource {
    pub fn new() -> Self {
        Self {
            device: None,
            stream: None,
            dimensions: (0, 0),
            format: PixelFormat::Mjpeg,
            sequence: 0,
        }
    }
}

impl Default for CameraSource {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoSource for CameraSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Camera
    }

    fn initialize(&mut self, config: &VideoConfig) -> Result<(), SourceError> {
        let VideoConfig::Camera(cfg) = config else {
            return Err(SourceError::Init(
                "camera source requires a camera config".into(),
            ));
        };

        let path = if cfg.device.is_empty() {
            auto_detect_device()?
        } else {
            cfg.device.clone()
        };
        info!("Initializing camera source: {}", path);

        let device = Device::with_path(&path)?;

        let caps = device.query_caps()?;
        info!("Device: {} ({})", caps.card, caps.driver);
        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(SourceError::Init(format!(
                "{path} does not support video capture"
            )));
        }

        let mut fmt = device.format()?;
        fmt.width = cfg.width;
        fmt.height = cfg.height;
        fmt.fourcc = match cfg.format {
            PixelFormat::Mjpeg => FourCC::new(b"MJPG"),
            PixelFormat::Yuyv => FourCC::new(b"YUYV"),
            other => {
                return Err(SourceError::Init(format!(
                    "camera cannot deliver {other:?} frames"
                )))
            }
        };
        // The driver may adjust dimensions; report what it accepted.
        let actual = device.set_format(&fmt)?;
        self.dimensions = (actual.width, actual.height);
        self.format = cfg.format;

        let stream = MmapStream::with_buffers(&device, Type::VideoCapture, cfg.buffer_count)?;
        info!(
            "Camera stream started: {}x{} with {} buffers",
            actual.width, actual.height, cfg.buffer_count
        );

        self.device = Some(Box::new(device));
        self.stream = Some(stream);
        Ok(())
    }

    fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    fn is_ready(&self) -> bool {
        self.stream.is_some()
    }

    fn current_frame(&mut self) -> Result<Option<RawFrame>, SourceError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(SourceError::NotStarted);
        };

        let timestamp = Instant::now();
        let (buf, _meta) = stream.next()?;
        self.sequence += 1;

        Ok(Some(RawFrame {
            data: Bytes::copy_from_slice(buf),
            width: self.dimensions.0,
            height: self.dimensions.1,
            format: self.format,
            sequence: self.sequence,
            timestamp,
        }))
    }

    fn stop(&mut self) -> Result<(), SourceError> {
        // Dropping the stream dequeues and releases the mmap buffers.
        self.stream = None;
        Ok(())
    }

    fn detach(&mut self) {
        self.device = None;
        self.dimensions = (0, 0);
    }
}

/// Scan `/dev/video*` for the first device that can capture in a format
/// the extractor understands.
pub fn auto_detect_device() -> Result<String, SourceError> {
    use std::path::Path;

    info!("Auto-detecting capture devices...");

    for i in 0..10 {
        let path = format!("/dev/video{i}");
        if !Path::new(&path).exists() {
            continue;
        }

        if let Ok(dev) = Device::with_path(&path) {
            if let Ok(caps) = dev.query_caps() {
                if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
                    continue;
                }
                if let Ok(formats) = dev.enum_formats() {
                    for fmt in formats {
                        if fmt.fourcc == FourCC::new(b"MJPG") || fmt.fourcc == FourCC::new(b"YUYV")
                        {
                            info!("Found device: {} - {}", path, caps.card);
                            return Ok(path);
                        }
                    }
                }
            }
        }
    }

    Err(SourceError::Init("no suitable capture device found".into()))
}
