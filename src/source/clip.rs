//! Looped test-clip source.
//!
//! Decodes a directory of numbered PNG/JPEG frames into RGBA up front and
//! replays them forever, so the rest of the pipeline can run without a
//! physical camera. A `synthetic://` path generates flat gray frames
//! instead, which is what the tests and the out-of-the-box demo use.

use std::time::Instant;

use bytes::Bytes;
use tracing::info;

use crate::error::SourceError;
use crate::source::frame::{PixelFormat, RawFrame};
use crate::source::{SourceKind, VideoSource};
use crate::VideoConfig;

const SYNTHETIC_SCHEME: &str = "synthetic://";
const SYNTHETIC_FRAMES: usize = 3;

pub struct ClipSource {
    frames: Vec<Bytes>,
    dimensions: (u32, u32),
    cursor: usize,
    sequence: u64,
    ready: bool,
}

impl ClipSource {
    pub fn new() -> Self {
        Self {
            frames: Vec::new(),
            dimensions: (0, 0),
            cursor: 0,
            sequence: 0,
            ready: false,
        }
    }

    fn load_directory(&mut self, path: &str) -> Result<(), SourceError> {
        let mut entries: Vec<_> = std::fs::read_dir(path)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("png" | "jpg" | "jpeg")
                )
            })
            .collect();
        entries.sort();

        for entry in entries {
            let decoded = image::open(&entry)
                .map_err(|e| SourceError::Init(format!("cannot decode {}: {e}", entry.display())))?
                .to_rgba8();
            let (w, h) = decoded.dimensions();
            if self.frames.is_empty() {
                self.dimensions = (w, h);
            } else if (w, h) != self.dimensions {
                return Err(SourceError::Init(format!(
                    "clip frame {} is {w}x{h}, expected {}x{}",
                    entry.display(),
                    self.dimensions.0,
                    self.dimensions.1
                )));
            }
            self.frames.push(Bytes::from(decoded.into_raw()));
        }

        if self.frames.is_empty() {
            return Err(SourceError::Init(format!("no frames found in {path}")));
        }
        Ok(())
    }

    fn generate_synthetic(&mut self, width: u32, height: u32) -> Result<(), SourceError> {
        if width == 0 || height == 0 {
            return Err(SourceError::Init(
                "synthetic clip requires non-zero dimensions".into(),
            ));
        }
        let len = (width as usize) * (height as usize) * 4;
        for i in 0..SYNTHETIC_FRAMES {
            let shade = 96 + (i as u8) * 16;
            let mut pixels = vec![shade; len];
            for px in pixels.chunks_exact_mut(4) {
                px[3] = 255;
            }
            self.frames.push(Bytes::from(pixels));
        }
        self.dimensions = (width, height);
        Ok(())
    }
}

impl Default for ClipSource {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoSource for ClipSource {
    fn kind(&self) -> SourceKind {
        SourceKind::TestClip
    }

    fn initialize(&mut self, config: &VideoConfig) -> Result<(), SourceError> {
        let VideoConfig::TestClip(cfg) = config else {
            return Err(SourceError::Init(
                "clip source requires a test-clip config".into(),
            ));
        };

        if cfg.path.starts_with(SYNTHETIC_SCHEME) {
            self.generate_synthetic(cfg.width, cfg.height)?;
        } else {
            self.load_directory(&cfg.path)?;
        }

        info!(
            "Clip source ready: {} frames at {}x{} ({})",
            self.frames.len(),
            self.dimensions.0,
            self.dimensions.1,
            cfg.path
        );
        self.ready = true;
        Ok(())
    }

    fn dimensions(&self) -> (u32, u32) {
        if self.ready {
            self.dimensions
        } else {
            (0, 0)
        }
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn current_frame(&mut self) -> Result<Option<RawFrame>, SourceError> {
        if !self.ready {
            return Err(SourceError::NotStarted);
        }

        let data = self.frames[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.frames.len();
        self.sequence += 1;

        Ok(Some(RawFrame {
            data,
            width: self.dimensions.0,
            height: self.dimensions.1,
            format: PixelFormat::Rgba32,
            sequence: self.sequence,
            timestamp: Instant::now(),
        }))
    }

    fn stop(&mut self) -> Result<(), SourceError> {
        self.ready = false;
        Ok(())
    }

    fn detach(&mut self) {
        self.frames.clear();
        self.dimensions = (0, 0);
        self.cursor = 0;
    }
}
