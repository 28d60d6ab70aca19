//! Frame-surface to pixel-buffer extraction.
//!
//! Converts whatever the active source delivers into a contiguous RGBA
//! buffer for the detector. One staging allocation is kept across ticks
//! and resized in place only when the source's reported dimensions
//! change. Every failure on this path degrades to "no frame this tick";
//! nothing here may stall the render loop.

use color_eyre::eyre::{eyre, Result};
use jpeg_decoder::Decoder;
use tracing::{trace, warn};

use crate::source::frame::{PixelFormat, RawFrame};
use crate::source::VideoSource;

/// Borrowed RGBA view of the extractor's staging buffer. Valid for one
/// tick; never retained across frames.
pub struct PixelBuffer<'a> {
    pub width: u32,
    pub height: u32,
    pub samples: &'a [u8],
}

pub struct FrameExtractor {
    staging: Vec<u8>,
    dimensions: (u32, u32),
}

impl FrameExtractor {
    pub fn new() -> Self {
        Self {
            staging: Vec::new(),
            dimensions: (0, 0),
        }
    }

    /// Read the source's current frame into the staging buffer.
    ///
    /// Returns `None` while the source reports zero dimensions (not yet
    /// delivering real frames) and on any read or decode failure.
    pub fn extract(&mut self, source: &mut dyn VideoSource) -> Option<PixelBuffer<'_>> {
        let (width, height) = source.dimensions();
        if width == 0 || height == 0 {
            trace!("source not delivering frames yet");
            return None;
        }

        let frame = match source.current_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return None,
            Err(e) => {
                warn!("frame read failed: {e}");
                return None;
            }
        };

        if (width, height) != self.dimensions {
            self.staging.resize((width as usize) * (height as usize) * 4, 0);
            self.dimensions = (width, height);
        }

        if let Err(e) = convert_to_rgba(&frame, width, height, &mut self.staging) {
            warn!("frame conversion failed: {e}");
            return None;
        }

        Some(PixelBuffer {
            width,
            height,
            samples: &self.staging,
        })
    }

    /// Drop the staging allocation. Called on manager disposal.
    pub fn release(&mut self) {
        self.staging = Vec::new();
        self.dimensions = (0, 0);
    }

    #[cfg(test)]
    fn staging_len(&self) -> usize {
        self.staging.len()
    }
}

impl Default for FrameExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn convert_to_rgba(frame: &RawFrame, width: u32, height: u32, out: &mut [u8]) -> Result<()> {
    let pixels = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| eyre!("frame dimensions overflow"))?;

    match frame.format {
        PixelFormat::Rgba32 => {
            if frame.data.len() != pixels * 4 {
                return Err(eyre!(
                    "RGBA length mismatch: expected {}, got {}",
                    pixels * 4,
                    frame.data.len()
                ));
            }
            out.copy_from_slice(&frame.data);
        }
        PixelFormat::Rgb24 => {
            if frame.data.len() != pixels * 3 {
                return Err(eyre!(
                    "RGB length mismatch: expected {}, got {}",
                    pixels * 3,
                    frame.data.len()
                ));
            }
            rgb_to_rgba(&frame.data, out);
        }
        PixelFormat::Yuyv => {
            if width % 2 != 0 || frame.data.len() != pixels * 2 {
                return Err(eyre!(
                    "YUYV length mismatch: expected {}, got {}",
                    pixels * 2,
                    frame.data.len()
                ));
            }
            yuyv_to_rgba(&frame.data, out);
        }
        PixelFormat::Mjpeg => {
            let mut decoder = Decoder::new(&frame.data[..]);
            let rgb = decoder.decode()?;
            let info = decoder
                .info()
                .ok_or_else(|| eyre!("jpeg frame carries no header info"))?;
            if (info.width as u32, info.height as u32) != (width, height) {
                return Err(eyre!(
                    "jpeg frame is {}x{}, source reports {width}x{height}",
                    info.width,
                    info.height
                ));
            }
            if info.pixel_format != jpeg_decoder::PixelFormat::RGB24 {
                return Err(eyre!("unsupported jpeg pixel format {:?}", info.pixel_format));
            }
            rgb_to_rgba(&rgb, out);
        }
    }
    Ok(())
}

fn rgb_to_rgba(rgb: &[u8], out: &mut [u8]) {
    for (src, dst) in rgb.chunks_exact(3).zip(out.chunks_exact_mut(4)) {
        dst[0] = src[0];
        dst[1] = src[1];
        dst[2] = src[2];
        dst[3] = 255;
    }
}

/// YUYV 4:2:2 to RGBA, BT.601 full range.
fn yuyv_to_rgba(yuyv: &[u8], out: &mut [u8]) {
    for (src, dst) in yuyv.chunks_exact(4).zip(out.chunks_exact_mut(8)) {
        let y0 = src[0] as f32;
        let u = src[1] as f32 - 128.0;
        let y1 = src[2] as f32;
        let v = src[3] as f32 - 128.0;

        write_yuv_pixel(&mut dst[0..4], y0, u, v);
        write_yuv_pixel(&mut dst[4..8], y1, u, v);
    }
}

fn write_yuv_pixel(dst: &mut [u8], y: f32, u: f32, v: f32) {
    dst[0] = clamp_to_u8(y + 1.402 * v);
    dst[1] = clamp_to_u8(y - 0.344_136 * u - 0.714_136 * v);
    dst[2] = clamp_to_u8(y + 1.772 * u);
    dst[3] = 255;
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
