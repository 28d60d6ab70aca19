//! Video acquisition sources.
//!
//! Each source wraps one acquisition strategy behind the same capability
//! contract: initialize from a config, report readiness and intrinsic
//! dimensions, hand out the current frame, stop, and finally detach.
//! The factory owns at most one active source at a time and enforces the
//! stop-then-detach teardown ordering across switches.

pub mod camera;
pub mod clip;
pub mod factory;
pub mod frame;

pub use camera::CameraSource;
pub use clip::ClipSource;
pub use factory::VideoSourceFactory;
pub use frame::{PixelFormat, RawFrame};

use crate::error::SourceError;
use crate::VideoConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Camera,
    TestClip,
    Network,
}

/// Capability contract for a video source.
///
/// Lifecycle: `initialize` -> N frames -> `stop` -> `detach`. After
/// `detach` the source holds no device or stream handles and reports
/// zero dimensions; it is never reused.
pub trait VideoSource: Send {
    fn kind(&self) -> SourceKind;

    /// Acquire the underlying device/stream. Must be called exactly once
    /// before any frame is read.
    fn initialize(&mut self, config: &VideoConfig) -> Result<(), SourceError>;

    /// Intrinsic frame dimensions as currently reported by the source.
    /// `(0, 0)` until the source delivers real frames - an expected
    /// transient state, not an error.
    fn dimensions(&self) -> (u32, u32);

    /// True once the source can deliver frames.
    fn is_ready(&self) -> bool;

    /// Read the current frame surface. `Ok(None)` when no frame is
    /// available this tick.
    fn current_frame(&mut self) -> Result<Option<RawFrame>, SourceError>;

    /// Stop streaming. The device handle must not deliver frames after
    /// this returns, though the source may still hold it until `detach`.
    fn stop(&mut self) -> Result<(), SourceError>;

    /// Second teardown phase: release every remaining handle and clear
    /// reported state so nothing can fire against this source afterwards.
    /// Runs even when `stop` failed.
    fn detach(&mut self);
}
