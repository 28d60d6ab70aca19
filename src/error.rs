//! Error taxonomy for the tracking pipeline.
//!
//! Per-frame and per-marker conditions are deliberately not represented
//! here: a frame that is not ready yet or a marker whose pose cannot be
//! recovered is a normal tick, not an error. Only source lifecycle
//! failures and degenerate pose geometry surface as typed errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    /// The config names a source type the factory cannot build yet.
    /// The current source, if any, is left untouched.
    #[error("unsupported source type `{0}`")]
    UnsupportedSourceType(&'static str),

    /// Source initialization failed. By the time this surfaces the
    /// previous source has already been torn down; the caller must retry
    /// with a valid config.
    #[error("source initialization failed: {0}")]
    Init(String),

    #[error("device i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame was requested from a source that is not streaming.
    #[error("source is not started")]
    NotStarted,
}

#[derive(Debug, Error)]
pub enum PoseError {
    /// The four corners are exactly collinear or coincident; pose
    /// recovery is ill-posed and no pose is produced for this marker.
    #[error("degenerate corner geometry")]
    DegenerateGeometry,
}

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("manager is not initialized")]
    NotInitialized,

    #[error(transparent)]
    Source(#[from] SourceError),
}
