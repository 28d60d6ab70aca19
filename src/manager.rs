//! Per-tick pipeline orchestration.
//!
//! The manager owns one video source (through the factory), the staging
//! extractor, the detector wrapper, and the pose estimator, and is
//! driven once per external render tick. It never spawns its own timer
//! and retains nothing across ticks beyond the reusable staging buffer
//! and the cached pose solver.

use tracing::{debug, info, trace};

use crate::detect::{DetectionBackend, MarkerDetector};
use crate::error::ManagerError;
use crate::extract::FrameExtractor;
use crate::pose::{Pose, PoseEstimator};
use crate::source::VideoSourceFactory;
use crate::{Point2, VideoConfig};

/// A marker found in the current frame, with its pose when the estimator
/// converged. Produced fresh each tick; never persisted.
#[derive(Debug, Clone)]
pub struct DetectedMarker {
    pub id: i32,
    /// Detector corner order, preserved.
    pub corners: [Point2; 4],
    /// Arithmetic mean of the corners, present whether or not pose
    /// estimation succeeded.
    pub center: Point2,
    pub pose: Option<Pose>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ManagerState {
    Uninitialized,
    Ready,
}

pub struct ArManager {
    factory: VideoSourceFactory,
    extractor: FrameExtractor,
    detector: MarkerDetector,
    estimator: PoseEstimator,
    marker_size_mm: f64,
    pending_switch: Option<VideoConfig>,
    state: ManagerState,
}

impl ArManager {
    pub fn new(backend: Box<dyn DetectionBackend>, marker_size_mm: f64) -> Self {
        Self {
            factory: VideoSourceFactory::new(),
            extractor: FrameExtractor::new(),
            detector: MarkerDetector::new(backend),
            estimator: PoseEstimator::new(),
            marker_size_mm,
            pending_switch: None,
            state: ManagerState::Uninitialized,
        }
    }

    /// Acquire a video source for `config` and become ready for ticks.
    pub fn initialize(&mut self, config: &VideoConfig) -> Result<(), ManagerError> {
        self.factory.create_source(config)?;
        self.detector.initialize();
        self.pending_switch = None;
        self.state = ManagerState::Ready;
        info!("AR manager ready");
        Ok(())
    }

    /// Run one tick of the pipeline: extract, detect, estimate.
    ///
    /// A transiently unavailable frame yields an empty list, and a
    /// marker whose pose is degenerate keeps its slot with `pose: None`;
    /// neither aborts the batch. A pending source switch is applied here,
    /// at the tick boundary, before any extraction happens.
    pub fn process_frame(&mut self) -> Result<Vec<DetectedMarker>, ManagerError> {
        if self.state != ManagerState::Ready {
            return Err(ManagerError::NotInitialized);
        }

        if let Some(config) = self.pending_switch.take() {
            debug!("applying deferred source switch");
            if let Err(e) = self.factory.switch_source(&config) {
                // Unsupported configs fail before teardown and leave the
                // previous source active; an init failure leaves none.
                // Either way the state stays consistent, never half-swapped.
                if self.factory.current_source().is_none() {
                    self.state = ManagerState::Uninitialized;
                }
                return Err(e.into());
            }
        }

        let Some(source) = self.factory.current_source() else {
            return Err(ManagerError::NotInitialized);
        };

        let Some(buffer) = self.extractor.extract(source) else {
            trace!("no frame this tick");
            return Ok(Vec::new());
        };

        let raw_markers = self.detector.detect(&buffer);
        let mut markers = Vec::with_capacity(raw_markers.len());
        for raw in raw_markers {
            let center = (raw.corners[0] + raw.corners[1] + raw.corners[2] + raw.corners[3]) / 4.0;
            let pose = match self.estimator.estimate(
                &raw.corners,
                buffer.width,
                buffer.height,
                self.marker_size_mm,
            ) {
                Ok(pose) => Some(pose),
                Err(e) => {
                    debug!("marker {} has no pose this frame: {e}", raw.id);
                    None
                }
            };
            markers.push(DetectedMarker {
                id: raw.id,
                corners: raw.corners,
                center,
                pose,
            });
        }

        Ok(markers)
    }

    /// Request a source switch. Accepted at any time; the swap happens at
    /// the next tick boundary, never mid-pipeline.
    pub fn update_video_source(&mut self, config: VideoConfig) {
        self.pending_switch = Some(config);
    }

    /// Stop and release the source and the staging surface.
    pub fn dispose(&mut self) -> Result<(), ManagerError> {
        let result = self.factory.cleanup();
        self.extractor.release();
        self.pending_switch = None;
        self.state = ManagerState::Uninitialized;
        info!("AR manager disposed");
        result.map_err(ManagerError::from)
    }
}
