//! Creation, swapping, and teardown of video sources.
//!
//! The factory holds the only owning handle to the active source, so a
//! consumer that reads through [`VideoSourceFactory::current_source`]
//! every tick can never observe a stale device across a switch.

use tracing::{debug, info};

use crate::error::SourceError;
use crate::source::{CameraSource, ClipSource, SourceKind, VideoSource};
use crate::VideoConfig;

#[derive(Default)]
pub struct VideoSourceFactory {
    current: Option<Box<dyn VideoSource>>,
}

impl VideoSourceFactory {
    pub fn new() -> Self {
        Self { current: None }
    }

    /// Tear down any active source, then create and initialize one for
    /// `config`. An unsupported source type fails before teardown, so the
    /// active source survives; an initialization failure surfaces after
    /// teardown, leaving no active source.
    pub fn create_source(&mut self, config: &VideoConfig) -> Result<(), SourceError> {
        let source = Self::construct(config)?;
        self.adopt(source, config)
    }

    /// Switching is the create path: create already tears down first.
    pub fn switch_source(&mut self, config: &VideoConfig) -> Result<(), SourceError> {
        self.create_source(config)
    }

    /// Adopt a pre-constructed source: cleanup of the outgoing source
    /// runs to completion before the incoming `initialize` begins.
    pub fn adopt(
        &mut self,
        mut source: Box<dyn VideoSource>,
        config: &VideoConfig,
    ) -> Result<(), SourceError> {
        self.cleanup()?;
        source.initialize(config)?;
        info!("Video source active: {:?}", source.kind());
        self.current = Some(source);
        Ok(())
    }

    /// The active source, without side effects.
    pub fn current_source(&mut self) -> Option<&mut (dyn VideoSource + 'static)> {
        self.current.as_deref_mut()
    }

    pub fn current_kind(&self) -> Option<SourceKind> {
        self.current.as_deref().map(|s| s.kind())
    }

    /// Two-phase teardown of the active source: `stop` halts streaming,
    /// then `detach` releases every remaining handle. Detach always runs,
    /// even when stop errors, so no handle survives a failed stop.
    pub fn cleanup(&mut self) -> Result<(), SourceError> {
        if let Some(mut source) = self.current.take() {
            debug!("Tearing down video source: {:?}", source.kind());
            let stopped = source.stop();
            source.detach();
            stopped?;
        }
        Ok(())
    }

    fn construct(config: &VideoConfig) -> Result<Box<dyn VideoSource>, SourceError> {
        match config {
            VideoConfig::Camera(_) => Ok(Box::new(CameraSource::new())),
            VideoConfig::TestClip(_) => Ok(Box::new(ClipSource::new())),
            VideoConfig::Network(_) => Err(SourceError::UnsupportedSourceType("network")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::source::frame::RawFrame;
    use crate::{ClipConfig, NetworkConfig};
    use std::sync::{Arc, Mutex};

    type EventLog = Arc<Mutex<Vec<String>>>;

    struct MockSource {
        name: &'static str,
        log: EventLog,
        ready: bool,
    }

    impl MockSource {
        fn boxed(name: &'static str, log: &EventLog) -> Box<dyn VideoSource> {
            Box::new(Self {
                name,
                log: log.clone(),
                ready: false,
            })
        }

        fn record(&self, event: &str) {
            self.log.lock().unwrap().push(format!("{}:{event}", self.name));
        }
    }

    impl VideoSource for MockSource {
        fn kind(&self) -> SourceKind {
            SourceKind::TestClip
        }

        fn initialize(&mut self, _config: &VideoConfig) -> Result<(), SourceError> {
            self.record("initialize");
            self.ready = true;
            Ok(())
        }

        fn dimensions(&self) -> (u32, u32) {
            if self.ready {
                (8, 8)
            } else {
                (0, 0)
            }
        }

        fn is_ready(&self) -> bool {
            self.ready
        }

        fn current_frame(&mut self) -> Result<Option<RawFrame>, SourceError> {
            self.record("frame");
            Ok(None)
        }

        fn stop(&mut self) -> Result<(), SourceError> {
            self.record("stop");
            self.ready = false;
            Ok(())
        }

        fn detach(&mut self) {
            self.record("detach");
        }
    }

    fn clip_config() -> VideoConfig {
        VideoConfig::TestClip(ClipConfig {
            path: "synthetic://".into(),
            width: 8,
            height: 8,
            fps: 30,
        })
    }

    #[test]
    fn switch_stops_and_detaches_before_new_initialize() {
        let log: EventLog = Arc::new(Mutex::new(Vec::new()));
        let mut factory = VideoSourceFactory::new();

        factory.adopt(MockSource::boxed("a", &log), &clip_config()).unwrap();
        factory.adopt(MockSource::boxed("b", &log), &clip_config()).unwrap();

        let events = log.lock().unwrap().clone();
        assert_eq!(
            events,
            vec!["a:initialize", "a:stop", "a:detach", "b:initialize"]
        );
    }

    #[test]
    fn unsupported_type_leaves_current_source_untouched() {
        let log: EventLog = Arc::new(Mutex::new(Vec::new()));
        let mut factory = VideoSourceFactory::new();
        factory.adopt(MockSource::boxed("a", &log), &clip_config()).unwrap();

        let network = VideoConfig::Network(NetworkConfig {
            url: "rtsp://example".into(),
        });
        let err = factory.create_source(&network).unwrap_err();
        assert!(matches!(err, SourceError::UnsupportedSourceType("network")));

        // "a" was never stopped and is still active.
        let events = log.lock().unwrap().clone();
        assert_eq!(events, vec!["a:initialize"]);
        assert!(factory.current_source().is_some());
    }

    #[test]
    fn init_failure_leaves_no_active_source() {
        let log: EventLog = Arc::new(Mutex::new(Vec::new()));
        let mut factory = VideoSourceFactory::new();
        factory.adopt(MockSource::boxed("a", &log), &clip_config()).unwrap();

        // A real clip source pointed at a missing directory fails to
        // initialize; by then "a" must already be torn down.
        let bad = VideoConfig::TestClip(ClipConfig {
            path: "/nonexistent/clip".into(),
            width: 0,
            height: 0,
            fps: 30,
        });
        assert!(factory.create_source(&bad).is_err());
        assert!(factory.current_source().is_none());

        let events = log.lock().unwrap().clone();
        assert_eq!(events, vec!["a:initialize", "a:stop", "a:detach"]);
    }

    #[test]
    fn cleanup_on_empty_factory_is_a_no_op() {
        let mut factory = VideoSourceFactory::new();
        factory.cleanup().unwrap();
        assert!(factory.current_kind().is_none());
    }
}
