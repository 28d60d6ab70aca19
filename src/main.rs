//! Artemis marker-tracking demo loop.
//!
//! Drives the frame -> marker -> pose pipeline at a fixed tick rate and
//! logs what it finds. The consuming renderer is expected to replace
//! this loop and call `process_frame` from its own tick.

use std::time::Duration;

use artemis::detect::StubBackend;
use artemis::manager::ArManager;
use artemis::Config;
use color_eyre::Result;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter("artemis=debug")
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("Artemis launching...");

    // Load configuration: artemis.toml if present, ARTEMIS_* overrides.
    let settings = config::Config::builder()
        .add_source(config::File::with_name("artemis").required(false))
        .add_source(config::Environment::with_prefix("ARTEMIS").separator("__"))
        .build()?;
    let cfg: Config = settings.try_deserialize().unwrap_or_else(|e| {
        warn!("falling back to default config: {e}");
        Config::default()
    });
    info!("Video source: {:?}", cfg.video);

    let mut manager = ArManager::new(Box::new(StubBackend::new()), cfg.tracking.marker_size_mm);
    manager.initialize(&cfg.video)?;

    let tick = Duration::from_secs(1).checked_div(cfg.tracking.tick_hz.max(1));
    let mut ticker = tokio::time::interval(tick.unwrap_or(Duration::from_millis(16)));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
            _ = ticker.tick() => {
                match manager.process_frame() {
                    Ok(markers) => {
                        for marker in &markers {
                            match &marker.pose {
                                Some(pose) => info!(
                                    id = marker.id,
                                    x = pose.translation.x,
                                    y = pose.translation.y,
                                    z = pose.translation.z,
                                    error = pose.error,
                                    "marker"
                                ),
                                None => info!(id = marker.id, "marker without pose"),
                            }
                        }
                    }
                    Err(e) => {
                        error!("tick failed: {e}");
                        break;
                    }
                }
            }
        }
    }

    manager.dispose()?;
    info!("Artemis shutting down");
    Ok(())
}
