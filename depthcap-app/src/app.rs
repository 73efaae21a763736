//! Capture runner with builder pattern.

use depthcap_capture::{
    CaptureConfig, CaptureError, CaptureEvent, FinalizedArtifact, MemoryPressureHandler,
    PumpOutcome, SessionManager, SyntheticSensor, event_channel,
};
use crossbeam_channel::Receiver;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors that end a capture run.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// Logging configuration.
pub struct LoggingConfig {
    pub level: String,
    pub enable_tracy: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            enable_tracy: false,
        }
    }
}

/// Builder for configuring and running one capture.
pub struct CaptureApp {
    config: CaptureConfig,
    sensor_size: (u32, u32),
    frames: u64,
    memory_pressure_at: Option<u64>,
    logging: LoggingConfig,
}

impl CaptureApp {
    /// Create a runner with default sensor settings.
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            sensor_size: (64, 48),
            frames: 120,
            memory_pressure_at: None,
            logging: LoggingConfig::default(),
        }
    }

    /// Set the synthetic depth resolution.
    pub fn with_sensor_size(mut self, width: u32, height: u32) -> Self {
        self.sensor_size = (width, height);
        self
    }

    /// Set how many frames the sensor delivers.
    pub fn with_frames(mut self, frames: u64) -> Self {
        self.frames = frames;
        self
    }

    /// Simulate a platform memory warning after `frame` frames.
    pub fn with_memory_pressure_at(mut self, frame: Option<u64>) -> Self {
        self.memory_pressure_at = frame;
        self
    }

    /// Configure logging.
    pub fn with_logging(mut self, config: LoggingConfig) -> Self {
        self.logging = config;
        self
    }

    /// Run the capture and return the merged artifact.
    pub fn run(self) -> Result<FinalizedArtifact, AppError> {
        self.init_logging();
        self.capture()
    }

    fn capture(&self) -> Result<FinalizedArtifact, AppError> {
        let (width, height) = self.sensor_size;
        let sensor = SyntheticSensor::new(width, height).with_frame_limit(self.frames);
        let (events, receiver) = event_channel();
        let mut manager = SessionManager::with_events(self.config.clone(), sensor, events)?;
        let pressure = MemoryPressureHandler::new();
        let signal = pressure.signal();

        let folder = manager.start()?.folder().to_path_buf();
        info!("Recording into {}", folder.display());

        loop {
            let outcome = manager.pump()?;
            report_events(&receiver, &manager);

            if self.memory_pressure_at == Some(manager.sensor().delivered()) {
                signal.raise();
            }
            if let Some(result) = pressure.poll(&mut manager) {
                report_events(&receiver, &manager);
                return Ok(result?);
            }
            if outcome == PumpOutcome::SourceEnded {
                break;
            }
        }

        let result = manager.stop();
        report_events(&receiver, &manager);
        Ok(result?)
    }

    fn init_logging(&self) {
        #[cfg(feature = "tracy")]
        {
            if self.logging.enable_tracy {
                use tracing_subscriber::Layer;
                use tracing_subscriber::layer::SubscriberExt;
                use tracing_subscriber::util::SubscriberInitExt;
                tracing_subscriber::registry()
                    .with(tracing_tracy::TracyLayer::default())
                    .with(
                        tracing_subscriber::fmt::layer().with_filter(
                            tracing_subscriber::EnvFilter::try_from_default_env()
                                .unwrap_or_else(|_| self.logging.level.clone().into()),
                        ),
                    )
                    .init();
                return;
            }
        }
        #[cfg(not(feature = "tracy"))]
        {
            if self.logging.enable_tracy {
                eprintln!("Tracy support not compiled in; rebuild with --features tracy");
            }
        }

        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&self.logging.level)),
            )
            .with_target(false)
            .init();
    }
}

/// Log whatever the session published since the last call.
fn report_events(receiver: &Receiver<CaptureEvent>, manager: &SessionManager<SyntheticSensor>) {
    for event in receiver.try_iter() {
        match event {
            CaptureEvent::StateChanged { from, to } => info!("State: {} -> {}", from, to),
            CaptureEvent::TaskStarted { frame_index } => debug!("Saving frame {}", frame_index),
            CaptureEvent::TaskFinished { .. } => info!("{}", manager.progress().status_line()),
            CaptureEvent::MemoryWarning { message } => warn!("Low memory warning: {}", message),
            CaptureEvent::SensorFailure {
                attempt,
                fatal,
                message,
            } => {
                if fatal {
                    error!("Sensor session failed (attempt {}): {}", attempt, message);
                } else {
                    warn!("Sensor session restarted (attempt {}): {}", attempt, message);
                }
            }
            CaptureEvent::Finalized {
                path,
                frame_count,
                dropped_frames,
            } => info!(
                "Point cloud saved: {} ({} frames, {} dropped)",
                path.display(),
                frame_count,
                dropped_frames
            ),
            CaptureEvent::NoDataCaptured { folder } => {
                warn!("Nothing captured; raw data kept in {}", folder.display())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_capture_produces_artifact() {
        let root = TempDir::new().unwrap();
        let config = CaptureConfig::default()
            .with_root_dir(root.path())
            .with_pick_every_n(4);
        let artifact = CaptureApp::new(config)
            .with_sensor_size(8, 6)
            .with_frames(12)
            .capture()
            .unwrap();
        assert_eq!(artifact.frame_count, 3);
        assert!(artifact.path.exists());
    }

    #[test]
    fn test_memory_pressure_cuts_capture_short() {
        let root = TempDir::new().unwrap();
        let config = CaptureConfig::default()
            .with_root_dir(root.path())
            .with_pick_every_n(2);
        let artifact = CaptureApp::new(config)
            .with_sensor_size(8, 6)
            .with_frames(100)
            .with_memory_pressure_at(Some(10))
            .capture()
            .unwrap();
        assert_eq!(artifact.frame_count, 5);
    }

    #[test]
    fn test_too_few_frames_reports_no_data() {
        let root = TempDir::new().unwrap();
        let config = CaptureConfig::default().with_root_dir(root.path());
        let result = CaptureApp::new(config)
            .with_sensor_size(8, 6)
            .with_frames(2)
            .capture();
        assert!(matches!(
            result,
            Err(AppError::Capture(CaptureError::NoDataCaptured { .. }))
        ));
    }
}
