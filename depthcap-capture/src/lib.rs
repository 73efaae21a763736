//! Depthcap Capture - on-device depth capture sessions
//!
//! A recording session pulls frames from a depth sensor, keeps one frame out
//! of every `pick_every_n`, projects its confident depth pixels into world
//! space and writes each batch to its own segment file on a small writer
//! pool. Stopping waits for those writes and merges the succeeded segments
//! into one PLY artifact.
//!
//! - [`SessionManager`]: lifecycle and frame routing
//! - [`FrameSampler`], [`PointProjector`]: per-frame work on the delivery thread
//! - [`StorageWriter`], [`TaskTracker`]: asynchronous segment writes
//! - [`Finalizer`]: wait and merge
//! - [`MemoryPressureHandler`]: forced stop on low memory
//!
//! ## Example
//!
//! ```no_run
//! use depthcap_capture::{CaptureConfig, PumpOutcome, SessionManager, SyntheticSensor};
//!
//! let sensor = SyntheticSensor::new(64, 48).with_frame_limit(100);
//! let mut manager = SessionManager::new(CaptureConfig::default(), sensor)?;
//! manager.start()?;
//! while manager.pump()? != PumpOutcome::SourceEnded {}
//! let artifact = manager.stop()?;
//! println!("{}", artifact.path.display());
//! # Ok::<(), depthcap_capture::CaptureError>(())
//! ```

mod config;
mod error;
mod events;
mod finalizer;
mod manager;
mod pressure;
mod projector;
mod sampler;
mod session;
mod source;
mod synthetic;
mod tracker;
mod writer;

pub use config::{CaptureConfig, ConfigError};
pub use error::CaptureError;
pub use events::{CaptureEvent, EventSink, MEMORY_WARNING_MESSAGE, ProgressSnapshot, event_channel};
pub use finalizer::{FinalizedArtifact, Finalizer};
pub use manager::{FrameOutcome, PumpOutcome, SensorRecovery, SessionManager};
pub use pressure::{MemoryPressureHandler, PressureSignal};
pub use projector::PointProjector;
pub use sampler::{FrameSampler, SampleDecision};
pub use session::{CaptureSession, DATA_DIR, SessionState};
pub use source::{
    CameraIntrinsics, ConfidenceMap, DepthMap, DepthSensor, DepthSource, FrameSample, SensorError,
};
pub use synthetic::SyntheticSensor;
pub use tracker::{FrameWriteTask, TaskStatus, TaskTracker, TrackerCounts, TrackerError, WriteOutcome};
pub use writer::{StorageWriter, WriteError};

// Re-export point types for convenience
pub use depthcap_data::{ConfidenceLevel, PointBatch, PointRecord};
