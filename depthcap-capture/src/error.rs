//! Session-level error taxonomy.

use crate::config::ConfigError;
use crate::session::SessionState;
use crate::source::SensorError;
use crate::tracker::TrackerError;
use depthcap_data::PlyError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the capture session to the operator layer.
///
/// Per-frame write failures are not in here: they stay on the frame's task
/// and only show up as `dropped_frames` in the finalize summary.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Sensor failed after {attempts} attempt(s): {source}")]
    SensorFailure {
        attempts: u32,
        #[source]
        source: SensorError,
    },

    #[error("No frames were captured ({dropped_frames} dropped); session folder kept at {}", folder.display())]
    NoDataCaptured { folder: PathBuf, dropped_frames: u64 },

    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to merge point cloud: {0}")]
    Merge(#[from] PlyError),

    #[error("Write bookkeeping error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    /// Whether the operator has to restart the session by hand.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CaptureError::SensorFailure { .. })
    }
}
