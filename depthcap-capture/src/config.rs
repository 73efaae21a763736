//! Capture configuration.
//!
//! Set before `start()`; each session copies the values it needs and never
//! sees later changes.

use crate::session::DATA_DIR;
use depthcap_data::ConfidenceLevel;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from loading or validating a [`CaptureConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("pick_every_n must be at least 1, got {0}")]
    InvalidCadence(u32),

    #[error("inclusion_radius must be finite and non-negative, got {0}")]
    InvalidRadius(f32),

    #[error("writer_threads must be at least 1")]
    NoWriterThreads,

    #[error("write_queue_capacity must be at least 1")]
    NoQueueCapacity,

    #[error("artifact_name must be a plain, non-empty file name, got '{0}'")]
    InvalidArtifactName(String),

    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Settings for capture sessions and the segment writer pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Process one frame out of every `pick_every_n` delivered.
    pub pick_every_n: u32,
    /// Minimum depth confidence a pixel needs to become a point.
    pub confidence_threshold: ConfidenceLevel,
    /// Maximum point distance from the camera in metres; 0 disables the check.
    pub inclusion_radius: f32,
    /// Directory that holds one folder per session.
    pub root_dir: PathBuf,
    /// Number of segment writer threads.
    pub writer_threads: usize,
    /// Segment writes that may wait for a free writer.
    pub write_queue_capacity: usize,
    /// File name of the merged artifact inside the session folder.
    pub artifact_name: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            pick_every_n: 5,
            confidence_threshold: ConfidenceLevel::Medium,
            inclusion_radius: 0.0,
            root_dir: PathBuf::from("captures"),
            writer_threads: 2,
            write_queue_capacity: 8,
            artifact_name: "pointcloud.ply".to_string(),
        }
    }
}

impl CaptureConfig {
    /// Load a JSON config file; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pick_every_n == 0 {
            return Err(ConfigError::InvalidCadence(self.pick_every_n));
        }
        if !self.inclusion_radius.is_finite() || self.inclusion_radius < 0.0 {
            return Err(ConfigError::InvalidRadius(self.inclusion_radius));
        }
        if self.writer_threads == 0 {
            return Err(ConfigError::NoWriterThreads);
        }
        if self.write_queue_capacity == 0 {
            return Err(ConfigError::NoQueueCapacity);
        }
        let name = self.artifact_name.as_str();
        if name.is_empty()
            || name.contains(['/', '\\'])
            || name == "."
            || name == ".."
            || name == DATA_DIR
        {
            return Err(ConfigError::InvalidArtifactName(self.artifact_name.clone()));
        }
        Ok(())
    }

    /// Set the frame cadence.
    pub fn with_pick_every_n(mut self, n: u32) -> Self {
        self.pick_every_n = n;
        self
    }

    /// Set the confidence threshold.
    pub fn with_confidence_threshold(mut self, level: ConfidenceLevel) -> Self {
        self.confidence_threshold = level;
        self
    }

    /// Set the inclusion radius.
    pub fn with_inclusion_radius(mut self, radius: f32) -> Self {
        self.inclusion_radius = radius;
        self
    }

    /// Set the directory that session folders are created in.
    pub fn with_root_dir(mut self, root: impl Into<PathBuf>) -> Self {
        self.root_dir = root.into();
        self
    }

    /// Set the writer pool size.
    pub fn with_writer_threads(mut self, threads: usize) -> Self {
        self.writer_threads = threads;
        self
    }
}
