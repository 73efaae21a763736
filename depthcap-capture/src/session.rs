//! Capture session values and lifecycle states.

use crate::config::CaptureConfig;
use crate::tracker::TaskTracker;
use chrono::{DateTime, Local};
use depthcap_data::ConfidenceLevel;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Name of the per-frame segment folder inside a session folder.
pub const DATA_DIR: &str = "data";

/// Lifecycle of the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Running,
    Stopping,
    Finalizing,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Running => write!(f, "Running"),
            SessionState::Stopping => write!(f, "Stopping"),
            SessionState::Finalizing => write!(f, "Finalizing"),
            SessionState::Failed => write!(f, "Failed"),
        }
    }
}

/// One recording, from `start()` to finalize or reset.
///
/// Settings are copied from the config at creation and fixed afterwards.
#[derive(Debug)]
pub struct CaptureSession {
    id: Uuid,
    folder: PathBuf,
    pick_every_n: u32,
    confidence_threshold: ConfidenceLevel,
    inclusion_radius: f32,
    artifact_name: String,
    tracker: Arc<TaskTracker>,
}

impl CaptureSession {
    /// Create the session folder (and its `data/` subfolder) under the
    /// configured root, named after the current local time.
    pub fn create(config: &CaptureConfig) -> io::Result<Self> {
        let started_at = Local::now();
        fs::create_dir_all(&config.root_dir)?;
        let folder = create_unique_dir(&config.root_dir, &folder_name(&started_at))?;
        fs::create_dir(folder.join(DATA_DIR))?;

        let session = Self {
            id: Uuid::new_v4(),
            folder,
            pick_every_n: config.pick_every_n,
            confidence_threshold: config.confidence_threshold,
            inclusion_radius: config.inclusion_radius,
            artifact_name: config.artifact_name.clone(),
            tracker: Arc::new(TaskTracker::new()),
        };
        info!("Created capture session {} at {}", session.id, session.folder.display());
        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn data_dir(&self) -> PathBuf {
        self.folder.join(DATA_DIR)
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.folder.join(&self.artifact_name)
    }

    /// Segment file for one frame.
    pub fn segment_path(&self, frame_index: u64) -> PathBuf {
        self.data_dir().join(format!("frame_{:06}.ply", frame_index))
    }

    pub fn pick_every_n(&self) -> u32 {
        self.pick_every_n
    }

    pub fn confidence_threshold(&self) -> ConfidenceLevel {
        self.confidence_threshold
    }

    pub fn inclusion_radius(&self) -> f32 {
        self.inclusion_radius
    }

    pub fn tracker(&self) -> &Arc<TaskTracker> {
        &self.tracker
    }
}

fn folder_name(time: &DateTime<Local>) -> String {
    time.format("%Y-%m-%d_%H-%M-%S-%3f").to_string()
}

// Two sessions started within the same millisecond get -1, -2, ... suffixes.
fn create_unique_dir(root: &Path, base: &str) -> io::Result<PathBuf> {
    let mut candidate = root.join(base);
    let mut suffix = 0u32;
    loop {
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                suffix += 1;
                candidate = root.join(format!("{}-{}", base, suffix));
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_lays_out_folders() {
        let root = TempDir::new().unwrap();
        let config = CaptureConfig::default()
            .with_root_dir(root.path())
            .with_pick_every_n(3);
        let session = CaptureSession::create(&config).unwrap();

        assert!(session.folder().starts_with(root.path()));
        assert!(session.data_dir().is_dir());
        assert_eq!(session.pick_every_n(), 3);
        assert_eq!(
            session.segment_path(10).file_name().unwrap(),
            "frame_000010.ply"
        );
        assert_eq!(session.artifact_path(), session.folder().join("pointcloud.ply"));
    }

    #[test]
    fn test_folder_names_unique() {
        let root = TempDir::new().unwrap();
        let a = create_unique_dir(root.path(), "same").unwrap();
        let b = create_unique_dir(root.path(), "same").unwrap();
        assert_ne!(a, b);
        assert_eq!(b.file_name().unwrap(), "same-1");
    }

    #[test]
    fn test_settings_fixed_at_creation() {
        let root = TempDir::new().unwrap();
        let mut config = CaptureConfig::default().with_root_dir(root.path());
        let session = CaptureSession::create(&config).unwrap();
        config.pick_every_n = 40;
        config.confidence_threshold = ConfidenceLevel::High;
        assert_eq!(session.pick_every_n(), 5);
        assert_eq!(session.confidence_threshold(), ConfidenceLevel::Medium);
    }
}
