//! Merging a session's segments into the final artifact.

use crate::error::CaptureError;
use crate::session::CaptureSession;
use crate::tracker::{FrameWriteTask, TaskTracker};
use crate::writer::part_path;
use chrono::{DateTime, Utc};
use depthcap_data::{PlyError, PlyWriter, load_points_from_ply};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// The merged point cloud of a finished session.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedArtifact {
    pub path: PathBuf,
    /// Frames whose segments made it into the merge.
    pub frame_count: u64,
    pub total_points: u64,
    /// Frames whose writes failed and were left out.
    pub dropped_frames: u64,
    pub created_at: DateTime<Utc>,
}

/// Waits for a session's writes and merges the succeeded segments.
///
/// Once it has produced an artifact, later calls return that artifact again
/// without touching the disk.
#[derive(Debug)]
pub struct Finalizer {
    folder: PathBuf,
    artifact_path: PathBuf,
    tracker: Arc<TaskTracker>,
    artifact: Option<FinalizedArtifact>,
}

impl Finalizer {
    pub fn new(session: &CaptureSession) -> Self {
        Self {
            folder: session.folder().to_path_buf(),
            artifact_path: session.artifact_path(),
            tracker: session.tracker().clone(),
            artifact: None,
        }
    }

    /// The cached artifact, if finalize already succeeded.
    pub fn artifact(&self) -> Option<&FinalizedArtifact> {
        self.artifact.as_ref()
    }

    /// Wait for every pending write, then merge in frame order.
    #[tracing::instrument(skip_all, fields(folder = %self.folder.display()))]
    pub fn finalize(&mut self) -> Result<FinalizedArtifact, CaptureError> {
        if let Some(artifact) = &self.artifact {
            return Ok(artifact.clone());
        }

        self.tracker.wait_idle();
        let counts = self.tracker.counts();
        let succeeded = self.tracker.succeeded_tasks();

        if succeeded.is_empty() {
            warn!(
                "No frames captured ({} dropped); keeping {}",
                counts.failed,
                self.folder.display()
            );
            return Err(CaptureError::NoDataCaptured {
                folder: self.folder.clone(),
                dropped_frames: counts.failed,
            });
        }

        let total_points = merge_segments(&succeeded, &self.artifact_path)?;
        let artifact = FinalizedArtifact {
            path: self.artifact_path.clone(),
            frame_count: succeeded.len() as u64,
            total_points,
            dropped_frames: counts.failed,
            created_at: Utc::now(),
        };
        info!(
            "Finalized {} frames ({} points, {} dropped) into {}",
            artifact.frame_count,
            artifact.total_points,
            artifact.dropped_frames,
            artifact.path.display()
        );
        self.artifact = Some(artifact.clone());
        Ok(artifact)
    }
}

/// Concatenate segments into `dest`, one segment in memory at a time.
fn merge_segments(tasks: &[FrameWriteTask], dest: &Path) -> Result<u64, PlyError> {
    let total: usize = tasks.iter().map(|t| t.point_count).sum();
    let part = part_path(dest);

    let mut writer = PlyWriter::new(BufWriter::new(File::create(&part)?), total)?;
    for task in tasks {
        if task.point_count == 0 {
            continue;
        }
        let points = load_points_from_ply(&task.output_path)?;
        if points.len() != task.point_count {
            return Err(PlyError::CountMismatch {
                expected: task.point_count,
                actual: points.len(),
            });
        }
        writer.write_points(&points)?;
    }
    let buffered = writer.finish()?;
    buffered.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    fs::rename(&part, dest)?;
    Ok(total as u64)
}
