//! Bookkeeping for asynchronous segment writes.
//!
//! The tracker is the only state touched by more than one thread during a
//! capture: the delivery thread registers tasks, writer threads complete them
//! and the finalizer waits for them. Everything sits behind one mutex.

use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::error;

/// Misuse of the tracker. None of these happen when tasks are driven through
/// the storage writer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("Frame {0} already has a write task")]
    DuplicateFrame(u64),

    #[error("Frame {0} has no write task")]
    UnknownFrame(u64),

    #[error("Frame {0} already has a terminal status")]
    AlreadyCompleted(u64),
}

/// Lifecycle of one frame write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }
}

/// How a write ended, as reported by a writer.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    Written { points: usize },
    Failed { reason: String },
}

/// One frame's write, from hand-off to terminal status.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameWriteTask {
    pub frame_index: u64,
    pub status: TaskStatus,
    pub output_path: PathBuf,
    /// Points in the written segment; 0 until the write succeeds.
    pub point_count: usize,
    pub failure: Option<String>,
}

/// Counter snapshot taken under the tracker lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackerCounts {
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
}

impl TrackerCounts {
    pub fn pending(&self) -> u64 {
        self.started - self.completed
    }

    pub fn succeeded(&self) -> u64 {
        self.completed - self.failed
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    counts: TrackerCounts,
    tasks: BTreeMap<u64, FrameWriteTask>,
}

/// Thread-safe registry of frame write tasks.
#[derive(Debug, Default)]
pub struct TaskTracker {
    state: Mutex<TrackerState>,
    idle: Condvar,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending write for `frame_index`.
    pub fn record_start(
        &self,
        frame_index: u64,
        output_path: PathBuf,
    ) -> Result<FrameWriteTask, TrackerError> {
        let mut state = self.state.lock();
        if state.tasks.contains_key(&frame_index) {
            error!("Write task for frame {} registered twice", frame_index);
            return Err(TrackerError::DuplicateFrame(frame_index));
        }
        let task = FrameWriteTask {
            frame_index,
            status: TaskStatus::Pending,
            output_path,
            point_count: 0,
            failure: None,
        };
        state.tasks.insert(frame_index, task.clone());
        state.counts.started += 1;
        Ok(task)
    }

    /// Set the terminal status of a pending task. Each task completes once.
    pub fn record_result(
        &self,
        frame_index: u64,
        outcome: WriteOutcome,
    ) -> Result<TaskStatus, TrackerError> {
        let mut state = self.state.lock();
        let task = state
            .tasks
            .get_mut(&frame_index)
            .ok_or(TrackerError::UnknownFrame(frame_index))?;
        if task.status.is_terminal() {
            error!("Write task for frame {} completed twice", frame_index);
            return Err(TrackerError::AlreadyCompleted(frame_index));
        }

        let status = match outcome {
            WriteOutcome::Written { points } => {
                task.status = TaskStatus::Succeeded;
                task.point_count = points;
                TaskStatus::Succeeded
            }
            WriteOutcome::Failed { reason } => {
                task.status = TaskStatus::Failed;
                task.failure = Some(reason);
                TaskStatus::Failed
            }
        };

        state.counts.completed += 1;
        if status == TaskStatus::Failed {
            state.counts.failed += 1;
        }
        if state.counts.pending() == 0 {
            self.idle.notify_all();
        }
        Ok(status)
    }

    pub fn started(&self) -> u64 {
        self.state.lock().counts.started
    }

    pub fn completed(&self) -> u64 {
        self.state.lock().counts.completed
    }

    pub fn failed(&self) -> u64 {
        self.state.lock().counts.failed
    }

    pub fn pending(&self) -> u64 {
        self.state.lock().counts.pending()
    }

    /// All counters from one consistent observation.
    pub fn counts(&self) -> TrackerCounts {
        self.state.lock().counts
    }

    /// Block until every registered task has a terminal status.
    pub fn wait_idle(&self) {
        let mut state = self.state.lock();
        while state.counts.pending() > 0 {
            self.idle.wait(&mut state);
        }
    }

    /// Current state of one task.
    pub fn task(&self, frame_index: u64) -> Option<FrameWriteTask> {
        self.state.lock().tasks.get(&frame_index).cloned()
    }

    /// Every task, ordered by frame index.
    pub fn tasks(&self) -> Vec<FrameWriteTask> {
        self.state.lock().tasks.values().cloned().collect()
    }

    /// Succeeded tasks, ordered by frame index.
    pub fn succeeded_tasks(&self) -> Vec<FrameWriteTask> {
        self.state
            .lock()
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Succeeded)
            .cloned()
            .collect()
    }
}
