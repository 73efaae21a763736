//! Segment writer pool.
//!
//! Accepted batches are handed to a fixed set of writer threads through a
//! bounded queue. Each finished write is reported to the session's tracker;
//! a failed write only marks its own frame as failed.

use crate::events::{CaptureEvent, EventSink};
use crate::session::CaptureSession;
use crate::tracker::{FrameWriteTask, TaskStatus, TaskTracker, TrackerError, WriteOutcome};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use depthcap_data::{PlyError, PointBatch, write_points_to_ply};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Why a single segment write failed.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Encoding failed: {0}")]
    Encode(#[from] PlyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Write queue is full")]
    QueueFull,

    #[error("Writer pool is shut down")]
    PoolClosed,
}

struct WriteJob {
    batch: PointBatch,
    output_path: PathBuf,
    tracker: Arc<TaskTracker>,
}

/// Fixed-size pool of segment writer threads.
pub struct StorageWriter {
    sender: Option<Sender<WriteJob>>,
    workers: Vec<JoinHandle<()>>,
    events: EventSink,
}

impl StorageWriter {
    /// Spawn `threads` writers sharing a queue of `queue_capacity` jobs.
    pub fn new(threads: usize, queue_capacity: usize, events: EventSink) -> Result<Self, std::io::Error> {
        let (sender, receiver) = bounded::<WriteJob>(queue_capacity.max(1));
        let workers = (0..threads.max(1))
            .map(|id| {
                let receiver = receiver.clone();
                let events = events.clone();
                thread::Builder::new()
                    .name(format!("segment-writer-{}", id))
                    .spawn(move || run_worker(receiver, events))
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!("Started {} segment writers (queue {})", workers.len(), queue_capacity);
        Ok(Self {
            sender: Some(sender),
            workers,
            events,
        })
    }

    /// Queue one batch for writing into `session`'s data folder.
    ///
    /// Never blocks. The task is registered as pending before it is queued; if
    /// the queue is full it is failed on the spot and the capture goes on.
    pub fn write(
        &self,
        session: &CaptureSession,
        batch: PointBatch,
    ) -> Result<FrameWriteTask, TrackerError> {
        let frame_index = batch.frame_index;
        let tracker = session.tracker().clone();
        let output_path = session.segment_path(frame_index);
        let mut task = tracker.record_start(frame_index, output_path.clone())?;
        self.events.publish(CaptureEvent::TaskStarted { frame_index });

        let job = WriteJob {
            batch,
            output_path,
            tracker: tracker.clone(),
        };
        let rejected = match &self.sender {
            Some(sender) => match sender.try_send(job) {
                Ok(()) => None,
                Err(TrySendError::Full(_)) => Some(WriteError::QueueFull),
                Err(TrySendError::Disconnected(_)) => Some(WriteError::PoolClosed),
            },
            None => Some(WriteError::PoolClosed),
        };

        if let Some(err) = rejected {
            warn!("Dropping frame {}: {}", frame_index, err);
            task.status = complete(&tracker, &self.events, frame_index, Err(err));
            task.failure = tracker.task(frame_index).and_then(|t| t.failure);
        } else {
            debug!("Queued frame {} for writing", frame_index);
        }
        Ok(task)
    }

    /// Stop accepting work and wait for queued writes to finish.
    pub fn shutdown(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("Segment writer thread panicked");
            }
        }
    }
}

#[cfg(test)]
impl StorageWriter {
    /// A pool whose queue nobody drains; the caller gets the receiving end.
    fn without_workers(queue_capacity: usize, events: EventSink) -> (Self, Receiver<WriteJob>) {
        let (sender, receiver) = bounded::<WriteJob>(queue_capacity);
        let writer = Self {
            sender: Some(sender),
            workers: Vec::new(),
            events,
        };
        (writer, receiver)
    }
}

impl Drop for StorageWriter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(receiver: Receiver<WriteJob>, events: EventSink) {
    for job in receiver.iter() {
        let frame_index = job.batch.frame_index;
        let result = persist(&job.batch, &job.output_path);
        if let Err(e) = &result {
            warn!("Write for frame {} failed: {}", frame_index, e);
        }
        complete(&job.tracker, &events, frame_index, result);
    }
}

fn complete(
    tracker: &TaskTracker,
    events: &EventSink,
    frame_index: u64,
    result: Result<usize, WriteError>,
) -> TaskStatus {
    let outcome = match result {
        Ok(points) => WriteOutcome::Written { points },
        Err(e) => WriteOutcome::Failed {
            reason: e.to_string(),
        },
    };
    match tracker.record_result(frame_index, outcome) {
        Ok(status) => {
            events.publish(CaptureEvent::TaskFinished {
                frame_index,
                succeeded: status == TaskStatus::Succeeded,
            });
            status
        }
        Err(e) => {
            error!("Lost write result: {}", e);
            TaskStatus::Failed
        }
    }
}

/// Write to `<segment>.part`, then rename into place. A partial file is left
/// behind on failure.
fn persist(batch: &PointBatch, output_path: &Path) -> Result<usize, WriteError> {
    let part = part_path(output_path);
    write_points_to_ply(&part, &batch.points)?;
    fs::rename(&part, output_path)?;
    Ok(batch.len())
}

pub(crate) fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureConfig;
    use crate::events::event_channel;
    use depthcap_data::{ConfidenceLevel, PointRecord, load_points_from_ply};
    use glam::Vec3;
    use tempfile::TempDir;

    fn batch(frame_index: u64, n: usize) -> PointBatch {
        let points = (0..n)
            .map(|i| PointRecord::new(Vec3::splat(i as f32), [1, 2, 3], ConfidenceLevel::High))
            .collect();
        PointBatch::new(frame_index, points)
    }

    fn session(root: &TempDir) -> CaptureSession {
        CaptureSession::create(&CaptureConfig::default().with_root_dir(root.path())).unwrap()
    }

    #[test]
    fn test_writes_segment_and_reports() {
        let root = TempDir::new().unwrap();
        let session = session(&root);
        let (events, receiver) = event_channel();
        let mut writer = StorageWriter::new(2, 4, events).unwrap();

        let task = writer.write(&session, batch(5, 3)).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        session.tracker().wait_idle();

        let done = session.tracker().task(5).unwrap();
        assert_eq!(done.status, TaskStatus::Succeeded);
        assert_eq!(done.point_count, 3);
        assert_eq!(load_points_from_ply(&done.output_path).unwrap().len(), 3);

        writer.shutdown();
        let events: Vec<_> = receiver.try_iter().collect();
        assert!(events.contains(&CaptureEvent::TaskStarted { frame_index: 5 }));
        assert!(events.contains(&CaptureEvent::TaskFinished {
            frame_index: 5,
            succeeded: true
        }));
    }

    #[test]
    fn test_empty_batch_still_written() {
        let root = TempDir::new().unwrap();
        let session = session(&root);
        let writer = StorageWriter::new(1, 1, EventSink::disconnected()).unwrap();

        writer.write(&session, batch(7, 0)).unwrap();
        session.tracker().wait_idle();

        let task = session.tracker().task(7).unwrap();
        assert_eq!(task.status, TaskStatus::Succeeded);
        assert!(task.output_path.exists());
    }

    #[test]
    fn test_failed_write_keeps_partial_file() {
        let root = TempDir::new().unwrap();
        let session = session(&root);
        // A directory squatting on the segment name makes the final rename fail.
        fs::create_dir(session.segment_path(10)).unwrap();
        let writer = StorageWriter::new(1, 2, EventSink::disconnected()).unwrap();

        writer.write(&session, batch(10, 2)).unwrap();
        session.tracker().wait_idle();

        let task = session.tracker().task(10).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.failure.is_some());
        assert!(part_path(&session.segment_path(10)).exists());
    }

    #[test]
    fn test_closed_pool_fails_task_without_blocking() {
        let root = TempDir::new().unwrap();
        let session = session(&root);
        let mut writer = StorageWriter::new(1, 1, EventSink::disconnected()).unwrap();
        writer.shutdown();

        let task = writer.write(&session, batch(1, 1)).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.failure.as_deref(), Some("Writer pool is shut down"));
        assert_eq!(session.tracker().pending(), 0);
    }

    #[test]
    fn test_full_queue_fails_task_without_blocking() {
        let root = TempDir::new().unwrap();
        let session = session(&root);
        let (events, receiver) = event_channel();
        let (mut writer, jobs) = StorageWriter::without_workers(1, events.clone());

        let queued = writer.write(&session, batch(5, 2)).unwrap();
        assert_eq!(queued.status, TaskStatus::Pending);

        let dropped = writer.write(&session, batch(10, 2)).unwrap();
        assert_eq!(dropped.status, TaskStatus::Failed);
        assert_eq!(dropped.failure.as_deref(), Some("Write queue is full"));
        assert!(!session.segment_path(10).exists());

        let counts = session.tracker().counts();
        assert_eq!((counts.started, counts.completed, counts.failed), (2, 1, 1));
        assert_eq!(session.tracker().pending(), 1);

        // Draining the queue afterwards still completes the frame that got in.
        writer.shutdown();
        run_worker(jobs, events);
        assert_eq!(session.tracker().pending(), 0);
        assert_eq!(session.tracker().task(5).unwrap().status, TaskStatus::Succeeded);
        assert!(receiver.try_iter().any(|e| e
            == CaptureEvent::TaskFinished {
                frame_index: 10,
                succeeded: false
            }));
    }

    #[test]
    fn test_many_writes_all_complete() {
        let root = TempDir::new().unwrap();
        let session = session(&root);
        let writer = StorageWriter::new(3, 64, EventSink::disconnected()).unwrap();

        for i in 1..=40 {
            writer.write(&session, batch(i, 10)).unwrap();
        }
        session.tracker().wait_idle();

        let counts = session.tracker().counts();
        assert_eq!(counts.started, 40);
        assert_eq!(counts.completed, 40);
        assert_eq!(counts.failed, 0);
    }

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path(Path::new("/a/frame_000001.ply")),
            PathBuf::from("/a/frame_000001.ply.part")
        );
    }
}
