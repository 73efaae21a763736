//! Events published to the operator layer.
//!
//! The core never holds a UI type. Whoever wants progress passes in the
//! sending half of a channel and drains the other end.

use crate::session::SessionState;
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::path::PathBuf;
use tracing::trace;

/// Shown when a low-memory signal forces the recording to stop.
pub const MEMORY_WARNING_MESSAGE: &str =
    "The recording has been stopped. Do not quit the app until all files have been saved.";

/// Something the operator layer may want to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    TaskStarted {
        frame_index: u64,
    },
    TaskFinished {
        frame_index: u64,
        succeeded: bool,
    },
    MemoryWarning {
        message: String,
    },
    SensorFailure {
        attempt: u32,
        fatal: bool,
        message: String,
    },
    Finalized {
        path: PathBuf,
        frame_count: u64,
        dropped_frames: u64,
    },
    NoDataCaptured {
        folder: PathBuf,
    },
}

/// Sending side of the event channel. Cloned into writer threads.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<Sender<CaptureEvent>>,
}

impl EventSink {
    pub fn new(sender: Sender<CaptureEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// A sink that drops every event.
    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn publish(&self, event: CaptureEvent) {
        if let Some(sender) = &self.sender {
            if sender.send(event).is_err() {
                trace!("Event receiver dropped");
            }
        }
    }
}

/// Create a connected sink and its receiver.
pub fn event_channel() -> (EventSink, Receiver<CaptureEvent>) {
    let (sender, receiver) = unbounded();
    (EventSink::new(sender), receiver)
}

/// Progress numbers for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub pick_every_n: u32,
    pub tasks_started: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub state: SessionState,
}

impl ProgressSnapshot {
    /// One-line summary, e.g. `1/5 of new frames, files saved 3/4`.
    pub fn status_line(&self) -> String {
        format!(
            "1/{} of new frames, files saved {}/{}",
            self.pick_every_n,
            self.tasks_completed - self.tasks_failed,
            self.tasks_started
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_line() {
        let snapshot = ProgressSnapshot {
            pick_every_n: 5,
            tasks_started: 4,
            tasks_completed: 4,
            tasks_failed: 1,
            state: SessionState::Running,
        };
        assert_eq!(snapshot.status_line(), "1/5 of new frames, files saved 3/4");
    }

    #[test]
    fn test_disconnected_sink_is_silent() {
        EventSink::disconnected().publish(CaptureEvent::TaskStarted { frame_index: 1 });
    }

    #[test]
    fn test_publish_after_receiver_dropped() {
        let (sink, receiver) = event_channel();
        drop(receiver);
        sink.publish(CaptureEvent::TaskStarted { frame_index: 1 });
    }

    #[test]
    fn test_events_arrive_in_order() {
        let (sink, receiver) = event_channel();
        sink.publish(CaptureEvent::TaskStarted { frame_index: 5 });
        sink.publish(CaptureEvent::TaskFinished {
            frame_index: 5,
            succeeded: true,
        });
        let events: Vec<_> = receiver.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], CaptureEvent::TaskStarted { frame_index: 5 });
    }
}
