//! Session lifecycle and frame routing.
//!
//! ```text
//! Idle ──start──► Running ──stop──► Stopping ──► Finalizing ──► Idle
//!                    │                                   (artifact or NoDataCaptured)
//!                    └──second consecutive sensor failure──► Failed ──reset──► Idle
//! ```
//!
//! The manager is driven from a single producer thread. Frames are sampled
//! and projected on that thread; only segment writes leave it.

use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::events::{CaptureEvent, EventSink, MEMORY_WARNING_MESSAGE, ProgressSnapshot};
use crate::finalizer::{FinalizedArtifact, Finalizer};
use crate::projector::PointProjector;
use crate::sampler::{FrameSampler, SampleDecision};
use crate::session::{CaptureSession, SessionState};
use crate::source::{DepthSensor, DepthSource, FrameSample, SensorError};
use crate::tracker::TaskStatus;
use crate::writer::StorageWriter;
use tracing::{debug, error, info, warn};

/// What happened to one delivered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Not recording; the frame was dropped without counting it.
    Ignored,
    /// Counted but not processed under the configured cadence.
    Skipped { frame_index: u64 },
    /// Projected and handed to the writer pool.
    Dispatched {
        frame_index: u64,
        points: usize,
        status: TaskStatus,
    },
}

/// How the manager dealt with a sensor failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorRecovery {
    /// No session was recording.
    Ignored,
    /// A new sensor session was started; the capture session carries on.
    Restarted,
}

/// Result of pulling one frame from a [`DepthSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    Frame(FrameOutcome),
    Recovered(SensorRecovery),
    SourceEnded,
}

struct ActiveCapture {
    session: CaptureSession,
    sampler: FrameSampler,
    projector: PointProjector,
    consecutive_failures: u32,
}

/// Owns the capture session and drives the state machine.
pub struct SessionManager<S: DepthSensor> {
    config: CaptureConfig,
    sensor: S,
    writer: StorageWriter,
    events: EventSink,
    state: SessionState,
    active: Option<ActiveCapture>,
    finalized: Option<Finalizer>,
}

impl<S: DepthSensor> SessionManager<S> {
    /// Create a manager that publishes no events.
    pub fn new(config: CaptureConfig, sensor: S) -> Result<Self, CaptureError> {
        Self::with_events(config, sensor, EventSink::disconnected())
    }

    /// Create a manager that publishes to `events`.
    pub fn with_events(
        config: CaptureConfig,
        sensor: S,
        events: EventSink,
    ) -> Result<Self, CaptureError> {
        config.validate()?;
        let writer = StorageWriter::new(
            config.writer_threads,
            config.write_queue_capacity,
            events.clone(),
        )?;
        Ok(Self {
            config,
            sensor,
            writer,
            events,
            state: SessionState::Idle,
            active: None,
            finalized: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Replace the configuration for the next session.
    ///
    /// The writer pool is sized at construction and keeps its size.
    pub fn set_config(&mut self, config: CaptureConfig) -> Result<(), CaptureError> {
        if !matches!(self.state, SessionState::Idle | SessionState::Failed) {
            return Err(self.invalid("change configuration"));
        }
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// The session being recorded, if any.
    pub fn session(&self) -> Option<&CaptureSession> {
        self.active.as_ref().map(|a| &a.session)
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }

    /// Counters for the progress display.
    pub fn progress(&self) -> ProgressSnapshot {
        let (pick_every_n, counts) = match &self.active {
            Some(active) => (
                active.session.pick_every_n(),
                active.session.tracker().counts(),
            ),
            None => (self.config.pick_every_n, Default::default()),
        };
        ProgressSnapshot {
            pick_every_n,
            tasks_started: counts.started,
            tasks_completed: counts.completed,
            tasks_failed: counts.failed,
            state: self.state,
        }
    }

    /// Begin a new recording.
    pub fn start(&mut self) -> Result<&CaptureSession, CaptureError> {
        if self.state != SessionState::Idle {
            return Err(self.invalid("start"));
        }

        self.sensor
            .start()
            .map_err(|source| CaptureError::SensorFailure {
                attempts: 1,
                source,
            })?;
        let session = match CaptureSession::create(&self.config) {
            Ok(session) => session,
            Err(e) => {
                self.sensor.stop();
                return Err(e.into());
            }
        };

        self.finalized = None;
        let active = self.active.insert(ActiveCapture {
            sampler: FrameSampler::new(session.pick_every_n()),
            projector: PointProjector::new(
                session.confidence_threshold(),
                session.inclusion_radius(),
            ),
            session,
            consecutive_failures: 0,
        });
        info!(
            "Recording started: 1/{} frames, confidence >= {}, radius {}",
            active.session.pick_every_n(),
            active.session.confidence_threshold(),
            active.session.inclusion_radius()
        );
        Self::transition(&mut self.state, &self.events, SessionState::Running);
        Ok(&active.session)
    }

    /// Route one sensor frame through sampling, projection and storage.
    pub fn on_frame(&mut self, sample: FrameSample) -> Result<FrameOutcome, CaptureError> {
        if self.state != SessionState::Running {
            debug!("Ignoring frame while {}", self.state);
            return Ok(FrameOutcome::Ignored);
        }
        let Some(active) = self.active.as_mut() else {
            return Err(self.invalid("process a frame"));
        };
        active.consecutive_failures = 0;

        match active.sampler.observe() {
            SampleDecision::Skip(frame_index) => Ok(FrameOutcome::Skipped { frame_index }),
            SampleDecision::Accept(frame_index) => {
                let batch = active.projector.project(frame_index, &sample);
                let points = batch.len();
                let task = self.writer.write(&active.session, batch)?;
                Ok(FrameOutcome::Dispatched {
                    frame_index,
                    points,
                    status: task.status,
                })
            }
        }
    }

    /// Stop recording, wait for pending writes and merge them.
    ///
    /// Always ends in `Idle`: with an artifact, or with `NoDataCaptured` when
    /// no frame was stored.
    pub fn stop(&mut self) -> Result<FinalizedArtifact, CaptureError> {
        if !matches!(self.state, SessionState::Running | SessionState::Stopping) {
            return Err(self.invalid("stop"));
        }
        let Some(active) = self.active.take() else {
            return Err(self.invalid("stop"));
        };

        if self.state == SessionState::Running {
            Self::transition(&mut self.state, &self.events, SessionState::Stopping);
        }
        self.sensor.stop();
        info!(
            "Recording stopped after {} frames; {} writes pending",
            active.sampler.frames_seen(),
            active.session.tracker().pending()
        );

        Self::transition(&mut self.state, &self.events, SessionState::Finalizing);
        let mut finalizer = Finalizer::new(&active.session);
        let result = finalizer.finalize();
        Self::transition(&mut self.state, &self.events, SessionState::Idle);

        match &result {
            Ok(artifact) => {
                self.events.publish(CaptureEvent::Finalized {
                    path: artifact.path.clone(),
                    frame_count: artifact.frame_count,
                    dropped_frames: artifact.dropped_frames,
                });
                self.finalized = Some(finalizer);
            }
            Err(CaptureError::NoDataCaptured { folder, .. }) => {
                self.events.publish(CaptureEvent::NoDataCaptured {
                    folder: folder.clone(),
                });
                // Asking again reports the same empty session.
                self.finalized = Some(finalizer);
            }
            Err(e) => error!("Finalize failed: {}", e),
        }
        result
    }

    /// Get the artifact for the current or last session.
    ///
    /// While recording this is `stop()`. Afterwards it returns the artifact
    /// already produced without merging again, or `NoDataCaptured` again if
    /// the last session stored nothing.
    pub fn finalize(&mut self) -> Result<FinalizedArtifact, CaptureError> {
        match self.state {
            SessionState::Running | SessionState::Stopping => self.stop(),
            SessionState::Idle => match self.finalized.as_mut() {
                Some(finalizer) => finalizer.finalize(),
                None => Err(self.invalid("finalize")),
            },
            SessionState::Finalizing | SessionState::Failed => Err(self.invalid("finalize")),
        }
    }

    /// Handle a failure reported by the sensor.
    ///
    /// The first failure restarts the sensor and keeps the session. A second
    /// one before any frame gets through is fatal.
    pub fn on_sensor_failure(&mut self, error: SensorError) -> Result<SensorRecovery, CaptureError> {
        if !matches!(self.state, SessionState::Running | SessionState::Stopping) {
            debug!("Ignoring sensor failure while {}: {}", self.state, error);
            return Ok(SensorRecovery::Ignored);
        }
        let Some(active) = self.active.as_mut() else {
            return Ok(SensorRecovery::Ignored);
        };

        active.consecutive_failures += 1;
        let attempt = active.consecutive_failures;
        if attempt > 1 {
            return Err(self.fail(attempt, error));
        }

        warn!("Sensor failed ({}); restarting sensor session", error);
        self.sensor.stop();
        match self.sensor.start() {
            Ok(()) => {
                self.events.publish(CaptureEvent::SensorFailure {
                    attempt,
                    fatal: false,
                    message: error.to_string(),
                });
                Ok(SensorRecovery::Restarted)
            }
            Err(restart_error) => Err(self.fail(attempt + 1, restart_error)),
        }
    }

    /// Handle a low-memory signal by stopping for good.
    ///
    /// Returns `None` when nothing was recording.
    pub fn on_memory_pressure(&mut self) -> Option<Result<FinalizedArtifact, CaptureError>> {
        warn!("Memory pressure: {}", MEMORY_WARNING_MESSAGE);
        self.events.publish(CaptureEvent::MemoryWarning {
            message: MEMORY_WARNING_MESSAGE.to_string(),
        });
        match self.state {
            SessionState::Running | SessionState::Stopping => Some(self.stop()),
            _ => None,
        }
    }

    /// Drop the current session after a fatal failure (or clear the cached
    /// artifact when idle). In-flight writes finish first; the folder stays.
    pub fn reset(&mut self) -> Result<(), CaptureError> {
        if !matches!(self.state, SessionState::Idle | SessionState::Failed) {
            return Err(self.invalid("reset"));
        }
        if let Some(active) = self.active.take() {
            active.session.tracker().wait_idle();
            info!(
                "Discarded session {}; folder kept at {}",
                active.session.id(),
                active.session.folder().display()
            );
        }
        self.finalized = None;
        Self::transition(&mut self.state, &self.events, SessionState::Idle);
        Ok(())
    }

    fn fail(&mut self, attempts: u32, source: SensorError) -> CaptureError {
        error!("Sensor failed again ({}); session needs a manual restart", source);
        self.sensor.stop();
        self.events.publish(CaptureEvent::SensorFailure {
            attempt: attempts,
            fatal: true,
            message: source.to_string(),
        });
        Self::transition(&mut self.state, &self.events, SessionState::Failed);
        CaptureError::SensorFailure { attempts, source }
    }

    fn transition(state: &mut SessionState, events: &EventSink, to: SessionState) {
        let from = *state;
        if from == to {
            return;
        }
        *state = to;
        debug!("Session state {} -> {}", from, to);
        events.publish(CaptureEvent::StateChanged { from, to });
    }

    fn invalid(&self, operation: &'static str) -> CaptureError {
        CaptureError::InvalidState {
            operation,
            state: self.state,
        }
    }
}

impl<S: DepthSource> SessionManager<S> {
    /// Pull one frame from the sensor and route it.
    pub fn pump(&mut self) -> Result<PumpOutcome, CaptureError> {
        match self.sensor.next_frame() {
            Ok(Some(sample)) => self.on_frame(sample).map(PumpOutcome::Frame),
            Ok(None) => Ok(PumpOutcome::SourceEnded),
            Err(e) => self.on_sensor_failure(e).map(PumpOutcome::Recovered),
        }
    }
}
