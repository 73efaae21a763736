//! Low-memory signal adapter.
//!
//! The platform raises a [`PressureSignal`] from whatever thread its memory
//! warning arrives on. The producer thread polls the handler between frames
//! and, if the signal is up, stops the recording through the manager. The
//! stop is final: recording does not resume.

use crate::error::CaptureError;
use crate::finalizer::FinalizedArtifact;
use crate::manager::SessionManager;
use crate::source::DepthSensor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cloneable handle the platform uses to report memory pressure.
#[derive(Debug, Clone, Default)]
pub struct PressureSignal(Arc<AtomicBool>);

impl PressureSignal {
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Turns raised signals into a forced stop.
#[derive(Debug, Default)]
pub struct MemoryPressureHandler {
    signal: PressureSignal,
}

impl MemoryPressureHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to pass to the platform layer.
    pub fn signal(&self) -> PressureSignal {
        self.signal.clone()
    }

    /// Consume a pending signal, if any, and force the manager to stop.
    ///
    /// Returns the stop result when a recording was cut short.
    pub fn poll<S: DepthSensor>(
        &self,
        manager: &mut SessionManager<S>,
    ) -> Option<Result<FinalizedArtifact, CaptureError>> {
        if !self.signal.0.swap(false, Ordering::SeqCst) {
            return None;
        }
        manager.on_memory_pressure()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_shared_between_clones() {
        let handler = MemoryPressureHandler::new();
        let signal = handler.signal();
        assert!(!handler.signal().is_raised());
        signal.raise();
        assert!(handler.signal().is_raised());
    }
}
