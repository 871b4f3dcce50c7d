//! Shutdown coordination between the network layer and the world runner.
//!
//! Shutdown moves through three phases. While `Draining`, sockets stop
//! accepting and reading new packets but the world runner keeps ticking until
//! the jobs already queued have run. `Complete` is set by the runner once the
//! queue is empty and the final tick has finished.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    Running,
    Draining,
    Complete,
}

impl ShutdownPhase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ShutdownPhase::Running,
            1 => ShutdownPhase::Draining,
            _ => ShutdownPhase::Complete,
        }
    }
}

/// Shared shutdown state, cheap to clone into every task.
#[derive(Debug, Clone)]
pub struct ShutdownState {
    phase: Arc<AtomicU8>,
}

impl ShutdownState {
    pub fn new() -> Self {
        Self {
            phase: Arc::new(AtomicU8::new(ShutdownPhase::Running as u8)),
        }
    }

    pub fn phase(&self) -> ShutdownPhase {
        ShutdownPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// True once draining has started. No new packets should be queued.
    pub fn is_shutdown_initiated(&self) -> bool {
        self.phase() != ShutdownPhase::Running
    }

    pub fn is_shutdown_complete(&self) -> bool {
        self.phase() == ShutdownPhase::Complete
    }

    /// Enters `Draining`. Repeated calls are ignored.
    pub fn initiate_shutdown(&self) {
        if self
            .phase
            .compare_exchange(
                ShutdownPhase::Running as u8,
                ShutdownPhase::Draining as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            info!("🛑 Shutdown initiated - sockets stop reading, queued packets will still run");
        }
    }

    /// Enters `Complete`. Called by the world runner after its final tick.
    pub fn complete_shutdown(&self) {
        let previous = self
            .phase
            .swap(ShutdownPhase::Complete as u8, Ordering::AcqRel);
        if previous != ShutdownPhase::Complete as u8 {
            info!("✅ World drained - ready for final cleanup");
        }
    }
}

impl Default for ShutdownState {
    fn default() -> Self {
        Self::new()
    }
}
