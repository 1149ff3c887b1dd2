// src/handoff.rs - Latest-frame slot between the detector thread and the solver
use crate::landmarks::FrameInputs;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

/// Single-slot mailbox. A producer overwrites whatever the consumer has not
/// taken yet, so the solver always works on the newest frame and never queues.
#[derive(Debug, Clone, Default)]
pub struct LatestFrameSlot {
    slot: Arc<Mutex<Option<Arc<FrameInputs>>>>,
    dropped: Arc<AtomicU64>,
}

impl LatestFrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    // A panicked producer cannot leave a half-written Option behind.
    fn guard(&self) -> MutexGuard<'_, Option<Arc<FrameInputs>>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn publish(&self, frame: FrameInputs) {
        let replaced = self.guard().replace(Arc::new(frame));
        if let Some(stale) = replaced {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            trace!("dropped unconsumed frame at t={}", stale.timestamp);
        }
    }

    pub fn take_latest(&self) -> Option<Arc<FrameInputs>> {
        self.guard().take()
    }

    /// Frames overwritten before a consumer took them.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
