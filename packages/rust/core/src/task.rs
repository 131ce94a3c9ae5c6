//! Single-active-task handle.
//!
//! Starting a task through a [`TaskSlot`] cancels whichever task the slot
//! started before. Tasks observe cancellation at their own iteration
//! boundaries; nothing is interrupted mid-call. The slot empties itself when
//! the running task's [`ActiveTask`] is dropped.

use std::sync::{Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct Current {
    generation: u64,
    token: Option<CancellationToken>,
}

#[derive(Debug, Default)]
pub struct TaskSlot {
    current: Mutex<Current>,
}

/// The running task's claim on its slot.
#[derive(Debug)]
pub struct ActiveTask<'a> {
    slot: &'a TaskSlot,
    generation: u64,
    token: CancellationToken,
}

impl ActiveTask<'_> {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for ActiveTask<'_> {
    fn drop(&mut self) {
        let mut current = self.slot.lock();
        // A newer task owns the slot; leave it alone.
        if current.generation == self.generation {
            current.token = None;
        }
    }
}

impl TaskSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Current> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cancel the previous task, if any, and hand out the claim for the next one.
    pub fn begin(&self) -> ActiveTask<'_> {
        let token = CancellationToken::new();
        let mut current = self.lock();
        if let Some(previous) = current.token.replace(token.clone()) {
            previous.cancel();
        }
        current.generation += 1;
        ActiveTask {
            slot: self,
            generation: current.generation,
            token,
        }
    }

    /// Cancel the current task without starting another.
    pub fn cancel(&self) {
        if let Some(token) = self.lock().token.take() {
            token.cancel();
        }
    }

    /// Whether a task started through this slot is still running.
    pub fn is_active(&self) -> bool {
        self.lock().token.as_ref().is_some_and(|t| !t.is_cancelled())
    }
}
