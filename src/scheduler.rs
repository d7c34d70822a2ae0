//! One-run-at-a-time scheduling with external cancellation
//!
//! Runs create real cloud resources, so two runs never overlap. Each run gets
//! a [`RunId`] and a fresh [`CancellationToken`] registered for the duration
//! of the run, so another task (a signal handler, a server) can cancel it.

use crate::cancel::CancellationToken;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identifier of one scheduled run (time-ordered UUID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display, derive_more::Deref)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        RunId(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

/// What a scheduled run receives
#[derive(Debug, Clone)]
pub struct RunHandle {
    pub id: RunId,
    pub token: CancellationToken,
}

/// Serializes runs and tracks their cancellation tokens
#[derive(Debug, Default)]
pub struct RunScheduler {
    slot: tokio::sync::Mutex<()>,
    active: Mutex<HashMap<RunId, CancellationToken>>,
}

/// Removes a run from the registry when dropped
struct Registration<'a> {
    scheduler: &'a RunScheduler,
    id: RunId,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.scheduler.registry().remove(&self.id);
        debug!(run_id = %self.id, "Run unregistered");
    }
}

impl RunScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<RunId, CancellationToken>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for the run slot, then run `f` with a registered handle.
    pub async fn run<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce(RunHandle) -> Fut,
        Fut: Future<Output = T>,
    {
        if self.is_busy() {
            info!("Another run is in progress, waiting");
        }
        let _slot = self.slot.lock().await;

        let handle = RunHandle {
            id: RunId::new(),
            token: CancellationToken::new(),
        };
        self.registry().insert(handle.id, handle.token.clone());
        let _registration = Registration {
            scheduler: self,
            id: handle.id,
        };
        debug!(run_id = %handle.id, "Run registered");

        f(handle).await
    }

    /// Cancel one run. Returns whether it was active.
    pub fn cancel(&self, id: &RunId) -> bool {
        match self.registry().get(id) {
            Some(token) => {
                warn!(run_id = %id, "Cancelling run");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every active run, returning how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let registry = self.registry();
        for (id, token) in registry.iter() {
            warn!(run_id = %id, "Cancelling run");
            token.cancel();
        }
        registry.len()
    }

    pub fn active_runs(&self) -> Vec<RunId> {
        self.registry().keys().copied().collect()
    }

    pub fn is_busy(&self) -> bool {
        self.slot.try_lock().is_err()
    }
}
