//! Bounded fan-out of async tasks with cooperative cancellation
//!
//! Every phase of a run is "do this for each region, at most N at a time,
//! and collect results as they finish". [`WorkerPool`] is that loop.

use crate::cancel::CancellationToken;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

/// What the collecting loop does once cancellation is observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelPolicy {
    /// Stop collecting and detach outstanding tasks
    Abandon,
    /// Keep collecting until every spawned task has finished
    Drain,
}

/// Outcome counts of a single [`WorkerPool::run`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutSummary {
    /// Results handed to the callback
    pub completed: usize,
    /// Tasks that saw the cancellation flag before doing any work
    pub skipped: usize,
    /// Whether cancellation was observed while collecting
    pub cancelled: bool,
}

/// Runs one task per item with bounded concurrency.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    limit: usize,
    cancel: Option<CancellationToken>,
    policy: CancelPolicy,
}

impl WorkerPool {
    /// Create a pool running at most `limit` tasks at once, ignoring cancellation.
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            cancel: None,
            policy: CancelPolicy::Abandon,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken, policy: CancelPolicy) -> Self {
        self.cancel = Some(token);
        self.policy = policy;
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }

    /// Spawn `task(item)` for every item and feed results to `on_result` in
    /// completion order.
    ///
    /// Each task waits for a permit and then checks the cancellation flag,
    /// skipping its body when set. The callback runs on the caller's task, so
    /// it may mutate caller state without locking.
    pub async fn run<I, T, R, F, Fut, C>(&self, items: I, task: F, mut on_result: C) -> FanOutSummary
    where
        I: IntoIterator<Item = T>,
        F: Fn(T) -> Fut,
        Fut: Future<Output = R> + Send + 'static,
        R: Send + 'static,
        C: FnMut(R),
    {
        let semaphore = Arc::new(Semaphore::new(self.limit));
        let mut set = JoinSet::new();

        for item in items {
            let work = task(item);
            let semaphore = semaphore.clone();
            let cancel = self.cancel.clone();
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                if cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                    return None;
                }
                Some(work.await)
            });
        }

        let mut summary = FanOutSummary::default();

        while let Some(joined) = set.join_next().await {
            if !summary.cancelled && self.is_cancelled() {
                summary.cancelled = true;
                if self.policy == CancelPolicy::Abandon {
                    debug!(
                        outstanding = set.len(),
                        "Cancellation observed, abandoning outstanding tasks"
                    );
                    set.detach_all();
                    break;
                }
                debug!(outstanding = set.len(), "Cancellation observed, draining tasks");
            }

            match joined {
                Ok(Some(result)) => {
                    summary.completed += 1;
                    on_result(result);
                }
                Ok(None) => summary.skipped += 1,
                Err(e) if e.is_panic() => error!(error = %e, "Worker task panicked"),
                Err(e) => debug!(error = %e, "Worker task aborted"),
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_collects_all_results() {
        let pool = WorkerPool::new(4);
        let mut results = Vec::new();

        let summary = pool
            .run(1..=10u32, |n| async move { n * 2 }, |r| results.push(r))
            .await;

        results.sort_unstable();
        assert_eq!(results, (1..=10).map(|n| n * 2).collect::<Vec<_>>());
        assert_eq!(summary.completed, 10);
        assert_eq!(summary.skipped, 0);
        assert!(!summary.cancelled);
    }

    #[tokio::test]
    async fn test_respects_concurrency_limit() {
        let pool = WorkerPool::new(3);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        pool.run(
            0..12,
            |_| {
                let running = running.clone();
                let peak = peak.clone();
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                }
            },
            |_| {},
        )
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_zero_limit_is_clamped() {
        let pool = WorkerPool::new(0);
        assert_eq!(pool.limit(), 1);
        let summary = pool.run(0..3, |n| async move { n }, |_| {}).await;
        assert_eq!(summary.completed, 3);
    }

    #[tokio::test]
    async fn test_precancelled_tasks_are_skipped() {
        let token = CancellationToken::new();
        token.cancel();
        let pool = WorkerPool::new(2).with_cancellation(token, CancelPolicy::Drain);
        let calls = Arc::new(AtomicUsize::new(0));

        let summary = pool
            .run(
                0..5,
                |_| {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                    }
                },
                |_| {},
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(summary.skipped, 5);
        assert_eq!(summary.completed, 0);
        assert!(summary.cancelled);
    }

    #[tokio::test]
    async fn test_abandon_keeps_results_collected_before_cancel() {
        let token = CancellationToken::new();
        let pool = WorkerPool::new(1).with_cancellation(token.clone(), CancelPolicy::Abandon);
        let mut results = Vec::new();

        let summary = pool
            .run(
                0..10u32,
                |n| async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    n
                },
                |r| {
                    results.push(r);
                    if results.len() == 2 {
                        token.cancel();
                    }
                },
            )
            .await;

        assert!(summary.cancelled);
        assert_eq!(results.len(), 2);
        assert_eq!(summary.completed, 2);
    }

    #[tokio::test]
    async fn test_drain_collects_running_tasks() {
        let token = CancellationToken::new();
        let pool = WorkerPool::new(3).with_cancellation(token.clone(), CancelPolicy::Drain);
        let mut results = Vec::new();

        let summary = pool
            .run(
                0..6u32,
                |n| {
                    let token = token.clone();
                    async move {
                        if n == 0 {
                            token.cancel();
                        }
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        n
                    }
                },
                |r| results.push(r),
            )
            .await;

        assert!(summary.cancelled);
        // Everything that started before the flag was set is collected
        assert_eq!(summary.completed + summary.skipped, 6);
        assert_eq!(results.len(), summary.completed);
        assert!(results.contains(&0));
    }

    #[tokio::test]
    async fn test_panicking_task_is_skipped() {
        let pool = WorkerPool::new(2);
        let mut results = Vec::new();

        let summary = pool
            .run(
                0..4u32,
                |n| async move {
                    if n == 2 {
                        panic!("boom");
                    }
                    n
                },
                |r| results.push(r),
            )
            .await;

        results.sort_unstable();
        assert_eq!(results, vec![0, 1, 3]);
        assert_eq!(summary.completed, 3);
    }
}
