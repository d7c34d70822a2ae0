//! Polling a long-running operation until it settles
//!
//! The interval starts at [`PollSchedule::first_delay`] and doubles (with
//! jitter) up to [`PollSchedule::max_delay`]. No sleep extends past the
//! deadline. Polling does not observe run cancellation: an operation that was
//! started is waited on so its resource can be recorded.

use backon::{BackoffBuilder, ExponentialBuilder};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

/// When to poll and for how long
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub first_delay: Duration,
    pub max_delay: Duration,
    /// Total time allowed, measured from the first poll
    pub deadline: Duration,
}

#[derive(Debug, Error)]
pub enum PollError<E> {
    #[error("{label} was not ready after {}s ({polls} polls)", after.as_secs())]
    TimedOut {
        label: String,
        after: Duration,
        polls: u32,
    },

    #[error("{0}")]
    Failed(E),
}

/// Call `poll` until it yields `Ok(true)`.
///
/// `Ok(false)` means "not yet"; an `Err` ends polling immediately. Returns
/// the number of polls made.
pub async fn poll_until_ready<F, Fut, E>(
    schedule: &PollSchedule,
    label: &str,
    poll: F,
) -> Result<u32, PollError<E>>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: fmt::Display,
{
    let started = Instant::now();
    let mut intervals = ExponentialBuilder::default()
        .with_min_delay(schedule.first_delay)
        .with_max_delay(schedule.max_delay)
        .with_factor(2.0)
        .with_jitter()
        .without_max_times()
        .build();
    let mut polls = 0u32;

    loop {
        let elapsed = started.elapsed();
        if elapsed >= schedule.deadline {
            return Err(PollError::TimedOut {
                label: label.to_string(),
                after: schedule.deadline,
                polls,
            });
        }

        polls += 1;
        match poll().await {
            Ok(true) => {
                debug!(operation = %label, polls, "Operation settled");
                return Ok(polls);
            }
            Ok(false) => {}
            Err(e) => {
                warn!(operation = %label, polls, error = %e, "Polling failed");
                return Err(PollError::Failed(e));
            }
        }

        let left = schedule.deadline.saturating_sub(started.elapsed());
        let pause = intervals.next().unwrap_or(schedule.max_delay).min(left);
        debug!(operation = %label, polls, pause_ms = pause.as_millis(), "Still running");

        tokio::time::sleep(pause).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn schedule(deadline_ms: u64) -> PollSchedule {
        PollSchedule {
            first_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(40),
            deadline: Duration::from_millis(deadline_ms),
        }
    }

    #[tokio::test]
    async fn test_ready_on_first_poll() {
        let polls = poll_until_ready(&schedule(1_000), "lat1", || async {
            Ok::<_, String>(true)
        })
        .await
        .unwrap();
        assert_eq!(polls, 1);
    }

    #[tokio::test]
    async fn test_polls_until_operation_succeeds() {
        let seen = AtomicU32::new(0);

        let polls = poll_until_ready(&schedule(5_000), "lat1", || {
            let n = seen.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, String>(n == 3) }
        })
        .await
        .unwrap();

        assert_eq!(polls, 4);
        assert_eq!(seen.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_deadline_bounds_the_wait() {
        let started = std::time::Instant::now();
        let err = poll_until_ready(&schedule(80), "lat1", || async {
            Ok::<_, String>(false)
        })
        .await
        .unwrap_err();

        assert!(matches!(err, PollError::TimedOut { polls, .. } if polls >= 2));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(err.to_string().starts_with("lat1 was not ready"));
    }

    #[tokio::test]
    async fn test_zero_deadline_never_polls() {
        let err = poll_until_ready(&schedule(0), "lat1", || async {
            Ok::<_, String>(true)
        })
        .await
        .unwrap_err();
        assert!(matches!(err, PollError::TimedOut { polls: 0, .. }));
    }

    #[tokio::test]
    async fn test_failed_poll_stops_immediately() {
        let seen = AtomicU32::new(0);
        let err = poll_until_ready(&schedule(5_000), "lat1", || {
            seen.fetch_add(1, Ordering::SeqCst);
            async { Err::<bool, _>("StorageAccountAlreadyTaken".to_string()) }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, PollError::Failed(ref e) if e == "StorageAccountAlreadyTaken"));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
