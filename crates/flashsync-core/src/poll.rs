// ── Bounded polling ──
//
// Association and readiness checks are "ask, sleep, ask again" loops.
// This module gives them one shape with a hard deadline.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep, timeout_at};

/// The condition never held before the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("condition not met within {}s ({attempts} attempts)", .timeout.as_secs())]
pub struct PollTimeout {
    pub timeout: Duration,
    pub attempts: u32,
}

/// Call `probe` every `interval` until it yields `Some`, or fail once
/// `timeout` has elapsed.
///
/// The probe always runs at least once. A probe still in flight at the
/// deadline is abandoned.
pub async fn poll_until<T, F, Fut>(
    interval: Duration,
    timeout: Duration,
    mut probe: F,
) -> Result<T, PollTimeout>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + timeout;
    let mut attempts = 0;

    loop {
        attempts += 1;
        match timeout_at(deadline, probe()).await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(_) => return Err(PollTimeout { timeout, attempts }),
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(PollTimeout { timeout, attempts });
        }
        sleep(interval.min(deadline - now)).await;
    }
}
