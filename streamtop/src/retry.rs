//! Bounded retry with backoff.
//!
//! Waiting on something that is "almost ready" (a signing key that another
//! process is still writing, a simulator that is still binding its port)
//! gets an explicit deadline and a typed timeout error instead of an
//! open-ended poll loop. The metrics client never retries on its own;
//! callers that want a grace period reach for this helper.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;

#[derive(Debug, Error, PartialEq)]
#[error("{label} not ready after {waited_ms}ms")]
pub struct WaitTimeout {
    pub label: &'static str,
    pub waited_ms: u64,
}

/// Polls `probe` until it yields a value or `max_wait` elapses.
///
/// The first probe runs immediately; after each miss the delay doubles,
/// starting from `initial_delay` and clamped so the total wait never
/// exceeds `max_wait`.
pub async fn wait_for<T, F, Fut>(
    label: &'static str,
    max_wait: Duration,
    initial_delay: Duration,
    mut probe: F,
) -> Result<T, WaitTimeout>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let mut waited = Duration::ZERO;
    let mut delay = initial_delay;
    loop {
        if let Some(v) = probe().await {
            return Ok(v);
        }
        if waited >= max_wait {
            return Err(WaitTimeout {
                label,
                waited_ms: waited.as_millis() as u64,
            });
        }
        let step = delay.min(max_wait - waited);
        sleep(step).await;
        waited += step;
        delay = delay.saturating_mul(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn yields_once_the_probe_succeeds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let got = wait_for("thing", Duration::from_secs(1), Duration::from_millis(100), move || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) >= 2 {
                    Some(42)
                } else {
                    None
                }
            }
        })
        .await;
        assert_eq!(got, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_with_a_named_error() {
        let err = wait_for::<(), _, _>(
            "signer",
            Duration::from_millis(500),
            Duration::from_millis(100),
            || async { None },
        )
        .await
        .unwrap_err();
        assert_eq!(err.label, "signer");
        assert_eq!(err.waited_ms, 500);
        assert_eq!(err.to_string(), "signer not ready after 500ms");
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_doubles_between_probes() {
        // 100 + 200 + 200 = 500: the last step is clamped to the deadline.
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let _ = wait_for::<(), _, _>(
            "thing",
            Duration::from_millis(500),
            Duration::from_millis(100),
            move || {
                c.fetch_add(1, Ordering::SeqCst);
                async { None }
            },
        )
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
