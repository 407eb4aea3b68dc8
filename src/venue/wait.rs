use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::errors::VenueError;

/// Poll `check` until it yields a value or `timeout` expires
///
/// Each failed check sleeps `poll` before the next one, so the wait yields to
/// the runtime. A check error ends the wait immediately.
pub async fn wait_for<T, F, Fut>(
    what: &str,
    timeout: Duration,
    poll: Duration,
    mut check: F,
) -> Result<T, VenueError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, VenueError>>,
{
    let started = Instant::now();

    loop {
        if let Some(found) = check().await? {
            return Ok(found);
        }

        if started.elapsed() >= timeout {
            tracing::error!(
                "Timeout: {} not found after {}ms.",
                what,
                timeout.as_millis()
            );
            return Err(VenueError::Timeout {
                what: what.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }

        sleep(poll).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_returns_once_check_succeeds() {
        let calls = AtomicU32::new(0);

        let found = wait_for("dialog", Duration::from_secs(5), Duration::from_millis(100), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(if n >= 3 { Some(n) } else { None }) }
        })
        .await;

        assert_eq!(found, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out() {
        let started = Instant::now();

        let result: Result<(), _> = wait_for(
            "price field",
            Duration::from_millis(500),
            Duration::from_millis(100),
            || async { Ok(None) },
        )
        .await;

        assert_eq!(
            result,
            Err(VenueError::Timeout {
                what: "price field".into(),
                timeout_ms: 500
            })
        );
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert!(started.elapsed() < Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_error_stops_wait() {
        let result: Result<(), _> = wait_for(
            "dialog",
            Duration::from_secs(5),
            Duration::from_millis(100),
            || async { Err(VenueError::Unexpected("detached".into())) },
        )
        .await;

        assert_eq!(result, Err(VenueError::Unexpected("detached".into())));
    }
}
