//! Test utilities for streamcall-client
//!
//! Provides a scriptable in-memory transport and an HTTP echo server for
//! exercising calls end to end.

mod mock;
mod server;

pub use mock::{ExchangeController, MockTransport};
pub use server::{echo_router, EchoServer, FAIL_MESSAGE, TICK_INTERVAL};

use std::time::Duration;

/// Wait for a condition with timeout
pub async fn wait_for<F, Fut>(condition: F, timeout: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;

    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_wait_for() {
        let polls = AtomicUsize::new(0);
        let polls = &polls;
        let met = wait_for(
            move || async move { polls.fetch_add(1, Ordering::SeqCst) >= 2 },
            Duration::from_secs(1),
        )
        .await;
        assert!(met);

        assert!(!wait_for(|| async { false }, Duration::from_millis(30)).await);
    }
}
