//! Custom assertion helpers.

use std::time::Duration;

/// Polls `condition` until it holds or `timeout` elapses.
///
/// Sleeping between polls yields to the runtime, letting spawned work make
/// progress; use this for assertions about actions dispatched in the
/// background.
pub async fn assert_eventually(timeout: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {timeout:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
