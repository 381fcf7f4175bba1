use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// How long to wait after a request so consecutive requests start at least
/// `min_delay` apart. A request slower than the delay gets no extra wait.
pub fn compute_wait(last_total: Duration, min_delay: Duration) -> Duration {
    min_delay.saturating_sub(last_total)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    Elapsed,
    Canceled,
}

/// Sleep for `duration` unless `cancel` fires first.
pub async fn wait(duration: Duration, cancel: &CancellationToken) -> Wait {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Wait::Canceled,
        _ = tokio::time::sleep(duration) => Wait::Elapsed,
    }
}
