use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use super::{
    timing::{PhaseTimer, TimingRecord},
    transport::Transport,
};
use crate::error::{HttpingError, TransportError};

/// Issues single timed GET requests against one url.
pub struct RequestExecutor {
    transport: Transport,
    url: Url,
    timeout: Duration,
}

impl RequestExecutor {
    pub fn new(transport: Transport, url: Url, timeout: Duration) -> Self {
        Self {
            transport,
            url,
            timeout,
        }
    }

    /// Run one request. The record is returned on every path, with at least
    /// the total set; the result tells whether the request went through.
    ///
    /// Redirects are not followed, a 3xx response is the final one.
    pub async fn execute(
        &mut self,
        cancel: &CancellationToken,
    ) -> (TimingRecord, Result<(), HttpingError>) {
        let mut timer = PhaseTimer::start();
        let exchanged = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            exchanged = tokio::time::timeout(
                self.timeout,
                exchange(&mut self.transport, &self.url, &mut timer),
            ) => Some(exchanged),
        };
        let record = timer.finish();

        let result = match exchanged {
            None => Err(HttpingError::Canceled),
            Some(Ok(Ok(()))) => Ok(()),
            Some(Ok(Err(source))) => Err(self.request_error(source)),
            Some(Err(_elapsed)) => Err(self.request_error(TransportError::Timeout(self.timeout))),
        };
        match &result {
            Ok(()) => debug!(
                total = ?record.total,
                reused = ?record.reused,
                status = record.status.as_deref().unwrap_or_default(),
                "request done"
            ),
            Err(e) => debug!(total = ?record.total, error = %e, "request failed"),
        }
        (record, result)
    }

    fn request_error(&self, source: TransportError) -> HttpingError {
        HttpingError::Request {
            url: self.url.to_string(),
            source,
        }
    }
}

async fn exchange(
    transport: &mut Transport,
    url: &Url,
    timer: &mut PhaseTimer,
) -> Result<(), TransportError> {
    let mut conn = transport.acquire(url, timer).await?;
    let request = transport.request(url);
    let reusable = conn.round_trip(&request, timer).await?;
    transport.release(conn, reusable);
    Ok(())
}
