//! Ping for HTTP(S): repeated timed GET requests with per-phase timings and
//! latency statistics over the run.
pub mod configuration;
pub mod error;
pub mod http;
pub mod output;
pub mod pacer;
pub mod run_loop;
pub mod stats;

use tokio_util::sync::CancellationToken;

pub use configuration::Configuration;
pub use error::{HttpingError, Result};
use crate::http::{RequestExecutor, Transport};
use run_loop::{Reporter, RunLoop, RunState};

/// Probe the configured target until the count is reached or `cancel` fires.
pub async fn run<R: Reporter>(
    config: &Configuration,
    reporter: R,
    cancel: CancellationToken,
) -> Result<RunState> {
    let url = config.target_url()?;
    let timeout = config.request_timeout()?;
    let transport = Transport::new(config.transport_settings())?;
    let executor = RequestExecutor::new(transport, url, timeout);
    Ok(RunLoop::new(executor, reporter, config.loop_settings(), cancel)
        .run()
        .await)
}
