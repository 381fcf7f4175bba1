use std::{io, time::Duration};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::HttpingError,
    http::{RequestExecutor, TimingRecord},
    pacer::{self, compute_wait, Wait},
    stats::StatsAggregator,
};

/// One timed attempt against the target.
#[async_trait(?Send)]
pub trait Probe {
    async fn probe(&mut self, cancel: &CancellationToken) -> (TimingRecord, Result<(), HttpingError>);
}

#[async_trait(?Send)]
impl Probe for RequestExecutor {
    async fn probe(&mut self, cancel: &CancellationToken) -> (TimingRecord, Result<(), HttpingError>) {
        self.execute(cancel).await
    }
}

/// Receives one call per counted attempt, in order.
pub trait Reporter {
    fn report(&mut self, record: &TimingRecord, error: Option<&str>) -> io::Result<()>;
}

impl<R: Reporter + ?Sized> Reporter for Box<R> {
    fn report(&mut self, record: &TimingRecord, error: Option<&str>) -> io::Result<()> {
        (**self).report(record, error)
    }
}

#[derive(Debug, Clone)]
pub struct LoopSettings {
    /// Number of attempts, 0 runs until canceled.
    pub count: u64,
    /// Minimum time between the starts of two consecutive requests.
    pub delay: Duration,
    /// Leave requests on fresh connections out of the statistics.
    pub exclude_new_connections: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Canceled,
    CountReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopping(StopReason),
    Done,
}

#[derive(Debug, Default)]
pub struct RunState {
    pub requests_sent: u64,
    pub successful: u64,
    pub failed: u64,
    pub stats: StatsAggregator,
    pub stop_reason: Option<StopReason>,
}

pub struct RunLoop<P, R> {
    probe: P,
    reporter: R,
    settings: LoopSettings,
    cancel: CancellationToken,
    state: RunState,
    phase: LoopState,
}

impl<P: Probe, R: Reporter> RunLoop<P, R> {
    pub fn new(probe: P, reporter: R, settings: LoopSettings, cancel: CancellationToken) -> Self {
        Self {
            probe,
            reporter,
            settings,
            cancel,
            state: RunState::default(),
            phase: LoopState::Running,
        }
    }

    /// Probe until the count is reached or the token is canceled.
    pub async fn run(mut self) -> RunState {
        info!(count = self.settings.count, delay = ?self.settings.delay, "starting run");
        while self.phase == LoopState::Running {
            self.phase = self.step().await;
        }
        if let LoopState::Stopping(reason) = self.phase {
            self.state.stop_reason = Some(reason);
        }
        self.phase = LoopState::Done;
        info!(
            reason = ?self.state.stop_reason,
            requests = self.state.requests_sent,
            successful = self.state.successful,
            failed = self.state.failed,
            "run finished"
        );
        self.state
    }

    async fn step(&mut self) -> LoopState {
        let (record, result) = self.probe.probe(&self.cancel).await;
        let error = match result {
            Err(e) if e.is_canceled() => return LoopState::Stopping(StopReason::Canceled),
            Err(e) => Some(e.report_message()),
            Ok(()) => None,
        };

        self.state.requests_sent += 1;
        if error.is_some() {
            self.state.failed += 1;
        } else {
            self.state.successful += 1;
            if self.settings.exclude_new_connections && record.reused == Some(false) {
                debug!("new connection, left out of the statistics");
            } else {
                self.state.stats.record(record.total_millis());
            }
        }

        if let Err(e) = self.reporter.report(&record, error.as_deref()) {
            warn!(error = %e, "cannot write the report line");
        }

        if self.settings.count != 0 && self.state.requests_sent >= self.settings.count {
            return LoopState::Stopping(StopReason::CountReached);
        }

        match pacer::wait(compute_wait(record.total, self.settings.delay), &self.cancel).await {
            Wait::Elapsed => LoopState::Running,
            Wait::Canceled => LoopState::Stopping(StopReason::Canceled),
        }
    }
}
