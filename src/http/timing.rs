use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Phase timings of one request. Absent fields were never observed.
#[derive(Debug, Clone)]
pub struct TimingRecord {
    pub started_at: DateTime<Utc>,
    pub dns: Option<Duration>,
    pub connect: Option<Duration>,
    pub tls_handshake: Option<Duration>,
    pub ttfb: Option<Duration>,
    pub download: Option<Duration>,
    pub total: Duration,
    pub reused: Option<bool>,
    pub protocol: Option<String>,
    pub status: Option<String>,
}

impl TimingRecord {
    pub fn total_millis(&self) -> f64 {
        millis(self.total)
    }
}

pub fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Records lifecycle events of a request as they fire.
///
/// DNS, connect and TLS durations are measured between their own start and
/// done events; time to first byte is measured from the start of the request.
/// The record is only handed out by [`PhaseTimer::finish`], which stamps the
/// total.
#[derive(Debug)]
pub struct PhaseTimer {
    record: TimingRecord,
    request_start: Instant,
    dns_start: Option<Instant>,
    connect_start: Option<Instant>,
    tls_start: Option<Instant>,
    download_start: Option<Instant>,
}

impl PhaseTimer {
    pub fn start() -> Self {
        Self {
            record: TimingRecord {
                started_at: Utc::now(),
                dns: None,
                connect: None,
                tls_handshake: None,
                ttfb: None,
                download: None,
                total: Duration::ZERO,
                reused: None,
                protocol: None,
                status: None,
            },
            request_start: Instant::now(),
            dns_start: None,
            connect_start: None,
            tls_start: None,
            download_start: None,
        }
    }

    pub fn dns_start(&mut self) {
        self.dns_start = Some(Instant::now());
    }

    pub fn dns_done(&mut self) {
        self.record.dns = self.dns_start.map(|start| start.elapsed());
    }

    pub fn connect_start(&mut self) {
        self.connect_start = Some(Instant::now());
    }

    pub fn connect_done(&mut self) {
        self.record.connect = self.connect_start.map(|start| start.elapsed());
    }

    pub fn tls_start(&mut self) {
        self.tls_start = Some(Instant::now());
    }

    pub fn tls_done(&mut self) {
        self.record.tls_handshake = self.tls_start.map(|start| start.elapsed());
    }

    pub fn got_conn(&mut self, reused: bool) {
        self.record.reused = Some(reused);
    }

    pub fn first_response_byte(&mut self) {
        if self.record.ttfb.is_none() {
            self.record.ttfb = Some(self.request_start.elapsed());
        }
    }

    /// Response headers are in: remembers protocol and status and starts the
    /// download phase.
    pub fn headers_received(&mut self, protocol: impl Into<String>, status: impl Into<String>) {
        self.record.protocol = Some(protocol.into());
        self.record.status = Some(status.into());
        self.download_start = Some(Instant::now());
    }

    pub fn body_drained(&mut self) {
        self.record.download = self.download_start.map(|start| start.elapsed());
    }

    pub fn finish(mut self) -> TimingRecord {
        self.record.total = self.request_start.elapsed();
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_phases_are_measured_between_their_events() {
        let mut timer = PhaseTimer::start();

        timer.dns_start();
        tokio::time::advance(Duration::from_millis(10)).await;
        timer.dns_done();

        timer.connect_start();
        tokio::time::advance(Duration::from_millis(20)).await;
        timer.connect_done();

        timer.tls_start();
        tokio::time::advance(Duration::from_millis(30)).await;
        timer.tls_done();
        timer.got_conn(false);

        tokio::time::advance(Duration::from_millis(40)).await;
        timer.first_response_byte();
        timer.headers_received("HTTP/1.1", "200 OK");

        tokio::time::advance(Duration::from_millis(5)).await;
        timer.body_drained();

        let record = timer.finish();
        assert_eq!(record.dns, Some(Duration::from_millis(10)));
        assert_eq!(record.connect, Some(Duration::from_millis(20)));
        assert_eq!(record.tls_handshake, Some(Duration::from_millis(30)));
        // cumulative from the start of the request
        assert_eq!(record.ttfb, Some(Duration::from_millis(100)));
        assert_eq!(record.download, Some(Duration::from_millis(5)));
        assert_eq!(record.total, Duration::from_millis(105));
        assert_eq!(record.reused, Some(false));
        assert_eq!(record.protocol.as_deref(), Some("HTTP/1.1"));
        assert_eq!(record.status.as_deref(), Some("200 OK"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reused_connection_skips_setup_phases() {
        let mut timer = PhaseTimer::start();
        timer.got_conn(true);
        tokio::time::advance(Duration::from_millis(3)).await;
        timer.first_response_byte();

        let record = timer.finish();
        assert_eq!(record.reused, Some(true));
        assert!(record.dns.is_none());
        assert!(record.connect.is_none());
        assert!(record.tls_handshake.is_none());
        assert_eq!(record.ttfb, Some(Duration::from_millis(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_without_start_stays_absent() {
        let mut timer = PhaseTimer::start();
        timer.dns_done();
        timer.connect_done();
        timer.tls_done();
        timer.body_drained();
        tokio::time::advance(Duration::from_millis(7)).await;

        let record = timer.finish();
        assert!(record.dns.is_none());
        assert!(record.connect.is_none());
        assert!(record.tls_handshake.is_none());
        assert!(record.download.is_none());
        assert!(record.reused.is_none());
        assert_eq!(record.total, Duration::from_millis(7));
        assert_eq!(record.total_millis(), 7.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_byte_is_recorded_once() {
        let mut timer = PhaseTimer::start();
        tokio::time::advance(Duration::from_millis(2)).await;
        timer.first_response_byte();
        tokio::time::advance(Duration::from_millis(2)).await;
        timer.first_response_byte();
        assert_eq!(timer.finish().ttfb, Some(Duration::from_millis(2)));
    }
}
