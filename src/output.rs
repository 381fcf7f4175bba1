use std::{
    io::{self, Stdout, Write},
    time::Duration,
};

use chrono::SecondsFormat;
use clap::ValueEnum;
use crossterm::{style::Stylize, tty::IsTty};
use serde::Deserialize;

use crate::{
    http::{millis, TimingRecord},
    run_loop::{Reporter, RunState},
};

const NOT_AVAILABLE: &str = "N/A";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One `dns=... conn=...` line per request and a summary
    #[default]
    Line,
    /// One CSV row per request, microsecond timings
    Csv,
}

fn format_duration(duration: Option<Duration>) -> Option<String> {
    duration.map(|d| format!("{:.1}ms", millis(d)))
}

/// Prints the per-request line, colored when writing to a terminal.
pub struct LinePrinter<W: Write> {
    out: W,
    colored: bool,
}

impl LinePrinter<Stdout> {
    pub fn stdout() -> Self {
        let out = io::stdout();
        let colored = out.is_tty() && std::env::var_os("NO_COLOR").is_none();
        Self { out, colored }
    }
}

impl<W: Write> LinePrinter<W> {
    pub fn new(out: W, colored: bool) -> Self {
        Self { out, colored }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn cell(&self, value: &str, good: bool) -> String {
        if !self.colored {
            return value.to_string();
        }
        let padded = format!("{value:<9}");
        if good {
            padded.green().to_string()
        } else {
            padded.red().to_string()
        }
    }

    fn optional(&self, value: Option<String>) -> String {
        match value {
            Some(value) => self.cell(&value, true),
            None => self.cell(NOT_AVAILABLE, false),
        }
    }

    pub fn format_line(&self, record: &TimingRecord, error: Option<&str>) -> String {
        let reused = match record.reused {
            Some(reused) => self.cell(&reused.to_string(), reused),
            None => self.cell(NOT_AVAILABLE, false),
        };
        let error = match error {
            Some(message) => self.cell(message, false),
            None => self.cell(NOT_AVAILABLE, true),
        };
        format!(
            "dns={} conn={} tls={} ttfb={} dl={} total={} reused={} proto={} status={} error={}",
            self.optional(format_duration(record.dns)),
            self.optional(format_duration(record.connect)),
            self.optional(format_duration(record.tls_handshake)),
            self.optional(format_duration(record.ttfb)),
            self.optional(format_duration(record.download)),
            self.optional(format_duration(Some(record.total))),
            reused,
            self.optional(record.protocol.clone()),
            self.optional(record.status.clone()),
            error,
        )
    }
}

impl<W: Write> Reporter for LinePrinter<W> {
    fn report(&mut self, record: &TimingRecord, error: Option<&str>) -> io::Result<()> {
        let line = self.format_line(record, error);
        writeln!(self.out, "{line}")?;
        self.out.flush()
    }
}

/// Prints a CSV row per request, header first.
pub struct CsvPrinter<W: Write> {
    out: W,
    header_written: bool,
}

impl<W: Write> CsvPrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            header_written: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn csv_micros(duration: Option<Duration>) -> String {
    duration
        .map(|d| d.as_micros().to_string())
        .unwrap_or_default()
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

impl<W: Write> Reporter for CsvPrinter<W> {
    fn report(&mut self, record: &TimingRecord, error: Option<&str>) -> io::Result<()> {
        if !self.header_written {
            writeln!(self.out, "start timestamp,reused,protocol,status,total in μs,DNS lookup in μs,connection in μs,TLS handshake in μs,first byte in μs,download in μs,error")?;
            self.header_written = true;
        }
        writeln!(
            self.out,
            "{},{},{},{},{},{},{},{},{},{},{}",
            record.started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            record.reused.map(|r| r.to_string()).unwrap_or_default(),
            csv_field(record.protocol.as_deref().unwrap_or_default()),
            csv_field(record.status.as_deref().unwrap_or_default()),
            record.total.as_micros(),
            csv_micros(record.dns),
            csv_micros(record.connect),
            csv_micros(record.tls_handshake),
            csv_micros(record.ttfb),
            csv_micros(record.download),
            csv_field(error.unwrap_or_default()),
        )?;
        self.out.flush()
    }
}

/// End-of-run report: counters, then the statistics if any request counted.
pub fn write_summary<W: Write>(out: &mut W, state: &RunState) -> io::Result<()> {
    writeln!(out)?;
    writeln!(
        out,
        "Requests: {} ({} successful, {} failed)",
        state.requests_sent, state.successful, state.failed
    )?;

    let Some(summary) = state.stats.summary() else {
        return Ok(());
    };
    writeln!(out)?;
    writeln!(out, "Min: {:.1}ms", summary.min)?;
    writeln!(out, "Max: {:.1}ms", summary.max)?;
    writeln!(out, "Average: {:.1}ms", summary.mean)?;
    writeln!(out)?;
    for (percentile, value) in &summary.percentiles {
        writeln!(out, "{percentile:.0}th Percentile: {value:.1}ms")?;
    }
    Ok(())
}
