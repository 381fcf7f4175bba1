// MIT License - free as in freedom; Full license in the LICENSE file
use std::{future::Future, io, path::PathBuf, process::ExitCode};

use clap::Parser;
use httping::{
    configuration::parse_header,
    output::{write_summary, CsvPrinter, LinePrinter, OutputFormat},
    run_loop::Reporter,
    Configuration, HttpingError,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Target url, e.g. https://example.com/
    url: Option<String>,

    /// YAML file with default settings, overridden by the options below
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of requests to send [default: 0, until interrupted]
    #[arg(short, long)]
    count: Option<u64>,

    /// Minimum delay between requests in milliseconds [default: 1000]
    #[arg(short, long)]
    delay: Option<u64>,

    /// Request timeout in milliseconds [default: 5000]
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Reuse the connection between requests
    #[arg(long)]
    enable_keep_alive: bool,

    /// Do not ask for compressed responses
    #[arg(long)]
    disable_compression: bool,

    /// Do not offer HTTP/2
    #[arg(long = "disable-h2")]
    disable_http2: bool,

    /// Leave requests that opened a new connection out of the statistics
    #[arg(long)]
    no_new_conn_count: bool,

    /// User-Agent header
    #[arg(long)]
    user_agent: Option<String>,

    /// Extra request header, "Name: value"; can be repeated
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Accept invalid TLS certificates and host names
    #[arg(long)]
    insecure: bool,

    #[arg(short, long, value_enum)]
    /// Output format [default: line]
    output: Option<OutputFormat>,

    /// Debug logging on stderr (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn configuration(self) -> Result<Configuration, HttpingError> {
        let mut config = match &self.config {
            Some(path) => Configuration::from_file(path)?,
            None => Configuration::default(),
        };
        if let Some(url) = self.url {
            config.target = url;
        }
        if let Some(count) = self.count {
            config.count = count;
        }
        if let Some(delay) = self.delay {
            config.delay = delay;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(user_agent) = self.user_agent {
            config.user_agent = user_agent;
        }
        if let Some(output) = self.output {
            config.output = output;
        }
        config.keep_alive |= self.enable_keep_alive;
        config.disable_compression |= self.disable_compression;
        config.disable_http2 |= self.disable_http2;
        config.no_new_conn_count |= self.no_new_conn_count;
        config.insecure |= self.insecure;
        for raw in &self.headers {
            let (name, value) = parse_header(raw)?;
            config.headers.insert(name, value);
        }
        Ok(config)
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "httping=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(io::stderr)
        .init();
}

/// Cancels the run on the first interrupt. Returns `true` once a second one
/// arrives, `false` if interrupts cannot be listened for.
async fn watch_interrupts<S, F>(mut interrupt: S, cancel: CancellationToken) -> bool
where
    S: FnMut() -> F,
    F: Future<Output = io::Result<()>>,
{
    if let Err(e) = interrupt().await {
        warn!(error = %e, "cannot listen for Ctrl-C");
        return false;
    }
    info!("interrupted, press Ctrl-C again to quit at once");
    cancel.cancel();
    interrupt().await.is_ok()
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match cli.configuration() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(2);
        }
    };

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if watch_interrupts(tokio::signal::ctrl_c, interrupt).await {
            std::process::exit(130);
        }
    });

    let reporter: Box<dyn Reporter> = match config.output {
        OutputFormat::Line => Box::new(LinePrinter::stdout()),
        OutputFormat::Csv => Box::new(CsvPrinter::new(io::stdout())),
    };
    match httping::run(&config, reporter, cancel).await {
        Ok(state) => {
            if config.output == OutputFormat::Line {
                if let Err(e) = write_summary(&mut io::stdout(), &state) {
                    eprintln!("cannot write the summary: {e}");
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(2)
        }
    }
}
