use std::{collections::BTreeMap, path::Path, time::Duration};

use serde::Deserialize;
use url::Url;

use crate::{
    error::HttpingError,
    http::TransportSettings,
    output::OutputFormat,
    run_loop::LoopSettings,
};

fn default_delay() -> u64 {
    1000
}
fn default_timeout() -> u64 {
    5000
}
fn default_user_agent() -> String {
    format!("httping/{}", env!("CARGO_PKG_VERSION"))
}

/// Settings of a run. Loaded from a YAML file and/or the command line;
/// durations are in milliseconds.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Configuration {
    #[serde(default)]
    pub target: String,
    /// 0 keeps going until interrupted.
    #[serde(default)]
    pub count: u64,
    #[serde(default = "default_delay")]
    pub delay: u64,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub keep_alive: bool,
    #[serde(default)]
    pub disable_compression: bool,
    #[serde(default)]
    pub disable_http2: bool,
    #[serde(default)]
    pub no_new_conn_count: bool,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub insecure: bool,
    #[serde(default)]
    pub output: OutputFormat,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            target: String::new(),
            count: 0,
            delay: default_delay(),
            timeout: default_timeout(),
            keep_alive: false,
            disable_compression: false,
            disable_http2: false,
            no_new_conn_count: false,
            user_agent: default_user_agent(),
            headers: BTreeMap::new(),
            insecure: false,
            output: OutputFormat::default(),
        }
    }
}

impl Configuration {
    pub fn from_file(path: &Path) -> Result<Self, HttpingError> {
        let file = std::fs::File::open(path).map_err(|e| {
            HttpingError::configuration(format!("cannot open {}: {e}", path.display()))
        })?;
        serde_yaml::from_reader(file)
            .map_err(|e| HttpingError::configuration(format!("{}: {e}", path.display())))
    }

    /// The validated target.
    pub fn target_url(&self) -> Result<Url, HttpingError> {
        if self.target.trim().is_empty() {
            return Err(HttpingError::configuration("no target url given"));
        }
        let url = Url::parse(self.target.trim())
            .map_err(|e| HttpingError::configuration(format!("invalid url {:?}: {e}", self.target)))?;
        if !["http", "https"].contains(&url.scheme()) {
            return Err(HttpingError::configuration(format!(
                "unsupported scheme {:?}, use http or https",
                url.scheme()
            )));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(HttpingError::configuration(format!("url {url} has no host")));
        }
        Ok(url)
    }

    pub fn request_timeout(&self) -> Result<Duration, HttpingError> {
        if self.timeout == 0 {
            return Err(HttpingError::configuration("timeout must be greater than 0"));
        }
        Ok(Duration::from_millis(self.timeout))
    }

    pub fn transport_settings(&self) -> TransportSettings {
        TransportSettings {
            keep_alive: self.keep_alive,
            compression: !self.disable_compression,
            http2: !self.disable_http2,
            insecure: self.insecure,
            user_agent: self.user_agent.clone(),
            headers: self
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            count: self.count,
            delay: Duration::from_millis(self.delay),
            exclude_new_connections: self.no_new_conn_count,
        }
    }
}

/// Split a `Name: value` header argument.
pub fn parse_header(raw: &str) -> Result<(String, String), HttpingError> {
    match raw.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() && !name.trim().contains(' ') => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(HttpingError::configuration(format!(
            "invalid header {raw:?}, expected \"Name: value\""
        ))),
    }
}
