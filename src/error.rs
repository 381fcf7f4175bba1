use std::{io, time::Duration};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HttpingError>;

#[derive(Debug, Error)]
pub enum HttpingError {
    /// The run was interrupted while the request was in flight.
    #[error("request canceled")]
    Canceled,

    /// The request failed somewhere between DNS and the end of the body.
    #[error("Get \"{url}\": {source}")]
    Request {
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("invalid configuration: {0}")]
    Configuration(String),
}

/// Network faults of a single exchange.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("lookup {host}: {reason}")]
    Dns { host: String, reason: String },

    #[error("dial tcp {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("tls handshake with {host}: {source}")]
    Tls {
        host: String,
        #[source]
        source: native_tls::Error,
    },

    #[error("timeout exceeded after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("http2: {0}")]
    Http2(#[from] h2::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Io(#[from] io::Error),
}

impl HttpingError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        HttpingError::Configuration(msg.into())
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, HttpingError::Canceled)
    }

    /// Message for the per-request report, without the request description.
    pub fn report_message(&self) -> String {
        normalize_message(&self.to_string()).to_string()
    }
}

/// Strips a leading `Get "<url>": ` so the target is not echoed on every line.
///
/// Splits on the first `": "`, which assumes the url itself holds no such
/// sequence.
pub fn normalize_message(message: &str) -> &str {
    if !message.starts_with("Get ") {
        return message;
    }
    match message.find(": ") {
        Some(index) => &message[index + 2..],
        None => message,
    }
}
