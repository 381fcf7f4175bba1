use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::TransportError;

/// Upper bound on a response head, status line included.
const MAX_HEAD_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Protocol label as sent by the server, e.g. `HTTP/1.1`.
    pub version: String,
    pub code: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
}

impl HttpResponse {
    /// Parse a response head (status line and headers, without the blank
    /// line).
    pub fn from_head(head: &str) -> Result<HttpResponse, TransportError> {
        let mut lines = head.split("\r\n");
        let status_line = lines.next().unwrap_or_default();
        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default();
        if !version.starts_with("HTTP/") {
            return Err(malformed(format!("unexpected status line {status_line:?}")));
        }
        let code = parts
            .next()
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| malformed(format!("invalid status code in {status_line:?}")))?;
        let mut response = HttpResponse {
            version: version.to_string(),
            code,
            reason: parts.next().unwrap_or_default().trim().to_string(),
            headers: vec![],
        };
        for entry in lines {
            if let Some((k, v)) = entry.split_once(':') {
                response.headers.push((k.trim().to_lowercase(), v.trim().to_string()));
            }
        }
        Ok(response)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Status as `<code> <reason>`, e.g. `200 OK`.
    pub fn status(&self) -> String {
        if self.reason.is_empty() {
            self.code.to_string()
        } else {
            format!("{} {}", self.code, self.reason)
        }
    }

    pub fn is_interim(&self) -> bool {
        (100..200).contains(&self.code) && self.code != 101
    }

    pub fn framing(&self) -> BodyFraming {
        if (100..200).contains(&self.code) || self.code == 204 || self.code == 304 {
            return BodyFraming::Empty;
        }
        let chunked = self
            .header("transfer-encoding")
            .map(|v| v.to_lowercase().contains("chunked"))
            .unwrap_or(false);
        if chunked {
            return BodyFraming::Chunked;
        }
        match self.header("content-length").and_then(|v| v.parse().ok()) {
            Some(length) => BodyFraming::Length(length),
            None => BodyFraming::UntilClose,
        }
    }

    /// Whether the connection may carry another request once this body is
    /// drained.
    pub fn keeps_alive(&self) -> bool {
        let connection = self.header("connection").map(|v| v.to_lowercase());
        let persistent = match self.version.as_str() {
            "HTTP/1.0" => connection.as_deref() == Some("keep-alive"),
            _ => connection.as_deref() != Some("close"),
        };
        // 101 hands the connection over to another protocol
        persistent && self.code != 101 && self.framing() != BodyFraming::UntilClose
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    Empty,
    Length(u64),
    Chunked,
    UntilClose,
}

fn malformed(reason: impl Into<String>) -> TransportError {
    TransportError::MalformedResponse(reason.into())
}

/// Read one response head up to and including the blank line.
///
/// Header bytes outside UTF-8 are replaced rather than rejected.
pub async fn read_head<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<String, TransportError> {
    let mut head = Vec::new();
    loop {
        let before = head.len();
        let limit = (MAX_HEAD_SIZE + 1 - before) as u64;
        let read = (&mut *reader)
            .take(limit)
            .read_until(b'\n', &mut head)
            .await?;
        if read == 0 {
            return Err(malformed("connection closed before the response head was complete"));
        }
        if head.len() > MAX_HEAD_SIZE {
            return Err(malformed("response head too large"));
        }
        let line = &head[before..];
        if line == b"\r\n" || line == b"\n" {
            head.truncate(before);
            let head = String::from_utf8_lossy(&head);
            let head = head.trim_end_matches(['\r', '\n']);
            return Ok(head.replace("\r\n", "\n").replace('\n', "\r\n"));
        }
    }
}

/// One line of a chunked body, empty at end of stream.
async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<String, TransportError> {
    let mut line = Vec::new();
    (&mut *reader)
        .take(MAX_HEAD_SIZE as u64)
        .read_until(b'\n', &mut line)
        .await?;
    Ok(String::from_utf8_lossy(&line).into_owned())
}

/// Read and discard a body, returning the number of bytes consumed.
pub async fn drain_body<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    framing: BodyFraming,
) -> Result<u64, TransportError> {
    match framing {
        BodyFraming::Empty => Ok(0),
        BodyFraming::Length(length) => discard_exact(reader, length).await,
        BodyFraming::UntilClose => Ok(io::copy(reader, &mut io::sink()).await?),
        BodyFraming::Chunked => {
            let mut drained = 0;
            loop {
                let line = read_line(reader).await?;
                if line.is_empty() {
                    return Err(malformed("connection closed inside a chunked body"));
                }
                let size = line.trim().split(';').next().unwrap_or_default();
                let size = u64::from_str_radix(size.trim(), 16)
                    .map_err(|_| malformed(format!("invalid chunk size {size:?}")))?;
                if size == 0 {
                    break;
                }
                drained += discard_exact(reader, size).await?;
                read_line(reader).await?;
            }
            // trailers
            loop {
                let line = read_line(reader).await?;
                if line.trim().is_empty() {
                    return Ok(drained);
                }
            }
        }
    }
}

async fn discard_exact<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    length: u64,
) -> Result<u64, TransportError> {
    let copied = io::copy(&mut reader.take(length), &mut io::sink()).await?;
    if copied < length {
        return Err(malformed(format!(
            "body ended after {copied} of {length} bytes"
        )));
    }
    Ok(copied)
}
