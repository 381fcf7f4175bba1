use std::{
    future::poll_fn,
    net::{IpAddr, SocketAddr},
    pin::Pin,
    task::Poll,
};

use bytes::Bytes;
use h2::client::SendRequest;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpStream,
};
use tracing::debug;
use trust_dns_resolver::TokioAsyncResolver;
use url::{Host, Url};

use super::{
    request::HttpRequest,
    response::{drain_body, read_head, HttpResponse},
    timing::PhaseTimer,
};
use crate::error::{HttpingError, TransportError};

pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub keep_alive: bool,
    pub compression: bool,
    pub http2: bool,
    pub insecure: bool,
    pub user_agent: String,
    pub headers: Vec<(String, String)>,
}

pub enum Connection {
    Http1(BufReader<Box<dyn Stream>>),
    Http2(SendRequest<Bytes>),
}

/// Dials connections to the target and keeps at most one idle connection
/// around when keep-alive is enabled.
pub struct Transport {
    settings: TransportSettings,
    tls: tokio_native_tls::TlsConnector,
    idle: Option<Connection>,
}

impl Transport {
    pub fn new(settings: TransportSettings) -> Result<Self, HttpingError> {
        let alpn: &[&str] = if settings.http2 {
            &["h2", "http/1.1"]
        } else {
            &["http/1.1"]
        };
        let tls = native_tls::TlsConnector::builder()
            .danger_accept_invalid_hostnames(settings.insecure)
            .danger_accept_invalid_certs(settings.insecure)
            .request_alpns(alpn)
            .build()
            .map_err(|e| HttpingError::configuration(format!("cannot set up tls: {e}")))?;
        Ok(Self {
            settings,
            tls: tokio_native_tls::TlsConnector::from(tls),
            idle: None,
        })
    }

    pub fn request(&self, url: &Url) -> HttpRequest {
        let mut request = HttpRequest::get(url.clone())
            .header("user-agent", self.settings.user_agent.clone())
            .keep_alive(self.settings.keep_alive);
        if self.settings.compression {
            request = request.header("accept-encoding", "gzip");
        }
        request.headers(&self.settings.headers)
    }

    /// Hand out the idle connection if there is a usable one, dial a new one
    /// otherwise.
    pub async fn acquire(
        &mut self,
        url: &Url,
        timer: &mut PhaseTimer,
    ) -> Result<Connection, TransportError> {
        match self.idle.take() {
            Some(Connection::Http2(sender)) => match sender.ready().await {
                Ok(sender) => {
                    timer.got_conn(true);
                    return Ok(Connection::Http2(sender));
                }
                Err(e) => debug!(error = %e, "idle http2 connection is no longer usable"),
            },
            Some(Connection::Http1(mut reader)) => {
                if is_idle_open(&mut reader).await {
                    timer.got_conn(true);
                    return Ok(Connection::Http1(reader));
                }
                debug!("idle connection was closed by the server");
            }
            None => {}
        }
        let conn = connect(&self.tls, url, timer).await?;
        timer.got_conn(false);
        Ok(conn)
    }

    pub fn release(&mut self, conn: Connection, reusable: bool) {
        if self.settings.keep_alive && reusable {
            self.idle = Some(conn);
        }
    }
}

/// An idle HTTP/1 connection is usable only while nothing can be read from
/// it: end of stream, an error or unsolicited bytes all rule it out.
async fn is_idle_open(reader: &mut BufReader<Box<dyn Stream>>) -> bool {
    poll_fn(|cx| match Pin::new(&mut *reader).poll_fill_buf(cx) {
        Poll::Pending => Poll::Ready(true),
        Poll::Ready(_) => Poll::Ready(false),
    })
    .await
}

fn tls_domain(url: &Url) -> Option<String> {
    match url.host()? {
        Host::Domain(domain) => Some(domain.to_string()),
        Host::Ipv4(ip) => Some(ip.to_string()),
        Host::Ipv6(ip) => Some(ip.to_string()),
    }
}

async fn connect(
    tls: &tokio_native_tls::TlsConnector,
    url: &Url,
    timer: &mut PhaseTimer,
) -> Result<Connection, TransportError> {
    let port = url
        .port_or_known_default()
        .ok_or_else(|| TransportError::InvalidRequest(format!("no port for scheme {}", url.scheme())))?;
    let addrs = resolve(url, timer).await?;
    let stream = dial(&addrs, port, timer).await?;
    stream.set_nodelay(true)?;

    if url.scheme() != "https" {
        debug!(peer = ?stream.peer_addr().ok(), "connected");
        return Ok(Connection::Http1(BufReader::new(Box::new(stream))));
    }

    let domain = tls_domain(url).unwrap_or_default();
    timer.tls_start();
    let handshake = tls.connect(&domain, stream).await;
    timer.tls_done();
    let stream = handshake.map_err(|source| TransportError::Tls {
        host: domain.clone(),
        source,
    })?;

    let negotiated = stream.get_ref().negotiated_alpn().ok().flatten();
    if negotiated.as_deref() == Some(&b"h2"[..]) {
        let (sender, connection) = h2::client::handshake(Box::new(stream) as Box<dyn Stream>).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(error = %e, "http2 connection closed");
            }
        });
        debug!(%domain, "connected with http2");
        return Ok(Connection::Http2(sender));
    }
    debug!(%domain, "connected with http/1.1 over tls");
    Ok(Connection::Http1(BufReader::new(Box::new(stream))))
}

async fn resolve(url: &Url, timer: &mut PhaseTimer) -> Result<Vec<IpAddr>, TransportError> {
    let domain = match url.host() {
        Some(Host::Domain(domain)) => domain,
        Some(Host::Ipv4(ip)) => return Ok(vec![IpAddr::V4(ip)]),
        Some(Host::Ipv6(ip)) => return Ok(vec![IpAddr::V6(ip)]),
        None => return Err(TransportError::InvalidRequest("url has no host".into())),
    };
    // A fresh resolver per connection, so the lookup is not served from the
    // cache of a previous one.
    let resolver = TokioAsyncResolver::tokio_from_system_conf().map_err(|e| TransportError::Dns {
        host: domain.to_string(),
        reason: e.to_string(),
    })?;

    timer.dns_start();
    let lookup = resolver.lookup_ip(domain).await;
    timer.dns_done();

    let addrs: Vec<IpAddr> = lookup
        .map_err(|e| TransportError::Dns {
            host: domain.to_string(),
            reason: e.to_string(),
        })?
        .iter()
        .collect();
    if addrs.is_empty() {
        return Err(TransportError::Dns {
            host: domain.to_string(),
            reason: "no such host".into(),
        });
    }
    debug!(%domain, ?addrs, "resolved");
    Ok(addrs)
}

async fn dial(addrs: &[IpAddr], port: u16, timer: &mut PhaseTimer) -> Result<TcpStream, TransportError> {
    let mut last_error = None;
    for ip in addrs {
        let addr = SocketAddr::new(*ip, port);
        timer.connect_start();
        let attempt = TcpStream::connect(addr).await;
        timer.connect_done();
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(source) => {
                debug!(%addr, error = %source, "dial failed");
                last_error = Some(TransportError::Connect {
                    addr: addr.to_string(),
                    source,
                });
            }
        }
    }
    Err(last_error.unwrap_or_else(|| TransportError::InvalidRequest("no address to dial".into())))
}

impl Connection {
    /// Send the request, wait for the response head and drain the body.
    ///
    /// Returns whether the connection can carry another request.
    pub async fn round_trip(
        &mut self,
        request: &HttpRequest,
        timer: &mut PhaseTimer,
    ) -> Result<bool, TransportError> {
        match self {
            Connection::Http1(reader) => {
                let stream = reader.get_mut();
                stream.write_all(request.render().as_bytes()).await?;
                stream.flush().await?;

                let response = loop {
                    if reader.fill_buf().await?.is_empty() {
                        return Err(TransportError::MalformedResponse(
                            "server closed the connection without a response".into(),
                        ));
                    }
                    timer.first_response_byte();
                    let response = HttpResponse::from_head(&read_head(reader).await?)?;
                    if !response.is_interim() {
                        break response;
                    }
                };
                timer.headers_received(response.version.clone(), response.status());

                drain_body(reader, response.framing()).await?;
                timer.body_drained();
                Ok(response.keeps_alive())
            }
            Connection::Http2(sender) => {
                let mut ready = sender.clone().ready().await?;
                let (response, _) = ready.send_request(request.to_http2()?, true)?;
                let response = response.await?;
                timer.first_response_byte();

                let status = response.status();
                let status = match status.canonical_reason() {
                    Some(reason) => format!("{} {reason}", status.as_u16()),
                    None => status.as_u16().to_string(),
                };
                timer.headers_received("HTTP/2.0", status);

                let mut body = response.into_body();
                while let Some(chunk) = body.data().await {
                    let chunk = chunk?;
                    body.flow_control().release_capacity(chunk.len())?;
                }
                timer.body_drained();
                Ok(true)
            }
        }
    }
}
