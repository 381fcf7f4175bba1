#![allow(dead_code)]

use std::{
    io::Write,
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use httping::http::{RequestExecutor, Transport, TransportSettings};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpListener,
};
use tokio_native_tls::TlsAcceptor;
use url::Url;

pub const HELLO: &str = "HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";

pub struct TestServer {
    pub addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    pub fn url(&self) -> String {
        format!("http://{}/probe", self.addr)
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[derive(Clone, Copy)]
pub enum Behavior {
    /// Answer every request on the connection with the same response.
    Respond(&'static str),
    /// Answer once, then close the connection.
    RespondAndClose(&'static str),
    /// Read the request and never answer.
    Hang,
}

async fn read_request<S: AsyncRead + Unpin>(reader: &mut BufReader<S>) -> Option<String> {
    let mut head = String::new();
    loop {
        let before = head.len();
        if reader.read_line(&mut head).await.unwrap_or(0) == 0 {
            return None;
        }
        if &head[before..] == "\r\n" {
            return Some(head);
        }
    }
}

async fn handle<S>(socket: S, behavior: Behavior, seen: Arc<Mutex<Vec<String>>>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(socket);
    while let Some(request) = read_request(&mut reader).await {
        seen.lock().unwrap().push(request);
        match behavior {
            Behavior::Respond(response) => {
                if reader.get_mut().write_all(response.as_bytes()).await.is_err() {
                    return;
                }
            }
            Behavior::RespondAndClose(response) => {
                let _ = reader.get_mut().write_all(response.as_bytes()).await;
                let _ = reader.get_mut().shutdown().await;
                return;
            }
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                return;
            }
        }
    }
}

pub async fn serve(behavior: Behavior) -> TestServer {
    start(behavior, None).await
}

/// Same as [`serve`] behind TLS with a self-signed certificate for
/// `localhost` and `127.0.0.1`.
pub async fn serve_tls(behavior: Behavior) -> TestServer {
    let identity = native_tls::Identity::from_pkcs8(
        include_bytes!("../fixtures/cert.pem"),
        include_bytes!("../fixtures/key.pem"),
    )
    .unwrap();
    let acceptor = native_tls::TlsAcceptor::new(identity).unwrap();
    start(behavior, Some(TlsAcceptor::from(acceptor))).await
}

async fn start(behavior: Behavior, tls: Option<TlsAcceptor>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let tls = tls.map(Arc::new);

    let accepted = connections.clone();
    let seen = requests.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            accepted.fetch_add(1, Ordering::SeqCst);
            let seen = seen.clone();
            let tls = tls.clone();
            tokio::spawn(async move {
                match tls {
                    Some(acceptor) => {
                        if let Ok(stream) = acceptor.accept(socket).await {
                            handle(stream, behavior, seen).await;
                        }
                    }
                    None => handle(socket, behavior, seen).await,
                }
            });
        }
    });

    TestServer {
        addr,
        connections,
        requests,
    }
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn settings(keep_alive: bool) -> TransportSettings {
    TransportSettings {
        keep_alive,
        compression: true,
        http2: true,
        insecure: true,
        user_agent: "httping/test".into(),
        headers: vec![("X-Probe".into(), "1".into())],
    }
}

pub fn executor(url: &str, keep_alive: bool, timeout: Duration) -> RequestExecutor {
    RequestExecutor::new(
        Transport::new(settings(keep_alive)).unwrap(),
        Url::parse(url).unwrap(),
        timeout,
    )
}

/// A `Write` whose contents can be read after it was moved into a printer.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8(self.0.lock().unwrap().clone())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
