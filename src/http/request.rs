use std::collections::BTreeMap;

use url::Url;

use crate::error::TransportError;

/// Headers a caller may not override; they follow from the url and the
/// keep-alive setting.
const RESERVED_HEADERS: [&str; 2] = ["host", "connection"];

pub struct HttpRequest {
    headers: BTreeMap<String, String>,
    method: String,
    pub url: Url,
}

impl HttpRequest {
    pub fn get(url: Url) -> Self {
        let mut request = Self {
            headers: BTreeMap::new(),
            method: "GET".into(),
            url,
        };
        // Ensure minimal headers are present but allow overrides.
        request.headers.insert("accept".into(), "*/*".into());
        request
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_lowercase(), value.into());
        self
    }

    pub fn headers<'a>(mut self, headers: impl IntoIterator<Item = &'a (String, String)>) -> Self {
        for (k, v) in headers {
            let key = k.to_lowercase();
            if !RESERVED_HEADERS.contains(&key.as_str()) {
                self.headers.insert(key, v.to_string());
            }
        }
        self
    }

    pub fn keep_alive(mut self, enabled: bool) -> Self {
        if enabled {
            self.headers.remove("connection");
        } else {
            self.headers.insert("connection".into(), "close".into());
        }
        self
    }

    fn path_with_query(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{query}", self.url.path()),
            None => self.url.path().to_string(),
        }
    }

    /// HTTP/1.1 wire form of the request head.
    pub fn render(&self) -> String {
        let headers = self
            .headers
            .iter()
            .map(|(k, v)| format!("{k}: {v}\r\n"))
            .collect::<Vec<String>>()
            .join("");
        let optional_port = self
            .url
            .port()
            .map(|port| format!(":{port}"))
            .unwrap_or_default();
        format!(
            "{method} {path} HTTP/1.1\r\n\
            host: {hostname}{optional_port}\r\n\
            {headers}\r\n",
            method = self.method,
            path = self.path_with_query(),
            hostname = self.url.host_str().unwrap_or_default(),
        )
    }

    /// HTTP/2 form of the request. Connection-specific headers are dropped,
    /// the authority travels in the uri.
    pub fn to_http2(&self) -> Result<http::Request<()>, TransportError> {
        let mut builder = http::Request::builder()
            .method(self.method.as_str())
            .uri(self.url.as_str());
        for (k, v) in &self.headers {
            if !RESERVED_HEADERS.contains(&k.as_str()) {
                builder = builder.header(k.as_str(), v.as_str());
            }
        }
        builder
            .body(())
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_render_plain_get() {
        let rendered = HttpRequest::get(url("http://example.com/status?probe=1"))
            .header("user-agent", "httping/test")
            .keep_alive(false)
            .render();
        assert!(rendered.starts_with("GET /status?probe=1 HTTP/1.1\r\nhost: example.com\r\n"));
        assert!(rendered.contains("accept: */*\r\n"));
        assert!(rendered.contains("user-agent: httping/test\r\n"));
        assert!(rendered.contains("connection: close\r\n"));
        assert!(rendered.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_render_keeps_explicit_port_and_omits_close() {
        let rendered = HttpRequest::get(url("http://127.0.0.1:8080/"))
            .keep_alive(true)
            .render();
        assert!(rendered.contains("host: 127.0.0.1:8080\r\n"));
        assert!(!rendered.contains("connection:"));
    }

    #[test]
    fn test_user_headers_cannot_override_reserved_ones() {
        let extra = vec![
            ("Host".to_string(), "evil.example".to_string()),
            ("Connection".to_string(), "upgrade".to_string()),
            ("X-Probe".to_string(), "yes".to_string()),
        ];
        let rendered = HttpRequest::get(url("https://example.com/"))
            .headers(&extra)
            .render();
        assert!(!rendered.contains("evil.example"));
        assert!(!rendered.contains("upgrade"));
        assert!(rendered.contains("x-probe: yes\r\n"));
    }

    #[test]
    fn test_http2_request_drops_connection_headers() {
        let request = HttpRequest::get(url("https://example.com/a"))
            .header("accept-encoding", "gzip")
            .keep_alive(false)
            .to_http2()
            .unwrap();
        assert_eq!(request.uri(), "https://example.com/a");
        assert!(request.headers().get("connection").is_none());
        assert_eq!(request.headers()["accept-encoding"], "gzip");
    }
}
