use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt as _, Full};
use hyper::Request;
use hyper::body::Incoming;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;

use crate::action::HttpAction;

pub(crate) type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("http request build failed: {0}")]
    RequestBuild(#[from] http::Error),

    #[error("invalid http header name: {0}")]
    HeaderName(#[from] http::header::InvalidHeaderName),

    #[error("invalid http header value: {0}")]
    HeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("http request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("http request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to read response body: {0}")]
    BodyRead(#[from] hyper::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HttpResponse {
    pub status: u16,
    /// Estimated HTTP/1.1 request bytes (request line, headers, body).
    pub bytes_sent: u64,
    /// Estimated HTTP/1.1 response bytes (status line, headers, body).
    pub bytes_received: u64,
}

/// One connection pool per worker. Clones share it.
#[derive(Debug, Clone)]
pub(crate) struct HttpClient {
    inner: Client<HttpConnector, Full<Bytes>>,
}

impl Default for HttpClient {
    fn default() -> Self {
        let mut connector = HttpConnector::new();
        connector.enforce_http(false);

        let inner = Client::builder(TokioExecutor::new()).build(connector);

        Self { inner }
    }
}

impl HttpClient {
    pub(crate) async fn send(&self, action: &HttpAction) -> Result<HttpResponse> {
        let parsed =
            url::Url::parse(&action.url).map_err(|_| Error::InvalidUrl(action.url.clone()))?;
        let uri: hyper::Uri = action
            .url
            .parse()
            .map_err(|_| Error::InvalidUrl(action.url.clone()))?;

        let mut sent = request_line_bytes(&action.method, &uri);
        let mut builder = Request::builder().method(action.method.clone()).uri(uri);

        // Host and Content-Length are made explicit so byte accounting is deterministic.
        if !has_header(&action.headers, "host")
            && let Some(host) = host_header_value(&parsed)
        {
            sent = sent.saturating_add(header_bytes(b"host", host.as_bytes()));
            builder = builder.header(http::header::HOST, host);
        }
        if !action.body.is_empty() && !has_header(&action.headers, "content-length") {
            let len = action.body.len().to_string();
            sent = sent.saturating_add(header_bytes(b"content-length", len.as_bytes()));
            builder = builder.header(http::header::CONTENT_LENGTH, len);
        }

        for (k, v) in &action.headers {
            let name = http::header::HeaderName::from_bytes(k.as_bytes())?;
            let value = http::header::HeaderValue::from_str(v)?;
            sent = sent.saturating_add(header_bytes(k.as_bytes(), v.as_bytes()));
            builder = builder.header(name, value);
        }
        sent = sent
            .saturating_add(2)
            .saturating_add(action.body.len() as u64);

        let req: Request<Full<Bytes>> = builder.body(Full::new(action.body.clone()))?;

        let res: hyper::Response<Incoming> = match action.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, self.inner.request(req)).await {
                Ok(res) => res?,
                Err(_) => return Err(Error::Timeout(timeout)),
            },
            None => self.inner.request(req).await?,
        };

        let (parts, body) = res.into_parts();
        let mut received = status_line_bytes(parts.version, parts.status);
        for (name, value) in &parts.headers {
            received =
                received.saturating_add(header_bytes(name.as_str().as_bytes(), value.as_bytes()));
        }
        let body = body.collect().await?.to_bytes();
        received = received.saturating_add(2).saturating_add(body.len() as u64);

        Ok(HttpResponse {
            status: parts.status.as_u16(),
            bytes_sent: sent,
            bytes_received: received,
        })
    }
}

// "METHOD SP path SP HTTP/1.1 CRLF"
fn request_line_bytes(method: &http::Method, uri: &hyper::Uri) -> u64 {
    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    (method.as_str().len() as u64)
        .saturating_add(1)
        .saturating_add(path.len() as u64)
        .saturating_add(1)
        .saturating_add("HTTP/1.1".len() as u64)
        .saturating_add(2)
}

// "HTTP/1.1 SP 200 CRLF", reason phrase ignored.
fn status_line_bytes(version: http::Version, status: http::StatusCode) -> u64 {
    let version = match version {
        http::Version::HTTP_10 => "HTTP/1.0",
        http::Version::HTTP_2 => "HTTP/2",
        http::Version::HTTP_3 => "HTTP/3",
        _ => "HTTP/1.1",
    };
    (version.len() as u64)
        .saturating_add(1)
        .saturating_add(status.as_str().len() as u64)
        .saturating_add(2)
}

// "name: value\r\n"
fn header_bytes(name: &[u8], value: &[u8]) -> u64 {
    (name.len() as u64)
        .saturating_add(2)
        .saturating_add(value.len() as u64)
        .saturating_add(2)
}

fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

fn host_header_value(parsed: &url::Url) -> Option<String> {
    let host = parsed.host_str()?;
    match parsed.port() {
        Some(port) if port != 80 => Some(format!("{host}:{port}")),
        _ => Some(host.to_string()),
    }
}
