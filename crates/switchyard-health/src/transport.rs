//! HTTP transport used by every probe.
//!
//! Probes talk to environments through the [`Transport`] trait so the
//! orchestrator can be driven against canned responses in tests. The
//! production implementation wraps a pooled hyper client shared by all
//! probes.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, USER_AGENT};
use http::{Method, Request, Response};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

/// Errors that prevent a response from being received.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid url {0}")]
    InvalidUrl(String),

    #[error("unsupported url scheme: {0}")]
    UnsupportedScheme(String),

    #[error("request build failed: {0}")]
    Request(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("failed to read response body: {0}")]
    Body(String),
}

/// Status code and body of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// Decode the body as JSON, if it is JSON of the expected shape.
    pub fn json<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// Boxed future returned by [`Transport`] methods.
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + Send + 'a>>;

/// Minimal HTTP client surface needed by probes, injected for testability.
///
/// Implementations must not apply deployment logic; callers bound every
/// request with their own timeout.
pub trait Transport: Send + Sync {
    fn get<'a>(&'a self, url: &'a str) -> TransportFuture<'a>;

    fn post_json<'a>(&'a self, url: &'a str, body: Vec<u8>) -> TransportFuture<'a>;
}

/// Pooled hyper client over plain HTTP.
#[derive(Clone)]
pub struct HyperTransport {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HyperTransport {
    pub fn new() -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(2)));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(8)
            .build(connector);

        Self { client }
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<Vec<u8>>,
    ) -> Result<HttpResponse, TransportError> {
        let uri: http::Uri = url
            .parse()
            .map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))?;
        if uri.scheme_str() != Some("http") {
            return Err(TransportError::UnsupportedScheme(url.to_string()));
        }

        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(USER_AGENT, "switchyard/0.1");
        let body = match body {
            Some(bytes) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Full::new(Bytes::from(bytes))
            }
            None => Full::new(Bytes::new()),
        };
        let request = builder
            .body(body)
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let response = self.client.request(request).await.map_err(|e| {
            debug!(error = %e, %url, "request failed");
            TransportError::Connect(e.to_string())
        })?;

        read_response(response).await
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HyperTransport {
    fn get<'a>(&'a self, url: &'a str) -> TransportFuture<'a> {
        Box::pin(self.send(Method::GET, url, None))
    }

    fn post_json<'a>(&'a self, url: &'a str, body: Vec<u8>) -> TransportFuture<'a> {
        Box::pin(self.send(Method::POST, url, Some(body)))
    }
}

async fn read_response(
    response: Response<hyper::body::Incoming>,
) -> Result<HttpResponse, TransportError> {
    let status = response.status().as_u16();
    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| TransportError::Body(e.to_string()))?
        .to_bytes();
    Ok(HttpResponse {
        status,
        body: body.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_classification() {
        assert!(HttpResponse::new(200, "").is_success());
        assert!(HttpResponse::new(204, "").is_success());
        assert!(!HttpResponse::new(500, "").is_success());
        assert!(HttpResponse::new(404, "").is_not_found());
    }

    #[test]
    fn response_json_decoding() {
        #[derive(serde::Deserialize)]
        struct Payload {
            pool_size: u32,
        }

        let ok = HttpResponse::new(200, r#"{"pool_size": 20}"#);
        assert_eq!(ok.json::<Payload>().map(|p| p.pool_size), Some(20));

        let garbage = HttpResponse::new(200, "<html>");
        assert!(garbage.json::<Payload>().is_none());
    }

    #[tokio::test]
    async fn https_is_rejected() {
        let transport = HyperTransport::new();
        let err = transport.get("https://green.test/health").await.unwrap_err();
        assert!(matches!(err, TransportError::UnsupportedScheme(_)));
    }

    #[tokio::test]
    async fn closed_port_is_connect_error() {
        let transport = HyperTransport::new();
        let err = transport.get("http://127.0.0.1:1/health").await.unwrap_err();
        assert!(matches!(err, TransportError::Connect(_)));
    }

    #[tokio::test]
    async fn invalid_url_is_rejected() {
        let transport = HyperTransport::new();
        let err = transport.get("not a url").await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidUrl(_)));
    }
}
