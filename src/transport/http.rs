//! reqwest-backed transport.
//!
//! # Responsibilities
//! - Resolve descriptor paths against a base URL
//! - Forward headers and JSON bodies
//! - Classify reqwest failures into raw [`TransportError`]s
//!
//! # Design Decisions
//! - Every HTTP response, whatever the status, is returned as `Ok`
//! - Connect failures are `ConnectionLost`, never `Other`, so they stay retryable

use std::time::Duration;

use futures_util::future::BoxFuture;
use url::Url;

use crate::transport::{Method, RequestDescriptor, ResponseDescriptor, Transport, TransportError};

/// HTTP transport over a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    default_timeout: Option<Duration>,
}

impl HttpTransport {
    /// Create a transport rooted at `base_url` (e.g., "https://api.example.com/v1/").
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| TransportError::Other(format!("Invalid base URL '{}': {}", base_url, e)))?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            default_timeout: None,
        })
    }

    /// Use a preconfigured client (TLS, proxies, pooling).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Timeout applied when a descriptor does not carry its own.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn resolve(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| TransportError::Other(format!("Invalid path '{}': {}", path, e)))
    }

    async fn send(&self, request: &RequestDescriptor) -> Result<ResponseDescriptor, TransportError> {
        let url = self.resolve(&request.path)?;

        let mut builder = self.client.request(to_reqwest_method(request.method), url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(timeout) = request.timeout.or(self.default_timeout) {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(classify)?.to_vec();

        tracing::trace!(request_id = %request.id, status, bytes = body.len(), "HTTP response received");

        Ok(ResponseDescriptor {
            status,
            headers,
            body,
        })
    }
}

impl Transport for HttpTransport {
    fn execute<'a>(
        &'a self,
        request: &'a RequestDescriptor,
    ) -> BoxFuture<'a, Result<ResponseDescriptor, TransportError>> {
        Box::pin(self.send(request))
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Head => reqwest::Method::HEAD,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn classify(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_connect() || error.is_request() || error.is_body() {
        TransportError::ConnectionLost(error.to_string())
    } else if error.is_decode() {
        TransportError::Decode(error.to_string())
    } else {
        TransportError::Other(error.to_string())
    }
}
