//! HTTP transport implementation.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, ClientBuilder, RequestBuilder};
use std::collections::HashMap;
use std::time::Duration;
use tracing::instrument;

use super::{ByteStream, StreamingResponse, TransportError};

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET request.
    Get,
    /// POST request.
    Post,
}

/// HTTP request representation.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Absolute request URL.
    pub url: String,
    /// Request headers.
    pub headers: HashMap<String, String>,
    /// Request body.
    pub body: Option<Vec<u8>>,
    /// Request timeout override.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Creates a new GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }

    /// Creates a new POST request.
    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }

    /// Sets the request body.
    #[must_use]
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// Sets a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// HTTP response representation.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, names lowercased.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Returns true if the status indicates success (2xx).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns the `content-type` header, if any.
    pub fn content_type(&self) -> Option<&str> {
        header_value(&self.headers, "content-type")
    }

    /// Parses the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Case-insensitive header lookup.
pub(crate) fn header_value<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// HTTP transport trait.
///
/// The streaming call must honor `HttpRequest::timeout` as a wall-clock bound
/// that also covers reading the body; dropping the returned stream cancels
/// the underlying request.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send an HTTP request and buffer the whole body.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;

    /// Send an HTTP request and expose the body as a byte stream.
    async fn send_streaming(
        &self,
        request: HttpRequest,
    ) -> Result<StreamingResponse, TransportError>;
}

/// HTTP transport implementation using reqwest.
pub struct HttpTransportImpl {
    client: Client,
    default_timeout: Duration,
}

impl HttpTransportImpl {
    /// Creates a new HTTP transport.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = ClientBuilder::new()
            .pool_max_idle_per_host(10)
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| TransportError::Connection {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            default_timeout: timeout,
        })
    }

    fn prepare(&self, request: HttpRequest) -> (RequestBuilder, Duration) {
        let timeout = request.timeout.unwrap_or(self.default_timeout);

        let mut req_builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };

        for (name, value) in &request.headers {
            req_builder = req_builder.header(name, value);
        }

        if let Some(body) = request.body {
            req_builder = req_builder.body(body);
        }

        (req_builder.timeout(timeout), timeout)
    }
}

fn map_send_error(e: &reqwest::Error, timeout: Duration) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout { timeout }
    } else if e.is_connect() {
        TransportError::Connection {
            message: e.to_string(),
        }
    } else {
        TransportError::InvalidResponse {
            message: e.to_string(),
        }
    }
}

fn collect_headers(response: &reqwest::Response) -> HashMap<String, String> {
    response
        .headers()
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_ascii_lowercase(),
                v.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect()
}

#[async_trait]
impl HttpTransport for HttpTransportImpl {
    #[instrument(skip(self, request), fields(method = ?request.method, url = %request.url))]
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let (req_builder, timeout) = self.prepare(request);

        let response = req_builder
            .send()
            .await
            .map_err(|e| map_send_error(&e, timeout))?;

        let status = response.status().as_u16();
        let headers = collect_headers(&response);
        let body = response
            .bytes()
            .await
            .map_err(|e| map_send_error(&e, timeout))?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    #[instrument(skip(self, request), fields(method = ?request.method, url = %request.url))]
    async fn send_streaming(
        &self,
        request: HttpRequest,
    ) -> Result<StreamingResponse, TransportError> {
        let (req_builder, timeout) = self.prepare(request);

        let response = req_builder
            .send()
            .await
            .map_err(|e| map_send_error(&e, timeout))?;

        let status = response.status().as_u16();
        let headers = collect_headers(&response);

        let stream: ByteStream = Box::pin(response.bytes_stream().map(move |result| {
            result.map_err(|e| map_send_error(&e, timeout))
        }));

        Ok(StreamingResponse {
            status,
            headers,
            stream,
        })
    }
}

impl std::fmt::Debug for HttpTransportImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransportImpl")
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}
