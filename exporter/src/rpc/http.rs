//! HTTP transport for the node's JSON-RPC interface.
//!
//! Requests are posted as JSON with basic authentication:
//!
//! ```json
//! POST /
//! {"jsonrpc": "1.0", "id": 42, "method": "getblockchaininfo", "params": []}
//!
//! Response:
//! {"result": {...}, "error": null, "id": 42}
//! ```
//!
//! The node answers RPC-level failures with a non-2xx status *and* a JSON
//! envelope carrying the error object, so the status code is not checked
//! before decoding the body.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};

use super::error::RpcError;
use super::types::{RpcRequest, RpcResponse};

/// Something that can deliver one JSON-RPC request and return the decoded
/// response envelope.
///
/// Implementations only deal with the envelope; interpreting `error` and
/// `result` is left to [`super::RpcClient`].
pub trait RpcTransport: Send {
    fn send(
        &self,
        request: &RpcRequest<'_>,
        timeout: Option<Duration>,
    ) -> Result<RpcResponse, RpcError>;
}

/// Connection overrides for [`HttpTransport`].
#[derive(Clone, Debug, Default)]
pub struct TransportOptions {
    /// Extra headers sent with every request. A `content-type` entry is
    /// ignored: requests are always `application/json`.
    pub headers: HeaderMap,
}

/// Blocking HTTP transport bound to one node endpoint.
///
/// The underlying `reqwest` client keeps the connection alive between
/// calls, so all calls of a pass share one socket. Dropping the transport
/// releases it.
pub struct HttpTransport {
    url: String,
    user: String,
    password: String,
    client: Client,
}

impl HttpTransport {
    pub fn new(
        url: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
        options: TransportOptions,
    ) -> Result<Self, RpcError> {
        let mut headers = options.headers;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // `timeout` bounds every call; `send` may override it per call.
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: url.into(),
            user: user.into(),
            password: password.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl RpcTransport for HttpTransport {
    fn send(
        &self,
        request: &RpcRequest<'_>,
        timeout: Option<Duration>,
    ) -> Result<RpcResponse, RpcError> {
        let body = serde_json::to_vec(request)
            .map_err(|e| RpcError::Transport(format!("failed to encode request: {e}")))?;

        let mut builder = self
            .client
            .post(&self.url)
            .basic_auth(&self.user, Some(&self.password))
            .body(body);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let resp = builder
            .send()
            .map_err(|e| RpcError::Transport(format!("HTTP POST {} failed: {e}", self.url)))?;

        let status = resp.status();
        let bytes = resp.bytes().map_err(|e| {
            RpcError::Transport(format!("failed to read response body from {}: {e}", self.url))
        })?;

        serde_json::from_slice::<RpcResponse>(&bytes).map_err(|e| {
            RpcError::Transport(format!(
                "malformed response body (HTTP status {status}) from {}: {e}",
                self.url
            ))
        })
    }
}
