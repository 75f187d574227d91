//! The wire seam between the router and upstream nodes.

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::types::JsonRpcRequest;

/// Transport-level failure: the node could not be reached, or its reply was
/// not a JSON document. Carries a sanitized detail string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Abstraction over the HTTP layer so the routing protocol can be exercised
/// with scripted transports in tests.
///
/// Implementations return the decoded JSON-RPC response document; envelope
/// interpretation (result/error members) is the router's job.
#[async_trait]
pub trait NodeTransport: Send + Sync {
    async fn request(&self, url: &str, body: &JsonRpcRequest) -> Result<Value, TransportError>;
}

/// Production transport backed by a pooled reqwest client.
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates the HTTP client with connection pooling and timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to build.
    pub fn new() -> Result<Self, TransportError> {
        let client = ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(45))
            .use_rustls_tls()
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent("wicket-proxy/0.1.0")
            .tcp_keepalive(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "failed to build http client");
                TransportError(format!("HTTP client build failed: {e}"))
            })?;

        Ok(Self { client })
    }

    /// Sanitizes network errors to prevent information disclosure.
    fn sanitize_network_error(error: &reqwest::Error) -> String {
        if error.is_connect() {
            "connection refused or unreachable".to_string()
        } else if error.is_timeout() {
            "connection timed out".to_string()
        } else if error.is_request() {
            "request failed".to_string()
        } else if error.is_body() {
            "response body error".to_string()
        } else if error.is_decode() {
            "response decode error".to_string()
        } else if error.is_redirect() {
            "too many redirects".to_string()
        } else {
            "network error".to_string()
        }
    }
}

#[async_trait]
impl NodeTransport for HttpClient {
    async fn request(&self, url: &str, body: &JsonRpcRequest) -> Result<Value, TransportError> {
        let response = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError(Self::sanitize_network_error(&e)))?;

        // A reply that is not a JSON document is indistinguishable from a
        // broken node, whatever the HTTP status said.
        response
            .json::<Value>()
            .await
            .map_err(|e| TransportError(Self::sanitize_network_error(&e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_client_builds() {
        assert!(HttpClient::new().is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_node_is_a_transport_error() {
        let client = HttpClient::new().unwrap();
        let request = JsonRpcRequest::new("eth_blockNumber", serde_json::json!([]), 1);

        let result = client.request("http://127.0.0.1:1", &request).await;
        assert!(result.is_err());
    }
}
