//! Unified error taxonomy for the proxy.
//!
//! Every failure the proxy can report to a client is either one of the fixed
//! proxy error descriptors in [`RpcErrorKind`] (optionally carrying a detail
//! string) or an upstream node's own error object passed through verbatim.
//! The node router classifies errors by their numeric code, so both origins
//! share one code space.

use serde_json::{json, Value};
use thiserror::Error;

use crate::types::JsonRpcError;

/// Fixed proxy error descriptors with their JSON-RPC codes.
///
/// Codes below `-32600` follow the JSON-RPC 2.0 convention; the `-319xx`
/// range is proxy-specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcErrorKind {
    /// Returned for every call until the first successful cache refill.
    InitializationPending,
    /// Transport-level failure talking to a node, or the whole pool exhausted.
    ConnectionError,
    /// Unspecified error.
    Generic,
    /// The execution failed due to an exception (e.g. `eth_estimateGas`).
    EvmException,
    /// Structurally malformed request.
    InvalidRequest,
    /// Method not in the allow-list.
    InvalidMethod,
    /// Wrong parameter count or malformed parameter.
    InvalidParams,
    /// Internal error - also covers malformed upstream response envelopes.
    InternalError,
    /// Upstream-internal timeout; retried once on the same node before escalating.
    InternalTimeout,
}

impl RpcErrorKind {
    /// Returns the numeric JSON-RPC error code for this descriptor.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            RpcErrorKind::InitializationPending => -31999,
            RpcErrorKind::ConnectionError => -31998,
            RpcErrorKind::Generic => -32000,
            RpcErrorKind::EvmException => -32016,
            RpcErrorKind::InvalidRequest => -32600,
            RpcErrorKind::InvalidMethod => -32601,
            RpcErrorKind::InvalidParams => -32602,
            RpcErrorKind::InternalError => -32603,
            RpcErrorKind::InternalTimeout => -32606,
        }
    }

    /// Returns the fixed human-readable message for this descriptor.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            RpcErrorKind::InitializationPending => "proxy initialization pending",
            RpcErrorKind::ConnectionError => "Connection to Node failed",
            RpcErrorKind::Generic => "Unspecified Error",
            RpcErrorKind::EvmException => "The execution failed due to an exception.",
            RpcErrorKind::InvalidRequest => "Invalid Request",
            RpcErrorKind::InvalidMethod => "Invalid Method",
            RpcErrorKind::InvalidParams => "Invalid params",
            RpcErrorKind::InternalError => "Internal Error",
            RpcErrorKind::InternalTimeout => "Node internal timeout",
        }
    }
}

/// A structured proxy error: a fixed descriptor plus optional detail, or an
/// upstream error object surfaced verbatim.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RpcError {
    /// Proxy-originated error with a fixed descriptor.
    #[error("{} ({})", .kind.message(), .kind.code())]
    Proxy {
        kind: RpcErrorKind,
        detail: Option<String>,
    },

    /// Error reported by an upstream node, passed through unchanged.
    #[error("upstream error {}: {}", .0.code, .0.message)]
    Upstream(JsonRpcError),
}

impl RpcError {
    /// Creates a proxy error without detail.
    #[must_use]
    pub fn new(kind: RpcErrorKind) -> Self {
        RpcError::Proxy { kind, detail: None }
    }

    /// Creates a proxy error carrying contextual detail.
    #[must_use]
    pub fn with_detail(kind: RpcErrorKind, detail: impl Into<String>) -> Self {
        RpcError::Proxy { kind, detail: Some(detail.into()) }
    }

    /// Shorthand for the invalid-params descriptor, the most common client error.
    #[must_use]
    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self::with_detail(RpcErrorKind::InvalidParams, detail)
    }

    /// The effective JSON-RPC error code, regardless of origin.
    ///
    /// The router's retry protocol classifies purely by code: an internal
    /// error generated by the proxy for a malformed envelope escalates the
    /// same way as a node-returned `-32603`.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            RpcError::Proxy { kind, .. } => kind.code(),
            RpcError::Upstream(err) => err.code,
        }
    }

    /// True for errors that should be retried on other nodes: connection
    /// failures and internal errors.
    #[must_use]
    pub fn escalates(&self) -> bool {
        let code = self.code();
        code == RpcErrorKind::ConnectionError.code() || code == RpcErrorKind::InternalError.code()
    }

    /// True for the upstream-internal timeout, which is re-queried exactly
    /// once on the same node before escalating.
    #[must_use]
    pub fn is_internal_timeout(&self) -> bool {
        self.code() == RpcErrorKind::InternalTimeout.code()
    }

    /// Builds the client-facing error object, echoing the offending request
    /// plus upstream and proxy diagnostic context in `data`.
    #[must_use]
    pub fn to_json_error(&self, request: &Value) -> JsonRpcError {
        match self {
            RpcError::Proxy { kind, detail } => JsonRpcError {
                code: kind.code(),
                message: kind.message().to_string(),
                data: Some(json!({
                    "request": request,
                    "node": Value::Null,
                    "proxy": detail,
                })),
            },
            RpcError::Upstream(err) => JsonRpcError {
                code: err.code,
                message: err.message.clone(),
                data: Some(json!({
                    "request": request,
                    "node": err.data,
                    "proxy": Value::Null,
                })),
            },
        }
    }
}
