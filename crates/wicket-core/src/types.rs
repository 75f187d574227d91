//! Core type definitions for the JSON-RPC protocol surface.
//!
//! The supported method set is a fixed allow-list, represented as the
//! [`Method`] enum. Each variant knows its wire name and expected parameter
//! count; dispatch and per-method counters index off the enum instead of
//! re-validating strings at every layer.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// JSON-RPC protocol version constant to avoid repeated allocations.
pub const JSONRPC_VERSION: &str = "2.0";

/// Pre-allocated `Cow` for the JSON-RPC version - zero allocation for static usage.
pub const JSONRPC_VERSION_COW: Cow<'static, str> = Cow::Borrowed(JSONRPC_VERSION);

/// The RPC methods served by the proxy - single source of truth for method
/// validation, dispatch, and counter indexing.
///
/// Everything outside this list is rejected with an invalid-method error
/// before any cache or upstream work happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    NetVersion,
    BlockNumber,
    GetBlockByNumber,
    GetLogs,
    GetCode,
    Call,
    EstimateGas,
    GasPrice,
    GetBalance,
    GetTransactionByHash,
    GetTransactionCount,
    GetStorageAt,
}

impl Method {
    /// All supported methods, in reporting order.
    pub const ALL: [Method; 12] = [
        Method::NetVersion,
        Method::BlockNumber,
        Method::GetBlockByNumber,
        Method::GetLogs,
        Method::GetCode,
        Method::Call,
        Method::EstimateGas,
        Method::GasPrice,
        Method::GetBalance,
        Method::GetTransactionByHash,
        Method::GetTransactionCount,
        Method::GetStorageAt,
    ];

    /// Number of supported methods.
    pub const COUNT: usize = Self::ALL.len();

    /// Resolves a wire method name to its descriptor.
    ///
    /// Method names are case-sensitive per the JSON-RPC spec.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "net_version" => Some(Method::NetVersion),
            "eth_blockNumber" => Some(Method::BlockNumber),
            "eth_getBlockByNumber" => Some(Method::GetBlockByNumber),
            "eth_getLogs" => Some(Method::GetLogs),
            "eth_getCode" => Some(Method::GetCode),
            "eth_call" => Some(Method::Call),
            "eth_estimateGas" => Some(Method::EstimateGas),
            "eth_gasPrice" => Some(Method::GasPrice),
            "eth_getBalance" => Some(Method::GetBalance),
            "eth_getTransactionByHash" => Some(Method::GetTransactionByHash),
            "eth_getTransactionCount" => Some(Method::GetTransactionCount),
            "eth_getStorageAt" => Some(Method::GetStorageAt),
            _ => None,
        }
    }

    /// Returns the wire name of this method.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Method::NetVersion => "net_version",
            Method::BlockNumber => "eth_blockNumber",
            Method::GetBlockByNumber => "eth_getBlockByNumber",
            Method::GetLogs => "eth_getLogs",
            Method::GetCode => "eth_getCode",
            Method::Call => "eth_call",
            Method::EstimateGas => "eth_estimateGas",
            Method::GasPrice => "eth_gasPrice",
            Method::GetBalance => "eth_getBalance",
            Method::GetTransactionByHash => "eth_getTransactionByHash",
            Method::GetTransactionCount => "eth_getTransactionCount",
            Method::GetStorageAt => "eth_getStorageAt",
        }
    }

    /// Exact number of parameters this method requires.
    #[must_use]
    pub fn expected_params(self) -> usize {
        match self {
            Method::NetVersion | Method::BlockNumber | Method::GasPrice => 0,
            Method::GetLogs | Method::EstimateGas | Method::GetTransactionByHash => 1,
            Method::GetBlockByNumber |
            Method::GetCode |
            Method::Call |
            Method::GetBalance |
            Method::GetTransactionCount => 2,
            Method::GetStorageAt => 3,
        }
    }

    /// Stable index for counter arrays.
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// JSON-RPC 2.0 request structure for outbound node queries.
///
/// Inbound client requests are validated on the raw decoded JSON instead,
/// since malformed payloads must still produce well-formed error responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: Cow<'static, str>,
    pub method: String,
    pub params: serde_json::Value,
    pub id: u64,
}

impl JsonRpcRequest {
    /// Creates a new JSON-RPC request with zero allocation for the version string.
    #[must_use]
    pub fn new(method: impl Into<String>, params: serde_json::Value, id: u64) -> Self {
        Self { jsonrpc: JSONRPC_VERSION_COW, method: method.into(), params, id }
    }
}

/// JSON-RPC 2.0 response structure.
///
/// A response carries either a `result` (success) or an `error` (failure),
/// but never both. The `id` is echoed from the request, or `null` when the
/// request was too malformed to carry one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: serde_json::Value,
}

impl JsonRpcResponse {
    /// Creates a successful JSON-RPC response.
    ///
    /// A `null` result is a legitimate success value (e.g. an unknown
    /// transaction hash) and serializes as `"result": null`.
    #[must_use]
    pub fn success(result: serde_json::Value, id: serde_json::Value) -> Self {
        Self { jsonrpc: JSONRPC_VERSION_COW, result: Some(result), error: None, id }
    }

    /// Creates an error JSON-RPC response.
    #[must_use]
    pub fn failure(error: JsonRpcError, id: serde_json::Value) -> Self {
        Self { jsonrpc: JSONRPC_VERSION_COW, result: None, error: Some(error), id }
    }

    /// Serializes the response into a JSON value.
    #[must_use]
    pub fn into_value(self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// JSON-RPC 2.0 error object.
///
/// The proxy's own error codes are defined in [`crate::errors::RpcErrorKind`];
/// upstream nodes may report arbitrary codes which are passed through verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_from_name() {
        assert_eq!(Method::from_name("eth_getLogs"), Some(Method::GetLogs));
        assert_eq!(Method::from_name("net_version"), Some(Method::NetVersion));
        assert_eq!(Method::from_name("eth_getStorageAt"), Some(Method::GetStorageAt));

        assert_eq!(Method::from_name("debug_traceTransaction"), None);
        assert_eq!(Method::from_name("eth_getBlockByHash"), None);
    }

    #[test]
    fn test_method_names_are_case_sensitive() {
        assert_eq!(Method::from_name("ETH_GETLOGS"), None);
        assert_eq!(Method::from_name("Eth_GetLogs"), None);
    }

    #[test]
    fn test_method_name_round_trip() {
        for method in Method::ALL {
            assert_eq!(Method::from_name(method.name()), Some(method));
        }
    }

    #[test]
    fn test_method_indexes_are_dense() {
        for (position, method) in Method::ALL.iter().enumerate() {
            assert_eq!(method.index(), position);
        }
    }

    #[test]
    fn test_expected_params() {
        assert_eq!(Method::BlockNumber.expected_params(), 0);
        assert_eq!(Method::GetLogs.expected_params(), 1);
        assert_eq!(Method::GetBalance.expected_params(), 2);
        assert_eq!(Method::GetStorageAt.expected_params(), 3);
    }

    #[test]
    fn test_response_serialization_success() {
        let response = JsonRpcResponse::success(json!("0x12"), json!(7));
        let value = response.into_value();

        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["result"], "0x12");
        assert_eq!(value["id"], 7);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_response_serialization_null_result() {
        let response = JsonRpcResponse::success(json!(null), json!(1));
        let value = response.into_value();

        // "result": null must survive serialization - it is a success value.
        assert!(value.as_object().unwrap().contains_key("result"));
    }

    #[test]
    fn test_response_serialization_error() {
        let error = JsonRpcError { code: -32601, message: "Invalid Method".into(), data: None };
        let value = JsonRpcResponse::failure(error, json!("abc")).into_value();

        assert_eq!(value["error"]["code"], -32601);
        assert_eq!(value["id"], "abc");
        assert!(value.get("result").is_none());
    }
}
