//! Block parameter parsing.
//!
//! Provides consistent parsing for the block-number arguments accepted by the
//! cached methods, eliminating duplicate hex parsing logic across handlers.

use serde_json::Value;

use crate::errors::RpcError;

/// A block-number argument as it appears on the wire, before normalization
/// against the lag engine's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockParam {
    /// `"latest"` - resolves to the safe block number.
    Latest,
    /// `"earliest"`, `"0x0"` or `"0"` - resolves to the earliest block the
    /// chain reports.
    Earliest,
    /// A specific block number.
    Number(u64),
}

impl BlockParam {
    /// Parses a block parameter from a request argument.
    ///
    /// Handles block tags, hex strings with a `0x` prefix, decimal strings,
    /// and plain JSON numbers.
    ///
    /// # Errors
    /// Returns an invalid-params error if the value is none of the above.
    pub fn parse(value: &Value) -> Result<Self, RpcError> {
        match value {
            Value::String(s) => match s.as_str() {
                "latest" => Ok(BlockParam::Latest),
                "earliest" | "0x0" | "0" => Ok(BlockParam::Earliest),
                other => parse_numeric(other)
                    .map(BlockParam::Number)
                    .ok_or_else(|| RpcError::invalid_params(format!("invalid block number: {other}"))),
            },
            Value::Number(n) => n
                .as_u64()
                .map(BlockParam::Number)
                .ok_or_else(|| RpcError::invalid_params(format!("invalid block number: {n}"))),
            other => Err(RpcError::invalid_params(format!("invalid block number: {other}"))),
        }
    }
}

fn parse_numeric(s: &str) -> Option<u64> {
    if let Some(hex) = s.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).ok()
    } else {
        s.parse::<u64>().ok()
    }
}

/// Renders a block number in the 0x-prefixed hex form the wire expects.
#[must_use]
pub fn to_hex(number: u64) -> String {
    format!("0x{number:x}")
}

/// Extracts a block number from a hex-encoded JSON string value, as found in
/// block header fields like `number`.
#[must_use]
pub fn number_from_json(value: &Value) -> Option<u64> {
    value.as_str().and_then(|s| parse_numeric(s))
}
