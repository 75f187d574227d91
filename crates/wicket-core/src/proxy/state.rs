//! Shared proxy state.
//!
//! Everything the request path and the lag engine mutate lives in one
//! [`ProxyState`] behind a single authoritative lock: the write-once startup
//! facts, the lagged chain view, every method cache, and the reset
//! generation. Critical sections never suspend; upstream calls always run
//! with the lock released.
//!
//! The generation counter is what makes a full reset atomic for in-flight
//! handlers: a handler snapshots it before suspending for an upstream call
//! and re-checks it before writing, so a value normalized against a
//! pre-reset safe block can never land in a post-reset cache.

use serde_json::Value;

use crate::{
    chain::{InitState, LagState},
    errors::RpcError,
    proxy::handlers::MethodTable,
    utils::BlockParam,
};

/// The proxy's entire mutable state.
pub struct ProxyState {
    pub(crate) init: InitState,
    pub(crate) lag: LagState,
    pub(crate) methods: MethodTable,
    pub(crate) generation: u64,
}

impl ProxyState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            init: InitState::default(),
            lag: LagState::default(),
            methods: MethodTable::new(),
            generation: 0,
        }
    }

    /// Resolves a wire block argument against the lagged view: `"latest"`
    /// maps to the safe block number, the earliest aliases to the chain's
    /// earliest block, anything else to its numeric value.
    pub(crate) fn normalize_block(&self, param: &Value) -> Result<u64, RpcError> {
        Ok(match BlockParam::parse(param)? {
            BlockParam::Latest => self.lag.safe_block,
            BlockParam::Earliest => self.init.earliest_block,
            BlockParam::Number(number) => number,
        })
    }
}

impl Default for ProxyState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_block() {
        let mut state = ProxyState::new();
        state.lag.safe_block = 18;
        state.init.earliest_block = 3;

        assert_eq!(state.normalize_block(&json!("latest")).unwrap(), 18);
        assert_eq!(state.normalize_block(&json!("earliest")).unwrap(), 3);
        assert_eq!(state.normalize_block(&json!("0x0")).unwrap(), 3);
        assert_eq!(state.normalize_block(&json!("0x10")).unwrap(), 16);
        assert_eq!(state.normalize_block(&json!(12)).unwrap(), 12);
        assert!(state.normalize_block(&json!("bogus")).is_err());
    }
}
