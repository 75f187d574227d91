//! Chain state tracking: block headers, the lagged safe-block view, and the
//! reorg-detecting advance engine.
//!
//! The proxy never serves data for a block until the [`LagEngine`] has proven
//! two things about it: the block has `block_delay` confirmations on top of
//! it, and its ancestry links back to the last confirmed height through an
//! unbroken `parentHash` chain. Until both hold, candidate headers sit in
//! [`LagState::delayed_blocks`].

pub mod lag;

pub use lag::{LagConfig, LagEngine};

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::{
    errors::{RpcError, RpcErrorKind},
    utils::block_param,
};

/// A block header as fetched from a node: the fields the engine links on,
/// plus the raw JSON served to clients from the block cache.
#[derive(Debug, Clone)]
pub struct BlockHeader {
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
    pub raw: Value,
}

impl BlockHeader {
    /// Parses a header from an `eth_getBlockByNumber` result.
    ///
    /// # Errors
    ///
    /// Returns an internal error when the reply is not a block object with
    /// `number`, `hash` and `parentHash` - e.g. `null` from a still-syncing
    /// node.
    pub fn from_value(raw: Value) -> Result<Self, RpcError> {
        let number = raw
            .get("number")
            .and_then(block_param::number_from_json)
            .ok_or_else(|| malformed_header(&raw))?;
        let hash = raw
            .get("hash")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed_header(&raw))?
            .to_string();
        let parent_hash = raw
            .get("parentHash")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed_header(&raw))?
            .to_string();

        Ok(Self { number, hash, parent_hash, raw })
    }
}

fn malformed_header(raw: &Value) -> RpcError {
    RpcError::with_detail(RpcErrorKind::InternalError, format!("malformed block header: {raw}"))
}

/// Write-once facts established during startup, plus the readiness flag.
#[derive(Debug, Clone, Default)]
pub struct InitState {
    /// The chain's `net_version` reply, served from memory afterwards.
    pub net_version: String,
    /// Number of the earliest block the chain reports.
    pub earliest_block: u64,
    /// Flips true after the first successful refill; until then every call
    /// fails fast with initialization-pending.
    pub ready: bool,
}

/// The lagged view of the chain.
#[derive(Debug, Default)]
pub struct LagState {
    /// Highest block height considered stable enough to serve.
    pub safe_block: u64,
    /// Candidate headers pending consistency proof, keyed by height then
    /// hash. Competing hashes per height are possible during a reorg race.
    pub delayed_blocks: BTreeMap<u64, HashMap<String, BlockHeader>>,
    /// Hashes of the last `BLOCK_RETENTION` confirmed heights.
    pub recent_hashes: HashMap<u64, String>,
}

impl LagState {
    /// Records a candidate header, keeping earlier candidates for the same
    /// height and hash.
    pub(crate) fn insert_delayed(&mut self, header: BlockHeader) {
        let candidates = self.delayed_blocks.entry(header.number).or_default();
        candidates.entry(header.hash.clone()).or_insert(header);
    }
}
