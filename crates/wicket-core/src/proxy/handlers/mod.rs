//! Per-method cache handlers.
//!
//! Each supported method owns exactly the cache structure its algorithm
//! needs - a flat [`BoundedCache`], a nested cache-of-caches, or a single
//! tagged slot - collected in the [`MethodTable`]. The lag engine clears the
//! whole table on every reset.
//!
//! Handlers share one access pattern: a first critical section normalizes
//! block arguments and probes the cache, the upstream call runs with the
//! state lock released, and a second critical section re-checks the reset
//! generation before inserting. Two racing misses may both fetch; the later
//! writer wins.

pub(crate) mod accounts;
pub(crate) mod blocks;
pub(crate) mod calls;
pub(crate) mod logs;
pub(crate) mod transactions;

use serde_json::Value;

use crate::{
    cache::BoundedCache,
    chain::BlockHeader,
    errors::RpcError,
    proxy::engine::SharedContext,
    types::Method,
};

/// A cached value tagged with the safe block number it was computed at.
/// Entries whose tag no longer matches are recomputed.
#[derive(Debug, Clone)]
pub(crate) struct BlockTagged {
    pub block_number: u64,
    pub result: Value,
}

/// All per-method caches, owned together so a reset clears them atomically.
pub(crate) struct MethodTable {
    /// `eth_getBlockByNumber`: block number to block object.
    pub blocks: BoundedCache<u64, Value>,
    /// `eth_getLogs`: topic to address to fromBlock to toBlock.
    pub logs: logs::LogsCache,
    /// `eth_getCode`: immutable known code plus a per-safe-block negative set.
    pub code: accounts::CodeCache,
    /// `eth_call`: block number to serialized call object.
    pub calls: BoundedCache<u64, BoundedCache<String, Value>>,
    /// `eth_estimateGas`: serialized call object, block-tagged.
    pub estimate_gas: BoundedCache<String, BlockTagged>,
    /// `eth_gasPrice`: single block-tagged slot.
    pub gas_price: Option<BlockTagged>,
    /// `eth_getBalance`: block number to lower-cased address.
    pub balances: BoundedCache<u64, BoundedCache<String, Value>>,
    /// `eth_getTransactionByHash`: transaction hash. Mined transactions are
    /// immutable, so entries carry no block dependency.
    pub transactions: BoundedCache<String, Value>,
    /// `eth_getTransactionCount`: lower-cased address, block-tagged.
    pub nonces: BoundedCache<String, BlockTagged>,
    /// `eth_getStorageAt`: block number to address+slot.
    pub storage: BoundedCache<u64, BoundedCache<String, Value>>,
}

impl MethodTable {
    pub(crate) fn new() -> Self {
        Self {
            blocks: BoundedCache::new(blocks::BLOCK_CACHE_CAPACITY),
            logs: logs::LogsCache::new(),
            code: accounts::CodeCache::new(),
            calls: BoundedCache::new(calls::CALL_BLOCK_CAPACITY),
            estimate_gas: BoundedCache::new(calls::ESTIMATE_CACHE_CAPACITY),
            gas_price: None,
            balances: BoundedCache::new(accounts::BALANCE_BLOCK_CAPACITY),
            transactions: BoundedCache::new(transactions::TRANSACTION_CACHE_CAPACITY),
            nonces: BoundedCache::new(accounts::NONCE_CACHE_CAPACITY),
            storage: BoundedCache::new(accounts::STORAGE_BLOCK_CAPACITY),
        }
    }

    /// Drops every cached entry. Invoked on every engine reset.
    pub(crate) fn clear_all(&mut self) {
        self.blocks.clear();
        self.logs.clear();
        self.code.clear();
        self.calls.clear();
        self.estimate_gas.clear();
        self.gas_price = None;
        self.balances.clear();
        self.transactions.clear();
        self.nonces.clear();
        self.storage.clear();
    }

    /// Seeds the block cache with a header the lag engine confirmed.
    pub(crate) fn seed_block(&mut self, header: &BlockHeader) {
        self.blocks.insert(header.number, header.raw.clone());
    }
}

impl Default for MethodTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Routes a validated request to its handler.
pub(crate) async fn dispatch(
    ctx: &SharedContext,
    method: Method,
    params: &[Value],
) -> Result<Value, RpcError> {
    match method {
        Method::NetVersion => blocks::net_version(ctx).await,
        Method::BlockNumber => blocks::block_number(ctx).await,
        Method::GetBlockByNumber => blocks::block_by_number(ctx, params).await,
        Method::GetLogs => logs::get_logs(ctx, params).await,
        Method::GetCode => accounts::get_code(ctx, params).await,
        Method::Call => calls::call(ctx, params).await,
        Method::EstimateGas => calls::estimate_gas(ctx, params).await,
        Method::GasPrice => calls::gas_price(ctx).await,
        Method::GetBalance => accounts::get_balance(ctx, params).await,
        Method::GetTransactionByHash => transactions::transaction_by_hash(ctx, params).await,
        Method::GetTransactionCount => accounts::get_transaction_count(ctx, params).await,
        Method::GetStorageAt => accounts::get_storage_at(ctx, params).await,
    }
}

/// JavaScript-style truthiness, used where the wire format historically
/// accepted any falsy value.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
