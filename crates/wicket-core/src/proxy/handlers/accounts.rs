//! Account-state handlers: `eth_getBalance`, `eth_getCode`,
//! `eth_getTransactionCount`, `eth_getStorageAt`.

use serde_json::{json, Value};
use std::collections::HashSet;

use crate::{
    cache::BoundedCache, errors::RpcError, proxy::engine::SharedContext, types::Method,
    utils::to_hex,
};

use super::BlockTagged;

pub(crate) const BALANCE_BLOCK_CAPACITY: usize = 20;
pub(crate) const BALANCES_PER_BLOCK: usize = 200;
pub(crate) const CODE_CACHE_CAPACITY: usize = 100;
pub(crate) const NONCE_CACHE_CAPACITY: usize = 100;
pub(crate) const STORAGE_BLOCK_CAPACITY: usize = 20;
pub(crate) const STORAGE_READS_PER_BLOCK: usize = 100;

/// Cache for `eth_getCode`, assuming code is immutable once deployed: a hit
/// in `known` short-circuits permanently. Might fail in case of smart
/// contract self-destruction.
///
/// `no_code` records addresses confirmed empty at `block_number`; the set is
/// dropped whenever the safe block advances, since code may have been
/// deployed since.
pub(crate) struct CodeCache {
    pub block_number: u64,
    pub no_code: HashSet<String>,
    pub known: BoundedCache<String, Value>,
}

impl CodeCache {
    pub(crate) fn new() -> Self {
        Self { block_number: 0, no_code: HashSet::new(), known: BoundedCache::new(CODE_CACHE_CAPACITY) }
    }

    pub(crate) fn clear(&mut self) {
        self.block_number = 0;
        self.no_code.clear();
        self.known.clear();
    }
}

fn lowercase_address(param: &Value) -> Result<String, RpcError> {
    param
        .as_str()
        .map(str::to_lowercase)
        .ok_or_else(|| RpcError::invalid_params("address must be a string"))
}

fn require_latest(param: &Value) -> Result<(), RpcError> {
    if param.as_str() == Some("latest") {
        Ok(())
    } else {
        Err(RpcError::invalid_params("only supports latest block"))
    }
}

/// `eth_getBalance`, keyed by block number then lower-cased address.
pub(crate) async fn get_balance(ctx: &SharedContext, params: &[Value]) -> Result<Value, RpcError> {
    let address = lowercase_address(&params[0])?;

    let (number, generation) = {
        let mut state = ctx.state.write().await;
        let number = state.normalize_block(&params[1])?;
        if number > state.lag.safe_block {
            return Ok(Value::Null);
        }
        let per_block = state
            .methods
            .balances
            .get_or_insert_with(number, || BoundedCache::new(BALANCES_PER_BLOCK));
        if let Some(cached) = per_block.get_refresh(&address) {
            return Ok(cached.clone());
        }
        (number, state.generation)
    };

    let balance = ctx
        .upstream_call(Method::GetBalance, json!([params[0].clone(), to_hex(number)]))
        .await?;

    let mut state = ctx.state.write().await;
    if state.generation == generation && !balance.is_null() {
        state
            .methods
            .balances
            .get_or_insert_with(number, || BoundedCache::new(BALANCES_PER_BLOCK))
            .insert(address, balance.clone());
    }
    Ok(balance)
}

/// `eth_getCode` at the safe block, with positive and negative caching.
pub(crate) async fn get_code(ctx: &SharedContext, params: &[Value]) -> Result<Value, RpcError> {
    let address = lowercase_address(&params[0])?;
    require_latest(&params[1])?;

    let (safe_block, generation) = {
        let mut state = ctx.state.write().await;
        if let Some(code) = state.methods.code.known.get_refresh(&address) {
            return Ok(code.clone());
        }
        let safe_block = state.lag.safe_block;
        if state.methods.code.block_number != safe_block {
            state.methods.code.block_number = safe_block;
            state.methods.code.no_code.clear();
        } else if state.methods.code.no_code.contains(&address) {
            return Ok(json!("0x"));
        }
        (safe_block, state.generation)
    };

    let code = ctx
        .upstream_call(Method::GetCode, json!([params[0].clone(), to_hex(safe_block)]))
        .await?;

    let mut state = ctx.state.write().await;
    if state.generation == generation {
        if super::is_truthy(&code) && code != json!("0x") {
            state.methods.code.known.insert(address, code.clone());
        } else {
            state.methods.code.no_code.insert(address);
        }
    }
    Ok(code)
}

/// `eth_getTransactionCount` at the safe block, block-tagged like gas
/// estimates since nonces move with the chain.
pub(crate) async fn get_transaction_count(
    ctx: &SharedContext,
    params: &[Value],
) -> Result<Value, RpcError> {
    let address = lowercase_address(&params[0])?;
    require_latest(&params[1])?;

    let (safe_block, generation) = {
        let mut state = ctx.state.write().await;
        let safe_block = state.lag.safe_block;
        let stale = state
            .methods
            .nonces
            .peek(&address)
            .is_some_and(|entry| entry.block_number != safe_block);
        if stale {
            state.methods.nonces.remove(&address);
        }
        if let Some(entry) = state.methods.nonces.get_refresh(&address) {
            return Ok(entry.result.clone());
        }
        (safe_block, state.generation)
    };

    let count = ctx
        .upstream_call(
            Method::GetTransactionCount,
            json!([params[0].clone(), to_hex(safe_block)]),
        )
        .await?;

    let mut state = ctx.state.write().await;
    if state.generation == generation {
        state
            .methods
            .nonces
            .insert(address, BlockTagged { block_number: safe_block, result: count.clone() });
    }
    Ok(count)
}

/// `eth_getStorageAt`, keyed by block number then address+slot.
pub(crate) async fn get_storage_at(
    ctx: &SharedContext,
    params: &[Value],
) -> Result<Value, RpcError> {
    let address = lowercase_address(&params[0])?;
    let slot = params[1]
        .as_str()
        .ok_or_else(|| RpcError::invalid_params("storage slot must be a string"))?;
    let key = format!("{address}{slot}");

    let (number, generation) = {
        let mut state = ctx.state.write().await;
        let number = state.normalize_block(&params[2])?;
        if number > state.lag.safe_block {
            return Ok(json!("0x"));
        }
        let per_block = state
            .methods
            .storage
            .get_or_insert_with(number, || BoundedCache::new(STORAGE_READS_PER_BLOCK));
        if let Some(cached) = per_block.get_refresh(&key) {
            return Ok(cached.clone());
        }
        (number, state.generation)
    };

    let value = ctx
        .upstream_call(
            Method::GetStorageAt,
            json!([params[0].clone(), params[1].clone(), to_hex(number)]),
        )
        .await?;

    let mut state = ctx.state.write().await;
    if state.generation == generation && !value.is_null() {
        state
            .methods
            .storage
            .get_or_insert_with(number, || BoundedCache::new(STORAGE_READS_PER_BLOCK))
            .insert(key, value.clone());
    }
    Ok(value)
}
