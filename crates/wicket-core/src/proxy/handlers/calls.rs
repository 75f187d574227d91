//! Call-shaped handlers: `eth_call`, `eth_estimateGas`, `eth_gasPrice`.
//!
//! Call objects are cache-keyed by their serialized form. Key order is
//! whatever the client sent - two semantically identical objects with
//! different field order are distinct cache entries. Canonicalizing would
//! silently change hit rates, so it is deliberately left alone.

use serde_json::{json, Value};

use crate::{
    cache::BoundedCache, errors::RpcError, proxy::engine::SharedContext, types::Method,
    utils::to_hex,
};

use super::BlockTagged;

pub(crate) const CALL_BLOCK_CAPACITY: usize = 10;
pub(crate) const CALLS_PER_BLOCK: usize = 500;
pub(crate) const ESTIMATE_CACHE_CAPACITY: usize = 50;

/// `eth_call`, keyed by block number then serialized call object.
pub(crate) async fn call(ctx: &SharedContext, params: &[Value]) -> Result<Value, RpcError> {
    let key = params[0].to_string();

    let (number, generation) = {
        let mut state = ctx.state.write().await;
        let number = state.normalize_block(&params[1])?;
        if number > state.lag.safe_block {
            return Ok(json!("0x"));
        }
        let per_block = state
            .methods
            .calls
            .get_or_insert_with(number, || BoundedCache::new(CALLS_PER_BLOCK));
        if let Some(cached) = per_block.get_refresh(&key) {
            return Ok(cached.clone());
        }
        (number, state.generation)
    };

    let result = ctx
        .upstream_call(Method::Call, json!([params[0].clone(), to_hex(number)]))
        .await?;

    let mut state = ctx.state.write().await;
    if state.generation == generation && !result.is_null() {
        state
            .methods
            .calls
            .get_or_insert_with(number, || BoundedCache::new(CALLS_PER_BLOCK))
            .insert(key, result.clone());
    }
    Ok(result)
}

/// `eth_estimateGas`, keyed by the serialized call object alone.
///
/// Estimates drift as the chain moves, so each entry is tagged with the safe
/// block it was computed at and recomputed once that tag goes stale.
pub(crate) async fn estimate_gas(ctx: &SharedContext, params: &[Value]) -> Result<Value, RpcError> {
    let key = params[0].to_string();

    let (safe_block, generation) = {
        let mut state = ctx.state.write().await;
        let safe_block = state.lag.safe_block;
        let stale = state
            .methods
            .estimate_gas
            .peek(&key)
            .is_some_and(|entry| entry.block_number != safe_block);
        if stale {
            state.methods.estimate_gas.remove(&key);
        }
        if let Some(entry) = state.methods.estimate_gas.get_refresh(&key) {
            return Ok(entry.result.clone());
        }
        (safe_block, state.generation)
    };

    let result = ctx.upstream_call(Method::EstimateGas, json!([params[0].clone()])).await?;

    let mut state = ctx.state.write().await;
    if state.generation == generation {
        state
            .methods
            .estimate_gas
            .insert(key, BlockTagged { block_number: safe_block, result: result.clone() });
    }
    Ok(result)
}

/// `eth_gasPrice` - a single slot, recomputed whenever the safe block moved.
pub(crate) async fn gas_price(ctx: &SharedContext) -> Result<Value, RpcError> {
    let (safe_block, generation) = {
        let mut state = ctx.state.write().await;
        let safe_block = state.lag.safe_block;
        if let Some(slot) = &state.methods.gas_price {
            if slot.block_number == safe_block {
                return Ok(slot.result.clone());
            }
        }
        (safe_block, state.generation)
    };

    let result = ctx.upstream_call(Method::GasPrice, json!([])).await?;

    let mut state = ctx.state.write().await;
    if state.generation == generation {
        state.methods.gas_price =
            Some(BlockTagged { block_number: safe_block, result: result.clone() });
    }
    Ok(result)
}
