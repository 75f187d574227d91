//! Handlers served from the lagged chain view: `net_version`,
//! `eth_blockNumber`, and the block-by-number cache.

use serde_json::{json, Value};

use crate::{
    errors::RpcError, proxy::engine::SharedContext, types::Method, utils::to_hex,
};

pub(crate) const BLOCK_CACHE_CAPACITY: usize = 20;

/// `net_version` - answered from the write-once startup state.
pub(crate) async fn net_version(ctx: &SharedContext) -> Result<Value, RpcError> {
    let state = ctx.state.read().await;
    Ok(Value::String(state.init.net_version.clone()))
}

/// `eth_blockNumber` - the safe block number, never the raw chain head.
pub(crate) async fn block_number(ctx: &SharedContext) -> Result<Value, RpcError> {
    let state = ctx.state.read().await;
    Ok(Value::String(to_hex(state.lag.safe_block)))
}

/// `eth_getBlockByNumber` with transaction hashes only.
///
/// Blocks above the safe height answer `null` without an upstream call; the
/// cache is usually warm for recent heights because the lag engine seeds it
/// with every header it confirms.
pub(crate) async fn block_by_number(
    ctx: &SharedContext,
    params: &[Value],
) -> Result<Value, RpcError> {
    if super::is_truthy(&params[1]) {
        return Err(RpcError::invalid_params(
            "second param has to be false, only retrieval of transaction hashes is supported",
        ));
    }

    let (number, generation) = {
        let mut state = ctx.state.write().await;
        let number = state.normalize_block(&params[0])?;
        if number > state.lag.safe_block {
            return Ok(Value::Null);
        }
        if let Some(cached) = state.methods.blocks.get_refresh(&number) {
            return Ok(cached.clone());
        }
        (number, state.generation)
    };

    let block = ctx
        .upstream_call(Method::GetBlockByNumber, json!([to_hex(number), false]))
        .await?;

    let mut state = ctx.state.write().await;
    if state.generation == generation && !block.is_null() {
        state.methods.blocks.insert(number, block.clone());
    }
    Ok(block)
}
