//! `eth_getTransactionByHash`.

use serde_json::{json, Value};

use crate::{errors::RpcError, proxy::engine::SharedContext, types::Method};

pub(crate) const TRANSACTION_CACHE_CAPACITY: usize = 5000;

/// Mined transactions never change, so hits are valid forever and entries
/// carry no block-number dependency. Unknown hashes answer `null` and are
/// not cached.
pub(crate) async fn transaction_by_hash(
    ctx: &SharedContext,
    params: &[Value],
) -> Result<Value, RpcError> {
    let hash = params[0]
        .as_str()
        .ok_or_else(|| RpcError::invalid_params("transaction hash must be a string"))?
        .to_string();

    let generation = {
        let mut state = ctx.state.write().await;
        if let Some(cached) = state.methods.transactions.get_refresh(&hash) {
            return Ok(cached.clone());
        }
        state.generation
    };

    let transaction = ctx
        .upstream_call(Method::GetTransactionByHash, json!([params[0].clone()]))
        .await?;

    let mut state = ctx.state.write().await;
    if state.generation == generation && !transaction.is_null() {
        state.methods.transactions.insert(hash, transaction.clone());
    }
    Ok(transaction)
}
