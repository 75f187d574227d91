//! `eth_getLogs` with range merging.
//!
//! The nested cache is keyed topic, then lower-cased address (or `"any"`),
//! then `fromBlock`, then `toBlock`. Within one (topic, address, fromBlock)
//! slot, a request whose range extends a cached one only fetches the gap
//! upstream and appends it to the cached prefix - one extra cache dimension
//! traded against redundant upstream range scans.

use serde_json::{json, Value};

use crate::{
    cache::BoundedCache,
    errors::{RpcError, RpcErrorKind},
    proxy::engine::SharedContext,
    types::Method,
    utils::to_hex,
};

pub(crate) const TOPIC_CAPACITY: usize = 10;
pub(crate) const ADDRESSES_PER_TOPIC: usize = 20;
pub(crate) const RANGES_PER_ADDRESS: usize = 10;
pub(crate) const RESULTS_PER_RANGE: usize = 10;

type RangeCache = BoundedCache<u64, Value>;
type FromCache = BoundedCache<u64, RangeCache>;
type AddressCache = BoundedCache<String, FromCache>;

/// The four-level log cache.
pub(crate) struct LogsCache {
    pub topics: BoundedCache<String, AddressCache>,
}

impl LogsCache {
    pub(crate) fn new() -> Self {
        Self { topics: BoundedCache::new(TOPIC_CAPACITY) }
    }

    pub(crate) fn clear(&mut self) {
        self.topics.clear();
    }
}

/// `eth_getLogs` with exactly one topic filter.
pub(crate) async fn get_logs(ctx: &SharedContext, params: &[Value]) -> Result<Value, RpcError> {
    let filter = params[0]
        .as_object()
        .ok_or_else(|| RpcError::invalid_params("filter object expected"))?;

    let from_param = filter
        .get("fromBlock")
        .ok_or_else(|| RpcError::invalid_params("missing fromBlock and/or toBlock property"))?;
    let to_param = filter
        .get("toBlock")
        .ok_or_else(|| RpcError::invalid_params("missing fromBlock and/or toBlock property"))?;

    let topic = filter
        .get("topics")
        .and_then(Value::as_array)
        .filter(|topics| topics.len() == 1)
        .and_then(|topics| topics[0].as_str())
        .ok_or_else(|| RpcError::invalid_params("only supports exactly one topic"))?
        .to_string();

    let address = match filter.get("address") {
        None | Some(Value::Null) => "any".to_string(),
        Some(Value::String(s)) => s.to_lowercase(),
        Some(_) => return Err(RpcError::invalid_params("only supports a single address")),
    };

    let (prefix, from, to, generation, upstream_filter) = {
        let mut state = ctx.state.write().await;
        let from = state.normalize_block(from_param)?;
        let mut to = state.normalize_block(to_param)?;
        if to > state.lag.safe_block {
            to = state.lag.safe_block;
        }
        if from > to {
            // Happens e.g. when querying from the last known block number
            // + 1 to latest.
            return Ok(json!([]));
        }

        let ranges = state
            .methods
            .logs
            .topics
            .get_or_insert_with(topic.clone(), || BoundedCache::new(ADDRESSES_PER_TOPIC))
            .get_or_insert_with(address.clone(), || BoundedCache::new(RANGES_PER_ADDRESS))
            .get_or_insert_with(from, || BoundedCache::new(RESULTS_PER_RANGE));

        if let Some(cached) = ranges.get_refresh(&to) {
            return Ok(cached.clone());
        }

        // The largest cached end still short of the requested one marks
        // where the upstream fetch has to start.
        let closest = ranges.iter().map(|(end, _)| *end).filter(|end| *end < to).max();
        let prefix: Vec<Value> = closest
            .and_then(|end| ranges.peek(&end))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let gap_from = closest.map_or(from, |end| end + 1);

        let mut upstream_filter = params[0].clone();
        upstream_filter["fromBlock"] = json!(to_hex(gap_from));
        upstream_filter["toBlock"] = json!(to_hex(to));

        (prefix, from, to, state.generation, upstream_filter)
    };

    let fetched = ctx.upstream_call(Method::GetLogs, json!([upstream_filter])).await?;
    let fetched = fetched.as_array().cloned().ok_or_else(|| {
        RpcError::with_detail(RpcErrorKind::InternalError, format!("malformed eth_getLogs reply: {fetched}"))
    })?;

    let mut combined = prefix;
    combined.extend(fetched);
    let combined = Value::Array(combined);

    let mut state = ctx.state.write().await;
    if state.generation == generation {
        state
            .methods
            .logs
            .topics
            .get_or_insert_with(topic, || BoundedCache::new(ADDRESSES_PER_TOPIC))
            .get_or_insert_with(address, || BoundedCache::new(RANGES_PER_ADDRESS))
            .get_or_insert_with(from, || BoundedCache::new(RESULTS_PER_RANGE))
            .insert(to, combined.clone());
    }
    Ok(combined)
}
