//! The lag & reorg engine.
//!
//! A background loop drives the engine: after initialization it polls the
//! chain head on a fixed interval, advancing the safe block number only along
//! parent-linked header paths. Whenever consistency cannot be established -
//! a confirmed hash changed, or the head jumped implausibly far - every
//! method cache is dropped and rebuilt from scratch.

use serde_json::json;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::{
    chain::BlockHeader,
    errors::RpcError,
    proxy::engine::SharedContext,
    utils::to_hex,
};

/// Confirmed headers retained for ancestry verification. Must be at least 1.
pub const BLOCK_RETENTION: u64 = 3;

/// Timing and threshold knobs for the engine.
///
/// The block buffers guard against the underlying nodes not receiving the
/// newest blocks at the same time.
#[derive(Debug, Clone)]
pub struct LagConfig {
    /// Confirmations withheld before a block is trusted.
    pub block_delay: u64,
    /// Head jumps beyond `safe + block_max_gap + block_delay` trigger a full
    /// refill instead of a catch-up attempt.
    pub block_max_gap: u64,
    /// Interval between chain head polls, and between refill attempts.
    pub poll_interval: Duration,
    /// Interval between initialization attempts.
    pub init_retry_interval: Duration,
}

impl Default for LagConfig {
    fn default() -> Self {
        Self {
            block_delay: 2,
            block_max_gap: 12,
            poll_interval: Duration::from_secs(2),
            init_retry_interval: Duration::from_secs(10),
        }
    }
}

/// Tracks the deliberately delayed safe block number and reacts to chain
/// reorganizations by resetting and reseeding every cache.
pub struct LagEngine {
    ctx: SharedContext,
    config: LagConfig,
}

impl LagEngine {
    #[must_use]
    pub fn new(ctx: SharedContext, config: LagConfig) -> Self {
        Self { ctx, config }
    }

    /// Drives the engine forever: initialization with retry, then the
    /// steady-state poll loop. Intended to be spawned as a background task.
    pub async fn run(&self) {
        loop {
            match self.initialize().await {
                Ok(()) => break,
                Err(error) => {
                    error!(%error, "initialization failed, retrying");
                    tokio::time::sleep(self.config.init_retry_interval).await;
                }
            }
        }

        loop {
            tokio::time::sleep(self.config.poll_interval).await;
            if let Err(error) = self.poll_once().await {
                error!(%error, "chain head poll failed");
            }
        }
    }

    /// Establishes the write-once startup facts, performs the first refill,
    /// and flips the readiness flag.
    pub(crate) async fn initialize(&self) -> Result<(), RpcError> {
        let net_version = self.ctx.raw_call("net_version", json!([])).await?;
        let net_version =
            net_version.as_str().map_or_else(|| net_version.to_string(), str::to_string);

        let earliest = self.fetch_header("earliest").await?;

        {
            let mut state = self.ctx.state.write().await;
            state.init.net_version = net_version;
            state.init.earliest_block = earliest.number;
        }

        self.refill_until_consistent().await;

        self.ctx.state.write().await.init.ready = true;
        info!("initialization complete");
        Ok(())
    }

    /// One steady-state tick: advance if possible, reset and refill when the
    /// advance step detected an inconsistency.
    pub(crate) async fn poll_once(&self) -> Result<(), RpcError> {
        if !self.advance_once().await? {
            info!("resetting cache");
            self.ctx.counters.record_cache_reset();
            self.refill_until_consistent().await;
        }
        Ok(())
    }

    /// Retries the refill on the poll interval until the fetched headers form
    /// a consistent chain.
    pub(crate) async fn refill_until_consistent(&self) {
        loop {
            match self.try_refill().await {
                Ok(true) => return,
                Ok(false) => {}
                Err(error) => warn!(%error, "refill attempt failed"),
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Fetches the retention window below the delayed head and, if its
    /// headers are parent-linked, replaces all cache state with it.
    ///
    /// Returns `Ok(false)` when the fetched headers do not link up yet.
    async fn try_refill(&self) -> Result<bool, RpcError> {
        let head = self.fetch_header("latest").await?;
        let oldest = (head.number + 1).saturating_sub(BLOCK_RETENTION + self.config.block_delay);
        let candidates = self.fetch_range(oldest, BLOCK_RETENTION).await?;

        for pair in candidates.windows(2) {
            if pair[1].parent_hash != pair[0].hash {
                debug!(height = pair[1].number, "fetched headers are not linked, retrying");
                return Ok(false);
            }
        }

        let mut state = self.ctx.state.write().await;
        state.methods.clear_all();
        state.generation = state.generation.wrapping_add(1);
        state.lag.recent_hashes.clear();
        state.lag.delayed_blocks.clear();
        for block in &candidates {
            state.methods.seed_block(block);
            state.lag.recent_hashes.insert(block.number, block.hash.clone());
        }
        state.lag.safe_block = head.number.saturating_sub(self.config.block_delay);
        info!(safe_block = state.lag.safe_block, "cache refilled");
        Ok(true)
    }

    /// Processes one observed chain head.
    ///
    /// Returns `Ok(false)` when a reorg or anomaly requires a full refill.
    async fn advance_once(&self) -> Result<bool, RpcError> {
        let head = self.fetch_header("latest").await?;

        let (safe, catch_up, needs_backfill) = {
            let mut state = self.ctx.state.write().await;
            let safe = state.lag.safe_block;

            if head.number <= safe {
                return Ok(match state.lag.recent_hashes.get(&head.number) {
                    None => {
                        warn!(
                            head = head.number,
                            safe_block = safe,
                            "chain head dropped below the retained window"
                        );
                        false
                    }
                    Some(recorded) if *recorded != head.hash => {
                        warn!(head = head.number, "hash of an already confirmed block changed");
                        false
                    }
                    Some(_) => true,
                });
            }

            if head.number > safe + self.config.block_max_gap + self.config.block_delay {
                warn!(
                    head = head.number,
                    safe_block = safe,
                    "unexpectedly large gap in block numbers"
                );
                return Ok(false);
            }

            state.lag.insert_delayed(head.clone());

            let catch_up = head.number.saturating_sub(safe + self.config.block_delay);
            if catch_up == 0 {
                return Ok(true);
            }

            let needs_backfill = (1..=catch_up)
                .any(|offset| !state.lag.delayed_blocks.contains_key(&(safe + offset)));
            (safe, catch_up, needs_backfill)
        };

        if needs_backfill {
            let blocks = self.fetch_range(safe + 1, catch_up).await?;
            let mut state = self.ctx.state.write().await;
            for block in blocks {
                state.lag.insert_delayed(block);
            }
        }

        let recorded = {
            let mut state = self.ctx.state.write().await;
            let Some(recorded) = state.lag.recent_hashes.get(&safe).cloned() else {
                return Ok(false);
            };

            let front: Vec<BlockHeader> = state
                .lag
                .delayed_blocks
                .get(&(safe + catch_up))
                .map(|candidates| candidates.values().cloned().collect())
                .unwrap_or_default();

            for block in front {
                // Walk the parent chain back towards the confirmed hash.
                let mut hashes = VecDeque::from([block.hash.clone()]);
                let mut parent = Some(block.parent_hash);
                for offset in (1..catch_up).rev() {
                    let Some(hash) = parent.take() else { break };
                    parent = state
                        .lag
                        .delayed_blocks
                        .get(&(safe + offset))
                        .and_then(|candidates| candidates.get(&hash))
                        .map(|linked| linked.parent_hash.clone());
                    hashes.push_front(hash);
                }

                if parent.as_deref() == Some(recorded.as_str()) {
                    for hash in hashes {
                        state.lag.safe_block += 1;
                        let confirmed_height = state.lag.safe_block;
                        let evicted = confirmed_height.saturating_sub(BLOCK_RETENTION);
                        state.lag.recent_hashes.remove(&evicted);
                        state.lag.recent_hashes.insert(confirmed_height, hash.clone());
                        if let Some(candidates) =
                            state.lag.delayed_blocks.remove(&confirmed_height)
                        {
                            if let Some(block) = candidates.get(&hash) {
                                state.methods.seed_block(block);
                            }
                        }
                    }
                    debug!(safe_block = state.lag.safe_block, "safe block advanced");
                    return Ok(true);
                }
            }

            // No consistent path. Drop successor candidates that no longer
            // link to the confirmed hash; survivors mean the growth front is
            // simply not settled yet.
            let successors_left = match state.lag.delayed_blocks.get_mut(&(safe + 1)) {
                Some(successors) => {
                    successors.retain(|_, block| block.parent_hash == recorded);
                    !successors.is_empty()
                }
                None => false,
            };
            if successors_left {
                return Ok(true);
            }
            recorded
        };

        // No viable successor at all - check whether the confirmed block
        // itself was replaced under us.
        let current = self.fetch_header(&to_hex(safe)).await?;
        if current.hash != recorded {
            warn!(safe_block = safe, "hash of the most recent confirmed block changed");
            return Ok(false);
        }
        Ok(true)
    }

    async fn fetch_header(&self, param: &str) -> Result<BlockHeader, RpcError> {
        let raw = self.ctx.raw_call("eth_getBlockByNumber", json!([param, false])).await?;
        BlockHeader::from_value(raw)
    }

    async fn fetch_range(&self, start: u64, count: u64) -> Result<Vec<BlockHeader>, RpcError> {
        let fetches = (0..count).map(|offset| {
            let param = to_hex(start + offset);
            async move { self.fetch_header(&param).await }
        });
        futures::future::try_join_all(fetches).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{alt_header, hash_for, ChainSim};

    async fn initialized_engine(head: u64) -> (LagEngine, std::sync::Arc<ChainSim>) {
        let sim = ChainSim::new(head);
        let ctx = crate::test_support::build_ctx(sim.transport(), &["http://node"], &[]);
        let engine = LagEngine::new(ctx, LagConfig::default());
        engine.initialize().await.unwrap();
        (engine, sim)
    }

    #[tokio::test]
    async fn test_initialize_establishes_lagged_view() {
        let (engine, _sim) = initialized_engine(20).await;
        let state = engine.ctx.state.read().await;

        assert!(state.init.ready);
        assert_eq!(state.init.net_version, "5");
        assert_eq!(state.init.earliest_block, 0);
        assert_eq!(state.lag.safe_block, 18);

        // Exactly the retention window is recorded.
        let mut heights: Vec<u64> = state.lag.recent_hashes.keys().copied().collect();
        heights.sort_unstable();
        assert_eq!(heights, vec![16, 17, 18]);

        // The block cache was seeded with the fetched range.
        assert!(state.methods.blocks.contains(&16));
        assert!(state.methods.blocks.contains(&18));
        assert!(!state.methods.blocks.contains(&19));
    }

    #[tokio::test]
    async fn test_advance_along_consistent_chain() {
        let (engine, sim) = initialized_engine(20).await;

        sim.set_head(23);
        engine.poll_once().await.unwrap();

        let state = engine.ctx.state.read().await;
        assert_eq!(state.lag.safe_block, 21);
        assert_eq!(state.lag.recent_hashes.get(&21), Some(&hash_for(21)));
        assert!(!state.lag.recent_hashes.contains_key(&18));
        // Consumed heights left the delayed set; the undelayed head remains.
        assert!(!state.lag.delayed_blocks.contains_key(&21));
        assert!(state.lag.delayed_blocks.contains_key(&23));
        assert_eq!(engine.ctx.counters.snapshot().cache_resets, 0);
    }

    #[tokio::test]
    async fn test_already_confirmed_head_is_a_noop() {
        let (engine, sim) = initialized_engine(20).await;

        // The head reports a height already inside the confirmed window,
        // with the recorded hash.
        sim.set_head(18);
        engine.poll_once().await.unwrap();
        engine.poll_once().await.unwrap();

        let state = engine.ctx.state.read().await;
        assert_eq!(state.lag.safe_block, 18);
        assert_eq!(engine.ctx.counters.snapshot().cache_resets, 0);
    }

    #[tokio::test]
    async fn test_fork_candidate_is_pruned_not_served() {
        let (engine, sim) = initialized_engine(20).await;

        // A fork at safe+1 whose parent hash does not match the confirmed
        // block 18.
        sim.override_header(
            19,
            serde_json::json!({
                "number": "0x13",
                "hash": "0xforked19",
                "parentHash": "0xnot18",
                "transactions": [],
            }),
        );
        sim.set_head(21);
        engine.poll_once().await.unwrap();

        let state = engine.ctx.state.read().await;
        assert_eq!(state.lag.safe_block, 18);
        assert!(!state.methods.blocks.contains(&19));
        // The candidate was pruned rather than kept for a later advance.
        let survivors = state.lag.delayed_blocks.get(&19).map_or(0, std::collections::HashMap::len);
        assert_eq!(survivors, 0);
        assert_eq!(engine.ctx.counters.snapshot().cache_resets, 0);
    }

    #[tokio::test]
    async fn test_changed_confirmed_hash_triggers_refill() {
        let (engine, sim) = initialized_engine(20).await;

        // The confirmed block 18 reappears with a different hash.
        sim.override_header(18, alt_header(18));
        sim.set_head(18);
        engine.poll_once().await.unwrap();

        assert_eq!(engine.ctx.counters.snapshot().cache_resets, 1);
        let state = engine.ctx.state.read().await;
        // Refilled against the new head: safe = 18 - block_delay.
        assert_eq!(state.lag.safe_block, 16);
        assert!(state.lag.delayed_blocks.is_empty());
    }

    #[tokio::test]
    async fn test_large_gap_triggers_refill() {
        let (engine, sim) = initialized_engine(20).await;

        // 40 > safe(18) + block_max_gap(12) + block_delay(2)
        sim.set_head(40);
        engine.poll_once().await.unwrap();

        assert_eq!(engine.ctx.counters.snapshot().cache_resets, 1);
        let state = engine.ctx.state.read().await;
        assert_eq!(state.lag.safe_block, 38);
    }

    #[tokio::test]
    async fn test_head_below_retained_window_triggers_refill() {
        let (engine, sim) = initialized_engine(20).await;

        sim.set_head(10);
        engine.poll_once().await.unwrap();

        assert_eq!(engine.ctx.counters.snapshot().cache_resets, 1);
        let state = engine.ctx.state.read().await;
        assert_eq!(state.lag.safe_block, 8);
    }

    #[tokio::test]
    async fn test_refill_resets_method_caches_and_generation() {
        let (engine, sim) = initialized_engine(20).await;

        let generation_before = {
            let mut state = engine.ctx.state.write().await;
            state.methods.transactions.insert("0xdeadbeef".into(), serde_json::json!({}));
            state.generation
        };

        sim.set_head(40);
        engine.poll_once().await.unwrap();

        let state = engine.ctx.state.read().await;
        assert!(state.methods.transactions.is_empty());
        assert_ne!(state.generation, generation_before);
    }

    #[tokio::test]
    async fn test_unlinked_headers_defer_refill() {
        let sim = ChainSim::new(20);
        sim.override_header(17, alt_header(17));

        let ctx = crate::test_support::build_ctx(sim.transport(), &["http://node"], &[]);
        let engine = LagEngine::new(ctx, LagConfig::default());

        // 16 -> alt17 breaks the parent link; the refill must report
        // inconsistency instead of committing anything.
        assert!(!engine.try_refill().await.unwrap());
        let state = engine.ctx.state.read().await;
        assert_eq!(state.lag.safe_block, 0);
        assert!(state.lag.recent_hashes.is_empty());
    }
}
