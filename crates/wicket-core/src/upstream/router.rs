//! Node selection, failover escalation, and the bounded retry protocol.

use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Instant;
use tracing::warn;

use crate::{
    errors::{RpcError, RpcErrorKind},
    types::{JsonRpcError, JsonRpcRequest},
    upstream::{
        http_client::{NodeTransport, TransportError},
        node::{NodeId, NodePool},
    },
};

/// Result of one node query within a retry round.
struct QueryOutcome {
    node: NodeId,
    attempt: u32,
    result: Result<Value, RpcError>,
}

/// Routes requests across the prioritized node pool.
///
/// One logical `send` runs in rounds: each round selects nodes according to
/// the escalation order, queries them concurrently, then interprets the
/// collected responses to decide whether to return, re-query, escalate
/// further, or give up.
pub struct NodeRouter {
    pool: Mutex<NodePool>,
    transport: Arc<dyn NodeTransport>,
    call_id: AtomicU64,
}

impl NodeRouter {
    /// Creates a router over the given node URLs.
    ///
    /// # Errors
    ///
    /// Fails if no main node URL is provided.
    pub fn new(
        main_urls: Vec<String>,
        fallback_urls: Vec<String>,
        transport: Arc<dyn NodeTransport>,
    ) -> Result<Self, RpcError> {
        if main_urls.is_empty() {
            return Err(RpcError::with_detail(
                RpcErrorKind::Generic,
                "requires the url of at least one main RPC node",
            ));
        }

        Ok(Self {
            pool: Mutex::new(NodePool::new(main_urls, fallback_urls)),
            transport,
            call_id: AtomicU64::new(1),
        })
    }

    /// Sends one RPC call, failing over across the pool as needed.
    ///
    /// Response handling per node: a result returns immediately. Connection
    /// and internal errors keep escalating. An internal timeout is re-queried
    /// once on the same node, then treated like a connection error. Every
    /// other upstream error is surfaced to the caller verbatim.
    ///
    /// # Errors
    ///
    /// Returns a connection error once every reachable node has failed; in
    /// that case the starting main node's backoff is cleared so the next
    /// request always has at least one node to try.
    pub async fn send(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let (start_main, start_fallback, main_len, fallback_len) = {
            let pool = self.pool.lock();
            (pool.main_cursor, pool.fallback_cursor, pool.main.len(), pool.fallback.len())
        };

        let mut considered_main = 0usize;
        let mut considered_fallback = 0usize;
        let mut outcomes: Vec<QueryOutcome> = Vec::new();

        loop {
            let mut round: Vec<(NodeId, u32)> = Vec::new();

            for outcome in outcomes.drain(..) {
                match outcome.result {
                    Ok(value) => return Ok(value),
                    Err(error) => {
                        if error.escalates() ||
                            (error.is_internal_timeout() && outcome.attempt > 0)
                        {
                            self.log_node_failure(outcome.node, method, &error);
                        } else if error.is_internal_timeout() {
                            round.push((outcome.node, outcome.attempt + 1));
                        } else {
                            return Err(error);
                        }
                    }
                }
            }

            {
                let pool = self.pool.lock();
                let now = Instant::now();
                loop {
                    let candidate = if considered_main == 0 {
                        Some(NodeId { main: true, index: start_main })
                    } else if considered_fallback < fallback_len {
                        Some(NodeId {
                            main: false,
                            index: (start_fallback + considered_fallback) % fallback_len,
                        })
                    } else if considered_main < main_len {
                        Some(NodeId {
                            main: true,
                            index: (start_main + considered_main) % main_len,
                        })
                    } else {
                        None
                    };

                    let Some(id) = candidate else { break };
                    if id.main {
                        considered_main += 1;
                    } else {
                        considered_fallback += 1;
                    }

                    let node = pool.node(id);
                    if node.is_available(now) {
                        round.push((id, 0));
                    }

                    // A clean node ends the escalation for this round; a
                    // failing one pulls the next candidate in as well.
                    if node.fail_count == 0 {
                        break;
                    }
                }
            }

            if round.is_empty() {
                // All nodes are down. Clear the starting main node so the
                // next request always has one node to query - the pool can
                // never get permanently stuck.
                self.pool.lock().main[start_main].reset();
                warn!(method, "connection to all nodes failed");
                return Err(RpcError::with_detail(
                    RpcErrorKind::ConnectionError,
                    "Connection to all nodes failed",
                ));
            }

            outcomes = join_all(
                round
                    .into_iter()
                    .map(|(id, attempt)| self.query(id, method, params.clone(), attempt)),
            )
            .await;
        }
    }

    /// Queries a single node and interprets the response envelope.
    ///
    /// The node's rotation cursor advances before the query is issued, so
    /// concurrent requests interleave fairly regardless of response timing.
    async fn query(&self, id: NodeId, method: &str, params: Value, attempt: u32) -> QueryOutcome {
        let url = {
            let mut pool = self.pool.lock();
            pool.advance_cursor(id.main);
            pool.node(id).url.clone()
        };

        let request =
            JsonRpcRequest::new(method, params, self.call_id.fetch_add(1, Ordering::Relaxed));

        let result = match self.transport.request(&url, &request).await {
            Ok(reply) => self.interpret_reply(id, reply),
            Err(TransportError(detail)) => {
                self.penalize(id);
                Err(RpcError::with_detail(RpcErrorKind::ConnectionError, detail))
            }
        };

        QueryOutcome { node: id, attempt, result }
    }

    fn interpret_reply(&self, id: NodeId, reply: Value) -> Result<Value, RpcError> {
        let error_member = reply.get("error").filter(|e| !e.is_null());
        let result_member = reply.get("result");

        if error_member.is_none() && result_member.is_none() {
            self.penalize(id);
            return Err(RpcError::with_detail(
                RpcErrorKind::InternalError,
                format!("rpc response misses result property: {reply}"),
            ));
        }

        // Any well-formed envelope - even an error - proves the node alive.
        self.pool.lock().node_mut(id).record_success();

        if let Some(error) = error_member {
            let parsed: JsonRpcError =
                serde_json::from_value(error.clone()).unwrap_or_else(|_| JsonRpcError {
                    code: RpcErrorKind::Generic.code(),
                    message: error.to_string(),
                    data: None,
                });
            return Err(RpcError::Upstream(parsed));
        }

        Ok(result_member.cloned().unwrap_or(Value::Null))
    }

    fn penalize(&self, id: NodeId) {
        self.pool.lock().node_mut(id).record_failure(Instant::now());
    }

    fn log_node_failure(&self, id: NodeId, method: &str, error: &RpcError) {
        let (url, fail_count) = {
            let pool = self.pool.lock();
            let node = pool.node(id);
            (node.url.clone(), node.fail_count)
        };
        warn!(
            node = %url,
            kind = if id.main { "main" } else { "fallback" },
            method,
            fail_count,
            error = %error,
            "querying node failed"
        );
    }
}
