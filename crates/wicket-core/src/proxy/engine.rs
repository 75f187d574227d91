//! The proxy engine: validation, dispatch, and batch handling.

use futures::FutureExt;
use serde_json::{json, Value};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::{
    errors::{RpcError, RpcErrorKind},
    metrics::Counters,
    proxy::{handlers, state::ProxyState},
    types::{JsonRpcError, JsonRpcResponse, Method},
    upstream::NodeRouter,
};

/// Shared context for the request path and the lag engine.
///
/// Groups the references every handler needs - the state lock, the node
/// router, and the counters - so components hold one cheap clone instead of
/// individual `Arc`s.
#[derive(Clone)]
pub struct SharedContext {
    pub state: Arc<RwLock<ProxyState>>,
    pub router: Arc<NodeRouter>,
    pub counters: Arc<Counters>,
}

impl SharedContext {
    #[must_use]
    pub fn new(router: Arc<NodeRouter>, counters: Arc<Counters>) -> Self {
        Self { state: Arc::new(RwLock::new(ProxyState::new())), router, counters }
    }

    /// Upstream call on behalf of a client request - counts as a cache miss
    /// for the method.
    pub(crate) async fn upstream_call(
        &self,
        method: Method,
        params: Value,
    ) -> Result<Value, RpcError> {
        self.counters.record_miss(method);
        self.raw_call(method.name(), params).await
    }

    /// Upstream call that does not touch the miss counters - used by the lag
    /// engine's own fetches.
    pub(crate) async fn raw_call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let reply = self.router.send(method, params).await?;
        if reply.is_null() {
            debug!(method, "got null reply from node");
        }
        Ok(reply)
    }
}

/// Processes decoded JSON-RPC payloads against the method caches.
pub struct ProxyEngine {
    ctx: SharedContext,
}

impl ProxyEngine {
    #[must_use]
    pub fn new(ctx: SharedContext) -> Self {
        Self { ctx }
    }

    /// Returns the shared context, e.g. for wiring up the lag engine.
    #[must_use]
    pub fn context(&self) -> &SharedContext {
        &self.ctx
    }

    /// Entry point for one decoded payload: a single request object or a
    /// batch array, processed sequentially in input order.
    pub async fn handle(&self, payload: Value) -> Value {
        match payload {
            Value::Array(requests) => {
                let mut responses = Vec::with_capacity(requests.len());
                for request in &requests {
                    responses.push(self.handle_request(request).await);
                }
                Value::Array(responses)
            }
            single => self.handle_request(&single).await,
        }
    }

    /// Processes one request and always produces a response object - errors
    /// of every class are mapped to the structured error envelope.
    pub async fn handle_request(&self, request: &Value) -> Value {
        let id = request.get("id").cloned().unwrap_or(Value::Null);

        let response = match AssertUnwindSafe(self.process(request)).catch_unwind().await {
            Ok(Ok(result)) => JsonRpcResponse::success(result, id),
            Ok(Err(error)) => JsonRpcResponse::failure(error.to_json_error(request), id),
            Err(_) => {
                error!(request = %request, "caught unexpected panic while processing request");
                // Only a server timestamp leaves the process here.
                JsonRpcResponse::failure(
                    JsonRpcError {
                        code: RpcErrorKind::InternalError.code(),
                        message: RpcErrorKind::InternalError.message().to_string(),
                        data: Some(json!({
                            "server_time": chrono::Utc::now().to_rfc3339(),
                        })),
                    },
                    id,
                )
            }
        };

        response.into_value()
    }

    async fn process(&self, request: &Value) -> Result<Value, RpcError> {
        let method_name = request
            .get("method")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::new(RpcErrorKind::InvalidRequest))?;
        let params = request
            .get("params")
            .and_then(Value::as_array)
            .ok_or_else(|| RpcError::new(RpcErrorKind::InvalidRequest))?;
        if request.get("id").map_or(true, Value::is_null) {
            return Err(RpcError::new(RpcErrorKind::InvalidRequest));
        }

        let method = Method::from_name(method_name)
            .ok_or_else(|| RpcError::new(RpcErrorKind::InvalidMethod))?;

        if params.len() != method.expected_params() {
            return Err(RpcError::invalid_params(format!(
                "expected {} params, but got {}",
                method.expected_params(),
                params.len()
            )));
        }

        if !self.ctx.state.read().await.init.ready {
            return Err(RpcError::new(RpcErrorKind::InitializationPending));
        }

        self.ctx.counters.record_request(method);
        handlers::dispatch(&self.ctx, method, params).await
    }
}
