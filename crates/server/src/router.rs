//! HTTP route construction.

use axum::{extract::State, routing::post, Json, Router};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use wicket_core::proxy::ProxyEngine;

/// Builds the JSON-RPC application router.
///
/// A single `POST /` endpoint accepts one request object or a batch array.
/// CORS is permissive - the proxy is the access-control layer in front of
/// the nodes, not towards its own clients.
pub fn build(engine: Arc<ProxyEngine>) -> Router {
    Router::new()
        .route("/", post(handle_rpc))
        .layer(CorsLayer::permissive())
        .with_state(engine)
}

async fn handle_rpc(
    State(engine): State<Arc<ProxyEngine>>,
    Json(payload): Json<Value>,
) -> Json<Value> {
    Json(engine.handle(payload).await)
}
