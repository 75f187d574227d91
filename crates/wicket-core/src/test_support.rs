//! In-process test doubles: a scripted transport standing in for real nodes,
//! and a minimal chain simulator for the lag engine and end-to-end tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use crate::{
    chain::{LagConfig, LagEngine},
    metrics::Counters,
    proxy::{ProxyEngine, SharedContext},
    types::JsonRpcRequest,
    upstream::{NodeRouter, NodeTransport, TransportError},
    utils::to_hex,
};

/// One recorded outbound request.
pub(crate) struct RecordedCall {
    pub url: String,
    pub method: String,
    pub params: Value,
    pub id: u64,
}

type Script = Box<dyn Fn(&str, &str, &Value) -> Result<Value, TransportError> + Send + Sync>;

/// A [`NodeTransport`] answering from a closure and recording every call.
pub(crate) struct ScriptedTransport {
    script: Script,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new(
        script: impl Fn(&str, &str, &Value) -> Result<Value, TransportError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self { script: Box::new(script), calls: Mutex::new(Vec::new()) })
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .map(|call| RecordedCall {
                url: call.url.clone(),
                method: call.method.clone(),
                params: call.params.clone(),
                id: call.id,
            })
            .collect()
    }

    pub fn calls_for(&self, method: &str) -> Vec<RecordedCall> {
        self.calls().into_iter().filter(|call| call.method == method).collect()
    }
}

#[async_trait]
impl NodeTransport for ScriptedTransport {
    async fn request(&self, url: &str, body: &JsonRpcRequest) -> Result<Value, TransportError> {
        self.calls.lock().push(RecordedCall {
            url: url.to_string(),
            method: body.method.clone(),
            params: body.params.clone(),
            id: body.id,
        });
        (self.script)(url, &body.method, &body.params)
    }
}

/// Wraps a result value in a JSON-RPC success envelope.
pub(crate) fn rpc_result(result: Value) -> Result<Value, TransportError> {
    Ok(json!({"jsonrpc": "2.0", "id": 1, "result": result}))
}

/// Wraps an error in a JSON-RPC error envelope.
pub(crate) fn rpc_error(code: i32, message: &str) -> Result<Value, TransportError> {
    Ok(json!({"jsonrpc": "2.0", "id": 1, "error": {"code": code, "message": message}}))
}

/// A transport-level connection failure.
pub(crate) fn connection_refused() -> Result<Value, TransportError> {
    Err(TransportError("connection refused or unreachable".into()))
}

/// Deterministic hash for the canonical simulated chain.
pub(crate) fn hash_for(number: u64) -> String {
    format!("0x{:064x}", number.wrapping_mul(0x9e37_79b9_7f4a_7c15).wrapping_add(1))
}

/// Canonical header at `number`, parent-linked via [`hash_for`].
pub(crate) fn canonical_header(number: u64) -> Value {
    json!({
        "number": to_hex(number),
        "hash": hash_for(number),
        "parentHash": hash_for(number.wrapping_sub(1)),
        "transactions": [],
    })
}

/// Header at `number` on an alternative, internally consistent chain.
pub(crate) fn alt_header(number: u64) -> Value {
    json!({
        "number": to_hex(number),
        "hash": format!("0xalt{number}"),
        "parentHash": format!("0xalt{}", number.wrapping_sub(1)),
        "transactions": [],
    })
}

type MethodScript = Box<dyn Fn(&Value) -> Result<Value, TransportError> + Send + Sync>;

/// Simulates one chain behind any number of node URLs: serves `net_version`
/// and `eth_getBlockByNumber` from a movable head with optional per-height
/// header overrides, and lets tests script any other method.
pub(crate) struct ChainSim {
    head: AtomicU64,
    overrides: Mutex<HashMap<u64, Value>>,
    methods: Mutex<HashMap<String, MethodScript>>,
}

impl ChainSim {
    pub fn new(head: u64) -> Arc<Self> {
        Arc::new(Self {
            head: AtomicU64::new(head),
            overrides: Mutex::new(HashMap::new()),
            methods: Mutex::new(HashMap::new()),
        })
    }

    pub fn set_head(&self, number: u64) {
        self.head.store(number, Ordering::SeqCst);
    }

    /// Replaces the header served for one height.
    pub fn override_header(&self, number: u64, header: Value) {
        self.overrides.lock().insert(number, header);
    }

    /// Scripts the reply for a method the simulator does not model itself.
    pub fn on_method(
        &self,
        method: &str,
        script: impl Fn(&Value) -> Result<Value, TransportError> + Send + Sync + 'static,
    ) {
        self.methods.lock().insert(method.to_string(), Box::new(script));
    }

    pub fn header(&self, number: u64) -> Value {
        self.overrides.lock().get(&number).cloned().unwrap_or_else(|| canonical_header(number))
    }

    pub fn transport(self: &Arc<Self>) -> Arc<ScriptedTransport> {
        let sim = Arc::clone(self);
        ScriptedTransport::new(move |_url, method, params| match method {
            "net_version" => rpc_result(json!("5")),
            "eth_getBlockByNumber" => {
                let number = match params[0].as_str() {
                    Some("latest") => sim.head.load(Ordering::SeqCst),
                    Some("earliest") => 0,
                    Some(hex) => hex
                        .strip_prefix("0x")
                        .and_then(|h| u64::from_str_radix(h, 16).ok())
                        .expect("simulated query with malformed block number"),
                    None => panic!("simulated query with non-string block number"),
                };
                rpc_result(sim.header(number))
            }
            other => match sim.methods.lock().get(other) {
                Some(script) => script(params),
                None => rpc_result(Value::Null),
            },
        })
    }
}

/// Builds a shared context over the given transport and node URLs.
pub(crate) fn build_ctx(
    transport: Arc<dyn NodeTransport>,
    main: &[&str],
    fallback: &[&str],
) -> SharedContext {
    let router = Arc::new(
        NodeRouter::new(
            main.iter().map(|s| (*s).to_string()).collect(),
            fallback.iter().map(|s| (*s).to_string()).collect(),
            transport,
        )
        .unwrap(),
    );
    SharedContext::new(router, Arc::new(Counters::new()))
}

/// Everything an end-to-end test needs, wired over one [`ChainSim`].
pub(crate) struct Harness {
    pub engine: ProxyEngine,
    pub lag: LagEngine,
    pub sim: Arc<ChainSim>,
    pub transport: Arc<ScriptedTransport>,
    pub ctx: SharedContext,
}

/// A harness whose lag engine has not initialized yet.
pub(crate) fn cold_harness(head: u64) -> Harness {
    let sim = ChainSim::new(head);
    let transport = sim.transport();
    let ctx = build_ctx(transport.clone(), &["http://node"], &[]);
    Harness {
        engine: ProxyEngine::new(ctx.clone()),
        lag: LagEngine::new(ctx.clone(), LagConfig::default()),
        sim,
        transport,
        ctx,
    }
}

/// A harness initialized against the simulated chain.
pub(crate) async fn ready_harness(head: u64) -> Harness {
    let harness = cold_harness(head);
    harness.lag.initialize().await.unwrap();
    harness
}

/// A well-formed client request payload.
pub(crate) fn rpc_request(method: &str, params: Value) -> Value {
    json!({"jsonrpc": "2.0", "method": method, "params": params, "id": 1})
}
