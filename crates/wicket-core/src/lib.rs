//! # Wicket Core
//!
//! Core library for wicket, a caching and failover-routing proxy that sits in
//! front of one or more web3 JSON-RPC nodes.
//!
//! This crate provides the foundational components for:
//!
//! - **[`upstream`]**: Prioritized node pool with round-robin selection,
//!   failover escalation, per-node backoff, and a bounded retry protocol.
//!
//! - **[`cache`]**: The bounded insertion-ordered cache primitive underlying
//!   every per-method cache.
//!
//! - **[`chain`]**: The lag & reorg engine maintaining a deliberately delayed
//!   safe block number and verifying header ancestry before any data is
//!   committed to the caches.
//!
//! - **[`proxy`]**: Request validation, per-method cache handlers, and the
//!   engine dispatching decoded JSON-RPC requests (single or batched).
//!
//! - **[`metrics`]**: Per-method request/miss counters and the cache-reset
//!   counter, exposed as a snapshot for periodic reporting.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       ProxyEngine                        │
//! │  ┌───────────────┐  ┌───────────────┐  ┌──────────────┐  │
//! │  │  MethodTable  │  │   NodeRouter  │  │   Counters   │  │
//! │  │ (per-method   │  │ (round-robin  │  │ (requests /  │  │
//! │  │  caches)      │  │  + failover)  │  │  misses)     │  │
//! │  └───────┬───────┘  └───────┬───────┘  └──────────────┘  │
//! │          │                  │                            │
//! │  ┌───────▼──────────────────▼───────┐                    │
//! │  │            LagEngine             │                    │
//! │  │ (safe block tracking, reorg      │                    │
//! │  │  detection, cache reset/refill)  │                    │
//! │  └──────────────────────────────────┘                    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Request Flow
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────┐
//! │  Validation │ ─── Invalid ──► Error Response
//! └──────┬──────┘
//!        │ Valid
//!        ▼
//! ┌─────────────┐
//! │ Cache Check │ ─── Hit ──► Cached Response
//! └──────┬──────┘
//!        │ Miss
//!        ▼
//! ┌─────────────┐
//! │ NodeRouter  │ ──► main nodes ──► fallback nodes ──► remaining mains
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌──────────────┐
//! │ Cache Insert │ (skipped if a reset happened in between)
//! └──────┬───────┘
//!        │
//!        ▼
//!   Response to Client
//! ```

pub mod cache;
pub mod chain;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod proxy;
pub mod types;
pub mod upstream;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;
