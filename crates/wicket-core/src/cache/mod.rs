//! Caching primitives.
//!
//! Every per-method cache in the proxy - flat or nested - is built from the
//! single [`BoundedCache`] primitive: a capacity-capped map ordered by write
//! recency with oldest-first eviction.

pub mod bounded;

pub use bounded::BoundedCache;
