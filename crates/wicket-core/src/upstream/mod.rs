//! Upstream node management and request routing.
//!
//! # Components
//!
//! - [`NodeRouter`]: selects nodes per request using round-robin plus
//!   failover escalation, fans each round out concurrently, and implements
//!   the bounded retry protocol.
//! - [`Node`] / `NodePool`: per-node failure tracking with linear backoff
//!   capped at ten minutes, and the rotation cursors.
//! - [`NodeTransport`] / [`HttpClient`]: the wire seam. Production code uses
//!   the reqwest-backed client; tests inject scripted transports.
//!
//! # Selection order
//!
//! While all main nodes are healthy, requests simply alternate between them
//! and fallback nodes are never queried. Once a considered node carries a
//! failure count, escalation proceeds through the fallback nodes in rotation
//! order, and only after those are exhausted through the remaining main
//! nodes as a last resort.

pub mod http_client;
pub mod node;
pub mod router;

pub use http_client::{HttpClient, NodeTransport, TransportError};
pub use node::Node;
pub use router::NodeRouter;
