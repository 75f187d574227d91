//! Shared utilities.

pub mod block_param;

pub use block_param::{to_hex, BlockParam};
