//! Per-node health tracking and the prioritized node pool.

use std::time::{Duration, Instant};

/// Seconds added to the backoff per consecutive failure.
const BACKOFF_STEP_SECS: u64 = 5;

/// Upper bound on the backoff, in seconds.
const BACKOFF_CAP_SECS: u64 = 600;

/// A single upstream RPC node with its failure-tracking state.
///
/// `fail_count` increments on transport failures and malformed response
/// envelopes; any well-formed RPC response (success or error) proves the node
/// alive and resets it. `skip_until` excludes the node from selection while a
/// backoff is active.
#[derive(Debug, Clone)]
pub struct Node {
    pub url: String,
    pub is_main: bool,
    pub fail_count: u32,
    pub skip_until: Option<Instant>,
}

impl Node {
    pub(crate) fn new(url: String, is_main: bool) -> Self {
        Self { url, is_main, fail_count: 0, skip_until: None }
    }

    /// Records a failed query, extending the backoff window.
    ///
    /// The wait grows linearly with consecutive failures:
    /// `min(fail_count * 5, 600)` seconds from `now`.
    pub(crate) fn record_failure(&mut self, now: Instant) {
        self.fail_count += 1;
        let secs = (u64::from(self.fail_count) * BACKOFF_STEP_SECS).min(BACKOFF_CAP_SECS);
        self.skip_until = Some(now + Duration::from_secs(secs));
    }

    /// Records a well-formed response, clearing any failure state.
    pub(crate) fn record_success(&mut self) {
        if self.fail_count != 0 {
            self.fail_count = 0;
            self.skip_until = None;
        }
    }

    /// Clears failure state unconditionally.
    pub(crate) fn reset(&mut self) {
        self.fail_count = 0;
        self.skip_until = None;
    }

    /// Whether the node may be queried at `now`.
    pub(crate) fn is_available(&self, now: Instant) -> bool {
        self.skip_until.map_or(true, |until| now > until)
    }
}

/// Identifies a node by pool membership and position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NodeId {
    pub main: bool,
    pub index: usize,
}

/// Ordered main and fallback nodes with independent rotation cursors.
///
/// Cursors advance only when a node is actually queried, never when it is
/// skipped, so concurrent requests interleave fairly.
#[derive(Debug)]
pub(crate) struct NodePool {
    pub main: Vec<Node>,
    pub fallback: Vec<Node>,
    pub main_cursor: usize,
    pub fallback_cursor: usize,
}

impl NodePool {
    pub fn new(main_urls: Vec<String>, fallback_urls: Vec<String>) -> Self {
        Self {
            main: main_urls.into_iter().map(|url| Node::new(url, true)).collect(),
            fallback: fallback_urls.into_iter().map(|url| Node::new(url, false)).collect(),
            main_cursor: 0,
            fallback_cursor: 0,
        }
    }

    pub fn node(&self, id: NodeId) -> &Node {
        if id.main {
            &self.main[id.index]
        } else {
            &self.fallback[id.index]
        }
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        if id.main {
            &mut self.main[id.index]
        } else {
            &mut self.fallback[id.index]
        }
    }

    pub fn advance_cursor(&mut self, main: bool) {
        if main {
            self.main_cursor = (self.main_cursor + 1) % self.main.len();
        } else if !self.fallback.is_empty() {
            self.fallback_cursor = (self.fallback_cursor + 1) % self.fallback.len();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_linearly_with_failures() {
        let now = Instant::now();
        let mut node = Node::new("http://localhost:8545".into(), true);

        node.record_failure(now);
        assert_eq!(node.skip_until, Some(now + Duration::from_secs(5)));

        node.record_failure(now);
        node.record_failure(now);
        assert_eq!(node.fail_count, 3);
        assert_eq!(node.skip_until, Some(now + Duration::from_secs(15)));
    }

    #[test]
    fn test_backoff_caps_at_ten_minutes() {
        let now = Instant::now();
        let mut node = Node::new("http://localhost:8545".into(), true);

        for _ in 0..200 {
            node.record_failure(now);
        }
        assert_eq!(node.skip_until, Some(now + Duration::from_secs(600)));
    }

    #[test]
    fn test_success_resets_failure_state() {
        let now = Instant::now();
        let mut node = Node::new("http://localhost:8545".into(), true);

        node.record_failure(now);
        assert!(!node.is_available(now));

        node.record_success();
        assert_eq!(node.fail_count, 0);
        assert_eq!(node.skip_until, None);
        assert!(node.is_available(now));
    }

    #[test]
    fn test_availability_window() {
        let now = Instant::now();
        let mut node = Node::new("http://localhost:8545".into(), true);
        assert!(node.is_available(now));

        node.record_failure(now);
        assert!(!node.is_available(now + Duration::from_secs(4)));
        assert!(node.is_available(now + Duration::from_secs(6)));
    }

    #[test]
    fn test_cursor_rotation() {
        let mut pool = NodePool::new(
            vec!["http://a".into(), "http://b".into()],
            vec!["http://c".into()],
        );

        pool.advance_cursor(true);
        assert_eq!(pool.main_cursor, 1);
        pool.advance_cursor(true);
        assert_eq!(pool.main_cursor, 0);

        pool.advance_cursor(false);
        assert_eq!(pool.fallback_cursor, 0);
    }
}
