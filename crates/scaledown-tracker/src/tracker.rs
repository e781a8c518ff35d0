//! NodeDeletionTracker — in-progress deletions and terminal results.
//!
//! Callers mark a node with `start_deletion` before handing it to the
//! scheduler; whoever learns the outcome (the scheduler on abort, the
//! batcher after the cloud call) closes it with `end_deletion`. Results
//! overwrite earlier ones for the same node.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use scaledown_core::{NodeDeleteResult, NodeName};

struct RecordedResult {
    result: NodeDeleteResult,
    recorded_at: u64,
}

#[derive(Default)]
struct TrackerState {
    /// group_id → number of deletions in flight.
    deletions_per_group: HashMap<String, usize>,
    empty_deletions: HashSet<NodeName>,
    drained_deletions: HashSet<NodeName>,
    results: HashMap<NodeName, RecordedResult>,
    /// Total `end_deletion` calls, including overwrites.
    records_written: u64,
}

/// Thread-safe deletion tracker.
#[derive(Clone, Default)]
pub struct NodeDeletionTracker {
    inner: Arc<Mutex<TrackerState>>,
}

impl NodeDeletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark an empty-node deletion as in progress.
    ///
    /// A node that is already in progress is counted once.
    pub fn start_deletion(&self, group_id: &str, node: &str) {
        if self.start(group_id, node, false) {
            debug!(group = %group_id, %node, "deletion started");
        }
    }

    /// Mark a deletion that involves draining the node as in progress.
    pub fn start_deletion_with_drain(&self, group_id: &str, node: &str) {
        if self.start(group_id, node, true) {
            debug!(group = %group_id, %node, "deletion with drain started");
        }
    }

    fn start(&self, group_id: &str, node: &str, drain: bool) -> bool {
        let mut state = self.lock();
        if state.empty_deletions.contains(node) || state.drained_deletions.contains(node) {
            drop(state);
            warn!(group = %group_id, %node, "deletion already in progress");
            return false;
        }
        if drain {
            state.drained_deletions.insert(node.to_string());
        } else {
            state.empty_deletions.insert(node.to_string());
        }
        *state.deletions_per_group.entry(group_id.to_string()).or_default() += 1;
        true
    }

    /// Close a deletion and record its result.
    ///
    /// Safe to call for nodes that were never started.
    pub fn end_deletion(&self, group_id: &str, node: &str, result: NodeDeleteResult) {
        let mut state = self.lock();
        let was_tracked =
            state.empty_deletions.remove(node) | state.drained_deletions.remove(node);
        if was_tracked
            && let Some(count) = state.deletions_per_group.get_mut(group_id)
        {
            *count = count.saturating_sub(1);
            if *count == 0 {
                state.deletions_per_group.remove(group_id);
            }
        }

        let previous = state.results.insert(
            node.to_string(),
            RecordedResult {
                result: result.clone(),
                recorded_at: epoch_secs(),
            },
        );
        state.records_written += 1;
        drop(state);

        if previous.is_some() {
            warn!(group = %group_id, %node, result = ?result.result_type, "deletion result overwritten");
        } else {
            debug!(group = %group_id, %node, result = ?result.result_type, "deletion ended");
        }
    }

    /// All recorded results, and how many there are.
    pub fn deletion_results(&self) -> (HashMap<NodeName, NodeDeleteResult>, usize) {
        let state = self.lock();
        let results: HashMap<_, _> = state
            .results
            .iter()
            .map(|(node, recorded)| (node.clone(), recorded.result.clone()))
            .collect();
        let count = results.len();
        (results, count)
    }

    /// Nodes currently being deleted: (empty, drained), each sorted.
    pub fn deletions_in_progress(&self) -> (Vec<NodeName>, Vec<NodeName>) {
        let state = self.lock();
        let mut empty: Vec<_> = state.empty_deletions.iter().cloned().collect();
        let mut drained: Vec<_> = state.drained_deletions.iter().cloned().collect();
        empty.sort();
        drained.sort();
        (empty, drained)
    }

    /// Number of deletions in flight for a node group.
    pub fn deletions_count(&self, group_id: &str) -> usize {
        self.lock()
            .deletions_per_group
            .get(group_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn is_being_deleted(&self, node: &str) -> bool {
        let state = self.lock();
        state.empty_deletions.contains(node) || state.drained_deletions.contains(node)
    }

    /// Total number of results written, counting overwrites.
    pub fn records_written(&self) -> u64 {
        self.lock().records_written
    }

    /// Drop results recorded at or before `epoch_secs`.
    pub fn clear_results_not_newer_than(&self, epoch_secs: u64) -> usize {
        let mut state = self.lock();
        let before = state.results.len();
        state.results.retain(|_, r| r.recorded_at > epoch_secs);
        let cleared = before - state.results.len();
        if cleared > 0 {
            debug!(cleared, "stale deletion results cleared");
        }
        cleared
    }
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scaledown_core::{DeletionError, NodeDeleteResultType};

    fn failure() -> NodeDeleteResult {
        NodeDeleteResult::failed(
            NodeDeleteResultType::ErrorFailedToDelete,
            DeletionError::Drain("pdb violated".to_string()),
        )
    }

    #[test]
    fn empty_tracker() {
        let tracker = NodeDeletionTracker::new();
        let (results, count) = tracker.deletion_results();
        assert!(results.is_empty());
        assert_eq!(count, 0);
        assert_eq!(tracker.deletions_in_progress(), (vec![], vec![]));
        assert_eq!(tracker.deletions_count("ng"), 0);
    }

    #[test]
    fn start_and_end_deletion() {
        let tracker = NodeDeletionTracker::new();
        tracker.start_deletion("ng", "n1");
        tracker.start_deletion_with_drain("ng", "n2");

        assert_eq!(tracker.deletions_count("ng"), 2);
        assert_eq!(
            tracker.deletions_in_progress(),
            (vec!["n1".to_string()], vec!["n2".to_string()])
        );
        assert!(tracker.is_being_deleted("n2"));

        tracker.end_deletion("ng", "n1", NodeDeleteResult::ok());
        tracker.end_deletion("ng", "n2", failure());

        assert_eq!(tracker.deletions_count("ng"), 0);
        assert!(!tracker.is_being_deleted("n2"));
        let (results, count) = tracker.deletion_results();
        assert_eq!(count, 2);
        assert!(results["n1"].is_ok());
        assert_eq!(results["n2"], failure());
    }

    #[test]
    fn repeated_start_counts_once() {
        let tracker = NodeDeletionTracker::new();
        tracker.start_deletion("ng", "n1");
        tracker.start_deletion("ng", "n1");
        tracker.start_deletion_with_drain("ng", "n1");
        assert_eq!(tracker.deletions_count("ng"), 1);
        assert_eq!(
            tracker.deletions_in_progress(),
            (vec!["n1".to_string()], vec![])
        );

        tracker.end_deletion("ng", "n1", NodeDeleteResult::ok());
        assert_eq!(tracker.deletions_count("ng"), 0);
        assert!(!tracker.is_being_deleted("n1"));
    }

    #[test]
    fn end_without_start_records_result() {
        let tracker = NodeDeletionTracker::new();
        tracker.start_deletion("ng", "n1");
        tracker.end_deletion("ng", "unknown", failure());

        // The in-flight deletion for n1 is untouched.
        assert_eq!(tracker.deletions_count("ng"), 1);
        let (results, _) = tracker.deletion_results();
        assert_eq!(results.len(), 1);
        assert!(results.contains_key("unknown"));
    }

    #[test]
    fn later_result_overwrites() {
        let tracker = NodeDeletionTracker::new();
        tracker.end_deletion("ng", "n1", failure());
        tracker.end_deletion("ng", "n1", NodeDeleteResult::ok());

        let (results, count) = tracker.deletion_results();
        assert_eq!(count, 1);
        assert!(results["n1"].is_ok());
        assert_eq!(tracker.records_written(), 2);
    }

    #[test]
    fn clear_results_by_age() {
        let tracker = NodeDeletionTracker::new();
        tracker.end_deletion("ng", "n1", NodeDeleteResult::ok());

        assert_eq!(tracker.clear_results_not_newer_than(0), 0);
        assert_eq!(tracker.clear_results_not_newer_than(u64::MAX), 1);
        assert_eq!(tracker.deletion_results().1, 0);
    }

    #[test]
    fn concurrent_recording() {
        let tracker = NodeDeletionTracker::new();
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let node = format!("n-{t}-{i}");
                        tracker.start_deletion("ng", &node);
                        tracker.end_deletion("ng", &node, NodeDeleteResult::ok());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(tracker.deletion_results().1, 400);
        assert_eq!(tracker.deletions_count("ng"), 0);
    }
}
