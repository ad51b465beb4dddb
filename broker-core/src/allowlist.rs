//! Per-execution frozen allow-list and call tracker.
//!
//! An allow-list is fixed at the start of a sandboxed execution and never
//! mutated afterward; the tracker records every call made against it in
//! arrival order plus a per-tool rollup, a small struct mutated under one
//! lock with accessor methods returning owned snapshots rather than
//! leaking the lock.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use broker_common::ToolId;

/// Immutable set of tool ids a single execution may call. Built once per
/// execution and never modified afterward.
#[derive(Debug, Clone)]
pub struct AllowList {
    allowed: std::collections::HashSet<ToolId>,
}

impl AllowList {
    pub fn new(allowed: impl IntoIterator<Item = ToolId>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    pub fn is_allowed(&self, tool_id: &ToolId) -> bool {
        self.allowed.contains(tool_id)
    }

    /// Throwing form of [`Self::is_allowed`]: returns `Error::NotAllowlisted`
    /// with the exact message callers must surface to a sandboxed caller.
    pub fn validate(&self, tool_id: &ToolId) -> crate::error::Result<()> {
        if self.is_allowed(tool_id) {
            Ok(())
        } else {
            Err(crate::error::Error::NotAllowlisted(tool_id.to_string()))
        }
    }

    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}

/// One recorded invocation, in the order it occurred.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub tool_id: ToolId,
    pub success: bool,
    pub duration: Duration,
    pub error_message: Option<String>,
    pub timestamp_ms: u64,
}

/// Aggregate stats for a single tool across an execution.
#[derive(Debug, Clone, Default)]
pub struct ToolSummary {
    pub call_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub total_duration: Duration,
    pub last_duration: Duration,
    pub last_status: bool,
    pub last_error: Option<String>,
    pub last_called_at: u64,
}

struct Inner {
    calls: Vec<CallRecord>,
    per_tool: HashMap<ToolId, ToolSummary>,
}

/// Records every call made during an execution, preserving arrival order
/// and maintaining a per-tool rollup alongside it.
pub struct CallTracker {
    inner: Mutex<Inner>,
}

impl CallTracker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                calls: Vec::new(),
                per_tool: HashMap::new(),
            }),
        }
    }

    pub fn record(
        &self,
        tool_id: ToolId,
        success: bool,
        duration: Duration,
        error_message: Option<String>,
        timestamp_ms: u64,
    ) {
        let mut inner = self.inner.lock().expect("call tracker mutex poisoned");
        let summary = inner.per_tool.entry(tool_id.clone()).or_default();
        summary.call_count += 1;
        summary.total_duration += duration;
        if success {
            summary.success_count += 1;
        } else {
            summary.error_count += 1;
        }
        summary.last_duration = duration;
        summary.last_status = success;
        summary.last_error = error_message.clone();
        summary.last_called_at = timestamp_ms;
        inner.calls.push(CallRecord {
            tool_id,
            success,
            duration,
            error_message,
            timestamp_ms,
        });
    }

    /// All calls in the order they were made.
    pub fn calls(&self) -> Vec<CallRecord> {
        self.inner.lock().expect("call tracker mutex poisoned").calls.clone()
    }

    /// Distinct tools that were called at least once, in first-call order.
    pub fn unique_calls(&self) -> Vec<ToolId> {
        let inner = self.inner.lock().expect("call tracker mutex poisoned");
        let mut seen = std::collections::HashSet::new();
        let mut ordered = Vec::new();
        for record in &inner.calls {
            if seen.insert(record.tool_id.clone()) {
                ordered.push(record.tool_id.clone());
            }
        }
        ordered
    }

    /// Per-tool aggregate view, keyed by tool id.
    pub fn summary(&self) -> HashMap<ToolId, ToolSummary> {
        self.inner.lock().expect("call tracker mutex poisoned").per_tool.clone()
    }

    pub fn total_calls(&self) -> u64 {
        self.inner.lock().expect("call tracker mutex poisoned").calls.len() as u64
    }
}

impl Default for CallTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(server: &str, tool: &str) -> ToolId {
        ToolId::new(server, tool)
    }

    #[test]
    fn allow_list_rejects_tools_outside_the_set() {
        let list = AllowList::new(vec![id("zen", "codereview")]);
        assert!(list.is_allowed(&id("zen", "codereview")));
        assert!(!list.is_allowed(&id("zen", "chat")));
        assert!(list.validate(&id("zen", "codereview")).is_ok());
    }

    #[test]
    fn validate_reports_the_exact_error_message() {
        let list = AllowList::new(vec![id("zen", "codereview")]);
        let err = list.validate(&id("zen", "chat")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Tool 'mcp__zen__chat' not in allowlist. Add 'mcp__zen__chat' to allowedTools array."
        );
    }

    #[test]
    fn empty_allow_list_rejects_everything() {
        let list = AllowList::new(Vec::new());
        assert!(!list.is_allowed(&id("zen", "codereview")));
        assert!(list.is_empty());
    }

    #[test]
    fn tracker_preserves_arrival_order() {
        let tracker = CallTracker::new();
        tracker.record(id("zen", "a"), true, Duration::from_millis(1), None, 1_000);
        tracker.record(id("zen", "b"), true, Duration::from_millis(2), None, 1_001);
        tracker.record(
            id("zen", "a"),
            false,
            Duration::from_millis(3),
            Some("upstream timeout".to_string()),
            1_002,
        );

        let calls = tracker.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].tool_id, id("zen", "a"));
        assert_eq!(calls[1].tool_id, id("zen", "b"));
        assert_eq!(calls[2].tool_id, id("zen", "a"));
        assert_eq!(calls[2].error_message.as_deref(), Some("upstream timeout"));
        assert_eq!(calls[2].timestamp_ms, 1_002);
    }

    #[test]
    fn unique_calls_preserves_first_occurrence_order() {
        let tracker = CallTracker::new();
        tracker.record(id("zen", "b"), true, Duration::from_millis(1), None, 1);
        tracker.record(id("zen", "a"), true, Duration::from_millis(1), None, 2);
        tracker.record(id("zen", "b"), true, Duration::from_millis(1), None, 3);

        assert_eq!(tracker.unique_calls(), vec![id("zen", "b"), id("zen", "a")]);
    }

    #[test]
    fn summary_counts_are_internally_consistent() {
        let tracker = CallTracker::new();
        tracker.record(id("zen", "a"), true, Duration::from_millis(5), None, 10);
        tracker.record(
            id("zen", "a"),
            false,
            Duration::from_millis(7),
            Some("boom".to_string()),
            20,
        );
        tracker.record(id("zen", "b"), true, Duration::from_millis(5), None, 30);

        let summary = tracker.summary();
        let total_calls: u64 = summary.values().map(|s| s.call_count).sum();
        assert_eq!(total_calls, tracker.total_calls());

        for stats in summary.values() {
            assert_eq!(stats.success_count + stats.error_count, stats.call_count);
        }

        let tool_a = &summary[&id("zen", "a")];
        assert!(!tool_a.last_status);
        assert_eq!(tool_a.last_error.as_deref(), Some("boom"));
        assert_eq!(tool_a.last_called_at, 20);
        assert_eq!(tool_a.last_duration, Duration::from_millis(7));
    }
}
