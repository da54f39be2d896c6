//! Audit log of intercepted (simulated) tool calls.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::{ExecutionContext, RunState};

/// One call that the simulation stages kept from executing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterceptedOperation {
    pub run_id: String,
    pub tool: String,
    pub input: Vec<u8>,
    pub state: RunState,
    pub timestamp: DateTime<Utc>,
    /// Why the call was blocked.
    pub reason: String,
    /// Whether a configured mock result was returned.
    pub mocked: bool,
}

impl InterceptedOperation {
    pub fn from_exec(exec: &ExecutionContext, reason: impl Into<String>, mocked: bool) -> Self {
        Self {
            run_id: exec.run_id().to_string(),
            tool: exec.tool_name().to_string(),
            input: exec.input.clone(),
            state: exec.current_state,
            timestamp: Utc::now(),
            reason: reason.into(),
            mocked,
        }
    }
}

/// Sink for intercepted operations.
pub trait Recorder: Send + Sync {
    fn record(&self, op: InterceptedOperation);
}

/// Aggregate counts over a recorder's log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecorderSummary {
    pub total: usize,
    pub by_tool: BTreeMap<String, usize>,
    pub by_state: BTreeMap<RunState, usize>,
    pub mocked: usize,
}

/// In-memory, append-only recorder.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    ops: Mutex<Vec<InterceptedOperation>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<InterceptedOperation>> {
        self.ops.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every recorded operation, oldest first.
    pub fn operations(&self) -> Vec<InterceptedOperation> {
        self.lock().clone()
    }

    /// Operations recorded for one run, oldest first.
    pub fn operations_for_run(&self, run_id: &str) -> Vec<InterceptedOperation> {
        self.lock()
            .iter()
            .filter(|op| op.run_id == run_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn summary(&self) -> RecorderSummary {
        let ops = self.lock();
        let mut summary = RecorderSummary {
            total: ops.len(),
            ..RecorderSummary::default()
        };
        for op in ops.iter() {
            *summary.by_tool.entry(op.tool.clone()).or_default() += 1;
            *summary.by_state.entry(op.state).or_default() += 1;
            if op.mocked {
                summary.mocked += 1;
            }
        }
        summary
    }
}

impl Recorder for MemoryRecorder {
    fn record(&self, op: InterceptedOperation) {
        self.lock().push(op);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(run: &str, tool: &str, state: RunState, mocked: bool) -> InterceptedOperation {
        InterceptedOperation {
            run_id: run.into(),
            tool: tool.into(),
            input: b"{}".to_vec(),
            state,
            timestamp: Utc::now(),
            reason: "destructive".into(),
            mocked,
        }
    }

    #[test]
    fn test_summary_counts() {
        let recorder = MemoryRecorder::new();
        recorder.record(op("r1", "delete", RunState::Act, false));
        recorder.record(op("r1", "delete", RunState::Act, true));
        recorder.record(op("r2", "deploy", RunState::Validate, false));

        let summary = recorder.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.by_tool["delete"], 2);
        assert_eq!(summary.by_tool["deploy"], 1);
        assert_eq!(summary.by_state[&RunState::Act], 2);
        assert_eq!(summary.mocked, 1);
    }

    #[test]
    fn test_log_preserves_order_and_filters_by_run() {
        let recorder = MemoryRecorder::new();
        recorder.record(op("r1", "a", RunState::Act, false));
        recorder.record(op("r2", "b", RunState::Act, false));
        recorder.record(op("r1", "c", RunState::Act, false));

        let tools: Vec<String> = recorder
            .operations_for_run("r1")
            .into_iter()
            .map(|op| op.tool)
            .collect();
        assert_eq!(tools, vec!["a", "c"]);
        assert_eq!(recorder.operations()[1].tool, "b");

        recorder.clear();
        assert!(recorder.is_empty());
    }
}
