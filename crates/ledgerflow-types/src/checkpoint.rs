//! Checkpoint records and thread status.
//!
//! A thread is one execution of a workflow graph. Its history is an
//! append-only sequence of [`Checkpoint`]s with consecutive step numbers
//! starting at 0. The latest checkpoint is the thread's current state.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sentinel target meaning "the thread is finished".
pub const END: &str = "__end__";

/// Sentinel source used to declare the graph's start node.
pub const START: &str = "__start__";

// ---------------------------------------------------------------------------
// ThreadStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a thread, recorded on every checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreadStatus {
    Running,
    Paused,
    Completed,
    Failed,
}

impl ThreadStatus {
    /// Completed and failed threads never run again.
    pub fn is_terminal(self) -> bool {
        matches!(self, ThreadStatus::Completed | ThreadStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ThreadStatus::Running => "RUNNING",
            ThreadStatus::Paused => "PAUSED",
            ThreadStatus::Completed => "COMPLETED",
            ThreadStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThreadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "RUNNING" => Ok(ThreadStatus::Running),
            "PAUSED" => Ok(ThreadStatus::Paused),
            "COMPLETED" => Ok(ThreadStatus::Completed),
            "FAILED" => Ok(ThreadStatus::Failed),
            other => Err(format!("invalid thread status: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

/// One durable record of a thread's state after a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    /// Consecutive per thread, starting at 0 for the seed record.
    pub step: u64,
    /// Node that produced this step. `None` for the seed record.
    pub node: Option<String>,
    /// Partial update returned by `node`, as JSON.
    pub output: Option<Value>,
    /// Full merged workflow state after this step.
    pub snapshot: Value,
    /// Node to run next, or [`END`].
    pub next_node: String,
    pub status: ThreadStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Build the step-0 record for a freshly submitted thread.
    pub fn seed(thread_id: &str, snapshot: Value, next_node: &str, status: ThreadStatus) -> Self {
        Self {
            thread_id: thread_id.to_string(),
            step: 0,
            node: None,
            output: None,
            snapshot,
            next_node: next_node.to_string(),
            status,
            error: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.next_node == END
    }
}

/// Latest-state view of a thread, used for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub thread_id: String,
    pub status: ThreadStatus,
    pub step: u64,
    pub next_node: String,
    pub updated_at: DateTime<Utc>,
}

impl From<&Checkpoint> for ThreadSummary {
    fn from(cp: &Checkpoint) -> Self {
        Self {
            thread_id: cp.thread_id.clone(),
            status: cp.status,
            step: cp.step,
            next_node: cp.next_node.clone(),
            updated_at: cp.created_at,
        }
    }
}

/// One line of a thread's audit trail, derived from a checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub step: u64,
    pub node: Option<String>,
    pub output: Option<Value>,
    pub status: ThreadStatus,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<&Checkpoint> for AuditEntry {
    fn from(cp: &Checkpoint) -> Self {
        Self {
            step: cp.step,
            node: cp.node.clone(),
            output: cp.output.clone(),
            status: cp.status,
            error: cp.error.clone(),
            timestamp: cp.created_at,
        }
    }
}

/// Full audit trail of one thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditTrail {
    pub thread_id: String,
    pub status: ThreadStatus,
    pub next_node: String,
    pub steps: Vec<AuditEntry>,
}

/// Merge a JSON object patch into a snapshot.
///
/// Keys with non-null values overwrite; nulls are ignored. A non-object
/// target is replaced by an empty object first.
pub fn merge_snapshot_fields(target: &mut Value, patch: &Value) {
    let Some(patch) = patch.as_object() else {
        return;
    };
    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    if let Some(obj) = target.as_object_mut() {
        for (key, value) in patch {
            if !value.is_null() {
                obj.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_roundtrip_and_terminal() {
        for s in ["RUNNING", "PAUSED", "COMPLETED", "FAILED"] {
            let status: ThreadStatus = s.parse().unwrap();
            assert_eq!(status.to_string(), s);
        }
        assert!("paused".parse::<ThreadStatus>().is_ok());
        assert!("bogus".parse::<ThreadStatus>().is_err());
        assert!(ThreadStatus::Completed.is_terminal());
        assert!(ThreadStatus::Failed.is_terminal());
        assert!(!ThreadStatus::Paused.is_terminal());
    }

    #[test]
    fn test_status_serde_uses_upper_case() {
        let json = serde_json::to_string(&ThreadStatus::Paused).unwrap();
        assert_eq!(json, "\"PAUSED\"");
    }

    #[test]
    fn test_merge_snapshot_fields_ignores_nulls() {
        let mut snapshot = json!({"a": 1, "b": "keep"});
        merge_snapshot_fields(&mut snapshot, &json!({"a": 2, "b": null, "c": true}));
        assert_eq!(snapshot, json!({"a": 2, "b": "keep", "c": true}));
    }

    #[test]
    fn test_merge_snapshot_fields_non_object_patch_is_noop() {
        let mut snapshot = json!({"a": 1});
        merge_snapshot_fields(&mut snapshot, &json!([1, 2]));
        assert_eq!(snapshot, json!({"a": 1}));
    }

    #[test]
    fn test_seed_checkpoint() {
        let cp = Checkpoint::seed("t-1", json!({}), "intake", ThreadStatus::Running);
        assert_eq!(cp.step, 0);
        assert!(cp.node.is_none());
        assert!(!cp.is_finished());
        let audit = AuditEntry::from(&cp);
        assert_eq!(audit.step, 0);
    }
}
