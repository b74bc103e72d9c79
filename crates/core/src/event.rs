// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The append-only event log row.
//!
//! `Event` is the one piece of ground truth external callers see; every
//! other table is derived from (or merely references) the event stream.

use crate::ids::{ProjectId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single row of the append-only event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub kind: String,
    pub agent_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    pub message: String,
    #[serde(default = "default_metadata")]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub archived: bool,
}

fn default_metadata() -> Value {
    Value::Object(Default::default())
}

/// System-emitted event kinds. Agent-emitted kinds may be any string of at
/// most [`MAX_KIND_LEN`] characters; these constants exist so the engine
/// never typos one of its own labels.
pub mod kind {
    pub const TASK_CREATED: &str = "task_created";
    pub const TASK_STATUS: &str = "task_status";
    pub const TASK_DELETED: &str = "task_deleted";
    pub const TASK_DEPENDENCY_ADDED: &str = "task_dependency_added";
    pub const TASK_DEPENDENCY_REMOVED: &str = "task_dependency_removed";
    pub const TASK_CLOSED: &str = "task_closed";
    pub const TASK_PRIORITY_CHANGED: &str = "task_priority_changed";
    pub const TASK_HEARTBEAT: &str = "task_heartbeat";
    pub const TASK_CLAIMED: &str = "task_claimed";
    pub const PROJECT_CREATED: &str = "project_created";
    pub const PROJECT_DELETED: &str = "project_deleted";
    pub const ARTIFACT_ADDED: &str = "artifact_added";
    pub const AGENT_FOCUS: &str = "agent_focus";
    pub const AGENT_PROJECT_FOCUS: &str = "agent_project_focus";
    pub const MEMORY_UPSERTED: &str = "memory_upserted";
    pub const MEMORY_REINFORCED: &str = "memory_reinforced";
    pub const MEMORY_TOUCHED: &str = "memory_touched";
    pub const MEMORY_COMPACTED: &str = "memory_compacted";
    pub const MEMORY_DELETE: &str = "memory_delete";
    pub const MEMORY_GC: &str = "memory_gc";
    pub const EVENTS_SUMMARY: &str = "events_summary";
    pub const RUN_COMPLETED: &str = "run_completed";
    pub const CHECKPOINT: &str = "checkpoint";
    pub const RETRO_ENQUEUED: &str = "retro_enqueued";
    pub const RETRO_COMPLETED: &str = "retro_completed";
}

pub const MAX_KIND_LEN: usize = 128;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_defaults_to_empty_object() {
        let json = r#"{"id":1,"kind":"task_created","agent_name":"a","message":"m","created_at":"2026-01-01T00:00:00Z"}"#;
        let ev: Event = serde_json::from_str(json).unwrap();
        assert_eq!(ev.metadata, Value::Object(Default::default()));
        assert!(!ev.archived);
    }
}
