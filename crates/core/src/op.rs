// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The internal write-ahead-log payload.
//!
//! `Op` is never exposed to callers of the engine: every public mutation
//! validates against a read of the current materialized state and then
//! builds the minimal ordered list of `Op`s that realizes it (including
//! the one [`crate::event::Event`] insert the mutation is required to
//! produce). Each variant's replay must be idempotent — re-applying the
//! same `Op` twice must leave the same state as applying it once, so that
//! crash recovery (which replays every op after the last checkpoint) can
//! never double-apply a half-committed mutation.
//!
//! Serializes with `{"op": "name", ...fields}`, mirroring the tagged-enum
//! wire format used for the public event vocabulary.

use crate::ids::{ArtifactId, MemoryId, ProjectId, RetroJobId, TaskId};
use crate::memory::{MemoryScope, ValueType};
use crate::task::{BlockedReason, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Op {
    #[serde(rename = "insert_event")]
    InsertEvent {
        id: u64,
        kind: String,
        agent_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        project_id: Option<ProjectId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_id: Option<TaskId>,
        message: String,
        #[serde(default)]
        metadata: Value,
        created_at: DateTime<Utc>,
    },

    #[serde(rename = "archive_events")]
    ArchiveEvents { from_id: u64, to_id: u64 },

    #[serde(rename = "create_task")]
    CreateTask {
        id: TaskId,
        title: String,
        description: String,
        priority: i32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        project_id: Option<ProjectId>,
        created_at: DateTime<Utc>,
    },

    #[serde(rename = "set_task_status")]
    SetTaskStatus {
        task_id: TaskId,
        status: TaskStatus,
        #[serde(default)]
        blocked_reason: BlockedReason,
        new_version: u64,
        updated_at: DateTime<Utc>,
        release_claim: bool,
    },

    #[serde(rename = "claim_task")]
    ClaimTask {
        task_id: TaskId,
        agent_name: String,
        claimed_at: DateTime<Utc>,
        claim_expires_at: DateTime<Utc>,
        new_version: u64,
    },

    #[serde(rename = "heartbeat_task")]
    HeartbeatTask {
        task_id: TaskId,
        claim_expires_at: DateTime<Utc>,
        last_heartbeat_at: DateTime<Utc>,
        new_version: u64,
    },

    #[serde(rename = "release_claim")]
    ReleaseClaim {
        task_id: TaskId,
        new_version: u64,
        updated_at: DateTime<Utc>,
    },

    #[serde(rename = "set_task_priority")]
    SetTaskPriority {
        task_id: TaskId,
        priority: i32,
        new_version: u64,
    },

    #[serde(rename = "add_dependency")]
    AddDependency {
        task_id: TaskId,
        depends_on: TaskId,
        new_version: u64,
    },

    #[serde(rename = "remove_dependency")]
    RemoveDependency {
        task_id: TaskId,
        depends_on: TaskId,
        new_version: u64,
    },

    #[serde(rename = "unblock_task")]
    UnblockTask {
        task_id: TaskId,
        new_version: u64,
        updated_at: DateTime<Utc>,
    },

    #[serde(rename = "create_project")]
    CreateProject {
        id: ProjectId,
        name: String,
        #[serde(default)]
        metadata: Value,
        created_at: DateTime<Utc>,
    },

    #[serde(rename = "delete_project")]
    DeleteProject { id: ProjectId },

    #[serde(rename = "insert_memory")]
    InsertMemory {
        id: MemoryId,
        key: String,
        canonical_key: String,
        value: String,
        value_type: ValueType,
        scope: MemoryScope,
        scope_id: String,
        confidence: f32,
        last_seen_at: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_event_id: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expires_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
    },

    #[serde(rename = "reinforce_memory")]
    ReinforceMemory {
        id: MemoryId,
        confidence: f32,
        last_seen_at: DateTime<Utc>,
    },

    #[serde(rename = "overwrite_memory")]
    OverwriteMemory {
        id: MemoryId,
        value: String,
        value_type: ValueType,
        confidence: f32,
        last_seen_at: DateTime<Utc>,
    },

    #[serde(rename = "touch_memory")]
    TouchMemory {
        id: MemoryId,
        confidence: f32,
        last_seen_at: DateTime<Utc>,
    },

    #[serde(rename = "delete_memory")]
    DeleteMemory { id: MemoryId },

    #[serde(rename = "supersede_memories")]
    SupersedeMemories {
        ids: Vec<MemoryId>,
        summary_id: MemoryId,
    },

    #[serde(rename = "gc_memories")]
    GcMemories { ids: Vec<MemoryId> },

    #[serde(rename = "insert_artifact")]
    InsertArtifact {
        id: ArtifactId,
        task_id: TaskId,
        event_id: u64,
        file_path: String,
        content_type: String,
        created_at: DateTime<Utc>,
    },

    #[serde(rename = "upsert_agent_state")]
    UpsertAgentState {
        agent_name: String,
        last_seen_event_id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        focus_task_id: Option<TaskId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        focus_project_id: Option<ProjectId>,
        new_version: u64,
        last_active_at: DateTime<Utc>,
    },

    #[serde(rename = "begin_idempotency")]
    BeginIdempotency {
        agent_name: String,
        request_id: String,
        command: String,
        created_at: DateTime<Utc>,
    },

    #[serde(rename = "complete_idempotency")]
    CompleteIdempotency {
        agent_name: String,
        request_id: String,
        result: Value,
        completed_at: DateTime<Utc>,
    },

    #[serde(rename = "enqueue_retro_job")]
    EnqueueRetroJob {
        id: RetroJobId,
        agent_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        project_id: Option<ProjectId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        since_event_id: u64,
        until_event_id: u64,
        max_attempts: u32,
        created_at: DateTime<Utc>,
    },

    #[serde(rename = "claim_retro_job")]
    ClaimRetroJob {
        id: RetroJobId,
        claimed_by: String,
        claim_expires_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    },

    #[serde(rename = "retro_job_succeeded")]
    RetroJobSucceeded { id: RetroJobId, completed_at: DateTime<Utc> },

    #[serde(rename = "retro_job_retry")]
    RetroJobRetry {
        id: RetroJobId,
        next_run_at: DateTime<Utc>,
        last_error: String,
        updated_at: DateTime<Utc>,
    },

    #[serde(rename = "retro_job_dead")]
    RetroJobDead {
        id: RetroJobId,
        last_error: String,
        updated_at: DateTime<Utc>,
    },

    #[serde(rename = "prune_archived_events")]
    PruneArchivedEvents { ids: Vec<u64> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_round_trips_through_json() {
        let op = Op::SetTaskPriority {
            task_id: TaskId::new("task_1"),
            priority: 5,
            new_version: 2,
        };
        let json = serde_json::to_string(&op).unwrap();
        assert!(json.contains("\"op\":\"set_task_priority\""));
        let back: Op = serde_json::from_str(&json).unwrap();
        assert_eq!(op, back);
    }
}
