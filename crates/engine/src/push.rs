// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batched mutation: one idempotent transaction touching the event log,
//! memory store, artifacts, and the task graph together.

use chrono::Utc;
use serde_json::json;
use vybe_core::{event, ArtifactId, BlockedReason, MemoryScope, StoreError, StoreResult, TaskStatus, ValueType};
use vybe_storage::Store;

use crate::{memory_store, task_graph};

#[derive(Debug, Clone)]
pub struct MemoryInput {
    pub scope: MemoryScope,
    pub scope_id: String,
    pub key: String,
    pub value: String,
    pub value_type: ValueType,
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct ArtifactInput {
    pub file_path: String,
    pub content_type: String,
}

#[derive(Debug, Clone)]
pub struct TaskStatusInput {
    pub status: TaskStatus,
    pub blocked_reason: Option<BlockedReason>,
}

#[derive(Debug, Clone, Default)]
pub struct PushInput {
    pub task_id: Option<String>,
    pub event: Option<(String, String, serde_json::Value)>, // (kind, message, metadata)
    pub memories: Vec<MemoryInput>,
    pub artifacts: Vec<ArtifactInput>,
    pub task_status: Option<TaskStatusInput>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PushResult {
    pub event_id: Option<u64>,
    pub memory_ids: Vec<vybe_core::MemoryId>,
    pub artifact_ids: Vec<ArtifactId>,
    pub task_version: Option<u64>,
}

fn validate(input: &PushInput) -> StoreResult<()> {
    if input.event.is_none() && input.memories.is_empty() && input.artifacts.is_empty() && input.task_status.is_none() {
        return Err(StoreError::invalid("push", "at least one sub-operation must be present"));
    }
    if (!input.artifacts.is_empty() || input.task_status.is_some()) && input.task_id.is_none() {
        return Err(StoreError::invalid("task_id", "artifacts and task_status require a task_id"));
    }
    for memory in &input.memories {
        memory
            .value_type
            .validate(&memory.value)
            .map_err(|msg| StoreError::invalid("value", msg))?;
    }
    Ok(())
}

pub fn push(store: &Store, agent: &str, request_id: &str, input: PushInput) -> StoreResult<PushResult> {
    validate(&input)?;
    let now = Utc::now();

    store.run_idempotent(agent, request_id, "push", now, |ctx| {
        let mut result = PushResult::default();

        let event_id = input.event.as_ref().map(|(kind, message, metadata)| {
            let id = ctx.alloc_event_id();
            ctx.stage(vybe_core::Op::InsertEvent {
                id,
                kind: kind.clone(),
                agent_name: agent.to_string(),
                project_id: None,
                task_id: input.task_id.clone().map(Into::into),
                message: message.clone(),
                metadata: metadata.clone(),
                created_at: now,
            });
            id
        });
        result.event_id = event_id;

        for memory in &input.memories {
            let canonical = vybe_core::canonicalize_key(&memory.key)
                .ok_or_else(|| StoreError::invalid("key", "canonical key must not be empty"))?;
            let outcome = memory_store::apply_upsert(
                ctx,
                agent,
                memory.scope,
                &memory.scope_id,
                &memory.key,
                &canonical,
                &memory.value,
                memory.value_type,
                memory.confidence,
                None,
                event_id,
                now,
            )?;
            result.memory_ids.push(outcome.memory_id);
        }

        if !input.artifacts.is_empty() {
            let task_id = input
                .task_id
                .clone()
                .ok_or_else(|| StoreError::invalid("task_id", "artifacts and task_status require a task_id"))?;
            for artifact in &input.artifacts {
                let id = ArtifactId::new(vybe_core::ids::generate("artifact"));
                let artifact_event_id = ctx.alloc_event_id();
                ctx.stage(vybe_core::Op::InsertEvent {
                    id: artifact_event_id,
                    kind: event::kind::ARTIFACT_ADDED.to_string(),
                    agent_name: agent.to_string(),
                    project_id: None,
                    task_id: Some(task_id.clone().into()),
                    message: format!("added artifact {}", artifact.file_path),
                    metadata: json!({"content_type": artifact.content_type}),
                    created_at: now,
                });
                ctx.stage(vybe_core::Op::InsertArtifact {
                    id: id.clone(),
                    task_id: task_id.clone().into(),
                    event_id: artifact_event_id,
                    file_path: artifact.file_path.clone(),
                    content_type: artifact.content_type.clone(),
                    created_at: now,
                });
                result.artifact_ids.push(id);
            }
        }

        if let Some(status_input) = &input.task_status {
            let task_id = input
                .task_id
                .clone()
                .ok_or_else(|| StoreError::invalid("task_id", "artifacts and task_status require a task_id"))?;
            let updated = task_graph::apply_status_change(
                ctx,
                agent,
                &task_id,
                status_input.status,
                status_input.blocked_reason.clone(),
                now,
            )?;
            result.task_version = Some(updated.version);
        }

        Ok(result)
    })
}
