// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state derived from replaying the [`Op`] write-ahead log.
//!
//! `MaterializedState` holds every table of the public data model — events,
//! tasks, projects, memory, artifacts, agent state, idempotency records, and
//! retrospective jobs — in memory, behind the single [`crate::Store`] write
//! lock.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use vybe_core::{
    AgentState, Artifact, ArtifactId, BlockedReason, Event, IdempotencyRecord, IdempotencyStatus,
    Memory, MemoryId, MemoryScope, Op, Project, ProjectId, RetroJobStatus, RetroJobId,
    RetrospectiveJob, Task, TaskId, TaskStatus,
};

/// The complete, serializable in-memory state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterializedState {
    pub events: Vec<Event>,
    pub next_event_id: u64,
    pub tasks: HashMap<String, Task>,
    pub projects: HashMap<String, Project>,
    pub memories: HashMap<String, Memory>,
    pub artifacts: HashMap<String, Artifact>,
    pub agent_states: HashMap<String, AgentState>,
    pub idempotency: HashMap<(String, String), IdempotencyRecord>,
    pub retro_jobs: HashMap<String, RetrospectiveJob>,
}

impl MaterializedState {
    /// Get a task by id or unique prefix (like git commit hashes).
    pub fn get_task(&self, id: &str) -> Option<&Task> {
        if let Some(task) = self.tasks.get(id) {
            return Some(task);
        }
        let matches: Vec<_> = self.tasks.iter().filter(|(k, _)| k.starts_with(id)).collect();
        if matches.len() == 1 {
            Some(matches[0].1)
        } else {
            None
        }
    }

    /// Memory rows active (non-superseded) for a given scope tuple.
    pub fn active_memories_in_scope(
        &self,
        scope: MemoryScope,
        scope_id: &str,
    ) -> impl Iterator<Item = &Memory> {
        self.memories
            .values()
            .filter(move |m| m.scope == scope && m.scope_id == scope_id && m.is_active())
    }

    /// Find the active (non-superseded) memory row for a canonical key in scope.
    pub fn find_active_memory(
        &self,
        scope: MemoryScope,
        scope_id: &str,
        canonical_key: &str,
    ) -> Option<&Memory> {
        self.active_memories_in_scope(scope, scope_id)
            .find(|m| m.canonical_key == canonical_key)
    }

    /// Tasks whose only unresolved dependency is `task_id`.
    pub fn dependents_of(&self, task_id: &str) -> Vec<String> {
        self.tasks
            .values()
            .filter(|t| t.depends_on.iter().any(|d| d.as_str() == task_id))
            .map(|t| t.id.as_str().to_string())
            .collect()
    }

    /// True if `candidate` transitively depends on `task_id` (would create a cycle
    /// if `task_id` were made to depend on `candidate`).
    pub fn depends_on_transitively(&self, candidate: &str, task_id: &str) -> bool {
        let mut seen = BTreeSet::new();
        let mut stack = vec![candidate.to_string()];
        while let Some(current) = stack.pop() {
            if current == task_id {
                return true;
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(task) = self.tasks.get(&current) {
                for dep in &task.depends_on {
                    stack.push(dep.as_str().to_string());
                }
            }
        }
        false
    }

    /// Apply an op to derive a state change.
    ///
    /// # Idempotency requirement
    ///
    /// **Every arm must be idempotent.** Applying the same op twice must
    /// produce the same state as applying it once — crash recovery replays
    /// every op after the last checkpoint, and an op may already have been
    /// applied in-process before the crash. Guidelines:
    /// - guard inserts with existence checks,
    /// - use assignment rather than increment/append where the op carries
    ///   the new value already,
    /// - version/CAS fields are set directly from the op's `new_version`,
    ///   never incremented relative to current state.
    pub fn apply_op(&mut self, op: &Op) {
        match op {
            Op::InsertEvent {
                id,
                kind,
                agent_name,
                project_id,
                task_id,
                message,
                metadata,
                created_at,
            } => {
                if self.events.iter().any(|e| e.id == *id) {
                    return;
                }
                self.events.push(Event {
                    id: *id,
                    kind: kind.clone(),
                    agent_name: agent_name.clone(),
                    project_id: project_id.clone(),
                    task_id: task_id.clone(),
                    message: message.clone(),
                    metadata: metadata.clone(),
                    created_at: *created_at,
                    archived: false,
                });
                self.next_event_id = self.next_event_id.max(*id);
            }

            Op::ArchiveEvents { from_id, to_id } => {
                for event in self.events.iter_mut() {
                    if event.id >= *from_id && event.id <= *to_id {
                        event.archived = true;
                    }
                }
            }

            Op::PruneArchivedEvents { ids } => {
                let ids: std::collections::HashSet<u64> = ids.iter().copied().collect();
                self.events.retain(|e| !ids.contains(&e.id));
            }

            Op::CreateTask {
                id,
                title,
                description,
                priority,
                project_id,
                created_at,
            } => {
                if self.tasks.contains_key(id.as_str()) {
                    return;
                }
                self.tasks.insert(
                    id.as_str().to_string(),
                    Task {
                        id: id.clone(),
                        title: title.clone(),
                        description: description.clone(),
                        status: TaskStatus::Pending,
                        priority: *priority,
                        project_id: project_id.clone(),
                        blocked_reason: BlockedReason::None,
                        claimed_by: None,
                        claimed_at: None,
                        claim_expires_at: None,
                        last_heartbeat_at: None,
                        attempt: 0,
                        depends_on: Default::default(),
                        version: 1,
                        created_at: *created_at,
                        updated_at: *created_at,
                    },
                );
            }

            Op::SetTaskStatus {
                task_id,
                status,
                blocked_reason,
                new_version,
                updated_at,
                release_claim,
            } => {
                if let Some(task) = self.tasks.get_mut(task_id.as_str()) {
                    if task.version >= *new_version {
                        return;
                    }
                    task.status = *status;
                    task.blocked_reason = blocked_reason.clone();
                    task.version = *new_version;
                    task.updated_at = *updated_at;
                    if *release_claim {
                        task.release_claim();
                    }
                }
            }

            Op::ClaimTask {
                task_id,
                agent_name,
                claimed_at,
                claim_expires_at,
                new_version,
            } => {
                if let Some(task) = self.tasks.get_mut(task_id.as_str()) {
                    if task.version >= *new_version {
                        return;
                    }
                    task.status = TaskStatus::InProgress;
                    task.claimed_by = Some(agent_name.clone());
                    task.claimed_at = Some(*claimed_at);
                    task.claim_expires_at = Some(*claim_expires_at);
                    task.last_heartbeat_at = Some(*claimed_at);
                    task.attempt += 1;
                    task.version = *new_version;
                    task.updated_at = *claimed_at;
                }
            }

            Op::HeartbeatTask {
                task_id,
                claim_expires_at,
                last_heartbeat_at,
                new_version,
            } => {
                if let Some(task) = self.tasks.get_mut(task_id.as_str()) {
                    if task.version >= *new_version {
                        return;
                    }
                    task.claim_expires_at = Some(*claim_expires_at);
                    task.last_heartbeat_at = Some(*last_heartbeat_at);
                    task.version = *new_version;
                }
            }

            Op::ReleaseClaim {
                task_id,
                new_version,
                updated_at,
            } => {
                if let Some(task) = self.tasks.get_mut(task_id.as_str()) {
                    if task.version >= *new_version {
                        return;
                    }
                    task.release_claim();
                    task.version = *new_version;
                    task.updated_at = *updated_at;
                }
            }

            Op::SetTaskPriority {
                task_id,
                priority,
                new_version,
            } => {
                if let Some(task) = self.tasks.get_mut(task_id.as_str()) {
                    if task.version >= *new_version {
                        return;
                    }
                    task.priority = *priority;
                    task.version = *new_version;
                }
            }

            Op::AddDependency {
                task_id,
                depends_on,
                new_version,
            } => {
                if let Some(task) = self.tasks.get_mut(task_id.as_str()) {
                    if task.version >= *new_version {
                        return;
                    }
                    task.depends_on.insert(depends_on.clone());
                    task.version = *new_version;
                }
            }

            Op::RemoveDependency {
                task_id,
                depends_on,
                new_version,
            } => {
                if let Some(task) = self.tasks.get_mut(task_id.as_str()) {
                    if task.version >= *new_version {
                        return;
                    }
                    task.depends_on.remove(depends_on);
                    task.version = *new_version;
                }
            }

            Op::UnblockTask {
                task_id,
                new_version,
                updated_at,
            } => {
                if let Some(task) = self.tasks.get_mut(task_id.as_str()) {
                    if task.version >= *new_version || task.status != TaskStatus::Blocked {
                        return;
                    }
                    task.status = TaskStatus::Pending;
                    task.blocked_reason = BlockedReason::None;
                    task.version = *new_version;
                    task.updated_at = *updated_at;
                }
            }

            Op::CreateProject {
                id,
                name,
                metadata,
                created_at,
            } => {
                if self.projects.contains_key(id.as_str()) {
                    return;
                }
                self.projects.insert(
                    id.as_str().to_string(),
                    Project {
                        id: id.clone(),
                        name: name.clone(),
                        metadata: metadata.clone(),
                        created_at: *created_at,
                    },
                );
            }

            Op::DeleteProject { id } => {
                self.projects.remove(id.as_str());
            }

            Op::InsertMemory {
                id,
                key,
                canonical_key,
                value,
                value_type,
                scope,
                scope_id,
                confidence,
                last_seen_at,
                source_event_id,
                expires_at,
                created_at,
            } => {
                if self.memories.contains_key(id.as_str()) {
                    return;
                }
                self.memories.insert(
                    id.as_str().to_string(),
                    Memory {
                        id: id.clone(),
                        key: key.clone(),
                        canonical_key: canonical_key.clone(),
                        value: value.clone(),
                        value_type: *value_type,
                        scope: *scope,
                        scope_id: scope_id.clone(),
                        confidence: *confidence,
                        last_seen_at: *last_seen_at,
                        source_event_id: *source_event_id,
                        superseded_by: None,
                        expires_at: *expires_at,
                        created_at: *created_at,
                    },
                );
            }

            Op::ReinforceMemory {
                id,
                confidence,
                last_seen_at,
            } => {
                if let Some(mem) = self.memories.get_mut(id.as_str()) {
                    mem.confidence = *confidence;
                    mem.last_seen_at = *last_seen_at;
                }
            }

            Op::OverwriteMemory {
                id,
                value,
                value_type,
                confidence,
                last_seen_at,
            } => {
                if let Some(mem) = self.memories.get_mut(id.as_str()) {
                    mem.value = value.clone();
                    mem.value_type = *value_type;
                    mem.confidence = *confidence;
                    mem.last_seen_at = *last_seen_at;
                }
            }

            Op::TouchMemory {
                id,
                confidence,
                last_seen_at,
            } => {
                if let Some(mem) = self.memories.get_mut(id.as_str()) {
                    mem.confidence = *confidence;
                    mem.last_seen_at = *last_seen_at;
                }
            }

            Op::DeleteMemory { id } => {
                self.memories.remove(id.as_str());
            }

            Op::SupersedeMemories { ids, summary_id } => {
                for id in ids {
                    if let Some(mem) = self.memories.get_mut(id.as_str()) {
                        mem.superseded_by = Some(summary_id.clone());
                    }
                }
            }

            Op::GcMemories { ids } => {
                for id in ids {
                    self.memories.remove(id.as_str());
                }
            }

            Op::InsertArtifact {
                id,
                task_id,
                event_id,
                file_path,
                content_type,
                created_at,
            } => {
                if self.artifacts.contains_key(id.as_str()) {
                    return;
                }
                self.artifacts.insert(
                    id.as_str().to_string(),
                    Artifact {
                        id: id.clone(),
                        task_id: task_id.clone(),
                        event_id: *event_id,
                        file_path: file_path.clone(),
                        content_type: content_type.clone(),
                        created_at: *created_at,
                    },
                );
            }

            Op::UpsertAgentState {
                agent_name,
                last_seen_event_id,
                focus_task_id,
                focus_project_id,
                new_version,
                last_active_at,
            } => {
                let entry = self
                    .agent_states
                    .entry(agent_name.clone())
                    .or_insert_with(|| AgentState::new(agent_name.clone(), *last_active_at));
                if entry.version >= *new_version {
                    return;
                }
                entry.last_seen_event_id = *last_seen_event_id;
                entry.focus_task_id = focus_task_id.clone();
                entry.focus_project_id = focus_project_id.clone();
                entry.version = *new_version;
                entry.last_active_at = *last_active_at;
            }

            Op::BeginIdempotency {
                agent_name,
                request_id,
                command,
                created_at,
            } => {
                let key = (agent_name.clone(), request_id.clone());
                if self.idempotency.contains_key(&key) {
                    return;
                }
                self.idempotency.insert(
                    key,
                    IdempotencyRecord {
                        agent_name: agent_name.clone(),
                        request_id: request_id.clone(),
                        command: command.clone(),
                        status: IdempotencyStatus::InProgress,
                        result: serde_json::Value::Null,
                        created_at: *created_at,
                        completed_at: None,
                    },
                );
            }

            Op::CompleteIdempotency {
                agent_name,
                request_id,
                result,
                completed_at,
            } => {
                let key = (agent_name.clone(), request_id.clone());
                if let Some(record) = self.idempotency.get_mut(&key) {
                    record.status = IdempotencyStatus::Completed;
                    record.result = result.clone();
                    record.completed_at = Some(*completed_at);
                }
            }

            Op::EnqueueRetroJob {
                id,
                agent_name,
                project_id,
                session_id,
                since_event_id,
                until_event_id,
                max_attempts,
                created_at,
            } => {
                if self.retro_jobs.contains_key(id.as_str()) {
                    return;
                }
                self.retro_jobs.insert(
                    id.as_str().to_string(),
                    RetrospectiveJob {
                        id: id.clone(),
                        agent_name: agent_name.clone(),
                        project_id: project_id.clone(),
                        session_id: session_id.clone(),
                        since_event_id: *since_event_id,
                        until_event_id: *until_event_id,
                        status: RetroJobStatus::Queued,
                        attempt: 0,
                        max_attempts: *max_attempts,
                        next_run_at: *created_at,
                        claimed_by: None,
                        claim_expires_at: None,
                        last_error: None,
                        created_at: *created_at,
                        updated_at: *created_at,
                        completed_at: None,
                    },
                );
            }

            Op::ClaimRetroJob {
                id,
                claimed_by,
                claim_expires_at,
                updated_at,
            } => {
                if let Some(job) = self.retro_jobs.get_mut(id.as_str()) {
                    if job.status != RetroJobStatus::Queued {
                        return;
                    }
                    job.status = RetroJobStatus::Claimed;
                    job.claimed_by = Some(claimed_by.clone());
                    job.claim_expires_at = Some(*claim_expires_at);
                    job.updated_at = *updated_at;
                }
            }

            Op::RetroJobSucceeded { id, completed_at } => {
                if let Some(job) = self.retro_jobs.get_mut(id.as_str()) {
                    job.status = RetroJobStatus::Succeeded;
                    job.completed_at = Some(*completed_at);
                    job.updated_at = *completed_at;
                }
            }

            Op::RetroJobRetry {
                id,
                next_run_at,
                last_error,
                updated_at,
            } => {
                if let Some(job) = self.retro_jobs.get_mut(id.as_str()) {
                    job.status = RetroJobStatus::Queued;
                    job.attempt += 1;
                    job.next_run_at = *next_run_at;
                    job.last_error = Some(last_error.clone());
                    job.claimed_by = None;
                    job.claim_expires_at = None;
                    job.updated_at = *updated_at;
                }
            }

            Op::RetroJobDead {
                id,
                last_error,
                updated_at,
            } => {
                if let Some(job) = self.retro_jobs.get_mut(id.as_str()) {
                    job.status = RetroJobStatus::Dead;
                    job.last_error = Some(last_error.clone());
                    job.updated_at = *updated_at;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
