// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-agent cursor and focus, with monotonic-cursor optimistic concurrency.

use chrono::{DateTime, Utc};
use serde_json::json;
use vybe_core::{event, AgentState, StoreError, StoreResult};
use vybe_storage::{Store, TransactionCtx};

pub fn load_or_create(ctx: &mut TransactionCtx<'_>, agent: &str, now: DateTime<Utc>) -> AgentState {
    if let Some(existing) = ctx.state().agent_states.get(agent) {
        return existing.clone();
    }
    let state = AgentState::new(agent, now);
    ctx.stage(vybe_core::Op::UpsertAgentState {
        agent_name: agent.to_string(),
        last_seen_event_id: state.last_seen_event_id,
        focus_task_id: None,
        focus_project_id: None,
        new_version: state.version + 1,
        last_active_at: now,
    });
    state
}

pub fn update_atomic(
    store: &Store,
    agent: &str,
    new_cursor: u64,
    new_focus_task: Option<&str>,
) -> StoreResult<AgentState> {
    let now = Utc::now();
    store.transact(|ctx| apply_update(ctx, agent, new_cursor, new_focus_task, None, now))
}

pub fn update_atomic_with_project(
    store: &Store,
    agent: &str,
    new_cursor: u64,
    new_focus_task: Option<&str>,
    new_focus_project: Option<&str>,
) -> StoreResult<AgentState> {
    let now = Utc::now();
    store.transact(|ctx| apply_update(ctx, agent, new_cursor, new_focus_task, new_focus_project, now))
}

pub(crate) fn apply_update(
    ctx: &mut TransactionCtx<'_>,
    agent: &str,
    new_cursor: u64,
    new_focus_task: Option<&str>,
    new_focus_project: Option<&str>,
    now: DateTime<Utc>,
) -> StoreResult<AgentState> {
    let current = load_or_create(ctx, agent, now);
    if new_cursor < current.last_seen_event_id {
        return Err(StoreError::VersionConflict(vybe_core::VersionConflictCtx {
            entity: "agent_state",
            id: agent.to_string(),
            expected: current.last_seen_event_id,
            actual: new_cursor,
        }));
    }
    let focus_task_id = new_focus_task
        .map(|t| t.to_string())
        .or_else(|| current.focus_task_id.as_ref().map(|t| t.as_str().to_string()));
    let focus_project_id = new_focus_project
        .map(|p| p.to_string())
        .or_else(|| current.focus_project_id.as_ref().map(|p| p.as_str().to_string()));

    ctx.stage(vybe_core::Op::UpsertAgentState {
        agent_name: agent.to_string(),
        last_seen_event_id: new_cursor,
        focus_task_id: focus_task_id.clone().map(Into::into),
        focus_project_id: focus_project_id.clone().map(Into::into),
        new_version: current.version + 1,
        last_active_at: now,
    });

    Ok(AgentState {
        agent_name: agent.to_string(),
        last_seen_event_id: new_cursor,
        focus_task_id: focus_task_id.map(Into::into),
        focus_project_id: focus_project_id.map(Into::into),
        version: current.version + 1,
        last_active_at: now,
    })
}

pub fn set_focus_project_with_event_idempotent(
    store: &Store,
    agent: &str,
    request_id: &str,
    project_id: &str,
) -> StoreResult<AgentState> {
    let now = Utc::now();
    store.run_idempotent(agent, request_id, "agent.set_focus_project", now, |ctx| {
        let current = load_or_create(ctx, agent, now);
        ctx.stage(vybe_core::Op::InsertEvent {
            id: ctx.alloc_event_id(),
            kind: event::kind::AGENT_PROJECT_FOCUS.to_string(),
            agent_name: agent.to_string(),
            project_id: Some(project_id.into()),
            task_id: None,
            message: format!("focus project set to {project_id}"),
            metadata: json!({}),
            created_at: now,
        });
        ctx.stage(vybe_core::Op::UpsertAgentState {
            agent_name: agent.to_string(),
            last_seen_event_id: current.last_seen_event_id,
            focus_task_id: current.focus_task_id.clone(),
            focus_project_id: Some(project_id.into()),
            new_version: current.version + 1,
            last_active_at: now,
        });
        Ok(AgentState {
            agent_name: agent.to_string(),
            focus_project_id: Some(project_id.into()),
            version: current.version + 1,
            last_active_at: now,
            ..current
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use vybe_storage::StoreConfig;

    fn open_store() -> (tempfile::TempDir, Store) {
        let dir = tempdir().unwrap();
        let store = Store::open(StoreConfig::new(dir.path())).unwrap();
        (dir, store)
    }

    #[test]
    fn update_atomic_rejects_lower_cursor() {
        let (_dir, store) = open_store();
        update_atomic(&store, "agent", 10, None).unwrap();
        let err = update_atomic(&store, "agent", 5, None);
        assert!(err.is_err());
    }

    #[test]
    fn update_atomic_preserves_focus_task_when_not_supplied() {
        let (_dir, store) = open_store();
        update_atomic(&store, "agent", 1, Some("task_1")).unwrap();
        let state = update_atomic(&store, "agent", 2, None).unwrap();
        assert_eq!(state.focus_task_id.unwrap().as_str(), "task_1");
    }
}
