// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task status machine, dependency edges, and claim leases.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::json;
use vybe_core::{event, BlockedReason, StoreError, StoreResult, Task, TaskId, TaskStatus};
use vybe_storage::{MaterializedState, Store, TransactionCtx};

/// Fields accepted by [`create`]. Optional fields are a struct of options
/// rather than method overloads, per the store's single-canonical-form rule.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub priority: i32,
    pub project_id: Option<String>,
}

/// `task.create(agent, request_id, new_task) -> Task`, idempotent on
/// `(agent, request_id)`.
pub fn create(store: &Store, agent: &str, request_id: &str, new: NewTask) -> StoreResult<Task> {
    if new.title.trim().is_empty() {
        return Err(StoreError::invalid("title", "must not be empty"));
    }
    let now = Utc::now();
    store.run_idempotent(agent, request_id, "task.create", now, |ctx| {
        let id = TaskId::new(vybe_core::ids::generate("task"));
        let event_id = ctx.alloc_event_id();
        ctx.stage(vybe_core::Op::InsertEvent {
            id: event_id,
            kind: event::kind::TASK_CREATED.to_string(),
            agent_name: agent.to_string(),
            project_id: new.project_id.clone().map(Into::into),
            task_id: Some(id.clone()),
            message: format!("created task: {}", new.title),
            metadata: json!({}),
            created_at: now,
        });
        ctx.stage(vybe_core::Op::CreateTask {
            id: id.clone(),
            title: new.title.clone(),
            description: new.description.clone(),
            priority: new.priority,
            project_id: new.project_id.clone().map(Into::into),
            created_at: now,
        });
        Ok(Task {
            id,
            title: new.title,
            description: new.description,
            status: TaskStatus::Pending,
            blocked_reason: BlockedReason::None,
            priority: new.priority,
            project_id: new.project_id.map(Into::into),
            depends_on: Default::default(),
            claimed_by: None,
            claimed_at: None,
            claim_expires_at: None,
            last_heartbeat_at: None,
            attempt: 0,
            version: 1,
            created_at: now,
            updated_at: now,
        })
    })
}

fn get_task_or_not_found<'a>(state: &'a MaterializedState, task_id: &str) -> StoreResult<&'a Task> {
    state
        .get_task(task_id)
        .ok_or_else(|| StoreError::not_found("task", task_id))
}

/// Set `task_id`'s status, performing the side effects the status machine
/// requires (claim release, dependent unblocking, event emission).
pub fn set_status(
    store: &Store,
    agent: &str,
    request_id: &str,
    task_id: &str,
    status: TaskStatus,
    blocked_reason: Option<BlockedReason>,
) -> StoreResult<Task> {
    let now = Utc::now();
    store.run_idempotent(agent, request_id, "task.set_status", now, |ctx| {
        apply_status_change(ctx, agent, task_id, status, blocked_reason.clone(), now)
    })
}

/// Shared by `set_status` and `push`'s task-status sub-op.
pub(crate) fn apply_status_change(
    ctx: &mut TransactionCtx<'_>,
    agent: &str,
    task_id: &str,
    status: TaskStatus,
    blocked_reason: Option<BlockedReason>,
    now: DateTime<Utc>,
) -> StoreResult<Task> {
    let task = get_task_or_not_found(ctx.state(), task_id)?.clone();
    let new_version = task.version + 1;
    let release_claim = matches!(status, TaskStatus::Completed | TaskStatus::Blocked);
    let reason = blocked_reason.unwrap_or(BlockedReason::None);

    let event_id = ctx.alloc_event_id();
    ctx.stage(vybe_core::Op::InsertEvent {
        id: event_id,
        kind: event::kind::TASK_STATUS.to_string(),
        agent_name: agent.to_string(),
        project_id: task.project_id.clone(),
        task_id: Some(task.id.clone()),
        message: format!("{} -> {status}", task.status),
        metadata: json!({"from": task.status.to_string(), "to": status.to_string()}),
        created_at: now,
    });
    ctx.stage(vybe_core::Op::SetTaskStatus {
        task_id: task.id.clone(),
        status,
        blocked_reason: reason,
        new_version,
        updated_at: now,
        release_claim,
    });

    let mut result = task.clone();
    result.status = status;
    result.version = new_version;
    result.updated_at = now;
    if release_claim {
        result.claimed_by = None;
        result.claimed_at = None;
        result.claim_expires_at = None;
    }

    if status == TaskStatus::Completed {
        for dependent_id in ctx.state().dependents_of(task.id.as_str()) {
            let Some(dependent) = ctx.state().get_task(&dependent_id) else {
                continue;
            };
            if dependent.status != TaskStatus::Blocked {
                continue;
            }
            let still_blocked = dependent
                .depends_on
                .iter()
                .any(|dep| dep.as_str() != task.id.as_str() && !is_completed(ctx.state(), dep.as_str()));
            if still_blocked {
                continue;
            }
            let dep_event_id = ctx.alloc_event_id();
            ctx.stage(vybe_core::Op::InsertEvent {
                id: dep_event_id,
                kind: event::kind::TASK_STATUS.to_string(),
                agent_name: agent.to_string(),
                project_id: dependent.project_id.clone(),
                task_id: Some(dependent.id.clone()),
                message: "blocked -> pending (dependency satisfied)".to_string(),
                metadata: json!({"from": "blocked", "to": "pending"}),
                created_at: now,
            });
            ctx.stage(vybe_core::Op::UnblockTask {
                task_id: dependent.id.clone(),
                new_version: dependent.version + 1,
                updated_at: now,
            });
        }
    }

    Ok(result)
}

fn is_completed(state: &MaterializedState, task_id: &str) -> bool {
    state
        .get_task(task_id)
        .map(|t| t.status == TaskStatus::Completed)
        .unwrap_or(false)
}

/// Tie-break order for `claim_next`: higher priority, then earliest
/// `created_at`, then lexicographic id.
fn pick_claimable<'a>(state: &'a MaterializedState, project_id: Option<&str>) -> Option<&'a Task> {
    let now = Utc::now();
    state
        .tasks
        .values()
        .filter(|t| t.status == TaskStatus::Pending)
        .filter(|t| !t.is_claim_active(now))
        .filter(|t| t.depends_on.iter().all(|d| is_completed(state, d.as_str())))
        .filter(|t| match project_id {
            Some(p) => t.project_id.as_ref().map(|x| x.as_str()) == Some(p),
            None => true,
        })
        .max_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| b.id.as_str().cmp(a.id.as_str()))
        })
}

/// Atomically claim the highest-priority eligible pending task.
pub fn claim_next(
    store: &Store,
    agent: &str,
    request_id: &str,
    project_id: Option<&str>,
    ttl_minutes: i64,
) -> StoreResult<Option<Task>> {
    let now = Utc::now();
    store.run_idempotent(agent, request_id, "task.claim_next", now, |ctx| {
        let Some(task) = pick_claimable(ctx.state(), project_id).cloned() else {
            return Ok(None);
        };
        claim_task(ctx, agent, &task, now, ttl_minutes).map(Some)
    })
}

fn claim_task(
    ctx: &mut TransactionCtx<'_>,
    agent: &str,
    task: &Task,
    now: DateTime<Utc>,
    ttl_minutes: i64,
) -> StoreResult<Task> {
    let new_version = task.version + 1;
    let expires_at = now + ChronoDuration::minutes(ttl_minutes);
    let event_id = ctx.alloc_event_id();
    ctx.stage(vybe_core::Op::InsertEvent {
        id: event_id,
        kind: event::kind::TASK_CLAIMED.to_string(),
        agent_name: agent.to_string(),
        project_id: task.project_id.clone(),
        task_id: Some(task.id.clone()),
        message: format!("claimed by {agent}"),
        metadata: json!({}),
        created_at: now,
    });
    ctx.stage(vybe_core::Op::ClaimTask {
        task_id: task.id.clone(),
        agent_name: agent.to_string(),
        claimed_at: now,
        claim_expires_at: expires_at,
        new_version,
    });
    let mut result = task.clone();
    result.status = TaskStatus::InProgress;
    result.claimed_by = Some(agent.to_string());
    result.claimed_at = Some(now);
    result.claim_expires_at = Some(expires_at);
    result.version = new_version;
    Ok(result)
}

/// Explicit single-task claim (vs. `claim_next`'s selection). Fails with
/// `ClaimContention` if the task is already actively claimed by someone else.
pub fn claim(
    store: &Store,
    agent: &str,
    request_id: &str,
    task_id: &str,
    ttl_minutes: i64,
) -> StoreResult<Task> {
    let now = Utc::now();
    store.run_idempotent(agent, request_id, "task.claim", now, |ctx| {
        let task = get_task_or_not_found(ctx.state(), task_id)?.clone();
        if task.is_claim_active(now) && task.claimed_by.as_deref() != Some(agent) {
            return Err(StoreError::ClaimContention {
                task_id: task.id.to_string(),
            });
        }
        claim_task(ctx, agent, &task, now, ttl_minutes)
    })
}

/// Extend an active claim's expiry. No-op failure (`ClaimContention`) if the
/// caller does not hold the claim.
pub fn heartbeat(
    store: &Store,
    agent: &str,
    request_id: &str,
    task_id: &str,
    ttl_minutes: i64,
) -> StoreResult<Task> {
    let now = Utc::now();
    store.run_idempotent(agent, request_id, "task.heartbeat", now, |ctx| {
        let task = get_task_or_not_found(ctx.state(), task_id)?.clone();
        if task.claimed_by.as_deref() != Some(agent) {
            return Err(StoreError::ClaimContention {
                task_id: task.id.to_string(),
            });
        }
        let new_version = task.version + 1;
        let expires_at = now + ChronoDuration::minutes(ttl_minutes);
        ctx.stage(vybe_core::Op::HeartbeatTask {
            task_id: task.id.clone(),
            claim_expires_at: expires_at,
            last_heartbeat_at: now,
            new_version,
        });
        let mut result = task;
        result.claim_expires_at = Some(expires_at);
        result.last_heartbeat_at = Some(now);
        result.version = new_version;
        Ok(result)
    })
}

/// Return every expired claim to its prior non-terminal status (pending).
/// Not idempotency-wrapped: it is a maintenance sweep, safe to run
/// repeatedly and concurrently with no caller-visible `request_id`.
pub fn release_expired(store: &Store) -> StoreResult<Vec<TaskId>> {
    let now = Utc::now();
    store.transact(|ctx| {
        let expired: Vec<Task> = ctx
            .state()
            .tasks
            .values()
            .filter(|t| {
                t.status == TaskStatus::InProgress
                    && t.claim_expires_at.map(|e| e < now).unwrap_or(false)
            })
            .cloned()
            .collect();
        let mut ids = Vec::new();
        for task in expired {
            let new_version = task.version + 1;
            ctx.stage(vybe_core::Op::ReleaseClaim {
                task_id: task.id.clone(),
                new_version,
                updated_at: now,
            });
            ids.push(task.id);
        }
        Ok(ids)
    })
}

/// Add dependency edge `task_id -> depends_on`, rejecting cycles.
pub fn add_dependency(
    store: &Store,
    agent: &str,
    request_id: &str,
    task_id: &str,
    depends_on: &str,
) -> StoreResult<Task> {
    let now = Utc::now();
    store.run_idempotent(agent, request_id, "task.add_dependency", now, |ctx| {
        let task = get_task_or_not_found(ctx.state(), task_id)?.clone();
        get_task_or_not_found(ctx.state(), depends_on)?;
        if ctx.state().depends_on_transitively(depends_on, task_id) {
            return Err(StoreError::DependencyCycle {
                task_id: task_id.to_string(),
                depends_on: depends_on.to_string(),
            });
        }
        let new_version = task.version + 1;
        let event_id = ctx.alloc_event_id();
        ctx.stage(vybe_core::Op::InsertEvent {
            id: event_id,
            kind: event::kind::TASK_DEPENDENCY_ADDED.to_string(),
            agent_name: agent.to_string(),
            project_id: task.project_id.clone(),
            task_id: Some(task.id.clone()),
            message: format!("depends on {depends_on}"),
            metadata: json!({"depends_on": depends_on}),
            created_at: now,
        });
        ctx.stage(vybe_core::Op::AddDependency {
            task_id: task.id.clone(),
            depends_on: depends_on.into(),
            new_version,
        });
        let mut result = task;
        result.depends_on.insert(depends_on.into());
        result.version = new_version;
        Ok(result)
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
    fn create_is_idempotent() {
        let (_dir, store) = open_store();
        let new = NewTask {
            title: "write tests".into(),
            ..Default::default()
        };
        let t1 = create(&store, "agent1", "r1", new.clone()).unwrap();
        let t2 = create(&store, "agent1", "r1", new).unwrap();
        assert_eq!(t1.id, t2.id);
        assert_eq!(store.read().tasks.len(), 1);
    }

    #[test]
    fn completing_unblocks_dependent() {
        let (_dir, store) = open_store();
        let a = create(&store, "agent1", "ra", NewTask { title: "a".into(), ..Default::default() }).unwrap();
        let b = create(&store, "agent1", "rb", NewTask { title: "b".into(), ..Default::default() }).unwrap();
        add_dependency(&store, "agent1", "rdep", b.id.as_str(), a.id.as_str()).unwrap();
        set_status(
            &store,
            "agent1",
            "rblock",
            b.id.as_str(),
            TaskStatus::Blocked,
            Some(BlockedReason::Dependency),
        )
        .unwrap();
        set_status(&store, "agent1", "rdone", a.id.as_str(), TaskStatus::Completed, None).unwrap();
        assert_eq!(store.read().tasks[b.id.as_str()].status, TaskStatus::Pending);
    }

    #[test]
    fn claim_next_picks_highest_priority() {
        let (_dir, store) = open_store();
        create(&store, "agent1", "r1", NewTask { title: "low".into(), priority: 1, ..Default::default() }).unwrap();
        let high = create(&store, "agent1", "r2", NewTask { title: "high".into(), priority: 5, ..Default::default() }).unwrap();
        let claimed = claim_next(&store, "agent1", "r3", None, 5).unwrap().unwrap();
        assert_eq!(claimed.id, high.id);
    }
}
