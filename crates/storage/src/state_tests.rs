// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::Utc;
use vybe_core::ids::TaskId;

fn create_task_op(id: &str, priority: i32) -> Op {
    Op::CreateTask {
        id: TaskId::new(id),
        title: "t".into(),
        description: String::new(),
        priority,
        project_id: None,
        created_at: Utc::now(),
    }
}

#[test]
fn create_task_is_idempotent() {
    let mut state = MaterializedState::default();
    let op = create_task_op("task_1", 5);
    state.apply_op(&op);
    state.apply_op(&op);
    assert_eq!(state.tasks.len(), 1);
    assert_eq!(state.tasks["task_1"].priority, 5);
}

#[test]
fn set_task_priority_guards_against_stale_version() {
    let mut state = MaterializedState::default();
    state.apply_op(&create_task_op("task_1", 0));
    state.apply_op(&Op::SetTaskPriority {
        task_id: TaskId::new("task_1"),
        priority: 9,
        new_version: 2,
    });
    assert_eq!(state.tasks["task_1"].priority, 9);
    assert_eq!(state.tasks["task_1"].version, 2);

    // Re-applying the same (now stale) op must not regress anything.
    state.apply_op(&Op::SetTaskPriority {
        task_id: TaskId::new("task_1"),
        priority: 9,
        new_version: 2,
    });
    assert_eq!(state.tasks["task_1"].version, 2);
}

#[test]
fn claim_task_sets_in_progress_and_is_idempotent() {
    let mut state = MaterializedState::default();
    state.apply_op(&create_task_op("task_1", 0));
    let now = Utc::now();
    let claim = Op::ClaimTask {
        task_id: TaskId::new("task_1"),
        agent_name: "agent1".into(),
        claimed_at: now,
        claim_expires_at: now + chrono::Duration::minutes(5),
        new_version: 2,
    };
    state.apply_op(&claim);
    state.apply_op(&claim);
    let task = &state.tasks["task_1"];
    assert_eq!(task.status, TaskStatus::InProgress);
    assert_eq!(task.claimed_by.as_deref(), Some("agent1"));
    assert_eq!(task.attempt, 1, "re-applying the same op must not double-count attempt");
}

#[test]
fn unblock_task_transitions_blocked_to_pending_once() {
    let mut state = MaterializedState::default();
    state.apply_op(&create_task_op("task_1", 0));
    state.apply_op(&Op::SetTaskStatus {
        task_id: TaskId::new("task_1"),
        status: TaskStatus::Blocked,
        blocked_reason: BlockedReason::Dependency,
        new_version: 2,
        updated_at: Utc::now(),
        release_claim: true,
    });
    assert_eq!(state.tasks["task_1"].status, TaskStatus::Blocked);

    let unblock = Op::UnblockTask {
        task_id: TaskId::new("task_1"),
        new_version: 3,
        updated_at: Utc::now(),
    };
    state.apply_op(&unblock);
    assert_eq!(state.tasks["task_1"].status, TaskStatus::Pending);

    // Idempotent: applying again when already pending is a no-op.
    state.apply_op(&unblock);
    assert_eq!(state.tasks["task_1"].status, TaskStatus::Pending);
}

#[test]
fn insert_memory_then_reinforce_is_idempotent_on_replay() {
    let mut state = MaterializedState::default();
    let id = vybe_core::ids::MemoryId::new("memory_1");
    let now = Utc::now();
    state.apply_op(&Op::InsertMemory {
        id: id.clone(),
        key: "API Key".into(),
        canonical_key: "api_key".into(),
        value: "secret".into(),
        value_type: vybe_core::ValueType::String,
        scope: vybe_core::MemoryScope::Global,
        scope_id: String::new(),
        confidence: 0.5,
        last_seen_at: now,
        source_event_id: None,
        expires_at: None,
        created_at: now,
    });
    let reinforce = Op::ReinforceMemory {
        id: id.clone(),
        confidence: 0.55,
        last_seen_at: now,
    };
    state.apply_op(&reinforce);
    state.apply_op(&reinforce);
    assert_eq!(state.memories["memory_1"].confidence, 0.55);
}

#[test]
fn insert_event_dedupes_by_id_on_replay() {
    let mut state = MaterializedState::default();
    let op = Op::InsertEvent {
        id: 1,
        kind: "task_created".into(),
        agent_name: "a".into(),
        project_id: None,
        task_id: None,
        message: "created".into(),
        metadata: serde_json::json!({}),
        created_at: Utc::now(),
    };
    state.apply_op(&op);
    state.apply_op(&op);
    assert_eq!(state.events.len(), 1);
    assert_eq!(state.next_event_id, 1);
}

#[test]
fn dependency_cycle_detection_walks_the_graph() {
    let mut state = MaterializedState::default();
    state.apply_op(&create_task_op("a", 0));
    state.apply_op(&create_task_op("b", 0));
    state.apply_op(&create_task_op("c", 0));
    state.apply_op(&Op::AddDependency {
        task_id: TaskId::new("b"),
        depends_on: TaskId::new("a"),
        new_version: 2,
    });
    state.apply_op(&Op::AddDependency {
        task_id: TaskId::new("c"),
        depends_on: TaskId::new("b"),
        new_version: 2,
    });
    // c -> b -> a, so making a depend on c would close a cycle.
    assert!(state.depends_on_transitively("c", "a"));
    assert!(!state.depends_on_transitively("a", "c"));
}

#[test]
fn get_task_resolves_unambiguous_prefix() {
    let mut state = MaterializedState::default();
    state.apply_op(&create_task_op("task_abc123", 0));
    assert!(state.get_task("task_abc").is_some());
    assert!(state.get_task("task_").is_some());

    state.apply_op(&create_task_op("task_abcxyz", 0));
    assert!(
        state.get_task("task_abc").is_none(),
        "ambiguous prefix across two tasks must not resolve"
    );
}
