// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios (S1-S7) and cross-cutting invariants, run against
//! a real `Store` in a temp state directory.

use vybe_core::{MemoryScope, TaskStatus, ValueType};
use vybe_engine::{memory_store, push, task_graph, ArtifactInput, MemoryInput, NewTask, PushInput, ResumeOptions, TaskStatusInput};
use vybe_storage::{Store, StoreConfig};

fn open_temp_store() -> (tempfile::TempDir, Store) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Store::open(StoreConfig::new(dir.path())).expect("open store");
    (dir, store)
}

fn new_task(title: &str) -> NewTask {
    NewTask {
        title: title.to_string(),
        description: String::new(),
        priority: 0,
        project_id: None,
    }
}

#[test]
fn s1_basic_resume_on_empty_store() {
    let (_dir, store) = open_temp_store();
    let result = vybe_engine::resume(&store, "agent1", "req1", ResumeOptions::default()).unwrap();
    assert_eq!(result.old_cursor, 0);
    assert_eq!(result.new_cursor, 0);
    assert!(result.deltas.is_empty());
    assert!(result.focus_task_id.is_none());
}

#[test]
fn s2_focus_persists_across_resume() {
    let (_dir, store) = open_temp_store();
    let t1 = task_graph::create(&store, "A", "r-t1", new_task("T1")).unwrap();
    let _t2 = task_graph::create(&store, "A", "r-t2", new_task("T2")).unwrap();

    let r1 = vybe_engine::resume(&store, "A", "r1", ResumeOptions::default()).unwrap();
    assert_eq!(r1.focus_task_id.as_ref().map(|t| t.as_str()), Some(t1.id.as_str()));

    task_graph::set_status(&store, "A", "r-status", t1.id.as_str(), TaskStatus::InProgress, None).unwrap();

    let r2 = vybe_engine::resume(&store, "A", "r2", ResumeOptions::default()).unwrap();
    assert_eq!(r2.focus_task_id.as_ref().map(|t| t.as_str()), Some(t1.id.as_str()));
}

#[test]
fn s3_completing_unblocks_dependents() {
    let (_dir, store) = open_temp_store();
    let a = task_graph::create(&store, "agent", "r-a", new_task("A")).unwrap();
    let b = task_graph::create(&store, "agent", "r-b", new_task("B")).unwrap();
    task_graph::add_dependency(&store, "agent", "r-dep", b.id.as_str(), a.id.as_str()).unwrap();
    task_graph::set_status(&store, "agent", "r-block", b.id.as_str(), TaskStatus::Blocked, None).unwrap();

    task_graph::set_status(&store, "agent", "r-complete", a.id.as_str(), TaskStatus::Completed, None).unwrap();

    let state = store.read();
    let b_after = state.get_task(b.id.as_str()).unwrap();
    assert_eq!(b_after.status, TaskStatus::Pending);

    let kinds: Vec<&str> = state.events.iter().map(|e| e.kind.as_str()).collect();
    let status_events = kinds.iter().filter(|k| **k == vybe_core::event::kind::TASK_STATUS).count();
    assert!(status_events >= 2, "expected at least two task_status events, got {status_events}");
}

#[test]
fn s4_idempotent_task_create() {
    let (_dir, store) = open_temp_store();
    let first = task_graph::create(&store, "a", "r", new_task("T")).unwrap();
    let second = task_graph::create(&store, "a", "r", new_task("T")).unwrap();
    assert_eq!(first.id, second.id);

    let state = store.read();
    assert_eq!(state.tasks.len(), 1);
    let created_events = state
        .events
        .iter()
        .filter(|e| e.kind == vybe_core::event::kind::TASK_CREATED)
        .count();
    assert_eq!(created_events, 1);
}

#[test]
fn s5_memory_reinforcement() {
    let (_dir, store) = open_temp_store();
    let first = memory_store::upsert(
        &store,
        "a",
        "r1",
        MemoryScope::Global,
        "",
        " API Key ",
        "secret",
        ValueType::String,
        None,
        None,
    )
    .unwrap();
    assert_eq!(first.canonical_key, "api_key");
    assert!(!first.reinforced);

    let second = memory_store::upsert(
        &store,
        "a",
        "r2",
        MemoryScope::Global,
        "",
        " API Key ",
        "secret",
        ValueType::String,
        None,
        None,
    )
    .unwrap();
    assert_eq!(second.canonical_key, "api_key");
    assert!(second.reinforced);
    assert!((second.confidence - 0.55).abs() < 1e-6);
}

#[test]
fn s6_push_atomicity_and_idempotency() {
    let (_dir, store) = open_temp_store();
    let task = task_graph::create(&store, "a", "r-task", new_task("T")).unwrap();

    let input = PushInput {
        task_id: Some(task.id.to_string()),
        event: Some(("note".to_string(), "did a thing".to_string(), serde_json::json!({}))),
        memories: vec![MemoryInput {
            scope: MemoryScope::Task,
            scope_id: task.id.to_string(),
            key: "outcome".to_string(),
            value: "done".to_string(),
            value_type: ValueType::String,
            confidence: None,
        }],
        artifacts: vec![ArtifactInput {
            file_path: "src/lib.rs".to_string(),
            content_type: "text/rust".to_string(),
        }],
        task_status: Some(TaskStatusInput {
            status: TaskStatus::Completed,
            blocked_reason: None,
        }),
    };

    let first = push(&store, "a", "r-push", input.clone()).unwrap();
    assert!(first.event_id.is_some());
    assert_eq!(first.memory_ids.len(), 1);
    assert_eq!(first.artifact_ids.len(), 1);

    let event_count_before = store.read().events.len();
    let memory_count_before = store.read().memories.len();

    let second = push(&store, "a", "r-push", input).unwrap();
    assert_eq!(first.event_id, second.event_id);
    assert_eq!(first.memory_ids, second.memory_ids);
    assert_eq!(store.read().events.len(), event_count_before);
    assert_eq!(store.read().memories.len(), memory_count_before);
}

#[test]
fn s7_claim_contention_on_single_task() {
    let (_dir, store) = open_temp_store();
    let task = task_graph::create(&store, "setup", "r-setup", new_task("T")).unwrap();

    let claim_x = task_graph::claim(&store, "X", "r-x", task.id.as_str(), 5);
    let claim_y = task_graph::claim(&store, "Y", "r-y", task.id.as_str(), 5);

    let outcomes: Vec<_> = vec![claim_x.is_ok(), claim_y.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1, "exactly one claim must succeed");

    let state = store.read();
    let after = state.get_task(task.id.as_str()).unwrap();
    assert_eq!(after.status, TaskStatus::InProgress);
}

#[test]
fn task_version_strictly_increments_on_mutation() {
    let (_dir, store) = open_temp_store();
    let task = task_graph::create(&store, "a", "r1", new_task("T")).unwrap();
    let v0 = task.version;

    let claimed = task_graph::claim(&store, "a", "r2", task.id.as_str(), 5).unwrap();
    assert!(claimed.version > v0);

    let heartbeat = task_graph::heartbeat(&store, "a", "r3", task.id.as_str(), 5).unwrap();
    assert!(heartbeat.version > claimed.version);
}

#[test]
fn cursor_is_monotonic_across_resumes() {
    let (_dir, store) = open_temp_store();
    task_graph::create(&store, "other", "r1", new_task("T1")).unwrap();
    let r1 = vybe_engine::resume(&store, "A", "req1", ResumeOptions::default()).unwrap();

    task_graph::create(&store, "other", "r2", new_task("T2")).unwrap();
    let r2 = vybe_engine::resume(&store, "A", "req2", ResumeOptions::default()).unwrap();

    assert!(r2.new_cursor >= r1.new_cursor);
}

#[test]
#[serial_test::serial(vybe_checkpoint)]
fn checkpoint_preserves_durable_state_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let task_id = {
        let store = Store::open(StoreConfig::new(dir.path())).unwrap();
        let task = task_graph::create(&store, "a", "r1", new_task("T")).unwrap();
        store.checkpoint().unwrap();
        task.id.to_string()
    };

    let store = Store::open(StoreConfig::new(dir.path())).unwrap();
    let state = store.read();
    assert!(state.get_task(&task_id).is_some());
}
