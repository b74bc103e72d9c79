// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reads, archival, and pruning over the append-only event log.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::json;
use vybe_core::{event, Event, StoreResult};
use vybe_storage::{Store, TransactionCtx};

/// Stage an `insert_event` op and return the allocated id.
///
/// Shared by every engine module that needs to record an event inside a
/// transaction it is already running.
pub(crate) fn stage_event(
    ctx: &mut TransactionCtx<'_>,
    kind: &str,
    agent: &str,
    project_id: Option<String>,
    task_id: Option<String>,
    message: impl Into<String>,
    metadata: serde_json::Value,
    now: DateTime<Utc>,
) -> u64 {
    let id = ctx.alloc_event_id();
    ctx.stage(vybe_core::Op::InsertEvent {
        id,
        kind: kind.to_string(),
        agent_name: agent.to_string(),
        project_id: project_id.map(Into::into),
        task_id: task_id.map(Into::into),
        message: message.into(),
        metadata,
        created_at: now,
    });
    id
}

fn project_matches(event: &Event, project_filter: Option<&str>) -> bool {
    match project_filter {
        None => true,
        Some(p) => event
            .project_id
            .as_ref()
            .map(|pid| pid.as_str() == p)
            .unwrap_or(true),
    }
}

pub fn fetch_since(store: &Store, cursor: u64, limit: usize, project_filter: Option<&str>) -> Vec<Event> {
    let state = store.read();
    let mut rows: Vec<&Event> = state
        .events
        .iter()
        .filter(|e| e.id > cursor && project_matches(e, project_filter))
        .collect();
    rows.sort_by_key(|e| e.id);
    rows.into_iter().take(limit).cloned().collect()
}

pub fn fetch_recent_user_prompts(store: &Store, project: Option<&str>, n: usize) -> Vec<Event> {
    fetch_recent_by_kind(store, project, n, "user_prompt")
}

pub fn fetch_prior_reasoning(store: &Store, project: Option<&str>, n: usize) -> Vec<Event> {
    fetch_recent_by_kind(store, project, n, "reasoning")
}

fn fetch_recent_by_kind(store: &Store, project: Option<&str>, n: usize, kind: &str) -> Vec<Event> {
    let state = store.read();
    let mut rows: Vec<Event> = state
        .events
        .iter()
        .filter(|e| e.kind == kind && !e.archived && project_matches(e, project))
        .cloned()
        .collect();
    rows.sort_by(|a, b| b.id.cmp(&a.id));
    rows.truncate(n);
    rows
}

pub fn count_active(store: &Store, project: Option<&str>) -> usize {
    store
        .read()
        .events
        .iter()
        .filter(|e| !e.archived && project_matches(e, project))
        .count()
}

/// Highest contiguous range of old, active event ids that may be archived
/// while still keeping the most recent `keep_recent` active events intact.
pub fn find_archive_window(store: &Store, project: Option<&str>, keep_recent: usize) -> Option<(u64, u64)> {
    let state = store.read();
    let mut active: Vec<u64> = state
        .events
        .iter()
        .filter(|e| !e.archived && project_matches(e, project))
        .map(|e| e.id)
        .collect();
    active.sort_unstable();
    if active.len() <= keep_recent {
        return None;
    }
    let archivable = &active[..active.len() - keep_recent];
    Some((*archivable.first()?, *archivable.last()?))
}

pub fn archive_range_with_summary(
    store: &Store,
    agent: &str,
    request_id: &str,
    project: Option<&str>,
    from_id: u64,
    to_id: u64,
    summary: &str,
) -> StoreResult<(u64, usize)> {
    let now = Utc::now();
    store.run_idempotent(agent, request_id, "events.archive", now, |ctx| {
        let archived_count = ctx
            .state()
            .events
            .iter()
            .filter(|e| e.id >= from_id && e.id <= to_id && !e.archived)
            .count();
        ctx.stage(vybe_core::Op::ArchiveEvents { from_id, to_id });
        let summary_event_id = stage_event(
            ctx,
            event::kind::EVENTS_SUMMARY,
            agent,
            project.map(str::to_string),
            None,
            summary.to_string(),
            json!({"from_id": from_id, "to_id": to_id, "archived_count": archived_count}),
            now,
        );
        Ok((summary_event_id, archived_count))
    })
}

/// Permanently delete archived events older than `older_than_days`, bounded
/// to `limit` rows per call. Maintenance sweep, not idempotency-wrapped.
pub fn prune_archived(store: &Store, project: Option<&str>, older_than_days: i64, limit: usize) -> StoreResult<usize> {
    let cutoff = Utc::now() - ChronoDuration::days(older_than_days);
    store.transact(|ctx| {
        let ids: Vec<u64> = ctx
            .state()
            .events
            .iter()
            .filter(|e| e.archived && e.created_at < cutoff && project_matches(e, project))
            .take(limit)
            .map(|e| e.id)
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }
        let count = ids.len();
        ctx.stage(vybe_core::Op::PruneArchivedEvents { ids });
        Ok(count)
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

    fn insert(store: &Store, kind: &str, n: u64) {
        for i in 0..n {
            store
                .transact(|ctx| {
                    stage_event(ctx, kind, "agent", None, None, format!("msg {i}"), json!({}), Utc::now());
                    Ok(())
                })
                .unwrap();
        }
    }

    #[test]
    fn fetch_since_returns_ascending_ids_beyond_cursor() {
        let (_dir, store) = open_store();
        insert(&store, "task_created", 5);
        let rows = fetch_since(&store, 2, 10, None);
        assert_eq!(rows.iter().map(|e| e.id).collect::<Vec<_>>(), vec![3, 4, 5]);
    }

    #[test]
    fn archive_range_marks_archived_and_emits_summary() {
        let (_dir, store) = open_store();
        insert(&store, "task_created", 3);
        let (summary_id, archived_count) =
            archive_range_with_summary(&store, "agent", "r1", None, 1, 2, "collapsed").unwrap();
        assert_eq!(archived_count, 2);
        let state = store.read();
        assert!(state.events.iter().find(|e| e.id == 1).unwrap().archived);
        assert!(state.events.iter().find(|e| e.id == summary_id).unwrap().kind == event::kind::EVENTS_SUMMARY);
    }

    #[test]
    fn find_archive_window_keeps_recent_tail() {
        let (_dir, store) = open_store();
        insert(&store, "task_created", 5);
        let window = find_archive_window(&store, None, 2);
        assert_eq!(window, Some((1, 3)));
    }
}
