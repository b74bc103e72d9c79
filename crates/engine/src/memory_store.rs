// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scoped key/value memory: upsert-with-reinforcement, touch, compaction, GC.

use chrono::{DateTime, Utc};
use serde_json::json;
use vybe_core::{canonicalize_key, clamp_confidence, event, Memory, MemoryId, MemoryScope, StoreError, StoreResult, ValueType};
use vybe_storage::{Store, TransactionCtx};

/// Result of an upsert: whether the call reinforced an existing row.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub event_id: u64,
    pub memory_id: MemoryId,
    pub reinforced: bool,
    pub confidence: f32,
    pub canonical_key: String,
}

const REINFORCE_BUMP: f32 = 0.05;

pub fn upsert(
    store: &Store,
    agent: &str,
    request_id: &str,
    scope: MemoryScope,
    scope_id: &str,
    key: &str,
    value: &str,
    value_type: ValueType,
    confidence: Option<f32>,
    expires_at: Option<DateTime<Utc>>,
) -> StoreResult<UpsertOutcome> {
    value_type
        .validate(value)
        .map_err(|msg| StoreError::invalid("value", msg))?;
    let canonical = canonicalize_key(key)
        .ok_or_else(|| StoreError::invalid("key", "canonical key must not be empty"))?;
    let now = Utc::now();

    store.run_idempotent(agent, request_id, "memory.upsert", now, |ctx| {
        apply_upsert(
            ctx, agent, scope, scope_id, key, &canonical, value, value_type, confidence,
            expires_at, None, now,
        )
    })
}

/// Shared with `push`'s per-memory sub-ops, which supply `source_event_id`
/// from the event inserted earlier in the same transaction.
#[allow(clippy::too_many_arguments)]
pub(crate) fn apply_upsert(
    ctx: &mut TransactionCtx<'_>,
    agent: &str,
    scope: MemoryScope,
    scope_id: &str,
    key: &str,
    canonical: &str,
    value: &str,
    value_type: ValueType,
    confidence: Option<f32>,
    expires_at: Option<DateTime<Utc>>,
    source_event_id: Option<u64>,
    now: DateTime<Utc>,
) -> StoreResult<UpsertOutcome> {
    if let Some(existing) = ctx.state().find_active_memory(scope, scope_id, canonical).cloned() {
        if existing.value == value && existing.value_type == value_type {
            let new_confidence = clamp_confidence(existing.confidence + REINFORCE_BUMP);
            let event_id = ctx.alloc_event_id();
            ctx.stage(vybe_core::Op::InsertEvent {
                id: event_id,
                kind: event::kind::MEMORY_REINFORCED.to_string(),
                agent_name: agent.to_string(),
                project_id: None,
                task_id: None,
                message: format!("reinforced {canonical}"),
                metadata: json!({"confidence": new_confidence}),
                created_at: now,
            });
            ctx.stage(vybe_core::Op::ReinforceMemory {
                id: existing.id.clone(),
                confidence: new_confidence,
                last_seen_at: now,
            });
            return Ok(UpsertOutcome {
                event_id,
                memory_id: existing.id,
                reinforced: true,
                confidence: new_confidence,
                canonical_key: canonical.to_string(),
            });
        }

        let new_confidence = confidence.map(clamp_confidence).unwrap_or(existing.confidence);
        let event_id = ctx.alloc_event_id();
        ctx.stage(vybe_core::Op::InsertEvent {
            id: event_id,
            kind: event::kind::MEMORY_UPSERTED.to_string(),
            agent_name: agent.to_string(),
            project_id: None,
            task_id: None,
            message: format!("updated {canonical}"),
            metadata: json!({}),
            created_at: now,
        });
        ctx.stage(vybe_core::Op::OverwriteMemory {
            id: existing.id.clone(),
            value: value.to_string(),
            value_type,
            confidence: new_confidence,
            last_seen_at: now,
        });
        return Ok(UpsertOutcome {
            event_id,
            memory_id: existing.id,
            reinforced: false,
            confidence: new_confidence,
            canonical_key: canonical.to_string(),
        });
    }

    let id = MemoryId::new(vybe_core::ids::generate("memory"));
    let confidence = confidence.map(clamp_confidence).unwrap_or(0.5);
    let event_id = ctx.alloc_event_id();
    ctx.stage(vybe_core::Op::InsertEvent {
        id: event_id,
        kind: event::kind::MEMORY_UPSERTED.to_string(),
        agent_name: agent.to_string(),
        project_id: None,
        task_id: None,
        message: format!("set {canonical}"),
        metadata: json!({}),
        created_at: now,
    });
    ctx.stage(vybe_core::Op::InsertMemory {
        id: id.clone(),
        key: key.to_string(),
        canonical_key: canonical.to_string(),
        value: value.to_string(),
        value_type,
        scope,
        scope_id: scope_id.to_string(),
        confidence,
        last_seen_at: now,
        source_event_id,
        expires_at,
        created_at: now,
    });
    Ok(UpsertOutcome {
        event_id,
        memory_id: id,
        reinforced: false,
        confidence,
        canonical_key: canonical.to_string(),
    })
}

pub fn get(store: &Store, key: &str, scope: MemoryScope, scope_id: &str) -> Option<Memory> {
    let canonical = canonicalize_key(key)?;
    store
        .read()
        .find_active_memory(scope, scope_id, &canonical)
        .cloned()
}

pub fn list(store: &Store, scope: MemoryScope, scope_id: &str) -> Vec<Memory> {
    let state = store.read();
    let mut rows: Vec<Memory> = state.active_memories_in_scope(scope, scope_id).cloned().collect();
    rows.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.last_seen_at.cmp(&a.last_seen_at))
    });
    rows
}

pub fn query(store: &Store, scope: MemoryScope, scope_id: &str, pattern: &str, limit: usize) -> Vec<Memory> {
    let mut rows = list(store, scope, scope_id);
    rows.retain(|m| m.key.to_lowercase().contains(&pattern.to_lowercase()));
    rows.truncate(limit);
    rows
}

pub fn touch(
    store: &Store,
    agent: &str,
    request_id: &str,
    key: &str,
    scope: MemoryScope,
    scope_id: &str,
    bump: f32,
) -> StoreResult<Memory> {
    let canonical = canonicalize_key(key)
        .ok_or_else(|| StoreError::invalid("key", "canonical key must not be empty"))?;
    let now = Utc::now();
    store.run_idempotent(agent, request_id, "memory.touch", now, |ctx| {
        let existing = ctx
            .state()
            .find_active_memory(scope, scope_id, &canonical)
            .cloned()
            .ok_or_else(|| StoreError::not_found("memory", &canonical))?;
        let new_confidence = clamp_confidence(existing.confidence + bump);
        let event_id = ctx.alloc_event_id();
        ctx.stage(vybe_core::Op::InsertEvent {
            id: event_id,
            kind: event::kind::MEMORY_TOUCHED.to_string(),
            agent_name: agent.to_string(),
            project_id: None,
            task_id: None,
            message: format!("touched {canonical}"),
            metadata: json!({}),
            created_at: now,
        });
        ctx.stage(vybe_core::Op::TouchMemory {
            id: existing.id.clone(),
            confidence: new_confidence,
            last_seen_at: now,
        });
        let mut result = existing;
        result.confidence = new_confidence;
        result.last_seen_at = now;
        Ok(result)
    })
}

pub fn delete(store: &Store, agent: &str, request_id: &str, key: &str, scope: MemoryScope, scope_id: &str) -> StoreResult<()> {
    let canonical = canonicalize_key(key)
        .ok_or_else(|| StoreError::invalid("key", "canonical key must not be empty"))?;
    let now = Utc::now();
    store.run_idempotent(agent, request_id, "memory.delete", now, |ctx| {
        let Some(existing) = ctx.state().find_active_memory(scope, scope_id, &canonical).cloned() else {
            return Ok(());
        };
        let event_id = ctx.alloc_event_id();
        ctx.stage(vybe_core::Op::InsertEvent {
            id: event_id,
            kind: event::kind::MEMORY_DELETE.to_string(),
            agent_name: agent.to_string(),
            project_id: None,
            task_id: None,
            message: format!("deleted {canonical}"),
            metadata: json!({}),
            created_at: now,
        });
        ctx.stage(vybe_core::Op::DeleteMemory { id: existing.id });
        Ok(())
    })
}

/// Collapse all but the `keep_top` highest-ranked rows in a scope into one
/// summary row.
pub fn compact(
    store: &Store,
    agent: &str,
    request_id: &str,
    scope: MemoryScope,
    scope_id: &str,
    keep_top: usize,
    summary_value: &str,
) -> StoreResult<Option<MemoryId>> {
    let now = Utc::now();
    store.run_idempotent(agent, request_id, "memory.compact", now, |ctx| {
        let mut rows: Vec<Memory> = ctx
            .state()
            .active_memories_in_scope(scope, scope_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.last_seen_at.cmp(&a.last_seen_at))
        });
        if rows.len() <= keep_top {
            return Ok(None);
        }
        let collapsed: Vec<MemoryId> = rows.split_off(keep_top).into_iter().map(|m| m.id).collect();

        let summary_id = MemoryId::new(vybe_core::ids::generate("memory"));
        let canonical = canonicalize_key(&format!("summary_{scope_id}"))
            .unwrap_or_else(|| "summary".to_string());
        let event_id = ctx.alloc_event_id();
        ctx.stage(vybe_core::Op::InsertEvent {
            id: event_id,
            kind: event::kind::MEMORY_COMPACTED.to_string(),
            agent_name: agent.to_string(),
            project_id: None,
            task_id: None,
            message: format!("compacted {} rows in scope", collapsed.len()),
            metadata: json!({"collapsed": collapsed.len()}),
            created_at: now,
        });
        ctx.stage(vybe_core::Op::InsertMemory {
            id: summary_id.clone(),
            key: format!("summary_{scope_id}"),
            canonical_key: canonical,
            value: summary_value.to_string(),
            value_type: ValueType::String,
            scope,
            scope_id: scope_id.to_string(),
            confidence: 1.0,
            last_seen_at: now,
            source_event_id: Some(event_id),
            expires_at: None,
            created_at: now,
        });
        ctx.stage(vybe_core::Op::SupersedeMemories {
            ids: collapsed,
            summary_id: summary_id.clone(),
        });
        Ok(Some(summary_id))
    })
}

/// Hard-delete expired rows, up to `limit`. Maintenance sweep, not
/// idempotency-wrapped (no caller-visible `request_id`).
pub fn gc(store: &Store, agent: &str, limit: usize) -> StoreResult<usize> {
    let now = Utc::now();
    store.transact(|ctx| {
        let expired: Vec<MemoryId> = ctx
            .state()
            .memories
            .values()
            .filter(|m| m.expires_at.map(|e| e < now).unwrap_or(false))
            .take(limit)
            .map(|m| m.id.clone())
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }
        let count = expired.len();
        let event_id = ctx.alloc_event_id();
        ctx.stage(vybe_core::Op::InsertEvent {
            id: event_id,
            kind: event::kind::MEMORY_GC.to_string(),
            agent_name: agent.to_string(),
            project_id: None,
            task_id: None,
            message: format!("gc'd {count} expired memory rows"),
            metadata: json!({"count": count}),
            created_at: now,
        });
        ctx.stage(vybe_core::Op::GcMemories { ids: expired });
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

    #[test]
    fn reinforcement_bumps_confidence_and_canonicalizes() {
        let (_dir, store) = open_store();
        upsert(&store, "a", "r1", MemoryScope::Global, "", " API Key ", "secret", ValueType::String, None, None).unwrap();
        let outcome = upsert(&store, "a", "r2", MemoryScope::Global, "", " API Key ", "secret", ValueType::String, None, None).unwrap();
        assert_eq!(outcome.canonical_key, "api_key");
        assert!(outcome.reinforced);
        assert_eq!(outcome.confidence, 0.55);
    }

    #[test]
    fn empty_canonical_key_is_rejected() {
        let (_dir, store) = open_store();
        let err = upsert(&store, "a", "r1", MemoryScope::Global, "", "---", "x", ValueType::String, None, None);
        assert!(err.is_err());
    }
}
