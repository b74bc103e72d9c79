// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable retrospective-job queue and the rule-only lesson extractor.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::json;
use vybe_core::{
    backoff_seconds, event, Event, MemoryScope, RetroJobId, RetroJobStatus, RetrospectiveJob,
    StoreResult, ValueType,
};
use vybe_storage::{MaterializedState, Store, TransactionCtx};

use crate::memory_store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LessonKind {
    Correction,
    Knowledge,
}

#[derive(Debug, Clone)]
pub struct Lesson {
    pub kind: LessonKind,
    pub key: String,
    pub value: String,
}

/// Pure function over event kinds in `[since_event_id, until_event_id]`:
/// a correction lesson per tool whose `tool_failure` events recur at least
/// twice, plus one knowledge lesson if any `task_status` event completed a
/// task.
pub fn extract_lessons(events: &[Event], since_event_id: u64, until_event_id: u64) -> Vec<Lesson> {
    let window: Vec<&Event> = events
        .iter()
        .filter(|e| e.id > since_event_id && e.id <= until_event_id)
        .collect();

    let mut failures_by_tool: std::collections::BTreeMap<String, u32> = Default::default();
    let mut completed_any = false;

    for event in &window {
        if event.kind == "tool_failure" {
            let tool = event
                .metadata
                .get("tool")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string();
            *failures_by_tool.entry(tool).or_insert(0) += 1;
        }
        if event.kind == event::kind::TASK_STATUS && event.metadata.get("to").and_then(|v| v.as_str()) == Some("completed") {
            completed_any = true;
        }
    }

    let mut lessons = Vec::new();
    for (tool, count) in failures_by_tool {
        if count >= 2 {
            lessons.push(Lesson {
                kind: LessonKind::Correction,
                key: format!("tool_failure_{tool}"),
                value: format!("tool {tool} failed {count} times in this session; double-check its usage"),
            });
        }
    }
    if completed_any {
        lessons.push(Lesson {
            kind: LessonKind::Knowledge,
            key: "session_outcome".to_string(),
            value: "this session completed at least one task".to_string(),
        });
    }
    lessons
}

pub fn enqueue_idempotent(
    store: &Store,
    agent: &str,
    request_id: &str,
    project: Option<&str>,
    session: Option<&str>,
    max_attempts: u32,
) -> StoreResult<RetroJobId> {
    let now = Utc::now();
    store.run_idempotent(agent, request_id, "retro.enqueue", now, |ctx| {
        let since_event_id = ctx
            .state()
            .agent_states
            .get(agent)
            .map(|a| a.last_seen_event_id)
            .unwrap_or(0);
        let until_event_id = ctx
            .state()
            .events
            .iter()
            .filter(|e| !e.archived)
            .filter(|e| match project {
                Some(p) => e.project_id.as_ref().map(|pid| pid.as_str() == p).unwrap_or(false),
                None => true,
            })
            .map(|e| e.id)
            .max()
            .unwrap_or(since_event_id);

        let id = RetroJobId::new(vybe_core::ids::generate("retro_job"));
        ctx.stage(vybe_core::Op::EnqueueRetroJob {
            id: id.clone(),
            agent_name: agent.to_string(),
            project_id: project.map(Into::into),
            session_id: session.map(str::to_string),
            since_event_id,
            until_event_id,
            max_attempts,
            created_at: now,
        });
        ctx.stage(vybe_core::Op::InsertEvent {
            id: ctx.alloc_event_id(),
            kind: event::kind::RETRO_ENQUEUED.to_string(),
            agent_name: agent.to_string(),
            project_id: project.map(Into::into),
            task_id: None,
            message: format!("enqueued retrospective job {id}"),
            metadata: json!({"since_event_id": since_event_id, "until_event_id": until_event_id}),
            created_at: now,
        });
        Ok(id)
    })
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum JobOutcome {
    NoneDue,
    Succeeded,
    Retried,
    Dead,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RunOneResult {
    pub processed: bool,
    pub outcome: JobOutcome,
    pub job: Option<RetrospectiveJob>,
}

fn pick_due_job<'a>(state: &'a MaterializedState, now: DateTime<Utc>) -> Option<&'a RetrospectiveJob> {
    state
        .retro_jobs
        .values()
        .filter(|j| j.status == RetroJobStatus::Queued && j.next_run_at <= now)
        .min_by(|a, b| a.next_run_at.cmp(&b.next_run_at).then_with(|| a.id.as_str().cmp(b.id.as_str())))
}

/// Memory key under which a lesson is stored, tagged with its kind so
/// downstream readers (resume/brief) can tell a correction from a plain
/// knowledge note apart without re-running the extractor.
fn retro_memory_key(lesson: &Lesson) -> String {
    format!("{}:{}", lesson.kind_label(), lesson.key)
}

/// Upsert every extracted lesson as a project-scoped memory. Lessons are
/// dropped (never promoted to `global`) when the job's project is unknown.
/// Fallible: a canonicalization or upsert failure here must NOT roll back
/// the claim staged by the caller, so `run_one` catches this result rather
/// than propagating it out of the transaction.
fn apply_lessons(
    ctx: &mut TransactionCtx<'_>,
    job: &RetrospectiveJob,
    lessons: &[Lesson],
    now: DateTime<Utc>,
) -> StoreResult<()> {
    let Some(project_id) = &job.project_id else {
        return Ok(());
    };
    for lesson in lessons {
        let key = retro_memory_key(lesson);
        let canonical = vybe_core::canonicalize_key(&key)
            .ok_or_else(|| vybe_core::StoreError::invalid("key", "canonical key must not be empty"))?;
        memory_store::apply_upsert(
            ctx,
            &job.agent_name,
            MemoryScope::Project,
            project_id.as_str(),
            &key,
            &canonical,
            &lesson.value,
            ValueType::String,
            None,
            None,
            None,
            now,
        )?;
    }
    Ok(())
}

/// Claim the oldest due job, run the rule-only extractor over its window,
/// and apply the resulting success/retry/dead transition. Not keyed on a
/// caller `request_id`: this is a worker-side maintenance sweep, safe to
/// run concurrently from multiple workers (the claim step is the CAS).
///
/// A failure while persisting lessons never rolls back the claim: it is
/// downgraded to a retry (with backoff, mirroring `release_expired`) or, at
/// `max_attempts`, a dead job with `last_error` set.
pub fn run_one(store: &Store, worker: &str, lease_seconds: i64) -> StoreResult<RunOneResult> {
    let now = Utc::now();
    store.transact(|ctx| {
        let Some(job) = pick_due_job(ctx.state(), now).cloned() else {
            return Ok(RunOneResult {
                processed: false,
                outcome: JobOutcome::NoneDue,
                job: None,
            });
        };

        ctx.stage(vybe_core::Op::ClaimRetroJob {
            id: job.id.clone(),
            claimed_by: worker.to_string(),
            claim_expires_at: now + ChronoDuration::seconds(lease_seconds),
            updated_at: now,
        });

        let lessons = extract_lessons(&ctx.state().events, job.since_event_id, job.until_event_id);

        match apply_lessons(ctx, &job, &lessons, now) {
            Ok(()) => {
                ctx.stage(vybe_core::Op::RetroJobSucceeded {
                    id: job.id.clone(),
                    completed_at: now,
                });
                ctx.stage(vybe_core::Op::InsertEvent {
                    id: ctx.alloc_event_id(),
                    kind: event::kind::RETRO_COMPLETED.to_string(),
                    agent_name: worker.to_string(),
                    project_id: job.project_id.clone(),
                    task_id: None,
                    message: format!("retrospective job {} completed with {} lessons", job.id, lessons.len()),
                    metadata: json!({"lesson_count": lessons.len()}),
                    created_at: now,
                });

                let mut result_job = job.clone();
                result_job.status = RetroJobStatus::Succeeded;
                Ok(RunOneResult {
                    processed: true,
                    outcome: JobOutcome::Succeeded,
                    job: Some(result_job),
                })
            }
            Err(err) => {
                let attempt = job.attempt + 1;
                let last_error = err.to_string();
                let mut result_job = job.clone();
                result_job.last_error = Some(last_error.clone());
                result_job.attempt = attempt;

                if attempt >= job.max_attempts {
                    ctx.stage(vybe_core::Op::RetroJobDead {
                        id: job.id.clone(),
                        last_error,
                        updated_at: now,
                    });
                    result_job.status = RetroJobStatus::Dead;
                    Ok(RunOneResult {
                        processed: true,
                        outcome: JobOutcome::Dead,
                        job: Some(result_job),
                    })
                } else {
                    ctx.stage(vybe_core::Op::RetroJobRetry {
                        id: job.id.clone(),
                        next_run_at: now + ChronoDuration::seconds(backoff_seconds(attempt)),
                        last_error,
                        updated_at: now,
                    });
                    result_job.status = RetroJobStatus::Queued;
                    Ok(RunOneResult {
                        processed: true,
                        outcome: JobOutcome::Retried,
                        job: Some(result_job),
                    })
                }
            }
        }
    })
}

/// Re-queue (or kill) jobs whose worker claimed them and then vanished
/// without completing, mirroring `task_graph::release_expired`. Each
/// re-queue consumes one retry attempt with exponential backoff; a job
/// already at `max_attempts` goes `dead` instead.
pub fn release_expired(store: &Store) -> StoreResult<Vec<RetroJobId>> {
    let now = Utc::now();
    store.transact(|ctx| {
        let expired: Vec<RetrospectiveJob> = ctx
            .state()
            .retro_jobs
            .values()
            .filter(|j| j.status == RetroJobStatus::Claimed && j.claim_expires_at.map(|e| e < now).unwrap_or(false))
            .cloned()
            .collect();
        let mut ids = Vec::new();
        for job in expired {
            let attempt = job.attempt + 1;
            if attempt >= job.max_attempts {
                ctx.stage(vybe_core::Op::RetroJobDead {
                    id: job.id.clone(),
                    last_error: "worker lease expired".to_string(),
                    updated_at: now,
                });
            } else {
                ctx.stage(vybe_core::Op::RetroJobRetry {
                    id: job.id.clone(),
                    next_run_at: now + ChronoDuration::seconds(backoff_seconds(attempt)),
                    last_error: "worker lease expired".to_string(),
                    updated_at: now,
                });
            }
            ids.push(job.id);
        }
        Ok(ids)
    })
}

impl Lesson {
    /// String tag persisted as part of the lesson's memory key so a
    /// correction can be told apart from a plain knowledge note.
    pub fn kind_label(&self) -> &'static str {
        match self.kind {
            LessonKind::Correction => "correction",
            LessonKind::Knowledge => "knowledge",
        }
    }
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

    fn emit(ctx: &mut TransactionCtx<'_>, kind: &str, metadata: serde_json::Value, now: DateTime<Utc>) {
        let id = ctx.alloc_event_id();
        ctx.stage(vybe_core::Op::InsertEvent {
            id,
            kind: kind.to_string(),
            agent_name: "agent".to_string(),
            project_id: None,
            task_id: None,
            message: "m".to_string(),
            metadata,
            created_at: now,
        });
    }

    #[test]
    fn extract_lessons_flags_repeated_tool_failures() {
        let (_dir, store) = open_store();
        let now = Utc::now();
        store
            .transact(|ctx| {
                emit(ctx, "tool_failure", json!({"tool": "grep"}), now);
                emit(ctx, "tool_failure", json!({"tool": "grep"}), now);
                Ok(())
            })
            .unwrap();
        let events = store.read().events.clone();
        let lessons = extract_lessons(&events, 0, 2);
        assert_eq!(lessons.len(), 1);
        assert_eq!(lessons[0].kind, LessonKind::Correction);
    }

    #[test]
    fn enqueue_and_run_one_completes_job() {
        let (_dir, store) = open_store();
        enqueue_idempotent(&store, "agent", "r1", Some("proj_1"), None, 3).unwrap();
        let result = run_one(&store, "worker1", 60).unwrap();
        assert_eq!(result.outcome, JobOutcome::Succeeded);
    }

    #[test]
    fn run_one_is_noop_when_nothing_due() {
        let (_dir, store) = open_store();
        let result = run_one(&store, "worker1", 60).unwrap();
        assert_eq!(result.outcome, JobOutcome::NoneDue);
    }

    fn emit_scoped(ctx: &mut TransactionCtx<'_>, kind: &str, metadata: serde_json::Value, project_id: &str, now: DateTime<Utc>) {
        let id = ctx.alloc_event_id();
        ctx.stage(vybe_core::Op::InsertEvent {
            id,
            kind: kind.to_string(),
            agent_name: "agent".to_string(),
            project_id: Some(project_id.into()),
            task_id: None,
            message: "m".to_string(),
            metadata,
            created_at: now,
        });
    }

    #[test]
    fn run_one_persists_lesson_kind_in_the_memory_key() {
        let (_dir, store) = open_store();
        let now = Utc::now();
        store
            .transact(|ctx| {
                emit_scoped(ctx, "tool_failure", json!({"tool": "grep"}), "proj_1", now);
                emit_scoped(ctx, "tool_failure", json!({"tool": "grep"}), "proj_1", now);
                emit_scoped(ctx, event::kind::TASK_STATUS, json!({"to": "completed"}), "proj_1", now);
                Ok(())
            })
            .unwrap();

        enqueue_idempotent(&store, "agent", "r1", Some("proj_1"), None, 3).unwrap();
        let result = run_one(&store, "worker1", 60).unwrap();
        assert_eq!(result.outcome, JobOutcome::Succeeded);

        let state = store.read();
        let canonical_keys: Vec<&str> = state.memories.values().map(|m| m.canonical_key.as_str()).collect();
        assert!(canonical_keys.iter().any(|k| k.starts_with("correction_")), "{canonical_keys:?}");
        assert!(canonical_keys.iter().any(|k| k.starts_with("knowledge_")), "{canonical_keys:?}");
    }

    #[test]
    fn release_expired_retries_under_max_attempts_and_kills_at_max() {
        let (_dir, store) = open_store();
        let id = enqueue_idempotent(&store, "agent", "r1", Some("proj_1"), None, 1).unwrap();
        let now = Utc::now();

        store
            .transact(|ctx| {
                ctx.stage(vybe_core::Op::ClaimRetroJob {
                    id: id.clone(),
                    claimed_by: "stale-worker".to_string(),
                    claim_expires_at: now - ChronoDuration::seconds(1),
                    updated_at: now,
                });
                Ok(())
            })
            .unwrap();

        release_expired(&store).unwrap();

        let state = store.read();
        let job = state.retro_jobs.get(id.as_str()).unwrap();
        assert_eq!(job.status, RetroJobStatus::Dead);
        assert_eq!(job.last_error.as_deref(), Some("worker lease expired"));
    }
}
