// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resume/Brief: the read-heavy path that reconstructs an agent's
//! operational picture and renders it as a stable prompt text.

use chrono::Utc;
use vybe_core::{Artifact, Event, Memory, MemoryScope, StoreResult, Task, TaskId, TaskStatus};
use vybe_storage::{MaterializedState, Store};

use crate::agent_state;

const DEFAULT_EVENT_LIMIT: usize = 1000;
const MAX_EVENT_LIMIT: usize = 1000;
const MAX_MEMORIES: usize = 5;
const MAX_RECENT_ACTIVITY: usize = 3;
const MAX_USER_PROMPTS: usize = 5;
const MAX_PIPELINE: usize = 5;
const MAX_UNLOCKS: usize = 5;
const USER_PROMPT_TRUNCATE: usize = 120;

#[derive(Debug, Clone, Default)]
pub struct ResumeOptions {
    pub event_limit: Option<usize>,
    pub project_dir: Option<String>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct TaskCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub blocked: usize,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct BriefPacket {
    pub focus_task: Option<Task>,
    pub memories: Vec<Memory>,
    pub recent_events: Vec<Event>,
    pub artifacts: Vec<Artifact>,
    pub counts: TaskCounts,
    pub pipeline: Vec<Task>,
    pub unlocks: Vec<Task>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ResumeResult {
    pub agent_name: String,
    pub old_cursor: u64,
    pub new_cursor: u64,
    pub deltas: Vec<Event>,
    pub focus_task_id: Option<TaskId>,
    pub focus_project_id: Option<String>,
    pub brief: BriefPacket,
    pub prompt: String,
}

fn project_matches(event: &Event, project: Option<&str>) -> bool {
    match project {
        None => true,
        Some(p) => event.project_id.as_ref().map(|pid| pid.as_str() == p).unwrap_or(true),
    }
}

fn fetch_deltas(state: &MaterializedState, old_cursor: u64, limit: usize, project: Option<&str>) -> Vec<Event> {
    let mut rows: Vec<Event> = state
        .events
        .iter()
        .filter(|e| e.id > old_cursor && project_matches(e, project))
        .cloned()
        .collect();
    rows.sort_by_key(|e| e.id);
    rows.truncate(limit);
    rows
}

/// Pick the highest-priority unblocked pending task in `project`, same
/// tie-break as `task_graph::claim_next`.
fn pick_pending<'a>(state: &'a MaterializedState, project: Option<&str>) -> Option<&'a Task> {
    state
        .tasks
        .values()
        .filter(|t| t.status == TaskStatus::Pending)
        .filter(|t| t.depends_on.iter().all(|d| is_completed(state, d.as_str())))
        .filter(|t| match project {
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

fn is_completed(state: &MaterializedState, task_id: &str) -> bool {
    state.get_task(task_id).map(|t| t.status == TaskStatus::Completed).unwrap_or(false)
}

fn oldest_pending(state: &MaterializedState) -> Option<&Task> {
    state
        .tasks
        .values()
        .filter(|t| t.status == TaskStatus::Pending)
        .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.as_str().cmp(b.id.as_str())))
}

/// Deterministic focus-selection: first matching rule wins.
fn select_focus(
    state: &MaterializedState,
    old_focus_task: Option<&str>,
    focus_project: Option<&str>,
    deltas: &[Event],
) -> Option<TaskId> {
    if let Some(task_id) = old_focus_task {
        if let Some(task) = state.get_task(task_id) {
            if task.status == TaskStatus::InProgress {
                return Some(task.id.clone());
            }
            if task.status == TaskStatus::Blocked {
                if task.blocked_reason.is_dependency() {
                    return Some(task.id.clone());
                }
                // failure:* blocked tasks fall through and are dropped.
            }
        }
    }

    for delta in deltas.iter().rev() {
        if delta.kind == vybe_core::event::kind::AGENT_FOCUS {
            if let Some(task_id) = &delta.task_id {
                if let Some(task) = state.get_task(task_id.as_str()) {
                    if !task.status.is_terminal() {
                        return Some(task.id.clone());
                    }
                }
            }
        }
    }

    if let Some(task) = pick_pending(state, focus_project) {
        return Some(task.id.clone());
    }

    if focus_project.is_none() {
        if let Some(task) = oldest_pending(state) {
            return Some(task.id.clone());
        }
    }

    None
}

fn build_brief(state: &MaterializedState, focus_task_id: Option<&str>, focus_project: Option<&str>) -> BriefPacket {
    let focus_task = focus_task_id.and_then(|id| state.get_task(id)).cloned();

    let mut memories: Vec<Memory> = state
        .memories
        .values()
        .filter(|m| m.is_active())
        .filter(|m| match m.scope {
            MemoryScope::Agent => false,
            MemoryScope::Global => true,
            MemoryScope::Project => focus_project.map(|p| m.scope_id == p).unwrap_or(false),
            MemoryScope::Task => focus_task_id.map(|t| m.scope_id == t).unwrap_or(false),
        })
        .cloned()
        .collect();
    memories.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.last_seen_at.cmp(&a.last_seen_at))
    });
    memories.truncate(MAX_MEMORIES);

    let recent_events = if let Some(task_id) = focus_task_id {
        let mut rows: Vec<Event> = state
            .events
            .iter()
            .filter(|e| e.task_id.as_ref().map(|x| x.as_str()) == Some(task_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.id.cmp(&a.id));
        rows.truncate(MAX_RECENT_ACTIVITY);
        rows
    } else {
        Vec::new()
    };

    let artifacts = if let Some(task_id) = focus_task_id {
        let mut rows: Vec<Artifact> = state.artifacts.values().filter(|a| a.task_id.as_str() == task_id).cloned().collect();
        rows.sort_by_key(|a| a.event_id);
        rows
    } else {
        Vec::new()
    };

    let mut counts = TaskCounts::default();
    for task in state.tasks.values() {
        if let Some(p) = focus_project {
            if task.project_id.as_ref().map(|x| x.as_str()) != Some(p) {
                continue;
            }
        }
        match task.status {
            TaskStatus::Pending => counts.pending += 1,
            TaskStatus::InProgress => counts.in_progress += 1,
            TaskStatus::Completed => counts.completed += 1,
            TaskStatus::Blocked => counts.blocked += 1,
        }
    }

    let mut pipeline: Vec<Task> = state
        .tasks
        .values()
        .filter(|t| t.status == TaskStatus::Pending)
        .filter(|t| focus_task.as_ref().map(|f| t.id != f.id).unwrap_or(true))
        .filter(|t| match focus_project {
            Some(p) => t.project_id.as_ref().map(|x| x.as_str()) == Some(p),
            None => true,
        })
        .cloned()
        .collect();
    pipeline.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.as_str().cmp(b.id.as_str()))
    });
    pipeline.truncate(MAX_PIPELINE);

    let unlocks: Vec<Task> = if let Some(focus) = &focus_task {
        let mut rows: Vec<Task> = state
            .dependents_of(focus.id.as_str())
            .into_iter()
            .filter_map(|id| state.get_task(&id))
            .filter(|t| {
                t.status == TaskStatus::Blocked
                    && t.depends_on.iter().all(|d| d.as_str() == focus.id.as_str() || is_completed(state, d.as_str()))
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        rows.truncate(MAX_UNLOCKS);
        rows
    } else {
        Vec::new()
    };

    BriefPacket {
        focus_task,
        memories,
        recent_events,
        artifacts,
        counts,
        pipeline,
        unlocks,
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

fn build_prompt(state: &MaterializedState, brief: &BriefPacket, focus_project: Option<&str>) -> String {
    let mut out = String::new();
    out.push_str("== VYBE (task tracker) ==\n");

    match &brief.focus_task {
        Some(task) => {
            out.push_str(&format!(
                "Current task: [{}] {} (priority {}, status {})\n",
                task.id, task.title, task.priority, task.status
            ));
            if !task.description.is_empty() {
                out.push_str(&format!("  {}\n", task.description));
            }
        }
        None => out.push_str("Current task: (none)\n"),
    }

    if !brief.memories.is_empty() {
        out.push_str("\nSaved notes:\n");
        for memory in brief.memories.iter().take(MAX_MEMORIES) {
            out.push_str(&format!("  - {}: {}\n", memory.key, memory.value));
        }
    }

    if !brief.recent_events.is_empty() {
        out.push_str("\nRecent activity:\n");
        for event in brief.recent_events.iter().take(MAX_RECENT_ACTIVITY) {
            out.push_str(&format!("  - {}\n", event.message));
        }
    }

    let user_prompts: Vec<&Event> = state
        .events
        .iter()
        .filter(|e| e.kind == "user_prompt" && !e.archived)
        .filter(|e| project_matches(e, focus_project))
        .collect();
    let mut user_prompts = user_prompts;
    user_prompts.sort_by(|a, b| b.id.cmp(&a.id));
    if !user_prompts.is_empty() {
        out.push_str("\nRecent user prompts:\n");
        for event in user_prompts.iter().take(MAX_USER_PROMPTS) {
            out.push_str(&format!("  - {}\n", truncate_chars(&event.message, USER_PROMPT_TRUNCATE)));
        }
    }

    if let Some(task) = &brief.focus_task {
        let reasoning: Vec<&Event> = state
            .events
            .iter()
            .filter(|e| e.kind == "reasoning" && e.task_id.as_ref().map(|x| x.as_str()) == Some(task.id.as_str()))
            .collect();
        if let Some(last) = reasoning.iter().max_by_key(|e| e.id) {
            if let Some(intent) = last.metadata.get("intent").and_then(|v| v.as_str()) {
                out.push_str(&format!("\nPrior reasoning: {intent}\n"));
            }
        }
    }

    if !brief.pipeline.is_empty() || !brief.unlocks.is_empty() {
        out.push_str("\nPipeline / unlocks:\n");
        for task in &brief.pipeline {
            out.push_str(&format!("  - next: [{}] {}\n", task.id, task.title));
        }
        for task in &brief.unlocks {
            out.push_str(&format!("  - unlocks: [{}] {}\n", task.id, task.title));
        }
    }

    out.push_str(&format!(
        "\nCounts: pending={} in_progress={} completed={} blocked={}\n",
        brief.counts.pending, brief.counts.in_progress, brief.counts.completed, brief.counts.blocked
    ));

    out.push_str("\n== COMMANDS (run in Bash) ==\n");
    out.push_str(&format!("1. vybe task claim-next --request-id cmd_$RANDOM{}\n",
        focus_project.map(|p| format!(" --project {p}")).unwrap_or_default()));
    if let Some(task) = &brief.focus_task {
        out.push_str(&format!("2. vybe task status {} completed --request-id cmd_$RANDOM\n", task.id));
    }
    out.push_str("3. vybe memory set <key> <value> --request-id cmd_$RANDOM\n");

    out
}

pub fn brief(store: &Store, agent: &str, project_dir: Option<&str>) -> BriefPacket {
    let state = store.read();
    let agent_state = state.agent_states.get(agent);
    let focus_project = project_dir
        .map(str::to_string)
        .or_else(|| agent_state.and_then(|a| a.focus_project_id.as_ref().map(|p| p.as_str().to_string())));
    let focus_task = agent_state.and_then(|a| a.focus_task_id.as_ref().map(|t| t.as_str().to_string()));
    build_brief(&state, focus_task.as_deref(), focus_project.as_deref())
}

pub fn resume(
    store: &Store,
    agent: &str,
    request_id: &str,
    options: ResumeOptions,
) -> StoreResult<ResumeResult> {
    let event_limit = options.event_limit.unwrap_or(DEFAULT_EVENT_LIMIT).min(MAX_EVENT_LIMIT);

    // Read phase, outside any transaction.
    let (old_cursor, old_focus_task, mut focus_project) = {
        let state = store.read();
        match state.agent_states.get(agent) {
            Some(a) => (
                a.last_seen_event_id,
                a.focus_task_id.as_ref().map(|t| t.as_str().to_string()),
                a.focus_project_id.as_ref().map(|p| p.as_str().to_string()),
            ),
            None => (0, None, None),
        }
    };
    if let Some(dir) = &options.project_dir {
        focus_project = Some(dir.clone());
    }

    let (deltas, new_cursor, focus_task_id) = {
        let state = store.read();
        let deltas = fetch_deltas(&state, old_cursor, event_limit, focus_project.as_deref());
        let new_cursor = deltas.iter().map(|e| e.id).fold(old_cursor, u64::max);
        let focus = select_focus(&state, old_focus_task.as_deref(), focus_project.as_deref(), &deltas);
        (deltas, new_cursor, focus)
    };

    let mut brief_packet = {
        let state = store.read();
        build_brief(&state, focus_task_id.as_ref().map(|t| t.as_str()), focus_project.as_deref())
    };

    let now = Utc::now();
    let committed = store.run_idempotent(agent, request_id, "resume", now, |ctx| {
        agent_state::apply_update(
            ctx,
            agent,
            new_cursor,
            focus_task_id.as_ref().map(|t| t.as_str()),
            focus_project.as_deref(),
            now,
        )
    })?;

    let authoritative_focus_task = committed.focus_task_id.as_ref().map(|t| t.as_str().to_string());
    let authoritative_focus_project = committed.focus_project_id.as_ref().map(|p| p.as_str().to_string());

    if authoritative_focus_task != focus_task_id.as_ref().map(|t| t.as_str().to_string())
        || authoritative_focus_project != focus_project
    {
        let state = store.read();
        brief_packet = build_brief(&state, authoritative_focus_task.as_deref(), authoritative_focus_project.as_deref());
    }

    let prompt = {
        let state = store.read();
        build_prompt(&state, &brief_packet, authoritative_focus_project.as_deref())
    };

    Ok(ResumeResult {
        agent_name: agent.to_string(),
        old_cursor,
        new_cursor: committed.last_seen_event_id,
        deltas,
        focus_task_id: committed.focus_task_id.clone(),
        focus_project_id: authoritative_focus_project,
        brief: brief_packet,
        prompt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task_graph::{self, NewTask};
    use tempfile::tempdir;
    use vybe_storage::StoreConfig;

    fn open_store() -> (tempfile::TempDir, Store) {
        let dir = tempdir().unwrap();
        let store = Store::open(StoreConfig::new(dir.path())).unwrap();
        (dir, store)
    }

    #[test]
    fn resume_picks_highest_priority_pending_as_focus() {
        let (_dir, store) = open_store();
        task_graph::create(&store, "agent1", "r1", NewTask { title: "low".into(), priority: 1, ..Default::default() }).unwrap();
        let high = task_graph::create(&store, "agent1", "r2", NewTask { title: "high".into(), priority: 5, ..Default::default() }).unwrap();

        let result = resume(&store, "agent1", "resume1", ResumeOptions::default()).unwrap();
        assert_eq!(result.focus_task_id.unwrap(), high.id);
        assert!(result.prompt.contains("== VYBE (task tracker) =="));
    }

    #[test]
    fn resume_is_idempotent_on_request_id() {
        let (_dir, store) = open_store();
        task_graph::create(&store, "agent1", "r1", NewTask { title: "a".into(), ..Default::default() }).unwrap();
        let first = resume(&store, "agent1", "resume1", ResumeOptions::default()).unwrap();
        let second = resume(&store, "agent1", "resume1", ResumeOptions::default()).unwrap();
        assert_eq!(first.new_cursor, second.new_cursor);
        assert_eq!(first.focus_task_id, second.focus_task_id);
    }

    #[test]
    fn in_progress_focus_task_is_kept() {
        let (_dir, store) = open_store();
        let t = task_graph::create(&store, "agent1", "r1", NewTask { title: "a".into(), ..Default::default() }).unwrap();
        task_graph::claim(&store, "agent1", "r2", t.id.as_str(), 5).unwrap();
        agent_state::update_atomic(&store, "agent1", 0, Some(t.id.as_str())).unwrap();

        let another = task_graph::create(&store, "agent1", "r3", NewTask { title: "b".into(), priority: 10, ..Default::default() }).unwrap();
        let _ = another;

        let result = resume(&store, "agent1", "resume1", ResumeOptions::default()).unwrap();
        assert_eq!(result.focus_task_id.unwrap(), t.id);
    }
}
