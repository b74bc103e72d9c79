// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `vybe push` — batched mutation against the event log, memory store,
//! artifacts, and task status in one idempotent transaction.

use clap::Parser;
use vybe_core::{BlockedReason, ValueType};
use vybe_engine::{ArtifactInput, MemoryInput, PushInput, TaskStatusInput};
use vybe_storage::Store;

use crate::commands::memory::parse_scope;
use crate::commands::task::parse_status;
use crate::output::OutputFormat;
use crate::state::resolve_request_id;

/// `scope:scope_id:key=value` — scope_id may be empty (`global::key=value`).
fn parse_memory(s: &str) -> Result<MemoryInput, String> {
    let (scope_part, rest) = s.split_once(':').ok_or("expected scope:scope_id:key=value")?;
    let (scope_id, rest) = rest.split_once(':').ok_or("expected scope:scope_id:key=value")?;
    let (key, value) = rest.split_once('=').ok_or("expected scope:scope_id:key=value")?;
    Ok(MemoryInput {
        scope: parse_scope(scope_part)?,
        scope_id: scope_id.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        value_type: ValueType::String,
        confidence: None,
    })
}

/// `path:content_type`.
fn parse_artifact(s: &str) -> Result<ArtifactInput, String> {
    let (path, content_type) = s.split_once(':').ok_or("expected path:content_type")?;
    Ok(ArtifactInput {
        file_path: path.to_string(),
        content_type: content_type.to_string(),
    })
}

#[derive(Parser)]
pub struct PushArgs {
    #[arg(long = "task-id")]
    task_id: Option<String>,
    #[arg(long = "event-kind")]
    event_kind: Option<String>,
    #[arg(long = "event-message", default_value = "")]
    event_message: String,
    /// JSON object; defaults to `{}`
    #[arg(long = "event-metadata")]
    event_metadata: Option<String>,
    #[arg(long = "memory", value_parser = parse_memory)]
    memories: Vec<MemoryInput>,
    #[arg(long = "artifact", value_parser = parse_artifact)]
    artifacts: Vec<ArtifactInput>,
    #[arg(long = "status", value_parser = parse_status)]
    status: Option<vybe_core::TaskStatus>,
    #[arg(long = "blocked-reason")]
    blocked_reason: Option<String>,
    #[arg(long = "request-id")]
    request_id: Option<String>,
}

pub fn handle(store: &Store, agent: &str, format: OutputFormat, args: PushArgs) -> anyhow::Result<()> {
    let metadata = match args.event_metadata.as_deref() {
        Some(s) => serde_json::from_str(s)?,
        None => serde_json::json!({}),
    };
    let event = args.event_kind.map(|kind| (kind, args.event_message, metadata));
    let task_status = args.status.map(|status| TaskStatusInput {
        status,
        blocked_reason: args.blocked_reason.map(|s| BlockedReason::from_str(&s)),
    });

    let input = PushInput {
        task_id: args.task_id,
        event,
        memories: args.memories,
        artifacts: args.artifacts,
        task_status,
    };

    let result = vybe_engine::push(store, agent, &resolve_request_id(args.request_id), input)?;
    crate::output::print(
        format,
        || {
            format!(
                "event={:?} memories={} artifacts={} task_version={:?}",
                result.event_id,
                result.memory_ids.len(),
                result.artifact_ids.len(),
                result.task_version
            )
        },
        &result,
    )
}
