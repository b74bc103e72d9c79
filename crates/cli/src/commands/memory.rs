// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `vybe memory ...` — thin wrappers over `vybe_engine::memory_store`.

use clap::{Parser, Subcommand};
use vybe_core::{MemoryScope, ValueType};
use vybe_storage::Store;

use crate::output::OutputFormat;
use crate::state::resolve_request_id;

#[derive(Parser)]
pub struct MemoryArgs {
    #[command(subcommand)]
    pub command: MemoryCommand,
}

#[derive(Subcommand)]
pub enum MemoryCommand {
    /// Upsert a scoped memory entry (reinforces on an identical value)
    Set {
        #[arg(long, value_parser = parse_scope, default_value = "global")]
        scope: MemoryScope,
        #[arg(long = "scope-id", default_value = "")]
        scope_id: String,
        key: String,
        value: String,
        #[arg(long = "type", value_parser = parse_value_type, default_value = "string")]
        value_type: ValueType,
        #[arg(long)]
        confidence: Option<f32>,
        #[arg(long = "request-id")]
        request_id: Option<String>,
    },
    /// Read one memory entry
    Get {
        key: String,
        #[arg(long, value_parser = parse_scope, default_value = "global")]
        scope: MemoryScope,
        #[arg(long = "scope-id", default_value = "")]
        scope_id: String,
    },
    /// List memory entries in a scope
    List {
        #[arg(long, value_parser = parse_scope, default_value = "global")]
        scope: MemoryScope,
        #[arg(long = "scope-id", default_value = "")]
        scope_id: String,
    },
}

pub fn parse_scope(s: &str) -> Result<MemoryScope, String> {
    match s {
        "global" => Ok(MemoryScope::Global),
        "project" => Ok(MemoryScope::Project),
        "task" => Ok(MemoryScope::Task),
        "agent" => Ok(MemoryScope::Agent),
        other => Err(format!("invalid scope '{other}': expected global, project, task, or agent")),
    }
}

pub fn parse_value_type(s: &str) -> Result<ValueType, String> {
    match s {
        "string" => Ok(ValueType::String),
        "json" => Ok(ValueType::Json),
        "int" => Ok(ValueType::Int),
        "float" => Ok(ValueType::Float),
        "bool" => Ok(ValueType::Bool),
        other => Err(format!(
            "invalid value type '{other}': expected string, json, int, float, or bool"
        )),
    }
}

pub fn handle(store: &Store, agent: &str, format: OutputFormat, cmd: MemoryCommand) -> anyhow::Result<()> {
    match cmd {
        MemoryCommand::Set {
            scope,
            scope_id,
            key,
            value,
            value_type,
            confidence,
            request_id,
        } => {
            let outcome = vybe_engine::memory_store::upsert(
                store,
                agent,
                &resolve_request_id(request_id),
                scope,
                &scope_id,
                &key,
                &value,
                value_type,
                confidence,
                None,
            )?;
            let summary = serde_json::json!({
                "event_id": outcome.event_id,
                "memory_id": outcome.memory_id,
                "reinforced": outcome.reinforced,
                "confidence": outcome.confidence,
                "canonical_key": outcome.canonical_key,
            });
            crate::output::print(
                format,
                || {
                    if outcome.reinforced {
                        format!("reinforced {} (confidence {:.2})", outcome.canonical_key, outcome.confidence)
                    } else {
                        format!("set {} (confidence {:.2})", outcome.canonical_key, outcome.confidence)
                    }
                },
                &summary,
            )
        }
        MemoryCommand::Get { key, scope, scope_id } => {
            let memory = vybe_engine::memory_store::get(store, &key, scope, &scope_id);
            match &memory {
                Some(m) => crate::output::print(format, || format!("{} = {}", m.key, m.value), &memory),
                None => crate::output::print(format, || "not found".to_string(), &memory),
            }
        }
        MemoryCommand::List { scope, scope_id } => {
            let memories = vybe_engine::memory_store::list(store, scope, &scope_id);
            crate::output::print(
                format,
                || {
                    memories
                        .iter()
                        .map(|m| format!("{}: {} ({:.2})", m.key, m.value, m.confidence))
                        .collect::<Vec<_>>()
                        .join("\n")
                },
                &memories,
            )
        }
    }
}
