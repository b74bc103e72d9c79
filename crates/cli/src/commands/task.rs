// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `vybe task ...` — thin wrappers over `vybe_engine::task_graph`.

use clap::{Parser, Subcommand};
use vybe_core::{BlockedReason, TaskStatus};
use vybe_storage::Store;

use crate::output::OutputFormat;
use crate::state::resolve_request_id;

#[derive(Parser)]
pub struct TaskArgs {
    #[command(subcommand)]
    pub command: TaskCommand,
}

#[derive(Subcommand)]
pub enum TaskCommand {
    /// Create a task
    Create {
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value_t = 0)]
        priority: i32,
        #[arg(long)]
        project: Option<String>,
        #[arg(long = "request-id")]
        request_id: Option<String>,
    },
    /// Atomically claim the highest-priority eligible pending task
    ClaimNext {
        #[arg(long)]
        project: Option<String>,
        #[arg(long = "ttl-minutes", default_value_t = 5)]
        ttl_minutes: i64,
        #[arg(long = "request-id")]
        request_id: Option<String>,
    },
    /// Claim a specific task
    Claim {
        task_id: String,
        #[arg(long = "ttl-minutes", default_value_t = 5)]
        ttl_minutes: i64,
        #[arg(long = "request-id")]
        request_id: Option<String>,
    },
    /// Extend an active claim's expiry
    Heartbeat {
        task_id: String,
        #[arg(long = "ttl-minutes", default_value_t = 5)]
        ttl_minutes: i64,
        #[arg(long = "request-id")]
        request_id: Option<String>,
    },
    /// Change a task's status
    Status {
        task_id: String,
        #[arg(value_parser = parse_status)]
        status: TaskStatus,
        /// `dependency`, `failure:<text>`, or omitted for none
        #[arg(long = "blocked-reason")]
        blocked_reason: Option<String>,
        #[arg(long = "request-id")]
        request_id: Option<String>,
    },
    /// Add a dependency edge (task depends on `on`)
    AddDependency {
        task_id: String,
        on: String,
        #[arg(long = "request-id")]
        request_id: Option<String>,
    },
}

pub fn parse_status(s: &str) -> Result<TaskStatus, String> {
    match s {
        "pending" => Ok(TaskStatus::Pending),
        "in_progress" => Ok(TaskStatus::InProgress),
        "completed" => Ok(TaskStatus::Completed),
        "blocked" => Ok(TaskStatus::Blocked),
        other => Err(format!(
            "invalid status '{other}': expected pending, in_progress, completed, or blocked"
        )),
    }
}

pub fn handle(store: &Store, agent: &str, format: OutputFormat, cmd: TaskCommand) -> anyhow::Result<()> {
    match cmd {
        TaskCommand::Create {
            title,
            description,
            priority,
            project,
            request_id,
        } => {
            let task = vybe_engine::task_graph::create(
                store,
                agent,
                &resolve_request_id(request_id),
                vybe_engine::NewTask {
                    title,
                    description,
                    priority,
                    project_id: project,
                },
            )?;
            crate::output::print(format, || format!("created {} ({})", task.id, task.title), &task)
        }
        TaskCommand::ClaimNext {
            project,
            ttl_minutes,
            request_id,
        } => {
            let task = vybe_engine::task_graph::claim_next(
                store,
                agent,
                &resolve_request_id(request_id),
                project.as_deref(),
                ttl_minutes,
            )?;
            match &task {
                Some(t) => crate::output::print(format, || format!("claimed {} ({})", t.id, t.title), &task),
                None => crate::output::print(format, || "no claimable task".to_string(), &task),
            }
        }
        TaskCommand::Claim {
            task_id,
            ttl_minutes,
            request_id,
        } => {
            let task = vybe_engine::task_graph::claim(
                store,
                agent,
                &resolve_request_id(request_id),
                &task_id,
                ttl_minutes,
            )?;
            crate::output::print(format, || format!("claimed {}", task.id), &task)
        }
        TaskCommand::Heartbeat {
            task_id,
            ttl_minutes,
            request_id,
        } => {
            let task = vybe_engine::task_graph::heartbeat(
                store,
                agent,
                &resolve_request_id(request_id),
                &task_id,
                ttl_minutes,
            )?;
            crate::output::print(format, || format!("heartbeat ok, expires {:?}", task.claim_expires_at), &task)
        }
        TaskCommand::Status {
            task_id,
            status,
            blocked_reason,
            request_id,
        } => {
            let reason = blocked_reason.map(|s| BlockedReason::from_str(&s));
            let task = vybe_engine::task_graph::set_status(
                store,
                agent,
                &resolve_request_id(request_id),
                &task_id,
                status,
                reason,
            )?;
            crate::output::print(format, || format!("{} -> {}", task.id, task.status), &task)
        }
        TaskCommand::AddDependency {
            task_id,
            on,
            request_id,
        } => {
            let task = vybe_engine::task_graph::add_dependency(
                store,
                agent,
                &resolve_request_id(request_id),
                &task_id,
                &on,
            )?;
            crate::output::print(format, || format!("{} now depends on {}", task.id, on), &task)
        }
    }
}
