// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `vybe retro ...` — retrospective job queue, manually drivable outside
//! of `vybed`'s own tick loop (mainly useful for tests and one-off runs).

use clap::{Parser, Subcommand};
use vybe_storage::Store;

use crate::output::OutputFormat;
use crate::state::resolve_request_id;

#[derive(Parser)]
pub struct RetroArgs {
    #[command(subcommand)]
    pub command: RetroCommand,
}

#[derive(Subcommand)]
pub enum RetroCommand {
    /// Enqueue a retrospective job over events since the agent's last run
    Enqueue {
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        session: Option<String>,
        #[arg(long = "max-attempts", default_value_t = 3)]
        max_attempts: u32,
        #[arg(long = "request-id")]
        request_id: Option<String>,
    },
    /// Claim and process a single due job
    Run {
        #[arg(long = "lease-seconds", default_value_t = 60)]
        lease_seconds: i64,
    },
}

pub fn handle(store: &Store, agent: &str, format: OutputFormat, cmd: RetroCommand) -> anyhow::Result<()> {
    match cmd {
        RetroCommand::Enqueue {
            project,
            session,
            max_attempts,
            request_id,
        } => {
            let id = vybe_engine::enqueue_idempotent(
                store,
                agent,
                &resolve_request_id(request_id),
                project.as_deref(),
                session.as_deref(),
                max_attempts,
            )?;
            crate::output::print(format, || format!("enqueued {id}"), &id)
        }
        RetroCommand::Run { lease_seconds } => {
            let result = vybe_engine::run_one(store, agent, lease_seconds)?;
            crate::output::print(format, || format!("{:?}", result.outcome), &result)
        }
    }
}
