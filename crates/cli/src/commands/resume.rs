// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `vybe resume` / `vybe brief` — the read-heavy continuity path.

use clap::Parser;
use vybe_engine::ResumeOptions;
use vybe_storage::Store;

use crate::output::OutputFormat;
use crate::state::resolve_request_id;

#[derive(Parser)]
pub struct ResumeArgs {
    /// Cap on events returned (default 1000, capped at 1000)
    #[arg(long = "event-limit")]
    event_limit: Option<usize>,
    #[arg(long)]
    project: Option<String>,
    #[arg(long = "request-id")]
    request_id: Option<String>,
}

#[derive(Parser)]
pub struct BriefArgs {
    #[arg(long)]
    project: Option<String>,
}

pub fn handle_resume(store: &Store, agent: &str, format: OutputFormat, args: ResumeArgs) -> anyhow::Result<()> {
    let options = ResumeOptions {
        event_limit: args.event_limit,
        project_dir: args.project,
    };
    let result = vybe_engine::resume(store, agent, &resolve_request_id(args.request_id), options)?;
    crate::output::print(format, || result.prompt.clone(), &result)
}

pub fn handle_brief(store: &Store, agent: &str, format: OutputFormat, args: BriefArgs) -> anyhow::Result<()> {
    let packet = vybe_engine::brief(store, agent, args.project.as_deref());
    crate::output::print(
        format,
        || match &packet.focus_task {
            Some(t) => format!("focus: {} ({})\n{} pending, {} in progress", t.id, t.title, packet.counts.pending, packet.counts.in_progress),
            None => format!("no focus task\n{} pending, {} in progress", packet.counts.pending, packet.counts.in_progress),
        },
        &packet,
    )
}
