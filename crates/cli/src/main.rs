// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `vybe` — the CLI surface over a local vybe store. Every invocation
//! opens the store directly (see [`state::open_store`]), runs one
//! transaction, and exits; there is no socket protocol to `vybed`.

mod commands;
mod output;
mod state;

use clap::{Parser, Subcommand};

use commands::{memory, push, resume, retro, task};
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "vybe", version, about = "Durable local continuity store for coding agents")]
struct Cli {
    /// Acting agent identity; falls back to VYBE_AGENT
    #[arg(long, global = true)]
    agent: Option<String>,
    #[arg(short = 'o', long = "output", global = true, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull deltas since the agent's last resume and render a prompt
    Resume(resume::ResumeArgs),
    /// Snapshot the agent's current focus without advancing its cursor
    Brief(resume::BriefArgs),
    /// Task graph operations
    Task(task::TaskArgs),
    /// Scoped key/value memory operations
    Memory(memory::MemoryArgs),
    /// Batched event/memory/artifact/status mutation
    Push(push::PushArgs),
    /// Retrospective job queue operations
    Retro(retro::RetroArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let store = state::open_store()?;
    let agent = state::resolve_agent(cli.agent.as_deref())?;
    let format = cli.output;

    match cli.command {
        Commands::Resume(args) => resume::handle_resume(&store, &agent, format, args),
        Commands::Brief(args) => resume::handle_brief(&store, &agent, format, args),
        Commands::Task(args) => task::handle(&store, &agent, format, args.command),
        Commands::Memory(args) => memory::handle(&store, &agent, format, args.command),
        Commands::Push(args) => push::handle(&store, &agent, format, args),
        Commands::Retro(args) => retro::handle(&store, &agent, format, args.command),
    }
}
