// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! vybe daemon (`vybed`)
//!
//! Long-lived process that owns write access to the state directory: each
//! tick it reclaims expired task/retro claims, drains a bounded batch of due
//! retrospective jobs, and checkpoints when the WAL has grown past threshold.
//!
//! A CLI invocation does not need `vybed` running — it may open the store
//! directly for a single short-lived transaction, taking the same file lock
//! for its duration. `vybed` exists for deployments that want the
//! maintenance sweeps running continuously in the background.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod config;
mod logging;

use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

use config::Config;
use vybe_core::StoreError;
use vybe_storage::{Store, StoreConfig};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("vybed {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                print_help();
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: vybed [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;

    logging::rotate_log_if_needed(&config.log_path);
    logging::write_startup_marker(&config)?;
    let log_guard = logging::setup_logging(&config)?;

    info!("starting vybe daemon");

    let store_config = {
        let mut c = StoreConfig::new(&config.state_dir);
        c.busy_timeout = config.busy_timeout;
        c.checkpoint_wal_threshold = config.checkpoint_wal_threshold;
        c
    };

    let store = match Store::open(store_config) {
        Ok(store) => store,
        Err(e) if is_lock_contention(&e) => {
            eprintln!("vybed is already running");
            let pid = std::fs::read_to_string(&config.pid_path)
                .unwrap_or_default()
                .trim()
                .to_string();
            if !pid.is_empty() {
                eprintln!("  pid: {pid}");
            }
            std::process::exit(1);
        }
        Err(e) => {
            logging::write_startup_error(&config, &e);
            error!("failed to start daemon: {}", e);
            drop(log_guard);
            return Err(e.into());
        }
    };

    std::fs::write(&config.pid_path, format!("{}\n", std::process::id()))?;

    println!("READY");
    info!(state_dir = %config.state_dir.display(), "daemon ready");

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut tick = tokio::time::interval(config.tick_interval);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                if let Err(e) = run_tick(&store, &config) {
                    error!("tick failed: {}", e);
                }
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down...");
                break;
            }
            _ = sigint.recv() => {
                info!("received SIGINT, shutting down...");
                break;
            }
        }
    }

    match store.checkpoint() {
        Ok(Some(seq)) => info!(seq, "final checkpoint complete"),
        Ok(None) => {}
        Err(e) => warn!("final checkpoint failed: {}", e),
    }
    let _ = std::fs::remove_file(&config.pid_path);

    info!("daemon stopped");
    Ok(())
}

/// One daemon tick: reclaim expired leases, drain a bounded batch of due
/// retrospective jobs, then checkpoint if the WAL has grown past threshold.
fn run_tick(store: &Store, config: &Config) -> Result<(), StoreError> {
    let released_tasks = vybe_engine::task_graph::release_expired(store)?;
    if !released_tasks.is_empty() {
        info!(count = released_tasks.len(), "released expired task claims");
    }

    let released_jobs = vybe_engine::retrospective::release_expired(store)?;
    if !released_jobs.is_empty() {
        info!(count = released_jobs.len(), "released expired retro claims");
    }

    let mut processed = 0;
    for _ in 0..config.retro_batch_size {
        let result = vybe_engine::run_one(
            store,
            "vybed",
            config.claim_ttl_default.as_secs() as i64,
        )?;
        if result.outcome == vybe_engine::JobOutcome::NoneDue {
            break;
        }
        processed += 1;
    }
    if processed > 0 {
        info!(processed, "drained retrospective jobs");
    }

    if let Some(seq) = store.maybe_checkpoint()? {
        info!(seq, "checkpoint complete");
    }

    Ok(())
}

fn is_lock_contention(e: &StoreError) -> bool {
    matches!(e, StoreError::StoreUnavailable(msg) if msg.contains("could not acquire exclusive lock"))
}

fn print_help() {
    println!("vybed {}", env!("CARGO_PKG_VERSION"));
    println!("vybe daemon - background maintenance loop for the vybe state directory");
    println!();
    println!("USAGE:");
    println!("    vybed");
    println!();
    println!("vybed is optional: the vybe CLI may open the state directory directly");
    println!("for a single short-lived transaction without a daemon running. Run");
    println!("vybed when you want claim-reclaim, retrospective-job, and checkpoint");
    println!("maintenance to happen continuously in the background.");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help       Print help information");
    println!("    -v, --version    Print version information");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_contention_detected_from_message() {
        let e = StoreError::StoreUnavailable(
            "could not acquire exclusive lock on /tmp/x within 5s — another process is holding the store open".to_string(),
        );
        assert!(is_lock_contention(&e));
    }

    #[test]
    fn other_store_unavailable_not_treated_as_contention() {
        let e = StoreError::StoreUnavailable("disk full".to_string());
        assert!(!is_lock_contention(&e));
    }
}
