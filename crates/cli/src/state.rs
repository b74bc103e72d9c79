// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolve the state directory and open the store for a single invocation.
//!
//! A CLI invocation does not need `vybed` running: it opens the store
//! directly, taking the same exclusive file lock `vybed` would for the
//! duration of its one transaction, then releases it on drop.

use std::path::PathBuf;
use std::time::Duration;

use vybe_storage::{Store, StoreConfig};

/// Resolve state directory: `VYBE_STATE_DIR` > `XDG_STATE_HOME/vybe` > `~/.local/state/vybe`.
pub fn state_dir() -> anyhow::Result<PathBuf> {
    if let Ok(dir) = std::env::var("VYBE_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("vybe"));
    }
    let home = std::env::var("HOME")
        .map_err(|_| anyhow::anyhow!("could not determine state directory: set VYBE_STATE_DIR, XDG_STATE_HOME, or HOME"))?;
    Ok(PathBuf::from(home).join(".local/state/vybe"))
}

pub fn open_store() -> anyhow::Result<Store> {
    let dir = state_dir()?;
    let mut config = StoreConfig::new(&dir);
    if let Ok(secs) = std::env::var("VYBE_BUSY_TIMEOUT_SECS") {
        if let Ok(secs) = secs.parse::<u64>() {
            config.busy_timeout = Duration::from_secs(secs);
        }
    }
    Store::open(config).map_err(|e| anyhow::anyhow!("failed to open vybe store at {}: {e}", dir.display()))
}

/// Resolve the acting agent's name: `--agent` flag > `VYBE_AGENT` env.
pub fn resolve_agent(flag: Option<&str>) -> anyhow::Result<String> {
    if let Some(a) = flag {
        return Ok(a.to_string());
    }
    std::env::var("VYBE_AGENT")
        .map_err(|_| anyhow::anyhow!("no agent identity: pass --agent or set VYBE_AGENT"))
}

/// A `request_id` the caller supplied, or a freshly generated one. The store
/// never generates one on the caller's behalf — the CLI is a caller like any
/// other.
pub fn resolve_request_id(flag: Option<String>) -> String {
    flag.unwrap_or_else(|| vybe_core::ids::generate("req"))
}
