// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: XDG state directory resolution plus the store/claim
//! tunables every tick of the daemon loop depends on.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine state directory: set VYBE_STATE_DIR, XDG_STATE_HOME, or HOME")]
    NoStateDir,
}

/// Daemon configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. `~/.local/state/vybe`). Passed straight
    /// through to `vybe_storage::StoreConfig::state_dir`.
    pub state_dir: PathBuf,
    /// Path to the daemon's rotating log file.
    pub log_path: PathBuf,
    /// Path to the daemon's pid file (status display only; the store's own
    /// `vybe.lock` is what actually enforces single-writer access).
    pub pid_path: PathBuf,
    /// How long to wait for the store's exclusive file lock before giving up.
    pub busy_timeout: Duration,
    /// Number of WAL entries past which a tick should trigger a checkpoint.
    pub checkpoint_wal_threshold: u64,
    /// Default claim lease length handed to `claim_next`/`release_expired`.
    pub claim_ttl_default: Duration,
    /// Default `event_limit` for resume/brief reads.
    pub event_limit_default: u32,
    /// How often the daemon loop ticks (reclaim + drain + maybe-checkpoint).
    pub tick_interval: Duration,
    /// Max retrospective jobs drained per tick.
    pub retro_batch_size: u32,
}

impl Config {
    /// Load configuration for the user-level daemon.
    ///
    /// Uses fixed paths under `~/.local/state/vybe/` (or `$XDG_STATE_HOME/vybe/`),
    /// mirroring the reference daemon's `Config::load()`. One daemon serves all
    /// projects for a user.
    pub fn load() -> Result<Self, ConfigError> {
        let state_dir = state_dir()?;

        Ok(Self {
            log_path: state_dir.join("daemon.log"),
            pid_path: state_dir.join("daemon.pid"),
            state_dir,
            busy_timeout: env_secs("VYBE_BUSY_TIMEOUT_SECS").unwrap_or(Duration::from_secs(5)),
            checkpoint_wal_threshold: std::env::var("VYBE_CHECKPOINT_WAL_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),
            claim_ttl_default: env_secs("VYBE_CLAIM_TTL_SECS").unwrap_or(Duration::from_secs(300)),
            event_limit_default: std::env::var("VYBE_EVENT_LIMIT_DEFAULT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),
            tick_interval: env_secs("VYBE_TICK_INTERVAL_SECS").unwrap_or(Duration::from_secs(5)),
            retro_batch_size: std::env::var("VYBE_RETRO_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
        })
    }
}

fn env_secs(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Resolve state directory: `VYBE_STATE_DIR` > `XDG_STATE_HOME/vybe` > `~/.local/state/vybe`.
fn state_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(dir) = std::env::var("VYBE_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("vybe"));
    }
    let home = std::env::var("HOME").map_err(|_| ConfigError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/vybe"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial(vybe_state_dir_env)]
    fn state_dir_honors_vybe_state_dir_override() {
        std::env::set_var("VYBE_STATE_DIR", "/tmp/vybe-test-state");
        let dir = state_dir().unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/vybe-test-state"));
        std::env::remove_var("VYBE_STATE_DIR");
    }
}
