// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `Store`: the single entry point to the Persistence Kernel.
//!
//! Owns the exclusive OS-level file lock for the state directory, the
//! write-ahead log, and the in-memory [`MaterializedState`] behind a
//! `parking_lot::RwLock`. Exposes exactly one write primitive
//! ([`Store::transact`]) and two policy helpers built on top of it
//! ([`Store::run_idempotent`], [`Store::run_idempotent_with_retry`]).

use crate::checkpoint::{load_snapshot, CheckpointError, Checkpointer};
use crate::wal::Wal;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use vybe_core::{Op, StoreError, StoreResult};

use crate::state::MaterializedState;

/// Tunables for opening a [`Store`]. Mirrors the ambient `Config` the
/// daemon loads from its XDG state directory.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub state_dir: PathBuf,
    pub busy_timeout: Duration,
    /// WAL size (entry count) past which the daemon's background loop
    /// should trigger a checkpoint.
    pub checkpoint_wal_threshold: u64,
}

impl StoreConfig {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            busy_timeout: Duration::from_secs(5),
            checkpoint_wal_threshold: 1000,
        }
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir.join("vybe.lock")
    }

    fn wal_path(&self) -> PathBuf {
        self.state_dir.join("events.wal")
    }

    fn snapshot_path(&self) -> PathBuf {
        self.state_dir.join("snapshot.zst")
    }
}

/// Read-only / stage-only handle passed into a `transact` closure.
///
/// Reads see the state as it was when the transaction began; staged ops
/// are buffered and only applied (and only made durable) once the closure
/// returns `Ok`.
pub struct TransactionCtx<'a> {
    state: &'a MaterializedState,
    ops: Vec<Op>,
    next_event_id: u64,
}

impl<'a> TransactionCtx<'a> {
    fn new(state: &'a MaterializedState) -> Self {
        Self {
            state,
            ops: Vec::new(),
            next_event_id: state.next_event_id,
        }
    }

    /// The committed state as of the start of this transaction.
    pub fn state(&self) -> &MaterializedState {
        self.state
    }

    /// Allocate the next monotonic event id for an `Op::InsertEvent` staged
    /// in this transaction. Must be called at most once per staged event.
    pub fn alloc_event_id(&mut self) -> u64 {
        self.next_event_id += 1;
        self.next_event_id
    }

    /// Buffer an op to be appended to the WAL and applied on commit.
    pub fn stage(&mut self, op: Op) {
        self.ops.push(op);
    }

    fn into_ops(self) -> Vec<Op> {
        self.ops
    }
}

/// The open state directory: exclusive file lock + WAL + materialized state.
pub struct Store {
    config: StoreConfig,
    _lock_file: File,
    wal: parking_lot::Mutex<Wal>,
    state: RwLock<MaterializedState>,
    checkpointer: Checkpointer,
}

impl Store {
    /// Open (creating if absent) the state directory, acquiring the
    /// exclusive lock, loading the snapshot, and replaying the WAL.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        std::fs::create_dir_all(&config.state_dir)
            .map_err(|e| StoreError::StoreUnavailable(e.to_string()))?;

        let lock_file = acquire_exclusive_lock(&config.lock_path(), config.busy_timeout)?;

        let snapshot = load_snapshot(&config.snapshot_path())
            .map_err(|e| StoreError::StoreUnavailable(e.to_string()))?;
        let (seq, mut state) = match snapshot {
            Some(snap) => (snap.seq, snap.state),
            None => (0, MaterializedState::default()),
        };

        let mut wal = Wal::open(&config.wal_path(), seq)
            .map_err(|e| StoreError::StoreUnavailable(e.to_string()))?;
        let replay = wal
            .entries_after(seq)
            .map_err(|e| StoreError::StoreUnavailable(e.to_string()))?;
        let mut last_seq = seq;
        for entry in replay {
            state.apply_op(&entry.op);
            last_seq = entry.seq;
        }
        wal.mark_processed(last_seq);

        let checkpointer = Checkpointer::new(config.snapshot_path());

        Ok(Self {
            config,
            _lock_file: lock_file,
            wal: parking_lot::Mutex::new(wal),
            state: RwLock::new(state),
            checkpointer,
        })
    }

    /// Run a closure against the current state, committing its staged ops
    /// atomically (single WAL flush + in-memory apply) if it returns `Ok`.
    /// Never nests: `TransactionCtx` exposes no way to start another
    /// transaction.
    pub fn transact<F, R>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&mut TransactionCtx) -> StoreResult<R>,
    {
        let mut state_guard = self.state.write();
        let mut ctx = TransactionCtx::new(&state_guard);
        let result = f(&mut ctx)?;
        let ops = ctx.into_ops();

        if !ops.is_empty() {
            let mut wal = self.wal.lock();
            for op in &ops {
                wal.append(op)
                    .map_err(|e| StoreError::StoreUnavailable(e.to_string()))?;
            }
            wal.flush()
                .map_err(|e| StoreError::StoreUnavailable(e.to_string()))?;
            for op in &ops {
                state_guard.apply_op(op);
            }
        }

        Ok(result)
    }

    /// Deduplicate a mutation by `(agent, request_id)`. See the Idempotency
    /// Layer design: on a completed replay this returns the stored result
    /// without invoking `body`; on a fresh or reclaimed key it runs `body`
    /// and persists its result, atomically with `body`'s own staged ops.
    pub fn run_idempotent<R, F>(
        &self,
        agent: &str,
        request_id: &str,
        command: &str,
        now: DateTime<Utc>,
        body: F,
    ) -> StoreResult<R>
    where
        R: Serialize + DeserializeOwned,
        F: FnOnce(&mut TransactionCtx) -> StoreResult<R>,
    {
        self.transact(|ctx| {
            let key = (agent.to_string(), request_id.to_string());
            if let Some(record) = ctx.state().idempotency.get(&key) {
                match record.status {
                    vybe_core::IdempotencyStatus::Completed => {
                        let value = serde_json::from_value(record.result.clone()).map_err(|e| {
                            StoreError::IntegrityViolation(format!(
                                "stored idempotency result for {agent}/{request_id} does not \
                                 deserialize: {e}"
                            ))
                        })?;
                        return Ok(value);
                    }
                    vybe_core::IdempotencyStatus::InProgress => {
                        if !record.is_reclaimable(now) {
                            return Err(StoreError::IdempotencyInProgress {
                                agent: agent.to_string(),
                                request_id: request_id.to_string(),
                            });
                        }
                        // Expired in-progress marker: fall through and reclaim.
                    }
                }
            }

            ctx.stage(Op::BeginIdempotency {
                agent_name: agent.to_string(),
                request_id: request_id.to_string(),
                command: command.to_string(),
                created_at: now,
            });

            let result = body(ctx)?;

            let result_json = serde_json::to_value(&result).map_err(|e| {
                StoreError::IntegrityViolation(format!("failed to serialize result: {e}"))
            })?;
            ctx.stage(Op::CompleteIdempotency {
                agent_name: agent.to_string(),
                request_id: request_id.to_string(),
                result: result_json,
                completed_at: now,
            });

            Ok(result)
        })
    }

    /// [`Store::run_idempotent`] wrapped in a bounded retry loop, retrying
    /// only errors for which `is_retryable` returns true (typically
    /// `VersionConflict`).
    pub fn run_idempotent_with_retry<R, F>(
        &self,
        agent: &str,
        request_id: &str,
        command: &str,
        now: DateTime<Utc>,
        max_attempts: u32,
        mut body: F,
    ) -> StoreResult<R>
    where
        R: Serialize + DeserializeOwned,
        F: FnMut(&mut TransactionCtx) -> StoreResult<R>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.run_idempotent(agent, request_id, command, now, |ctx| body(ctx)) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < max_attempts => continue,
                Err(err) => return Err(err),
            }
        }
    }

    /// Read access to the current materialized state.
    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, MaterializedState> {
        self.state.read()
    }

    /// Number of WAL entries written since the last checkpoint.
    pub fn wal_len_since_checkpoint(&self) -> u64 {
        let wal = self.wal.lock();
        wal.write_seq().saturating_sub(wal.processed_seq())
    }

    /// Checkpoint if the WAL has grown past the configured threshold.
    /// Returns `Some(seq)` if a checkpoint actually ran.
    pub fn maybe_checkpoint(&self) -> StoreResult<Option<u64>> {
        if self.wal_len_since_checkpoint() < self.config.checkpoint_wal_threshold {
            return Ok(None);
        }
        self.checkpoint()
    }

    /// Force a checkpoint now: snapshot the current state, fsync it
    /// durably, then truncate the WAL up to the checkpointed sequence.
    pub fn checkpoint(&self) -> StoreResult<Option<u64>> {
        let (seq, state_clone) = {
            let wal = self.wal.lock();
            let state = self.state.read();
            (wal.write_seq(), state.clone())
        };

        self.checkpointer
            .checkpoint_sync(seq, &state_clone)
            .map_err(checkpoint_err_to_store)?;

        let mut wal = self.wal.lock();
        wal.mark_processed(seq);
        wal.truncate_before(seq + 1)
            .map_err(|e| StoreError::StoreUnavailable(e.to_string()))?;

        Ok(Some(seq))
    }
}

fn checkpoint_err_to_store(e: CheckpointError) -> StoreError {
    StoreError::StoreUnavailable(e.to_string())
}

fn acquire_exclusive_lock(path: &Path, timeout: Duration) -> StoreResult<File> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .open(path)
        .map_err(|e| StoreError::StoreUnavailable(e.to_string()))?;

    let start = Instant::now();
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(file),
            Err(_) if start.elapsed() < timeout => {
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(_) => {
                return Err(StoreError::StoreUnavailable(format!(
                    "could not acquire exclusive lock on {} within {:?} — another process is \
                     holding the store open",
                    path.display(),
                    timeout
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vybe_core::ids::TaskId;

    fn cfg(dir: &Path) -> StoreConfig {
        let mut c = StoreConfig::new(dir);
        c.busy_timeout = Duration::from_millis(200);
        c
    }

    #[test]
    fn open_on_empty_dir_starts_from_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(cfg(dir.path())).unwrap();
        assert_eq!(store.read().next_event_id, 0);
    }

    #[test]
    fn transact_commits_ops_and_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Store::open(cfg(dir.path())).unwrap();
            store
                .transact(|ctx| {
                    ctx.stage(Op::CreateTask {
                        id: TaskId::new("task_1"),
                        title: "hello".into(),
                        description: String::new(),
                        priority: 0,
                        project_id: None,
                        created_at: Utc::now(),
                    });
                    Ok(())
                })
                .unwrap();
            store.checkpoint().unwrap();
        }

        let store = Store::open(cfg(dir.path())).unwrap();
        assert!(store.read().tasks.contains_key("task_1"));
    }

    #[test]
    fn transact_rolls_back_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(cfg(dir.path())).unwrap();
        let err = store.transact::<_, ()>(|ctx| {
            ctx.stage(Op::CreateTask {
                id: TaskId::new("task_1"),
                title: "hello".into(),
                description: String::new(),
                priority: 0,
                project_id: None,
                created_at: Utc::now(),
            });
            Err(StoreError::invalid("title", "deliberate failure"))
        });
        assert!(err.is_err());
        assert!(!store.read().tasks.contains_key("task_1"));
    }

    #[test]
    fn run_idempotent_replays_without_rerunning_body() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(cfg(dir.path())).unwrap();
        let now = Utc::now();

        let calls = std::sync::atomic::AtomicU32::new(0);
        let run = |store: &Store| {
            store.run_idempotent::<u32, _>("agent1", "req1", "create_task", now, |ctx| {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                ctx.stage(Op::CreateTask {
                    id: TaskId::new("task_1"),
                    title: "hello".into(),
                    description: String::new(),
                    priority: 0,
                    project_id: None,
                    created_at: now,
                });
                Ok(42)
            })
        };

        assert_eq!(run(&store).unwrap(), 42);
        assert_eq!(run(&store).unwrap(), 42);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(store.read().tasks.len(), 1);
    }

    #[test]
    fn run_idempotent_rejects_concurrent_in_progress_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(cfg(dir.path())).unwrap();
        let now = Utc::now();

        // Manually stage an in-progress marker without completing it, to
        // simulate a crash mid-mutation.
        store
            .transact(|ctx| {
                ctx.stage(Op::BeginIdempotency {
                    agent_name: "agent1".into(),
                    request_id: "req1".into(),
                    command: "create_task".into(),
                    created_at: now,
                });
                Ok(())
            })
            .unwrap();

        let err = store.run_idempotent::<u32, _>("agent1", "req1", "create_task", now, |_ctx| {
            Ok(1)
        });
        assert!(matches!(err, Err(StoreError::IdempotencyInProgress { .. })));
    }

    #[test]
    fn run_idempotent_reclaims_expired_in_progress_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(cfg(dir.path())).unwrap();
        let old = Utc::now() - chrono::Duration::seconds(120);

        store
            .transact(|ctx| {
                ctx.stage(Op::BeginIdempotency {
                    agent_name: "agent1".into(),
                    request_id: "req1".into(),
                    command: "create_task".into(),
                    created_at: old,
                });
                Ok(())
            })
            .unwrap();

        let now = Utc::now();
        let result = store.run_idempotent::<u32, _>("agent1", "req1", "create_task", now, |_ctx| {
            Ok(7)
        });
        assert_eq!(result.unwrap(), 7);
    }
}
