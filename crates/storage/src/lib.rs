// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Persistence Kernel for the vybe state engine.
//!
//! Durability is realized as a JSONL write-ahead log of [`vybe_core::Op`]s
//! (see [`wal`]) plus a periodically-checkpointed, zstd-compressed,
//! versioned snapshot of [`state::MaterializedState`] (see [`snapshot`] and
//! [`checkpoint`]). [`store::Store`] is the single entry point: it owns the
//! exclusive file lock, the in-memory state behind a `RwLock`, and the
//! `transact` / `run_idempotent` primitives every engine operation is built
//! from.

pub mod checkpoint;
pub mod migration;
pub mod snapshot;
pub mod state;
pub mod store;
pub mod wal;

/// Current on-disk schema version for snapshots. Bump and add a
/// [`migration::Migration`] when `MaterializedState`'s shape changes.
pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

pub use checkpoint::{
    load_snapshot, CheckpointError, CheckpointHandle, CheckpointResult, CheckpointWriter,
    Checkpointer, FsCheckpointWriter,
};
pub use migration::{Migration, MigrationError, MigrationRegistry};
pub use snapshot::{Snapshot, SnapshotError};
pub use state::MaterializedState;
pub use store::{Store, StoreConfig, TransactionCtx};
pub use wal::{Wal, WalEntry, WalError};
