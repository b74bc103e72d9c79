// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::MaterializedState;

#[test]
fn checkpoint_sync_writes_a_loadable_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot_path = dir.path().join("snapshot.zst");
    let checkpointer = Checkpointer::new(snapshot_path.clone());

    let state = MaterializedState::default();
    let result = checkpointer.checkpoint_sync(7, &state).unwrap();
    assert_eq!(result.seq, 7);
    assert!(result.size_bytes > 0);

    let loaded = load_snapshot(&snapshot_path).unwrap().unwrap();
    assert_eq!(loaded.seq, 7);
}

#[test]
fn load_snapshot_of_missing_path_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nope.zst");
    assert!(load_snapshot(&path).unwrap().is_none());
}

#[test]
fn background_checkpoint_handle_reports_completion() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot_path = dir.path().join("snapshot.zst");
    let checkpointer = Checkpointer::new(snapshot_path.clone());
    let state = MaterializedState::default();

    let handle = checkpointer.start(3, &state);
    let result = handle.wait().unwrap();
    assert_eq!(result.seq, 3);
    assert!(snapshot_path.exists());
}
