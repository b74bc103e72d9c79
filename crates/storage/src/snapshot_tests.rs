// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::MaterializedState;

#[test]
fn save_then_load_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json");
    let snap = Snapshot::new(42, MaterializedState::default());
    snap.save(&path).unwrap();

    let loaded = Snapshot::load(&path).unwrap().unwrap();
    assert_eq!(loaded.seq, 42);
    assert_eq!(loaded.version, crate::CURRENT_SNAPSHOT_VERSION);
}

#[test]
fn load_missing_file_returns_none() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.json");
    assert!(Snapshot::load(&path).unwrap().is_none());
}

#[test]
fn load_corrupt_file_rotates_to_bak_and_returns_none() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json");
    std::fs::write(&path, b"not json").unwrap();

    let result = Snapshot::load(&path).unwrap();
    assert!(result.is_none());
    assert!(path.with_extension("bak").exists());
}

#[test]
fn bak_rotation_keeps_bounded_history() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json");
    for _ in 0..5 {
        std::fs::write(&path, b"not json").unwrap();
        let _ = Snapshot::load(&path);
    }
    assert!(path.with_extension("bak").exists());
    assert!(!path.with_extension("bak.4").exists());
}
