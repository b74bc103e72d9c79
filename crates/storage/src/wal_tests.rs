// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use vybe_core::ids::TaskId;
use vybe_core::Op;

fn sample_op(priority: i32) -> Op {
    Op::SetTaskPriority {
        task_id: TaskId::new("task_1"),
        priority,
        new_version: priority as u64,
    }
}

#[test]
fn append_then_flush_assigns_monotonic_seq() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.wal");
    let mut wal = Wal::open(&path, 0).unwrap();

    let seq1 = wal.append(&sample_op(1)).unwrap();
    let seq2 = wal.append(&sample_op(2)).unwrap();
    assert_eq!(seq1, 1);
    assert_eq!(seq2, 2);

    wal.flush().unwrap();
    let entries = wal.entries_after(0).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].seq, 1);
    assert_eq!(entries[1].seq, 2);
}

#[test]
fn reopen_resumes_write_seq_from_scan() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.wal");
    {
        let mut wal = Wal::open(&path, 0).unwrap();
        wal.append(&sample_op(1)).unwrap();
        wal.append(&sample_op(2)).unwrap();
        wal.flush().unwrap();
    }

    let wal = Wal::open(&path, 0).unwrap();
    assert_eq!(wal.write_seq(), 2);
}

#[test]
fn next_unprocessed_advances_past_processed_seq() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.wal");
    let mut wal = Wal::open(&path, 0).unwrap();
    wal.append(&sample_op(1)).unwrap();
    wal.append(&sample_op(2)).unwrap();
    wal.flush().unwrap();

    let first = wal.next_unprocessed().unwrap().unwrap();
    assert_eq!(first.seq, 1);
    wal.mark_processed(1);

    let second = wal.next_unprocessed().unwrap().unwrap();
    assert_eq!(second.seq, 2);
}

#[test]
fn truncate_before_drops_processed_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.wal");
    let mut wal = Wal::open(&path, 0).unwrap();
    wal.append(&sample_op(1)).unwrap();
    wal.append(&sample_op(2)).unwrap();
    wal.append(&sample_op(3)).unwrap();
    wal.flush().unwrap();
    wal.mark_processed(2);

    wal.truncate_before(3).unwrap();
    let remaining = wal.entries_after(0).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].seq, 3);
}

#[test]
fn corrupt_tail_is_rotated_to_bak_and_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.wal");
    {
        let mut wal = Wal::open(&path, 0).unwrap();
        wal.append(&sample_op(1)).unwrap();
        wal.flush().unwrap();
    }
    // append a line of garbage directly
    use std::io::Write;
    let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    writeln!(f, "not json at all").unwrap();

    let wal = Wal::open(&path, 0).unwrap();
    assert_eq!(wal.write_seq(), 1);
    assert!(path.with_extension("bak").exists());
}
