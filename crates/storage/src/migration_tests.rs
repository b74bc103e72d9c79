// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

struct AddFieldMigration;

impl Migration for AddFieldMigration {
    fn source_version(&self) -> u32 {
        1
    }

    fn target_version(&self) -> u32 {
        2
    }

    fn migrate(&self, snapshot: &mut Value) -> Result<(), MigrationError> {
        if let Some(obj) = snapshot.as_object_mut() {
            obj.entry("added_by_migration")
                .or_insert_with(|| json!(true));
        }
        Ok(())
    }
}

#[test]
fn no_op_when_already_current() {
    let registry = MigrationRegistry::new();
    let snap = json!({"version": 1, "seq": 0});
    let out = registry.migrate_to(snap.clone(), 1).unwrap();
    assert_eq!(out, snap);
}

#[test]
fn errors_when_snapshot_is_newer_than_supported() {
    let registry = MigrationRegistry::new();
    let snap = json!({"version": 5, "seq": 0});
    let err = registry.migrate_to(snap, 1).unwrap_err();
    assert!(matches!(err, MigrationError::TooNew(5, 1)));
}

#[test]
fn errors_when_no_migration_path_exists() {
    let registry = MigrationRegistry::new();
    let snap = json!({"version": 1, "seq": 0});
    let err = registry.migrate_to(snap, 2).unwrap_err();
    assert!(matches!(err, MigrationError::NoPath(1, 2)));
}

#[test]
fn chains_a_registered_migration_and_bumps_version() {
    let registry = MigrationRegistry {
        migrations: vec![Box::new(AddFieldMigration)],
    };
    let snap = json!({"version": 1, "seq": 0});
    let out = registry.migrate_to(snap, 2).unwrap();
    assert_eq!(out["version"], json!(2));
    assert_eq!(out["added_by_migration"], json!(true));
}
