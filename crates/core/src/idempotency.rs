// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Idempotency ledger rows — one per `(agent_name, request_id)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Mutations are reclaimed from `InProgress` after this many seconds.
pub const IN_PROGRESS_RECLAIM_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyStatus {
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub agent_name: String,
    pub request_id: String,
    pub command: String,
    pub status: IdempotencyStatus,
    #[serde(default)]
    pub result: Value,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl IdempotencyRecord {
    pub fn is_reclaimable(&self, now: DateTime<Utc>) -> bool {
        self.status == IdempotencyStatus::InProgress
            && (now - self.created_at).num_seconds() > IN_PROGRESS_RECLAIM_SECS
    }
}
