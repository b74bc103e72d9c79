// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable queue rows for deferred session-analysis jobs.

use crate::ids::{ProjectId, RetroJobId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetroJobStatus {
    Queued,
    Claimed,
    Succeeded,
    Dead,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrospectiveJob {
    pub id: RetroJobId,
    pub agent_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub since_event_id: u64,
    pub until_event_id: u64,
    pub status: RetroJobStatus,
    pub attempt: u32,
    pub max_attempts: u32,
    pub next_run_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Exponential backoff schedule: 30s, 60s, 120s, ... capped at 300s.
pub fn backoff_seconds(attempt: u32) -> i64 {
    let secs = 30i64.saturating_mul(1i64 << attempt.min(4));
    secs.min(300)
}
