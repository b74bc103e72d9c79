// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task graph row types.

use crate::ids::{ProjectId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Blocked => write!(f, "blocked"),
        }
    }
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed)
    }
}

/// Reason a task is blocked. Empty string is "not blocked"; the dependency
/// variant serializes as `"dependency"`; failure carries free text.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlockedReason {
    #[default]
    None,
    Dependency,
    Failure(String),
}

impl BlockedReason {
    pub fn as_str(&self) -> String {
        match self {
            BlockedReason::None => String::new(),
            BlockedReason::Dependency => "dependency".to_string(),
            BlockedReason::Failure(text) => format!("failure:{text}"),
        }
    }

    pub fn from_str(s: &str) -> Self {
        if s.is_empty() {
            BlockedReason::None
        } else if s == "dependency" {
            BlockedReason::Dependency
        } else if let Some(text) = s.strip_prefix("failure:") {
            BlockedReason::Failure(text.to_string())
        } else {
            BlockedReason::Failure(s.to_string())
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, BlockedReason::Failure(_))
    }

    pub fn is_dependency(&self) -> bool {
        matches!(self, BlockedReason::Dependency)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    #[serde(default)]
    pub blocked_reason: BlockedReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attempt: u32,
    #[serde(default)]
    pub depends_on: BTreeSet<TaskId>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn is_claim_active(&self, now: DateTime<Utc>) -> bool {
        match (&self.claimed_by, self.claim_expires_at) {
            (Some(_), Some(expires)) => expires > now,
            _ => false,
        }
    }

    pub fn release_claim(&mut self) {
        self.claimed_by = None;
        self.claimed_at = None;
        self.claim_expires_at = None;
        self.last_heartbeat_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_reason_round_trips_through_string_form() {
        for reason in [
            BlockedReason::None,
            BlockedReason::Dependency,
            BlockedReason::Failure("tool timeout".into()),
        ] {
            let s = reason.as_str();
            assert_eq!(BlockedReason::from_str(&s), reason);
        }
    }

    #[test]
    fn claim_is_inactive_once_expired() {
        let now = Utc::now();
        let task = Task {
            id: TaskId::new("task_1"),
            title: "t".into(),
            description: String::new(),
            status: TaskStatus::InProgress,
            priority: 0,
            project_id: None,
            blocked_reason: BlockedReason::None,
            claimed_by: Some("agent1".into()),
            claimed_at: Some(now - chrono::Duration::minutes(10)),
            claim_expires_at: Some(now - chrono::Duration::minutes(5)),
            last_heartbeat_at: None,
            attempt: 1,
            depends_on: Default::default(),
            version: 1,
            created_at: now,
            updated_at: now,
        };
        assert!(!task.is_claim_active(now));
    }
}
