// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One row per agent: its cursor into the event log and current focus.

use crate::ids::{ProjectId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub agent_name: String,
    pub last_seen_event_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus_task_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus_project_id: Option<ProjectId>,
    pub version: u64,
    pub last_active_at: DateTime<Utc>,
}

impl AgentState {
    pub fn new(agent_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            agent_name: agent_name.into(),
            last_seen_event_id: 0,
            focus_task_id: None,
            focus_project_id: None,
            version: 0,
            last_active_at: now,
        }
    }
}
