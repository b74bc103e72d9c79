// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Artifact rows: files an agent produced, always linked to the event
//! that logged them.

use crate::ids::{ArtifactId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub task_id: TaskId,
    pub event_id: u64,
    pub file_path: String,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}
