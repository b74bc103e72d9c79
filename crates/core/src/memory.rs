// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scoped memory rows and the canonical-key normalization used for
//! upsert uniqueness.

use crate::ids::MemoryId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryScope {
    Global,
    Project,
    Task,
    Agent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    String,
    Json,
    Int,
    Float,
    Bool,
}

impl ValueType {
    /// Validates `value` is well-formed for this type. Only `Json` does
    /// real parsing work; the others are checked at the call site where
    /// the typed value originates.
    pub fn validate(&self, value: &str) -> Result<(), String> {
        match self {
            ValueType::Json => serde_json::from_str::<serde_json::Value>(value)
                .map(|_| ())
                .map_err(|e| format!("invalid json: {e}")),
            ValueType::Int => value
                .parse::<i64>()
                .map(|_| ())
                .map_err(|e| format!("invalid int: {e}")),
            ValueType::Float => value
                .parse::<f64>()
                .map(|_| ())
                .map_err(|e| format!("invalid float: {e}")),
            ValueType::Bool => value
                .parse::<bool>()
                .map(|_| ())
                .map_err(|e| format!("invalid bool: {e}")),
            ValueType::String => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: MemoryId,
    pub key: String,
    pub canonical_key: String,
    pub value: String,
    pub value_type: ValueType,
    pub scope: MemoryScope,
    pub scope_id: String,
    pub confidence: f32,
    pub last_seen_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_event_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<MemoryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Memory {
    pub fn is_active(&self) -> bool {
        self.superseded_by.is_none()
    }
}

/// Lowercase, collapse runs of non-alphanumeric characters to a single
/// `_`, trim leading/trailing `_`. Returns `None` if nothing alphanumeric
/// remains (an empty canonical key is invalid).
pub fn canonicalize_key(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_sep = true; // suppress leading separator
    for ch in raw.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Clamp a confidence bump into `[0, 1]`.
pub fn clamp_confidence(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_mixed_case_and_punctuation() {
        assert_eq!(
            canonicalize_key(" API Key "),
            Some("api_key".to_string())
        );
        assert_eq!(canonicalize_key("foo--bar"), Some("foo_bar".to_string()));
    }

    #[test]
    fn rejects_keys_with_no_alphanumeric_content() {
        assert_eq!(canonicalize_key("   "), None);
        assert_eq!(canonicalize_key("---"), None);
    }

    #[test]
    fn confidence_clamps_to_unit_interval() {
        assert_eq!(clamp_confidence(1.2), 1.0);
        assert_eq!(clamp_confidence(-0.2), 0.0);
        assert_eq!(clamp_confidence(0.55), 0.55);
    }

    #[test]
    fn value_type_validates_json_payload() {
        assert!(ValueType::Json.validate("{\"a\":1}").is_ok());
        assert!(ValueType::Json.validate("not json").is_err());
        assert!(ValueType::Int.validate("42").is_ok());
        assert!(ValueType::Int.validate("x").is_err());
    }
}
