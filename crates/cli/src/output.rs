// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output formatting: text or JSON, selected via the global `-o` flag.

use clap::ValueEnum;
use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Print `value` as pretty JSON, regardless of format — used by callers that
/// have no richer text rendering for a given result.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print either the pre-rendered `text` or `value` as JSON, depending on
/// `format`.
pub fn print(format: OutputFormat, text: impl FnOnce() -> String, value: &impl Serialize) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => {
            println!("{}", text());
            Ok(())
        }
        OutputFormat::Json => print_json(value),
    }
}
