//! Rendered command results. Commands accumulate user-facing notice lines
//! while they work and attach a structured payload; the selected format
//! decides which of the two reaches stdout.

use anyhow::Result;
use clap::ValueEnum;
use serde_json::Value;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable notices.
    Text,
    /// The structured payload, pretty-printed.
    Json,
}

/// Outcome of one command: the notice lines in the order they were
/// produced, plus a payload for machine consumption. Blank lines separate
/// notice blocks from suggestion blocks.
#[derive(Debug)]
pub struct CommandOutput {
    lines: Vec<String>,
    payload: Value,
}

impl CommandOutput {
    pub fn new(notice: impl Into<String>, payload: Value) -> Self {
        Self {
            lines: vec![notice.into()],
            payload,
        }
    }

    pub fn from_lines(lines: Vec<String>, payload: Value) -> Self {
        Self { lines, payload }
    }

    /// The notice text as shown to the user.
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn render(&self, format: OutputFormat) -> Result<()> {
        match format {
            OutputFormat::Text => println!("{}", self.message()),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&self.payload)?),
        }
        Ok(())
    }
}
