//! Queue import/export and clipboard list parsing.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

use crate::error::QueueError;

/// Suggested file name for exported queues.
pub const EXPORT_FILE_NAME: &str = "prompt-queue.json";

/// A prompt the user can paste into the chat to get back a list this tool
/// can import from the clipboard.
pub const HELPER_PROMPT: &str = "Generate a list of prompts that I can use with a prompt queue tool.

IMPORTANT: Format your response as a simple list with each prompt on its own line. Do not use numbers, bullets, or any prefixes. Just one prompt per line.

Example of correct format:
Write a short story about a time traveler stuck in ancient Rome
Explain how photosynthesis works in simple terms
Create a list of 10 innovative business ideas
Design a solution for reducing food waste in restaurants
Compare and contrast Python and JavaScript for web development

Generate 10 diverse and interesting prompts to generate images of animals, include at start \"generate image of\"";

static NUMBERED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\.\s*").unwrap());
static BULLET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[-•*]\s*").unwrap());
static CHECKBOX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\[\s*\]\s*").unwrap());

/// Import/export file: `{"queue": [...], "waitTime": 5000}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueFile {
    pub queue: Vec<String>,
    /// Settle wait in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_time: Option<u64>,
}

impl QueueFile {
    /// Pretty-printed JSON, as written by export.
    pub fn to_json_pretty(&self) -> Result<String, QueueError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse an import file.
    ///
    /// `queue` must be a list of strings. `waitTime` is optional and only
    /// honoured when numeric; other fields are ignored.
    pub fn parse(text: &str) -> Result<Self, QueueError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| QueueError::Unreadable(e.to_string()))?;
        Self::from_value(&value)
    }

    fn from_value(value: &Value) -> Result<Self, QueueError> {
        let queue = value
            .get("queue")
            .and_then(Value::as_array)
            .ok_or(QueueError::InvalidQueueFile)?
            .iter()
            .map(|item| item.as_str().map(str::to_owned))
            .collect::<Option<Vec<_>>>()
            .ok_or(QueueError::InvalidQueueFile)?;

        let wait_time = value
            .get("waitTime")
            .and_then(Value::as_f64)
            .filter(|ms| ms.is_finite() && *ms >= 0.0)
            .map(|ms| ms.round() as u64);

        Ok(Self { queue, wait_time })
    }
}

/// Turn clipboard text into queue entries.
///
/// Accepted forms:
/// - a JSON array of strings,
/// - the export file shape,
/// - free text: a single line is one message; with several lines each
///   non-empty line is one message with list markup (`1.`, `-`, `•`, `*`,
///   `[ ]`) stripped.
///
/// JSON entries are trimmed; blank and non-string entries are skipped.
pub fn parse_clipboard(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        let items = match &value {
            Value::Array(items) => Some(items),
            Value::Object(map) => map.get("queue").and_then(Value::as_array),
            _ => None,
        };
        if let Some(items) = items {
            return items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect();
        }
    }

    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if lines.len() == 1 {
        return vec![lines[0].to_string()];
    }

    lines
        .into_iter()
        .map(strip_list_marker)
        .filter(|line| !line.is_empty())
        .collect()
}

fn strip_list_marker(line: &str) -> String {
    let line = NUMBERED.replace(line, "");
    let line = BULLET.replace(&line, "");
    let line = CHECKBOX.replace(&line, "");
    line.trim().to_string()
}
