//! Prioritized selector tables for the target chat page.
//!
//! Each lookup is an ordered list of [`Strategy`] values evaluated in order;
//! the first one that matches wins. Everything here is plain data and can be
//! loaded from JSON, so following a page redesign means editing a profile.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::QueueError;

/// One way of locating elements on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "expr", rename_all = "lowercase")]
pub enum Strategy {
    Css(String),
    XPath(String),
}

impl Strategy {
    pub fn css(expr: impl Into<String>) -> Self {
        Strategy::Css(expr.into())
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Strategy::XPath(expr.into())
    }

    /// The raw selector expression.
    pub fn expr(&self) -> &str {
        match self {
            Strategy::Css(s) | Strategy::XPath(s) => s,
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Css(s) => write!(f, "css:{}", s),
            Strategy::XPath(s) => write!(f, "xpath:{}", s),
        }
    }
}

/// Heuristics for finding generated images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMatchers {
    /// Image elements to inspect, in order. Matches from every strategy are collected.
    pub selectors: Vec<Strategy>,
    /// Sources containing any of these substrings are ignored.
    pub exclude_src: Vec<String>,
}

impl ImageMatchers {
    /// Whether an image source counts as a generated image.
    pub fn accepts(&self, src: &str) -> bool {
        !src.is_empty() && !self.exclude_src.iter().any(|needle| src.contains(needle.as_str()))
    }
}

/// Everything the driver and detector need to know about the target site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteProfile {
    /// Host the page must be served from (subdomains accepted).
    pub host: String,
    /// Where the CLI navigates before processing.
    pub start_url: String,
    /// The prompt input control.
    pub input: Vec<Strategy>,
    /// The submit control. Disabled matches are skipped.
    pub submit: Vec<Strategy>,
    /// Any match means the response is still being generated.
    pub streaming: Vec<Strategy>,
    /// Assistant-authored message elements; their count is tracked between polls.
    pub assistant_messages: Strategy,
    pub images: ImageMatchers,
}

impl SiteProfile {
    /// Built-in profile for chatgpt.com.
    pub fn chatgpt() -> Self {
        Self {
            host: "chatgpt.com".into(),
            start_url: "https://chatgpt.com/".into(),
            input: vec![
                Strategy::css(r#"#prompt-textarea[contenteditable="true"]"#),
                Strategy::css(r#"div[contenteditable="true"][data-placeholder]"#),
                Strategy::css(r#"textarea[data-id="prompt-textarea"]"#),
                Strategy::css(r#".text-base[contenteditable="true"]"#),
            ],
            submit: vec![
                Strategy::css("#composer-submit-button"),
                Strategy::css(r#"button[data-testid="send-button"]"#),
                Strategy::css(r#"button[aria-label="Send message"]"#),
                Strategy::css(r#"button[aria-label="Send prompt"]"#),
                // Icon-only send button: the button wrapping the large svg icon.
                Strategy::xpath(
                    "//button[.//*[local-name()='svg' and \
                     contains(concat(' ', normalize-space(@class), ' '), ' icon-2xl ')]]",
                ),
            ],
            streaming: vec![
                Strategy::css(r#"button[aria-label="Stop streaming"]"#),
                Strategy::css(r#"button[aria-label="Stop generating"]"#),
                Strategy::css(".result-streaming"),
                Strategy::css(r#"[data-testid="stop-button"]"#),
            ],
            assistant_messages: Strategy::css(r#"[data-message-author-role="assistant"]"#),
            images: ImageMatchers {
                selectors: vec![
                    Strategy::css(r#"img[alt*="Generated"]"#),
                    Strategy::css(r#"img[alt*="Image"]"#),
                    Strategy::css(r#"[data-message-author-role="assistant"] img"#),
                    Strategy::css(".markdown img"),
                    Strategy::css(r#"img[src*="dalle"]"#),
                    Strategy::css(r#"img[src*="oaiusercontent"]"#),
                ],
                exclude_src: vec!["avatar".into(), "logo".into()],
            },
        }
    }

    /// Load a profile from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, QueueError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| QueueError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        let profile: SiteProfile = serde_json::from_str(&raw)?;
        profile.validate()?;
        Ok(profile)
    }

    /// Reject profiles that could never match anything.
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.host.trim().is_empty() {
            return Err(QueueError::InvalidConfig("profile host is empty".into()));
        }
        if self.input.is_empty() {
            return Err(QueueError::InvalidConfig("no input selectors".into()));
        }
        if self.submit.is_empty() {
            return Err(QueueError::InvalidConfig("no submit selectors".into()));
        }
        Ok(())
    }

    /// Whether `host` is the target host or one of its subdomains.
    pub fn matches_host(&self, host: &str) -> bool {
        host == self.host || host.ends_with(&format!(".{}", self.host))
    }
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self::chatgpt()
    }
}
