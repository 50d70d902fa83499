//! Runtime configuration, loaded from JSON.
//!
//! Every field has a default, so an empty object (or a missing file) yields a
//! working configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::error::{Result, SuggestError};
use crate::similarity::Metric;

/// Directory name under the platform config dir
const CONFIG_DIR: &str = "command-suggester";

/// Default config file name
const CONFIG_FILE: &str = "config.json";

/// How a reply is compared against the confirmation tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConfirmMatch {
    /// The trimmed message must equal a token
    #[default]
    Exact,
    /// The trimmed message must start with a token
    Prefix,
}

/// Texts used to build suggestion prompts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PromptText {
    /// Opening of the question
    pub lead: String,
    /// Placed between candidate names
    pub separator: String,
    pub open_quote: String,
    pub close_quote: String,
    /// Closes the question
    pub terminator: String,
    /// Default suffix of a single-candidate prompt
    pub confirm_hint: String,
}

impl Default for PromptText {
    fn default() -> Self {
        Self {
            lead: "您要找的是不是".to_string(),
            separator: "或".to_string(),
            open_quote: "“".to_string(),
            close_quote: "”".to_string(),
            terminator: "？".to_string(),
            confirm_hint: "回复句号以使用推测的指令。".to_string(),
        }
    }
}

impl PromptText {
    /// Render the "did you mean" question for the given spellings.
    pub fn question<S: AsRef<str>>(&self, names: &[S]) -> String {
        let quoted: Vec<String> = names
            .iter()
            .map(|n| format!("{}{}{}", self.open_quote, n.as_ref(), self.close_quote))
            .collect();
        format!("{}{}{}", self.lead, quoted.join(&self.separator), self.terminator)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SuggestConfig {
    /// Minimum similarity a command needs to be suggested
    pub min_similarity: f64,

    /// Similarity metric
    pub metric: Metric,

    /// Command prefixes; required in channels, optional in private chats
    pub prefixes: Vec<String>,

    /// Replies that apply a pending suggestion
    pub confirm_tokens: Vec<String>,

    pub confirm_match: ConfirmMatch,

    /// Seconds a pending suggestion stays armed
    pub confirm_timeout_secs: u64,

    pub prompt: PromptText,
}

impl Default for SuggestConfig {
    fn default() -> Self {
        Self {
            min_similarity: 0.64,
            metric: Metric::default(),
            prefixes: vec!["/".to_string()],
            confirm_tokens: vec![".".to_string(), "。".to_string()],
            confirm_match: ConfirmMatch::Exact,
            confirm_timeout_secs: 60,
            prompt: PromptText::default(),
        }
    }
}

impl SuggestConfig {
    /// Reject settings that would make lookups meaningless.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_similarity) {
            return Err(SuggestError::InvalidThreshold(self.min_similarity));
        }
        if self.confirm_tokens.iter().all(|t| t.trim().is_empty()) {
            return Err(SuggestError::NoConfirmTokens);
        }
        if self.confirm_timeout_secs == 0 {
            return Err(SuggestError::ZeroTimeout);
        }
        Ok(())
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    /// Whether `message` applies a pending suggestion.
    pub fn is_affirmative(&self, message: &str) -> bool {
        let message = message.trim();
        self.confirm_tokens
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .any(|t| match self.confirm_match {
                ConfirmMatch::Exact => message == t,
                ConfirmMatch::Prefix => message.starts_with(t),
            })
    }

    /// Strip a command prefix. Channel messages without one are not commands.
    pub fn strip_prefix<'m>(&self, message: &'m str, private: bool) -> Option<&'m str> {
        let message = message.trim_start();
        for prefix in &self.prefixes {
            if !prefix.is_empty() {
                if let Some(rest) = message.strip_prefix(prefix.as_str()) {
                    return Some(rest);
                }
            }
        }
        if private || self.prefixes.iter().any(|p| p.is_empty()) {
            Some(message)
        } else {
            None
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Get the path to the default config file
pub fn default_config_path() -> Result<PathBuf> {
    let dir = dirs::config_dir().ok_or(SuggestError::NoConfigDir)?;
    Ok(dir.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Load and validate a config file
pub fn load_config(path: &Path) -> Result<SuggestConfig> {
    let content = fs::read_to_string(path).map_err(|e| SuggestError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config: SuggestConfig =
        serde_json::from_str(&content).map_err(|e| SuggestError::FileParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    config.validate()?;
    Ok(config)
}

/// Load `path` if given, else the default location; a missing default file
/// yields the built-in defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<SuggestConfig> {
    if let Some(path) = path {
        return load_config(path);
    }

    let path = match default_config_path() {
        Ok(p) => p,
        Err(e) => {
            warn!("{}, using defaults", e);
            return Ok(SuggestConfig::default());
        }
    };

    load_from_default(&path)
}

/// Load the config at the default location, falling back to the built-in
/// defaults with a warning when no file is there.
fn load_from_default(path: &Path) -> Result<SuggestConfig> {
    if !path.exists() {
        warn!("No config at {:?}, using defaults", path);
        return Ok(SuggestConfig::default());
    }
    load_config(path)
}
