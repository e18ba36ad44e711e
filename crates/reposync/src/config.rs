//! Sync settings.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// What a push does when one blob fails to upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobFailurePolicy {
    /// Log a warning, leave the file out of the commit and continue.
    #[default]
    Skip,
    /// Fail the whole push before any tree is created.
    Abort,
}

/// Poll interval presets for the watch bot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BotInterval {
    #[serde(rename = "10s")]
    TenSeconds,
    #[serde(rename = "30s")]
    ThirtySeconds,
    #[default]
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
}

impl BotInterval {
    /// All presets, shortest first.
    pub const ALL: [BotInterval; 7] = [
        BotInterval::TenSeconds,
        BotInterval::ThirtySeconds,
        BotInterval::OneMinute,
        BotInterval::FiveMinutes,
        BotInterval::FifteenMinutes,
        BotInterval::ThirtyMinutes,
        BotInterval::OneHour,
    ];

    pub fn as_duration(&self) -> Duration {
        let secs = match self {
            BotInterval::TenSeconds => 10,
            BotInterval::ThirtySeconds => 30,
            BotInterval::OneMinute => 60,
            BotInterval::FiveMinutes => 5 * 60,
            BotInterval::FifteenMinutes => 15 * 60,
            BotInterval::ThirtyMinutes => 30 * 60,
            BotInterval::OneHour => 60 * 60,
        };
        Duration::from_secs(secs)
    }
}

impl std::fmt::Display for BotInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            BotInterval::TenSeconds => "10s",
            BotInterval::ThirtySeconds => "30s",
            BotInterval::OneMinute => "1m",
            BotInterval::FiveMinutes => "5m",
            BotInterval::FifteenMinutes => "15m",
            BotInterval::ThirtyMinutes => "30m",
            BotInterval::OneHour => "1h",
        };
        write!(f, "{}", label)
    }
}

/// Settings shared by the manual workflow, the watch bot and the API client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    /// Base URL of the repository API.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Branch used when a repository reports none (e.g. right after creation).
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Default commit message for manual pushes.
    #[serde(default = "default_commit_message")]
    pub commit_message: String,

    /// Description given to repositories created from the workflow.
    #[serde(default = "default_repo_description")]
    pub repository_description: String,

    /// Watch bot poll interval.
    #[serde(default)]
    pub bot_interval: BotInterval,

    /// Number of activity log entries the watch bot keeps.
    #[serde(default = "default_bot_log_capacity")]
    pub bot_log_capacity: usize,

    /// Behaviour when a single blob upload fails.
    #[serde(default)]
    pub blob_failure_policy: BlobFailurePolicy,

    /// HTTP connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// User agent sent with API requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_commit_message() -> String {
    "Update from studio sync".to_string()
}

fn default_repo_description() -> String {
    "Created via studio sync".to_string()
}

fn default_bot_log_capacity() -> usize {
    50
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("reposync/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            branch: default_branch(),
            commit_message: default_commit_message(),
            repository_description: default_repo_description(),
            bot_interval: BotInterval::default(),
            bot_log_capacity: default_bot_log_capacity(),
            blob_failure_policy: BlobFailurePolicy::default(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl SyncSettings {
    /// Parses settings from YAML. Missing keys take their defaults.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let settings: SyncSettings = serde_yaml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parses settings from JSON. Missing keys take their defaults.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let settings: SyncSettings = serde_json::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads settings from a `.json`, `.yaml` or `.yml` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| SyncError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            other => Err(SyncError::Config(format!(
                "Unsupported settings file extension: {}",
                other.unwrap_or("<none>")
            ))),
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            return Err(SyncError::Config(format!(
                "apiBaseUrl must be an http(s) URL, got '{}'",
                self.api_base_url
            )));
        }
        if self.branch.trim().is_empty() {
            return Err(SyncError::Config("branch must not be empty".to_string()));
        }
        if self.bot_log_capacity == 0 {
            return Err(SyncError::Config(
                "botLogCapacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
