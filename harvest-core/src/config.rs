//! Run configuration.
//!
//! A [`HarvestConfig`] is built once by the binary and handed to each
//! component. Values come from, in increasing precedence: defaults, a TOML
//! file, the `MS_TOKEN` environment variable and command-line flags.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const MS_TOKEN_ENV: &str = "MS_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub data_dir: PathBuf,
    pub posts_file_name: String,
    pub media_dir_name: String,
    pub plots_dir_name: String,
    pub fetch: FetchSettings,
    pub retry: RetrySettings,
    pub schedule: ScheduleSettings,
    pub report: ReportSettings,
    pub media: MediaSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub base_url: String,
    /// Maximum number of posts requested per hashtag.
    pub limit: usize,
    pub page_size: usize,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub ms_token: Option<String>,
    pub requests_per_minute: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
    pub failure_threshold: u32,
    pub recovery_timeout_s: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    /// Pause between two hashtags.
    pub inter_request_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    pub top_n: usize,
    pub exclude_source: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaSettings {
    /// External program used for video posts without a direct stream URL.
    pub downloader_command: Option<String>,
    pub timeout_secs: u64,
    /// Upper bound for one run of the external downloader.
    pub tool_timeout_secs: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            posts_file_name: "posts.json".to_string(),
            media_dir_name: "media".to_string(),
            plots_dir_name: "plots".to_string(),
            fetch: FetchSettings::default(),
            retry: RetrySettings::default(),
            schedule: ScheduleSettings::default(),
            report: ReportSettings::default(),
            media: MediaSettings::default(),
        }
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            base_url: "https://www.tiktok.com".to_string(),
            limit: 1000,
            page_size: 30,
            user_agent: concat!("hashtag-harvest/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 30,
            ms_token: None,
            requests_per_minute: 30,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
            max_delay_ms: 60000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
            failure_threshold: 3,
            recovery_timeout_s: 120,
        }
    }
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            inter_request_delay_secs: 8,
        }
    }
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            top_n: 20,
            exclude_source: true,
        }
    }
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            downloader_command: Some("yt-dlp".to_string()),
            timeout_secs: 30,
            tool_timeout_secs: 300,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tiktok_hashtag_data")
}

impl HarvestConfig {
    /// Read a TOML file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply the msToken from the environment, if set.
    pub fn with_env_token(mut self, token: Option<String>) -> Self {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.fetch.ms_token = Some(token.trim().to_string());
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch.limit == 0 {
            return Err(invalid("fetch.limit", self.fetch.limit));
        }
        if self.fetch.page_size == 0 {
            return Err(invalid("fetch.page_size", self.fetch.page_size));
        }
        if self.fetch.base_url.trim().is_empty() {
            return Err(invalid("fetch.base_url", "\"\""));
        }
        if self.report.top_n == 0 {
            return Err(invalid("report.top_n", self.report.top_n));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", self.retry.max_attempts));
        }
        for (field, name) in [
            ("posts_file_name", &self.posts_file_name),
            ("media_dir_name", &self.media_dir_name),
            ("plots_dir_name", &self.plots_dir_name),
        ] {
            if name.is_empty() || name.contains(['/', '\\']) {
                return Err(invalid(field, name));
            }
        }
        Ok(())
    }

    /// Create the data directory and probe it with a throwaway file.
    /// Permission bits are not trusted on every platform.
    pub fn ensure_data_dir(&self) -> Result<(), ConfigError> {
        let not_writable = || ConfigError::NotWritable {
            path: self.data_dir.display().to_string(),
        };
        fs::create_dir_all(&self.data_dir).map_err(|_| not_writable())?;
        let probe = self.data_dir.join(".write_test");
        fs::write(&probe, b"test").map_err(|_| not_writable())?;
        fs::remove_file(&probe).map_err(|_| not_writable())?;
        Ok(())
    }

    pub fn hashtag_dir(&self, hashtag: &str) -> PathBuf {
        self.data_dir.join(hashtag)
    }

    pub fn posts_file(&self, hashtag: &str) -> PathBuf {
        self.hashtag_dir(hashtag).join(&self.posts_file_name)
    }

    pub fn media_dir(&self, hashtag: &str) -> PathBuf {
        self.hashtag_dir(hashtag).join(&self.media_dir_name)
    }

    pub fn plots_dir(&self, hashtag: &str) -> PathBuf {
        self.hashtag_dir(hashtag).join(&self.plots_dir_name)
    }

    pub fn inter_request_delay(&self) -> Duration {
        Duration::from_secs(self.schedule.inter_request_delay_secs)
    }
}

fn invalid(field: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
}
