//! Client settings and configuration

use crate::{engine::EngineOptions, storage::conversation::IndexOrdering, Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shortest poll interval accepted from a settings file
pub const MIN_POLL_INTERVAL_MS: u64 = 1_000;
/// Longest poll interval accepted from a settings file
pub const MAX_POLL_INTERVAL_MS: u64 = 60_000;

/// Client settings
///
/// Stored as JSON. Missing fields fall back to their defaults, so an old
/// settings file keeps loading after new options are added.
///
/// # Example
/// ```rust,no_run
/// use staysync::storage::Settings;
///
/// let mut settings = Settings::load("settings.json").expect("Failed to load");
/// settings.update_poll_interval(3_000, "settings.json").expect("Failed to update");
/// println!("Polling {} every {} ms", settings.api_base_url, settings.poll_interval_ms);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the marketplace REST API (e.g. "https://api.example.com/api")
    pub api_base_url: String,
    /// Interval between background refreshes in milliseconds
    pub poll_interval_ms: u64,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Narrow-viewport mode: never auto-open a conversation
    pub narrow_viewport: bool,
    /// Conversation list ordering
    pub conversation_ordering: IndexOrdering,
}

impl Settings {
    /// Load settings from a JSON file
    ///
    /// Returns default settings if the file doesn't exist or is empty.
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read settings: {}", e)))?;

        if data.trim().is_empty() {
            return Ok(Self::default());
        }

        let settings: Self = serde_json::from_str(&data)
            .map_err(|e| Error::Config(format!("Failed to parse settings: {}", e)))?;
        settings.validate()?;

        Ok(settings)
    }

    /// Save settings to a JSON file, creating parent directories as needed
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create settings directory: {}", e)))?;
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .map_err(|e| Error::Config(format!("Failed to write settings: {}", e)))?;

        Ok(())
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if !(MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS).contains(&self.poll_interval_ms) {
            return Err(Error::Config(format!(
                "poll_interval_ms must be between {} and {}, got {}",
                MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS, self.poll_interval_ms
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::Config("request_timeout_ms must be positive".to_string()));
        }
        if self.api_base_url.trim().is_empty() {
            return Err(Error::Config("api_base_url must not be empty".to_string()));
        }
        Ok(())
    }

    /// Update the poll interval and auto-save
    pub fn update_poll_interval<P: AsRef<std::path::Path>>(&mut self, interval_ms: u64, save_path: P) -> Result<()> {
        let previous = self.poll_interval_ms;
        self.poll_interval_ms = interval_ms;
        if let Err(e) = self.validate() {
            self.poll_interval_ms = previous;
            return Err(e);
        }
        self.save(save_path)
    }

    /// Poll interval as a `Duration`
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Request timeout as a `Duration`
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Engine options derived from these settings
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            poll_interval: self.poll_interval(),
            narrow_viewport: self.narrow_viewport,
            ordering: self.conversation_ordering,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000/api".to_string(),
            poll_interval_ms: 4_000,
            request_timeout_ms: 10_000,
            narrow_viewport: false,
            conversation_ordering: IndexOrdering::UnreadFirst,
        }
    }
}
