//! Configuration types for the tide system
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main tide configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DdnsConfig {
    /// URL of the IP-echo service
    pub ip_source_url: String,

    /// Seconds between scheduled cycles
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,

    /// Where the last observed IP is persisted
    #[serde(default = "default_cache_file_path")]
    pub cache_file_path: String,

    /// Resolver attempts per cycle (at least 1)
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,

    /// Delay between resolver attempts (in seconds)
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Time budget for each network call made during a cycle (in seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// What the very first observation does
    #[serde(default)]
    pub initial_sync: InitialSync,

    /// Capacity of the engine event channel
    ///
    /// When full, events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// DNS record to keep in sync (absent = track and notify only)
    #[serde(default)]
    pub dns: Option<DnsTargetConfig>,

    /// Notification channel (absent = disabled)
    #[serde(default)]
    pub notification: Option<NotificationConfig>,
}

impl DdnsConfig {
    /// Create a new configuration with defaults for the given echo service
    pub fn new(ip_source_url: impl Into<String>) -> Self {
        Self {
            ip_source_url: ip_source_url.into(),
            check_interval_secs: default_check_interval_secs(),
            cache_file_path: default_cache_file_path(),
            retry_attempts: default_retry_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            initial_sync: InitialSync::default(),
            event_channel_capacity: default_event_channel_capacity(),
            dns: None,
            notification: None,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.ip_source_url.is_empty() {
            return Err(crate::Error::config("IP source URL cannot be empty"));
        }
        if !self.ip_source_url.starts_with("http://") && !self.ip_source_url.starts_with("https://")
        {
            return Err(crate::Error::config(format!(
                "IP source URL must use HTTP or HTTPS scheme. Got: {}",
                self.ip_source_url
            )));
        }
        if self.check_interval_secs == 0 {
            return Err(crate::Error::config("Check interval must be > 0"));
        }
        if self.retry_attempts == 0 {
            return Err(crate::Error::config("Retry attempts must be >= 1"));
        }
        if self.request_timeout_secs == 0 {
            return Err(crate::Error::config("Request timeout must be > 0"));
        }
        if self.cache_file_path.is_empty() {
            return Err(crate::Error::config("Cache file path cannot be empty"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }

        if let Some(notification) = &self.notification {
            notification.validate()?;
        }

        Ok(())
    }

    /// Interval between scheduled cycles
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    /// Delay between resolver attempts
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    /// Time budget for a single network call
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Behaviour of the first cycle that finds no cached address
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialSync {
    /// Treat the first observation as a change: update DNS and notify `IpChanged`
    #[default]
    Update,
    /// Only record the address and notify `InitialRecord`; DNS is left alone
    RecordOnly,
}

impl std::str::FromStr for InitialSync {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "update" => Ok(InitialSync::Update),
            "record_only" => Ok(InitialSync::RecordOnly),
            other => Err(crate::Error::config(format!(
                "Unknown initial sync mode '{}'. Valid: update, record-only",
                other
            ))),
        }
    }
}

/// DNS record configuration
///
/// Every identification field may be empty; the updater then reports
/// itself as not configured and the engine skips DNS writes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DnsTargetConfig {
    /// Provider-side record id
    #[serde(default)]
    pub record_id: String,

    /// Zone name (e.g. "example.com")
    #[serde(default)]
    pub domain_name: String,

    /// Host part of the record (e.g. "home")
    #[serde(default)]
    pub record_name: String,

    /// Record type
    #[serde(default = "default_record_type")]
    pub record_type: String,

    /// Provider access key id
    #[serde(default)]
    pub access_key_id: String,

    /// Provider access key secret
    #[serde(default)]
    pub access_key_secret: String,
}

impl DnsTargetConfig {
    /// Names of required fields that are empty
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("access_key_id", &self.access_key_id),
            ("access_key_secret", &self.access_key_secret),
            ("domain_name", &self.domain_name),
            ("record_name", &self.record_name),
            ("record_id", &self.record_id),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    /// Whether every required field is present
    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

/// Webhook notification configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Whether notifications are sent at all
    #[serde(default)]
    pub enabled: bool,

    /// Target webhook URL
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl NotificationConfig {
    /// Validate the notification configuration
    ///
    /// Only the URL scheme is checked here; a missing URL is reported by
    /// the notifier's own diagnostics.
    pub fn validate(&self) -> Result<(), crate::Error> {
        if let Some(url) = &self.webhook_url
            && !url.starts_with("http://")
            && !url.starts_with("https://")
        {
            return Err(crate::Error::config(format!(
                "Webhook URL must use HTTP or HTTPS scheme. Got: {}",
                url
            )));
        }
        Ok(())
    }
}

fn default_check_interval_secs() -> u64 {
    30
}

fn default_cache_file_path() -> String {
    "./cache/ip-cache.json".to_string()
}

fn default_retry_attempts() -> usize {
    3
}

fn default_retry_delay_secs() -> u64 {
    2
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_event_channel_capacity() -> usize {
    100
}

fn default_record_type() -> String {
    "A".to_string()
}
