// # Cache Store Trait
//
// Defines the interface for persisting the last observed IP.
//
// ## Purpose
//
// The cache lets the engine tell a real change from a restart: without it,
// every process start would look like a new address.
//
// ## Implementations
//
// - File-based: [`crate::state::FileCacheStore`]
// - In-memory: [`crate::state::MemoryCacheStore`]
//
// ## File Format
//
// ```json
// {
//   "currentIP": "203.0.113.7",
//   "lastUpdate": "2025-01-09T12:00:00Z"
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// The persisted engine state
///
/// `current_ip` is empty only before the first address was ever recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedState {
    /// Last observed address, empty if none yet
    #[serde(rename = "currentIP", default)]
    pub current_ip: String,

    /// When `current_ip` was last written
    #[serde(rename = "lastUpdate", default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
}

impl CachedState {
    /// State recording `ip` as of now
    pub fn observed(ip: Ipv4Addr) -> Self {
        Self {
            current_ip: ip.to_string(),
            last_update: Some(Utc::now()),
        }
    }

    /// Whether no address has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.current_ip.is_empty()
    }

    /// The cached address, if it parses
    pub fn ip(&self) -> Option<Ipv4Addr> {
        self.current_ip.parse().ok()
    }
}

/// Trait for cache store implementations
///
/// # Responsibilities
///
/// - ✅ Read and write the single cached state document
/// - ✅ Create missing directories on write
/// - ❌ Decide what to store or when (owned by `DdnsEngine`)
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Load the cached state
    ///
    /// Never fails: missing, unreadable or corrupt state yields
    /// `CachedState::default()`.
    async fn load(&self) -> CachedState;

    /// Persist the state
    ///
    /// # Returns
    ///
    /// - `Ok(())`: State is durable
    /// - `Err(Error)`: Write failed; the caller decides whether that matters
    async fn save(&self, state: &CachedState) -> Result<(), crate::Error>;
}
