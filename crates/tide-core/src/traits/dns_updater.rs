// # DNS Updater Trait
//
// Defines the interface for applying a new address to one DNS record.
//
// ## Implementations
//
// - Alibaba Cloud DNS: `tide-provider-alidns` crate
// - [`DisabledUpdater`]: deployments that only track and notify
//
// ## Usage
//
// ```rust,ignore
// use tide_core::{DnsUpdater, DnsRecordTarget};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let updater = /* DnsUpdater implementation */;
//
//     if updater.is_configured() {
//         let target = DnsRecordTarget::new("123", "example.com", "home", "A", "1.2.3.4");
//         let confirmed = updater.update(&target).await?;
//         println!("confirmed: {}", confirmed);
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Identifies the record to mutate and the value to write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecordTarget {
    /// Provider-side record id
    pub record_id: String,
    /// Zone the record lives in (e.g. "example.com")
    pub domain_name: String,
    /// Host part of the record (e.g. "home" or "@")
    pub record_name: String,
    /// Record type, normally "A"
    pub record_type: String,
    /// New record value
    pub value: String,
}

impl DnsRecordTarget {
    /// Create a new record target
    pub fn new(
        record_id: impl Into<String>,
        domain_name: impl Into<String>,
        record_name: impl Into<String>,
        record_type: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            record_id: record_id.into(),
            domain_name: domain_name.into(),
            record_name: record_name.into(),
            record_type: record_type.into(),
            value: value.into(),
        }
    }

    /// Fully qualified name, for log lines
    pub fn fqdn(&self) -> String {
        match self.record_name.as_str() {
            "" | "@" => self.domain_name.clone(),
            rr => format!("{}.{}", rr, self.domain_name),
        }
    }
}

/// Trait for DNS updater implementations
///
/// # Responsibilities
///
/// - ✅ Perform the provider API call for one record
/// - ✅ Report whether the provider confirmed the change
/// - ❌ Retry or back off (a failure is one outcome for the cycle)
/// - ❌ Decide whether an update is needed (owned by `DdnsEngine`)
/// - ❌ Touch the cache (owned by `DdnsEngine`)
#[async_trait]
pub trait DnsUpdater: Send + Sync {
    /// Whether every field needed to identify and authorize the update is present
    ///
    /// When this returns `false` the engine skips DNS mutation entirely.
    fn is_configured(&self) -> bool;

    /// Apply `target.value` to the record
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: The provider acknowledged the update for `target.record_id`
    /// - `Ok(false)`: The provider answered but did not confirm the record id
    /// - `Err(Error)`: The request failed or the provider rejected it
    async fn update(&self, target: &DnsRecordTarget) -> Result<bool, crate::Error>;

    /// The record this updater manages, without a value
    ///
    /// The engine fills in `value` with the resolved address.
    fn target(&self) -> Option<DnsRecordTarget>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Updater used when no DNS provider is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledUpdater;

#[async_trait]
impl DnsUpdater for DisabledUpdater {
    fn is_configured(&self) -> bool {
        false
    }

    async fn update(&self, _target: &DnsRecordTarget) -> Result<bool, crate::Error> {
        Err(crate::Error::config("DNS updater is not configured"))
    }

    fn target(&self) -> Option<DnsRecordTarget> {
        None
    }

    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}
