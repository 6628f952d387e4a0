// # IP Source Trait
//
// Defines the interface for asking a remote service which public address
// the caller appears from.
//
// ## Implementations
//
// - HTTP echo service: `tide-ip-http` crate
//
// ## Usage
//
// ```rust,ignore
// use tide_core::IpSource;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* IpSource implementation */;
//
//     // One attempt, raw answer (validated by the resolver)
//     let raw = source.fetch().await?;
//     println!("source says: {}", raw);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

/// Trait for IP source implementations
///
/// An IP source performs exactly one lookup per call and returns the raw
/// address text the remote service reported.
///
/// # Responsibilities
///
/// - ✅ Perform one network request to the configured echo service
/// - ✅ Extract the address text from the response
/// - ❌ Retry or sleep (owned by `IpResolver`)
/// - ❌ Validate or normalize the address (owned by `IpResolver`)
/// - ❌ Compare against the cached address (owned by `DdnsEngine`)
#[async_trait]
pub trait IpSource: Send + Sync {
    /// Fetch the current public IP once
    ///
    /// # Returns
    ///
    /// - `Ok(String)`: The address text as reported by the source
    /// - `Err(Error)`: Transport failure or an unusable response
    async fn fetch(&self) -> Result<String, crate::Error>;

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &str;
}
