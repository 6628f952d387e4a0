// # Alibaba Cloud DNS Provider
//
// This crate provides the Alibaba Cloud DNS (AliDNS) updater for the tide
// system.
//
// ## Scope
//
// - ✅ One `UpdateDomainRecord` RPC call per `update()`
// - ✅ Signature v1.0 (HMAC-SHA1) request signing
// - ✅ Provider error codes mapped to `Error::Provider`, with the
//   `Recommend` diagnostic carried as detail
// - ✅ Dry-run mode for safe testing
// - ❌ NO retry logic (a failed update is one cycle outcome)
// - ❌ NO caching (state owned by the engine's cache store)
//
// ## Security Requirements
//
// - Access key id and secret NEVER appear in logs or `Debug` output
// - Credentials MUST be provided via environment variables only
//
// ## API Reference
//
// - RPC endpoint: `https://alidns.cn-hangzhou.aliyuncs.com/`
// - Action: `UpdateDomainRecord` (`RecordId`, `RR`, `Type`, `Value`)
// - API version: `2015-01-09`

pub mod signature;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;
use tide_core::config::DnsTargetConfig;
use tide_core::traits::{DnsRecordTarget, DnsUpdater};
use tide_core::{Error, Result};

/// Default RPC endpoint
pub const DEFAULT_ENDPOINT: &str = "https://alidns.cn-hangzhou.aliyuncs.com/";

/// API version of the DNS service
const API_VERSION: &str = "2015-01-09";

/// Default HTTP timeout for API requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Error code returned when the record already holds the requested value
const DUPLICATE_RECORD_CODE: &str = "DomainRecordDuplicate";

/// Body of an RPC response, success or error
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RpcResponse {
    #[serde(default)]
    record_id: Option<String>,
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    recommend: Option<String>,
}

/// Alibaba Cloud DNS updater
///
/// Holds the record configuration and credentials. Stateless between calls.
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, `update()` logs the request that would be sent
/// and reports success without calling the API.
pub struct AliDnsUpdater {
    /// Record identification and credentials
    /// ⚠️ NEVER log `access_key_id` / `access_key_secret`
    config: DnsTargetConfig,

    /// RPC endpoint
    endpoint: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Dry-run mode: if true, skip the API call
    dry_run: bool,
}

// Custom Debug implementation that hides the credentials
impl std::fmt::Debug for AliDnsUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AliDnsUpdater")
            .field("access_key_id", &"<REDACTED>")
            .field("access_key_secret", &"<REDACTED>")
            .field("record_id", &self.config.record_id)
            .field("domain_name", &self.config.domain_name)
            .field("record_name", &self.config.record_name)
            .field("record_type", &self.config.record_type)
            .field("endpoint", &self.endpoint)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl AliDnsUpdater {
    /// Create an updater for the configured record (live mode)
    ///
    /// Missing fields are not an error here: the updater then reports
    /// itself as not configured and the engine skips DNS writes.
    pub fn new(config: DnsTargetConfig) -> Self {
        Self {
            config,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            client: reqwest::Client::builder()
                .timeout(DEFAULT_HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
            dry_run: false,
        }
    }

    /// Use a different RPC endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the HTTP request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        self
    }

    /// Enable or disable dry-run mode
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Whether dry-run mode is active
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Unsigned request parameters for an update
    fn request_params(
        &self,
        target: &DnsRecordTarget,
        nonce: &str,
        timestamp: &str,
    ) -> Vec<(String, String)> {
        [
            ("Action", "UpdateDomainRecord"),
            ("RecordId", target.record_id.as_str()),
            ("RR", target.record_name.as_str()),
            ("Type", target.record_type.as_str()),
            ("Value", target.value.as_str()),
            ("Format", "JSON"),
            ("Version", API_VERSION),
            ("AccessKeyId", self.config.access_key_id.as_str()),
            ("SignatureMethod", "HMAC-SHA1"),
            ("SignatureVersion", "1.0"),
            ("SignatureNonce", nonce),
            ("Timestamp", timestamp),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    /// Full signed request URL
    fn signed_url(&self, target: &DnsRecordTarget, nonce: &str, timestamp: &str) -> Result<String> {
        let params = self.request_params(target, nonce, timestamp);
        let signature = signature::sign(&params, &self.config.access_key_secret)?;

        Ok(format!(
            "{}?{}&Signature={}",
            self.endpoint,
            signature::canonical_query(&params),
            signature::percent_encode(&signature)
        ))
    }
}

/// Interpret an `UpdateDomainRecord` response
///
/// # Returns
///
/// - `Ok(true)`: The response echoes `record_id`, or the record already
///   holds the value (`DomainRecordDuplicate`)
/// - `Ok(false)`: A 2xx answer that does not confirm the record id
/// - `Err(Error::Provider)`: An error code or non-2xx status
pub fn interpret_response(status: u16, body: &str, record_id: &str) -> Result<bool> {
    let parsed = serde_json::from_str::<RpcResponse>(body).ok();
    let success = (200..300).contains(&status);

    if let Some(response) = &parsed
        && let Some(code) = &response.code
    {
        if code == DUPLICATE_RECORD_CODE {
            tracing::info!("Record {} already holds the requested value", record_id);
            return Ok(true);
        }

        return Err(Error::provider_with_detail(
            "alidns",
            format!(
                "{}: {} (HTTP {}, RequestId {})",
                code,
                response.message.as_deref().unwrap_or("no message"),
                status,
                response.request_id.as_deref().unwrap_or("-")
            ),
            response.recommend.clone(),
        ));
    }

    if !success {
        return Err(match status {
            401 | 403 => Error::provider(
                "alidns",
                format!("Authentication failed: invalid access key or insufficient permissions. Status: {}", status),
            ),
            429 => Error::provider("alidns", format!("Rate limit exceeded. Status: {}", status)),
            500..=599 => Error::provider(
                "alidns",
                format!("AliDNS server error (transient): {} - {}", status, body.trim()),
            ),
            _ => Error::provider("alidns", format!("Update failed: {} - {}", status, body.trim())),
        });
    }

    match parsed.and_then(|r| r.record_id) {
        Some(id) if id == record_id => Ok(true),
        other => {
            tracing::warn!(
                "Unexpected UpdateDomainRecord response (RecordId {:?}, expected {})",
                other,
                record_id
            );
            Ok(false)
        }
    }
}

#[async_trait]
impl DnsUpdater for AliDnsUpdater {
    fn is_configured(&self) -> bool {
        let missing = self.config.missing_fields();
        if !missing.is_empty() {
            tracing::debug!("AliDNS configuration incomplete, missing: {:?}", missing);
        }
        missing.is_empty()
    }

    async fn update(&self, target: &DnsRecordTarget) -> Result<bool> {
        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would call UpdateDomainRecord: RecordId={}, RR={}, Type={}, Value={}",
                target.record_id,
                target.record_name,
                target.record_type,
                target.value
            );
            return Ok(true);
        }

        let nonce = uuid::Uuid::new_v4().to_string();
        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let url = self.signed_url(target, &nonce, &timestamp)?;

        tracing::debug!(
            "UpdateDomainRecord {} ({}) -> {}",
            target.fqdn(),
            target.record_id,
            target.value
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::provider("alidns", format!("HTTP request failed: {}", e.without_url())))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::provider("alidns", format!("Failed to read response: {}", e)))?;

        interpret_response(status, &body, &target.record_id)
    }

    fn target(&self) -> Option<DnsRecordTarget> {
        Some(DnsRecordTarget::new(
            self.config.record_id.clone(),
            self.config.domain_name.clone(),
            self.config.record_name.clone(),
            self.config.record_type.clone(),
            "",
        ))
    }

    fn provider_name(&self) -> &'static str {
        "alidns"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_config() -> DnsTargetConfig {
        DnsTargetConfig {
            record_id: "1234567890".to_string(),
            domain_name: "example.com".to_string(),
            record_name: "home".to_string(),
            record_type: "A".to_string(),
            access_key_id: "LTAI-test-id".to_string(),
            access_key_secret: "super-secret".to_string(),
        }
    }

    fn target(value: &str) -> DnsRecordTarget {
        DnsRecordTarget::new("1234567890", "example.com", "home", "A", value)
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let updater = AliDnsUpdater::new(complete_config());
        let debug = format!("{:?}", updater);

        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("LTAI-test-id"));
        assert!(debug.contains("<REDACTED>"));
        assert!(debug.contains("1234567890"));
    }

    #[test]
    fn test_is_configured() {
        assert!(AliDnsUpdater::new(complete_config()).is_configured());

        let mut config = complete_config();
        config.record_id.clear();
        assert!(!AliDnsUpdater::new(config).is_configured());

        assert!(!AliDnsUpdater::new(DnsTargetConfig::default()).is_configured());
    }

    #[test]
    fn test_target_has_no_value() {
        let updater = AliDnsUpdater::new(complete_config());
        let target = updater.target().unwrap();

        assert_eq!(target.record_id, "1234567890");
        assert_eq!(target.fqdn(), "home.example.com");
        assert!(target.value.is_empty());
    }

    #[test]
    fn test_signed_url_shape() {
        let updater = AliDnsUpdater::new(complete_config()).with_endpoint("https://dns.test/");
        let url = updater
            .signed_url(&target("203.0.113.7"), "nonce-1", "2024-01-01T00:00:00Z")
            .unwrap();

        assert!(url.starts_with("https://dns.test/?AccessKeyId=LTAI-test-id&Action=UpdateDomainRecord&"));
        assert!(url.contains("&RR=home&"));
        assert!(url.contains("&Timestamp=2024-01-01T00%3A00%3A00Z&"));
        assert!(url.contains("&Value=203.0.113.7&"));
        assert!(url.contains("&Version=2015-01-09"));
        assert!(url.contains("&Signature="));
        assert!(!url.contains("super-secret"));
    }

    #[test]
    fn test_signed_url_is_deterministic_for_fixed_nonce() {
        let updater = AliDnsUpdater::new(complete_config());
        let a = updater.signed_url(&target("1.1.1.1"), "n", "2024-01-01T00:00:00Z").unwrap();
        let b = updater.signed_url(&target("1.1.1.1"), "n", "2024-01-01T00:00:00Z").unwrap();
        let c = updater.signed_url(&target("1.1.1.2"), "n", "2024-01-01T00:00:00Z").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_response_confirms_record_id() {
        let body = r#"{"RequestId":"536E9CAD-DB30-4647-AC87-AA5CC38C5382","RecordId":"1234567890"}"#;
        assert!(interpret_response(200, body, "1234567890").unwrap());
    }

    #[test]
    fn test_response_without_matching_record_id() {
        let body = r#"{"RequestId":"abc","RecordId":"999"}"#;
        assert!(!interpret_response(200, body, "1234567890").unwrap());
        assert!(!interpret_response(200, "not json", "1234567890").unwrap());
    }

    #[test]
    fn test_error_body_carries_recommend() {
        let body = r#"{"RequestId":"abc","HostId":"alidns.aliyuncs.com","Code":"InvalidAccessKeyId.NotFound","Message":"Specified access key is not found.","Recommend":"https://api.aliyun.com/troubleshoot?q=InvalidAccessKeyId.NotFound"}"#;
        let err = interpret_response(404, body, "1234567890").unwrap_err();

        assert!(err.to_string().contains("InvalidAccessKeyId.NotFound"));
        assert_eq!(
            err.detail(),
            Some("https://api.aliyun.com/troubleshoot?q=InvalidAccessKeyId.NotFound")
        );
        assert!(err.report().ends_with("InvalidAccessKeyId.NotFound)"));
    }

    #[test]
    fn test_duplicate_record_is_success() {
        let body = r#"{"RequestId":"abc","Code":"DomainRecordDuplicate","Message":"The DNS record already exists."}"#;
        assert!(interpret_response(400, body, "1234567890").unwrap());
    }

    #[test]
    fn test_status_fallbacks() {
        assert!(interpret_response(503, "upstream", "1").is_err());
        let err = interpret_response(403, "", "1").unwrap_err();
        assert!(err.to_string().contains("Authentication failed"));
        assert_eq!(err.detail(), None);
    }

    #[tokio::test]
    async fn test_dry_run_skips_api() {
        let updater = AliDnsUpdater::new(complete_config())
            .with_endpoint("http://127.0.0.1:9/")
            .with_dry_run(true);

        assert!(updater.is_dry_run());
        assert!(updater.update(&target("203.0.113.7")).await.unwrap());
    }

    #[tokio::test]
    async fn test_transport_failure_is_provider_error() {
        let updater = AliDnsUpdater::new(complete_config())
            .with_endpoint("http://127.0.0.1:9/")
            .with_timeout(Duration::from_secs(2));

        let err = updater.update(&target("203.0.113.7")).await.unwrap_err();
        assert!(matches!(err, Error::Provider { .. }));
        assert!(!err.to_string().contains("super-secret"));
    }
}
