// # HTTP IP Source
//
// This crate provides the IP-echo source for the tide system.
//
// ## Purpose
//
// The host asks a remote echo service which address it is seen from. The
// service normally answers with a small JSON document:
//
// ```json
// { "success": true, "ip": "203.0.113.7", "source": "request-ip" }
// ```
//
// Plain-text services (ipify, icanhazip) are accepted as well: a body that
// is not JSON is taken as the address itself.
//
// ## Architecture
//
// One HTTP GET per `fetch()`. Retries, delays and IPv4 validation are owned
// by `IpResolver` in tide-core; this source only reports what it was told.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tide_core::traits::IpSource;
use tide_core::{Error, Result};

/// Default timeout for a single echo request
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// User-Agent sent to the echo service
const USER_AGENT: &str = concat!("tide-ddns/", env!("CARGO_PKG_VERSION"));

/// JSON answer of the echo service
#[derive(Debug, Deserialize)]
struct EchoResponse {
    success: bool,
    #[serde(default)]
    ip: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// IP source backed by an HTTP echo service
#[derive(Debug, Clone)]
pub struct HttpIpSource {
    /// URL to fetch the IP from
    url: String,

    /// HTTP client
    client: reqwest::Client,
}

impl HttpIpSource {
    /// Create a new HTTP IP source with the default timeout
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_timeout(url, DEFAULT_HTTP_TIMEOUT)
    }

    /// Create a new HTTP IP source with a custom request timeout
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::builder()
                .timeout(timeout)
                .user_agent(USER_AGENT)
                .build()
                .unwrap_or_default(),
        }
    }

    /// URL this source queries
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Extract the address from an echo service response body
///
/// JSON bodies must carry `success: true` and an `ip` field. Anything that
/// does not parse as the echo JSON document is returned trimmed, as plain
/// text. Whether the result is a valid IPv4 address is decided by the
/// resolver, not here.
pub fn parse_ip_body(body: &str) -> Result<String> {
    let trimmed = body.trim();

    if trimmed.starts_with('{')
        && let Ok(echo) = serde_json::from_str::<EchoResponse>(trimmed)
    {
        if !echo.success {
            return Err(Error::ip_source(format!(
                "echo service reported failure: {}",
                echo.error.as_deref().unwrap_or("no reason given")
            )));
        }

        return echo
            .ip
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty())
            .ok_or_else(|| Error::ip_source("echo service response has no 'ip' field"));
    }

    if trimmed.is_empty() {
        return Err(Error::ip_source("echo service returned an empty body"));
    }

    Ok(trimmed.to_string())
}

#[async_trait]
impl IpSource for HttpIpSource {
    async fn fetch(&self) -> Result<String> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::http(format!("Request to {} failed: {}", self.url, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::http(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            tracing::debug!("Echo service answered {}: {}", status, body.trim());
            // The service explains 4xx answers in the same JSON document
            return match parse_ip_body(&body) {
                Err(e) => Err(e),
                Ok(_) => Err(Error::ip_source(format!("HTTP error: {}", status))),
            };
        }

        parse_ip_body(&body)
    }

    fn source_name(&self) -> &str {
        &self.url
    }
}
