//! Alibaba Cloud RPC request signing (signature version 1.0)
//!
//! ```text
//! canonical     = sorted "k=v" pairs, RFC 3986 encoded, joined with '&'
//! string_to_sign = "GET&%2F&" + encode(canonical)
//! signature     = base64(HMAC-SHA1(secret + "&", string_to_sign))
//! ```

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha1::Sha1;
use tide_core::{Error, Result};

type HmacSha1 = Hmac<Sha1>;

/// RFC 3986 unreserved characters stay literal, everything else is encoded
const RFC3986: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode a query component the way the API expects
pub fn percent_encode(value: &str) -> String {
    utf8_percent_encode(value, RFC3986).to_string()
}

/// Sorted, encoded `k=v&k=v` form of the parameters
pub fn canonical_query(params: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// String signed for a GET request to `/`
pub fn string_to_sign(canonical: &str) -> String {
    format!("GET&{}&{}", percent_encode("/"), percent_encode(canonical))
}

/// Base64 HMAC-SHA1 of `message` under `key`
pub fn hmac_sha1_base64(key: &[u8], message: &[u8]) -> Result<String> {
    let mut mac = HmacSha1::new_from_slice(key)
        .map_err(|e| Error::provider("alidns", format!("Invalid signing key: {}", e)))?;
    mac.update(message);
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Signature for `params` under the access key secret
pub fn sign(params: &[(String, String)], access_key_secret: &str) -> Result<String> {
    let canonical = canonical_query(params);
    let key = format!("{}&", access_key_secret);
    hmac_sha1_base64(key.as_bytes(), string_to_sign(&canonical).as_bytes())
}
