//! Public IP resolution with bounded retry
//!
//! The resolver owns the retry policy for IP lookups. Sources perform a
//! single request; the resolver decides how often to ask, how long to wait
//! between attempts, and whether an answer is a usable IPv4 address.

use crate::error::{Error, Result};
use crate::traits::IpSource;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Validate an address reported by a source
///
/// Accepts dotted-quad IPv4 and IPv4-mapped IPv6 (`::ffff:a.b.c.d`), which
/// is normalized to its IPv4 form. Surrounding whitespace is ignored.
pub fn normalize_ipv4(raw: &str) -> Result<Ipv4Addr> {
    let text = raw.trim();

    if let Ok(ip) = text.parse::<Ipv4Addr>() {
        return Ok(ip);
    }

    match text.parse::<Ipv6Addr>() {
        Ok(v6) => v6
            .to_ipv4_mapped()
            .ok_or_else(|| Error::invalid_address(format!("not an IPv4 address: {}", text))),
        Err(_) => Err(Error::invalid_address(format!("unparseable address: {:?}", text))),
    }
}

/// Resolves the current public IPv4 address through an [`IpSource`]
pub struct IpResolver {
    source: Box<dyn IpSource>,
    attempts: usize,
    retry_delay: Duration,
    attempt_timeout: Duration,
}

impl IpResolver {
    /// Create a resolver
    ///
    /// `attempts` is clamped to at least one.
    pub fn new(
        source: Box<dyn IpSource>,
        attempts: usize,
        retry_delay: Duration,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            source,
            attempts: attempts.max(1),
            retry_delay,
            attempt_timeout,
        }
    }

    /// Number of attempts per resolution
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Resolve the current public IP
    ///
    /// Returns the first valid address any attempt produced, or `None` once
    /// every attempt failed. Never returns an error.
    pub async fn resolve(&self) -> Option<Ipv4Addr> {
        for attempt in 1..=self.attempts {
            debug!(
                "Fetching IP from {} (attempt {}/{})",
                self.source.source_name(),
                attempt,
                self.attempts
            );

            match self.attempt().await {
                Ok(ip) => {
                    info!("Resolved public IP: {}", ip);
                    return Some(ip);
                }
                Err(e) => {
                    warn!("Failed to fetch IP (attempt {}/{}): {}", attempt, self.attempts, e);
                }
            }

            if attempt < self.attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        error!("Failed to fetch IP after {} attempts", self.attempts);
        None
    }

    async fn attempt(&self) -> Result<Ipv4Addr> {
        let raw = tokio::time::timeout(self.attempt_timeout, self.source.fetch())
            .await
            .map_err(|_| {
                Error::timeout(format!(
                    "{} did not answer within {:?}",
                    self.source.source_name(),
                    self.attempt_timeout
                ))
            })??;

        normalize_ipv4(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Source answering from a script, then failing
    struct ScriptedSource {
        answers: Mutex<VecDeque<Result<String>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(answers: Vec<Result<String>>) -> Self {
            Self {
                answers: Mutex::new(answers.into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl IpSource for ScriptedSource {
        async fn fetch(&self) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::ip_source("script exhausted")))
        }

        fn source_name(&self) -> &str {
            "scripted"
        }
    }

    #[test]
    fn test_normalize_accepts_ipv4() {
        assert_eq!(normalize_ipv4("203.0.113.7").unwrap(), Ipv4Addr::new(203, 0, 113, 7));
        assert_eq!(normalize_ipv4(" 8.8.8.8\n").unwrap(), Ipv4Addr::new(8, 8, 8, 8));
    }

    #[test]
    fn test_normalize_unwraps_mapped_ipv6() {
        assert_eq!(
            normalize_ipv4("::ffff:198.51.100.4").unwrap(),
            Ipv4Addr::new(198, 51, 100, 4)
        );
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        for raw in ["", "256.1.1.1", "1.2.3", "1.2.3.4.5", "2001:db8::1", "<html>", "a.b.c.d"] {
            assert!(normalize_ipv4(raw).is_err(), "{:?} should be rejected", raw);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_valid_answer_wins() {
        let source = ScriptedSource::new(vec![
            Err(Error::ip_source("connection reset")),
            Ok("not-an-ip".to_string()),
            Ok("192.0.2.10".to_string()),
        ]);
        let resolver = IpResolver::new(
            Box::new(source),
            5,
            Duration::from_secs(2),
            Duration::from_secs(10),
        );

        assert_eq!(resolver.resolve().await, Some(Ipv4Addr::new(192, 0, 2, 10)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_between_attempts_only() {
        let resolver = IpResolver::new(
            Box::new(ScriptedSource::new(vec![])),
            3,
            Duration::from_secs(2),
            Duration::from_secs(10),
        );

        let started = tokio::time::Instant::now();
        assert_eq!(resolver.resolve().await, None);

        // Two delays between three attempts, none after the last
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_zero_attempts_clamped() {
        let resolver = IpResolver::new(
            Box::new(ScriptedSource::new(vec![Ok("1.1.1.1".to_string())])),
            0,
            Duration::ZERO,
            Duration::from_secs(1),
        );

        assert_eq!(resolver.attempts(), 1);
        assert_eq!(resolver.resolve().await, Some(Ipv4Addr::new(1, 1, 1, 1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_source_times_out() {
        struct StalledSource;

        #[async_trait]
        impl IpSource for StalledSource {
            async fn fetch(&self) -> Result<String> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok("1.1.1.1".to_string())
            }

            fn source_name(&self) -> &str {
                "stalled"
            }
        }

        let resolver = IpResolver::new(
            Box::new(StalledSource),
            2,
            Duration::from_secs(1),
            Duration::from_secs(5),
        );

        let started = tokio::time::Instant::now();
        assert_eq!(resolver.resolve().await, None);
        assert_eq!(started.elapsed(), Duration::from_secs(11));
    }
}
