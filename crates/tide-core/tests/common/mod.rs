//! Test doubles and common utilities for engine contract tests
//!
//! Every double is `Clone` and clones share their counters, so a test can
//! hand one copy to the engine and keep another for assertions.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tide_core::error::{Error, Result};
use tide_core::traits::{
    CacheStore, CachedState, DnsRecordTarget, DnsUpdater, IpSource, NotificationEvent, Notifier,
};
use tide_core::{DdnsConfig, DdnsEngine, EngineEvent, MemoryCacheStore};
use tokio::sync::mpsc;

/// IP source answering with a settable address
///
/// `None` makes every fetch fail.
#[derive(Clone)]
pub struct StaticIpSource {
    answer: Arc<Mutex<Option<String>>>,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl StaticIpSource {
    pub fn new(answer: Option<&str>) -> Self {
        Self {
            answer: Arc::new(Mutex::new(answer.map(str::to_string))),
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Source that always fails
    pub fn failing() -> Self {
        Self::new(None)
    }

    /// Each fetch takes `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_answer(&self, answer: Option<&str>) {
        *self.answer.lock().unwrap() = answer.map(str::to_string);
    }

    /// Number of times fetch() was called
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IpSource for StaticIpSource {
    async fn fetch(&self) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.answer
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::ip_source("echo service unreachable"))
    }

    fn source_name(&self) -> &str {
        "static"
    }
}

/// How the mock updater answers
#[derive(Debug, Clone)]
pub enum UpdaterResponse {
    Confirm,
    Unconfirmed,
    Fail(String),
    /// Never answers within any sensible timeout
    Hang,
}

/// Longer than any timeout the tests configure
pub const FOREVER: Duration = Duration::from_secs(3600);

/// A mock DnsUpdater that records calls
#[derive(Clone)]
pub struct MockDnsUpdater {
    configured: bool,
    response: Arc<Mutex<UpdaterResponse>>,
    targets: Arc<Mutex<Vec<DnsRecordTarget>>>,
}

impl MockDnsUpdater {
    pub fn new() -> Self {
        Self {
            configured: true,
            response: Arc::new(Mutex::new(UpdaterResponse::Confirm)),
            targets: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Updater reporting missing configuration
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }

    pub fn respond_with(&self, response: UpdaterResponse) {
        *self.response.lock().unwrap() = response;
    }

    /// Number of times update() was called
    pub fn update_calls(&self) -> usize {
        self.targets.lock().unwrap().len()
    }

    /// Values passed to update(), in call order
    pub fn updated_values(&self) -> Vec<String> {
        self.targets
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.value.clone())
            .collect()
    }

    pub fn last_target(&self) -> Option<DnsRecordTarget> {
        self.targets.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl DnsUpdater for MockDnsUpdater {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn update(&self, target: &DnsRecordTarget) -> Result<bool> {
        self.targets.lock().unwrap().push(target.clone());

        let response = self.response.lock().unwrap().clone();
        match response {
            UpdaterResponse::Hang => {
                tokio::time::sleep(FOREVER).await;
                Ok(true)
            }
            UpdaterResponse::Confirm => Ok(true),
            UpdaterResponse::Unconfirmed => Ok(false),
            UpdaterResponse::Fail(message) => Err(Error::provider_with_detail(
                "mock",
                message,
                Some("check the record id".to_string()),
            )),
        }
    }

    fn target(&self) -> Option<DnsRecordTarget> {
        Some(DnsRecordTarget::new("rec-1", "example.com", "home", "A", ""))
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// A Notifier that keeps every event
///
/// When stalled, it records the event and then never returns.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<NotificationEvent>>>,
    stalled: Arc<AtomicBool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn stall(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &NotificationEvent) {
        self.events.lock().unwrap().push(event.clone());

        if self.stalled.load(Ordering::SeqCst) {
            tokio::time::sleep(FOREVER).await;
        }
    }

    fn validate_config(&self) -> bool {
        true
    }
}

/// A CacheStore counting writes, optionally failing them
#[derive(Clone)]
pub struct CountingCacheStore {
    inner: MemoryCacheStore,
    saves: Arc<AtomicUsize>,
    fail_writes: Arc<AtomicBool>,
}

impl CountingCacheStore {
    pub fn new() -> Self {
        Self::with_state(CachedState::default())
    }

    pub fn with_ip(ip: &str) -> Self {
        Self::with_state(CachedState {
            current_ip: ip.to_string(),
            last_update: Some(chrono::Utc::now()),
        })
    }

    pub fn with_state(state: CachedState) -> Self {
        Self {
            inner: MemoryCacheStore::with_state(state),
            saves: Arc::new(AtomicUsize::new(0)),
            fail_writes: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful save() calls
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub async fn current_ip(&self) -> String {
        self.inner.load().await.current_ip
    }
}

#[async_trait]
impl CacheStore for CountingCacheStore {
    async fn load(&self) -> CachedState {
        self.inner.load().await
    }

    async fn save(&self, state: &CachedState) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::cache_store("disk full"));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(state).await
    }
}

/// Helper to create a minimal DdnsConfig for testing
pub fn minimal_config() -> DdnsConfig {
    let mut config = DdnsConfig::new("http://ip.test/api/get-my-ip");
    config.retry_attempts = 3;
    config.retry_delay_secs = 2;
    config.request_timeout_secs = 10;
    config
}

/// Doubles wired into an engine, kept for assertions
pub struct Harness {
    pub engine: DdnsEngine,
    pub events: mpsc::Receiver<EngineEvent>,
    pub source: StaticIpSource,
    pub updater: MockDnsUpdater,
    pub notifier: RecordingNotifier,
    pub store: CountingCacheStore,
}

impl Harness {
    pub async fn new(
        source: StaticIpSource,
        updater: MockDnsUpdater,
        store: CountingCacheStore,
        config: DdnsConfig,
    ) -> Self {
        let notifier = RecordingNotifier::new();

        let (engine, events) = DdnsEngine::new(
            Box::new(source.clone()),
            Box::new(updater.clone()),
            Box::new(notifier.clone()),
            Box::new(store.clone()),
            &config,
        )
        .await
        .expect("engine construction succeeds");

        Self {
            engine,
            events,
            source,
            updater,
            notifier,
            store,
        }
    }
}
