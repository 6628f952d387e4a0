//! Core DDNS engine
//!
//! The DdnsEngine is responsible for:
//! - Resolving the current public IP via the IpResolver
//! - Comparing it against the cached IP
//! - Updating the DNS record via DnsUpdater when it changed
//! - Notifying about the outcome
//! - Persisting the new cached state
//!
//! ## Architecture
//!
//! ```text
//!   timer tick ──┐   manual trigger ──┐
//!                ▼                    ▼
//!            ┌──────────────────────────┐
//!            │  DdnsEngine (cycle lock) │
//!            └──────────────────────────┘
//!                         │
//!    ┌──────────────┬─────┴────────┬──────────────┐
//!    ▼              ▼              ▼              ▼
//! ┌──────────┐ ┌────────────┐ ┌──────────┐ ┌────────────┐
//! │IpResolver│ │ DnsUpdater │ │ Notifier │ │ CacheStore │
//! │(resolve) │ │ (update)   │ │ (notify) │ │ (save)     │
//! └──────────┘ └────────────┘ └──────────┘ └────────────┘
//! ```
//!
//! ## Cycle
//!
//! 1. Resolve the IP; on failure notify `Error` and stop
//! 2. If it equals the cached IP, stop
//! 3. Update DNS (if the updater is configured)
//! 4. Notify `IpChanged`
//! 5. Store the new IP in memory and persist it
//!
//! At most one cycle body runs at a time. A manual trigger that finds a
//! cycle in flight waits for it and reports its outcome instead of running
//! a second one; a timer tick that finds a cycle in flight is skipped.

use crate::config::{DdnsConfig, InitialSync};
use crate::error::{Error, Result};
use crate::resolver::IpResolver;
use crate::traits::{CacheStore, CachedState, DnsUpdater, IpSource, NotificationEvent, Notifier};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// What happened to the DNS record during a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsOutcome {
    /// The IP did not change (or was not resolved), nothing to write
    NotNeeded,
    /// The updater is not configured, write skipped
    NotConfigured,
    /// First observation recorded without touching DNS (`InitialSync::RecordOnly`)
    SkippedInitial,
    /// The provider confirmed the update
    Updated,
    /// The provider answered but did not confirm the record id
    Unconfirmed,
    /// The update failed
    Failed {
        message: String,
    },
}

impl DnsOutcome {
    /// Whether the provider confirmed the update
    pub fn succeeded(&self) -> bool {
        matches!(self, DnsOutcome::Updated)
    }

    /// Whether the updater was called
    pub fn attempted(&self) -> bool {
        matches!(
            self,
            DnsOutcome::Updated | DnsOutcome::Unconfirmed | DnsOutcome::Failed { .. }
        )
    }

    /// Failure description for an attempted but unsuccessful update
    pub fn error(&self) -> Option<String> {
        match self {
            DnsOutcome::Unconfirmed => {
                Some("provider did not confirm the record id".to_string())
            }
            DnsOutcome::Failed { message } => Some(message.clone()),
            _ => None,
        }
    }
}

/// Result of one cycle, as reported to the caller of a trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Cached IP before the cycle
    pub previous_ip: Option<Ipv4Addr>,
    /// IP resolved by the cycle, `None` if resolution failed
    pub observed_ip: Option<Ipv4Addr>,
    /// Whether the observed IP differed from the cached one
    pub ip_changed: bool,
    /// DNS side of the cycle
    pub dns: DnsOutcome,
    /// Resolution or update failure, if any
    pub error: Option<String>,
    /// True when this caller did not run its own cycle but waited for an
    /// in-flight one and received its outcome
    pub coalesced: bool,
}

impl CycleOutcome {
    fn unresolved(previous_ip: Option<Ipv4Addr>, message: String) -> Self {
        Self {
            previous_ip,
            observed_ip: None,
            ip_changed: false,
            dns: DnsOutcome::NotNeeded,
            error: Some(message),
            coalesced: false,
        }
    }

    fn unchanged(ip: Ipv4Addr) -> Self {
        Self {
            previous_ip: Some(ip),
            observed_ip: Some(ip),
            ip_changed: false,
            dns: DnsOutcome::NotNeeded,
            error: None,
            coalesced: false,
        }
    }

    fn changed(previous_ip: Option<Ipv4Addr>, new_ip: Ipv4Addr, dns: DnsOutcome) -> Self {
        let error = dns.error();
        Self {
            previous_ip,
            observed_ip: Some(new_ip),
            ip_changed: true,
            dns,
            error,
            coalesced: false,
        }
    }

    /// Whether the DNS record was confirmed updated
    pub fn dns_updated(&self) -> bool {
        self.dns.succeeded()
    }
}

/// What started a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleTrigger {
    /// Timer tick (including the immediate cycle at start)
    Scheduled,
    /// `trigger_cycle_now()`
    Manual,
}

/// Events emitted by the DdnsEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Scheduler started
    Started {
        check_interval: Duration,
    },

    /// A cycle ran to completion
    CycleCompleted {
        trigger: CycleTrigger,
        outcome: CycleOutcome,
    },

    /// A timer tick found a cycle in flight and was skipped
    TickSkipped,

    /// Scheduler stopped
    Stopped {
        reason: String,
    },
}

/// State guarded by the cycle lock
#[derive(Debug, Default)]
struct CycleSlot {
    last_outcome: Option<CycleOutcome>,
}

/// Clears the scheduler flag however `run_internal` exits
struct ScheduleGuard<'a>(&'a AtomicBool);

impl Drop for ScheduleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Core DDNS engine
///
/// The engine keeps one DNS record in sync with the observed public IP.
/// It is constructed from trait objects, so every collaborator can be
/// replaced (the contract tests use in-memory doubles).
///
/// ## Lifecycle
///
/// 1. Create with [`DdnsEngine::new()`] (loads the cached state)
/// 2. Start the schedule with [`DdnsEngine::run()`]
/// 3. Call [`DdnsEngine::trigger_cycle_now()`] from anywhere, any time
/// 4. Schedule stops on shutdown signal
///
/// ## Threading
///
/// All methods take `&self`; share the engine behind an `Arc` to run the
/// schedule in one task and trigger cycles from others.
pub struct DdnsEngine {
    /// Public IP resolution with retry
    resolver: IpResolver,

    /// DNS record updater
    updater: Box<dyn DnsUpdater>,

    /// Outcome notifier
    notifier: Box<dyn Notifier>,

    /// Durable cache
    cache_store: Box<dyn CacheStore>,

    /// First observation policy
    initial_sync: InitialSync,

    /// Interval between scheduled cycles
    check_interval: Duration,

    /// Time budget for DNS updates and notifications
    request_timeout: Duration,

    /// Held for the whole body of a cycle
    cycle: Mutex<CycleSlot>,

    /// Completed cycle count, readable without the cycle lock
    completed_cycles: AtomicU64,

    /// In-memory cached state, authoritative for the life of the process
    state: watch::Sender<CachedState>,

    /// Whether the scheduler loop is active
    schedule_running: AtomicBool,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

/// Keep a cached address only if it is a usable IPv4 address
///
/// An unusable `currentIP` is dropped so that the in-memory state, the
/// change check and `observed_ip()` agree that nothing is recorded yet.
fn normalize_cached(state: CachedState) -> CachedState {
    if state.is_empty() {
        return state;
    }

    match state.ip() {
        Some(ip) => CachedState {
            current_ip: ip.to_string(),
            last_update: state.last_update,
        },
        None => {
            warn!(
                "Cached currentIP {:?} is not an IPv4 address, ignoring it",
                state.current_ip
            );
            CachedState::default()
        }
    }
}

impl DdnsEngine {
    /// Create a new engine
    ///
    /// Loads the cached state once from `cache_store`.
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub async fn new(
        ip_source: Box<dyn IpSource>,
        updater: Box<dyn DnsUpdater>,
        notifier: Box<dyn Notifier>,
        cache_store: Box<dyn CacheStore>,
        config: &DdnsConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let initial = normalize_cached(cache_store.load().await);
        if initial.is_empty() {
            info!("No cached IP, next cycle is a first observation");
        } else {
            info!("Cache loaded: currentIP={}", initial.current_ip);
        }

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);
        let (state, _) = watch::channel(initial);

        let engine = Self {
            resolver: IpResolver::new(
                ip_source,
                config.retry_attempts,
                config.retry_delay(),
                config.request_timeout(),
            ),
            updater,
            notifier,
            cache_store,
            initial_sync: config.initial_sync,
            check_interval: config.check_interval(),
            request_timeout: config.request_timeout(),
            cycle: Mutex::new(CycleSlot::default()),
            completed_cycles: AtomicU64::new(0),
            state,
            schedule_running: AtomicBool::new(false),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Run the schedule until SIGINT (Ctrl-C)
    ///
    /// Runs one cycle immediately, then one per check interval.
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the schedule until `shutdown_rx` fires (or its sender is dropped)
    ///
    /// With `None`, behaves like [`DdnsEngine::run()`].
    pub async fn run_with_shutdown(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        if self
            .schedule_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::Other("Schedule is already running".to_string()));
        }
        let _running = ScheduleGuard(&self.schedule_running);

        info!("Starting schedule (interval: {:?})", self.check_interval);
        self.emit_event(EngineEvent::Started {
            check_interval: self.check_interval,
        });

        let shutdown = async {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for Ctrl-C: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
        };
        tokio::pin!(shutdown);

        // The first tick completes immediately: that is the startup cycle
        let mut ticker = tokio::time::interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                // Shutdown wins over a tick that is due at the same time
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }

                _ = ticker.tick() => {
                    // A slow cycle must not hold up shutdown; dropping it
                    // releases the cycle lock and leaves the last persisted state
                    tokio::select! {
                        biased;

                        _ = &mut shutdown => {
                            warn!("Shutdown signal received during a cycle, abandoning it");
                            break;
                        }

                        _ = self.scheduled_cycle() => {}
                    }
                }
            }
        }

        self.emit_event(EngineEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });
        info!("Schedule stopped");

        Ok(())
    }

    /// Run one cycle now
    ///
    /// If a cycle is already in flight, waits for it and returns its outcome
    /// (with `coalesced = true`) instead of running another.
    pub async fn trigger_cycle_now(&self) -> CycleOutcome {
        let seen = self.completed_cycles.load(Ordering::SeqCst);
        let mut slot = self.cycle.lock().await;

        if self.completed_cycles.load(Ordering::SeqCst) != seen
            && let Some(outcome) = &slot.last_outcome
        {
            debug!("A cycle completed while waiting for the lock, reusing its outcome");
            let mut outcome = outcome.clone();
            outcome.coalesced = true;
            return outcome;
        }

        self.run_cycle(&mut slot, CycleTrigger::Manual).await
    }

    /// Current cached IP, empty if none recorded yet
    ///
    /// Point-in-time snapshot; does not wait for an in-flight cycle.
    pub fn observed_ip(&self) -> String {
        self.state.borrow().current_ip.clone()
    }

    /// Snapshot of the full cached state
    pub fn cached_state(&self) -> CachedState {
        self.state.borrow().clone()
    }

    /// Receiver notified whenever the cached state changes
    pub fn subscribe(&self) -> watch::Receiver<CachedState> {
        self.state.subscribe()
    }

    /// Whether the scheduler loop is active
    pub fn is_schedule_running(&self) -> bool {
        self.schedule_running.load(Ordering::SeqCst)
    }

    /// Timer-driven cycle: skipped if another cycle holds the lock
    async fn scheduled_cycle(&self) {
        match self.cycle.try_lock() {
            Ok(mut slot) => {
                self.run_cycle(&mut slot, CycleTrigger::Scheduled).await;
            }
            Err(_) => {
                debug!("Cycle already in flight, skipping scheduled tick");
                self.emit_event(EngineEvent::TickSkipped);
            }
        }
    }

    /// Cycle body; the caller holds the cycle lock
    async fn run_cycle(&self, slot: &mut CycleSlot, trigger: CycleTrigger) -> CycleOutcome {
        let previous_ip = self.state.borrow().ip();
        debug!("Cycle started ({:?}), cached IP: {:?}", trigger, previous_ip);

        let outcome = match self.resolver.resolve().await {
            None => {
                let message = format!(
                    "failed to resolve IP after {} attempts",
                    self.resolver.attempts()
                );
                self.notify(NotificationEvent::Error {
                    message: message.clone(),
                    last_known_ip: previous_ip,
                })
                .await;
                CycleOutcome::unresolved(previous_ip, message)
            }
            Some(new_ip) if Some(new_ip) == previous_ip => {
                debug!("IP unchanged: {}", new_ip);
                CycleOutcome::unchanged(new_ip)
            }
            Some(new_ip) => self.handle_change(previous_ip, new_ip).await,
        };

        slot.last_outcome = Some(outcome.clone());
        self.completed_cycles.fetch_add(1, Ordering::SeqCst);
        self.emit_event(EngineEvent::CycleCompleted {
            trigger,
            outcome: outcome.clone(),
        });

        outcome
    }

    /// Change path: update, notify, persist
    async fn handle_change(&self, previous_ip: Option<Ipv4Addr>, new_ip: Ipv4Addr) -> CycleOutcome {
        if previous_ip.is_none() && self.initial_sync == InitialSync::RecordOnly {
            info!("Initial IP recorded: {}", new_ip);
            self.notify(NotificationEvent::InitialRecord { ip: new_ip }).await;
            self.persist(new_ip).await;
            return CycleOutcome::changed(previous_ip, new_ip, DnsOutcome::SkippedInitial);
        }

        match previous_ip {
            Some(old) => info!("IP changed: {} -> {}", old, new_ip),
            None => info!("First observation: {}, synchronizing DNS", new_ip),
        }

        let dns = self.update_dns(new_ip).await;

        self.notify(NotificationEvent::IpChanged {
            old_ip: previous_ip,
            new_ip,
            update_succeeded: dns.succeeded(),
            error: dns.error(),
        })
        .await;

        self.persist(new_ip).await;

        CycleOutcome::changed(previous_ip, new_ip, dns)
    }

    /// Single DNS update attempt, no retry
    async fn update_dns(&self, new_ip: Ipv4Addr) -> DnsOutcome {
        let provider = self.updater.provider_name();

        let target = match self.updater.target() {
            Some(target) if self.updater.is_configured() => target,
            _ => {
                warn!("DNS updater '{}' is not configured, skipping DNS update", provider);
                return DnsOutcome::NotConfigured;
            }
        };

        let mut target = target;
        target.value = new_ip.to_string();

        match tokio::time::timeout(self.request_timeout, self.updater.update(&target)).await {
            Ok(Ok(true)) => {
                info!("DNS record {} updated -> {}", target.fqdn(), new_ip);
                DnsOutcome::Updated
            }
            Ok(Ok(false)) => {
                warn!(
                    "DNS provider '{}' did not confirm update of record {}",
                    provider, target.record_id
                );
                DnsOutcome::Unconfirmed
            }
            Ok(Err(e)) => {
                error!("Failed to update DNS record {}: {}", target.fqdn(), e.report());
                DnsOutcome::Failed { message: e.report() }
            }
            Err(_) => {
                let e = Error::timeout(format!(
                    "DNS update via '{}' exceeded {:?}",
                    provider, self.request_timeout
                ));
                error!("{}", e);
                DnsOutcome::Failed { message: e.to_string() }
            }
        }
    }

    /// Deliver a notification within the time budget
    async fn notify(&self, event: NotificationEvent) {
        let kind = event.kind();
        if tokio::time::timeout(self.request_timeout, self.notifier.notify(&event))
            .await
            .is_err()
        {
            warn!(
                "Notifier did not finish within {:?}, abandoning {} event",
                self.request_timeout, kind
            );
        }
    }

    /// Record `ip` in memory, then persist; write failures are logged only
    async fn persist(&self, ip: Ipv4Addr) {
        let state = CachedState::observed(ip);
        self.state.send_replace(state.clone());

        if let Err(e) = self.cache_store.save(&state).await {
            warn!("Failed to save cache (in-memory state remains current): {}", e);
        }
    }

    /// Emit an engine event, dropping it if the channel is full
    fn emit_event(&self, event: EngineEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Event receiver dropped, event discarded");
            }
        }
    }
}
