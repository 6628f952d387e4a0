// # tided - tide DDNS daemon
//
// Thin integration layer: all synchronization logic lives in tide-core.
//
// The daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Wiring the IP source, DNS updater, notifier and cache store
// 4. Running the engine until SIGTERM/SIGINT
//
// ## Configuration
//
// ### IP Source
// - `DDNS_IP_SOURCE_URL`: IP-echo service URL (required)
//
// ### Schedule
// - `DDNS_CHECK_INTERVAL_SECS`: Seconds between cycles (default 30)
// - `DDNS_RETRY_ATTEMPTS`: Resolver attempts per cycle (default 3)
// - `DDNS_RETRY_DELAY_SECS`: Delay between attempts (default 2)
// - `DDNS_REQUEST_TIMEOUT_SECS`: Budget per network call (default 10)
// - `DDNS_INITIAL_SYNC`: `update` or `record-only` (default update)
//
// ### Cache
// - `DDNS_CACHE_FILE`: Path of the IP cache (default ./cache/ip-cache.json)
//
// ### DNS Record (Alibaba Cloud DNS)
// - `DDNS_ALIDNS_ACCESS_KEY_ID`, `DDNS_ALIDNS_ACCESS_KEY_SECRET`: Credentials
// - `DDNS_ALIDNS_ENDPOINT`: RPC endpoint (optional)
// - `DDNS_DOMAIN_NAME`, `DDNS_RECORD_NAME`, `DDNS_RECORD_ID`: Record
// - `DDNS_RECORD_TYPE`: Record type (default A)
//
// ### Notifications
// - `DDNS_WEBHOOK_ENABLED`: true/false (default false)
// - `DDNS_WEBHOOK_URL`: Webhook URL
//
// ### Daemon
// - `DDNS_LOG_LEVEL`: trace, debug, info, warn, error (default info)
// - `DDNS_MODE`: `live` or `dry-run` (default live)
//
// ## Signals
//
// - SIGTERM / SIGINT: graceful shutdown
// - SIGUSR1: run a cycle now
//
// ## Example
//
// ```bash
// export DDNS_IP_SOURCE_URL=https://ip.example.com/api/get-my-ip
// export DDNS_ALIDNS_ACCESS_KEY_ID=...
// export DDNS_ALIDNS_ACCESS_KEY_SECRET=...
// export DDNS_DOMAIN_NAME=example.com
// export DDNS_RECORD_NAME=home
// export DDNS_RECORD_ID=1234567890
//
// tided
// ```

use anyhow::Result;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tide_core::{
    CacheStore, CycleOutcome, CycleTrigger, DdnsConfig, DdnsEngine, DnsOutcome, DnsTargetConfig,
    DnsUpdater, EngineEvent, FileCacheStore, InitialSync, NotificationConfig, Notifier,
};
use tide_ip_http::HttpIpSource;
use tokio::sync::{mpsc, oneshot};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};

/// How long the schedule may take to stop after a shutdown signal
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DdnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DdnsExitCode> for ExitCode {
    fn from(code: DdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    ddns: DdnsConfig,
    alidns_endpoint: Option<String>,
    dry_run: bool,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup`; empty values count as unset
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let ip_source_url = get("DDNS_IP_SOURCE_URL").ok_or_else(|| {
            anyhow::anyhow!(
                "DDNS_IP_SOURCE_URL is required. \
                Set it via: export DDNS_IP_SOURCE_URL=https://ip.example.com/api/get-my-ip"
            )
        })?;

        let mut ddns = DdnsConfig::new(ip_source_url);

        if let Some(v) = parse_number(&get, "DDNS_CHECK_INTERVAL_SECS")? {
            ddns.check_interval_secs = v;
        }
        if let Some(v) = parse_number(&get, "DDNS_RETRY_ATTEMPTS")? {
            ddns.retry_attempts = v;
        }
        if let Some(v) = parse_number(&get, "DDNS_RETRY_DELAY_SECS")? {
            ddns.retry_delay_secs = v;
        }
        if let Some(v) = parse_number(&get, "DDNS_REQUEST_TIMEOUT_SECS")? {
            ddns.request_timeout_secs = v;
        }
        if let Some(path) = get("DDNS_CACHE_FILE") {
            ddns.cache_file_path = path;
        }
        if let Some(mode) = get("DDNS_INITIAL_SYNC") {
            ddns.initial_sync = mode
                .parse::<InitialSync>()
                .map_err(|e| anyhow::anyhow!("DDNS_INITIAL_SYNC: {}", e))?;
        }

        let dns_vars = [
            "DDNS_ALIDNS_ACCESS_KEY_ID",
            "DDNS_ALIDNS_ACCESS_KEY_SECRET",
            "DDNS_DOMAIN_NAME",
            "DDNS_RECORD_NAME",
            "DDNS_RECORD_ID",
        ];
        if dns_vars.iter().any(|name| get(name).is_some()) {
            ddns.dns = Some(DnsTargetConfig {
                record_id: get("DDNS_RECORD_ID").unwrap_or_default(),
                domain_name: get("DDNS_DOMAIN_NAME").unwrap_or_default(),
                record_name: get("DDNS_RECORD_NAME").unwrap_or_default(),
                record_type: get("DDNS_RECORD_TYPE").unwrap_or_else(|| "A".to_string()),
                access_key_id: get("DDNS_ALIDNS_ACCESS_KEY_ID").unwrap_or_default(),
                access_key_secret: get("DDNS_ALIDNS_ACCESS_KEY_SECRET").unwrap_or_default(),
            });
        }

        let webhook_enabled = match get("DDNS_WEBHOOK_ENABLED") {
            Some(v) => parse_bool("DDNS_WEBHOOK_ENABLED", &v)?,
            None => false,
        };
        let webhook_url = get("DDNS_WEBHOOK_URL");
        if webhook_enabled || webhook_url.is_some() {
            ddns.notification = Some(NotificationConfig {
                enabled: webhook_enabled,
                webhook_url,
            });
        }

        let dry_run = match get("DDNS_MODE").as_deref() {
            None | Some("live") => false,
            Some("dry-run") | Some("dry_run") => true,
            Some(other) => anyhow::bail!(
                "DDNS_MODE '{}' is not valid. Valid modes: live, dry-run",
                other
            ),
        };

        Ok(Self {
            ddns,
            alidns_endpoint: get("DDNS_ALIDNS_ENDPOINT"),
            dry_run,
            log_level: get("DDNS_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        self.ddns.validate()?;

        if self.ddns.cache_file_path.ends_with('/') {
            anyhow::bail!(
                "DDNS_CACHE_FILE must name a file, not a directory. Got: {}",
                self.ddns.cache_file_path
            );
        }

        if let Some(dns) = &self.ddns.dns {
            if !dns.record_type.eq_ignore_ascii_case("A") {
                anyhow::bail!(
                    "DDNS_RECORD_TYPE '{}' is not supported. Only A records are synchronized.",
                    dns.record_type
                );
            }

            if !dns.domain_name.is_empty() {
                validate_domain_name(&dns.domain_name)?;
            }
        }

        if let Some(ref endpoint) = self.alidns_endpoint
            && !endpoint.starts_with("https://")
            && !endpoint.starts_with("http://")
        {
            anyhow::bail!(
                "DDNS_ALIDNS_ENDPOINT must use HTTP or HTTPS scheme. Got: {}",
                endpoint
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "DDNS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }
}

fn parse_number<T>(get: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get(name)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| anyhow::anyhow!("{} must be a non-negative integer. Got '{}': {}", name, raw, e))
        })
        .transpose()
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("{} must be true or false. Got: {}", name, raw),
    }
}

/// Validate that a string is a valid domain name
///
/// Basic RFC 1035 checks; catches common typos.
fn validate_domain_name(domain: &str) -> Result<()> {
    if domain.len() > 253 {
        anyhow::bail!(
            "Domain name too long: {} chars (max 253). Got: {}",
            domain.len(),
            domain
        );
    }

    for label in domain.split('.') {
        if label.is_empty() {
            anyhow::bail!("Domain name has empty label: '{}'", domain);
        }

        if label.len() > 63 {
            anyhow::bail!(
                "Domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            );
        }

        if !label.chars().all(|c| c.is_alphanumeric() || c == '-') {
            anyhow::bail!(
                "Domain label contains invalid characters. Label: '{}'. \
                Valid: alphanumeric and hyphen only.",
                label
            );
        }

        if label.starts_with('-') || label.ends_with('-') {
            anyhow::bail!(
                "Domain label cannot start or end with hyphen. Label: '{}'",
                label
            );
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return DdnsExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DdnsExitCode::ConfigError.into();
    }

    info!("Starting tided {}", env!("CARGO_PKG_VERSION"));

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DdnsExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {}", e);
            DdnsExitCode::RuntimeError
        } else {
            DdnsExitCode::CleanShutdown
        }
    });

    result.into()
}

#[cfg(feature = "alidns")]
fn build_updater(config: &Config) -> Box<dyn DnsUpdater> {
    let Some(dns) = config.ddns.dns.clone() else {
        return Box::new(tide_core::DisabledUpdater);
    };

    let mut updater = tide_provider_alidns::AliDnsUpdater::new(dns)
        .with_timeout(config.ddns.request_timeout())
        .with_dry_run(config.dry_run);
    if let Some(endpoint) = &config.alidns_endpoint {
        updater = updater.with_endpoint(endpoint.clone());
    }
    if config.dry_run {
        warn!("DRY-RUN mode: DNS records will not be modified");
    }

    Box::new(updater)
}

#[cfg(not(feature = "alidns"))]
fn build_updater(config: &Config) -> Box<dyn DnsUpdater> {
    if config.ddns.dns.is_some() {
        warn!("DNS record configured but tided was built without the 'alidns' feature");
    }
    Box::new(tide_core::DisabledUpdater)
}

#[cfg(feature = "webhook")]
fn build_notifier(config: &Config) -> Box<dyn Notifier> {
    let Some(notification) = config.ddns.notification.clone() else {
        return Box::new(tide_core::NoopNotifier);
    };

    let (domain, record) = config
        .ddns
        .dns
        .as_ref()
        .map(|dns| (dns.domain_name.clone(), dns.record_name.clone()))
        .unwrap_or_default();

    Box::new(
        tide_notify_webhook::WebhookNotifier::new(notification, domain, record)
            .with_timeout(config.ddns.request_timeout()),
    )
}

#[cfg(not(feature = "webhook"))]
fn build_notifier(config: &Config) -> Box<dyn Notifier> {
    if config.ddns.notification.as_ref().is_some_and(|n| n.enabled) {
        warn!("Webhook enabled but tided was built without the 'webhook' feature");
    }
    Box::new(tide_core::NoopNotifier)
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let ip_source = HttpIpSource::with_timeout(
        config.ddns.ip_source_url.clone(),
        config.ddns.request_timeout(),
    );
    let updater = build_updater(&config);
    let notifier = build_notifier(&config);
    let cache_store: Box<dyn CacheStore> =
        Box::new(FileCacheStore::new(&config.ddns.cache_file_path));

    // Startup diagnostics: problems are reported, never fatal
    info!("IP source: {}", config.ddns.ip_source_url);
    info!("Cache file: {}", config.ddns.cache_file_path);
    info!(
        "Check interval: {}s, retry: {} x {}s, request timeout: {}s",
        config.ddns.check_interval_secs,
        config.ddns.retry_attempts,
        config.ddns.retry_delay_secs,
        config.ddns.request_timeout_secs
    );
    match updater.target() {
        Some(target) if updater.is_configured() => {
            info!(
                "Managing record: {} ({}, id {}) via {}",
                target.fqdn(),
                target.record_type,
                target.record_id,
                updater.provider_name()
            );
        }
        _ => {
            let missing = config
                .ddns
                .dns
                .as_ref()
                .map(|dns| dns.missing_fields())
                .unwrap_or_default();
            warn!(
                "DNS updates disabled: record not fully configured (missing: {:?}). \
                The IP will be tracked and notified only.",
                missing
            );
        }
    }
    if !notifier.validate_config() {
        warn!("Notifier configuration is invalid; notifications will not be delivered");
    }

    let (engine, events) =
        DdnsEngine::new(Box::new(ip_source), updater, notifier, cache_store, &config.ddns).await?;
    let engine = Arc::new(engine);

    let event_task = tokio::spawn(log_events(events));

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let runner = Arc::clone(&engine);
    let mut engine_task =
        tokio::spawn(async move { runner.run_with_shutdown(Some(shutdown_rx)).await });

    let mut signals = Signals::new()?;

    info!("Daemon initialized, press Ctrl-C to stop");

    let signal_name = loop {
        tokio::select! {
            signal = signals.next() => match signal {
                DaemonSignal::Shutdown(name) => break name,
                DaemonSignal::TriggerCycle => {
                    info!("Received SIGUSR1, running a cycle now");
                    let engine = Arc::clone(&engine);
                    tokio::spawn(async move {
                        let outcome = engine.trigger_cycle_now().await;
                        info!("Manual cycle finished: {}", describe_outcome(&outcome));
                    });
                }
            },

            result = &mut engine_task => {
                // The schedule only ends on its own if it failed to start
                return match result {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e.into()),
                    Err(e) => Err(anyhow::anyhow!("Engine task failed: {}", e)),
                };
            }
        }
    };

    info!("Received shutdown signal: {}", signal_name);
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, engine_task).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => return Err(e.into()),
        Ok(Err(e)) => return Err(anyhow::anyhow!("Engine task failed: {}", e)),
        Err(_) => {
            return Err(anyhow::anyhow!(
                "Shutdown timeout after {:?}",
                SHUTDOWN_TIMEOUT
            ));
        }
    }

    // Let the event logger print the final events
    drop(engine);
    if tokio::time::timeout(Duration::from_secs(1), event_task)
        .await
        .is_err()
    {
        debug!("Event logger still busy at exit");
    }

    info!("Shutting down daemon");
    Ok(())
}

/// Log engine events until the engine is dropped
async fn log_events(mut events: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::Started { check_interval } => {
                info!("Schedule started (every {:?})", check_interval);
            }
            EngineEvent::CycleCompleted { trigger, outcome } => {
                let origin = match trigger {
                    CycleTrigger::Scheduled => "scheduled",
                    CycleTrigger::Manual => "manual",
                };
                if outcome.error.is_some() {
                    warn!("Cycle ({}) completed: {}", origin, describe_outcome(&outcome));
                } else if outcome.ip_changed {
                    info!("Cycle ({}) completed: {}", origin, describe_outcome(&outcome));
                } else {
                    debug!("Cycle ({}) completed: {}", origin, describe_outcome(&outcome));
                }
            }
            EngineEvent::TickSkipped => {
                debug!("Scheduled tick skipped, a cycle was already running");
            }
            EngineEvent::Stopped { reason } => {
                info!("Schedule stopped: {}", reason);
            }
        }
    }
}

/// One-line summary of a cycle outcome
fn describe_outcome(outcome: &CycleOutcome) -> String {
    let Some(ip) = outcome.observed_ip else {
        return format!(
            "IP not resolved ({})",
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    };

    if !outcome.ip_changed {
        return format!("IP unchanged ({})", ip);
    }

    let from = outcome
        .previous_ip
        .map(|p| p.to_string())
        .unwrap_or_else(|| "none".to_string());
    let dns = match &outcome.dns {
        DnsOutcome::Updated => "DNS updated".to_string(),
        DnsOutcome::NotConfigured => "DNS not configured".to_string(),
        DnsOutcome::SkippedInitial => "initial IP recorded".to_string(),
        DnsOutcome::Unconfirmed => "DNS update not confirmed".to_string(),
        DnsOutcome::NotNeeded => "no DNS update needed".to_string(),
        DnsOutcome::Failed { message } => format!("DNS update failed: {}", message),
    };

    format!("IP changed {} -> {}, {}", from, ip, dns)
}

/// Signals the daemon reacts to
enum DaemonSignal {
    Shutdown(&'static str),
    TriggerCycle,
}

/// SIGTERM, SIGINT and SIGUSR1 handlers
#[cfg(unix)]
struct Signals {
    sigterm: Signal,
    sigint: Signal,
    sigusr1: Signal,
}

#[cfg(unix)]
impl Signals {
    fn new() -> Result<Self> {
        Ok(Self {
            sigterm: signal(SignalKind::terminate())
                .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?,
            sigint: signal(SignalKind::interrupt())
                .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?,
            sigusr1: signal(SignalKind::user_defined1())
                .map_err(|e| anyhow::anyhow!("Failed to setup SIGUSR1 handler: {}", e))?,
        })
    }

    async fn next(&mut self) -> DaemonSignal {
        tokio::select! {
            _ = self.sigterm.recv() => DaemonSignal::Shutdown("SIGTERM"),
            _ = self.sigint.recv() => DaemonSignal::Shutdown("SIGINT"),
            _ = self.sigusr1.recv() => DaemonSignal::TriggerCycle,
        }
    }
}

/// Ctrl-C only; there is no manual trigger signal off Unix
#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn new() -> Result<Self> {
        Ok(Self)
    }

    async fn next(&mut self) -> DaemonSignal {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to wait for CTRL-C: {}", e);
        }
        DaemonSignal::Shutdown("SIGINT")
    }
}
