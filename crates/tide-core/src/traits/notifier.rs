// # Notifier Trait
//
// Defines the interface for reporting cycle outcomes to people.
//
// ## Implementations
//
// - Webhook (markdown messages): `tide-notify-webhook` crate
// - [`NoopNotifier`]: notifications disabled
//
// Notification is strictly observational. Implementations log their own
// transport failures and never hand them back to the engine.

use async_trait::async_trait;
use std::net::Ipv4Addr;

/// An event worth telling a human about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    /// First address ever recorded (only with `InitialSync::RecordOnly`)
    InitialRecord {
        ip: Ipv4Addr,
    },

    /// The observed address differs from the cached one
    IpChanged {
        /// Previously cached address, `None` on the very first observation
        old_ip: Option<Ipv4Addr>,
        new_ip: Ipv4Addr,
        /// Whether the DNS record was confirmed updated
        update_succeeded: bool,
        /// Why the update did not succeed, if it was attempted
        error: Option<String>,
    },

    /// The cycle could not complete
    Error {
        message: String,
        last_known_ip: Option<Ipv4Addr>,
    },
}

impl NotificationEvent {
    /// Short event kind, for log lines
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationEvent::InitialRecord { .. } => "initial_record",
            NotificationEvent::IpChanged { .. } => "ip_changed",
            NotificationEvent::Error { .. } => "error",
        }
    }
}

/// Trait for notifier implementations
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver an event, best-effort
    ///
    /// Must not fail the caller: errors are logged by the implementation.
    async fn notify(&self, event: &NotificationEvent);

    /// Whether the notifier is disabled or usable as configured
    ///
    /// Used for startup diagnostics only.
    fn validate_config(&self) -> bool;
}

/// Notifier that drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, event: &NotificationEvent) {
        tracing::trace!("Notifications disabled, dropping {} event", event.kind());
    }

    fn validate_config(&self) -> bool {
        true
    }
}
