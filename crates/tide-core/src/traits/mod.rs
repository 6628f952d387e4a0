//! Core traits for the tide system
//!
//! This module defines the abstract interfaces the engine is wired from.
//!
//! - [`IpSource`]: Fetch the public IP once from a remote echo service
//! - [`DnsUpdater`]: Apply a new value to one DNS record
//! - [`Notifier`]: Emit human-facing events to an external channel
//! - [`CacheStore`]: Persist the last observed IP across restarts

pub mod ip_source;
pub mod dns_updater;
pub mod notifier;
pub mod cache_store;

pub use ip_source::IpSource;
pub use dns_updater::{DnsUpdater, DnsRecordTarget, DisabledUpdater};
pub use notifier::{Notifier, NotificationEvent, NoopNotifier};
pub use cache_store::{CacheStore, CachedState};
