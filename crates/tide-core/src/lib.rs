// # tide-core
//
// Core library for the tide dynamic DNS synchronizer.
//
// ## Architecture Overview
//
// This library keeps one DNS record in sync with the public IP the host is
// seen from:
// - **IpSource**: Trait for asking a remote echo service for the public IP
// - **IpResolver**: Bounded retry and IPv4 validation on top of an IpSource
// - **DnsUpdater**: Trait for writing the new address to a DNS record
// - **Notifier**: Trait for telling people what happened
// - **CacheStore**: Trait for persisting the last observed IP
// - **DdnsEngine**: The polling state machine wiring all of the above
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from implementations
// 2. **Explicit Wiring**: The engine is built from trait objects, no globals
// 3. **One Cycle at a Time**: Timer and manual triggers share one cycle lock
// 4. **Library-First**: All core functionality can be used as a library
// 5. **Never Fatal**: No single cycle outcome stops the schedule

pub mod traits;
pub mod engine;
pub mod resolver;
pub mod config;
pub mod error;
pub mod state;

// Re-export core types for convenience
pub use traits::{
    CacheStore, CachedState, DisabledUpdater, DnsRecordTarget, DnsUpdater, IpSource,
    NoopNotifier, NotificationEvent, Notifier,
};
pub use engine::{CycleOutcome, CycleTrigger, DdnsEngine, DnsOutcome, EngineEvent};
pub use resolver::{IpResolver, normalize_ipv4};
pub use config::{DdnsConfig, DnsTargetConfig, InitialSync, NotificationConfig};
pub use error::{Error, Result};
pub use state::{FileCacheStore, MemoryCacheStore};
