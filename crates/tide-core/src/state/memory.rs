// # Memory Cache Store
//
// In-memory implementation of CacheStore.
//
// ## Crash Behavior
//
// - All state is lost on restart
// - The first cycle after a restart is a first observation
//
// ## When to Use
//
// - Testing environments
// - Deployments where a DNS write on every start is acceptable

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::cache_store::{CacheStore, CachedState};

/// In-memory cache store
///
/// Clones share the same underlying state.
///
/// # Example
///
/// ```rust
/// use tide_core::state::MemoryCacheStore;
/// use tide_core::traits::{CacheStore, CachedState};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryCacheStore::new();
///     assert!(store.load().await.is_empty());
///
///     store.save(&CachedState::observed("1.2.3.4".parse()?)).await?;
///     assert_eq!(store.load().await.current_ip, "1.2.3.4");
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStore {
    inner: Arc<RwLock<CachedState>>,
}

impl MemoryCacheStore {
    /// Create a new empty memory cache store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `state`
    pub fn with_state(state: CachedState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn load(&self) -> CachedState {
        self.inner.read().await.clone()
    }

    async fn save(&self, state: &CachedState) -> Result<(), Error> {
        *self.inner.write().await = state.clone();
        Ok(())
    }
}
