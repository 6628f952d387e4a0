//! Cache store implementations
//!
//! This module provides concrete implementations of the CacheStore trait.

pub mod file;
pub mod memory;

pub use file::FileCacheStore;
pub use memory::MemoryCacheStore;
