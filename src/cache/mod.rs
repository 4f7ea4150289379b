//! # Shared Instance Cache
//!
//! Process-wide store of instance documents fetched by cacheable submissions.

pub mod shared_instances;

pub use shared_instances::{CacheKey, CacheStats, CachedInstance, SharedInstanceCache};
