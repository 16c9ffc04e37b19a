//! Cache module.
//!
//! Redis backends and the cache-aside engine.
//!
//! # Examples
//!
//! ```rust,no_run
//! use cacheside::cache::{CacheAside, CacheConfig};
//! ```

pub use cacheside_cache::*;
