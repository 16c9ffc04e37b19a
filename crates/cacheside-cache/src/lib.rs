//! # Cacheside Cache
//!
//! Redis-backed cache-aside primitives.
//!
//! ## Features
//!
//! - **Backends**: [`RedisBackend`] for a single node or a Redis Cluster,
//!   [`InMemoryBackend`] for development and tests
//! - **Cache-Aside Engine**: [`CacheAside`] with JSON encoding, lazy
//!   population and per-call expiry policies
//! - **Distinct Miss Signal**: [`Error::CacheMiss`] is never confused with a
//!   backend failure
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cacheside_cache::{CacheAside, CacheConfig, Error};
//! use std::time::Duration;
//!
//! # async fn example() -> cacheside_cache::Result<()> {
//! let config = CacheConfig::single("127.0.0.1:6379").with_pool_size(20);
//! let cache = CacheAside::connect(&config, Duration::from_secs(600)).await?;
//!
//! let greeting: String = cache
//!     .take("greeting", || async { Ok::<_, Error>("hello".to_string()) })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `sqlx`: converts `sqlx::Error` into [`Error::Store`]
//! - `testing`: exposes [`testing::FaultyBackend`]
//! - `integration-tests`: Redis tests backed by testcontainers

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use backend::{CacheBackend, InMemoryBackend, MAX_TTL, RedisBackend};
pub use config::{CacheConfig, Topology};
pub use engine::CacheAside;
pub use error::{BoxError, Error, Result};
