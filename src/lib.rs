//! # Cacheside
//!
//! Cache-aside data access: reads are served from Redis when possible and
//! fall back to the SQL store on a miss; writes go to the store and then
//! invalidate the affected cache keys.
//!
//! ## Crates
//!
//! - [`cache`]: cache backends (single-node or cluster Redis, in-memory)
//!   and the [`CacheAside`] engine
//! - [`db`]: [`CachedConn`], binding a sqlx pool to an engine
//!
//! ## Feature Flags
//!
//! - `db` (default): cached SQL connections
//! - `testing`: fault-injecting backend for downstream tests
//! - `integration-tests`: Redis-backed tests (requires Docker)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cacheside::prelude::*;
//! use serde::{Deserialize, Serialize};
//! use sqlx::PgPool;
//! use std::time::Duration;
//!
//! #[derive(Serialize, Deserialize, sqlx::FromRow)]
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//!
//! # async fn example() -> Result<()> {
//! let pool = PgPool::connect("postgres://localhost/app").await?;
//! let config = CacheConfig::cluster(["10.0.0.1:7000", "10.0.0.2:7000", "10.0.0.3:7000"]);
//! let conn = CachedConn::new(pool, &config, Duration::from_secs(600)).await?;
//!
//! let user: User = conn
//!     .query("user:1", |pool| async move {
//!         Ok(sqlx::query_as("SELECT id, name FROM users WHERE id = $1")
//!             .bind(1_i64)
//!             .fetch_one(&pool)
//!             .await?)
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
#[cfg(feature = "db")]
pub mod db;

pub use cacheside_cache::{
	CacheAside, CacheBackend, CacheConfig, Error, InMemoryBackend, RedisBackend, Result, Topology,
};
#[cfg(feature = "db")]
pub use cacheside_db::{CachedConn, Store};

/// Common imports
pub mod prelude {
	pub use cacheside_cache::{CacheAside, CacheBackend, CacheConfig, Error, Result};
	#[cfg(feature = "db")]
	pub use cacheside_db::{CachedConn, Store};
}
