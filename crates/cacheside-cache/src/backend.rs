//! Cache backends
//!
//! A backend is the raw byte-level request surface of a cache deployment.
//! Higher layers never see the topology behind it.
//!
//! - [`RedisBackend`]: pooled Redis, single node or cluster
//! - [`InMemoryBackend`]: process-local map with expiry, for development and tests

mod in_memory;
mod redis_backend;

pub use self::in_memory::InMemoryBackend;
pub use self::redis_backend::RedisBackend;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Longest TTL a backend stores; longer requests are clamped to it.
///
/// One hundred years: effectively never, and well inside the range of both
/// `Instant` arithmetic and the Redis millisecond expiry clock.
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Byte-level cache operations shared by every topology
#[async_trait]
pub trait CacheBackend: Send + Sync {
	/// Read the raw payload stored under `key`.
	///
	/// Fails with [`Error::CacheMiss`](crate::Error::CacheMiss) when the key
	/// is absent or its value is empty.
	async fn get(&self, key: &str) -> Result<Vec<u8>>;

	/// Overwrite `key` with `value`, expiring after `ttl`.
	///
	/// A `ttl` beyond [`MAX_TTL`] is stored as `MAX_TTL`.
	async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

	/// Delete every key in `keys`.
	///
	/// Absent keys are not an error and an empty slice succeeds without
	/// touching the network.
	async fn del(&self, keys: &[&str]) -> Result<()>;

	/// Liveness probe
	async fn ping(&self) -> Result<()>;

	/// Release pooled connections. Calling it again is a no-op.
	fn close(&self);
}
