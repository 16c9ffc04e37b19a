//! Redis cache backend
//!
//! Provides a pooled Redis backend for either a single node or a Redis
//! Cluster. Uses deadpool-redis for connection management; the topology is
//! chosen once, at construction, from [`CacheConfig`].

use super::{CacheBackend, MAX_TTL};
use crate::config::{CacheConfig, Topology};
use crate::error::{Error, Result};
use async_trait::async_trait;
use deadpool_redis::{PoolConfig, Runtime};
use redis::aio::ConnectionLike;
use redis::{AsyncCommands, RedisFuture, RedisResult};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Upper bound on the liveness probe run at construction
const PING_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
enum RedisPool {
	Single(deadpool_redis::Pool),
	Cluster(deadpool_redis::cluster::Pool),
}

/// A connection checked out of either pool.
///
/// Dropping it returns the connection to its pool.
enum PooledConnection {
	Single(deadpool_redis::Connection),
	Cluster(deadpool_redis::cluster::Connection),
}

impl ConnectionLike for PooledConnection {
	fn req_packed_command<'a>(&'a mut self, cmd: &'a redis::Cmd) -> RedisFuture<'a, redis::Value> {
		match self {
			PooledConnection::Single(conn) => conn.req_packed_command(cmd),
			PooledConnection::Cluster(conn) => conn.req_packed_command(cmd),
		}
	}

	fn req_packed_commands<'a>(
		&'a mut self,
		cmd: &'a redis::Pipeline,
		offset: usize,
		count: usize,
	) -> RedisFuture<'a, Vec<redis::Value>> {
		match self {
			PooledConnection::Single(conn) => conn.req_packed_commands(cmd, offset, count),
			PooledConnection::Cluster(conn) => conn.req_packed_commands(cmd, offset, count),
		}
	}

	fn get_db(&self) -> i64 {
		match self {
			PooledConnection::Single(conn) => conn.get_db(),
			PooledConnection::Cluster(conn) => conn.get_db(),
		}
	}
}

/// Redis cache backend with connection pooling
///
/// Cloning is cheap and every clone shares the same pool.
#[derive(Clone)]
pub struct RedisBackend {
	pool: RedisPool,
	read_timeout: Duration,
	write_timeout: Duration,
}

impl RedisBackend {
	/// Build the pool for the configured topology and verify it is reachable.
	///
	/// Fails with [`Error::Config`] for an invalid topology and with
	/// [`Error::Connection`] when a `PING` does not succeed within five
	/// seconds. On success `min_idle_conns` connections are opened eagerly.
	/// That happens once, here: the pool does not keep a minimum of idle
	/// connections afterwards, and recycles or drops them as it sees fit.
	///
	/// # Examples
	///
	/// ```no_run
	/// use cacheside_cache::{CacheConfig, RedisBackend};
	///
	/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
	/// let single = RedisBackend::connect(&CacheConfig::single("127.0.0.1:6379")).await?;
	///
	/// let cluster = RedisBackend::connect(&CacheConfig::cluster([
	///     "127.0.0.1:7000",
	///     "127.0.0.1:7001",
	///     "127.0.0.1:7002",
	/// ]))
	/// .await?;
	/// # Ok(())
	/// # }
	/// ```
	pub async fn connect(config: &CacheConfig) -> Result<Self> {
		let topology = config.validate()?;
		let urls = config.node_urls()?;

		let dial_timeout = config.dial_timeout_or_default();
		let mut pool_config = PoolConfig::new(config.pool_size_or_default());
		pool_config.timeouts.wait = Some(dial_timeout);
		pool_config.timeouts.create = Some(dial_timeout);
		pool_config.timeouts.recycle = Some(dial_timeout);

		let pool = match topology {
			Topology::Single => {
				let url = urls
					.into_iter()
					.next()
					.ok_or_else(|| Error::Config("no cache address configured".to_string()))?;
				let mut cfg = deadpool_redis::Config::from_url(url);
				cfg.pool = Some(pool_config);
				let pool = cfg
					.create_pool(Some(Runtime::Tokio1))
					.map_err(|e| Error::Config(format!("failed to create Redis pool: {}", e)))?;
				RedisPool::Single(pool)
			}
			Topology::Cluster => {
				let mut cfg = deadpool_redis::cluster::Config::from_urls(urls);
				cfg.pool = Some(pool_config);
				let pool = cfg.create_pool(Some(Runtime::Tokio1)).map_err(|e| {
					Error::Config(format!("failed to create Redis cluster pool: {}", e))
				})?;
				RedisPool::Cluster(pool)
			}
		};

		let backend = Self {
			pool,
			read_timeout: config.read_timeout_or_default(),
			write_timeout: config.write_timeout_or_default(),
		};

		let probe = match tokio::time::timeout(PING_TIMEOUT, backend.ping()).await {
			Ok(result) => result,
			Err(_) => Err(Error::Backend(format!(
				"PING timed out after {:?}",
				PING_TIMEOUT
			))),
		};
		if let Err(e) = probe {
			backend.close();
			return Err(Error::Connection(e.to_string()));
		}

		backend.warm_up(config.min_idle_conns_or_default()).await;

		info!(
			topology = ?topology,
			pool_size = config.pool_size_or_default(),
			"connected to Redis"
		);
		Ok(backend)
	}

	/// The topology this backend was built for
	pub fn topology(&self) -> Topology {
		match self.pool {
			RedisPool::Single(_) => Topology::Single,
			RedisPool::Cluster(_) => Topology::Cluster,
		}
	}

	/// Whether [`close`](CacheBackend::close) has been called
	pub fn is_closed(&self) -> bool {
		match &self.pool {
			RedisPool::Single(pool) => pool.is_closed(),
			RedisPool::Cluster(pool) => pool.is_closed(),
		}
	}

	async fn connection(&self) -> Result<PooledConnection> {
		match &self.pool {
			RedisPool::Single(pool) => Ok(PooledConnection::Single(pool.get().await?)),
			RedisPool::Cluster(pool) => Ok(PooledConnection::Cluster(pool.get().await?)),
		}
	}

	/// Open `conns` connections and hand them back to the pool as idle ones.
	async fn warm_up(&self, conns: usize) {
		let mut held = Vec::with_capacity(conns);
		for _ in 0..conns {
			match self.connection().await {
				Ok(conn) => held.push(conn),
				Err(e) => {
					warn!(error = %e, opened = held.len(), "failed to open idle Redis connection");
					break;
				}
			}
		}
	}
}

/// Expiry argument for `PSETEX`: at least 1ms, at most [`MAX_TTL`], and
/// never beyond the signed 64-bit range Redis parses.
fn psetex_millis(ttl: Duration) -> u64 {
	let millis = u64::try_from(ttl.min(MAX_TTL).as_millis()).unwrap_or(u64::MAX);
	millis.clamp(1, i64::MAX as u64)
}

/// Run one Redis command under `limit`.
async fn bounded<T>(
	op: &str,
	limit: Duration,
	command: impl Future<Output = RedisResult<T>>,
) -> Result<T> {
	match tokio::time::timeout(limit, command).await {
		Ok(result) => result.map_err(Error::from),
		Err(_) => Err(Error::Backend(format!("{} timed out after {:?}", op, limit))),
	}
}

#[async_trait]
impl CacheBackend for RedisBackend {
	async fn get(&self, key: &str) -> Result<Vec<u8>> {
		let mut conn = self.connection().await?;
		let value: Option<Vec<u8>> = bounded("GET", self.read_timeout, conn.get(key)).await?;

		match value {
			Some(bytes) if !bytes.is_empty() => Ok(bytes),
			_ => Err(Error::CacheMiss),
		}
	}

	async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
		let millis = psetex_millis(ttl);
		let mut conn = self.connection().await?;
		let _: () = bounded("SET", self.write_timeout, conn.pset_ex(key, value, millis)).await?;
		Ok(())
	}

	async fn del(&self, keys: &[&str]) -> Result<()> {
		if keys.is_empty() {
			return Ok(());
		}

		let mut conn = self.connection().await?;
		match self.pool {
			RedisPool::Single(_) => {
				let _: () = bounded("DEL", self.write_timeout, conn.del(keys)).await?;
			}
			RedisPool::Cluster(_) => {
				// Keys can live in different hash slots, and a multi-key DEL
				// across slots fails with CROSSSLOT.
				for key in keys {
					let _: () = bounded("DEL", self.write_timeout, conn.del(*key)).await?;
				}
			}
		}
		Ok(())
	}

	async fn ping(&self) -> Result<()> {
		let mut conn = self.connection().await?;
		let _: () = bounded(
			"PING",
			self.read_timeout,
			redis::cmd("PING").query_async(&mut conn),
		)
		.await?;
		Ok(())
	}

	fn close(&self) {
		if self.is_closed() {
			return;
		}
		match &self.pool {
			RedisPool::Single(pool) => pool.close(),
			RedisPool::Cluster(pool) => pool.close(),
		}
		info!(topology = ?self.topology(), "closed Redis pool");
	}
}
