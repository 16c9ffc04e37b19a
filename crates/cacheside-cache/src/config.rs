//! Cache topology and pool configuration

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const DEFAULT_POOL_SIZE: usize = 10;
pub const DEFAULT_MIN_IDLE_CONNS: usize = 2;
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(3);

/// How the cache is deployed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
	/// One addressable node, optionally with a logical database index
	Single,
	/// A sharded Redis Cluster with client-side routing
	Cluster,
}

/// Redis connection settings
///
/// Exactly one topology must be named: `addr` for a single node or
/// `cluster_addrs` for a cluster. When both are present the cluster wins and
/// `addr` is ignored. Unset numeric and duration fields fall back to the
/// `DEFAULT_*` constants of this module.
///
/// # Examples
///
/// ```
/// use cacheside_cache::{CacheConfig, Topology};
/// use std::time::Duration;
///
/// let config = CacheConfig::single("127.0.0.1:6379")
///     .with_db(1)
///     .with_pool_size(32)
///     .with_read_timeout(Duration::from_millis(500));
///
/// assert_eq!(config.validate().unwrap(), Topology::Single);
/// assert_eq!(config.pool_size_or_default(), 32);
/// assert_eq!(config.min_idle_conns_or_default(), 2);
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
	/// Single node address (`host:port` or a `redis://` URL)
	pub addr: Option<String>,
	/// Password applied to every node
	pub password: Option<String>,
	/// Logical database index (single node only)
	pub db: Option<i64>,
	/// Cluster member addresses
	pub cluster_addrs: Vec<String>,
	/// Maximum number of pooled connections
	pub pool_size: Option<usize>,
	/// Connections opened eagerly at construction
	pub min_idle_conns: Option<usize>,
	/// Bound on establishing a connection or waiting for a pooled one
	pub dial_timeout: Option<Duration>,
	/// Bound on each read command
	pub read_timeout: Option<Duration>,
	/// Bound on each write command
	pub write_timeout: Option<Duration>,
}

impl CacheConfig {
	/// Configuration for a single Redis node
	pub fn single(addr: impl Into<String>) -> Self {
		Self {
			addr: Some(addr.into()),
			..Self::default()
		}
	}

	/// Configuration for a Redis Cluster
	pub fn cluster<I, S>(addrs: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			cluster_addrs: addrs.into_iter().map(Into::into).collect(),
			..Self::default()
		}
	}

	pub fn with_password(mut self, password: impl Into<String>) -> Self {
		self.password = Some(password.into());
		self
	}

	pub fn with_db(mut self, db: i64) -> Self {
		self.db = Some(db);
		self
	}

	pub fn with_pool_size(mut self, size: usize) -> Self {
		self.pool_size = Some(size);
		self
	}

	pub fn with_min_idle_conns(mut self, conns: usize) -> Self {
		self.min_idle_conns = Some(conns);
		self
	}

	pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
		self.dial_timeout = Some(timeout);
		self
	}

	pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
		self.read_timeout = Some(timeout);
		self
	}

	pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
		self.write_timeout = Some(timeout);
		self
	}

	/// Check the topology settings and report which one is in use.
	///
	/// # Examples
	///
	/// ```
	/// use cacheside_cache::CacheConfig;
	///
	/// // Nothing to connect to
	/// assert!(CacheConfig::default().validate().is_err());
	///
	/// // Clusters have no logical databases
	/// let config = CacheConfig::cluster(["10.0.0.1:7000", "10.0.0.2:7000"]).with_db(2);
	/// assert!(config.validate().is_err());
	/// ```
	pub fn validate(&self) -> Result<Topology> {
		if !self.cluster_addrs.is_empty() {
			if self.db.is_some() {
				return Err(Error::Config(
					"a database index cannot be combined with cluster addresses".to_string(),
				));
			}
			if self.cluster_addrs.iter().any(|addr| addr.trim().is_empty()) {
				return Err(Error::Config(
					"cluster addresses must not be empty".to_string(),
				));
			}
			return Ok(Topology::Cluster);
		}

		match self.addr.as_deref().map(str::trim) {
			Some(addr) if !addr.is_empty() => Ok(Topology::Single),
			_ => Err(Error::Config(
				"either addr or cluster_addrs must be set".to_string(),
			)),
		}
	}

	pub fn pool_size_or_default(&self) -> usize {
		self.pool_size
			.filter(|size| *size > 0)
			.unwrap_or(DEFAULT_POOL_SIZE)
	}

	/// Never exceeds the pool size.
	pub fn min_idle_conns_or_default(&self) -> usize {
		self.min_idle_conns
			.unwrap_or(DEFAULT_MIN_IDLE_CONNS)
			.min(self.pool_size_or_default())
	}

	pub fn dial_timeout_or_default(&self) -> Duration {
		non_zero_or(self.dial_timeout, DEFAULT_DIAL_TIMEOUT)
	}

	pub fn read_timeout_or_default(&self) -> Duration {
		non_zero_or(self.read_timeout, DEFAULT_READ_TIMEOUT)
	}

	pub fn write_timeout_or_default(&self) -> Duration {
		non_zero_or(self.write_timeout, DEFAULT_WRITE_TIMEOUT)
	}

	/// Connection URLs for the configured topology.
	///
	/// A single node yields one URL carrying the password and database
	/// index; a cluster yields one URL per member.
	pub fn node_urls(&self) -> Result<Vec<String>> {
		match self.validate()? {
			Topology::Cluster => self
				.cluster_addrs
				.iter()
				.map(|addr| self.node_url(addr, None))
				.collect(),
			Topology::Single => {
				let addr = self.addr.as_deref().unwrap_or_default();
				Ok(vec![self.node_url(addr, self.db)?])
			}
		}
	}

	fn node_url(&self, addr: &str, db: Option<i64>) -> Result<String> {
		let addr = addr.trim();
		let raw = if addr.contains("://") {
			addr.to_string()
		} else {
			format!("redis://{}", addr)
		};

		let mut url = Url::parse(&raw)
			.map_err(|e| Error::Config(format!("invalid cache address {:?}: {}", addr, e)))?;
		if url.host_str().is_none_or(str::is_empty) {
			return Err(Error::Config(format!(
				"cache address {:?} has no host",
				addr
			)));
		}

		if let Some(password) = &self.password {
			url.set_password(Some(password)).map_err(|_| {
				Error::Config(format!("cannot attach a password to {:?}", addr))
			})?;
		}
		if let Some(db) = db {
			if db < 0 {
				return Err(Error::Config(format!(
					"database index must not be negative, got {}",
					db
				)));
			}
			url.set_path(&format!("/{}", db));
		}

		Ok(url.to_string())
	}
}

fn non_zero_or(value: Option<Duration>, default: Duration) -> Duration {
	value.filter(|d| !d.is_zero()).unwrap_or(default)
}
