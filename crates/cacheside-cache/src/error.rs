//! Cache error types
//!
//! Every layer of the crate reports failures through [`Error`]. The variants
//! are coarse: callers mostly need to tell a cache miss apart
//! from everything else, and a cache failure apart from a store failure.

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error carried by [`Error::Store`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Unified error type for cache and store access
#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// The key is absent from the cache or holds an empty value.
	///
	/// This is the only error that makes the cache-aside path fall back to
	/// the store.
	#[error("cache: key not found")]
	CacheMiss,

	/// Invalid cache topology or pool settings
	#[error("cache configuration error: {0}")]
	Config(String),

	/// The liveness probe run at construction failed
	#[error("failed to connect to cache: {0}")]
	Connection(String),

	/// Network, protocol or pool failure during a cache operation
	#[error("cache backend error: {0}")]
	Backend(String),

	/// A cached payload could not be encoded or decoded
	#[error("cache serialization error: {0}")]
	Serialization(String),

	/// Failure reported by the durable store, passed through unchanged
	#[error(transparent)]
	Store(BoxError),
}

impl Error {
	/// Wrap a store-side failure.
	///
	/// # Examples
	///
	/// ```
	/// use cacheside_cache::Error;
	///
	/// let err = Error::store(std::io::Error::other("disk on fire"));
	/// assert!(err.is_store());
	/// assert_eq!(err.to_string(), "disk on fire");
	/// ```
	pub fn store(err: impl Into<BoxError>) -> Self {
		Error::Store(err.into())
	}

	/// Returns `true` for the miss signal.
	pub fn is_miss(&self) -> bool {
		matches!(self, Error::CacheMiss)
	}

	pub fn is_store(&self) -> bool {
		matches!(self, Error::Store(_))
	}

	/// Borrow the wrapped store error as a concrete type.
	pub fn store_error<E>(&self) -> Option<&E>
	where
		E: std::error::Error + 'static,
	{
		match self {
			Error::Store(inner) => inner.downcast_ref::<E>(),
			_ => None,
		}
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Error::Serialization(err.to_string())
	}
}

impl From<redis::RedisError> for Error {
	fn from(err: redis::RedisError) -> Self {
		if err.is_timeout() {
			Error::Backend(format!("timed out: {}", err))
		} else if err.is_connection_refusal() || err.is_connection_dropped() {
			Error::Backend(format!("connection lost: {}", err))
		} else {
			Error::Backend(err.to_string())
		}
	}
}

// Single-node and cluster pools share this error type.
impl From<deadpool_redis::PoolError> for Error {
	fn from(err: deadpool_redis::PoolError) -> Self {
		Error::Backend(format!("failed to get connection from pool: {}", err))
	}
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Error::Store(Box::new(err))
	}
}
