//! Cache-aside engine
//!
//! [`CacheAside`] layers JSON (de)serialization and lazy population on top
//! of a [`CacheBackend`]. A read goes to the cache first; only a
//! [`Error::CacheMiss`] sends it to the caller's populate callback, whose
//! result is then written back on a best-effort basis.

use crate::backend::{CacheBackend, MAX_TTL, RedisBackend};
use crate::config::CacheConfig;
use crate::error::{Error, Result};
use rand::Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Shortest TTL ever written; Redis rejects a zero expiry.
const MIN_TTL: Duration = Duration::from_millis(1);

/// Largest accepted expiry deviation
const MAX_EXPIRY_DEVIATION: f64 = 0.99;

/// Cache-aside access over a shared backend
///
/// Cloning is cheap; clones share the backend handle. Written TTLs are
/// clamped to `[1ms, MAX_TTL]` after any expiry deviation is applied.
///
/// # Examples
///
/// ```
/// use cacheside_cache::{CacheAside, Error, InMemoryBackend};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> cacheside_cache::Result<()> {
/// let cache = CacheAside::new(Arc::new(InMemoryBackend::new()), Duration::from_secs(300));
///
/// // Miss: the closure runs and its result is cached
/// let name: String = cache
///     .take("user:1:name", || async { Ok::<_, Error>("alice".to_string()) })
///     .await?;
/// assert_eq!(name, "alice");
///
/// // Hit: served from the cache
/// let cached: String = cache.get("user:1:name").await?;
/// assert_eq!(cached, "alice");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CacheAside {
	backend: Arc<dyn CacheBackend>,
	expiry: Duration,
	deviation: f64,
}

impl std::fmt::Debug for CacheAside {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CacheAside")
			.field("expiry", &self.expiry)
			.field("deviation", &self.deviation)
			.finish_non_exhaustive()
	}
}

impl CacheAside {
	/// Wrap an existing backend. `expiry` is the default TTL for writes.
	pub fn new(backend: Arc<dyn CacheBackend>, expiry: Duration) -> Self {
		Self {
			backend,
			expiry,
			deviation: 0.0,
		}
	}

	/// Connect a [`RedisBackend`] for `config` and wrap it.
	pub async fn connect(config: &CacheConfig, expiry: Duration) -> Result<Self> {
		let backend = RedisBackend::connect(config).await?;
		Ok(Self::new(Arc::new(backend), expiry))
	}

	/// Spread written TTLs uniformly over `ttl * (1 ± deviation)`.
	///
	/// Entries populated together then do not all expire together. The
	/// deviation is clamped to `[0.0, 0.99]`; non-finite values disable it.
	///
	/// # Examples
	///
	/// ```
	/// use cacheside_cache::{CacheAside, InMemoryBackend};
	/// use std::sync::Arc;
	/// use std::time::Duration;
	///
	/// let cache = CacheAside::new(Arc::new(InMemoryBackend::new()), Duration::from_secs(60))
	///     .with_expiry_deviation(0.05);
	/// assert_eq!(cache.expiry_deviation(), 0.05);
	/// ```
	pub fn with_expiry_deviation(mut self, deviation: f64) -> Self {
		self.deviation = if deviation.is_finite() {
			deviation.clamp(0.0, MAX_EXPIRY_DEVIATION)
		} else {
			0.0
		};
		self
	}

	pub fn default_expiry(&self) -> Duration {
		self.expiry
	}

	pub fn expiry_deviation(&self) -> f64 {
		self.deviation
	}

	/// The shared backend handle
	pub fn backend(&self) -> &Arc<dyn CacheBackend> {
		&self.backend
	}

	/// Read and decode the value cached under `key`.
	///
	/// Fails with [`Error::CacheMiss`] when nothing is cached and with
	/// [`Error::Serialization`] when the payload does not decode into `T`.
	pub async fn get<T>(&self, key: &str) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let bytes = self.backend.get(key).await?;
		Ok(serde_json::from_slice(&bytes)?)
	}

	/// Cache `value` under `key` with the default expiry.
	pub async fn set<T>(&self, key: &str, value: &T) -> Result<()>
	where
		T: Serialize + ?Sized,
	{
		self.set_with_expire(key, value, self.expiry).await
	}

	/// Cache `value` under `key`, expiring after `ttl`.
	///
	/// The value is fully encoded before the single write is issued, so an
	/// encoding failure never reaches the network and a cancelled call
	/// never leaves a partial entry.
	pub async fn set_with_expire<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>
	where
		T: Serialize + ?Sized,
	{
		let bytes = serde_json::to_vec(value)?;
		self.backend.set(key, &bytes, self.jittered(ttl)).await
	}

	/// Remove `keys` from the cache. Absent keys are ignored.
	pub async fn del(&self, keys: &[&str]) -> Result<()> {
		self.backend.del(keys).await
	}

	/// Return the cached value for `key`, or run `populate` on a miss and
	/// cache its result with the default expiry.
	pub async fn take<T, F, Fut>(&self, key: &str, populate: F) -> Result<T>
	where
		T: Serialize + DeserializeOwned,
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let expiry = self.expiry;
		self.take_inner(key, populate, move |_| expiry).await
	}

	/// Like [`take`](Self::take), caching a populated value for `ttl`.
	pub async fn take_with_expire<T, F, Fut>(
		&self,
		key: &str,
		populate: F,
		ttl: Duration,
	) -> Result<T>
	where
		T: Serialize + DeserializeOwned,
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		self.take_inner(key, populate, move |_| ttl).await
	}

	/// Like [`take`](Self::take), with the TTL computed from the populated
	/// value.
	///
	/// `expiry` runs only after a successful populate, never on a hit.
	///
	/// # Examples
	///
	/// ```
	/// use cacheside_cache::{CacheAside, Error, InMemoryBackend};
	/// use std::sync::Arc;
	/// use std::time::Duration;
	///
	/// # async fn example() -> cacheside_cache::Result<()> {
	/// let cache = CacheAside::new(Arc::new(InMemoryBackend::new()), Duration::from_secs(300));
	///
	/// // Remember "no such user" only briefly
	/// let user: Option<String> = cache
	///     .take_with_expiry_fn(
	///         "user:42",
	///         || async { Ok::<_, Error>(None) },
	///         |user: &Option<String>| match user {
	///             Some(_) => Duration::from_secs(300),
	///             None => Duration::from_secs(5),
	///         },
	///     )
	///     .await?;
	/// assert!(user.is_none());
	/// # Ok(())
	/// # }
	/// ```
	pub async fn take_with_expiry_fn<T, F, Fut, E>(
		&self,
		key: &str,
		populate: F,
		expiry: E,
	) -> Result<T>
	where
		T: Serialize + DeserializeOwned,
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T>>,
		E: FnOnce(&T) -> Duration,
	{
		self.take_inner(key, populate, expiry).await
	}

	/// Release the backend's pooled connections.
	pub fn close(&self) {
		self.backend.close();
	}

	async fn take_inner<T, F, Fut, E>(&self, key: &str, populate: F, expiry: E) -> Result<T>
	where
		T: Serialize + DeserializeOwned,
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T>>,
		E: FnOnce(&T) -> Duration,
	{
		match self.get::<T>(key).await {
			Ok(value) => {
				debug!(key, "cache hit");
				return Ok(value);
			}
			Err(Error::CacheMiss) => debug!(key, "cache miss"),
			// An unreachable cache is reported, not treated as a miss
			Err(e) => return Err(e),
		}

		let value = populate().await?;

		let ttl = expiry(&value);
		match self.set_with_expire(key, &value, ttl).await {
			Ok(()) => debug!(
				key,
				ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
				"cache populated"
			),
			Err(e) => warn!(key, error = %e, "failed to populate cache"),
		}

		Ok(value)
	}

	fn jittered(&self, ttl: Duration) -> Duration {
		let ttl = ttl.min(MAX_TTL);
		let ttl = if self.deviation > 0.0 {
			let factor: f64 =
				rand::thread_rng().gen_range((1.0 - self.deviation)..=(1.0 + self.deviation));
			ttl.mul_f64(factor)
		} else {
			ttl
		};
		ttl.clamp(MIN_TTL, MAX_TTL)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::backend::InMemoryBackend;
	use crate::testing::FaultyBackend;
	use rstest::*;
	use serde::Deserialize;
	use std::collections::HashMap;
	use std::sync::atomic::{AtomicUsize, Ordering};

	#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
	struct User {
		id: i64,
		name: String,
	}

	fn alice() -> User {
		User {
			id: 1,
			name: "Alice".to_string(),
		}
	}

	#[fixture]
	fn backend() -> FaultyBackend {
		FaultyBackend::new()
	}

	fn engine(backend: &FaultyBackend) -> CacheAside {
		CacheAside::new(Arc::new(backend.clone()), Duration::from_secs(60))
	}

	#[rstest]
	#[tokio::test]
	async fn test_get_on_empty_cache_is_miss(backend: FaultyBackend) {
		let cache = engine(&backend);

		let err = cache.get::<User>("user:1").await.unwrap_err();
		assert!(err.is_miss());
	}

	#[rstest]
	#[tokio::test]
	async fn test_set_then_get_round_trips(backend: FaultyBackend) {
		let cache = engine(&backend);

		cache.set("user:1", &alice()).await.unwrap();

		assert_eq!(cache.get::<User>("user:1").await.unwrap(), alice());
	}

	#[rstest]
	#[tokio::test]
	async fn test_undecodable_payload_is_serialization_error(backend: FaultyBackend) {
		let cache = engine(&backend);
		backend
			.inner()
			.set("user:1", b"{not json", Duration::from_secs(60))
			.await
			.unwrap();

		let err = cache.get::<User>("user:1").await.unwrap_err();
		assert!(matches!(err, Error::Serialization(_)), "got {err:?}");
	}

	#[rstest]
	#[tokio::test]
	async fn test_set_reports_encoding_failure_before_writing(backend: FaultyBackend) {
		let cache = engine(&backend);
		let mut unencodable = HashMap::new();
		unencodable.insert(vec![1u8, 2], 3);

		let err = cache.set("bad", &unencodable).await.unwrap_err();

		assert!(matches!(err, Error::Serialization(_)));
		assert_eq!(backend.set_calls(), 0);
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_set_uses_default_and_explicit_expiry(backend: FaultyBackend) {
		let cache = engine(&backend);

		cache.set("default", &1).await.unwrap();
		cache
			.set_with_expire("explicit", &2, Duration::from_secs(5))
			.await
			.unwrap();

		assert_eq!(
			backend.inner().ttl("default").await,
			Some(Duration::from_secs(60))
		);
		assert_eq!(
			backend.inner().ttl("explicit").await,
			Some(Duration::from_secs(5))
		);
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_zero_ttl_is_raised_to_minimum(backend: FaultyBackend) {
		let cache = engine(&backend);

		cache
			.set_with_expire("k", &"v", Duration::ZERO)
			.await
			.unwrap();

		assert_eq!(backend.inner().ttl("k").await, Some(MIN_TTL));
	}

	#[rstest]
	#[tokio::test]
	async fn test_take_populates_on_miss_then_hits(backend: FaultyBackend) {
		let cache = engine(&backend);
		let loads = Arc::new(AtomicUsize::new(0));

		for _ in 0..2 {
			let loads = Arc::clone(&loads);
			let user: User = cache
				.take("user:1", || async move {
					loads.fetch_add(1, Ordering::SeqCst);
					Ok(alice())
				})
				.await
				.unwrap();
			assert_eq!(user, alice());
		}

		assert_eq!(loads.load(Ordering::SeqCst), 1);
		assert_eq!(backend.set_calls(), 1);
	}

	#[rstest]
	#[tokio::test]
	async fn test_take_propagates_populate_error_without_caching(backend: FaultyBackend) {
		let cache = engine(&backend);

		let err = cache
			.take::<User, _, _>("user:1", || async {
				Err(Error::store(std::io::Error::other("row not found")))
			})
			.await
			.unwrap_err();

		assert!(err.is_store());
		assert_eq!(backend.set_calls(), 0);
		assert!(cache.get::<User>("user:1").await.unwrap_err().is_miss());
	}

	#[rstest]
	#[tokio::test]
	async fn test_take_surfaces_backend_failure_without_populating(backend: FaultyBackend) {
		let cache = engine(&backend);
		backend.fail_get(true);
		let loads = Arc::new(AtomicUsize::new(0));
		let counter = Arc::clone(&loads);

		let err = cache
			.take("user:1", move || async move {
				counter.fetch_add(1, Ordering::SeqCst);
				Ok(alice())
			})
			.await
			.unwrap_err();

		assert!(matches!(err, Error::Backend(_)));
		assert_eq!(loads.load(Ordering::SeqCst), 0);
	}

	#[rstest]
	#[tokio::test]
	async fn test_take_does_not_populate_over_corrupt_entry(backend: FaultyBackend) {
		let cache = engine(&backend);
		backend
			.inner()
			.set("user:1", b"\"not a user\"", Duration::from_secs(60))
			.await
			.unwrap();
		let loads = Arc::new(AtomicUsize::new(0));
		let counter = Arc::clone(&loads);

		let err = cache
			.take("user:1", move || async move {
				counter.fetch_add(1, Ordering::SeqCst);
				Ok(alice())
			})
			.await
			.unwrap_err();

		assert!(matches!(err, Error::Serialization(_)));
		assert_eq!(loads.load(Ordering::SeqCst), 0);
	}

	#[rstest]
	#[tokio::test]
	async fn test_take_ignores_failed_cache_write(backend: FaultyBackend) {
		let cache = engine(&backend);
		backend.fail_set(true);

		let user: User = cache
			.take("user:1", || async { Ok(alice()) })
			.await
			.unwrap();

		assert_eq!(user, alice());
		assert_eq!(backend.set_calls(), 1);
		assert!(cache.get::<User>("user:1").await.unwrap_err().is_miss());
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_take_with_expire_uses_given_ttl(backend: FaultyBackend) {
		let cache = engine(&backend);

		let _: User = cache
			.take_with_expire("user:1", || async { Ok(alice()) }, Duration::from_secs(7))
			.await
			.unwrap();

		assert_eq!(
			backend.inner().ttl("user:1").await,
			Some(Duration::from_secs(7))
		);
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_expiry_fn_sees_value_and_is_skipped_on_hit(backend: FaultyBackend) {
		let cache = engine(&backend);
		let calls = AtomicUsize::new(0);
		let expiry = |found: &Option<User>| {
			calls.fetch_add(1, Ordering::SeqCst);
			if found.is_some() {
				Duration::from_secs(300)
			} else {
				Duration::from_secs(5)
			}
		};

		let missing: Option<User> = cache
			.take_with_expiry_fn("user:404", || async { Ok(None) }, expiry)
			.await
			.unwrap();
		assert!(missing.is_none());
		assert_eq!(
			backend.inner().ttl("user:404").await,
			Some(Duration::from_secs(5))
		);

		let again: Option<User> = cache
			.take_with_expiry_fn("user:404", || async { Ok(Some(alice())) }, expiry)
			.await
			.unwrap();
		assert!(again.is_none(), "second call should be served from cache");
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_expiry_deviation_keeps_ttl_in_band(backend: FaultyBackend) {
		let cache = engine(&backend).with_expiry_deviation(0.2);

		for i in 0..20 {
			let key = format!("k{}", i);
			cache
				.set_with_expire(&key, &i, Duration::from_secs(100))
				.await
				.unwrap();
			let ttl = backend.inner().ttl(&key).await.unwrap();
			assert!(ttl >= Duration::from_secs(80), "ttl too short: {ttl:?}");
			assert!(ttl <= Duration::from_secs(120), "ttl too long: {ttl:?}");
		}
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_unbounded_default_expiry_is_clamped() {
		let backend = InMemoryBackend::new();
		let cache = CacheAside::new(Arc::new(backend.clone()), Duration::MAX);

		cache.set("k", &1).await.unwrap();

		assert_eq!(cache.get::<i32>("k").await.unwrap(), 1);
		assert_eq!(backend.ttl("k").await, Some(MAX_TTL));
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_unbounded_ttl_with_deviation_is_clamped(backend: FaultyBackend) {
		let cache = engine(&backend).with_expiry_deviation(0.1);

		let value: i32 = cache
			.take_with_expire("k", || async { Ok(1) }, Duration::MAX)
			.await
			.unwrap();

		assert_eq!(value, 1);
		let ttl = backend.inner().ttl("k").await.unwrap();
		assert!(ttl <= MAX_TTL);
		assert!(ttl >= MAX_TTL.mul_f64(0.9) - Duration::from_secs(1));
	}

	#[rstest]
	#[case(-0.5, 0.0)]
	#[case(0.1, 0.1)]
	#[case(3.0, MAX_EXPIRY_DEVIATION)]
	#[case(f64::NAN, 0.0)]
	fn test_expiry_deviation_is_clamped(#[case] given: f64, #[case] expected: f64) {
		let cache = CacheAside::new(Arc::new(FaultyBackend::new()), Duration::from_secs(1))
			.with_expiry_deviation(given);
		assert_eq!(cache.expiry_deviation(), expected);
	}

	#[rstest]
	#[tokio::test]
	async fn test_del_passes_through(backend: FaultyBackend) {
		let cache = engine(&backend);
		cache.set("a", &1).await.unwrap();

		cache.del(&["a", "b"]).await.unwrap();
		cache.del(&["a", "b"]).await.unwrap();

		assert!(cache.get::<i32>("a").await.unwrap_err().is_miss());

		backend.fail_del(true);
		assert!(matches!(cache.del(&["a"]).await, Err(Error::Backend(_))));
	}
}
