//! Cached connection
//!
//! [`CachedConn`] pairs a [`Store`] handle with a [`CacheAside`] engine.
//! Reads go through the cache, writes go to the store and then invalidate
//! the keys they name.

use crate::store::Store;
use cacheside_cache::{CacheAside, CacheConfig, Result};
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Store handle with a cache-aside read path
///
/// Callbacks receive a clone of the store handle, so they may own it
/// across await points. For sqlx pools that clone is a reference count
/// bump.
///
/// # Examples
///
/// ```no_run
/// use cacheside_db::{CacheConfig, CachedConn};
/// use sqlx::SqlitePool;
/// use std::time::Duration;
///
/// # async fn example() -> cacheside_db::Result<()> {
/// let pool = SqlitePool::connect("sqlite://app.db").await?;
/// let conn = CachedConn::new(
///     pool,
///     &CacheConfig::single("127.0.0.1:6379"),
///     Duration::from_secs(600),
/// )
/// .await?;
///
/// let name: String = conn
///     .query("user:1:name", |pool| async move {
///         Ok(sqlx::query_scalar("SELECT name FROM users WHERE id = 1")
///             .fetch_one(&pool)
///             .await?)
///     })
///     .await?;
///
/// conn.exec(
///     |pool| async move {
///         Ok(sqlx::query("UPDATE users SET name = 'Bob' WHERE id = 1")
///             .execute(&pool)
///             .await?)
///     },
///     &["user:1:name"],
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CachedConn<S: Store> {
	store: S,
	cache: CacheAside,
}

impl<S: Store> std::fmt::Debug for CachedConn<S> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CachedConn")
			.field("cache", &self.cache)
			.finish_non_exhaustive()
	}
}

impl<S: Store> CachedConn<S> {
	/// Connect a Redis backend for `config` and bind it to `store`.
	///
	/// Fails with the same errors as
	/// [`RedisBackend::connect`](cacheside_cache::RedisBackend::connect).
	pub async fn new(store: S, config: &CacheConfig, expiry: Duration) -> Result<Self> {
		let cache = CacheAside::connect(config, expiry).await?;
		Ok(Self::with_cache(store, cache))
	}

	/// Bind `store` to an existing engine.
	///
	/// Connections built from clones of one engine share its backend.
	pub fn with_cache(store: S, cache: CacheAside) -> Self {
		Self { store, cache }
	}

	pub fn store(&self) -> &S {
		&self.store
	}

	pub fn cache(&self) -> &CacheAside {
		&self.cache
	}

	/// Read `key` from the cache, or run `read` against the store on a miss
	/// and cache its result with the default expiry.
	///
	/// A cache outage is reported as an error rather than bypassed; use
	/// [`query_no_cache`](Self::query_no_cache) to read around the cache.
	pub async fn query<T, F, Fut>(&self, key: &str, read: F) -> Result<T>
	where
		T: Serialize + DeserializeOwned,
		F: FnOnce(S) -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let store = self.store.clone();
		self.cache.take(key, move || read(store)).await
	}

	/// Like [`query`](Self::query), caching a fresh result for `ttl`.
	pub async fn query_with_expire<T, F, Fut>(&self, key: &str, ttl: Duration, read: F) -> Result<T>
	where
		T: Serialize + DeserializeOwned,
		F: FnOnce(S) -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let store = self.store.clone();
		self.cache
			.take_with_expire(key, move || read(store), ttl)
			.await
	}

	/// Like [`query`](Self::query), with the TTL chosen from the fresh result.
	pub async fn query_with_expiry_fn<T, F, Fut, E>(
		&self,
		key: &str,
		read: F,
		expiry: E,
	) -> Result<T>
	where
		T: Serialize + DeserializeOwned,
		F: FnOnce(S) -> Fut,
		Fut: Future<Output = Result<T>>,
		E: FnOnce(&T) -> Duration,
	{
		let store = self.store.clone();
		self.cache
			.take_with_expiry_fn(key, move || read(store), expiry)
			.await
	}

	/// Run `read` against the store without touching the cache.
	pub async fn query_no_cache<T, F, Fut>(&self, read: F) -> Result<T>
	where
		F: FnOnce(S) -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		read(self.store.clone()).await
	}

	/// Run `write` against the store, then delete `keys` from the cache.
	///
	/// When `write` fails its error is returned and the cache is left as
	/// it was. When the write succeeds but the delete fails, the delete's
	/// error is returned: the store has changed and the listed entries may
	/// be stale until they expire.
	pub async fn exec<T, F, Fut>(&self, write: F, keys: &[&str]) -> Result<T>
	where
		F: FnOnce(S) -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let outcome = write(self.store.clone()).await?;

		if let Err(e) = self.cache.del(keys).await {
			warn!(?keys, error = %e, "store write succeeded but cache invalidation failed");
			return Err(e);
		}
		debug!(?keys, "invalidated cache keys");

		Ok(outcome)
	}

	/// Run `write` against the store without touching the cache.
	pub async fn exec_no_cache<T, F, Fut>(&self, write: F) -> Result<T>
	where
		F: FnOnce(S) -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		write(self.store.clone()).await
	}

	/// Run `body` inside a store transaction.
	///
	/// The transaction commits when `body` returns `Ok` and rolls back when
	/// it returns `Err`. The cache is not consulted; invalidate affected keys
	/// with [`del_cache`](Self::del_cache) once the transaction is through.
	///
	/// # Examples
	///
	/// ```no_run
	/// use cacheside_db::CachedConn;
	/// use sqlx::SqlitePool;
	///
	/// # async fn example(conn: CachedConn<SqlitePool>) -> cacheside_db::Result<()> {
	/// conn.transact(|tx| {
	///     Box::pin(async move {
	///         sqlx::query("UPDATE accounts SET balance = balance - 10 WHERE id = 1")
	///             .execute(&mut **tx)
	///             .await?;
	///         sqlx::query("UPDATE accounts SET balance = balance + 10 WHERE id = 2")
	///             .execute(&mut **tx)
	///             .await?;
	///         Ok(())
	///     })
	/// })
	/// .await?;
	///
	/// conn.del_cache(&["account:1", "account:2"]).await?;
	/// # Ok(())
	/// # }
	/// ```
	pub async fn transact<T, F>(&self, body: F) -> Result<T>
	where
		F: for<'t> FnOnce(&'t mut S::Transaction) -> BoxFuture<'t, Result<T>>,
	{
		let mut tx = self.store.begin().await?;

		match body(&mut tx).await {
			Ok(value) => {
				self.store.commit(tx).await?;
				Ok(value)
			}
			Err(e) => {
				if let Err(rollback_err) = self.store.rollback(tx).await {
					warn!(error = %rollback_err, "failed to roll back transaction");
				}
				Err(e)
			}
		}
	}

	/// Read a cached value directly; absent keys yield
	/// [`Error::CacheMiss`](cacheside_cache::Error::CacheMiss).
	pub async fn get_cache<T>(&self, key: &str) -> Result<T>
	where
		T: DeserializeOwned,
	{
		self.cache.get(key).await
	}

	/// Cache `value` under `key` with the default expiry.
	pub async fn set_cache<T>(&self, key: &str, value: &T) -> Result<()>
	where
		T: Serialize + ?Sized,
	{
		self.cache.set(key, value).await
	}

	pub async fn set_cache_with_expire<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>
	where
		T: Serialize + ?Sized,
	{
		self.cache.set_with_expire(key, value, ttl).await
	}

	/// Delete `keys` from the cache. Absent keys are ignored.
	pub async fn del_cache(&self, keys: &[&str]) -> Result<()> {
		self.cache.del(keys).await
	}
}
