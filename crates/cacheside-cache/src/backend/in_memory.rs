//! In-memory cache backend

use super::{CacheBackend, MAX_TTL};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// Writes between two sweeps of expired entries
const SWEEP_EVERY: usize = 256;

fn expiry_instant(now: Instant, ttl: Duration) -> Instant {
	match now.checked_add(ttl.min(MAX_TTL)) {
		Some(at) => at,
		// Clock too close to its limit for MAX_TTL
		None => now + Duration::from_secs(24 * 60 * 60),
	}
}

#[derive(Debug, Clone)]
struct Entry {
	value: Vec<u8>,
	expires_at: Instant,
}

impl Entry {
	fn is_expired(&self, now: Instant) -> bool {
		now >= self.expires_at
	}
}

/// Process-local cache backend
///
/// An expired entry is dropped the next time it is read, on a periodic
/// sweep during writes, by [`cleanup_expired`](Self::cleanup_expired), or by
/// the task started with [`start_auto_cleanup`](Self::start_auto_cleanup).
/// Clones share the same storage.
///
/// # Examples
///
/// ```
/// use cacheside_cache::{CacheBackend, InMemoryBackend};
/// use std::time::Duration;
///
/// # async fn example() {
/// let backend = InMemoryBackend::new();
/// backend.set("greeting", b"hello", Duration::from_secs(60)).await.unwrap();
///
/// assert_eq!(backend.get("greeting").await.unwrap(), b"hello");
/// assert!(backend.get("missing").await.unwrap_err().is_miss());
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
	entries: Arc<RwLock<HashMap<String, Entry>>>,
	closed: Arc<AtomicBool>,
	writes: Arc<AtomicUsize>,
}

impl InMemoryBackend {
	pub fn new() -> Self {
		Self::default()
	}

	/// Remaining time to live of `key`, or `None` if it is absent or expired.
	pub async fn ttl(&self, key: &str) -> Option<Duration> {
		let now = Instant::now();
		let entries = self.entries.read().await;
		entries
			.get(key)
			.filter(|entry| !entry.is_expired(now))
			.map(|entry| entry.expires_at - now)
	}

	/// Number of live entries
	pub async fn len(&self) -> usize {
		let now = Instant::now();
		let entries = self.entries.read().await;
		entries.values().filter(|e| !e.is_expired(now)).count()
	}

	pub async fn is_empty(&self) -> bool {
		self.len().await == 0
	}

	/// Drop every expired entry and return how many were removed.
	pub async fn cleanup_expired(&self) -> usize {
		let now = Instant::now();
		let mut entries = self.entries.write().await;
		let before = entries.len();
		entries.retain(|_, entry| !entry.is_expired(now));
		before - entries.len()
	}

	/// Spawn a task that calls [`cleanup_expired`](Self::cleanup_expired)
	/// every `interval` until the backend is closed.
	///
	/// Must be called from within a Tokio runtime.
	///
	/// # Examples
	///
	/// ```
	/// use cacheside_cache::InMemoryBackend;
	/// use std::time::Duration;
	///
	/// # async fn example() {
	/// let backend = InMemoryBackend::new();
	/// backend.start_auto_cleanup(Duration::from_secs(60));
	/// # }
	/// ```
	pub fn start_auto_cleanup(&self, interval: Duration) {
		let backend = self.clone();
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);
			loop {
				ticker.tick().await;
				if backend.closed.load(Ordering::Acquire) {
					break;
				}
				let removed = backend.cleanup_expired().await;
				if removed > 0 {
					debug!(removed, "swept expired cache entries");
				}
			}
		});
	}

	fn ensure_open(&self) -> Result<()> {
		if self.closed.load(Ordering::Acquire) {
			Err(Error::Backend("in-memory cache is closed".to_string()))
		} else {
			Ok(())
		}
	}
}

#[async_trait]
impl CacheBackend for InMemoryBackend {
	async fn get(&self, key: &str) -> Result<Vec<u8>> {
		self.ensure_open()?;
		let now = Instant::now();

		{
			let entries = self.entries.read().await;
			match entries.get(key) {
				Some(entry) if !entry.is_expired(now) => {
					if entry.value.is_empty() {
						return Err(Error::CacheMiss);
					}
					return Ok(entry.value.clone());
				}
				Some(_) => {}
				None => return Err(Error::CacheMiss),
			}
		}

		// Passive expiration
		let mut entries = self.entries.write().await;
		if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
			entries.remove(key);
		}
		Err(Error::CacheMiss)
	}

	async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
		self.ensure_open()?;
		let now = Instant::now();
		let entry = Entry {
			value: value.to_vec(),
			expires_at: expiry_instant(now, ttl),
		};

		let mut entries = self.entries.write().await;
		entries.insert(key.to_string(), entry);
		// Amortized sweep so keys that are never read again do not pile up
		if self.writes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
			entries.retain(|_, entry| !entry.is_expired(now));
		}
		Ok(())
	}

	async fn del(&self, keys: &[&str]) -> Result<()> {
		self.ensure_open()?;
		if keys.is_empty() {
			return Ok(());
		}
		let mut entries = self.entries.write().await;
		for key in keys {
			entries.remove(*key);
		}
		Ok(())
	}

	async fn ping(&self) -> Result<()> {
		self.ensure_open()
	}

	fn close(&self) {
		self.closed.store(true, Ordering::Release);
	}
}
