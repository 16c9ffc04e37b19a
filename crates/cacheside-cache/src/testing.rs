//! Fault injection for cache-aside tests
//!
//! [`FaultyBackend`] wraps an [`InMemoryBackend`] and can be told to fail
//! individual operations, which is how the tests exercise an unreachable or
//! flaky cache without a real network.

use crate::backend::{CacheBackend, InMemoryBackend};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
struct Faults {
	get: AtomicBool,
	set: AtomicBool,
	del: AtomicBool,
	ping: AtomicBool,
}

#[derive(Debug, Default)]
struct Calls {
	get: AtomicUsize,
	set: AtomicUsize,
	del: AtomicUsize,
}

/// In-memory backend with switchable failures and call counters
#[derive(Debug, Clone, Default)]
pub struct FaultyBackend {
	inner: InMemoryBackend,
	faults: Arc<Faults>,
	calls: Arc<Calls>,
}

impl FaultyBackend {
	pub fn new() -> Self {
		Self::default()
	}

	/// The healthy backend behind the faults
	pub fn inner(&self) -> &InMemoryBackend {
		&self.inner
	}

	pub fn fail_get(&self, fail: bool) {
		self.faults.get.store(fail, Ordering::SeqCst);
	}

	pub fn fail_set(&self, fail: bool) {
		self.faults.set.store(fail, Ordering::SeqCst);
	}

	pub fn fail_del(&self, fail: bool) {
		self.faults.del.store(fail, Ordering::SeqCst);
	}

	pub fn fail_ping(&self, fail: bool) {
		self.faults.ping.store(fail, Ordering::SeqCst);
	}

	/// Make every operation fail, as if the cache were unreachable.
	pub fn fail_all(&self, fail: bool) {
		self.fail_get(fail);
		self.fail_set(fail);
		self.fail_del(fail);
		self.fail_ping(fail);
	}

	pub fn get_calls(&self) -> usize {
		self.calls.get.load(Ordering::SeqCst)
	}

	pub fn set_calls(&self) -> usize {
		self.calls.set.load(Ordering::SeqCst)
	}

	pub fn del_calls(&self) -> usize {
		self.calls.del.load(Ordering::SeqCst)
	}
}

fn injected(op: &str) -> Error {
	Error::Backend(format!("injected {} failure", op))
}

#[async_trait]
impl CacheBackend for FaultyBackend {
	async fn get(&self, key: &str) -> Result<Vec<u8>> {
		self.calls.get.fetch_add(1, Ordering::SeqCst);
		if self.faults.get.load(Ordering::SeqCst) {
			return Err(injected("GET"));
		}
		self.inner.get(key).await
	}

	async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
		self.calls.set.fetch_add(1, Ordering::SeqCst);
		if self.faults.set.load(Ordering::SeqCst) {
			return Err(injected("SET"));
		}
		self.inner.set(key, value, ttl).await
	}

	async fn del(&self, keys: &[&str]) -> Result<()> {
		self.calls.del.fetch_add(1, Ordering::SeqCst);
		if self.faults.del.load(Ordering::SeqCst) {
			return Err(injected("DEL"));
		}
		self.inner.del(keys).await
	}

	async fn ping(&self) -> Result<()> {
		if self.faults.ping.load(Ordering::SeqCst) {
			return Err(injected("PING"));
		}
		self.inner.ping().await
	}

	fn close(&self) {
		self.inner.close();
	}
}
