//! # Cacheside DB
//!
//! Cache-aside access to a SQL store.
//!
//! [`CachedConn`] binds a [`Store`] handle (a sqlx pool) to a
//! [`CacheAside`] engine:
//!
//! - **Cached reads**: `query*` serve from the cache and populate it from
//!   the store on a miss
//! - **Invalidating writes**: `exec` deletes the listed keys once the store
//!   write succeeded
//! - **Transactions**: `transact` commits or rolls back around a closure
//! - **Escape hatches**: `*_no_cache` and `get_cache`/`set_cache`/`del_cache`
//!
//! Driver errors convert into [`Error::Store`], so callbacks can use `?` on
//! sqlx calls directly.

pub mod connection;
pub mod store;

pub use cacheside_cache::{CacheAside, CacheBackend, CacheConfig, Error, Result};
pub use connection::CachedConn;
pub use store::Store;
