//! Store handles
//!
//! A [`Store`] is whatever the caller's read and write callbacks run
//! against. `CachedConn` never issues SQL itself; it only clones the handle
//! into callbacks and drives transactions through `begin`, `commit` and
//! `rollback`.

use async_trait::async_trait;
use cacheside_cache::Result;

/// Cloneable handle to the system of record
///
/// Clones must refer to the same underlying store, as a connection pool
/// handle does.
#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
	/// An open transaction, lent to `transact` bodies
	type Transaction: Send;

	async fn begin(&self) -> Result<Self::Transaction>;

	async fn commit(&self, tx: Self::Transaction) -> Result<()>;

	async fn rollback(&self, tx: Self::Transaction) -> Result<()>;
}

macro_rules! impl_sqlx_store {
	($($db:ty),+ $(,)?) => {
		$(
			#[async_trait]
			impl Store for sqlx::Pool<$db> {
				type Transaction = sqlx::Transaction<'static, $db>;

				async fn begin(&self) -> Result<Self::Transaction> {
					Ok(sqlx::Pool::begin(self).await?)
				}

				async fn commit(&self, tx: Self::Transaction) -> Result<()> {
					Ok(tx.commit().await?)
				}

				async fn rollback(&self, tx: Self::Transaction) -> Result<()> {
					Ok(tx.rollback().await?)
				}
			}
		)+
	};
}

impl_sqlx_store!(sqlx::Postgres, sqlx::MySql, sqlx::Sqlite);
