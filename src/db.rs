//! Database module.
//!
//! Cached connections over sqlx pools.
//!
//! # Examples
//!
//! ```rust,no_run
//! use cacheside::db::{CachedConn, Store};
//! ```

pub use cacheside_db::*;
