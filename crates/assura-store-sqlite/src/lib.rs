//! SQLite backend for the Assura identity store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every write goes through that single
//! connection, and read-modify-write operations run inside an immediate
//! transaction, so concurrent saves of one evidence record cannot interleave.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
