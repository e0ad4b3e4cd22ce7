//! Core types and logic for the Assura identity assurance engine.
//!
//! This crate is deliberately free of HTTP and database dependencies. It
//! defines the subject and evidence model, derives trust levels from stored
//! evidence, and aggregates claims from an ordered set of providers. Storage
//! backends implement [`store::IdentityStore`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod authn;
pub mod claims;
pub mod error;
pub mod evidence;
pub mod identifier;
pub mod ledger;
pub mod profile;
pub mod store;
pub mod subject;
pub mod trust;

#[cfg(test)]
mod testing;

pub use error::{BoxError, Error, Result};
