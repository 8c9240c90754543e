//! SQLite backends for the lexroute record store and semantic index.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. The record store and the index live in
//! separate databases so either can fail or be rebuilt independently.

mod encode;
mod index;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use index::SqliteIndex;
pub use store::SqliteStore;
