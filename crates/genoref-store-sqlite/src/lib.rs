//! SQLite backend for the genoref reference store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Feature search relies on a trigram
//! `similarity()` SQL function registered on the connection at open time.

mod encode;
mod query;
mod schema;
mod store;
mod trgm;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
pub use trgm::similarity;
