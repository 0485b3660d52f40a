//! Core types and trait definitions for the genoref reference service.
//!
//! This crate is deliberately free of HTTP and database dependencies. It owns
//! the data model (genomes, contigs, features, tasks), the validation bounds
//! shared by every layer, the checksum engine, and the [`store::ReferenceStore`]
//! abstraction that storage backends implement.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod checksum;
pub mod error;
pub mod feature;
pub mod genome;
pub mod store;
pub mod task;

pub use error::{Error, Result};
