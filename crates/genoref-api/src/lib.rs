//! HTTP layer for genoref.
//!
//! Exposes an axum [`Router`] backed by any [`ReferenceStore`]: the JSON
//! catalog API (genomes, contigs, features, tasks) and the RefGet v2 sequence
//! API. Feature ingestion runs on the background [`TaskManager`].
//! Auth, TLS, and transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! let tasks = TaskManager::start(store.clone(), http.clone(), IngestOptions::default(), 1);
//! let app = genoref_api::router(AppState { store, tasks, http, config });
//! ```

pub mod error;
pub mod features;
pub mod genomes;
pub mod refget;
pub mod tasks;
pub mod worker;

use std::sync::Arc;

use axum::{Router, routing::get};
use genoref_core::store::ReferenceStore;

pub use error::ApiError;
pub use worker::{IngestOptions, TaskManager};

// ─── Configuration ───────────────────────────────────────────────────────────

/// Settings the handlers need at request time.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  /// Public base URL, used to build each contig's RefGet URIs.
  pub service_url_base_path:    String,
  /// Bases per chunk of a streamed sequence body.
  pub file_response_chunk_size: u64,
  /// Largest sequence a single RefGet request may return.
  pub subsequence_limit:        Option<u64>,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      service_url_base_path:    "http://127.0.0.1:5000".into(),
      file_response_chunk_size: 16 * 1024,
      subsequence_limit:        None,
    }
  }
}

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S: ReferenceStore> {
  pub store:  Arc<S>,
  pub tasks:  TaskManager,
  /// Client for remote FASTA, index and DRS reads.
  pub http:   reqwest::Client,
  pub config: Arc<ApiConfig>,
}

impl<S: ReferenceStore> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:  self.store.clone(),
      tasks:  self.tasks.clone(),
      http:   self.http.clone(),
      config: self.config.clone(),
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the full API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn router<S>(state: AppState<S>) -> Router<()>
where
  S: ReferenceStore + 'static,
{
  Router::new()
    // Genomes
    .route("/genomes", get(genomes::list::<S>).post(genomes::create::<S>))
    .route(
      "/genomes/{genome_id}",
      get(genomes::get_one::<S>).patch(genomes::update::<S>).delete(genomes::delete_one::<S>),
    )
    .route("/genomes/{genome_id}/contigs", get(genomes::list_contigs::<S>))
    .route("/genomes/{genome_id}/contigs/{contig_name}", get(genomes::get_contig::<S>))
    // Features
    .route(
      "/genomes/{genome_id}/features",
      get(features::list::<S>).delete(features::clear::<S>),
    )
    .route("/genomes/{genome_id}/features/{feature_id}", get(features::get_one::<S>))
    // Tasks
    .route("/tasks", get(tasks::list::<S>).post(tasks::create::<S>))
    .route("/tasks/{task_id}", get(tasks::get_one::<S>))
    // RefGet
    .route("/sequence/service-info", get(refget::service_info::<S>))
    .route("/sequence/{sequence_id}", get(refget::sequence::<S>))
    .route("/sequence/{sequence_id}/metadata", get(refget::metadata::<S>))
    .with_state(state)
}

#[cfg(test)]
mod tests;
