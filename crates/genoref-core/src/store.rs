//! The `ReferenceStore` trait and its error classification.
//!
//! The trait is implemented by storage backends (e.g. `genoref-store-sqlite`).
//! Higher layers (`genoref-api`, `genoref-server`) depend on this abstraction,
//! not on any concrete backend.

use std::future::Future;

use crate::{
  feature::{Feature, FeatureBatch, FeaturePage, FeatureQuery},
  genome::{Contig, ContigMatch, Genome, GenomeAnnotationPatch},
  task::{Task, TaskKind, TaskStatus},
};

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Coarse classification of a store failure, independent of the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// A referenced genome, contig, feature or task does not exist.
  NotFound,
  /// A uniqueness rule was violated.
  Conflict,
  /// The input failed validation.
  Invalid,
  Internal,
}

pub trait StoreError: std::error::Error + Send + Sync + 'static {
  fn kind(&self) -> ErrorKind;
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a genoref storage backend.
///
/// Every write is atomic: a failed call leaves no partial rows behind.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait ReferenceStore: Send + Sync {
  type Error: StoreError;

  // ── Catalog ───────────────────────────────────────────────────────────

  /// Register a genome together with its contigs and aliases.
  ///
  /// Fails with a conflict if the id, either checksum, or either file URI is
  /// already taken by another genome.
  fn create_genome(
    &self,
    genome: Genome,
  ) -> impl Future<Output = Result<Genome, Self::Error>> + Send + '_;

  /// Look a genome up by id, falling back to its checksums and aliases.
  fn get_genome<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<Option<Genome>, Self::Error>> + Send + 'a;

  /// All genomes, ordered by id.
  fn list_genomes(
    &self,
  ) -> impl Future<Output = Result<Vec<Genome>, Self::Error>> + Send + '_;

  /// Apply a partial update to the annotation URIs. Returns `None` if the
  /// genome does not exist.
  fn update_genome_annotations<'a>(
    &'a self,
    genome_id: &'a str,
    patch: GenomeAnnotationPatch,
  ) -> impl Future<Output = Result<Option<Genome>, Self::Error>> + Send + 'a;

  /// Delete a genome and every row that depends on it. Returns `false` if it
  /// did not exist.
  fn delete_genome<'a>(
    &'a self,
    genome_id: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  fn get_contig<'a>(
    &'a self,
    genome_id: &'a str,
    contig_name: &'a str,
  ) -> impl Future<Output = Result<Option<Contig>, Self::Error>> + Send + 'a;

  /// Find contigs across all genomes whose md5, GA4GH checksum, or alias
  /// equals `key`. Ordered by genome id.
  fn find_contigs<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<Vec<ContigMatch>, Self::Error>> + Send + 'a;

  // ── Features ──────────────────────────────────────────────────────────

  /// Replace the genome's entire feature set with `batch` in one transaction.
  ///
  /// Every feature's contig must belong to the genome; an unknown contig
  /// fails the whole call and leaves the previous feature set untouched.
  /// Returns the number of features written.
  fn replace_features<'a>(
    &'a self,
    genome_id: &'a str,
    batch: FeatureBatch,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;

  /// Remove all features of a genome. Returns the number removed.
  fn clear_features<'a>(
    &'a self,
    genome_id: &'a str,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;

  fn query_features<'a>(
    &'a self,
    genome_id: &'a str,
    query: &'a FeatureQuery,
  ) -> impl Future<Output = Result<FeaturePage, Self::Error>> + Send + 'a;

  fn get_feature<'a>(
    &'a self,
    genome_id: &'a str,
    feature_id: &'a str,
  ) -> impl Future<Output = Result<Option<Feature>, Self::Error>> + Send + 'a;

  // ── Tasks ─────────────────────────────────────────────────────────────

  /// Persist a new `queued` task.
  ///
  /// Fails with a conflict if the genome already has a queued or running
  /// task; the check is made by the database, not in memory.
  fn create_task<'a>(
    &'a self,
    genome_id: &'a str,
    kind: TaskKind,
  ) -> impl Future<Output = Result<Task, Self::Error>> + Send + 'a;

  fn get_task(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Task>, Self::Error>> + Send + '_;

  /// Tasks ordered by id, optionally restricted to one genome.
  fn list_tasks<'a>(
    &'a self,
    genome_id: Option<&'a str>,
  ) -> impl Future<Output = Result<Vec<Task>, Self::Error>> + Send + 'a;

  /// Move a task to `status`. Only forward transitions are accepted.
  fn update_task_status(
    &self,
    id: i64,
    status: TaskStatus,
    message: Option<String>,
  ) -> impl Future<Output = Result<Task, Self::Error>> + Send + '_;

  /// Mark every `running` task as `error` with `message`. Returns the number
  /// of tasks changed. Queued tasks are left for a worker to pick up.
  fn fail_running_tasks(
    &self,
    message: String,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;
}
