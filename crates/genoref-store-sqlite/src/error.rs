//! Error type for `genoref-store-sqlite`.

use genoref_core::{
  store::{ErrorKind, StoreError},
  task::TaskStatus,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] genoref_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("genome not found: {0}")]
  GenomeNotFound(String),

  /// Id, checksum or file URI already used by another genome.
  #[error("genome conflicts with an existing genome: {0}")]
  GenomeConflict(String),

  #[error("feature {feature_id} references contig {contig}, which genome {genome_id} does not have")]
  UnknownContig { genome_id: String, contig: String, feature_id: String },

  #[error("task not found: {0}")]
  TaskNotFound(i64),

  #[error("genome {0} already has a queued or running task")]
  TaskConflict(String),

  #[error("task {id} cannot move from {from} to {to}")]
  InvalidTransition { id: i64, from: TaskStatus, to: TaskStatus },
}

impl StoreError for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Self::GenomeNotFound(_) | Self::TaskNotFound(_) => ErrorKind::NotFound,
      Self::GenomeConflict(_) | Self::TaskConflict(_) | Self::InvalidTransition { .. } => {
        ErrorKind::Conflict
      }
      Self::Core(_) | Self::UnknownContig { .. } => ErrorKind::Invalid,
      Self::Database(_) | Self::DateParse(_) => ErrorKind::Internal,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
