//! Error types for `genoref-core`.

use thiserror::Error;

use crate::task::TaskStatus;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid genome id {0:?}: expected 1-31 characters from [a-zA-Z0-9-_.]")]
  InvalidGenomeId(String),

  #[error("invalid feature type {0:?}: expected 1-31 characters")]
  InvalidFeatureType(String),

  #[error("invalid {field} checksum: {value:?}")]
  InvalidChecksum { field: &'static str, value: String },

  #[error("invalid taxon id {0:?}: expected an NCBITaxon CURIE")]
  InvalidTaxon(String),

  #[error("duplicate contig name: {0}")]
  DuplicateContig(String),

  #[error("invalid feature batch: {0}")]
  InvalidBatch(String),

  #[error("illegal task transition: {from} -> {to}")]
  InvalidTransition { from: TaskStatus, to: TaskStatus },

  #[error("unknown task status: {0:?}")]
  UnknownTaskStatus(String),

  #[error("unknown task kind: {0:?}")]
  UnknownTaskKind(String),

  #[error("unknown strand symbol: {0:?}")]
  UnknownStrand(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
