//! Error types for the genoref-gff3 codec.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("line {line}: {reason}")]
  MalformedRecord { line: usize, reason: String },

  #[error("feature {feature_id} appears on both {first_contig} and {contig}")]
  FeatureIdCollision { feature_id: String, first_contig: String, contig: String },

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
