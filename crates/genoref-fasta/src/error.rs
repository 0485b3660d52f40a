//! Error type for `genoref-fasta`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("contig not found in index: {0}")]
  ContigNotFound(String),

  #[error("range {start}-{end} is outside contig {contig} (length {length})")]
  OutOfRange { contig: String, start: u64, end: u64, length: u64 },

  #[error("invalid range: start {start} is after end {end}")]
  InvalidRange { start: u64, end: u64 },

  #[error("retrieval from circular contig {0} is not implemented")]
  CircularNotImplemented(String),

  #[error("invalid FASTA index at line {line}: {reason}")]
  InvalidIndex { line: usize, reason: String },

  #[error("unsupported URI: {0}")]
  UnsupportedScheme(String),

  #[error("DRS resolution failed for {uri}: {reason}")]
  Drs { uri: String, reason: String },

  #[error("upstream {url} answered {status}")]
  Upstream { url: String, status: u16 },

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("HTTP error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("URL parse error: {0}")]
  Url(#[from] url::ParseError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
