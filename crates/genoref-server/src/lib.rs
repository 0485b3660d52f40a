//! Configuration for the genoref server binary.
//!
//! Settings come from an optional TOML file layered with `GENOREF_*`
//! environment variables; every key has a default.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use genoref_api::{ApiConfig, IngestOptions};
use serde::Deserialize;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                     String,
  pub port:                     u16,
  pub store_path:               PathBuf,
  /// Public base URL, used to build contig RefGet URIs.
  pub service_url_base_path:    String,
  /// Bases per streamed sequence chunk.
  pub file_response_chunk_size: u64,
  pub subsequence_limit:        Option<u64>,
  pub ingest_workers:           usize,
  /// Staging directory for remote annotation downloads. System temp if unset.
  pub ingest_tmp_dir:           Option<PathBuf>,
}

impl Default for ServerConfig {
  fn default() -> Self {
    let api = ApiConfig::default();
    Self {
      host:                     "127.0.0.1".into(),
      port:                     5000,
      store_path:               PathBuf::from("genoref.sqlite3"),
      service_url_base_path:    api.service_url_base_path,
      file_response_chunk_size: api.file_response_chunk_size,
      subsequence_limit:        api.subsequence_limit,
      ingest_workers:           1,
      ingest_tmp_dir:           None,
    }
  }
}

impl ServerConfig {
  /// Load from `path` (if it exists) and the `GENOREF_` environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("GENOREF"))
      .build()
      .context("failed to read config file")?;

    let mut cfg: Self = settings.try_deserialize().context("failed to deserialise ServerConfig")?;
    cfg.store_path = expand_tilde(&cfg.store_path);
    cfg.ingest_tmp_dir = cfg.ingest_tmp_dir.as_deref().map(expand_tilde);
    if cfg.file_response_chunk_size == 0 {
      anyhow::bail!("file_response_chunk_size must be positive");
    }
    Ok(cfg)
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn api_config(&self) -> ApiConfig {
    ApiConfig {
      service_url_base_path:    self.service_url_base_path.clone(),
      file_response_chunk_size: self.file_response_chunk_size,
      subsequence_limit:        self.subsequence_limit,
    }
  }

  pub fn ingest_options(&self) -> IngestOptions {
    IngestOptions { tmp_dir: self.ingest_tmp_dir.clone() }
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
