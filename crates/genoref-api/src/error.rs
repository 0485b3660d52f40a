//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use genoref_core::store::{ErrorKind, StoreError};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("range not satisfiable: {0}")]
  RangeNotSatisfiable(String),

  #[error("not acceptable: {0}")]
  NotAcceptable(String),

  #[error("not implemented: {0}")]
  NotImplemented(String),

  #[error("service unavailable: {0}")]
  Unavailable(String),

  /// A FASTA or index could not be read from its backing store.
  #[error("upstream error: {0}")]
  Upstream(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Classify a backend error by its [`ErrorKind`].
  pub fn store<E: StoreError>(e: E) -> Self {
    match e.kind() {
      ErrorKind::NotFound => Self::NotFound(e.to_string()),
      ErrorKind::Conflict => Self::Conflict(e.to_string()),
      ErrorKind::Invalid => Self::BadRequest(e.to_string()),
      ErrorKind::Internal => Self::Store(Box::new(e)),
    }
  }

  pub fn status(&self) -> StatusCode {
    match self {
      Self::NotFound(_) => StatusCode::NOT_FOUND,
      Self::BadRequest(_) => StatusCode::BAD_REQUEST,
      Self::Conflict(_) => StatusCode::CONFLICT,
      Self::RangeNotSatisfiable(_) => StatusCode::RANGE_NOT_SATISFIABLE,
      Self::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
      Self::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
      Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
      Self::Upstream(_) | Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

/// Sequence read failures. Range problems are the caller's fault; anything
/// else means the backing file could not be read.
impl From<genoref_fasta::Error> for ApiError {
  fn from(e: genoref_fasta::Error) -> Self {
    use genoref_fasta::Error as E;
    match e {
      E::ContigNotFound(_) => Self::NotFound(e.to_string()),
      E::OutOfRange { .. } => Self::BadRequest(e.to_string()),
      E::InvalidRange { .. } => Self::RangeNotSatisfiable(e.to_string()),
      E::CircularNotImplemented(_) => Self::NotImplemented(e.to_string()),
      _ => Self::Upstream(e.to_string()),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    let message = match &self {
      ApiError::NotFound(m)
      | ApiError::BadRequest(m)
      | ApiError::Conflict(m)
      | ApiError::RangeNotSatisfiable(m)
      | ApiError::NotAcceptable(m)
      | ApiError::NotImplemented(m)
      | ApiError::Unavailable(m)
      | ApiError::Upstream(m) => m.clone(),
      ApiError::Store(e) => e.to_string(),
    };
    if status.is_server_error() {
      tracing::error!(%status, error = %message, "request failed");
    }
    (status, Json(json!({ "error": message }))).into_response()
  }
}
