//! Handlers for `/genomes/{id}/features` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/genomes/{id}/features` | Filters below; paginated |
//! | `DELETE` | `/genomes/{id}/features` | Removes the whole feature set |
//! | `GET`    | `/genomes/{id}/features/{feature_id}` | 404 if not found |
//!
//! Query filters combine with AND: `q` and `name` (substring, or trigram
//! similarity with `q_fzy` / `name_fzy`), `position` (prefix of
//! `contig:start-end`), `contig`, `start`, `end`, `feature_type`, plus
//! `offset` and `limit`.

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
};
use genoref_core::{
  feature::{
    DEFAULT_QUERY_LIMIT, Feature, FeaturePage, FeatureQuery, MAX_QUERY_LIMIT, validate_feature_type,
  },
  store::ReferenceStore,
};
use serde::Deserialize;

use crate::{AppState, error::ApiError, genomes::find_genome};

#[derive(Debug, Default, Deserialize)]
pub struct QueryParams {
  pub q:            Option<String>,
  #[serde(default)]
  pub q_fzy:        bool,
  pub name:         Option<String>,
  #[serde(default)]
  pub name_fzy:     bool,
  pub position:     Option<String>,
  pub contig:       Option<String>,
  pub start:        Option<u64>,
  pub end:          Option<u64>,
  pub feature_type: Option<String>,
  pub offset:       Option<u32>,
  pub limit:        Option<u32>,
}

impl QueryParams {
  pub fn into_query(self) -> Result<FeatureQuery, ApiError> {
    let limit = self.limit.unwrap_or(DEFAULT_QUERY_LIMIT);
    if !(1..=MAX_QUERY_LIMIT).contains(&limit) {
      return Err(ApiError::BadRequest(format!("limit must be between 1 and {MAX_QUERY_LIMIT}")));
    }
    if let Some(t) = &self.feature_type {
      validate_feature_type(t).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    }
    Ok(FeatureQuery {
      q: self.q,
      q_fzy: self.q_fzy,
      name: self.name,
      name_fzy: self.name_fzy,
      position: self.position,
      contig: self.contig,
      start: self.start,
      end: self.end,
      feature_type: self.feature_type,
      offset: self.offset.unwrap_or(0),
      limit,
    })
  }
}

/// `GET /genomes/{id}/features`
pub async fn list<S: ReferenceStore>(
  State(state): State<AppState<S>>,
  Path(genome_id): Path<String>,
  Query(params): Query<QueryParams>,
) -> Result<Json<FeaturePage>, ApiError> {
  let query = params.into_query()?;
  let genome = find_genome(state.store.as_ref(), &genome_id).await?;
  let page = state.store.query_features(&genome.id, &query).await.map_err(ApiError::store)?;
  Ok(Json(page))
}

/// `GET /genomes/{id}/features/{feature_id}`
pub async fn get_one<S: ReferenceStore>(
  State(state): State<AppState<S>>,
  Path((genome_id, feature_id)): Path<(String, String)>,
) -> Result<Json<Feature>, ApiError> {
  let genome = find_genome(state.store.as_ref(), &genome_id).await?;
  let feature = state
    .store
    .get_feature(&genome.id, &feature_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("feature {feature_id} not found in genome {genome_id}")))?;
  Ok(Json(feature))
}

/// `DELETE /genomes/{id}/features`
pub async fn clear<S: ReferenceStore>(
  State(state): State<AppState<S>>,
  Path(genome_id): Path<String>,
) -> Result<StatusCode, ApiError> {
  let genome = find_genome(state.store.as_ref(), &genome_id).await?;
  state.store.clear_features(&genome.id).await.map_err(ApiError::store)?;
  Ok(StatusCode::NO_CONTENT)
}
