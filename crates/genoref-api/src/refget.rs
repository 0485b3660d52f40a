//! RefGet v2 sequence retrieval.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/sequence/service-info` | |
//! | `GET`  | `/sequence/{id}` | `?start=&end=` or `Range: bytes=a-b`, not both |
//! | `GET`  | `/sequence/{id}/metadata` | |
//!
//! `{id}` is a contig md5 (optionally `md5:`-prefixed), a GA4GH identifier
//! (`SQ.…`, optionally `ga4gh:`-prefixed) or a contig alias. The same
//! sequence may belong to several genomes; the lowest genome id wins.
//!
//! Coordinates are 0-based and half-open for `start`/`end`; `Range` bounds
//! are inclusive as in HTTP.

use std::collections::BTreeSet;

use axum::{
  Json,
  body::Body,
  extract::{Path, Query, State},
  http::{HeaderMap, HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use genoref_core::{
  genome::{Alias, Contig, Genome},
  store::ReferenceStore,
};
use genoref_fasta::IndexedFasta;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{AppState, error::ApiError};

pub const REFGET_TEXT: &str = "text/vnd.ga4gh.refget.v2.0.0+plain";
pub const REFGET_JSON: &str = "application/vnd.ga4gh.refget.v2.0.0+json";

const SEQUENCE_CONTENT_TYPE: &str = "text/vnd.ga4gh.refget.v2.0.0+plain; charset=us-ascii";

// ─── Content negotiation ─────────────────────────────────────────────────────

/// Whether the request's `Accept` header admits one of `offered`. A missing
/// header admits anything.
pub fn accepts(headers: &HeaderMap, offered: &[&str]) -> bool {
  let Some(value) = headers.get(header::ACCEPT) else { return true };
  let Ok(value) = value.to_str() else { return false };

  value
    .split(',')
    .filter_map(|range| range.split(';').next())
    .map(str::trim)
    .any(|range| {
      range == "*/*"
        || offered.iter().any(|o| {
          *o == range
            || range
              .strip_suffix("/*")
              .is_some_and(|top| o.split('/').next() == Some(top))
        })
    })
}

/// Parse `bytes=a-b` or `bytes=a-` into a 0-based half-open range.
pub fn parse_range(value: &str) -> Result<(u64, Option<u64>), ApiError> {
  let bad = || ApiError::BadRequest(format!("invalid Range header: {value}"));

  let spec = value.trim().strip_prefix("bytes=").ok_or_else(bad)?;
  let (first, last) = spec.split_once('-').ok_or_else(bad)?;
  let start: u64 = first.trim().parse().map_err(|_| bad())?;
  let end = match last.trim() {
    "" => None,
    last => {
      let last: u64 = last.parse().map_err(|_| bad())?;
      if last < start {
        return Err(ApiError::RangeNotSatisfiable(format!("range {start}-{last} ends before it starts")));
      }
      // A last byte of u64::MAX is past any contig.
      let end = last
        .checked_add(1)
        .ok_or_else(|| ApiError::BadRequest(format!("range end {last} is out of range")))?;
      Some(end)
    }
  };
  Ok((start, end))
}

// ─── Lookup ──────────────────────────────────────────────────────────────────

/// Strip a namespace prefix from a sequence identifier.
pub fn lookup_key(id: &str) -> &str {
  id.strip_prefix("md5:").or_else(|| id.strip_prefix("ga4gh:")).unwrap_or(id)
}

async fn find_sequence<S: ReferenceStore>(store: &S, id: &str) -> Result<(Genome, Contig), ApiError> {
  let not_found = || ApiError::NotFound(format!("sequence {id} not found"));

  let found = store
    .find_contigs(lookup_key(id))
    .await
    .map_err(ApiError::store)?
    .into_iter()
    .next()
    .ok_or_else(not_found)?;
  let genome = store
    .get_genome(&found.genome_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(not_found)?;
  Ok((genome, found.contig))
}

// ─── Sequence ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SequenceParams {
  pub start: Option<u64>,
  pub end:   Option<u64>,
}

/// `GET /sequence/{id}`
pub async fn sequence<S: ReferenceStore>(
  State(state): State<AppState<S>>,
  Path(sequence_id): Path<String>,
  Query(params): Query<SequenceParams>,
  headers: HeaderMap,
) -> Result<Response, ApiError> {
  if !accepts(&headers, &[REFGET_TEXT, "text/plain"]) {
    return Err(ApiError::NotAcceptable(format!("sequences are served as {REFGET_TEXT}")));
  }

  let range_header = headers
    .get(header::RANGE)
    .map(|v| v.to_str().map_err(|_| ApiError::BadRequest("invalid Range header".into())))
    .transpose()?;
  let by_params = params.start.is_some() || params.end.is_some();
  let (start, end) = match range_header {
    Some(_) if by_params => {
      return Err(ApiError::BadRequest("use either start/end or a Range header, not both".into()));
    }
    Some(value) => parse_range(value)?,
    None => (params.start.unwrap_or(0), params.end),
  };

  let (genome, contig) = find_sequence(state.store.as_ref(), &sequence_id).await?;
  let circular = genome.contigs.iter().filter(|c| c.circular).map(|c| c.name.clone());
  let fasta = IndexedFasta::open(&genome.fasta, &genome.fai, &state.http).await?.with_circular(circular);

  let (_, end) = fasta.resolve(&contig.name, start, end)?;
  let ranged = range_header.is_some() || by_params;
  if ranged && start >= contig.length {
    return Err(ApiError::BadRequest(format!(
      "start {start} is past the last base of a {}-base sequence",
      contig.length
    )));
  }
  let len = end - start;
  if let Some(limit) = state.config.subsequence_limit
    && len > limit
  {
    return Err(ApiError::BadRequest(format!(
      "requested {len} bases; at most {limit} may be fetched at once"
    )));
  }

  tracing::debug!(genome_id = %genome.id, contig = %contig.name, start, end, "serving sequence");
  let stream = fasta.stream(&contig.name, start, Some(end), state.config.file_response_chunk_size)?;

  let status = if ranged {
    StatusCode::PARTIAL_CONTENT
  } else {
    StatusCode::OK
  };
  let mut res = (
    status,
    [
      (header::CONTENT_TYPE, HeaderValue::from_static(SEQUENCE_CONTENT_TYPE)),
      (header::CONTENT_LENGTH, HeaderValue::from(len)),
      (header::ACCEPT_RANGES, HeaderValue::from_static("bytes")),
    ],
    Body::from_stream(stream),
  )
    .into_response();
  if range_header.is_some() {
    let last = end.saturating_sub(1);
    let value = HeaderValue::from_str(&format!("bytes {start}-{last}/{}", contig.length))
      .map_err(|e| ApiError::Store(Box::new(e)))?;
    res.headers_mut().insert(header::CONTENT_RANGE, value);
  }
  Ok(res)
}

// ─── Metadata ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SequenceMetadata {
  /// The sequence's GA4GH identifier.
  pub id:       String,
  pub md5:      String,
  pub ga4gh:    String,
  pub length:   u64,
  pub aliases:  Vec<Alias>,
  pub circular: bool,
}

impl From<Contig> for SequenceMetadata {
  fn from(c: Contig) -> Self {
    Self {
      id:       c.ga4gh.clone(),
      md5:      c.md5,
      ga4gh:    c.ga4gh,
      length:   c.length,
      aliases:  c.aliases,
      circular: c.circular,
    }
  }
}

/// `GET /sequence/{id}/metadata`
pub async fn metadata<S: ReferenceStore>(
  State(state): State<AppState<S>>,
  Path(sequence_id): Path<String>,
  headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
  if !accepts(&headers, &[REFGET_JSON, "application/json"]) {
    return Err(ApiError::NotAcceptable(format!("metadata is served as {REFGET_JSON}")));
  }
  let (_, contig) = find_sequence(state.store.as_ref(), &sequence_id).await?;
  Ok((
    [(header::CONTENT_TYPE, HeaderValue::from_static(REFGET_JSON))],
    Json(json!({ "metadata": SequenceMetadata::from(contig) })),
  ))
}

// ─── Service info ────────────────────────────────────────────────────────────

/// `GET /sequence/service-info`
///
/// `identifier_types` lists the naming authorities of every registered
/// contig alias.
pub async fn service_info<S: ReferenceStore>(
  State(state): State<AppState<S>>,
) -> Result<impl IntoResponse, ApiError> {
  let genomes = state.store.list_genomes().await.map_err(ApiError::store)?;
  let identifier_types: BTreeSet<String> = genomes
    .into_iter()
    .flat_map(|g| g.contigs)
    .flat_map(|c| c.aliases)
    .map(|a| a.naming_authority)
    .collect();

  Ok((
    [(header::CONTENT_TYPE, HeaderValue::from_static(REFGET_JSON))],
    Json(json!({
      "id": "genoref.refget",
      "name": "genoref",
      "type": {
        "group": "org.ga4gh",
        "artifact": "refget",
        "version": "2.0.0",
      },
      "version": env!("CARGO_PKG_VERSION"),
      "refget": {
        "circular_supported": false,
        "algorithms": ["md5", "ga4gh"],
        "identifier_types": identifier_types,
        "subsequence_limit": state.config.subsequence_limit,
      },
    })),
  ))
}
