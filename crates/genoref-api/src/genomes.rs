//! Handlers for `/genomes` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/genomes` | Optional `?response_format=id_list` |
//! | `POST`   | `/genomes` | Body: a genome; contigs derived from the FAI when omitted |
//! | `GET`    | `/genomes/{id}` | Id, checksum or alias; 404 if not found |
//! | `PATCH`  | `/genomes/{id}` | Body: `{"gff3_gz": ..., "gff3_gz_tbi": ...}` |
//! | `DELETE` | `/genomes/{id}` | Cascades to contigs, features and tasks |
//! | `GET`    | `/genomes/{id}/contigs` | |
//! | `GET`    | `/genomes/{id}/contigs/{name}` | |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use genoref_core::{
  genome::{Alias, Contig, Genome, GenomeAnnotationPatch, Taxon},
  store::ReferenceStore,
};
use genoref_fasta::IndexedFasta;
use serde::{Deserialize, Serialize};

use crate::{AppState, error::ApiError};

// ─── Views ───────────────────────────────────────────────────────────────────

/// A contig as returned by the API, with its RefGet URIs.
#[derive(Debug, Serialize)]
pub struct ContigView {
  #[serde(flatten)]
  pub contig:      Contig,
  pub refget_uris: Vec<String>,
}

impl ContigView {
  pub fn new(contig: Contig, base_url: &str) -> Self {
    let base = base_url.trim_end_matches('/');
    let refget_uris =
      vec![format!("{base}/sequence/{}", contig.md5), format!("{base}/sequence/{}", contig.ga4gh)];
    Self { contig, refget_uris }
  }
}

#[derive(Debug, Serialize)]
pub struct GenomeView {
  pub id:          String,
  pub aliases:     Vec<Alias>,
  pub md5:         String,
  pub ga4gh:       String,
  pub fasta:       String,
  pub fai:         String,
  pub gff3_gz:     Option<String>,
  pub gff3_gz_tbi: Option<String>,
  pub taxon:       Taxon,
  pub contigs:     Vec<ContigView>,
}

impl GenomeView {
  pub fn new(g: Genome, base_url: &str) -> Self {
    Self {
      id:          g.id,
      aliases:     g.aliases,
      md5:         g.md5,
      ga4gh:       g.ga4gh,
      fasta:       g.fasta,
      fai:         g.fai,
      gff3_gz:     g.gff3_gz,
      gff3_gz_tbi: g.gff3_gz_tbi,
      taxon:       g.taxon,
      contigs:     g.contigs.into_iter().map(|c| ContigView::new(c, base_url)).collect(),
    }
  }
}

/// Resolve a genome by id or alias, or fail with 404.
pub(crate) async fn find_genome<S: ReferenceStore>(store: &S, id: &str) -> Result<Genome, ApiError> {
  store
    .get_genome(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("genome {id} not found")))
}

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
  #[default]
  Full,
  IdList,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
  #[serde(default)]
  pub response_format: ResponseFormat,
}

/// `GET /genomes[?response_format=id_list]`
pub async fn list<S: ReferenceStore>(
  State(state): State<AppState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Response, ApiError> {
  let genomes = state.store.list_genomes().await.map_err(ApiError::store)?;
  Ok(match params.response_format {
    ResponseFormat::IdList => {
      Json(genomes.into_iter().map(|g| g.id).collect::<Vec<_>>()).into_response()
    }
    ResponseFormat::Full => {
      let base = &state.config.service_url_base_path;
      Json(genomes.into_iter().map(|g| GenomeView::new(g, base)).collect::<Vec<_>>())
        .into_response()
    }
  })
}

// ─── Create ──────────────────────────────────────────────────────────────────

/// `POST /genomes`
///
/// The FAI is read to check the submitted contigs against it. When no
/// contigs are submitted they are derived from the FAI, and their checksums
/// computed by streaming each sequence.
pub async fn create<S: ReferenceStore>(
  State(state): State<AppState<S>>,
  Json(mut genome): Json<Genome>,
) -> Result<impl IntoResponse, ApiError> {
  genome.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

  let unreadable = |e: genoref_fasta::Error| ApiError::BadRequest(format!("cannot read FASTA: {e}"));
  let fasta = IndexedFasta::open(&genome.fasta, &genome.fai, &state.http).await.map_err(unreadable)?;

  if genome.contigs.is_empty() {
    tracing::info!(genome_id = %genome.id, contigs = fasta.index().len(), "deriving contigs from index");
    genome.contigs = fasta.derive_contigs().await.map_err(unreadable)?;
  } else {
    for contig in &genome.contigs {
      let entry = fasta
        .index()
        .get(&contig.name)
        .ok_or_else(|| ApiError::BadRequest(format!("contig {} is not in the FASTA index", contig.name)))?;
      if entry.length != contig.length {
        return Err(ApiError::BadRequest(format!(
          "contig {} has length {} but the FASTA index says {}",
          contig.name, contig.length, entry.length
        )));
      }
    }
  }

  let genome = state.store.create_genome(genome).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(GenomeView::new(genome, &state.config.service_url_base_path))))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /genomes/{id}`
pub async fn get_one<S: ReferenceStore>(
  State(state): State<AppState<S>>,
  Path(genome_id): Path<String>,
) -> Result<Json<GenomeView>, ApiError> {
  let genome = find_genome(state.store.as_ref(), &genome_id).await?;
  Ok(Json(GenomeView::new(genome, &state.config.service_url_base_path)))
}

// ─── Update ──────────────────────────────────────────────────────────────────

/// `PATCH /genomes/{id}`. Only the annotation URIs can change.
pub async fn update<S: ReferenceStore>(
  State(state): State<AppState<S>>,
  Path(genome_id): Path<String>,
  Json(patch): Json<GenomeAnnotationPatch>,
) -> Result<Json<GenomeView>, ApiError> {
  if patch.is_empty() {
    return Err(ApiError::BadRequest("nothing to update; expected gff3_gz or gff3_gz_tbi".into()));
  }
  let genome = find_genome(state.store.as_ref(), &genome_id).await?;
  let genome = state
    .store
    .update_genome_annotations(&genome.id, patch)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("genome {genome_id} not found")))?;
  Ok(Json(GenomeView::new(genome, &state.config.service_url_base_path)))
}

// ─── Delete ──────────────────────────────────────────────────────────────────

/// `DELETE /genomes/{id}`
pub async fn delete_one<S: ReferenceStore>(
  State(state): State<AppState<S>>,
  Path(genome_id): Path<String>,
) -> Result<StatusCode, ApiError> {
  if state.store.delete_genome(&genome_id).await.map_err(ApiError::store)? {
    Ok(StatusCode::NO_CONTENT)
  } else {
    Err(ApiError::NotFound(format!("genome {genome_id} not found")))
  }
}

// ─── Contigs ─────────────────────────────────────────────────────────────────

/// `GET /genomes/{id}/contigs`
pub async fn list_contigs<S: ReferenceStore>(
  State(state): State<AppState<S>>,
  Path(genome_id): Path<String>,
) -> Result<Json<Vec<ContigView>>, ApiError> {
  let genome = find_genome(state.store.as_ref(), &genome_id).await?;
  let base = &state.config.service_url_base_path;
  Ok(Json(genome.contigs.into_iter().map(|c| ContigView::new(c, base)).collect()))
}

/// `GET /genomes/{id}/contigs/{name}`
pub async fn get_contig<S: ReferenceStore>(
  State(state): State<AppState<S>>,
  Path((genome_id, contig_name)): Path<(String, String)>,
) -> Result<Json<ContigView>, ApiError> {
  let genome = find_genome(state.store.as_ref(), &genome_id).await?;
  let contig = state
    .store
    .get_contig(&genome.id, &contig_name)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("contig {contig_name} not found in genome {genome_id}")))?;
  Ok(Json(ContigView::new(contig, &state.config.service_url_base_path)))
}
