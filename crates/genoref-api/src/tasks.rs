//! Handlers for `/tasks` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/tasks` | Optional `?genome_id=` |
//! | `POST` | `/tasks` | Body: `{"genome_id":"hg38","kind":"ingest_features"}`; 409 while the genome has an unfinished task, 503 without workers |
//! | `GET`  | `/tasks/{id}` | 404 if not found |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use genoref_core::{
  store::ReferenceStore,
  task::{Task, TaskKind, TaskStatus},
};
use serde::{Deserialize, Serialize};

use crate::{AppState, error::ApiError};

/// A task as returned by the API. `message` is empty until the task
/// finishes.
#[derive(Debug, Serialize)]
pub struct TaskView {
  pub id:        i64,
  pub genome_id: String,
  pub kind:      TaskKind,
  pub status:    TaskStatus,
  pub message:   String,
  pub created:   DateTime<Utc>,
}

impl From<Task> for TaskView {
  fn from(t: Task) -> Self {
    Self {
      id:        t.id,
      genome_id: t.genome_id,
      kind:      t.kind,
      status:    t.status,
      message:   t.message.unwrap_or_default(),
      created:   t.created,
    }
  }
}

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub genome_id: Option<String>,
}

/// `GET /tasks[?genome_id=<id>]`
pub async fn list<S: ReferenceStore>(
  State(state): State<AppState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<TaskView>>, ApiError> {
  let tasks = state.store.list_tasks(params.genome_id.as_deref()).await.map_err(ApiError::store)?;
  Ok(Json(tasks.into_iter().map(TaskView::from).collect()))
}

// ─── Create ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub genome_id: String,
  pub kind:      TaskKind,
}

/// `POST /tasks`. Returns the `queued` task at once; the work happens on
/// the task manager's workers.
pub async fn create<S: ReferenceStore>(
  State(state): State<AppState<S>>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError> {
  // An unknown genome is a problem with the request body, not the URL.
  let genome = state
    .store
    .get_genome(&body.genome_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::BadRequest(format!("genome {} not found", body.genome_id)))?;

  let task = state.tasks.submit(state.store.as_ref(), &genome.id, body.kind).await?;
  Ok((StatusCode::CREATED, Json(TaskView::from(task))))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /tasks/{id}`
pub async fn get_one<S: ReferenceStore>(
  State(state): State<AppState<S>>,
  Path(task_id): Path<i64>,
) -> Result<Json<TaskView>, ApiError> {
  let task = state
    .store
    .get_task(task_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("task {task_id} not found")))?;
  Ok(Json(task.into()))
}
