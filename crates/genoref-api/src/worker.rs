//! The task manager: a queue of task ids drained by a fixed pool of workers.
//!
//! The request path only persists a `queued` task and pushes its id; workers
//! move it through `running` to `success` or `error`. Whether a genome may
//! get a new task is decided by the store, so several server processes can
//! share one database.

use std::{path::PathBuf, sync::Arc};

use genoref_core::{
  store::{ErrorKind, ReferenceStore, StoreError},
  task::{Task, TaskKind, TaskStatus},
};
use genoref_fasta::ByteSource;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tracing::Instrument as _;

use crate::error::ApiError;

/// Settings for ingestion runs.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
  /// Where remote annotation files are staged. The system temp directory
  /// when unset.
  pub tmp_dir: Option<PathBuf>,
}

/// Why an ingestion run failed. The message becomes the task's message.
#[derive(Debug, Error)]
pub enum IngestError {
  #[error("genome {0} no longer exists")]
  GenomeGone(String),

  #[error("genome {genome_id} has no {field} set")]
  MissingAnnotation { genome_id: String, field: &'static str },

  #[error("could not fetch annotations: {0}")]
  Fetch(#[from] genoref_fasta::Error),

  #[error("could not parse annotations: {0}")]
  Parse(#[from] genoref_gff3::Error),

  #[error("annotation file contains no features")]
  Empty,

  #[error("could not stage annotations: {0}")]
  Io(#[from] std::io::Error),

  #[error("annotation parser stopped unexpectedly: {0}")]
  Join(#[from] tokio::task::JoinError),

  #[error("{0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

fn store_err<E: StoreError>(e: E) -> IngestError { IngestError::Store(Box::new(e)) }

// ─── Manager ─────────────────────────────────────────────────────────────────

/// Handle to the worker pool. Cloning is cheap.
#[derive(Clone)]
pub struct TaskManager {
  queue: mpsc::UnboundedSender<i64>,
}

impl TaskManager {
  /// Spawn `workers` ingestion workers on the current tokio runtime.
  pub fn start<S>(store: Arc<S>, http: reqwest::Client, options: IngestOptions, workers: usize) -> Self
  where
    S: ReferenceStore + 'static,
  {
    let (tx, rx) = mpsc::unbounded_channel::<i64>();
    let rx = Arc::new(Mutex::new(rx));
    let options = Arc::new(options);

    for worker in 0..workers.max(1) {
      let rx = rx.clone();
      let store = store.clone();
      let http = http.clone();
      let options = options.clone();
      tokio::spawn(async move {
        loop {
          let next = rx.lock().await.recv().await;
          let Some(task_id) = next else { break };
          run(store.as_ref(), &http, &options, task_id).await;
        }
        tracing::debug!(worker, "ingest worker stopped");
      });
    }

    Self { queue: tx }
  }

  /// Persist a new `queued` task and hand it to the workers.
  ///
  /// If the workers are gone the task is failed at once, so the genome is
  /// not left holding an active task nobody will run.
  pub async fn submit<S: ReferenceStore>(
    &self,
    store: &S,
    genome_id: &str,
    kind: TaskKind,
  ) -> Result<Task, ApiError> {
    let task = store.create_task(genome_id, kind).await.map_err(ApiError::store)?;
    if self.queue.send(task.id).is_err() {
      tracing::error!(task_id = task.id, "task queue is closed");
      abandon(store, task.id, "task queue is closed").await;
      return Err(ApiError::Unavailable("ingestion workers are not running".into()));
    }
    Ok(task)
  }

  /// Enqueue every task still `queued` in the store, such as those submitted
  /// before a restart. Returns how many were enqueued.
  pub async fn resume_queued<S: ReferenceStore>(&self, store: &S) -> Result<usize, S::Error> {
    let mut resumed = 0;
    for task in store.list_tasks(None).await? {
      if task.status != TaskStatus::Queued {
        continue;
      }
      if self.queue.send(task.id).is_err() {
        tracing::error!(task_id = task.id, "task queue is closed");
        break;
      }
      resumed += 1;
    }
    if resumed > 0 {
      tracing::info!(resumed, "re-enqueued queued tasks");
    }
    Ok(resumed)
  }

  /// A manager whose workers have already stopped.
  #[cfg(test)]
  pub(crate) fn closed() -> Self {
    let (queue, _) = mpsc::unbounded_channel();
    Self { queue }
  }
}

/// Fail a task that never started, through `running` so its history stays
/// `queued, running, error`.
async fn abandon<S: ReferenceStore>(store: &S, task_id: i64, message: &str) {
  let result = match store.update_task_status(task_id, TaskStatus::Running, None).await {
    Ok(_) => store.update_task_status(task_id, TaskStatus::Error, Some(message.to_owned())).await,
    Err(e) => Err(e),
  };
  if let Err(e) = result {
    tracing::error!(task_id, error = %e, "could not fail abandoned task");
  }
}

// ─── Execution ───────────────────────────────────────────────────────────────

async fn run<S: ReferenceStore>(store: &S, http: &reqwest::Client, options: &IngestOptions, task_id: i64) {
  let task = match store.get_task(task_id).await {
    Ok(Some(task)) => task,
    Ok(None) => {
      tracing::warn!(task_id, "queued task disappeared before it ran");
      return;
    }
    Err(e) => {
      tracing::error!(task_id, error = %e, "could not load task");
      return;
    }
  };

  let span = tracing::info_span!("ingest", task_id, genome_id = %task.genome_id);
  async {
    if let Err(e) = store.update_task_status(task_id, TaskStatus::Running, None).await {
      if e.kind() == ErrorKind::Internal {
        tracing::error!(error = %e, "could not start task");
        abandon(store, task_id, &format!("could not start task: {e}")).await;
      } else {
        // Already picked up elsewhere, or finished.
        tracing::debug!(error = %e, "task is no longer queued");
      }
      return;
    }
    tracing::info!(kind = %task.kind, "task running");

    let outcome = match task.kind {
      TaskKind::IngestFeatures => ingest(store, http, options, &task.genome_id).await,
    };
    let (status, message) = match outcome {
      Ok(n) => {
        tracing::info!(features = n, "ingestion finished");
        (TaskStatus::Success, format!("ingested {n} features"))
      }
      Err(e) => {
        tracing::error!(error = %e, "ingestion failed");
        (TaskStatus::Error, e.to_string())
      }
    };

    if let Err(e) = store.update_task_status(task_id, status, Some(message)).await {
      tracing::error!(error = %e, %status, "could not record task outcome");
    }
  }
  .instrument(span)
  .await
}

/// Fetch, parse and write the genome's GFF3. Returns the number of features
/// written. The store write is a single transaction, so on any error the
/// previous feature set is left as it was.
async fn ingest<S: ReferenceStore>(
  store: &S,
  http: &reqwest::Client,
  options: &IngestOptions,
  genome_id: &str,
) -> Result<usize, IngestError> {
  let genome = store
    .get_genome(genome_id)
    .await
    .map_err(store_err)?
    .ok_or_else(|| IngestError::GenomeGone(genome_id.to_owned()))?;

  let missing = |field| IngestError::MissingAnnotation { genome_id: genome.id.clone(), field };
  let gff3_uri = genome.gff3_gz.as_deref().ok_or_else(|| missing("gff3_gz"))?;
  // The tabix index is part of a complete registration but is not read;
  // records are consumed sequentially.
  if genome.gff3_gz_tbi.is_none() {
    return Err(missing("gff3_gz_tbi"));
  }

  // Remote files are staged to disk so the parser can run on a blocking
  // thread. The temp file is removed when `_staged` drops.
  let (path, _staged) = match ByteSource::open(gff3_uri, http).await? {
    ByteSource::Local(path) => (path, None),
    remote => {
      let builder = {
        let mut b = tempfile::Builder::new();
        b.prefix("genoref-").suffix(".gff3.gz");
        b
      };
      let staged = match &options.tmp_dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
      };
      let bytes = remote.download_to(staged.path()).await?;
      tracing::info!(bytes, from = %remote.describe(), "downloaded annotations");
      (staged.path().to_path_buf(), Some(staged))
    }
  };

  let parsed = tokio::task::spawn_blocking(move || genoref_gff3::read_gzip(&path)).await??;
  if parsed.summary.dropped_parents > 0 || parsed.summary.unresolved_gene_ids > 0 {
    tracing::info!(
      dropped_parents = parsed.summary.dropped_parents,
      unresolved_gene_ids = parsed.summary.unresolved_gene_ids,
      "some references did not resolve"
    );
  }
  if parsed.batch.is_empty() {
    return Err(IngestError::Empty);
  }

  store.replace_features(&genome.id, parsed.batch).await.map_err(store_err)
}
