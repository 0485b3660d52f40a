//! [`SqliteStore`], the SQLite implementation of [`ReferenceStore`].

use std::{collections::HashSet, path::Path};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension as _, TransactionBehavior, params};

use genoref_core::{
  feature::{Feature, FeatureBatch, FeaturePage, FeatureQuery, Pagination},
  genome::{Alias, Contig, ContigMatch, Genome, GenomeAnnotationPatch},
  store::ReferenceStore,
  task::{Task, TaskKind, TaskStatus},
};

use crate::{
  Error, Result,
  encode::{RawGenome, RawTask, encode_dt},
  query::{self, CompiledQuery},
  schema::SCHEMA,
  trgm,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A genoref catalog backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        trgm::register(conn)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Row helpers ─────────────────────────────────────────────────────────────

/// The SQLite message of a constraint violation, if `e` is one.
fn constraint_violation(e: &rusqlite::Error) -> Option<String> {
  match e {
    rusqlite::Error::SqliteFailure(err, msg)
      if err.code == rusqlite::ErrorCode::ConstraintViolation =>
    {
      Some(msg.clone().unwrap_or_else(|| err.to_string()))
    }
    _ => None,
  }
}

fn genome_exists(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
  conn.query_row("SELECT EXISTS (SELECT 1 FROM genomes WHERE id = ?1)", [id], |r| r.get(0))
}

fn load_aliases(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> rusqlite::Result<Vec<Alias>> {
  let mut stmt = conn.prepare_cached(sql)?;
  stmt
    .query_map(params, |r| Ok(Alias { alias: r.get(0)?, naming_authority: r.get(1)? }))?
    .collect()
}

fn load_contig_aliases(conn: &Connection, genome_id: &str, name: &str) -> rusqlite::Result<Vec<Alias>> {
  load_aliases(
    conn,
    "SELECT alias, naming_authority FROM genome_contig_aliases
      WHERE genome_id = ?1 AND contig_name = ?2 ORDER BY alias",
    params![genome_id, name],
  )
}

const CONTIG_COLUMNS: &str = "contig_name, length, circular, md5, ga4gh";

fn contig_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Contig> {
  Ok(Contig {
    name:     r.get(0)?,
    aliases:  vec![],
    length:   r.get(1)?,
    circular: r.get(2)?,
    md5:      r.get(3)?,
    ga4gh:    r.get(4)?,
  })
}

fn load_contig(conn: &Connection, genome_id: &str, name: &str) -> rusqlite::Result<Option<Contig>> {
  let contig = conn
    .query_row(
      &format!("SELECT {CONTIG_COLUMNS} FROM genome_contigs WHERE genome_id = ?1 AND contig_name = ?2"),
      params![genome_id, name],
      contig_from_row,
    )
    .optional()?;
  contig
    .map(|mut c| {
      c.aliases = load_contig_aliases(conn, genome_id, name)?;
      Ok(c)
    })
    .transpose()
}

fn load_genome(conn: &Connection, id: &str) -> rusqlite::Result<Option<RawGenome>> {
  let raw = conn
    .query_row(
      "SELECT id, md5, ga4gh, fasta, fai, gff3_gz, gff3_gz_tbi, taxon_id, taxon_label
         FROM genomes WHERE id = ?1",
      [id],
      |r| {
        Ok(RawGenome {
          id:          r.get(0)?,
          md5:         r.get(1)?,
          ga4gh:       r.get(2)?,
          fasta:       r.get(3)?,
          fai:         r.get(4)?,
          gff3_gz:     r.get(5)?,
          gff3_gz_tbi: r.get(6)?,
          taxon_id:    r.get(7)?,
          taxon_label: r.get(8)?,
          aliases:     vec![],
          contigs:     vec![],
        })
      },
    )
    .optional()?;
  let Some(mut raw) = raw else { return Ok(None) };

  raw.aliases = load_aliases(
    conn,
    "SELECT alias, naming_authority FROM genome_aliases WHERE genome_id = ?1 ORDER BY alias",
    [id],
  )?;

  let mut contigs = {
    let mut stmt = conn.prepare_cached(&format!(
      "SELECT {CONTIG_COLUMNS} FROM genome_contigs WHERE genome_id = ?1 ORDER BY position"
    ))?;
    stmt.query_map([id], contig_from_row)?.collect::<rusqlite::Result<Vec<_>>>()?
  };
  for c in &mut contigs {
    c.aliases = load_contig_aliases(conn, id, &c.name)?;
  }
  raw.contigs = contigs;
  Ok(Some(raw))
}

fn insert_genome(conn: &Connection, g: &Genome) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO genomes (id, md5, ga4gh, fasta, fai, gff3_gz, gff3_gz_tbi, taxon_id, taxon_label)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    params![
      g.id,
      g.md5,
      g.ga4gh,
      g.fasta,
      g.fai,
      g.gff3_gz,
      g.gff3_gz_tbi,
      g.taxon.id,
      g.taxon.label,
    ],
  )?;

  let mut alias_stmt = conn.prepare(
    "INSERT INTO genome_aliases (genome_id, alias, naming_authority) VALUES (?1, ?2, ?3)",
  )?;
  for a in &g.aliases {
    alias_stmt.execute(params![g.id, a.alias, a.naming_authority])?;
  }

  let mut contig_stmt = conn.prepare(
    "INSERT INTO genome_contigs (genome_id, contig_name, position, length, circular, md5, ga4gh)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
  )?;
  let mut contig_alias_stmt = conn.prepare(
    "INSERT INTO genome_contig_aliases (genome_id, contig_name, alias, naming_authority)
     VALUES (?1, ?2, ?3, ?4)",
  )?;
  for (position, c) in g.contigs.iter().enumerate() {
    contig_stmt.execute(params![g.id, c.name, position, c.length, c.circular, c.md5, c.ga4gh])?;
    for a in &c.aliases {
      contig_alias_stmt.execute(params![g.id, c.name, a.alias, a.naming_authority])?;
    }
  }
  Ok(())
}

/// Intern `values` into a `(id, <column> UNIQUE)` table and return their row
/// ids in input order.
fn intern(conn: &Connection, table: &str, column: &str, values: &[String]) -> rusqlite::Result<Vec<i64>> {
  let mut insert = conn.prepare(&format!("INSERT OR IGNORE INTO {table} ({column}) VALUES (?1)"))?;
  let mut select = conn.prepare(&format!("SELECT id FROM {table} WHERE {column} = ?1"))?;
  values
    .iter()
    .map(|v| {
      insert.execute([v])?;
      select.query_row([v], |r| r.get(0))
    })
    .collect()
}

/// Write every row of `batch`. Row ids are `base + nid`, so gene and parent
/// links can be written before the rows they point at; the foreign keys on
/// those columns are deferred to commit.
fn insert_batch(conn: &Connection, genome_id: &str, batch: &FeatureBatch, base: i64) -> rusqlite::Result<()> {
  let keys = intern(conn, "genome_feature_attribute_keys", "attr_key", &batch.attribute_keys)?;
  let values = intern(conn, "genome_feature_attribute_values", "attr_val", &batch.attribute_values)?;

  let mut feature_stmt = conn.prepare(
    "INSERT INTO genome_features
       (id, genome_id, contig_name, strand, feature_id, feature_name, feature_type, source, gene_nid)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
  )?;
  let mut entry_stmt = conn.prepare(
    "INSERT INTO genome_feature_entries (feature, start_pos, end_pos, position_text, score, phase)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
  )?;
  let mut parent_stmt =
    conn.prepare("INSERT OR IGNORE INTO genome_feature_parents (feature, parent) VALUES (?1, ?2)")?;
  let mut attr_stmt = conn.prepare(
    "INSERT OR IGNORE INTO genome_feature_attributes (feature, attr_key, attr_val) VALUES (?1, ?2, ?3)",
  )?;

  for f in &batch.features {
    let id = base + i64::from(f.nid);
    feature_stmt.execute(params![
      id,
      genome_id,
      f.contig_name,
      f.strand.symbol(),
      f.feature_id,
      f.feature_name,
      f.feature_type,
      f.source,
      f.gene.map(|g| base + i64::from(g)),
    ])?;
    for e in &f.entries {
      entry_stmt.execute(params![
        id,
        e.start_pos,
        e.end_pos,
        e.position_text(&f.contig_name),
        e.score,
        e.phase,
      ])?;
    }
    for p in &f.parents {
      parent_stmt.execute(params![id, base + i64::from(*p)])?;
    }
    for (k, v) in &f.attributes {
      attr_stmt.execute(params![id, keys[*k as usize], values[*v as usize]])?;
    }
  }
  Ok(())
}

fn load_task(conn: &Connection, id: i64) -> rusqlite::Result<Option<RawTask>> {
  conn
    .query_row(
      &format!("SELECT {} FROM tasks WHERE id = ?1", RawTask::COLUMNS),
      [id],
      RawTask::from_row,
    )
    .optional()
}

// ─── ReferenceStore impl ─────────────────────────────────────────────────────

impl ReferenceStore for SqliteStore {
  type Error = Error;

  // ── Catalog ───────────────────────────────────────────────────────────────

  async fn create_genome(&self, genome: Genome) -> Result<Genome> {
    genome.validate()?;

    let genome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if genome_exists(&tx, &genome.id)? {
          return Ok(Err(Error::GenomeConflict(format!("id {} is taken", genome.id))));
        }
        if let Err(e) = insert_genome(&tx, &genome) {
          return match constraint_violation(&e) {
            Some(msg) => Ok(Err(Error::GenomeConflict(msg))),
            None => Err(e.into()),
          };
        }
        tx.commit()?;
        Ok(Ok(genome))
      })
      .await??;

    tracing::info!(genome_id = %genome.id, contigs = genome.contigs.len(), "registered genome");
    Ok(genome)
  }

  async fn get_genome(&self, key: &str) -> Result<Option<Genome>> {
    let key = key.to_owned();

    let raw = self
      .conn
      .call(move |conn| {
        if let Some(raw) = load_genome(conn, &key)? {
          return Ok(Some(raw));
        }
        let other: Option<String> = conn
          .query_row(
            "SELECT id FROM genomes WHERE md5 = ?1 OR ga4gh = ?1
             UNION
             SELECT genome_id FROM genome_aliases WHERE alias = ?1
             ORDER BY 1 LIMIT 1",
            [&key],
            |r| r.get(0),
          )
          .optional()?;
        match other {
          Some(id) => Ok(load_genome(conn, &id)?),
          None => Ok(None),
        }
      })
      .await?;

    Ok(raw.map(RawGenome::into_genome))
  }

  async fn list_genomes(&self) -> Result<Vec<Genome>> {
    let raws = self
      .conn
      .call(|conn| {
        let ids = {
          let mut stmt = conn.prepare("SELECT id FROM genomes ORDER BY id")?;
          stmt.query_map([], |r| r.get::<_, String>(0))?.collect::<rusqlite::Result<Vec<_>>>()?
        };
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
          out.extend(load_genome(conn, &id)?);
        }
        Ok(out)
      })
      .await?;

    Ok(raws.into_iter().map(RawGenome::into_genome).collect())
  }

  async fn update_genome_annotations(
    &self,
    genome_id: &str,
    patch: GenomeAnnotationPatch,
  ) -> Result<Option<Genome>> {
    let id = genome_id.to_owned();

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let changed = tx.execute(
          "UPDATE genomes
              SET gff3_gz     = COALESCE(?2, gff3_gz),
                  gff3_gz_tbi = COALESCE(?3, gff3_gz_tbi)
            WHERE id = ?1",
          params![id, patch.gff3_gz, patch.gff3_gz_tbi],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        let raw = load_genome(&tx, &id)?;
        tx.commit()?;
        Ok(raw)
      })
      .await?;

    Ok(raw.map(RawGenome::into_genome))
  }

  async fn delete_genome(&self, genome_id: &str) -> Result<bool> {
    let id = genome_id.to_owned();

    let deleted = self
      .conn
      .call(move |conn| Ok(conn.execute("DELETE FROM genomes WHERE id = ?1", [&id])?))
      .await?;

    if deleted > 0 {
      tracing::info!(genome_id, "deleted genome");
    }
    Ok(deleted > 0)
  }

  async fn get_contig(&self, genome_id: &str, contig_name: &str) -> Result<Option<Contig>> {
    let genome_id = genome_id.to_owned();
    let name = contig_name.to_owned();

    Ok(self.conn.call(move |conn| Ok(load_contig(conn, &genome_id, &name)?)).await?)
  }

  async fn find_contigs(&self, key: &str) -> Result<Vec<ContigMatch>> {
    let key = key.to_owned();

    let matches = self
      .conn
      .call(move |conn| {
        let hits = {
          let mut stmt = conn.prepare(
            "SELECT DISTINCT c.genome_id, c.contig_name, c.position
               FROM genome_contigs c
               LEFT JOIN genome_contig_aliases a
                 ON a.genome_id = c.genome_id AND a.contig_name = c.contig_name
              WHERE c.md5 = ?1 OR c.ga4gh = ?1 OR a.alias = ?1
              ORDER BY c.genome_id, c.position",
          )?;
          stmt
            .query_map([&key], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        let mut out = Vec::with_capacity(hits.len());
        for (genome_id, name) in hits {
          if let Some(contig) = load_contig(conn, &genome_id, &name)? {
            out.push(ContigMatch { genome_id, contig });
          }
        }
        Ok(out)
      })
      .await?;

    Ok(matches)
  }

  // ── Features ──────────────────────────────────────────────────────────────

  async fn replace_features(&self, genome_id: &str, batch: FeatureBatch) -> Result<usize> {
    batch.validate()?;
    let id = genome_id.to_owned();
    let count = batch.len();

    let removed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !genome_exists(&tx, &id)? {
          return Ok(Err(Error::GenomeNotFound(id)));
        }

        let contigs: HashSet<String> = {
          let mut stmt = tx.prepare("SELECT contig_name FROM genome_contigs WHERE genome_id = ?1")?;
          stmt.query_map([&id], |r| r.get(0))?.collect::<rusqlite::Result<_>>()?
        };
        if let Some(f) = batch.features.iter().find(|f| !contigs.contains(&f.contig_name)) {
          return Ok(Err(Error::UnknownContig {
            genome_id:  id,
            contig:     f.contig_name.clone(),
            feature_id: f.feature_id.clone(),
          }));
        }

        let removed = tx.execute("DELETE FROM genome_features WHERE genome_id = ?1", [&id])?;
        let base: i64 =
          tx.query_row("SELECT COALESCE(MAX(id), 0) + 1 FROM genome_features", [], |r| r.get(0))?;

        if let Err(e) = insert_batch(&tx, &id, &batch, base) {
          return match constraint_violation(&e) {
            Some(msg) => Ok(Err(Error::Core(genoref_core::Error::InvalidBatch(msg)))),
            None => Err(e.into()),
          };
        }
        // Deferred foreign keys are checked here.
        tx.commit()?;
        Ok(Ok(removed))
      })
      .await??;

    tracing::info!(genome_id, removed, written = count, "replaced features");
    Ok(count)
  }

  async fn clear_features(&self, genome_id: &str) -> Result<usize> {
    let id = genome_id.to_owned();

    let removed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if !genome_exists(&tx, &id)? {
          return Ok(Err(Error::GenomeNotFound(id)));
        }
        let removed = tx.execute("DELETE FROM genome_features WHERE genome_id = ?1", [&id])?;
        tx.commit()?;
        Ok(Ok(removed))
      })
      .await??;

    tracing::info!(genome_id, removed, "cleared features");
    Ok(removed)
  }

  async fn query_features(&self, genome_id: &str, query: &FeatureQuery) -> Result<FeaturePage> {
    let id = genome_id.to_owned();
    let compiled = CompiledQuery::compile(genome_id, query);
    let (offset, limit) = (query.offset, query.limit);

    let (raws, total) = self
      .conn
      .call(move |conn| {
        // One read transaction so the count and the page agree.
        let tx = conn.transaction()?;
        if !genome_exists(&tx, &id)? {
          return Ok(Err(Error::GenomeNotFound(id)));
        }
        let (ids, total) = query::run(&tx, &compiled, limit, offset)?;
        let raws = query::load_features(&tx, &ids)?;
        tx.commit()?;
        Ok(Ok((raws, total)))
      })
      .await??;

    let results = raws.into_iter().map(|r| r.into_feature()).collect::<Result<Vec<_>>>()?;
    Ok(FeaturePage { results, pagination: Pagination { offset, limit, total } })
  }

  async fn get_feature(&self, genome_id: &str, feature_id: &str) -> Result<Option<Feature>> {
    let genome_id = genome_id.to_owned();
    let feature_id = feature_id.to_owned();

    let raw = self
      .conn
      .call(move |conn| {
        let row: Option<i64> = conn
          .query_row(
            "SELECT id FROM genome_features WHERE genome_id = ?1 AND feature_id = ?2",
            params![genome_id, feature_id],
            |r| r.get(0),
          )
          .optional()?;
        match row {
          Some(row) => Ok(query::load_features(conn, &[row])?.pop()),
          None => Ok(None),
        }
      })
      .await?;

    raw.map(|r| r.into_feature()).transpose()
  }

  // ── Tasks ─────────────────────────────────────────────────────────────────

  async fn create_task(&self, genome_id: &str, kind: TaskKind) -> Result<Task> {
    let id = genome_id.to_owned();
    let created = Utc::now();
    let created_str = encode_dt(created);

    let task_id = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if !genome_exists(&tx, &id)? {
          return Ok(Err(Error::GenomeNotFound(id)));
        }
        let inserted = tx.execute(
          "INSERT INTO tasks (genome_id, kind, status, message, created)
           VALUES (?1, ?2, ?3, NULL, ?4)",
          params![id, kind.as_str(), TaskStatus::Queued.as_str(), created_str],
        );
        match inserted {
          Ok(_) => {}
          Err(e) if constraint_violation(&e).is_some() => return Ok(Err(Error::TaskConflict(id))),
          Err(e) => return Err(e.into()),
        }
        let task_id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(Ok(task_id))
      })
      .await??;

    tracing::info!(task_id, genome_id, %kind, "queued task");
    Ok(Task {
      id: task_id,
      genome_id: genome_id.to_owned(),
      kind,
      status: TaskStatus::Queued,
      message: None,
      created,
    })
  }

  async fn get_task(&self, id: i64) -> Result<Option<Task>> {
    let raw = self.conn.call(move |conn| Ok(load_task(conn, id)?)).await?;
    raw.map(RawTask::into_task).transpose()
  }

  async fn list_tasks(&self, genome_id: Option<&str>) -> Result<Vec<Task>> {
    let genome_id = genome_id.map(str::to_owned);

    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM tasks WHERE ?1 IS NULL OR genome_id = ?1 ORDER BY id",
          RawTask::COLUMNS
        ))?;
        let rows = stmt
          .query_map([&genome_id], RawTask::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawTask::into_task).collect()
  }

  async fn update_task_status(
    &self,
    id: i64,
    status: TaskStatus,
    message: Option<String>,
  ) -> Result<Task> {
    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let Some(current) = load_task(&tx, id)? else {
          return Ok(Err(Error::TaskNotFound(id)));
        };
        let from: TaskStatus = match current.status.parse() {
          Ok(s) => s,
          Err(e) => return Ok(Err(Error::Core(e))),
        };
        if !from.can_transition_to(status) {
          return Ok(Err(Error::InvalidTransition { id, from, to: status }));
        }
        tx.execute(
          "UPDATE tasks SET status = ?2, message = ?3 WHERE id = ?1",
          params![id, status.as_str(), message],
        )?;
        let updated = load_task(&tx, id)?;
        tx.commit()?;
        Ok(updated.ok_or(Error::TaskNotFound(id)))
      })
      .await??;

    tracing::debug!(task_id = id, %status, "task status changed");
    raw.into_task()
  }

  async fn fail_running_tasks(&self, message: String) -> Result<usize> {
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE tasks SET status = 'error', message = ?1 WHERE status = 'running'",
          [&message],
        )?)
      })
      .await?;

    if changed > 0 {
      tracing::warn!(changed, "marked running tasks as failed");
    }
    Ok(changed)
  }
}
