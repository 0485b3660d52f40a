//! SQL for feature search and feature hydration.

use genoref_core::feature::{FeatureEntry, FeatureQuery};
use rusqlite::{Connection, types::Value};

use crate::encode::RawFeature;

/// A filter compiled to SQL.
///
/// `rank` is empty unless a fuzzy filter is active. Its parameters bind before
/// those of `filter` because it appears earlier in the statement.
#[derive(Debug, Default)]
pub struct CompiledQuery {
  pub filter:        String,
  pub filter_params: Vec<Value>,
  pub rank:          Vec<String>,
  pub rank_params:   Vec<Value>,
}

impl CompiledQuery {
  pub fn compile(genome_id: &str, q: &FeatureQuery) -> Self {
    let mut c = Self::default();
    c.push("f.genome_id = ?", [Value::Text(genome_id.to_owned())]);

    if let Some(text) = q.q.as_deref().filter(|s| !s.is_empty()) {
      let t = Value::Text(text.to_owned());
      if q.q_fzy {
        let expr = "max(similarity(?, f.feature_id), similarity(?, f.feature_name))";
        c.push(&format!("{expr} > 0"), [t.clone(), t.clone()]);
        c.rank.push(expr.to_owned());
        c.rank_params.extend([t.clone(), t]);
      } else {
        c.push(
          "(instr(lower(f.feature_id), lower(?)) > 0 OR instr(lower(f.feature_name), lower(?)) > 0)",
          [t.clone(), t],
        );
      }
    }

    if let Some(name) = q.name.as_deref().filter(|s| !s.is_empty()) {
      let n = Value::Text(name.to_owned());
      if q.name_fzy {
        let expr = "similarity(?, f.feature_name)";
        c.push(&format!("{expr} > 0"), [n.clone()]);
        c.rank.push(expr.to_owned());
        c.rank_params.push(n);
      } else {
        c.push("instr(lower(f.feature_name), lower(?)) > 0", [n]);
      }
    }

    if let Some(contig) = &q.contig {
      c.push("f.contig_name = ?", [Value::Text(contig.clone())]);
    }
    if let Some(t) = &q.feature_type {
      c.push("f.feature_type = ?", [Value::Text(t.clone())]);
    }

    // Location filters must all hold for the same entry.
    let mut entry_conds = Vec::new();
    let mut entry_params = Vec::new();
    if let Some(prefix) = q.position.as_deref().filter(|s| !s.is_empty()) {
      entry_conds.push("substr(e.position_text, 1, ?) = ?");
      entry_params.push(Value::Integer(prefix.chars().count() as i64));
      entry_params.push(Value::Text(prefix.to_owned()));
    }
    if let Some(start) = q.start {
      entry_conds.push("e.start_pos >= ?");
      entry_params.push(Value::Integer(start as i64));
    }
    if let Some(end) = q.end {
      entry_conds.push("e.end_pos <= ?");
      entry_params.push(Value::Integer(end as i64));
    }
    if !entry_conds.is_empty() {
      c.push(
        &format!(
          "EXISTS (SELECT 1 FROM genome_feature_entries e WHERE e.feature = f.id AND {})",
          entry_conds.join(" AND ")
        ),
        entry_params,
      );
    }

    c
  }

  fn push(&mut self, cond: &str, params: impl IntoIterator<Item = Value>) {
    if !self.filter.is_empty() {
      self.filter.push_str(" AND ");
    }
    self.filter.push_str(cond);
    self.filter_params.extend(params);
  }

  pub fn count_sql(&self) -> String {
    format!("SELECT COUNT(*) FROM genome_features f WHERE {}", self.filter)
  }

  /// Page of feature row ids. Fuzzy searches rank by similarity; ties and
  /// plain searches fall back to feature id, which is unique per genome.
  pub fn page_sql(&self) -> String {
    if self.rank.is_empty() {
      format!(
        "SELECT f.id FROM genome_features f WHERE {} ORDER BY f.feature_id LIMIT ? OFFSET ?",
        self.filter
      )
    } else {
      format!(
        "SELECT f.id, ({}) AS rank FROM genome_features f WHERE {} \
         ORDER BY rank DESC, f.feature_id LIMIT ? OFFSET ?",
        self.rank.join(" + "),
        self.filter
      )
    }
  }

  pub fn page_params(&self, limit: u32, offset: u32) -> Vec<Value> {
    self
      .rank_params
      .iter()
      .chain(&self.filter_params)
      .cloned()
      .chain([Value::Integer(limit.into()), Value::Integer(offset.into())])
      .collect()
  }
}

/// Run a compiled query. Returns the page's row ids and the total match count.
pub fn run(conn: &Connection, c: &CompiledQuery, limit: u32, offset: u32) -> rusqlite::Result<(Vec<i64>, u64)> {
  let total: i64 = conn.query_row(
    &c.count_sql(),
    rusqlite::params_from_iter(c.filter_params.iter()),
    |r| r.get(0),
  )?;

  let mut stmt = conn.prepare(&c.page_sql())?;
  let ids = stmt
    .query_map(rusqlite::params_from_iter(c.page_params(limit, offset)), |r| r.get(0))?
    .collect::<rusqlite::Result<Vec<i64>>>()?;

  Ok((ids, total as u64))
}

/// Load full feature rows, in the order of `ids`.
pub fn load_features(conn: &Connection, ids: &[i64]) -> rusqlite::Result<Vec<RawFeature>> {
  let mut feature_stmt = conn.prepare_cached(
    "SELECT f.genome_id, f.contig_name, f.strand, f.feature_id, f.feature_name,
            f.feature_type, f.source, g.feature_id
       FROM genome_features f
       LEFT JOIN genome_features g ON g.id = f.gene_nid
      WHERE f.id = ?1",
  )?;
  let mut entry_stmt = conn.prepare_cached(
    "SELECT start_pos, end_pos, score, phase FROM genome_feature_entries
      WHERE feature = ?1 ORDER BY start_pos, end_pos",
  )?;
  let mut parent_stmt = conn.prepare_cached(
    "SELECT p.feature_id FROM genome_feature_parents fp
       JOIN genome_features p ON p.id = fp.parent
      WHERE fp.feature = ?1 ORDER BY p.feature_id",
  )?;
  let mut attr_stmt = conn.prepare_cached(
    "SELECT k.attr_key, v.attr_val FROM genome_feature_attributes a
       JOIN genome_feature_attribute_keys k ON k.id = a.attr_key
       JOIN genome_feature_attribute_values v ON v.id = a.attr_val
      WHERE a.feature = ?1 ORDER BY k.attr_key, v.id",
  )?;

  let mut out = Vec::with_capacity(ids.len());
  for &id in ids {
    let mut raw = feature_stmt.query_row([id], |r| {
      Ok(RawFeature {
        genome_id:    r.get(0)?,
        contig_name:  r.get(1)?,
        strand:       r.get(2)?,
        feature_id:   r.get(3)?,
        feature_name: r.get(4)?,
        feature_type: r.get(5)?,
        source:       r.get(6)?,
        gene_id:      r.get(7)?,
        entries:      vec![],
        parents:      vec![],
        attributes:   vec![],
      })
    })?;
    raw.entries = entry_stmt
      .query_map([id], |r| {
        Ok(FeatureEntry {
          start_pos: r.get(0)?,
          end_pos:   r.get(1)?,
          score:     r.get(2)?,
          phase:     r.get(3)?,
        })
      })?
      .collect::<rusqlite::Result<_>>()?;
    raw.parents = parent_stmt
      .query_map([id], |r| r.get(0))?
      .collect::<rusqlite::Result<_>>()?;
    raw.attributes = attr_stmt
      .query_map([id], |r| Ok((r.get(0)?, r.get(1)?)))?
      .collect::<rusqlite::Result<_>>()?;
    out.push(raw);
  }
  Ok(out)
}
