//! Normalization of parsed records into a [`FeatureBatch`].
//!
//! Two passes. While records stream in, each distinct feature id gets the next
//! surrogate id and attribute strings are interned. [`FeatureSetBuilder::finish`]
//! then resolves `Parent` and `gene_id` references through the id map, so the
//! store can write every row in one bulk insert.

use std::collections::{HashMap, HashSet};

use genoref_core::feature::{BatchFeature, FeatureBatch};

use crate::{Error, Result, parse::Record};

const ID_ATTR: &str = "ID";
const NAME_ATTR: &str = "Name";
const PARENT_ATTR: &str = "Parent";
const GENE_ID_ATTR: &str = "gene_id";

/// Attributes lifted into feature columns rather than stored as key/value rows.
const CAPTURED_ATTRS: [&str; 4] = [ID_ATTR, NAME_ATTR, PARENT_ATTR, GENE_ID_ATTR];

// ─── Interner ────────────────────────────────────────────────────────────────

/// Maps strings to dense `u32` ids in first-seen order.
#[derive(Debug, Default)]
pub struct Interner {
  ids:     HashMap<String, u32>,
  strings: Vec<String>,
}

impl Interner {
  pub fn intern(&mut self, s: &str) -> u32 {
    if let Some(&id) = self.ids.get(s) {
      return id;
    }
    let id = self.strings.len() as u32;
    self.ids.insert(s.to_owned(), id);
    self.strings.push(s.to_owned());
    id
  }

  pub fn len(&self) -> usize { self.strings.len() }

  pub fn is_empty(&self) -> bool { self.strings.is_empty() }

  pub fn into_strings(self) -> Vec<String> { self.strings }
}

// ─── Summary ─────────────────────────────────────────────────────────────────

/// Counters reported alongside a normalized batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
  /// Data lines read, including skipped ones.
  pub records:             usize,
  /// Records of a skipped type.
  pub skipped:             usize,
  /// Records folded into an existing feature as an extra entry.
  pub merged_entries:      usize,
  /// `Parent` references naming no feature in the file.
  pub dropped_parents:     usize,
  /// `gene_id` references naming no feature in the file.
  pub unresolved_gene_ids: usize,
}

// ─── Builder ─────────────────────────────────────────────────────────────────

struct Pending {
  feature:     BatchFeature,
  gene_ref:    Option<String>,
  parent_refs: Vec<String>,
}

#[derive(Default)]
pub struct FeatureSetBuilder {
  pending: Vec<Pending>,
  by_id:   HashMap<String, u32>,
  keys:    Interner,
  values:  Interner,
  summary: Summary,
}

impl FeatureSetBuilder {
  pub fn new() -> Self { Self::default() }

  /// Number of distinct features seen so far.
  pub fn len(&self) -> usize { self.pending.len() }

  pub fn is_empty(&self) -> bool { self.pending.is_empty() }

  /// Count a record that was dropped by type.
  pub fn skip(&mut self) {
    self.summary.records += 1;
    self.summary.skipped += 1;
  }

  pub fn push(&mut self, record: Record) -> Result<()> {
    self.summary.records += 1;

    let feature_id = feature_id(&record);

    if let Some(&nid) = self.by_id.get(&feature_id) {
      let existing = &mut self.pending[nid as usize];
      if existing.feature.contig_name != record.contig {
        return Err(Error::FeatureIdCollision {
          feature_id,
          first_contig: existing.feature.contig_name.clone(),
          contig: record.contig,
        });
      }
      existing.feature.entries.push(record.entry.clone());
      for p in record.attr_values(PARENT_ATTR) {
        if !existing.parent_refs.contains(p) {
          existing.parent_refs.push(p.clone());
        }
      }
      self.summary.merged_entries += 1;
      return Ok(());
    }

    let nid = self.pending.len() as u32;
    let feature_name = feature_name(&record).unwrap_or_else(|| feature_id.clone());

    let mut attributes = Vec::new();
    for (key, values) in &record.attributes {
      if CAPTURED_ATTRS.contains(&key.as_str()) {
        continue;
      }
      let k = self.keys.intern(key);
      for value in values {
        let pair = (k, self.values.intern(value));
        if !attributes.contains(&pair) {
          attributes.push(pair);
        }
      }
    }

    let mut parent_refs: Vec<String> = Vec::new();
    for p in record.attr_values(PARENT_ATTR) {
      if !parent_refs.contains(p) {
        parent_refs.push(p.clone());
      }
    }
    let gene_ref = record.attr(GENE_ID_ATTR).map(str::to_owned);

    self.by_id.insert(feature_id.clone(), nid);
    self.pending.push(Pending {
      feature: BatchFeature {
        nid,
        feature_id,
        feature_name,
        feature_type: record.feature_type,
        source: record.source,
        contig_name: record.contig,
        strand: record.strand,
        entries: vec![record.entry],
        gene: None,
        parents: vec![],
        attributes,
      },
      gene_ref,
      parent_refs,
    });
    Ok(())
  }

  /// Resolve references and produce the batch.
  pub fn finish(mut self) -> (FeatureBatch, Summary) {
    // Parents first: the gene fallback walks them.
    let mut resolved_parents: Vec<Vec<u32>> = Vec::with_capacity(self.pending.len());
    for p in &self.pending {
      let mut parents = Vec::with_capacity(p.parent_refs.len());
      for r in &p.parent_refs {
        match self.by_id.get(r) {
          Some(&nid) if nid != p.feature.nid => parents.push(nid),
          Some(_) => {}
          None => {
            tracing::debug!(feature = %p.feature.feature_id, parent = %r, "dropping unknown parent");
            self.summary.dropped_parents += 1;
          }
        }
      }
      resolved_parents.push(parents);
    }

    let is_gene: Vec<bool> = self
      .pending
      .iter()
      .map(|p| p.feature.feature_type.eq_ignore_ascii_case("gene"))
      .collect();

    let genes: Vec<Option<u32>> = (0..self.pending.len())
      .map(|idx| nearest_gene(idx, &resolved_parents, &is_gene))
      .collect();

    let mut features = Vec::with_capacity(self.pending.len());
    for ((mut p, parents), ancestor) in self.pending.into_iter().zip(resolved_parents).zip(genes) {
      let explicit = match &p.gene_ref {
        Some(r) => {
          let hit = self.by_id.get(r).copied();
          if hit.is_none() {
            self.summary.unresolved_gene_ids += 1;
          }
          hit
        }
        None => None,
      };
      p.feature.gene = explicit.or(ancestor);
      p.feature.parents = parents;
      features.push(p.feature);
    }

    if self.summary.dropped_parents > 0 {
      tracing::info!(
        dropped = self.summary.dropped_parents,
        "parent references without a matching feature were dropped"
      );
    }

    let batch = FeatureBatch {
      features,
      attribute_keys: self.keys.into_strings(),
      attribute_values: self.values.into_strings(),
    };
    (batch, self.summary)
  }
}

/// Breadth-first search up the parent graph for the closest `gene` ancestor.
fn nearest_gene(start: usize, parents: &[Vec<u32>], is_gene: &[bool]) -> Option<u32> {
  let mut seen: HashSet<u32> = HashSet::new();
  let mut frontier: Vec<u32> = parents[start].clone();
  while !frontier.is_empty() {
    let mut next = Vec::new();
    for nid in frontier {
      if !seen.insert(nid) {
        continue;
      }
      if is_gene[nid as usize] {
        return Some(nid);
      }
      next.extend(parents[nid as usize].iter().copied());
    }
    frontier = next;
  }
  None
}

// ─── Identity and naming ─────────────────────────────────────────────────────

/// `ID`, then a GENCODE natural key for the type, then a synthetic
/// `type:contig:start-end` id.
fn feature_id(record: &Record) -> String {
  if let Some(id) = record.attr(ID_ATTR).filter(|s| !s.is_empty()) {
    return id.to_owned();
  }
  let natural = match record.feature_type.to_ascii_lowercase().as_str() {
    "gene" => record.attr(GENE_ID_ATTR),
    "transcript" => record.attr("transcript_id"),
    "exon" => record.attr("exon_id"),
    _ => None,
  };
  match natural {
    Some(id) if !id.is_empty() => id.to_owned(),
    _ => format!(
      "{}:{}",
      record.feature_type,
      record.entry.position_text(&record.contig)
    ),
  }
}

/// `Name`, else a GENCODE-style derived name.
fn feature_name(record: &Record) -> Option<String> {
  if let Some(name) = record.attr(NAME_ATTR).filter(|s| !s.is_empty()) {
    return Some(name.to_owned());
  }

  let transcript = record.attr("transcript_name").or_else(|| record.attr("transcript_id"));
  let with_transcript = |suffix: &str| transcript.map(|t| format!("{t} {suffix}"));

  match record.feature_type.to_ascii_lowercase().as_str() {
    "gene" => record.attr("gene_name").map(str::to_owned),
    "transcript" => transcript.map(str::to_owned),
    "5utr" | "five_prime_utr" => with_transcript("5' UTR"),
    "3utr" | "three_prime_utr" => with_transcript("3' UTR"),
    "start_codon" => with_transcript("start codon"),
    "stop_codon" => with_transcript("stop codon"),
    "cds" => with_transcript("CDS"),
    "exon" => {
      let number = record.attr("exon_number")?;
      with_transcript(&format!("exon {number}"))
    }
    _ => None,
  }
}
