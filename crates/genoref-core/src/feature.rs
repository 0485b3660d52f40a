//! Genome features: the annotation half of the data model.
//!
//! Features are written in bulk as a [`FeatureBatch`] whose rows already carry
//! surrogate ids, and read back as [`Feature`] values with every reference
//! resolved to external feature ids.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Upper bound on the length of a feature type term.
pub const FEATURE_TYPE_MAX_LEN: usize = 31;

// ─── Strand ──────────────────────────────────────────────────────────────────

/// GFF3 column 7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strand {
  #[serde(rename = "+")]
  Forward,
  #[serde(rename = "-")]
  Reverse,
  /// Stranded, but the strand is not known (`?`).
  #[serde(rename = "?")]
  Unknown,
  /// Strandedness does not apply (`.`).
  #[serde(rename = ".")]
  NotStranded,
}

impl Strand {
  pub fn symbol(self) -> &'static str {
    match self {
      Self::Forward => "+",
      Self::Reverse => "-",
      Self::Unknown => "?",
      Self::NotStranded => ".",
    }
  }

  pub fn from_symbol(s: &str) -> Result<Self> {
    match s {
      "+" => Ok(Self::Forward),
      "-" => Ok(Self::Reverse),
      "?" => Ok(Self::Unknown),
      "." => Ok(Self::NotStranded),
      other => Err(Error::UnknownStrand(other.to_owned())),
    }
  }
}

// ─── Entries ─────────────────────────────────────────────────────────────────

/// One location of a feature. Discontinuous features have several.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEntry {
  /// 1-based, inclusive.
  pub start_pos: u64,
  /// 1-based, exclusive.
  pub end_pos:   u64,
  pub score:     Option<f64>,
  /// 0, 1 or 2.
  pub phase:     Option<u8>,
}

impl FeatureEntry {
  /// `contig:start-end` rendering cached alongside each entry for prefix
  /// search.
  pub fn position_text(&self, contig_name: &str) -> String {
    format!("{contig_name}:{}-{}", self.start_pos, self.end_pos)
  }
}

// ─── Read model ──────────────────────────────────────────────────────────────

/// A feature as returned by queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
  pub genome_id:    String,
  pub contig_name:  String,
  pub strand:       Strand,
  pub feature_id:   String,
  pub feature_name: String,
  pub feature_type: String,
  pub source:       String,
  pub entries:      Vec<FeatureEntry>,
  /// External id of the enclosing gene feature, if one was resolved.
  pub gene_id:      Option<String>,
  pub attributes:   BTreeMap<String, Vec<String>>,
  /// External ids of the parent features.
  pub parents:      Vec<String>,
}

// ─── Write model ─────────────────────────────────────────────────────────────

/// One feature of a [`FeatureBatch`].
///
/// `nid` is the batch-local surrogate id; it equals the feature's index in
/// [`FeatureBatch::features`]. `gene` and `parents` reference other features
/// by `nid`, and `attributes` are `(key, value)` indices into the batch's
/// interned string tables.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFeature {
  pub nid:          u32,
  pub feature_id:   String,
  pub feature_name: String,
  pub feature_type: String,
  pub source:       String,
  pub contig_name:  String,
  pub strand:       Strand,
  pub entries:      Vec<FeatureEntry>,
  pub gene:         Option<u32>,
  pub parents:      Vec<u32>,
  pub attributes:   Vec<(u32, u32)>,
}

/// A complete, normalized feature set for one genome, ready for a single bulk
/// insert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureBatch {
  pub features:         Vec<BatchFeature>,
  pub attribute_keys:   Vec<String>,
  pub attribute_values: Vec<String>,
}

impl FeatureBatch {
  pub fn len(&self) -> usize { self.features.len() }

  pub fn is_empty(&self) -> bool { self.features.is_empty() }

  /// Check that every internal reference resolves and every row respects the
  /// schema bounds.
  pub fn validate(&self) -> Result<()> {
    let n = self.features.len();
    let in_range = |id: u32, len: usize| (id as usize) < len;

    for (idx, f) in self.features.iter().enumerate() {
      if f.nid as usize != idx {
        return Err(Error::InvalidBatch(format!(
          "feature {} has nid {} at index {idx}",
          f.feature_id, f.nid
        )));
      }
      validate_feature_type(&f.feature_type)?;
      if let Some(gene) = f.gene
        && !in_range(gene, n)
      {
        return Err(Error::InvalidBatch(format!(
          "feature {} references missing gene {gene}",
          f.feature_id
        )));
      }
      if let Some(p) = f.parents.iter().find(|p| !in_range(**p, n)) {
        return Err(Error::InvalidBatch(format!(
          "feature {} references missing parent {p}",
          f.feature_id
        )));
      }
      for (k, v) in &f.attributes {
        if !in_range(*k, self.attribute_keys.len())
          || !in_range(*v, self.attribute_values.len())
        {
          return Err(Error::InvalidBatch(format!(
            "feature {} references a missing attribute",
            f.feature_id
          )));
        }
      }
      if let Some(e) = f.entries.iter().find(|e| e.end_pos < e.start_pos) {
        return Err(Error::InvalidBatch(format!(
          "feature {} has entry ending before it starts ({}-{})",
          f.feature_id, e.start_pos, e.end_pos
        )));
      }
    }
    Ok(())
  }
}

pub fn validate_feature_type(t: &str) -> Result<()> {
  if t.is_empty() || t.chars().count() > FEATURE_TYPE_MAX_LEN {
    return Err(Error::InvalidFeatureType(t.to_owned()));
  }
  Ok(())
}

// ─── Query ───────────────────────────────────────────────────────────────────

pub const DEFAULT_QUERY_LIMIT: u32 = 10;
pub const MAX_QUERY_LIMIT: u32 = 1000;

/// Filters for feature search. Every set field narrows the result (AND).
#[derive(Debug, Clone, Default)]
pub struct FeatureQuery {
  /// Free text matched against feature id and name.
  pub q:            Option<String>,
  /// Match `q` by trigram similarity instead of substring.
  pub q_fzy:        bool,
  pub name:         Option<String>,
  /// Match `name` by trigram similarity instead of substring.
  pub name_fzy:     bool,
  /// Prefix of an entry's `contig:start-end` rendering.
  pub position:     Option<String>,
  pub contig:       Option<String>,
  /// Some entry starts at or after this 1-based position.
  pub start:        Option<u64>,
  /// Some entry ends at or before this 1-based (exclusive) position.
  pub end:          Option<u64>,
  pub feature_type: Option<String>,
  pub offset:       u32,
  pub limit:        u32,
}

impl FeatureQuery {
  pub fn new() -> Self { Self { limit: DEFAULT_QUERY_LIMIT, ..Default::default() } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
  pub offset: u32,
  pub limit:  u32,
  /// Number of features matching the filters, regardless of the page window.
  pub total:  u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturePage {
  pub results:    Vec<Feature>,
  pub pagination: Pagination,
}
