//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings. Enums are stored as their wire names
//! (`queued`, `ingest_features`, `+`).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use genoref_core::{
  feature::{Feature, FeatureEntry, Strand},
  genome::{Alias, Contig, Genome, Taxon},
  task::Task,
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// A `genomes` row plus its aliases and contigs.
pub struct RawGenome {
  pub id:          String,
  pub md5:         String,
  pub ga4gh:       String,
  pub fasta:       String,
  pub fai:         String,
  pub gff3_gz:     Option<String>,
  pub gff3_gz_tbi: Option<String>,
  pub taxon_id:    String,
  pub taxon_label: String,
  pub aliases:     Vec<Alias>,
  pub contigs:     Vec<Contig>,
}

impl RawGenome {
  pub fn into_genome(self) -> Genome {
    Genome {
      id:          self.id,
      aliases:     self.aliases,
      md5:         self.md5,
      ga4gh:       self.ga4gh,
      fasta:       self.fasta,
      fai:         self.fai,
      gff3_gz:     self.gff3_gz,
      gff3_gz_tbi: self.gff3_gz_tbi,
      taxon:       Taxon { id: self.taxon_id, label: self.taxon_label },
      contigs:     self.contigs,
    }
  }
}

pub struct RawTask {
  pub id:        i64,
  pub genome_id: String,
  pub kind:      String,
  pub status:    String,
  pub message:   Option<String>,
  pub created:   String,
}

impl RawTask {
  pub const COLUMNS: &'static str = "id, genome_id, kind, status, message, created";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:        row.get(0)?,
      genome_id: row.get(1)?,
      kind:      row.get(2)?,
      status:    row.get(3)?,
      message:   row.get(4)?,
      created:   row.get(5)?,
    })
  }

  pub fn into_task(self) -> Result<Task> {
    Ok(Task {
      id:        self.id,
      genome_id: self.genome_id,
      kind:      self.kind.parse()?,
      status:    self.status.parse()?,
      message:   self.message,
      created:   decode_dt(&self.created)?,
    })
  }
}

/// A `genome_features` row with its entries, parents and attributes already
/// gathered.
pub struct RawFeature {
  pub genome_id:    String,
  pub contig_name:  String,
  pub strand:       String,
  pub feature_id:   String,
  pub feature_name: String,
  pub feature_type: String,
  pub source:       String,
  pub gene_id:      Option<String>,
  pub entries:      Vec<FeatureEntry>,
  pub parents:      Vec<String>,
  pub attributes:   Vec<(String, String)>,
}

impl RawFeature {
  pub fn into_feature(self) -> Result<Feature> {
    let mut attributes: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (k, v) in self.attributes {
      attributes.entry(k).or_default().push(v);
    }
    Ok(Feature {
      genome_id: self.genome_id,
      contig_name: self.contig_name,
      strand: Strand::from_symbol(&self.strand)?,
      feature_id: self.feature_id,
      feature_name: self.feature_name,
      feature_type: self.feature_type,
      source: self.source,
      entries: self.entries,
      gene_id: self.gene_id,
      attributes,
      parents: self.parents,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn datetime_roundtrip() {
    let now = Utc::now();
    assert_eq!(decode_dt(&encode_dt(now)).unwrap(), now);
    assert!(decode_dt("yesterday").is_err());
  }

  #[test]
  fn raw_task_rejects_unknown_status() {
    let raw = RawTask {
      id:        1,
      genome_id: "g".into(),
      kind:      "ingest_features".into(),
      status:    "paused".into(),
      message:   None,
      created:   encode_dt(Utc::now()),
    };
    assert!(matches!(raw.into_task(), Err(Error::Core(_))));
  }

  #[test]
  fn raw_feature_groups_attributes() {
    let raw = RawFeature {
      genome_id:    "g".into(),
      contig_name:  "chr1".into(),
      strand:       "-".into(),
      feature_id:   "f".into(),
      feature_name: "f".into(),
      feature_type: "exon".into(),
      source:       "s".into(),
      gene_id:      None,
      entries:      vec![],
      parents:      vec![],
      attributes:   vec![
        ("tag".into(), "basic".into()),
        ("tag".into(), "CCDS".into()),
        ("level".into(), "2".into()),
      ],
    };
    let f = raw.into_feature().unwrap();
    assert_eq!(f.strand, Strand::Reverse);
    assert_eq!(f.attributes["tag"], ["basic", "CCDS"]);
    assert_eq!(f.attributes["level"], ["2"]);
  }
}
