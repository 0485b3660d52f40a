//! Genomes and their contigs: the catalog half of the data model.
//!
//! A genome is registered once with pointers to its FASTA, FASTA index and
//! (optionally) a gzipped GFF3 plus tabix index. Contigs are immutable after
//! registration; only the annotation URIs can be patched.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  checksum::{is_ga4gh, is_md5_hex},
};

/// Upper bound on the length of a genome id.
pub const GENOME_ID_MAX_LEN: usize = 31;

const TAXON_PREFIX: &str = "NCBITaxon:";

/// An alternative name for a genome or contig, modelled on RefGet aliases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
  pub alias:            String,
  pub naming_authority: String,
}

/// NCBI taxonomy term for the organism a genome belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxon {
  /// CURIE of the form `NCBITaxon:<id>`.
  pub id:    String,
  pub label: String,
}

/// One named sequence within a genome assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contig {
  pub name:     String,
  #[serde(default)]
  pub aliases:  Vec<Alias>,
  pub md5:      String,
  pub ga4gh:    String,
  pub length:   u64,
  #[serde(default)]
  pub circular: bool,
}

/// A registered reference genome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genome {
  pub id:          String,
  #[serde(default)]
  pub aliases:     Vec<Alias>,
  pub md5:         String,
  pub ga4gh:       String,
  /// URI of the FASTA file.
  pub fasta:       String,
  /// URI of the FASTA index.
  pub fai:         String,
  pub gff3_gz:     Option<String>,
  pub gff3_gz_tbi: Option<String>,
  pub taxon:       Taxon,
  #[serde(default)]
  pub contigs:     Vec<Contig>,
}

impl Genome {
  /// Check every validation bound a genome must satisfy before it is
  /// written. Uniqueness across genomes is the store's job.
  pub fn validate(&self) -> Result<()> {
    validate_genome_id(&self.id)?;
    check_checksums("genome", &self.md5, &self.ga4gh)?;

    let taxon_ok = self.taxon.id.strip_prefix(TAXON_PREFIX).is_some_and(|rest| {
      !rest.is_empty()
        && rest
          .bytes()
          .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_'))
    });
    if !taxon_ok {
      return Err(Error::InvalidTaxon(self.taxon.id.clone()));
    }

    let mut names = HashSet::new();
    let mut md5s = HashSet::new();
    let mut ga4ghs = HashSet::new();
    for contig in &self.contigs {
      if !names.insert(contig.name.as_str()) {
        return Err(Error::DuplicateContig(contig.name.clone()));
      }
      check_checksums("contig", &contig.md5, &contig.ga4gh)?;
      // Checksums are unique within a genome so that lookups are unambiguous.
      if !md5s.insert(contig.md5.as_str()) {
        return Err(Error::InvalidChecksum {
          field: "duplicate contig md5",
          value: contig.md5.clone(),
        });
      }
      if !ga4ghs.insert(contig.ga4gh.as_str()) {
        return Err(Error::InvalidChecksum {
          field: "duplicate contig ga4gh",
          value: contig.ga4gh.clone(),
        });
      }
    }
    Ok(())
  }

  pub fn contig(&self, name: &str) -> Option<&Contig> {
    self.contigs.iter().find(|c| c.name == name)
  }
}

fn check_checksums(what: &'static str, md5: &str, ga4gh: &str) -> Result<()> {
  if !is_md5_hex(md5) {
    return Err(Error::InvalidChecksum { field: what, value: md5.to_owned() });
  }
  if !is_ga4gh(ga4gh) {
    return Err(Error::InvalidChecksum { field: what, value: ga4gh.to_owned() });
  }
  Ok(())
}

/// Genome ids are used in URL paths, so they are restricted to a small,
/// path-safe alphabet.
pub fn validate_genome_id(id: &str) -> Result<()> {
  let ok = !id.is_empty()
    && id.len() <= GENOME_ID_MAX_LEN
    && id
      .bytes()
      .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
  if ok { Ok(()) } else { Err(Error::InvalidGenomeId(id.to_owned())) }
}

/// Partial update of a genome's annotation file URIs. Absent fields are left
/// untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenomeAnnotationPatch {
  pub gff3_gz:     Option<String>,
  pub gff3_gz_tbi: Option<String>,
}

impl GenomeAnnotationPatch {
  pub fn is_empty(&self) -> bool {
    self.gff3_gz.is_none() && self.gff3_gz_tbi.is_none()
  }
}

/// A contig found by checksum or alias, tagged with its owning genome.
///
/// Checksums are only unique within a genome, so the same sequence can be
/// present in several genomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContigMatch {
  pub genome_id: String,
  pub contig:    Contig,
}
