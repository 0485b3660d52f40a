//! GFF3 codec for genoref.
//!
//! Turns a GFF3 stream into a [`FeatureBatch`] ready for one atomic bulk
//! write. Pure synchronous; no HTTP or database dependencies, so callers on an
//! async runtime should run it on a blocking thread.
//!
//! # Quick start
//!
//! ```no_run
//! let parsed = genoref_gff3::read_gzip("annotations.gff3.gz".as_ref()).unwrap();
//! println!("{} features", parsed.batch.len());
//! ```
//!
//! Records that share an `ID` collapse into one feature with several entries.
//! That covers discontinuous features such as CDS spans without modelling
//! them further.

use std::{
  fs::File,
  io::{BufRead, BufReader},
  path::Path,
};

use flate2::read::MultiGzDecoder;
use genoref_core::feature::FeatureBatch;

pub mod error;
mod normalize;
mod parse;

pub use error::{Error, Result};
pub use normalize::{FeatureSetBuilder, Interner, Summary};
pub use parse::{ParsedLine, Record, SKIPPED_TYPES, parse_attributes, parse_line, percent_decode};

const PROGRESS_INTERVAL: usize = 100_000;

/// The result of reading one GFF3 file.
#[derive(Debug)]
pub struct ParsedFeatures {
  pub batch:   FeatureBatch,
  pub summary: Summary,
}

/// Read a plain-text GFF3 stream.
pub fn read(input: impl BufRead) -> Result<ParsedFeatures> {
  let mut builder = FeatureSetBuilder::new();

  for (n, line) in input.lines().enumerate() {
    let line = line?;
    let line_no = n + 1;
    match parse_line(&line).map_err(|reason| Error::MalformedRecord { line: line_no, reason })? {
      ParsedLine::Record(record) => builder.push(*record)?,
      ParsedLine::Skipped => builder.skip(),
      ParsedLine::Comment => {}
      ParsedLine::FastaSection => break,
    }
    if line_no % PROGRESS_INTERVAL == 0 {
      tracing::info!(lines = line_no, features = builder.len(), "reading GFF3");
    }
  }

  let (batch, summary) = builder.finish();
  tracing::info!(
    records = summary.records,
    features = batch.len(),
    skipped = summary.skipped,
    merged = summary.merged_entries,
    "parsed GFF3"
  );
  Ok(ParsedFeatures { batch, summary })
}

/// Read a gzip- or BGZF-compressed GFF3 file.
pub fn read_gzip(path: &Path) -> Result<ParsedFeatures> {
  let file = File::open(path)?;
  read(BufReader::new(MultiGzDecoder::new(file)))
}

#[cfg(test)]
mod tests {
  use std::io::Write as _;

  use flate2::{Compression, write::GzEncoder};

  use super::*;

  const GFF3: &str = "\
##gff-version 3
##sequence-region chr1 1 1000
chr1\tsrc\tgene\t100\t200\t.\t+\t.\tID=gene1
chr1\tsrc\texon\t100\t150\t.\t+\t.\tID=exon1;Parent=gene1
##FASTA
>chr1
AAAA
";

  #[test]
  fn reads_until_fasta_section() {
    let parsed = read(GFF3.as_bytes()).unwrap();
    assert_eq!(parsed.batch.len(), 2);
    assert_eq!(parsed.summary.records, 2);
  }

  #[test]
  fn selenocysteine_records_do_not_fail_the_file() {
    let input = "\
##gff-version 3
chr1\tENSEMBL\tgene\t100\t900\t.\t+\t.\tID=gene1;gene_id=gene1
chr1\tENSEMBL\ttranscript\t100\t900\t.\t+\t.\tID=tx1;Parent=gene1
chr1\tENSEMBL\tstop_codon_redefined_as_selenocysteine\t400\t402\t.\t+\t0\tParent=tx1
";
    let parsed = read(input.as_bytes()).unwrap();
    assert_eq!(parsed.batch.len(), 2);
    assert_eq!(parsed.summary.records, 3);
    assert_eq!(parsed.summary.skipped, 1);
    assert!(parsed.batch.features.iter().all(|f| f.feature_type.len() <= 31));
  }

  #[test]
  fn malformed_line_reports_line_number() {
    let input = "##gff-version 3\nchr1\tsrc\tgene\t100\n";
    let err = read(input.as_bytes()).unwrap_err();
    assert!(matches!(err, Error::MalformedRecord { line: 2, .. }));
  }

  #[test]
  fn reads_concatenated_gzip_members() {
    // BGZF files are a series of gzip members.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.gff3.gz");
    let mut out = File::create(&path).unwrap();
    for chunk in GFF3.split_inclusive("+\t.\tID=gene1\n") {
      let mut enc = GzEncoder::new(Vec::new(), Compression::default());
      enc.write_all(chunk.as_bytes()).unwrap();
      out.write_all(&enc.finish().unwrap()).unwrap();
    }
    drop(out);

    let parsed = read_gzip(&path).unwrap();
    assert_eq!(parsed.batch.len(), 2);
    let exon = &parsed.batch.features[1];
    assert_eq!(exon.feature_id, "exon1");
    assert_eq!(exon.gene, Some(0));
  }
}
