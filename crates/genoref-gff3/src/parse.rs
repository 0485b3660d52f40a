//! GFF3 line parser.
//!
//! Pipeline:
//!   raw line
//!     └─ parse_line()        → ParsedLine
//!          └─ parse_attributes() → ordered (key, values) pairs
//!
//! Errors are plain strings here; the caller attaches the line number.

use genoref_core::feature::{FeatureEntry, Strand, validate_feature_type};

/// Types dropped during ingestion. Checked before any other column, so a
/// skipped type never trips the feature type width bound.
pub const SKIPPED_TYPES: [&str; 1] = ["stop_codon_redefined_as_selenocysteine"];

// ─── Record representation ───────────────────────────────────────────────────

/// One data line of a GFF3 file.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
  pub contig:       String,
  pub source:       String,
  pub feature_type: String,
  pub strand:       Strand,
  /// Coordinates already converted to 1-based, end-exclusive.
  pub entry:        FeatureEntry,
  /// Attributes in file order; each value list is already split on `,`.
  pub attributes:   Vec<(String, Vec<String>)>,
}

impl Record {
  /// First value of attribute `key`.
  pub fn attr(&self, key: &str) -> Option<&str> {
    self
      .attributes
      .iter()
      .find(|(k, _)| k == key)
      .and_then(|(_, vs)| vs.first())
      .map(String::as_str)
  }

  pub fn attr_values(&self, key: &str) -> &[String] {
    self
      .attributes
      .iter()
      .find(|(k, _)| k == key)
      .map(|(_, vs)| vs.as_slice())
      .unwrap_or_default()
  }
}

pub enum ParsedLine {
  Record(Box<Record>),
  /// Comment, directive or blank line.
  Comment,
  /// A record of one of [`SKIPPED_TYPES`].
  Skipped,
  /// `##FASTA`: everything after this is sequence, not features.
  FastaSection,
}

// ─── Line parsing ────────────────────────────────────────────────────────────

pub fn parse_line(line: &str) -> Result<ParsedLine, String> {
  let line = line.trim_end_matches(['\r', '\n']);
  if line.starts_with("##FASTA") {
    return Ok(ParsedLine::FastaSection);
  }
  if line.starts_with('#') || line.trim().is_empty() {
    return Ok(ParsedLine::Comment);
  }

  let columns: Vec<&str> = line.split('\t').collect();
  if columns.len() != 9 {
    return Err(format!("expected 9 tab-separated columns, found {}", columns.len()));
  }

  let contig = percent_decode(columns[0])?;
  if contig.is_empty() || contig == "." {
    return Err("missing seqid".into());
  }

  let feature_type = percent_decode(columns[2])?;
  if SKIPPED_TYPES.contains(&feature_type.as_str()) {
    return Ok(ParsedLine::Skipped);
  }
  validate_feature_type(&feature_type).map_err(|e| e.to_string())?;

  let start: u64 = columns[3]
    .parse()
    .map_err(|_| format!("invalid start {:?}", columns[3]))?;
  let end: u64 = columns[4]
    .parse()
    .map_err(|_| format!("invalid end {:?}", columns[4]))?;
  if start == 0 {
    return Err("start must be 1-based".into());
  }
  if end < start {
    return Err(format!("end {end} is before start {start}"));
  }

  let score = match columns[5] {
    "." => None,
    s => Some(s.parse::<f64>().map_err(|_| format!("invalid score {s:?}"))?),
  };

  let strand = Strand::from_symbol(columns[6]).map_err(|e| e.to_string())?;

  let phase = match columns[7] {
    "." => None,
    "0" => Some(0),
    "1" => Some(1),
    "2" => Some(2),
    p => return Err(format!("invalid phase {p:?}")),
  };

  let attributes = parse_attributes(columns[8])?;

  Ok(ParsedLine::Record(Box::new(Record {
    contig,
    source: percent_decode(columns[1])?,
    feature_type,
    strand,
    entry: FeatureEntry { start_pos: start, end_pos: end + 1, score, phase },
    attributes,
  })))
}

/// Parse column 9: `key=v1,v2;key2=v3`. A lone `.` means no attributes.
pub fn parse_attributes(s: &str) -> Result<Vec<(String, Vec<String>)>, String> {
  let mut out: Vec<(String, Vec<String>)> = Vec::new();
  if s.trim() == "." {
    return Ok(out);
  }

  for pair in s.split(';') {
    let pair = pair.trim();
    if pair.is_empty() {
      continue;
    }
    let (key, raw) = pair
      .split_once('=')
      .ok_or_else(|| format!("attribute missing '=': {pair:?}"))?;
    let key = percent_decode(key.trim())?;
    if key.is_empty() {
      return Err(format!("attribute with empty key: {pair:?}"));
    }

    let mut values = Vec::new();
    for v in raw.split(',').filter(|v| !v.is_empty()) {
      values.push(percent_decode(v)?);
    }

    // A repeated key extends the earlier one.
    match out.iter_mut().find(|(k, _)| *k == key) {
      Some((_, existing)) => existing.extend(values),
      None => out.push((key, values)),
    }
  }
  Ok(out)
}

/// Decode `%XX` escapes.
pub fn percent_decode(s: &str) -> Result<String, String> {
  if !s.contains('%') {
    return Ok(s.to_owned());
  }

  let bytes = s.as_bytes();
  let mut out = Vec::with_capacity(bytes.len());
  let mut i = 0;
  while i < bytes.len() {
    if bytes[i] == b'%' {
      let hex = bytes
        .get(i + 1..i + 3)
        .and_then(|h| std::str::from_utf8(h).ok())
        .and_then(|h| u8::from_str_radix(h, 16).ok())
        .ok_or_else(|| format!("bad percent escape in {s:?}"))?;
      out.push(hex);
      i += 3;
    } else {
      out.push(bytes[i]);
      i += 1;
    }
  }
  String::from_utf8(out).map_err(|_| format!("escape in {s:?} is not UTF-8"))
}
