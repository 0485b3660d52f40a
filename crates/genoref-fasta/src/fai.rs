//! FASTA index (`.fai`) parsing.
//!
//! Each line is `name\tlength\toffset\tline_bases\tline_width`: the contig
//! name, its length in bases, the byte offset of its first base, the number
//! of bases per line and the number of bytes per line (bases plus line
//! terminator).

use std::collections::HashMap;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaiEntry {
  pub name:       String,
  pub length:     u64,
  pub offset:     u64,
  pub line_bases: u64,
  pub line_width: u64,
}

impl FaiEntry {
  /// File offset of the 0-based base `pos`.
  pub fn byte_offset(&self, pos: u64) -> u64 {
    self.offset + (pos / self.line_bases) * self.line_width + pos % self.line_bases
  }

  /// Byte window `[from, to)` of the file that covers bases `[start, end)`.
  /// Line terminators inside the window still have to be stripped.
  pub fn byte_span(&self, start: u64, end: u64) -> (u64, u64) {
    if end <= start {
      let at = self.byte_offset(start.min(self.length));
      return (at, at);
    }
    (self.byte_offset(start), self.byte_offset(end - 1) + 1)
  }
}

#[derive(Debug, Clone, Default)]
pub struct FastaIndex {
  entries: Vec<FaiEntry>,
  by_name: HashMap<String, usize>,
}

impl FastaIndex {
  pub fn parse(text: &str) -> Result<Self> {
    let mut index = Self::default();

    for (n, line) in text.lines().enumerate() {
      let line_no = n + 1;
      let line = line.trim_end_matches('\r');
      if line.is_empty() {
        continue;
      }

      let fields: Vec<&str> = line.split('\t').collect();
      if fields.len() != 5 {
        return Err(invalid(line_no, format!("expected 5 fields, found {}", fields.len())));
      }

      let num = |i: usize, what: &str| {
        fields[i]
          .parse::<u64>()
          .map_err(|_| invalid(line_no, format!("{what} is not a number: {:?}", fields[i])))
      };
      let entry = FaiEntry {
        name:       fields[0].to_owned(),
        length:     num(1, "length")?,
        offset:     num(2, "offset")?,
        line_bases: num(3, "line bases")?,
        line_width: num(4, "line width")?,
      };

      if entry.name.is_empty() {
        return Err(invalid(line_no, "empty contig name".into()));
      }
      if entry.line_bases == 0 || entry.line_width < entry.line_bases {
        return Err(invalid(
          line_no,
          format!("bad line geometry {}/{}", entry.line_bases, entry.line_width),
        ));
      }
      if index.by_name.contains_key(&entry.name) {
        return Err(invalid(line_no, format!("duplicate contig {}", entry.name)));
      }

      index.by_name.insert(entry.name.clone(), index.entries.len());
      index.entries.push(entry);
    }

    Ok(index)
  }

  pub fn get(&self, name: &str) -> Option<&FaiEntry> {
    self.by_name.get(name).map(|&i| &self.entries[i])
  }

  /// Entries in file order.
  pub fn iter(&self) -> impl Iterator<Item = &FaiEntry> { self.entries.iter() }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

fn invalid(line: usize, reason: String) -> Error { Error::InvalidIndex { line, reason } }

#[cfg(test)]
mod tests {
  use super::*;

  const FAI: &str = "chr1\t112\t6\t28\t29\nchr2\t176\t128\t28\t29\n";

  #[test]
  fn parses_entries_in_order() {
    let index = FastaIndex::parse(FAI).unwrap();
    assert_eq!(index.len(), 2);
    let names: Vec<_> = index.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["chr1", "chr2"]);
    let chr2 = index.get("chr2").unwrap();
    assert_eq!((chr2.length, chr2.offset, chr2.line_bases, chr2.line_width), (176, 128, 28, 29));
  }

  #[test]
  fn byte_offsets_skip_newlines() {
    let index = FastaIndex::parse(FAI).unwrap();
    let chr1 = index.get("chr1").unwrap();
    assert_eq!(chr1.byte_offset(0), 6);
    assert_eq!(chr1.byte_offset(27), 33);
    // First base of the second line sits after the newline.
    assert_eq!(chr1.byte_offset(28), 35);
    assert_eq!(chr1.byte_span(20, 30), (26, 37));
  }

  #[test]
  fn empty_span_is_empty() {
    let index = FastaIndex::parse(FAI).unwrap();
    let (from, to) = index.get("chr1").unwrap().byte_span(5, 5);
    assert_eq!(from, to);
  }

  #[test]
  fn rejects_wrong_field_count() {
    let err = FastaIndex::parse("chr1\t10\t6\t10\n").unwrap_err();
    assert!(matches!(err, Error::InvalidIndex { line: 1, .. }));
  }

  #[test]
  fn rejects_non_numeric_and_duplicates() {
    assert!(FastaIndex::parse("chr1\tten\t6\t10\t11\n").is_err());
    let dup = "chr1\t10\t6\t10\t11\nchr1\t10\t23\t10\t11\n";
    assert!(matches!(FastaIndex::parse(dup), Err(Error::InvalidIndex { line: 2, .. })));
  }

  #[test]
  fn rejects_zero_line_bases() {
    assert!(FastaIndex::parse("chr1\t10\t6\t0\t1\n").is_err());
  }
}
