//! Trigram similarity, registered as the SQL function `similarity(a, b)`.
//!
//! Text is lowercased and split into words on anything that is not
//! alphanumeric. Each word is padded with two leading blanks and one trailing
//! blank and cut into overlapping three-character windows. Similarity is the
//! number of shared trigrams over the number of distinct trigrams in either
//! string, so it lies in `0.0..=1.0`.

use std::collections::HashSet;

use rusqlite::{Connection, functions::FunctionFlags};

pub const FUNCTION_NAME: &str = "similarity";

pub fn trigrams(s: &str) -> HashSet<[char; 3]> {
  let mut out = HashSet::new();
  for word in s.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
    let padded: Vec<char> = [' ', ' ']
      .into_iter()
      .chain(word.chars().flat_map(char::to_lowercase))
      .chain([' '])
      .collect();
    for w in padded.windows(3) {
      out.insert([w[0], w[1], w[2]]);
    }
  }
  out
}

pub fn similarity(a: &str, b: &str) -> f64 {
  let ta = trigrams(a);
  let tb = trigrams(b);
  if ta.is_empty() || tb.is_empty() {
    return 0.0;
  }
  let shared = ta.intersection(&tb).count();
  let union = ta.len() + tb.len() - shared;
  shared as f64 / union as f64
}

/// Register `similarity` on `conn`. NULL arguments score 0.
pub fn register(conn: &Connection) -> rusqlite::Result<()> {
  conn.create_scalar_function(
    FUNCTION_NAME,
    2,
    FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
    |ctx| {
      let a: Option<String> = ctx.get(0)?;
      let b: Option<String> = ctx.get(1)?;
      Ok(match (a, b) {
        (Some(a), Some(b)) => similarity(&a, &b),
        _ => 0.0,
      })
    },
  )
}
