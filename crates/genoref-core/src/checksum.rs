//! Sequence checksums used as natural keys for contigs and genomes.
//!
//! Two digests are computed over the raw sequence bytes, exactly as stored:
//!
//! - `md5`: lowercase hex MD5.
//! - `ga4gh`: the GA4GH RefGet v2 identifier. SHA-512 of the sequence,
//!   truncated to its first 24 bytes, base64url-encoded without padding and
//!   prefixed with `SQ.`.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

/// Prefix of every GA4GH sequence identifier.
pub const GA4GH_PREFIX: &str = "SQ.";

/// Number of SHA-512 digest bytes kept in a GA4GH identifier.
const GA4GH_DIGEST_BYTES: usize = 24;

/// Length of a full GA4GH identifier: `SQ.` plus 32 base64url characters.
pub const GA4GH_LEN: usize = GA4GH_PREFIX.len() + 32;

/// MD5 of the empty sequence.
pub const EMPTY_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";

/// GA4GH identifier of the empty sequence.
pub const EMPTY_GA4GH: &str = "SQ.z4PhNX7vuL3xVChQ1m2AB9Yg5AULVxXc";

/// Both checksums of one sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceChecksums {
  pub md5:   String,
  pub ga4gh: String,
}

pub fn md5_hex(seq: &[u8]) -> String { format!("{:x}", md5::compute(seq)) }

pub fn ga4gh_checksum(seq: &[u8]) -> String {
  encode_ga4gh(&Sha512::digest(seq))
}

pub fn compute(seq: &[u8]) -> SequenceChecksums {
  SequenceChecksums { md5: md5_hex(seq), ga4gh: ga4gh_checksum(seq) }
}

fn encode_ga4gh(digest: &[u8]) -> String {
  format!(
    "{GA4GH_PREFIX}{}",
    URL_SAFE_NO_PAD.encode(&digest[..GA4GH_DIGEST_BYTES])
  )
}

/// Incremental variant of [`compute`] for sequences that are read in chunks.
///
/// Feeding the chunks of a sequence in order yields the same checksums as
/// hashing the concatenation in one go.
pub struct SequenceHasher {
  md5: md5::Context,
  sha: Sha512,
}

impl Default for SequenceHasher {
  fn default() -> Self { Self::new() }
}

impl SequenceHasher {
  pub fn new() -> Self { Self { md5: md5::Context::new(), sha: Sha512::new() } }

  pub fn update(&mut self, chunk: &[u8]) {
    self.md5.consume(chunk);
    self.sha.update(chunk);
  }

  pub fn finalize(self) -> SequenceChecksums {
    SequenceChecksums {
      md5:   format!("{:x}", self.md5.compute()),
      ga4gh: encode_ga4gh(&self.sha.finalize()),
    }
  }
}

// ─── Format checks ───────────────────────────────────────────────────────────

/// `true` for a 32-character lowercase hex string.
pub fn is_md5_hex(s: &str) -> bool {
  s.len() == 32
    && !s.bytes().any(|b| b.is_ascii_uppercase())
    && hex::decode(s).is_ok()
}

/// `true` for a well-formed `SQ.`-prefixed GA4GH identifier.
pub fn is_ga4gh(s: &str) -> bool {
  s.len() == GA4GH_LEN
    && s.strip_prefix(GA4GH_PREFIX).is_some_and(|body| {
      body
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_sequence_constants() {
    let sums = compute(b"");
    assert_eq!(sums.md5, EMPTY_MD5);
    assert_eq!(sums.ga4gh, EMPTY_GA4GH);
  }

  #[test]
  fn known_acgt_checksums() {
    let sums = compute(b"ACGT");
    assert_eq!(sums.md5, "f1f8f4bf413b16ad135722aa4591043e");
    assert_eq!(sums.ga4gh, "SQ.aKF498dAxcJAqme6QYQ7EZ07-fiw8Kw2");
  }

  #[test]
  fn checksums_are_stable() {
    let seq = b"NNNNACGTACGTTTGA";
    assert_eq!(compute(seq), compute(seq));
  }

  #[test]
  fn case_is_significant() {
    assert_ne!(md5_hex(b"acgt"), md5_hex(b"ACGT"));
  }

  #[test]
  fn hasher_matches_one_shot() {
    let seq = b"ACGTNNNNACGTACGTAAAACCCCGGGGTTTT";
    let mut hasher = SequenceHasher::new();
    for chunk in seq.chunks(5) {
      hasher.update(chunk);
    }
    assert_eq!(hasher.finalize(), compute(seq));
  }

  #[test]
  fn format_checks() {
    assert!(is_md5_hex(EMPTY_MD5));
    assert!(!is_md5_hex("D41D8CD98F00B204E9800998ECF8427E"));
    assert!(!is_md5_hex("xyz"));
    assert!(is_ga4gh(EMPTY_GA4GH));
    assert!(is_ga4gh(&ga4gh_checksum(b"ACGT")));
    assert!(!is_ga4gh("SQ.short"));
    assert!(!is_ga4gh("XX.z4PhNX7vuL3xVChQ1m2AB9Yg5AULVxXc"));
  }
}
