//! [`IndexedFasta`]: ranged sequence reads through a FAI index.

use std::{collections::HashSet, sync::Arc};

use bytes::Bytes;
use futures_util::{Stream, stream};
use genoref_core::{
  checksum::{SequenceChecksums, SequenceHasher},
  genome::Contig,
};

use crate::{ByteSource, Error, FaiEntry, FastaIndex, Result};

/// Bases hashed per read when deriving contig checksums.
const CHECKSUM_CHUNK_BASES: u64 = 1 << 20;

/// A FASTA file paired with its index.
///
/// Cloning is cheap; the index is shared.
#[derive(Debug, Clone)]
pub struct IndexedFasta {
  source:   ByteSource,
  index:    Arc<FastaIndex>,
  circular: Arc<HashSet<String>>,
}

impl IndexedFasta {
  pub fn new(source: ByteSource, index: FastaIndex) -> Self {
    Self { source, index: Arc::new(index), circular: Arc::default() }
  }

  /// Open the FASTA at `fasta_uri` and fetch and parse its index from
  /// `fai_uri`.
  pub async fn open(fasta_uri: &str, fai_uri: &str, client: &reqwest::Client) -> Result<Self> {
    let fai = ByteSource::open(fai_uri, client).await?;
    let text = fai.read_to_end().await?;
    let index = FastaIndex::parse(&String::from_utf8_lossy(&text))?;
    let source = ByteSource::open(fasta_uri, client).await?;
    tracing::debug!(fasta = %source.describe(), contigs = index.len(), "opened indexed FASTA");
    Ok(Self::new(source, index))
  }

  pub fn index(&self) -> &FastaIndex { &self.index }

  /// Flag contigs as circular. Reads against them are refused.
  pub fn with_circular<I, S>(mut self, names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let mut set = (*self.circular).clone();
    set.extend(names.into_iter().map(Into::into));
    self.circular = Arc::new(set);
    self
  }

  /// Validate `[start, end)` against `contig`; `None` for `end` means the end
  /// of the contig. Returns the index entry and the resolved end.
  pub fn resolve(&self, contig: &str, start: u64, end: Option<u64>) -> Result<(&FaiEntry, u64)> {
    let entry = self.index.get(contig).ok_or_else(|| Error::ContigNotFound(contig.to_owned()))?;
    if self.circular.contains(contig) {
      return Err(Error::CircularNotImplemented(contig.to_owned()));
    }

    let end = match end {
      Some(end) => end,
      None if start > entry.length => {
        return Err(Error::OutOfRange {
          contig: contig.to_owned(),
          start,
          end: entry.length,
          length: entry.length,
        });
      }
      None => entry.length,
    };
    if start > end {
      return Err(Error::InvalidRange { start, end });
    }
    if end > entry.length {
      return Err(Error::OutOfRange { contig: contig.to_owned(), start, end, length: entry.length });
    }
    Ok((entry, end))
  }

  /// Read bases `[start, end)` of `contig` with line terminators removed.
  pub async fn read(&self, contig: &str, start: u64, end: Option<u64>) -> Result<Vec<u8>> {
    let (entry, end) = self.resolve(contig, start, end)?;
    let bases = read_bases(&self.source, entry, start, end).await?;
    Ok(bases.to_vec())
  }

  /// Stream bases `[start, end)` of `contig` in pieces of at most
  /// `chunk_bases`. The range is validated before the stream is returned.
  pub fn stream(
    &self,
    contig: &str,
    start: u64,
    end: Option<u64>,
    chunk_bases: u64,
  ) -> Result<impl Stream<Item = Result<Bytes>> + Send + use<>> {
    let (entry, end) = self.resolve(contig, start, end)?;
    let entry = entry.clone();
    let source = self.source.clone();
    let chunk_bases = chunk_bases.max(1);

    Ok(stream::try_unfold(start, move |pos| {
      let entry = entry.clone();
      let source = source.clone();
      async move {
        if pos >= end {
          return Ok(None);
        }
        let next = (pos + chunk_bases).min(end);
        let bases = read_bases(&source, &entry, pos, next).await?;
        Ok(Some((bases, next)))
      }
    }))
  }

  /// Checksums of the complete sequence of `contig`, computed in bounded
  /// chunks.
  pub async fn checksums(&self, contig: &str) -> Result<SequenceChecksums> {
    let entry = self.index.get(contig).ok_or_else(|| Error::ContigNotFound(contig.to_owned()))?;

    let mut hasher = SequenceHasher::new();
    let mut pos = 0;
    while pos < entry.length {
      let next = (pos + CHECKSUM_CHUNK_BASES).min(entry.length);
      hasher.update(&read_bases(&self.source, entry, pos, next).await?);
      pos = next;
    }
    Ok(hasher.finalize())
  }

  /// Contig records for every index entry, in file order, with checksums
  /// computed from the sequence.
  pub async fn derive_contigs(&self) -> Result<Vec<Contig>> {
    let mut contigs = Vec::with_capacity(self.index.len());
    for entry in self.index.iter() {
      let sums = self.checksums(&entry.name).await?;
      tracing::debug!(contig = %entry.name, length = entry.length, md5 = %sums.md5, "derived contig");
      contigs.push(Contig {
        name:     entry.name.clone(),
        aliases:  vec![],
        md5:      sums.md5,
        ga4gh:    sums.ga4gh,
        length:   entry.length,
        circular: self.circular.contains(&entry.name),
      });
    }
    Ok(contigs)
  }
}

async fn read_bases(source: &ByteSource, entry: &FaiEntry, start: u64, end: u64) -> Result<Bytes> {
  let (from, to) = entry.byte_span(start, end);
  let raw = source.read_range(from, to).await?;
  let want = (end - start) as usize;

  let bases = if raw.iter().any(|b| matches!(b, b'\n' | b'\r')) {
    Bytes::from(raw.iter().copied().filter(|b| !matches!(b, b'\n' | b'\r')).collect::<Vec<_>>())
  } else {
    raw
  };

  if bases.len() != want {
    return Err(Error::Io(std::io::Error::new(
      std::io::ErrorKind::UnexpectedEof,
      format!("contig {}: expected {want} bases at {start}, read {}", entry.name, bases.len()),
    )));
  }
  Ok(bases)
}
