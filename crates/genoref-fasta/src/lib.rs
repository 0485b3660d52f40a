//! Random-access reads of FASTA sequence through a FAI index.
//!
//! Sequence files are addressed by URI. Local paths, `file://`, `http(s)://`
//! and `drs://` are all opened through the same [`ByteSource`], which only
//! ever reads the byte window it is asked for.

mod fai;
mod reader;
mod source;

pub mod error;

pub use error::{Error, Result};
pub use fai::{FaiEntry, FastaIndex};
pub use reader::IndexedFasta;
pub use source::ByteSource;
