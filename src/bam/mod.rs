//! # Alignment container
//!
//! A container is a BGZF stream holding a header followed by length-prefixed
//! alignment records:
//!
//! ```text
//! ┌────────┬────────┬──────┬────────┬────────────────────┬──────────┬─────┐
//! │ BAM\1  │ l_text │ text │ n_ref  │ n_ref × (name,len) │ records  │ EOF │
//! └────────┴────────┴──────┴────────┴────────────────────┴──────────┴─────┘
//! ```
//!
//! [`Reader`] iterates records in file order and, given a `.bai` index,
//! jumps to the first record overlapping a region. The jump seeks to the
//! index candidate and then scans forward, since bins overlap and the linear
//! index only bounds where relevant records start.
//!
//! [`Writer`] produces the same layout from a [`Header`] and finished records.

mod header;
mod reader;
mod writer;

pub use header::{Header, HeaderRecord, Reference, SamHeader};
pub use reader::{Locus, Query, Reader, ReaderBuilder, Records};
pub use writer::Writer;

/// Container signature
pub const BAM_MAGIC: [u8; 4] = *b"BAM\x01";
