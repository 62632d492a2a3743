//! # Spatial index
//!
//! Parses the binning index that accompanies a coordinate-sorted container and
//! turns a region query into a virtual offset to start scanning from.
//!
//! Each reference carries two structures:
//!
//! - a hierarchical bin table, where every bin lists the chunks of the file
//!   holding records assigned to it
//! - a linear index giving, per 16 KiB window, the smallest virtual offset of
//!   any record overlapping that window
//!
//! Candidate bins for a region are over-approximated by [`reg2bins`], and the
//! linear index prunes chunks that end before the region could begin.

mod bins;
mod index;

pub use bins::{bin_interval, reg2bin, reg2bins, METADATA_BIN, UNPLACED_BIN};
pub use index::{Bin, Chunk, Index, ReferenceIndex, ReferenceMetadata};

/// The signature at the start of every index file
pub const BAI_MAGIC: [u8; 4] = *b"BAI\x01";
