//! # bamseek
//!
//! Random-access reading and writing of BGZF-compressed alignment containers
//! (BAM) with their spatial indices (BAI).
//!
//! The crate is layered from the bottom up:
//!
//! - [`bgzf`]: the block codec and [`bgzf::VirtualOffset`] addressing
//! - [`bai`]: the binning and linear index used to find a seek candidate
//! - [`record`]: lazily decoded alignment records and their exact encoder
//! - [`bam`]: the container reader (sequential iteration and region jumps)
//!   and writer
//!
//! [`fasta`] adds indexed lookup into plain-text reference sequences.
//!
//! ## Example
//!
//! ```no_run
//! use bamseek::bam::Reader;
//!
//! let mut reader = Reader::from_path("sample.bam")?;
//! if let Some(record) = reader.jump("chr1", 10_000, Some(20_000))? {
//!     println!("{}", record.to_sam(reader.references())?);
//! }
//! # Ok::<(), bamseek::Error>(())
//! ```

pub mod bai;
pub mod bam;
pub mod bgzf;
mod error;
pub mod fasta;
pub mod record;

pub use error::{
    BlockError, Error, FastaError, HeaderError, IndexError, IntoBamError, RecordError, Result,
};
