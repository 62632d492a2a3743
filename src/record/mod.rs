//! # Alignment records
//!
//! A record is stored as a little-endian length prefix followed by a payload:
//!
//! ```text
//! ┌───────────────┬──────┬───────┬──────────┬─────────┬─────┐
//! │ Fixed header  │ Name │ CIGAR │ Sequence │ Quality │ Aux │
//! │   32 bytes    │ NUL  │ 4 × n │ 4-bit    │ l_seq   │ ... │
//! └───────────────┴──────┴───────┴──────────┴─────────┴─────┘
//! ```
//!
//! [`Record`] frames the payload up front and decodes the variable-length
//! sections in order, on first access. [`RecordBuilder`] produces the exact
//! binary form from owned or borrowed fields.

mod alignment;
mod builder;
mod cigar;
pub mod sequence;
mod tags;

pub use alignment::{DecodeStage, FixedHeader, Indel, Record, FIXED_HEADER_SIZE, MISSING_QUALITY};
pub use builder::RecordBuilder;
pub use cigar::{Cigar, Kind, Op, MAX_OP_LEN};
pub use tags::{fixed_width, Array, AuxField, Value};

/// Bit flags of the `flag` field
pub mod flags {
    pub const PAIRED: u16 = 0x1;
    pub const PROPER_PAIR: u16 = 0x2;
    pub const UNMAPPED: u16 = 0x4;
    pub const MATE_UNMAPPED: u16 = 0x8;
    pub const REVERSE: u16 = 0x10;
    pub const MATE_REVERSE: u16 = 0x20;
    pub const FIRST_IN_PAIR: u16 = 0x40;
    pub const SECOND_IN_PAIR: u16 = 0x80;
    pub const SECONDARY: u16 = 0x100;
    pub const QC_FAIL: u16 = 0x200;
    pub const DUPLICATE: u16 = 0x400;
    pub const SUPPLEMENTARY: u16 = 0x800;
}
