//! # BGZF block compression
//!
//! A BGZF stream is a series of independent gzip members ("blocks"), each
//! holding at most 64 KiB of uncompressed payload. Because every block can be
//! inflated on its own, a position in the uncompressed stream can be addressed
//! with a [`VirtualOffset`]: the compressed offset of the block start combined
//! with a byte offset inside the inflated payload.
//!
//! ```text
//! ┌──────────────┬─────────────────────┬───────┬───────┐
//! │ Block Header │ Deflate payload     │ CRC32 │ ISIZE │
//! │   18 bytes   │ BSIZE - 25 bytes    │ 4     │ 4     │
//! └──────────────┴─────────────────────┴───────┴───────┘
//! ```
//!
//! A well-formed stream always ends with the 28-byte [`EOF_MARKER`] block.
//! A stream that ends without it is reported as truncated.

mod block;
mod reader;
mod virtual_offset;
mod writer;

pub use block::BlockHeader;
pub use reader::Reader;
pub use virtual_offset::VirtualOffset;
pub use writer::{Writer, WriterBuilder};

/// The gzip signature shared by every block (ID1, ID2, CM = deflate, FLG = FEXTRA).
pub const BGZF_MAGIC: [u8; 4] = [0x1f, 0x8b, 0x08, 0x04];

/// Size of the block header as written by this crate.
pub const BLOCK_HEADER_SIZE: usize = 18;

/// Size of the CRC32 + ISIZE trailer.
pub const BLOCK_FOOTER_SIZE: usize = 8;

/// Upper bound on both the on-disk size and the uncompressed payload of a block.
pub const MAX_BLOCK_SIZE: usize = 1 << 16;

/// The default deflate compression level.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// The canonical empty block that terminates every BGZF stream.
pub const EOF_MARKER: [u8; 28] = [
    0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, 0x42, 0x43, 0x02, 0x00,
    0x1b, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];
