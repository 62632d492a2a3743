use std::io::{self, Read, Write};

use bytemuck::{Pod, Zeroable};
use flate2::{bufread::DeflateDecoder, write::DeflateEncoder, Compression};

use crate::{error::BlockError, Result};

use super::{BGZF_MAGIC, BLOCK_FOOTER_SIZE, BLOCK_HEADER_SIZE, EOF_MARKER, MAX_BLOCK_SIZE};

/// Gzip header length before the extra subfields
const GZIP_FIXED_SIZE: usize = 12;

/// The `BC` extra subfield identifier
const BC_SUBFIELD: [u8; 2] = *b"BC";

/// The gzip member header of a block, including its `BC` extra subfield.
///
/// This is stored identically in memory and on disk (all fields are bytes).
#[derive(Copy, Clone, Pod, Zeroable, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct BlockHeader {
    magic: [u8; 4],
    mtime: [u8; 4],
    xfl: u8,
    os: u8,
    xlen: [u8; 2],

    // `BC` subfield carrying the total block size minus one
    si: [u8; 2],
    slen: [u8; 2],
    bsize: [u8; 2],
}
impl BlockHeader {
    /// Builds the header for a block whose total on-disk size is `block_size`
    #[must_use]
    pub fn new(block_size: usize) -> Self {
        Self {
            magic: BGZF_MAGIC,
            mtime: [0; 4],
            xfl: 0,
            os: 0xff,
            xlen: 6u16.to_le_bytes(),
            si: BC_SUBFIELD,
            slen: 2u16.to_le_bytes(),
            bsize: ((block_size - 1) as u16).to_le_bytes(),
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        *bytemuck::from_bytes(bytes)
    }

    #[must_use]
    pub fn has_magic(&self) -> bool {
        self.magic == BGZF_MAGIC
    }

    /// Length of the gzip extra field
    #[must_use]
    pub fn xlen(&self) -> usize {
        u16::from_le_bytes(self.xlen) as usize
    }

    /// Total block size, if the extra field is the canonical lone `BC` subfield
    #[must_use]
    pub fn canonical_block_size(&self) -> Option<usize> {
        if self.xlen() == 6 && self.si == BC_SUBFIELD && u16::from_le_bytes(self.slen) == 2 {
            Some(u16::from_le_bytes(self.bsize) as usize + 1)
        } else {
            None
        }
    }
}

/// Scans the gzip extra field for the `BC` subfield and returns the total block size
pub(crate) fn find_block_size(extra: &[u8]) -> Option<usize> {
    let mut pos = 0;
    while pos + 4 <= extra.len() {
        let slen = u16::from_le_bytes([extra[pos + 2], extra[pos + 3]]) as usize;
        let data = pos + 4;
        if extra[pos..pos + 2] == BC_SUBFIELD && slen == 2 && data + 2 <= extra.len() {
            return Some(u16::from_le_bytes([extra[data], extra[data + 1]]) as usize + 1);
        }
        pos = data + slen;
    }
    None
}

/// Number of compressed payload bytes in a block of `block_size` bytes
pub(crate) fn payload_size(block_size: usize, xlen: usize) -> Option<usize> {
    block_size.checked_sub(GZIP_FIXED_SIZE + xlen + BLOCK_FOOTER_SIZE)
}

/// Inflates a block body (compressed payload followed by the CRC32/ISIZE trailer).
///
/// The decompressed payload is validated against both trailer fields.
pub(crate) fn inflate_into(body: &[u8], dst: &mut Vec<u8>, offset: u64) -> Result<()> {
    let malformed = |reason: String| BlockError::MalformedBlock { offset, reason };

    let Some(split) = body.len().checked_sub(BLOCK_FOOTER_SIZE) else {
        return Err(malformed(format!("block body of {} bytes has no trailer", body.len())).into());
    };
    let (cdata, trailer) = body.split_at(split);
    let crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let isize = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]) as usize;
    if isize > MAX_BLOCK_SIZE {
        return Err(malformed(format!("declared payload size {isize} exceeds block limit")).into());
    }

    dst.clear();
    dst.reserve(isize);
    DeflateDecoder::new(cdata)
        .read_to_end(dst)
        .map_err(|e| malformed(format!("inflate failed: {e}")))?;

    if dst.len() != isize {
        return Err(malformed(format!(
            "decompressed {} bytes but the block declares {isize}",
            dst.len()
        ))
        .into());
    }
    let observed = crc32fast::hash(dst);
    if observed != crc {
        return Err(malformed(format!(
            "CRC32 mismatch: stored {crc:#010x}, computed {observed:#010x}"
        ))
        .into());
    }
    Ok(())
}

/// Deflates `src` into `zbuf` without any gzip or zlib framing
pub(crate) fn deflate_into(src: &[u8], zbuf: &mut Vec<u8>, level: Compression) -> io::Result<()> {
    zbuf.clear();
    let mut encoder = DeflateEncoder::new(zbuf, level);
    encoder.write_all(src)?;
    encoder.finish()?;
    Ok(())
}

/// Writes one complete block for `src`, whose compressed form is already in `zbuf`
pub(crate) fn write_block<W: Write>(writer: &mut W, src: &[u8], zbuf: &[u8]) -> io::Result<usize> {
    let block_size = BLOCK_HEADER_SIZE + zbuf.len() + BLOCK_FOOTER_SIZE;
    let header = BlockHeader::new(block_size);
    writer.write_all(header.as_bytes())?;
    writer.write_all(zbuf)?;
    writer.write_all(&crc32fast::hash(src).to_le_bytes())?;
    writer.write_all(&(src.len() as u32).to_le_bytes())?;
    Ok(block_size)
}

/// Checks whether a header and body form the canonical end-of-file marker
pub(crate) fn is_eof_marker(header: &[u8], body: &[u8]) -> bool {
    header == &EOF_MARKER[..BLOCK_HEADER_SIZE] && body == &EOF_MARKER[BLOCK_HEADER_SIZE..]
}
