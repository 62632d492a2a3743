use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use tracing::{debug, warn};

use super::block::{find_block_size, inflate_into, is_eof_marker, payload_size, BlockHeader};
use super::{VirtualOffset, BLOCK_HEADER_SIZE, MAX_BLOCK_SIZE};
use crate::{error::BlockError, Result};

/// Sequential reader over a BGZF stream.
///
/// Blocks are inflated one at a time into an internal buffer. When the
/// underlying stream is seekable the reader can jump to any [`VirtualOffset`].
pub struct Reader<R> {
    inner: R,

    /// Inflated payload of the current block
    data: Vec<u8>,
    /// Read cursor within `data`
    pos: usize,

    /// Compressed offset of the current block
    block_offset: u64,
    /// Compressed offset of the next block to be read
    next_block_offset: u64,

    /// Reusable buffer for the compressed block body
    cdata: Vec<u8>,

    /// Whether the most recently read block was the EOF marker
    at_eof_marker: bool,
}

impl Reader<BufReader<File>> {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: Read> Reader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            data: Vec::with_capacity(MAX_BLOCK_SIZE),
            pos: 0,
            block_offset: 0,
            next_block_offset: 0,
            cdata: Vec::with_capacity(MAX_BLOCK_SIZE),
            at_eof_marker: false,
        }
    }

    #[must_use]
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Returns the virtual offset of the next block start.
    ///
    /// This is block granular: bytes still buffered from the current block
    /// are not reflected. Use [`Reader::virtual_position`] for the exact offset.
    #[must_use]
    pub fn tell(&self) -> VirtualOffset {
        VirtualOffset::new(self.next_block_offset, 0)
    }

    /// Returns the exact virtual offset of the next unread byte
    #[must_use]
    pub fn virtual_position(&self) -> VirtualOffset {
        if self.pos < self.data.len() {
            VirtualOffset::new(self.block_offset, self.pos as u16)
        } else {
            VirtualOffset::new(self.next_block_offset, 0)
        }
    }

    /// Reads and inflates the next block into the internal buffer.
    ///
    /// Returns `Ok(false)` once the stream ends cleanly after the EOF marker.
    pub fn read_block(&mut self) -> Result<bool> {
        let offset = self.next_block_offset;
        let mut header_buf = [0u8; BLOCK_HEADER_SIZE];
        let n = read_up_to(&mut self.inner, &mut header_buf)?;

        if n == 0 {
            if self.at_eof_marker {
                return Ok(false);
            }
            warn!(offset, "BGZF stream ended without an EOF marker block");
            return Err(BlockError::TruncatedStream(offset).into());
        }
        if n >= 4 && !BlockHeader::from_bytes(&header_buf).has_magic() {
            return Err(BlockError::InvalidMagic(offset).into());
        }
        if n < BLOCK_HEADER_SIZE {
            return Err(BlockError::TruncatedStream(offset).into());
        }

        let header = BlockHeader::from_bytes(&header_buf);
        let xlen = header.xlen();
        let block_size = match header.canonical_block_size() {
            Some(size) => size,
            None => self.read_extended_block_size(&header_buf, xlen, offset)?,
        };
        let Some(payload) = payload_size(block_size, xlen) else {
            return Err(BlockError::MalformedBlock {
                offset,
                reason: format!("block size {block_size} is smaller than its framing"),
            }
            .into());
        };

        // payload followed by the CRC32/ISIZE trailer
        let body_len = payload + super::BLOCK_FOOTER_SIZE;
        self.cdata.resize(body_len, 0);
        self.inner.read_exact(&mut self.cdata).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                BlockError::TruncatedStream(offset).into()
            } else {
                crate::Error::from(e)
            }
        })?;

        inflate_into(&self.cdata, &mut self.data, offset)?;
        self.at_eof_marker = is_eof_marker(&header_buf, &self.cdata);
        self.pos = 0;
        self.block_offset = offset;
        self.next_block_offset = offset + block_size as u64;
        Ok(true)
    }

    /// Handles headers whose extra field is not the lone `BC` subfield
    fn read_extended_block_size(
        &mut self,
        header_buf: &[u8; BLOCK_HEADER_SIZE],
        xlen: usize,
        offset: u64,
    ) -> Result<usize> {
        // the fixed 18 byte read already consumed six bytes of the extra field
        let Some(remaining) = xlen.checked_sub(6) else {
            return Err(BlockError::MalformedBlock {
                offset,
                reason: format!("extra field length {xlen} is too short for a BC subfield"),
            }
            .into());
        };
        let mut extra = header_buf[12..].to_vec();
        extra.resize(xlen, 0);
        self.inner
            .read_exact(&mut extra[6..6 + remaining])
            .map_err(|_| BlockError::TruncatedStream(offset))?;
        find_block_size(&extra).ok_or_else(|| {
            BlockError::MalformedBlock {
                offset,
                reason: "missing BC subfield".to_string(),
            }
            .into()
        })
    }

    /// Returns the buffered bytes of the current block, reading blocks as needed.
    ///
    /// An empty slice means the stream ended cleanly.
    pub fn fill(&mut self) -> Result<&[u8]> {
        while self.pos >= self.data.len() {
            if !self.read_block()? {
                return Ok(&[]);
            }
        }
        Ok(&self.data[self.pos..])
    }

    /// Marks `amt` buffered bytes as consumed
    pub fn consume_bytes(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.data.len());
    }

    /// Reads into `buf` across block boundaries.
    ///
    /// Returns fewer bytes than requested only when the stream ended cleanly.
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let available = self.fill()?;
            if available.is_empty() {
                break;
            }
            let n = available.len().min(buf.len() - filled);
            buf[filled..filled + n].copy_from_slice(&available[..n]);
            self.consume_bytes(n);
            filled += n;
        }
        Ok(filled)
    }

    /// Fills `buf` completely, or returns `Ok(false)` if the stream ended before any byte.
    ///
    /// A stream ending part-way through `buf` is a truncation error.
    pub fn read_exact_or_eof(&mut self, buf: &mut [u8]) -> Result<bool> {
        match self.read_into(buf)? {
            0 if !buf.is_empty() => Ok(false),
            n if n < buf.len() => Err(BlockError::TruncatedStream(self.next_block_offset).into()),
            _ => Ok(true),
        }
    }

    /// Fills `buf` completely, treating a clean end of stream as truncation
    pub fn read_exact_checked(&mut self, buf: &mut [u8]) -> Result<()> {
        if self.read_exact_or_eof(buf)? {
            Ok(())
        } else {
            Err(BlockError::TruncatedStream(self.next_block_offset).into())
        }
    }

    /// Reads exactly `len` bytes into a new buffer that grows only as data arrives
    pub fn read_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        while buf.len() < len {
            let available = self.fill()?;
            if available.is_empty() {
                return Err(BlockError::TruncatedStream(self.next_block_offset).into());
            }
            let n = available.len().min(len - buf.len());
            buf.extend_from_slice(&available[..n]);
            self.consume_bytes(n);
        }
        Ok(buf)
    }
}

impl<R: Read + Seek> Reader<R> {
    /// Positions the reader at a virtual offset.
    ///
    /// The block starting at the compressed offset is inflated and the
    /// intra-block number of leading bytes is discarded.
    pub fn seek(&mut self, offset: VirtualOffset) -> Result<()> {
        debug!(%offset, "seeking BGZF stream");
        self.inner.seek(SeekFrom::Start(offset.compressed()))?;
        self.next_block_offset = offset.compressed();
        self.data.clear();
        self.pos = 0;
        // a seek landing exactly on the end of the file reads as a clean end
        self.at_eof_marker = true;

        let intra = offset.uncompressed() as usize;
        if !self.read_block()? {
            return Ok(());
        }
        if intra > self.data.len() {
            return Err(BlockError::MalformedBlock {
                offset: offset.compressed(),
                reason: format!(
                    "intra-block offset {intra} exceeds block payload of {} bytes",
                    self.data.len()
                ),
            }
            .into());
        }
        self.pos = intra;
        Ok(())
    }
}

impl<R: Read> Read for Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill().map_err(io::Error::other)?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume_bytes(n);
        Ok(n)
    }
}

impl<R: Read> BufRead for Reader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.fill().map_err(io::Error::other)
    }

    fn consume(&mut self, amt: usize) {
        self.consume_bytes(amt);
    }
}

/// Reads until `buf` is full or the stream ends, returning the count read
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
