use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use flate2::Compression;
use tracing::{trace, warn};

use super::block::{deflate_into, write_block};
use super::{
    BLOCK_FOOTER_SIZE, BLOCK_HEADER_SIZE, DEFAULT_COMPRESSION_LEVEL, EOF_MARKER, MAX_BLOCK_SIZE,
};
use crate::{error::BlockError, Result};

/// Builder for BGZF [`Writer`] instances
#[derive(Debug, Clone, Copy)]
pub struct WriterBuilder {
    level: u32,
}
impl Default for WriterBuilder {
    fn default() -> Self {
        Self {
            level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}
impl WriterBuilder {
    /// Sets the deflate compression level (clamped to 0..=9)
    #[must_use]
    pub fn level(mut self, level: u32) -> Self {
        self.level = level.min(9);
        self
    }

    #[must_use]
    pub fn build<W: Write>(self, inner: W) -> Writer<W> {
        Writer {
            inner,
            buf: Vec::with_capacity(MAX_BLOCK_SIZE * 2),
            zbuf: Vec::with_capacity(MAX_BLOCK_SIZE),
            level: Compression::new(self.level),
            bytes_written: 0,
            finished: false,
        }
    }
}

/// Block-compressing writer.
///
/// Writes are buffered and emitted as blocks of at most 64 KiB. The stream is
/// only complete once [`Writer::finish`] has appended the EOF marker block;
/// dropping the writer finishes it implicitly.
pub struct Writer<W: Write> {
    inner: W,

    /// Uncompressed bytes not yet emitted
    buf: Vec<u8>,

    /// Reusable compression buffer
    zbuf: Vec<u8>,

    level: Compression,

    /// Compressed bytes written to `inner` so far
    bytes_written: u64,

    finished: bool,
}

impl Writer<BufWriter<File>> {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> Writer<W> {
    pub fn new(inner: W) -> Self {
        WriterBuilder::default().build(inner)
    }

    #[must_use]
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Compressed offset at which the next block will begin
    #[must_use]
    pub fn compressed_position(&self) -> u64 {
        self.bytes_written
    }

    /// Emits one block from the front of the buffer.
    ///
    /// The candidate input starts at the full block size and is halved until
    /// its compressed form fits in a single block.
    fn flush_block(&mut self) -> Result<()> {
        let mut candidate = self.buf.len().min(MAX_BLOCK_SIZE);
        loop {
            deflate_into(&self.buf[..candidate], &mut self.zbuf, self.level)?;
            if BLOCK_HEADER_SIZE + self.zbuf.len() + BLOCK_FOOTER_SIZE <= MAX_BLOCK_SIZE {
                break;
            }
            if candidate <= 1 {
                return Err(BlockError::BlockTooLarge(candidate).into());
            }
            trace!(candidate, "compressed block too large, halving input");
            candidate /= 2;
        }

        let block_size = write_block(&mut self.inner, &self.buf[..candidate], &self.zbuf)?;
        self.bytes_written += block_size as u64;
        self.buf.drain(..candidate);
        Ok(())
    }

    /// Emits blocks until fewer than a full block of bytes remain buffered
    fn flush_full_blocks(&mut self) -> Result<()> {
        while self.buf.len() >= MAX_BLOCK_SIZE {
            self.flush_block()?;
        }
        Ok(())
    }

    /// Compresses all buffered data, appends the EOF marker, and flushes the inner writer.
    ///
    /// Calling this more than once has no further effect.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        while !self.buf.is_empty() {
            self.flush_block()?;
        }
        self.inner.write_all(&EOF_MARKER)?;
        self.bytes_written += EOF_MARKER.len() as u64;
        self.inner.flush()?;
        self.finished = true;
        Ok(())
    }
}

impl<W: Write> Write for Writer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.finished {
            return Err(io::Error::other("write to a finished BGZF stream"));
        }
        self.buf.extend_from_slice(buf);
        self.flush_full_blocks().map_err(io::Error::other)?;
        Ok(buf.len())
    }

    /// Compresses every buffered byte into blocks, without writing the EOF marker
    fn flush(&mut self) -> io::Result<()> {
        while !self.buf.is_empty() {
            self.flush_block().map_err(io::Error::other)?;
        }
        self.inner.flush()
    }
}

impl<W: Write> Drop for Writer<W> {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            warn!("failed to finish BGZF stream on drop: {e}");
        }
    }
}
