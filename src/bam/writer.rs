use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use tracing::debug;

use super::header::Header;
use crate::bgzf::{self, VirtualOffset};
use crate::record::Record;
use crate::Result;

/// Alignment container writer.
///
/// The header is written and flushed into its own blocks on construction,
/// so the first record always starts on a fresh block boundary.
pub struct Writer<W: Write> {
    inner: bgzf::Writer<W>,

    /// Virtual offset of the first record
    records_start: VirtualOffset,
}

impl Writer<BufWriter<File>> {
    pub fn from_path<P: AsRef<Path>>(path: P, header: &Header) -> Result<Self> {
        Self::from_bgzf(bgzf::Writer::from_path(path)?, header)
    }
}

impl<W: Write> Writer<W> {
    /// Writes the header to `inner` using the default compression level
    pub fn new(inner: W, header: &Header) -> Result<Self> {
        Self::from_bgzf(bgzf::Writer::new(inner), header)
    }

    /// Writes the header through a configured block writer
    pub fn from_bgzf(mut inner: bgzf::Writer<W>, header: &Header) -> Result<Self> {
        header.write_to(&mut inner)?;
        inner.flush()?;
        let records_start = VirtualOffset::new(inner.compressed_position(), 0);
        debug!(%records_start, "wrote container header");
        Ok(Self {
            inner,
            records_start,
        })
    }

    #[must_use]
    pub fn get_ref(&self) -> &W {
        self.inner.get_ref()
    }

    /// Virtual offset at which the first record begins
    #[must_use]
    pub fn records_start(&self) -> VirtualOffset {
        self.records_start
    }

    /// Appends one record with its length prefix
    pub fn write(&mut self, record: &Record) -> Result<()> {
        self.inner
            .write_u32::<LittleEndian>(record.as_bytes().len() as u32)?;
        self.inner.write_all(record.as_bytes())?;
        Ok(())
    }

    /// Compresses buffered records into blocks
    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Flushes remaining records and appends the end-of-file marker
    pub fn finish(&mut self) -> Result<()> {
        self.inner.finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::bam::{Reader, Reference};
    use crate::bgzf::{WriterBuilder, EOF_MARKER};
    use crate::record::RecordBuilder;

    fn header() -> Header {
        Header::new("@HD\tVN:1.6", vec![Reference::new("chr1", 10_000)])
    }

    #[test]
    fn test_header_occupies_own_blocks() -> Result<()> {
        let mut out = Vec::new();
        let start = {
            let mut writer = Writer::new(&mut out, &header())?;
            let record = RecordBuilder::default()
                .reference_id(0)
                .position(5)
                .name(b"r")
                .build()?;
            writer.write(&record)?;
            writer.finish()?;
            writer.records_start()
        };
        assert_eq!(start.uncompressed(), 0);
        assert!(start.compressed() > 0);

        let mut reader = Reader::new(Cursor::new(out))?;
        assert_eq!(reader.virtual_position(), start);
        let record = reader.next_record()?.expect("one record");
        assert_eq!(record.position(), 5);
        Ok(())
    }

    #[test]
    fn test_header_only_container() -> Result<()> {
        let mut out = Vec::new();
        {
            let mut writer = Writer::new(&mut out, &header())?;
            writer.finish()?;
        }
        assert!(out.ends_with(&EOF_MARKER));

        let mut reader = Reader::new(Cursor::new(out))?;
        assert_eq!(reader.references()[0].name(), "chr1");
        assert!(reader.next_record()?.is_none());
        Ok(())
    }

    #[test]
    fn test_finish_is_idempotent() -> Result<()> {
        let mut out = Vec::new();
        {
            let inner = WriterBuilder::default().level(1).build(&mut out);
            let mut writer = Writer::from_bgzf(inner, &header())?;
            writer.flush()?;
            writer.finish()?;
            writer.finish()?;
        }
        assert_eq!(
            out.windows(EOF_MARKER.len())
                .filter(|w| *w == EOF_MARKER)
                .count(),
            1
        );
        Ok(())
    }
}
