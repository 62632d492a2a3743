use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use super::header::{Header, Reference, SamHeader};
use crate::bai::Index;
use crate::bgzf::{self, VirtualOffset};
use crate::record::Record;
use crate::{error::IndexError, Result};

/// A reference addressed by name or by its position in the header
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Locus<'a> {
    Name(&'a str),
    Id(usize),
}
impl<'a> From<&'a str> for Locus<'a> {
    fn from(name: &'a str) -> Self {
        Self::Name(name)
    }
}
impl From<usize> for Locus<'_> {
    fn from(id: usize) -> Self {
        Self::Id(id)
    }
}

/// A resolved query region: reference id and half-open 0-based interval
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Region {
    ref_id: usize,
    start: u32,
    end: u32,
}

/// Builder for file-backed [`Reader`] instances
#[derive(Debug, Clone)]
pub struct ReaderBuilder {
    index_path: Option<PathBuf>,
    load_index: bool,
}
impl Default for ReaderBuilder {
    fn default() -> Self {
        Self {
            index_path: None,
            load_index: true,
        }
    }
}
impl ReaderBuilder {
    /// Reads the index from this path instead of `<file>.bai`
    #[must_use]
    pub fn index_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.index_path = Some(path.into());
        self
    }

    /// Skips index loading entirely; region jumps will fail with a missing index
    #[must_use]
    pub fn load_index(mut self, load_index: bool) -> Self {
        self.load_index = load_index;
        self
    }

    pub fn open<P: AsRef<Path>>(self, path: P) -> Result<Reader<BufReader<File>>> {
        let path = path.as_ref();
        let mut reader = Reader::new(BufReader::new(File::open(path)?))?;
        if self.load_index {
            let index_path = self.index_path.unwrap_or_else(|| default_index_path(path));
            reader.index = load_index(&index_path)?.map(Arc::new);
        }
        Ok(reader)
    }
}

/// `<path>.bai`, appended to the full file name
fn default_index_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bai");
    PathBuf::from(name)
}

/// Loads an index file.
///
/// A missing file yields no index. A malformed one is reported and replaced
/// by an empty index, so region queries find nothing instead of failing.
fn load_index(path: &Path) -> Result<Option<Index>> {
    if !path.exists() {
        debug!(path = %path.display(), "no index file found");
        return Ok(None);
    }
    match Index::from_path(path) {
        Ok(index) => Ok(Some(index)),
        Err(e) if e.is_malformed_index() => {
            warn!(path = %path.display(), "ignoring malformed index: {e}");
            Ok(Some(Index::empty()))
        }
        Err(e) => Err(e),
    }
}

/// Alignment container reader.
///
/// Records are read sequentially with [`Reader::next_record`]. With an index
/// attached the reader can also jump to the first record overlapping a region.
pub struct Reader<R> {
    inner: bgzf::Reader<R>,
    header: Header,
    index: Option<Arc<Index>>,

    /// Reusable buffer for the record length prefix
    lbuf: [u8; 4],
}

impl Reader<BufReader<File>> {
    /// Opens a container and its `<path>.bai` index if one exists
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        ReaderBuilder::default().open(path)
    }
}

impl<R: Read> Reader<R> {
    /// Reads the container header; the reader is left at the first record
    pub fn new(inner: R) -> Result<Self> {
        let mut inner = bgzf::Reader::new(inner);
        let header = Header::read_from(&mut inner)?;
        debug!(
            references = header.references().len(),
            text_len = header.text().len(),
            "read container header"
        );
        Ok(Self {
            inner,
            header,
            index: None,
            lbuf: [0; 4],
        })
    }

    /// Attaches an index
    pub fn set_index(&mut self, index: impl Into<Arc<Index>>) {
        self.index = Some(index.into());
    }

    #[must_use]
    pub fn with_index(mut self, index: impl Into<Arc<Index>>) -> Self {
        self.set_index(index);
        self
    }

    #[must_use]
    pub fn index(&self) -> Option<&Index> {
        self.index.as_deref()
    }

    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Parses the header text into its ordered record model
    pub fn sam_header(&self) -> Result<SamHeader> {
        self.header.sam_header()
    }

    #[must_use]
    pub fn references(&self) -> &[Reference] {
        self.header.references()
    }

    /// Position of a reference name in the header list
    #[must_use]
    pub fn reference_id(&self, name: &str) -> Option<usize> {
        self.references().iter().position(|r| r.name() == name)
    }

    /// Identifiers of the read groups declared in the header
    pub fn read_groups(&self) -> Result<Vec<String>> {
        Ok(self
            .sam_header()?
            .read_groups()
            .into_iter()
            .map(String::from)
            .collect())
    }

    /// Exact virtual offset of the next unread record
    #[must_use]
    pub fn virtual_position(&self) -> VirtualOffset {
        self.inner.virtual_position()
    }

    /// Reads the next record, or `None` at the end of the stream.
    ///
    /// A record is read in full before any field is decoded, so a decode
    /// error on one record leaves the reader at the next.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        if !self.inner.read_exact_or_eof(&mut self.lbuf)? {
            return Ok(None);
        }
        let len = u32::from_le_bytes(self.lbuf) as usize;
        let data = self.inner.read_vec(len)?;
        Record::from_bytes(data).map(Some)
    }

    /// Iterates over the remaining records
    pub fn records(&mut self) -> Records<'_, R> {
        Records { reader: self }
    }

    fn resolve(&self, locus: Locus<'_>) -> Option<usize> {
        match locus {
            Locus::Name(name) => self.reference_id(name),
            Locus::Id(id) => (id < self.references().len()).then_some(id),
        }
    }

    /// Resolves a locus and clamps the interval to the reference.
    ///
    /// An absent end, an end not past the start, or an end beyond the
    /// reference all become the reference length.
    fn region(&self, locus: Locus<'_>, start: u32, end: Option<u32>) -> Option<Region> {
        let ref_id = self.resolve(locus)?;
        let ref_len = self.references()[ref_id].len();
        let end = match end {
            Some(end) if end > start && end <= ref_len => end,
            _ => ref_len,
        };
        Some(Region { ref_id, start, end })
    }
}

impl<R: Read + Seek> Reader<R> {
    /// Moves the cursor to an exact virtual offset
    pub fn seek(&mut self, offset: VirtualOffset) -> Result<()> {
        self.inner.seek(offset)
    }

    /// Seeks to the index candidate for a region and scans to its first record.
    ///
    /// Returns the record with the offset it starts at; the cursor is left
    /// after it. When the region holds nothing the cursor is left on the
    /// first record past it.
    fn scan_to(&mut self, region: Region) -> Result<Option<(VirtualOffset, Record)>> {
        let index = self.index.as_ref().ok_or(IndexError::MissingIndex)?;
        let Some(candidate) = index.seek_candidate(region.ref_id, region.start, region.end)
        else {
            debug!(?region, "index holds no data for region");
            return Ok(None);
        };
        self.inner.seek(candidate)?;

        let target = region.ref_id as i64;
        loop {
            let offset = self.inner.virtual_position();
            let Some(record) = self.next_record()? else {
                return Ok(None);
            };
            let ref_id = i64::from(record.reference_id());
            if ref_id < 0 || ref_id > target {
                self.inner.seek(offset)?;
                return Ok(None);
            }
            if ref_id < target || record.end_position()? <= i64::from(region.start) {
                continue;
            }
            if i64::from(record.position()) >= i64::from(region.end) {
                self.inner.seek(offset)?;
                return Ok(None);
            }
            return Ok(Some((offset, record)));
        }
    }

    /// Fetches the first record overlapping `[start, end)` on a reference.
    ///
    /// Returns `Ok(None)` when the reference is unknown or the region holds
    /// no records. Sequential reading continues after the returned record.
    ///
    /// # Errors
    ///
    /// Fails with [`IndexError::MissingIndex`] if no index is attached.
    pub fn jump<'a>(
        &mut self,
        locus: impl Into<Locus<'a>>,
        start: u32,
        end: Option<u32>,
    ) -> Result<Option<Record>> {
        if self.index.is_none() {
            return Err(IndexError::MissingIndex.into());
        }
        let Some(region) = self.region(locus.into(), start, end) else {
            return Ok(None);
        };
        Ok(self.scan_to(region)?.map(|(_, record)| record))
    }

    /// Positions the cursor on the first record overlapping `[start, end)`.
    ///
    /// The next call to [`Reader::next_record`] returns that record. Returns
    /// `false` when the region holds no records.
    pub fn seek_to<'a>(
        &mut self,
        locus: impl Into<Locus<'a>>,
        start: u32,
        end: Option<u32>,
    ) -> Result<bool> {
        if self.index.is_none() {
            return Err(IndexError::MissingIndex.into());
        }
        let Some(region) = self.region(locus.into(), start, end) else {
            return Ok(false);
        };
        match self.scan_to(region)? {
            Some((offset, _)) => {
                self.inner.seek(offset)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Iterates over every record overlapping `[start, end)` on a reference
    pub fn query<'a>(
        &mut self,
        locus: impl Into<Locus<'a>>,
        start: u32,
        end: Option<u32>,
    ) -> Result<Query<'_, R>> {
        if self.index.is_none() {
            return Err(IndexError::MissingIndex.into());
        }
        let region = self.region(locus.into(), start, end);
        let first = match region {
            Some(region) => self.scan_to(region)?.map(|(_, record)| record),
            None => None,
        };
        Ok(Query {
            done: first.is_none(),
            reader: self,
            region: region.unwrap_or(Region {
                ref_id: 0,
                start,
                end: start,
            }),
            first,
        })
    }
}

/// Iterator over the remaining records of a [`Reader`]
pub struct Records<'r, R> {
    reader: &'r mut Reader<R>,
}
impl<R: Read> Iterator for Records<'_, R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next_record().transpose()
    }
}

/// Iterator over the records overlapping a region, built by [`Reader::query`]
pub struct Query<'r, R> {
    reader: &'r mut Reader<R>,
    region: Region,
    first: Option<Record>,
    done: bool,
}
impl<R: Read> Query<'_, R> {
    fn advance(&mut self) -> Result<Option<Record>> {
        if let Some(record) = self.first.take() {
            return Ok(Some(record));
        }
        let target = self.region.ref_id as i64;
        while let Some(record) = self.reader.next_record()? {
            if i64::from(record.reference_id()) != target
                || i64::from(record.position()) >= i64::from(self.region.end)
            {
                return Ok(None);
            }
            if record.end_position()? > i64::from(self.region.start) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}
impl<R: Read> Iterator for Query<'_, R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let next = self.advance();
        if !matches!(next, Ok(Some(_))) {
            self.done = true;
        }
        next.transpose()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::bam::{Header, Writer};
    use crate::record::RecordBuilder;

    fn container(records: &[Record]) -> Result<Vec<u8>> {
        let header = Header::new(
            "@HD\tVN:1.6\n@RG\tID:a\n@RG\tID:b",
            vec![Reference::new("chr1", 1_000), Reference::new("chr2", 500)],
        );
        let mut out = Vec::new();
        {
            let mut writer = Writer::new(&mut out, &header)?;
            for record in records {
                writer.write(record)?;
            }
            writer.finish()?;
        }
        Ok(out)
    }

    #[test]
    fn test_sequential_read() -> Result<()> {
        let records = vec![
            RecordBuilder::default()
                .reference_id(0)
                .position(10)
                .name(b"r1")
                .cigar("5M".parse()?)
                .sequence(b"ACGTA")
                .build()?,
            RecordBuilder::default().name(b"r2").build()?,
        ];
        let data = container(&records)?;

        let mut reader = Reader::new(Cursor::new(data))?;
        assert_eq!(reader.references().len(), 2);
        assert_eq!(reader.reference_id("chr2"), Some(1));
        assert_eq!(reader.reference_id("chrX"), None);
        assert_eq!(reader.read_groups()?, vec!["a", "b"]);

        let read: Vec<Record> = reader.records().collect::<Result<_>>()?;
        assert_eq!(read, records);
        assert!(reader.next_record()?.is_none());
        Ok(())
    }

    #[test]
    fn test_oversized_record_length_is_truncation() -> Result<()> {
        let header = Header::new("", vec![Reference::new("chr1", 1_000)]);
        let mut data = Vec::new();
        {
            let mut writer = crate::bgzf::Writer::new(&mut data);
            header.write_to(&mut writer)?;
            std::io::Write::write_all(&mut writer, &u32::MAX.to_le_bytes())?;
            std::io::Write::write_all(&mut writer, b"short")?;
            writer.finish()?;
        }

        let mut reader = Reader::new(Cursor::new(data))?;
        let err = reader.next_record().unwrap_err();
        assert!(err.is_truncation());
        Ok(())
    }

    #[test]
    fn test_jump_requires_index() -> Result<()> {
        let data = container(&[])?;
        let mut reader = Reader::new(Cursor::new(data))?;
        assert!(matches!(
            reader.jump("chr1", 0, None),
            Err(crate::Error::IndexError(IndexError::MissingIndex))
        ));
        assert!(matches!(
            reader.seek_to(0usize, 0, None),
            Err(crate::Error::IndexError(IndexError::MissingIndex))
        ));
        Ok(())
    }

    #[test]
    fn test_empty_index_finds_nothing() -> Result<()> {
        let record = RecordBuilder::default()
            .reference_id(0)
            .position(10)
            .cigar("5M".parse()?)
            .build()?;
        let data = container(&[record])?;
        let mut reader = Reader::new(Cursor::new(data))?.with_index(Index::empty());
        assert!(reader.jump("chr1", 0, None)?.is_none());
        assert!(!reader.seek_to("chr1", 0, None)?);
        assert!(reader.jump("missing", 0, None)?.is_none());
        assert_eq!(reader.query(7usize, 0, None)?.count(), 0);
        Ok(())
    }

    #[test]
    fn test_region_clamping() -> Result<()> {
        let data = container(&[])?;
        let reader = Reader::new(Cursor::new(data))?;
        let clamp = |end| reader.region(Locus::Id(1), 100, end).map(|r| r.end);
        assert_eq!(clamp(None), Some(500));
        assert_eq!(clamp(Some(50)), Some(500));
        assert_eq!(clamp(Some(100)), Some(500));
        assert_eq!(clamp(Some(10_000)), Some(500));
        assert_eq!(clamp(Some(200)), Some(200));
        assert_eq!(reader.region(Locus::Id(2), 0, None), None);
        Ok(())
    }

    #[test]
    fn test_default_index_path() {
        assert_eq!(
            default_index_path(Path::new("/data/sample.bam")),
            PathBuf::from("/data/sample.bam.bai")
        );
    }
}
