//! # Indexed reference lookup
//!
//! Random access into plain-text FASTA files through a `.fai` table. Each
//! entry records where a sequence's bases start in the file and how its lines
//! are wrapped, so any base maps to a byte offset:
//!
//! ```text
//! offset + (pos / line_bases) * line_width + pos % line_bases
//! ```
//!
//! When no `.fai` file exists the same table is built by scanning the FASTA.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{error::FastaError, Result};

/// Symbol used for bases past the end of a sequence
pub const UNKNOWN_BASE: u8 = b'N';

/// One row of a `.fai` table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FaiEntry {
    /// Sequence name up to the first whitespace
    pub name: String,
    /// Number of bases
    pub len: u64,
    /// Byte offset of the first base
    pub offset: u64,
    /// Bases per full line
    pub line_bases: u64,
    /// Bytes per full line, including the line terminator
    pub line_width: u64,
}
impl FaiEntry {
    /// Byte offset of a 0-based base position
    fn byte_offset(&self, pos: u64) -> u64 {
        if self.line_bases == 0 {
            return self.offset;
        }
        self.offset + (pos / self.line_bases) * self.line_width + pos % self.line_bases
    }

    fn parse(line: &str) -> Result<Self> {
        let malformed = || FastaError::MalformedIndexLine(line.to_string());
        let fields: Vec<&str> = line.split('\t').collect();
        let [name, len, offset, line_bases, line_width] = fields[..] else {
            return Err(malformed().into());
        };
        let number = |s: &str| s.trim().parse::<u64>().map_err(|_| malformed());
        Ok(Self {
            name: name.split_whitespace().next().unwrap_or_default().to_string(),
            len: number(len)?,
            offset: number(offset)?,
            line_bases: number(line_bases)?,
            line_width: number(line_width)?,
        })
    }
}

/// Reads a `.fai` table
pub fn read_fai<R: BufRead>(reader: R) -> Result<Vec<FaiEntry>> {
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            continue;
        }
        entries.push(FaiEntry::parse(line)?);
    }
    Ok(entries)
}

/// Builds the `.fai` table by scanning a FASTA stream.
///
/// Blank lines end the current sequence. Every line of a sequence but the
/// last must share the same width.
pub fn scan_fasta<R: BufRead>(mut reader: R) -> Result<Vec<FaiEntry>> {
    let mut entries: Vec<FaiEntry> = Vec::new();
    let mut current: Option<usize> = None;
    let mut short_line = false;
    let mut line = Vec::new();
    let mut position = 0u64;

    loop {
        line.clear();
        let width = reader.read_until(b'\n', &mut line)? as u64;
        if width == 0 {
            break;
        }
        let line_start = position;
        position += width;

        if line.first() == Some(&b'>') {
            let name = std::str::from_utf8(&line[1..])?
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string();
            entries.push(FaiEntry {
                name,
                len: 0,
                offset: position,
                line_bases: 0,
                line_width: 0,
            });
            current = Some(entries.len() - 1);
            short_line = false;
            continue;
        }

        let bases = line.trim_ascii().len() as u64;
        let Some(idx) = current else {
            if bases > 0 {
                return Err(FastaError::UnexpectedSequence(line_start).into());
            }
            continue;
        };
        if bases == 0 {
            current = None;
            continue;
        }

        let entry = &mut entries[idx];
        if short_line {
            return Err(FastaError::InconsistentLineWidth(entry.name.clone()).into());
        }
        if entry.line_bases == 0 {
            entry.line_bases = bases;
            entry.line_width = width;
        } else if entry.line_bases != bases || entry.line_width != width {
            short_line = true;
        }
        entry.len += bases;
    }
    Ok(entries)
}

/// Random-access reader over a FASTA file
pub struct IndexedReader<R> {
    inner: R,
    entries: Vec<FaiEntry>,
}

impl IndexedReader<BufReader<File>> {
    /// Opens a FASTA file, reading `<path>.fai` if present and scanning otherwise
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut fai_path = path.as_os_str().to_owned();
        fai_path.push(".fai");
        Self::with_index_path(path, PathBuf::from(fai_path))
    }

    /// Opens a FASTA file with an explicit `.fai` location
    pub fn with_index_path<P: AsRef<Path>, Q: AsRef<Path>>(path: P, fai_path: Q) -> Result<Self> {
        let fai_path = fai_path.as_ref();
        let mut inner = BufReader::new(File::open(path.as_ref())?);
        let entries = if fai_path.exists() {
            read_fai(BufReader::new(File::open(fai_path)?))?
        } else {
            debug!(path = %path.as_ref().display(), "no .fai found, scanning sequences");
            let entries = scan_fasta(&mut inner)?;
            inner.seek(SeekFrom::Start(0))?;
            entries
        };
        Ok(Self::new(inner, entries))
    }
}

impl<R: Read + Seek> IndexedReader<R> {
    pub fn new(inner: R, entries: Vec<FaiEntry>) -> Self {
        Self { inner, entries }
    }

    #[must_use]
    pub fn entries(&self) -> &[FaiEntry] {
        &self.entries
    }

    /// Sequence names in file order
    pub fn sequence_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    #[must_use]
    pub fn sequence_len(&self, name: &str) -> Option<u64> {
        self.entry(name).map(|e| e.len)
    }

    fn entry(&self, name: &str) -> Option<&FaiEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Fetches `len` bases starting at 0-based `position`.
    ///
    /// Positions past the end of the sequence are filled with
    /// [`UNKNOWN_BASE`]. A start beyond the sequence end, or a request longer
    /// than the whole sequence, is an error.
    pub fn fetch(&mut self, name: &str, position: u64, len: u64) -> Result<Vec<u8>> {
        let entry = self
            .entry(name)
            .ok_or_else(|| FastaError::UnknownSequence(name.to_string()))?
            .clone();
        if position > entry.len {
            return Err(FastaError::OutOfRange {
                name: name.to_string(),
                position,
                length: entry.len,
            }
            .into());
        }

        if len > entry.len {
            return Err(FastaError::RequestTooLong {
                name: name.to_string(),
                requested: len,
                length: entry.len,
            }
            .into());
        }

        let end = position.saturating_add(len).min(entry.len);
        let mut bases = Vec::new();
        if end > position {
            let first = entry.byte_offset(position);
            let last = entry.byte_offset(end - 1);
            let span = last - first + 1;
            let mut raw = Vec::new();
            self.inner.seek(SeekFrom::Start(first))?;
            (&mut self.inner).take(span).read_to_end(&mut raw)?;
            if (raw.len() as u64) < span {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }
            bases.extend(raw.into_iter().filter(|b| !b.is_ascii_whitespace()));
        }
        bases.resize(len as usize, UNKNOWN_BASE);
        Ok(bases)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use super::*;

    const FASTA: &str = ">chr1 first chromosome\n\
                         ACGTACGTAC\n\
                         GGGGCCCCTT\n\
                         AAT\n\
                         >chr2\r\n\
                         TTTT\r\n\
                         CC\r\n";

    fn reader() -> Result<IndexedReader<Cursor<&'static [u8]>>> {
        let entries = scan_fasta(Cursor::new(FASTA.as_bytes()))?;
        Ok(IndexedReader::new(Cursor::new(FASTA.as_bytes()), entries))
    }

    #[test]
    fn test_scan_builds_table() -> Result<()> {
        let entries = scan_fasta(Cursor::new(FASTA.as_bytes()))?;
        assert_eq!(
            entries,
            vec![
                FaiEntry {
                    name: "chr1".to_string(),
                    len: 23,
                    offset: 23,
                    line_bases: 10,
                    line_width: 11,
                },
                FaiEntry {
                    name: "chr2".to_string(),
                    len: 6,
                    offset: 56,
                    line_bases: 4,
                    line_width: 6,
                },
            ]
        );
        Ok(())
    }

    #[test]
    fn test_fetch_across_lines() -> Result<()> {
        let mut reader = reader()?;
        assert_eq!(reader.fetch("chr1", 0, 4)?, b"ACGT");
        assert_eq!(reader.fetch("chr1", 8, 5)?, b"ACGGG");
        assert_eq!(reader.fetch("chr1", 18, 5)?, b"TTAAT");
        assert_eq!(reader.fetch("chr2", 2, 4)?, b"TTCC");
        Ok(())
    }

    #[test]
    fn test_fetch_pads_past_end() -> Result<()> {
        let mut reader = reader()?;
        assert_eq!(reader.fetch("chr2", 4, 5)?, b"CCNNN");
        assert_eq!(reader.fetch("chr2", 6, 2)?, b"NN");
        assert!(matches!(
            reader.fetch("chr2", 7, 1),
            Err(crate::Error::FastaError(FastaError::OutOfRange { position: 7, length: 6, .. }))
        ));
        assert!(matches!(
            reader.fetch("chr2", 0, u64::MAX),
            Err(crate::Error::FastaError(FastaError::RequestTooLong { length: 6, .. }))
        ));
        assert_eq!(reader.fetch("chr2", 5, 6)?, b"CNNNNN");
        assert!(matches!(
            reader.fetch("chrZ", 0, 1),
            Err(crate::Error::FastaError(FastaError::UnknownSequence(_)))
        ));
        Ok(())
    }

    #[test]
    fn test_inconsistent_line_width() {
        let fasta = ">bad\nACGT\nAC\nACGT\n";
        assert!(matches!(
            scan_fasta(Cursor::new(fasta.as_bytes())),
            Err(crate::Error::FastaError(FastaError::InconsistentLineWidth(_)))
        ));
    }

    #[test]
    fn test_sequence_before_name() {
        let fasta = "\nACGT\n>late\nAC\n";
        assert!(matches!(
            scan_fasta(Cursor::new(fasta.as_bytes())),
            Err(crate::Error::FastaError(FastaError::UnexpectedSequence(1)))
        ));
    }

    #[test]
    fn test_fai_parsing() -> Result<()> {
        let fai = "chr1 desc\t23\t23\t10\t11\nchr2\t6\t56\t4\t6\n";
        let entries = read_fai(Cursor::new(fai))?;
        assert_eq!(entries[0].name, "chr1");
        assert_eq!(entries[1].offset, 56);

        assert!(matches!(
            read_fai(Cursor::new("chr1\t23\t23\n")),
            Err(crate::Error::FastaError(FastaError::MalformedIndexLine(_)))
        ));
        Ok(())
    }

    #[test]
    fn test_from_path_with_and_without_fai() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("ref.fa");
        File::create(&path)?.write_all(FASTA.as_bytes())?;

        let mut scanned = IndexedReader::from_path(&path)?;
        assert_eq!(scanned.sequence_names().collect::<Vec<_>>(), vec!["chr1", "chr2"]);
        assert_eq!(scanned.fetch("chr1", 9, 3)?, b"CGG");

        // a stale .fai takes precedence over scanning
        File::create(dir.path().join("ref.fa.fai"))?.write_all(b"chr2\t6\t56\t4\t6\n")?;
        let mut indexed = IndexedReader::from_path(&path)?;
        assert_eq!(indexed.sequence_len("chr1"), None);
        assert_eq!(indexed.fetch("chr2", 0, 6)?, b"TTTTCC");
        Ok(())
    }
}
