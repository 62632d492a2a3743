use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use memmap2::Mmap;
use tracing::{debug, warn};

use super::bins::{reg2bins, LINEAR_SHIFT, METADATA_BIN};
use super::BAI_MAGIC;
use crate::bgzf::VirtualOffset;
use crate::{error::IndexError, Result};

/// A half-open range of virtual offsets holding records of one bin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub begin: VirtualOffset,
    pub end: VirtualOffset,
}
impl Chunk {
    #[must_use]
    pub fn new(begin: VirtualOffset, end: VirtualOffset) -> Self {
        Self { begin, end }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bin {
    pub id: u32,
    pub chunks: Vec<Chunk>,
}

/// Summary statistics stored in the pseudo-bin of a reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceMetadata {
    /// Virtual offset of the first record placed on the reference
    pub start_position: VirtualOffset,
    /// Virtual offset just past the last record placed on the reference
    pub end_position: VirtualOffset,
    pub mapped_records: u64,
    pub unmapped_records: u64,
}

/// Binning and linear index for one reference
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceIndex {
    /// Populated bins in file order
    pub bins: Vec<Bin>,

    /// Floor offset per 16 KiB window, `None` for placeholder entries
    pub intervals: Vec<Option<VirtualOffset>>,

    pub metadata: Option<ReferenceMetadata>,
}
impl ReferenceIndex {
    /// Linear index floor for the window holding `begin`.
    ///
    /// Windows past the end of the table use its last entry. A placeholder
    /// entry defers to the nearest earlier populated window.
    #[must_use]
    pub fn linear_floor(&self, begin: u32) -> Option<VirtualOffset> {
        let last = self.intervals.len().checked_sub(1)?;
        let window = ((begin >> LINEAR_SHIFT) as usize).min(last);
        self.intervals[..=window].iter().rev().flatten().next().copied()
    }

    /// Iterates the chunks of every populated bin in `candidates` (sorted ascending)
    fn candidate_chunks<'a>(&'a self, candidates: &'a [u32]) -> impl Iterator<Item = &'a Chunk> {
        self.bins
            .iter()
            .filter(|bin| candidates.binary_search(&bin.id).is_ok())
            .flat_map(|bin| bin.chunks.iter())
    }
}

/// A parsed spatial index.
///
/// Immutable once parsed and safe to share between readers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Index {
    references: Vec<ReferenceIndex>,

    /// Count of records with no reference, when the index records it
    unplaced_unmapped: Option<u64>,

    /// Unrecognized bytes following the parsed index
    trailing_bytes: usize,
}

impl Index {
    /// An index holding no references, which answers every query with no data
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_references(references: Vec<ReferenceIndex>) -> Self {
        Self {
            references,
            unplaced_unmapped: None,
            trailing_bytes: 0,
        }
    }

    /// Memory-maps and parses an index file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        // SAFETY: the map is only read during parsing and dropped before returning
        let mmap = unsafe { Mmap::map(&file)? };
        debug!(path = %path.as_ref().display(), bytes = mmap.len(), "parsing index");
        Self::read(Cursor::new(&mmap[..]))
    }

    /// Parses an index from any byte stream
    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).map_err(truncated)?;
        if magic != BAI_MAGIC {
            return Err(IndexError::InvalidMagic(magic).into());
        }

        // counts are not trusted for pre-sizing; a short file ends the loop with an error
        let n_ref = read_count(&mut reader, "reference count")?;
        let mut references = Vec::new();
        for _ in 0..n_ref {
            references.push(read_reference(&mut reader)?);
        }

        // the unplaced count is optional and a short tail is not an error
        let mut tail = Vec::new();
        reader.read_to_end(&mut tail)?;
        let (unplaced_unmapped, trailing_bytes) = if tail.len() >= 8 {
            let mut count = [0u8; 8];
            count.copy_from_slice(&tail[..8]);
            (Some(u64::from_le_bytes(count)), tail.len() - 8)
        } else {
            (None, tail.len())
        };
        if trailing_bytes > 0 {
            warn!(
                trailing_bytes,
                "index appears to be malformed: unexpected bytes after the last reference"
            );
        }

        Ok(Self {
            references,
            unplaced_unmapped,
            trailing_bytes,
        })
    }

    #[must_use]
    pub fn references(&self) -> &[ReferenceIndex] {
        &self.references
    }

    #[must_use]
    pub fn unplaced_unmapped(&self) -> Option<u64> {
        self.unplaced_unmapped
    }

    #[must_use]
    pub fn trailing_bytes(&self) -> usize {
        self.trailing_bytes
    }

    /// Floor offset for `begin` on a reference.
    ///
    /// A reference without any linear index entries falls through to the
    /// first populated entry of a later reference.
    fn floor(&self, ref_id: usize, begin: u32) -> Option<VirtualOffset> {
        let reference = &self.references[ref_id];
        if reference.intervals.is_empty() {
            return self.references[ref_id + 1..]
                .iter()
                .find_map(|r| r.intervals.iter().flatten().next().copied());
        }
        reference.linear_floor(begin)
    }

    /// Picks the virtual offset a scan for `[begin, end)` should start from.
    ///
    /// Returns `None` when the index holds nothing for the region.
    #[must_use]
    pub fn seek_candidate(&self, ref_id: usize, begin: u32, end: u32) -> Option<VirtualOffset> {
        let reference = self.references.get(ref_id)?;
        let floor = self.floor(ref_id, begin);
        let candidates = reg2bins(begin, end);

        let best = reference
            .candidate_chunks(&candidates)
            .filter(|chunk| floor.is_none_or(|floor| chunk.end >= floor))
            .map(|chunk| chunk.begin)
            .min();
        debug!(ref_id, begin, end, ?floor, ?best, "selected seek candidate");
        best.or(floor)
    }

    /// Lists the merged chunks that may hold records overlapping `[begin, end)`.
    ///
    /// Chunks ending before the linear floor are dropped, the rest are sorted
    /// and overlapping or adjacent chunks are coalesced.
    #[must_use]
    pub fn query_chunks(&self, ref_id: usize, begin: u32, end: u32) -> Vec<Chunk> {
        let Some(reference) = self.references.get(ref_id) else {
            return Vec::new();
        };
        let floor = self.floor(ref_id, begin);
        let candidates = reg2bins(begin, end);

        let mut chunks: Vec<Chunk> = reference
            .candidate_chunks(&candidates)
            .filter(|chunk| floor.is_none_or(|floor| chunk.end > floor))
            .map(|chunk| match floor {
                Some(floor) if chunk.begin < floor => Chunk::new(floor, chunk.end),
                _ => *chunk,
            })
            .collect();
        chunks.sort_unstable_by_key(|chunk| (chunk.begin, chunk.end));

        let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            match merged.last_mut() {
                Some(last) if chunk.begin <= last.end => last.end = last.end.max(chunk.end),
                _ => merged.push(chunk),
            }
        }
        merged
    }
}

fn truncated(e: io::Error) -> crate::Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        IndexError::MalformedIndex("index ends mid-record".to_string()).into()
    } else {
        e.into()
    }
}

/// Reads a signed 32-bit count, rejecting negative values
fn read_count<R: Read>(reader: &mut R, what: &str) -> Result<usize> {
    let value = reader.read_i32::<LittleEndian>().map_err(truncated)?;
    usize::try_from(value)
        .map_err(|_| IndexError::MalformedIndex(format!("negative {what}: {value}")).into())
}

fn read_offset<R: Read>(reader: &mut R) -> Result<VirtualOffset> {
    let raw = reader.read_u64::<LittleEndian>().map_err(truncated)?;
    Ok(VirtualOffset::from_raw(raw))
}

fn read_reference<R: Read>(reader: &mut R) -> Result<ReferenceIndex> {
    let n_bin = read_count(reader, "bin count")?;
    let mut bins = Vec::new();
    let mut metadata = None;

    for _ in 0..n_bin {
        let id = reader.read_u32::<LittleEndian>().map_err(truncated)?;
        let n_chunk = read_count(reader, "chunk count")?;

        if id == METADATA_BIN {
            if n_chunk != 2 {
                return Err(IndexError::MalformedIndex(format!(
                    "summary bin holds {n_chunk} chunks instead of 2"
                ))
                .into());
            }
            metadata = Some(ReferenceMetadata {
                start_position: read_offset(reader)?,
                end_position: read_offset(reader)?,
                mapped_records: reader.read_u64::<LittleEndian>().map_err(truncated)?,
                unmapped_records: reader.read_u64::<LittleEndian>().map_err(truncated)?,
            });
            continue;
        }

        let mut chunks = Vec::new();
        for _ in 0..n_chunk {
            let begin = read_offset(reader)?;
            let end = read_offset(reader)?;
            chunks.push(Chunk::new(begin, end));
        }
        bins.push(Bin { id, chunks });
    }

    let n_intv = read_count(reader, "linear index size")?;
    let mut intervals = Vec::new();
    for _ in 0..n_intv {
        let offset = read_offset(reader)?;
        intervals.push((!offset.is_zero()).then_some(offset));
    }

    Ok(ReferenceIndex {
        bins,
        intervals,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use byteorder::WriteBytesExt;

    use super::*;

    fn vo(compressed: u64, uncompressed: u16) -> VirtualOffset {
        VirtualOffset::new(compressed, uncompressed)
    }

    /// Serializes references in index layout, including a summary bin when present
    fn encode(references: &[ReferenceIndex], tail: &[u8]) -> Vec<u8> {
        let mut out = BAI_MAGIC.to_vec();
        out.write_i32::<LittleEndian>(references.len() as i32).unwrap();
        for reference in references {
            let n_bin = reference.bins.len() + usize::from(reference.metadata.is_some());
            out.write_i32::<LittleEndian>(n_bin as i32).unwrap();
            for bin in &reference.bins {
                out.write_u32::<LittleEndian>(bin.id).unwrap();
                out.write_i32::<LittleEndian>(bin.chunks.len() as i32).unwrap();
                for chunk in &bin.chunks {
                    out.write_u64::<LittleEndian>(chunk.begin.as_raw()).unwrap();
                    out.write_u64::<LittleEndian>(chunk.end.as_raw()).unwrap();
                }
            }
            if let Some(meta) = reference.metadata {
                out.write_u32::<LittleEndian>(METADATA_BIN).unwrap();
                out.write_i32::<LittleEndian>(2).unwrap();
                out.write_u64::<LittleEndian>(meta.start_position.as_raw()).unwrap();
                out.write_u64::<LittleEndian>(meta.end_position.as_raw()).unwrap();
                out.write_u64::<LittleEndian>(meta.mapped_records).unwrap();
                out.write_u64::<LittleEndian>(meta.unmapped_records).unwrap();
            }
            out.write_i32::<LittleEndian>(reference.intervals.len() as i32).unwrap();
            for interval in &reference.intervals {
                let raw = interval.map_or(0, VirtualOffset::as_raw);
                out.write_u64::<LittleEndian>(raw).unwrap();
            }
        }
        out.extend_from_slice(tail);
        out
    }

    fn sample_reference() -> ReferenceIndex {
        ReferenceIndex {
            bins: vec![
                Bin {
                    id: 4681,
                    chunks: vec![Chunk::new(vo(100, 0), vo(100, 500))],
                },
                Bin {
                    id: 4682,
                    chunks: vec![Chunk::new(vo(100, 500), vo(900, 20))],
                },
                Bin {
                    id: 4684,
                    chunks: vec![Chunk::new(vo(900, 20), vo(2000, 0))],
                },
            ],
            intervals: vec![Some(vo(100, 0)), Some(vo(100, 500)), None, Some(vo(900, 20))],
            metadata: Some(ReferenceMetadata {
                start_position: vo(100, 0),
                end_position: vo(2000, 0),
                mapped_records: 30,
                unmapped_records: 2,
            }),
        }
    }

    #[test]
    fn test_parse_with_metadata_and_count() -> Result<()> {
        let bytes = encode(&[sample_reference()], &7u64.to_le_bytes());
        let index = Index::read(Cursor::new(bytes))?;

        assert_eq!(index.references().len(), 1);
        let reference = &index.references()[0];
        assert_eq!(reference.bins.len(), 3);
        assert_eq!(reference.intervals[2], None);
        assert_eq!(reference.metadata.map(|m| m.mapped_records), Some(30));
        assert_eq!(index.unplaced_unmapped(), Some(7));
        assert_eq!(index.trailing_bytes(), 0);
        Ok(())
    }

    #[test]
    fn test_missing_unplaced_count_is_unknown() -> Result<()> {
        let index = Index::read(Cursor::new(encode(&[sample_reference()], &[])))?;
        assert_eq!(index.unplaced_unmapped(), None);
        assert_eq!(index.trailing_bytes(), 0);
        Ok(())
    }

    #[test]
    fn test_trailing_bytes_still_parse() -> Result<()> {
        let mut tail = 3u64.to_le_bytes().to_vec();
        tail.extend_from_slice(b"junk");
        let index = Index::read(Cursor::new(encode(&[sample_reference()], &tail)))?;
        assert_eq!(index.unplaced_unmapped(), Some(3));
        assert_eq!(index.trailing_bytes(), 4);
        assert_eq!(index.references()[0].bins.len(), 3);
        Ok(())
    }

    #[test]
    fn test_invalid_magic() {
        let mut bytes = encode(&[], &[]);
        bytes[3] = 2;
        let err = Index::read(Cursor::new(bytes)).unwrap_err();
        assert!(err.is_malformed_index());
        assert!(matches!(
            err,
            crate::Error::IndexError(IndexError::InvalidMagic(_))
        ));
    }

    #[test]
    fn test_truncated_body_is_malformed() {
        let bytes = encode(&[sample_reference()], &[]);
        let err = Index::read(Cursor::new(&bytes[..bytes.len() - 3])).unwrap_err();
        assert!(err.is_malformed_index());
    }

    #[test]
    fn test_negative_count_is_malformed() {
        let mut bytes = BAI_MAGIC.to_vec();
        bytes.extend_from_slice(&(-1i32).to_le_bytes());
        let err = Index::read(Cursor::new(bytes)).unwrap_err();
        assert!(err.is_malformed_index());
    }

    #[test]
    fn test_huge_counts_are_malformed() {
        let mut bytes = BAI_MAGIC.to_vec();
        bytes.extend_from_slice(&i32::MAX.to_le_bytes());
        let err = Index::read(Cursor::new(bytes)).unwrap_err();
        assert!(err.is_malformed_index());

        // one reference declaring far more bins than follow
        let mut bytes = BAI_MAGIC.to_vec();
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&i32::MAX.to_le_bytes());
        let err = Index::read(Cursor::new(bytes)).unwrap_err();
        assert!(err.is_malformed_index());

        // a bin declaring far more chunks, then a linear index that is too long
        let mut bytes = BAI_MAGIC.to_vec();
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&4681u32.to_le_bytes());
        bytes.extend_from_slice(&i32::MAX.to_le_bytes());
        let err = Index::read(Cursor::new(bytes)).unwrap_err();
        assert!(err.is_malformed_index());

        let mut bytes = BAI_MAGIC.to_vec();
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(&i32::MAX.to_le_bytes());
        let err = Index::read(Cursor::new(bytes)).unwrap_err();
        assert!(err.is_malformed_index());
    }

    #[test]
    fn test_seek_candidate_first_window() {
        let index = Index::from_references(vec![sample_reference()]);
        assert_eq!(index.seek_candidate(0, 0, 100), Some(vo(100, 0)));
    }

    #[test]
    fn test_seek_candidate_prunes_by_floor() {
        let index = Index::from_references(vec![sample_reference()]);
        // window 1 floor is (100, 500) and only leaf bin 4682 is a candidate
        assert_eq!(index.seek_candidate(0, 16_500, 16_600), Some(vo(100, 500)));

        // starting in window 0 lowers the floor and brings bin 4681 back
        assert_eq!(index.seek_candidate(0, 16_000, 16_600), Some(vo(100, 0)));

        // window 3 floor is (900, 20), only the 4684 chunk survives
        assert_eq!(
            index.seek_candidate(0, 3 * 16_384 + 5, 3 * 16_384 + 50),
            Some(vo(900, 20))
        );
    }

    #[test]
    fn test_placeholder_window_uses_earlier_floor() {
        let reference = sample_reference();
        assert_eq!(reference.linear_floor(2 * 16_384), Some(vo(100, 500)));
        // beyond the table the last entry applies
        assert_eq!(reference.linear_floor(100 * 16_384), Some(vo(900, 20)));
    }

    #[test]
    fn test_seek_candidate_falls_back_to_floor() {
        let index = Index::from_references(vec![sample_reference()]);
        // no populated candidate bin past window 40, so the floor is the answer
        assert_eq!(index.seek_candidate(0, 40 * 16_384, 41 * 16_384), Some(vo(900, 20)));
    }

    #[test]
    fn test_empty_linear_index_uses_later_reference() {
        let empty = ReferenceIndex::default();
        let index = Index::from_references(vec![empty, sample_reference()]);
        assert_eq!(index.seek_candidate(0, 0, 1000), Some(vo(100, 0)));
    }

    #[test]
    fn test_no_data_for_region() {
        let index = Index::from_references(vec![ReferenceIndex::default()]);
        assert_eq!(index.seek_candidate(0, 0, 1000), None);
        assert_eq!(index.seek_candidate(5, 0, 1000), None);
        assert_eq!(Index::empty().seek_candidate(0, 0, 10), None);
    }

    #[test]
    fn test_query_chunks_merges_adjacent() {
        let index = Index::from_references(vec![sample_reference()]);
        let chunks = index.query_chunks(0, 0, 4 * 16_384);
        assert_eq!(chunks, vec![Chunk::new(vo(100, 0), vo(2000, 0))]);

        let chunks = index.query_chunks(0, 3 * 16_384, 4 * 16_384);
        assert_eq!(chunks, vec![Chunk::new(vo(900, 20), vo(2000, 0))]);
    }

    #[test]
    fn test_from_path() -> Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        std::fs::write(file.path(), encode(&[sample_reference()], &[]))?;
        let index = Index::from_path(file.path())?;
        assert_eq!(index.references()[0], sample_reference());
        Ok(())
    }
}
