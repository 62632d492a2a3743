#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::path::Path;

use bamseek::bai::{Bin, Chunk, Index, ReferenceIndex};
use bamseek::bam::{Header, Reader, Reference, Writer};
use bamseek::bgzf::VirtualOffset;
use bamseek::record::{Record, RecordBuilder};
use bamseek::Result;
use byteorder::{LittleEndian, WriteBytesExt};
use rand::{rngs::SmallRng, Rng, SeedableRng};

pub const CHR1_LEN: u32 = 200_000;
pub const CHR2_LEN: u32 = 100_000;

pub fn header() -> Header {
    Header::new(
        "@HD\tVN:1.6\tSO:coordinate\n@RG\tID:lib1\tSM:s1\n@CO\tsynthetic fixture",
        vec![
            Reference::new("chr1", CHR1_LEN),
            Reference::new("chr2", CHR2_LEN),
        ],
    )
}

fn random_bases(rng: &mut SmallRng, len: usize) -> Vec<u8> {
    (0..len).map(|_| b"ACGT"[rng.random_range(0..4)]).collect()
}

/// Coordinate-sorted records over two references, followed by unplaced reads.
///
/// Every tenth record on the first reference carries a long deletion so its
/// span reaches well past later start positions.
pub fn records() -> Result<Vec<Record>> {
    let mut rng = SmallRng::seed_from_u64(42);
    let mut records = Vec::new();

    for i in 0..3000 {
        let name = format!("chr1_{i}");
        let cigar = if i % 10 == 0 { "20M2000D30M" } else { "50M" };
        let seq = random_bases(&mut rng, 50);
        let qual: Vec<u8> = (0..50).map(|_| rng.random_range(2..41)).collect();
        records.push(
            RecordBuilder::default()
                .reference_id(0)
                .position(i * 60)
                .mapq(60)
                .name(name.as_bytes())
                .cigar(cigar.parse()?)
                .sequence(&seq)
                .quality(&qual)
                .build()?,
        );
    }
    for i in 0..500 {
        let name = format!("chr2_{i}");
        let seq = random_bases(&mut rng, 40);
        records.push(
            RecordBuilder::default()
                .reference_id(1)
                .position(i * 150)
                .name(name.as_bytes())
                .cigar("40M".parse()?)
                .sequence(&seq)
                .build()?,
        );
    }
    for i in 0..20 {
        let name = format!("unplaced_{i}");
        let seq = random_bases(&mut rng, 30);
        records.push(
            RecordBuilder::default()
                .flag(bamseek::record::flags::UNMAPPED)
                .name(name.as_bytes())
                .sequence(&seq)
                .build()?,
        );
    }
    Ok(records)
}

/// Writes a container with the given records into memory
pub fn container(records: &[Record]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    {
        let mut writer = Writer::new(&mut out, &header())?;
        for record in records {
            writer.write(record)?;
        }
        writer.finish()?;
    }
    Ok(out)
}

/// Writes a container with the given records to a file
pub fn write_container(path: &Path, records: &[Record]) -> Result<()> {
    let mut writer = Writer::from_path(path, &header())?;
    for record in records {
        writer.write(record)?;
    }
    writer.finish()
}

/// Reads every record with the virtual offsets it spans
pub fn read_with_offsets(data: &[u8]) -> Result<Vec<(VirtualOffset, VirtualOffset, Record)>> {
    let mut reader = Reader::new(Cursor::new(data))?;
    let mut out = Vec::new();
    loop {
        let begin = reader.virtual_position();
        let Some(record) = reader.next_record()? else {
            break;
        };
        out.push((begin, reader.virtual_position(), record));
    }
    Ok(out)
}

/// Builds a binning and linear index for a sorted container
pub fn build_index(data: &[u8], n_references: usize) -> Result<Index> {
    let mut bins: Vec<BTreeMap<u32, Vec<Chunk>>> = vec![BTreeMap::new(); n_references];
    let mut intervals: Vec<Vec<Option<VirtualOffset>>> = vec![Vec::new(); n_references];

    for (begin, end, record) in read_with_offsets(data)? {
        let Ok(ref_id) = usize::try_from(record.reference_id()) else {
            continue;
        };
        let chunks = bins[ref_id].entry(u32::from(record.bin())).or_default();
        match chunks.last_mut() {
            Some(last) if last.end == begin => last.end = end,
            _ => chunks.push(Chunk::new(begin, end)),
        }

        let start = record.position() as usize;
        let stop = (record.end_position()? as usize).max(start + 1);
        let linear = &mut intervals[ref_id];
        let last_window = (stop - 1) >> 14;
        if linear.len() <= last_window {
            linear.resize(last_window + 1, None);
        }
        for window in &mut linear[start >> 14..=last_window] {
            window.get_or_insert(begin);
        }
    }

    let references = bins
        .into_iter()
        .zip(intervals)
        .map(|(bins, intervals)| ReferenceIndex {
            bins: bins
                .into_iter()
                .map(|(id, chunks)| Bin { id, chunks })
                .collect(),
            intervals,
            metadata: None,
        })
        .collect();
    Ok(Index::from_references(references))
}

/// Serializes an index in the on-disk layout
pub fn encode_index(index: &Index) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.write_all(b"BAI\x01")?;
    out.write_i32::<LittleEndian>(index.references().len() as i32)?;
    for reference in index.references() {
        out.write_i32::<LittleEndian>(reference.bins.len() as i32)?;
        for bin in &reference.bins {
            out.write_u32::<LittleEndian>(bin.id)?;
            out.write_i32::<LittleEndian>(bin.chunks.len() as i32)?;
            for chunk in &bin.chunks {
                out.write_u64::<LittleEndian>(chunk.begin.as_raw())?;
                out.write_u64::<LittleEndian>(chunk.end.as_raw())?;
            }
        }
        out.write_i32::<LittleEndian>(reference.intervals.len() as i32)?;
        for interval in &reference.intervals {
            out.write_u64::<LittleEndian>(interval.map_or(0, VirtualOffset::as_raw))?;
        }
    }
    out.write_u64::<LittleEndian>(index.unplaced_unmapped().unwrap_or(0))?;
    Ok(out)
}

/// Brute-force answer for the records overlapping `[start, end)` on a reference
pub fn overlapping<'a>(
    records: &'a [Record],
    ref_id: i32,
    start: u32,
    end: u32,
) -> Result<Vec<&'a Record>> {
    let mut out = Vec::new();
    for record in records {
        if record.reference_id() == ref_id
            && i64::from(record.position()) < i64::from(end)
            && record.end_position()? > i64::from(start)
        {
            out.push(record);
        }
    }
    Ok(out)
}
