use std::cell::OnceCell;
use std::io::{self, Write};
use std::ops::Range;

use bytemuck::{Pod, Zeroable};

use super::cigar::{Cigar, Kind};
use super::tags::{self, AuxField, Value};
use super::{flags, sequence};
use crate::{error::RecordError, Result};

/// Size of the fixed-width leading section of every record
pub const FIXED_HEADER_SIZE: usize = 32;

/// Quality byte marking the whole quality string as absent
pub const MISSING_QUALITY: u8 = 0xFF;

/// The fixed-width leading section of a record.
///
/// Stored little-endian on disk; values are converted to native order on load.
#[derive(Copy, Clone, Pod, Zeroable, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct FixedHeader {
    pub ref_id: i32,
    pub pos: i32,
    /// `bin << 16 | mapq << 8 | name_length`
    pub bin_mq_nl: u32,
    /// `flag << 16 | cigar_op_count`
    pub flag_nc: u32,
    pub l_seq: i32,
    pub next_ref_id: i32,
    pub next_pos: i32,
    pub tlen: i32,
}
impl FixedHeader {
    fn to_native(mut self) -> Self {
        self.ref_id = i32::from_le(self.ref_id);
        self.pos = i32::from_le(self.pos);
        self.bin_mq_nl = u32::from_le(self.bin_mq_nl);
        self.flag_nc = u32::from_le(self.flag_nc);
        self.l_seq = i32::from_le(self.l_seq);
        self.next_ref_id = i32::from_le(self.next_ref_id);
        self.next_pos = i32::from_le(self.next_pos);
        self.tlen = i32::from_le(self.tlen);
        self
    }

    /// Reads a header from the first [`FIXED_HEADER_SIZE`] bytes of `bytes`
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        bytemuck::pod_read_unaligned::<Self>(&bytes[..FIXED_HEADER_SIZE]).to_native()
    }

    /// Serializes the header in little-endian order
    pub fn write_bytes<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let le = Self {
            ref_id: self.ref_id.to_le(),
            pos: self.pos.to_le(),
            bin_mq_nl: self.bin_mq_nl.to_le(),
            flag_nc: self.flag_nc.to_le(),
            l_seq: self.l_seq.to_le(),
            next_ref_id: self.next_ref_id.to_le(),
            next_pos: self.next_pos.to_le(),
            tlen: self.tlen.to_le(),
        };
        writer.write_all(bytemuck::bytes_of(&le))
    }

    #[must_use]
    pub fn bin(&self) -> u16 {
        (self.bin_mq_nl >> 16) as u16
    }

    #[must_use]
    pub fn mapq(&self) -> u8 {
        (self.bin_mq_nl >> 8) as u8
    }

    #[must_use]
    pub fn name_len(&self) -> usize {
        (self.bin_mq_nl & 0xFF) as usize
    }

    #[must_use]
    pub fn flag(&self) -> u16 {
        (self.flag_nc >> 16) as u16
    }

    /// The operation count occupies the full low 16 bits
    #[must_use]
    pub fn cigar_op_count(&self) -> usize {
        (self.flag_nc & 0xFFFF) as usize
    }
}

/// How far lazy decoding of a record has progressed.
///
/// Each stage requires every earlier stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DecodeStage {
    Header,
    Name,
    Cigar,
    Sequence,
    Quality,
    Aux,
}

/// An insertion or deletion relative to the reference.
///
/// Positions are 1-based and name the last reference base before the event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Indel {
    Insertion { position: i64, len: u32 },
    Deletion { position: i64, len: u32 },
}
impl Indel {
    #[must_use]
    pub fn position(self) -> i64 {
        match self {
            Self::Insertion { position, .. } | Self::Deletion { position, .. } => position,
        }
    }

    #[must_use]
    pub fn len(self) -> u32 {
        match self {
            Self::Insertion { len, .. } | Self::Deletion { len, .. } => len,
        }
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.len() == 0
    }
}

/// Byte ranges of the variable-length sections within a record payload
#[derive(Clone, Debug)]
struct Layout {
    name: Range<usize>,
    cigar: Range<usize>,
    sequence: Range<usize>,
    quality: Range<usize>,
    aux: Range<usize>,
}

/// One alignment record.
///
/// Holds the raw payload and decodes sections on first access. Decoded
/// sections and derived values are cached for the lifetime of the record;
/// records never change once constructed.
#[derive(Clone, Debug)]
pub struct Record {
    data: Vec<u8>,
    header: FixedHeader,
    layout: Layout,

    name: OnceCell<String>,
    cigar: OnceCell<Cigar>,
    sequence: OnceCell<Vec<u8>>,
    quality: OnceCell<Option<Vec<u8>>>,
    aux: OnceCell<Vec<AuxField>>,

    end_position: OnceCell<i64>,
    indels: OnceCell<Vec<Indel>>,
}

impl Record {
    /// Frames a record payload (without its length prefix).
    ///
    /// Only the fixed header is decoded here; the lengths it declares must
    /// fit within the payload.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        if data.len() < FIXED_HEADER_SIZE {
            return Err(RecordError::TruncatedRecord {
                expected: FIXED_HEADER_SIZE,
                actual: data.len(),
            }
            .into());
        }
        let header = FixedHeader::from_bytes(&data);
        let l_seq = usize::try_from(header.l_seq)
            .map_err(|_| RecordError::InvalidSequenceLength(header.l_seq))?;

        let name = FIXED_HEADER_SIZE..FIXED_HEADER_SIZE + header.name_len();
        let cigar = name.end..name.end + 4 * header.cigar_op_count();
        let sequence = cigar.end..cigar.end + sequence::packed_len(l_seq);
        let quality = sequence.end..sequence.end + l_seq;
        if quality.end > data.len() {
            return Err(RecordError::TruncatedRecord {
                expected: quality.end,
                actual: data.len(),
            }
            .into());
        }
        let aux = quality.end..data.len();

        Ok(Self {
            header,
            layout: Layout {
                name,
                cigar,
                sequence,
                quality,
                aux,
            },
            data,
            name: OnceCell::new(),
            cigar: OnceCell::new(),
            sequence: OnceCell::new(),
            quality: OnceCell::new(),
            aux: OnceCell::new(),
            end_position: OnceCell::new(),
            indels: OnceCell::new(),
        })
    }

    /// The raw payload, excluding the length prefix
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Writes the length prefix followed by the payload
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&(self.data.len() as u32).to_le_bytes())?;
        writer.write_all(&self.data)
    }

    #[must_use]
    pub fn header(&self) -> &FixedHeader {
        &self.header
    }

    /// The furthest stage decoded so far
    #[must_use]
    pub fn decoded_stage(&self) -> DecodeStage {
        if self.aux.get().is_some() {
            DecodeStage::Aux
        } else if self.quality.get().is_some() {
            DecodeStage::Quality
        } else if self.sequence.get().is_some() {
            DecodeStage::Sequence
        } else if self.cigar.get().is_some() {
            DecodeStage::Cigar
        } else if self.name.get().is_some() {
            DecodeStage::Name
        } else {
            DecodeStage::Header
        }
    }

    /// Decodes every stage up to and including `stage`
    pub fn decode_to(&self, stage: DecodeStage) -> Result<()> {
        match stage {
            DecodeStage::Header => {}
            DecodeStage::Name => {
                self.name()?;
            }
            DecodeStage::Cigar => {
                self.cigar()?;
            }
            DecodeStage::Sequence => {
                self.sequence()?;
            }
            DecodeStage::Quality => {
                self.quality()?;
            }
            DecodeStage::Aux => {
                self.aux()?;
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn reference_id(&self) -> i32 {
        self.header.ref_id
    }

    /// 0-based leftmost position, `-1` when unplaced
    #[must_use]
    pub fn position(&self) -> i32 {
        self.header.pos
    }

    #[must_use]
    pub fn mapq(&self) -> u8 {
        self.header.mapq()
    }

    #[must_use]
    pub fn flag(&self) -> u16 {
        self.header.flag()
    }

    #[must_use]
    pub fn bin(&self) -> u16 {
        self.header.bin()
    }

    #[must_use]
    pub fn sequence_len(&self) -> usize {
        self.layout.quality.len()
    }

    #[must_use]
    pub fn mate_reference_id(&self) -> i32 {
        self.header.next_ref_id
    }

    #[must_use]
    pub fn mate_position(&self) -> i32 {
        self.header.next_pos
    }

    #[must_use]
    pub fn template_len(&self) -> i32 {
        self.header.tlen
    }

    #[must_use]
    pub fn is_unmapped(&self) -> bool {
        self.flag() & flags::UNMAPPED != 0
    }

    #[must_use]
    pub fn is_reverse(&self) -> bool {
        self.flag() & flags::REVERSE != 0
    }

    /// Read name with its NUL terminator stripped
    pub fn name(&self) -> Result<&str> {
        if let Some(name) = self.name.get() {
            return Ok(name);
        }
        let raw = &self.data[self.layout.name.clone()];
        let end = memchr::memchr(0, raw).unwrap_or(raw.len());
        let name = std::str::from_utf8(&raw[..end])?.to_string();
        Ok(self.name.get_or_init(|| name))
    }

    pub fn cigar(&self) -> Result<&Cigar> {
        self.name()?;
        if let Some(cigar) = self.cigar.get() {
            return Ok(cigar);
        }
        let cigar = Cigar::decode(&self.data[self.layout.cigar.clone()])?;
        Ok(self.cigar.get_or_init(|| cigar))
    }

    /// Bases as ASCII symbols
    pub fn sequence(&self) -> Result<&[u8]> {
        self.cigar()?;
        let bases = self.sequence.get_or_init(|| {
            sequence::decode(&self.data[self.layout.sequence.clone()], self.sequence_len())
        });
        Ok(bases)
    }

    /// Raw Phred scores, `None` when the record stores no qualities
    pub fn quality(&self) -> Result<Option<&[u8]>> {
        self.sequence()?;
        let quality = self.quality.get_or_init(|| {
            let raw = &self.data[self.layout.quality.clone()];
            match raw.first() {
                None | Some(&MISSING_QUALITY) => None,
                Some(_) => Some(raw.to_vec()),
            }
        });
        Ok(quality.as_deref())
    }

    pub fn aux(&self) -> Result<&[AuxField]> {
        self.quality()?;
        if let Some(fields) = self.aux.get() {
            return Ok(fields);
        }
        let fields = tags::decode(&self.data[self.layout.aux.clone()])?;
        Ok(self.aux.get_or_init(|| fields))
    }

    /// Looks up the first auxiliary field with `tag`
    pub fn tag(&self, tag: [u8; 2]) -> Result<Option<&Value>> {
        Ok(self
            .aux()?
            .iter()
            .find(|field| field.tag() == tag)
            .map(AuxField::value))
    }

    /// The `RG` read group, if present as a string field
    pub fn read_group(&self) -> Result<Option<&str>> {
        Ok(self.tag(*b"RG")?.and_then(Value::as_str))
    }

    /// 0-based exclusive end of the alignment on the reference.
    ///
    /// Match, deletion, skip and the sequence match/mismatch operations
    /// advance the end. Insertions, padding and clips do not.
    pub fn end_position(&self) -> Result<i64> {
        if let Some(&end) = self.end_position.get() {
            return Ok(end);
        }
        let span = self.cigar()?.reference_len() as i64;
        Ok(*self
            .end_position
            .get_or_init(|| i64::from(self.position()) + span))
    }

    /// Insertions and deletions in alignment order.
    ///
    /// Anchors are 1-based: the last reference base before the event.
    pub fn indels(&self) -> Result<&[Indel]> {
        if let Some(indels) = self.indels.get() {
            return Ok(indels);
        }
        let start = i64::from(self.position());
        let mut offset = 0i64;
        let mut indels = Vec::new();
        for op in self.cigar()? {
            let len = i64::from(op.len());
            match op.kind() {
                Kind::Match | Kind::SequenceMatch | Kind::SequenceMismatch | Kind::Skip => {
                    offset += len;
                }
                Kind::Insertion => indels.push(Indel::Insertion {
                    position: start + offset,
                    len: op.len(),
                }),
                Kind::Deletion => {
                    indels.push(Indel::Deletion {
                        position: start + offset,
                        len: op.len(),
                    });
                    offset += len;
                }
                Kind::SoftClip | Kind::HardClip | Kind::Padding => {}
            }
        }
        Ok(self.indels.get_or_init(|| indels))
    }

    /// Checks for an indel at a 1-based reference position.
    ///
    /// An insertion matches on its anchor. A deletion matches positions
    /// strictly after its anchor, up to and including its last deleted base.
    pub fn indel_at(
        &self,
        position: i64,
        check_insertions: bool,
        check_deletions: bool,
    ) -> Result<bool> {
        Ok(self.indels()?.iter().any(|indel| match *indel {
            Indel::Insertion { position: anchor, .. } => check_insertions && position == anchor,
            Indel::Deletion { position: anchor, len } => {
                check_deletions && anchor < position && position <= anchor + i64::from(len)
            }
        }))
    }

    /// Formats the record as a SAM text line (no trailing newline).
    ///
    /// `reference_names` resolves reference ids.
    pub fn to_sam<N: AsRef<str>>(&self, reference_names: &[N]) -> Result<String> {
        let mut ibuf = itoa::Buffer::new();
        let mut line = String::with_capacity(self.data.len() * 2);

        let name = self.name()?;
        line.push_str(if name.is_empty() { "*" } else { name });
        line.push('\t');
        line.push_str(ibuf.format(self.flag()));
        line.push('\t');
        line.push_str(reference_name(reference_names, self.reference_id()));
        line.push('\t');
        line.push_str(ibuf.format(i64::from(self.position()) + 1));
        line.push('\t');
        line.push_str(ibuf.format(self.mapq()));
        line.push('\t');
        line.push_str(&self.cigar()?.to_string());
        line.push('\t');
        if self.mate_reference_id() >= 0 && self.mate_reference_id() == self.reference_id() {
            line.push('=');
        } else {
            line.push_str(reference_name(reference_names, self.mate_reference_id()));
        }
        line.push('\t');
        line.push_str(ibuf.format(i64::from(self.mate_position()) + 1));
        line.push('\t');
        line.push_str(ibuf.format(self.template_len()));
        line.push('\t');

        let bases = self.sequence()?;
        if bases.is_empty() {
            line.push('*');
        } else {
            line.extend(bases.iter().map(|&b| b as char));
        }
        line.push('\t');
        match self.quality()? {
            Some(quality) => line.extend(quality.iter().map(|&q| (q.saturating_add(33)) as char)),
            None => line.push('*'),
        }

        for field in self.aux()? {
            line.push('\t');
            line.push_str(&field.to_string());
        }
        Ok(line)
    }
}

/// Resolves a reference id to its name, `*` when unplaced or unknown
fn reference_name<N: AsRef<str>>(names: &[N], id: i32) -> &str {
    usize::try_from(id)
        .ok()
        .and_then(|id| names.get(id))
        .map_or("*", |name| name.as_ref())
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}
impl Eq for Record {}
