use super::alignment::{FixedHeader, Record, MISSING_QUALITY};
use super::cigar::{Cigar, MAX_OP_LEN};
use super::sequence;
use super::tags::{self, AuxField};
use crate::bai::{reg2bin, UNPLACED_BIN};
use crate::{error::RecordError, Result};

/// Longest read name, leaving room for the NUL terminator in an 8-bit length
const MAX_NAME_LEN: usize = 254;

/// Assembles the binary form of a [`Record`].
///
/// Unset fields take the conventional "unavailable" values: no reference,
/// position `-1`, mapping quality 255, no mate.
///
/// # Example
///
/// ```
/// use bamseek::record::RecordBuilder;
///
/// let record = RecordBuilder::default()
///     .reference_id(0)
///     .position(99)
///     .name(b"read_1")
///     .cigar("4M".parse().unwrap())
///     .sequence(b"ACGT")
///     .quality(&[30, 30, 30, 30])
///     .build()
///     .unwrap();
///
/// assert_eq!(record.end_position().unwrap(), 103);
/// ```
#[derive(Clone)]
pub struct RecordBuilder<'a> {
    reference_id: i32,
    position: i32,
    mapq: u8,
    flag: u16,
    bin: Option<u16>,
    name: &'a [u8],
    cigar: Cigar,
    sequence: &'a [u8],
    quality: Option<&'a [u8]>,
    mate_reference_id: i32,
    mate_position: i32,
    template_len: i32,
    aux: Vec<AuxField>,
}

impl Default for RecordBuilder<'_> {
    fn default() -> Self {
        Self {
            reference_id: -1,
            position: -1,
            mapq: 255,
            flag: 0,
            bin: None,
            name: b"",
            cigar: Cigar::default(),
            sequence: b"",
            quality: None,
            mate_reference_id: -1,
            mate_position: -1,
            template_len: 0,
            aux: Vec::new(),
        }
    }
}

impl<'a> RecordBuilder<'a> {
    #[must_use]
    pub fn reference_id(mut self, reference_id: i32) -> Self {
        self.reference_id = reference_id;
        self
    }

    /// Sets the 0-based leftmost position
    #[must_use]
    pub fn position(mut self, position: i32) -> Self {
        self.position = position;
        self
    }

    #[must_use]
    pub fn mapq(mut self, mapq: u8) -> Self {
        self.mapq = mapq;
        self
    }

    #[must_use]
    pub fn flag(mut self, flag: u16) -> Self {
        self.flag = flag;
        self
    }

    /// Overrides the bin that would otherwise be computed from the alignment span
    #[must_use]
    pub fn bin(mut self, bin: u16) -> Self {
        self.bin = Some(bin);
        self
    }

    #[must_use]
    pub fn name(mut self, name: &'a [u8]) -> Self {
        self.name = name;
        self
    }

    #[must_use]
    pub fn cigar(mut self, cigar: Cigar) -> Self {
        self.cigar = cigar;
        self
    }

    /// Sets the bases as ASCII symbols
    #[must_use]
    pub fn sequence(mut self, sequence: &'a [u8]) -> Self {
        self.sequence = sequence;
        self
    }

    /// Sets raw Phred scores, one per base
    #[must_use]
    pub fn quality(mut self, quality: &'a [u8]) -> Self {
        self.quality = Some(quality);
        self
    }

    #[must_use]
    pub fn opt_quality(mut self, quality: Option<&'a [u8]>) -> Self {
        self.quality = quality;
        self
    }

    #[must_use]
    pub fn mate_reference_id(mut self, mate_reference_id: i32) -> Self {
        self.mate_reference_id = mate_reference_id;
        self
    }

    #[must_use]
    pub fn mate_position(mut self, mate_position: i32) -> Self {
        self.mate_position = mate_position;
        self
    }

    #[must_use]
    pub fn template_len(mut self, template_len: i32) -> Self {
        self.template_len = template_len;
        self
    }

    #[must_use]
    pub fn aux(mut self, aux: Vec<AuxField>) -> Self {
        self.aux = aux;
        self
    }

    /// Bin for the alignment span, or the unplaced bin without a position
    fn compute_bin(&self) -> u16 {
        let Ok(begin) = u32::try_from(self.position) else {
            return UNPLACED_BIN;
        };
        let span = self.cigar.reference_len().min(u64::from(u32::MAX - begin)) as u32;
        reg2bin(begin, begin + span) as u16
    }

    /// Encodes the fields and frames the result as a [`Record`]
    pub fn build(self) -> Result<Record> {
        if self.name.len() > MAX_NAME_LEN {
            return Err(RecordError::NameTooLong(self.name.len()).into());
        }
        if self.cigar.len() > usize::from(u16::MAX) {
            return Err(RecordError::TooManyCigarOps(self.cigar.len()).into());
        }
        if let Some(op) = self.cigar.iter().find(|op| op.len() > MAX_OP_LEN) {
            return Err(RecordError::CigarOpTooLong(op.len()).into());
        }
        if let Some(quality) = self.quality {
            if quality.len() != self.sequence.len() {
                return Err(RecordError::QualityLengthMismatch {
                    sequence: self.sequence.len(),
                    quality: quality.len(),
                }
                .into());
            }
        }

        let bin = self.bin.unwrap_or_else(|| self.compute_bin());
        let header = FixedHeader {
            ref_id: self.reference_id,
            pos: self.position,
            bin_mq_nl: (u32::from(bin) << 16)
                | (u32::from(self.mapq) << 8)
                | (self.name.len() as u32 + 1),
            flag_nc: (u32::from(self.flag) << 16) | self.cigar.len() as u32,
            l_seq: self.sequence.len() as i32,
            next_ref_id: self.mate_reference_id,
            next_pos: self.mate_position,
            tlen: self.template_len,
        };

        let mut data = Vec::with_capacity(
            32 + self.name.len() + 1 + 4 * self.cigar.len() + 2 * self.sequence.len(),
        );
        header.write_bytes(&mut data)?;
        data.extend_from_slice(self.name);
        data.push(0);
        self.cigar.encode_into(&mut data);
        sequence::encode_into(self.sequence, &mut data)?;
        match self.quality {
            Some(quality) => data.extend_from_slice(quality),
            None => data.resize(data.len() + self.sequence.len(), MISSING_QUALITY),
        }
        tags::encode_into(&self.aux, &mut data);

        Record::from_bytes(data)
    }
}
