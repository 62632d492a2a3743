use std::fmt;
use std::str::FromStr;

use crate::{error::RecordError, Result};

/// Symbols of the operation kinds, indexed by their binary code
const SYMBOLS: &[u8; 9] = b"MIDNSHP=X";

/// Alignment operation kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Kind {
    Match = 0,
    Insertion = 1,
    Deletion = 2,
    Skip = 3,
    SoftClip = 4,
    HardClip = 5,
    Padding = 6,
    SequenceMatch = 7,
    SequenceMismatch = 8,
}
impl Kind {
    const ALL: [Self; 9] = [
        Self::Match,
        Self::Insertion,
        Self::Deletion,
        Self::Skip,
        Self::SoftClip,
        Self::HardClip,
        Self::Padding,
        Self::SequenceMatch,
        Self::SequenceMismatch,
    ];

    pub fn from_code(code: u32) -> Result<Self> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or_else(|| RecordError::InvalidCigarOp(code).into())
    }

    #[must_use]
    pub fn from_symbol(symbol: u8) -> Option<Self> {
        SYMBOLS
            .iter()
            .position(|&s| s == symbol)
            .map(|i| Self::ALL[i])
    }

    #[must_use]
    pub fn code(self) -> u32 {
        self as u32
    }

    #[must_use]
    pub fn symbol(self) -> char {
        SYMBOLS[self as usize] as char
    }

    /// Whether the operation advances along the reference.
    ///
    /// Clips are not aligned to the reference and do not consume it.
    #[must_use]
    pub fn consumes_reference(self) -> bool {
        matches!(
            self,
            Self::Match | Self::Deletion | Self::Skip | Self::SequenceMatch | Self::SequenceMismatch
        )
    }

    /// Whether the operation accounts for bases stored in the read sequence
    #[must_use]
    pub fn consumes_read(self) -> bool {
        matches!(
            self,
            Self::Match
                | Self::Insertion
                | Self::SoftClip
                | Self::SequenceMatch
                | Self::SequenceMismatch
        )
    }
}

/// Longest operation that fits the 28-bit length field
pub const MAX_OP_LEN: u32 = (1 << 28) - 1;

/// One run-length encoded alignment operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Op {
    kind: Kind,
    len: u32,
}
impl Op {
    #[must_use]
    pub fn new(kind: Kind, len: u32) -> Self {
        Self { kind, len }
    }

    /// Unpacks `len << 4 | code`
    pub fn from_raw(raw: u32) -> Result<Self> {
        Ok(Self {
            kind: Kind::from_code(raw & 0xF)?,
            len: raw >> 4,
        })
    }

    #[must_use]
    pub fn to_raw(self) -> u32 {
        (self.len << 4) | self.kind.code()
    }

    #[must_use]
    pub fn kind(self) -> Kind {
        self.kind
    }

    #[must_use]
    pub fn len(self) -> u32 {
        self.len
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.len == 0
    }
}

/// An ordered list of alignment operations
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Cigar(Vec<Op>);

impl Cigar {
    #[must_use]
    pub fn new(ops: Vec<Op>) -> Self {
        Self(ops)
    }

    /// Decodes packed little-endian operations
    pub(crate) fn decode(bytes: &[u8]) -> Result<Self> {
        bytes
            .chunks_exact(4)
            .map(|raw| Op::from_raw(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])))
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    pub(crate) fn encode_into(&self, dst: &mut Vec<u8>) {
        for op in &self.0 {
            dst.extend_from_slice(&op.to_raw().to_le_bytes());
        }
    }

    #[must_use]
    pub fn ops(&self) -> &[Op] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Op> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of reference bases spanned by the alignment
    #[must_use]
    pub fn reference_len(&self) -> u64 {
        self.0
            .iter()
            .filter(|op| op.kind.consumes_reference())
            .map(|op| u64::from(op.len))
            .sum()
    }

    /// Number of read bases the operations account for
    #[must_use]
    pub fn read_len(&self) -> u64 {
        self.0
            .iter()
            .filter(|op| op.kind.consumes_read())
            .map(|op| u64::from(op.len))
            .sum()
    }
}

impl From<Vec<Op>> for Cigar {
    fn from(ops: Vec<Op>) -> Self {
        Self(ops)
    }
}

impl<'a> IntoIterator for &'a Cigar {
    type Item = &'a Op;
    type IntoIter = std::slice::Iter<'a, Op>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Formats as SAM text, `*` when there are no operations
impl fmt::Display for Cigar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("*");
        }
        for op in &self.0 {
            write!(f, "{}{}", op.len, op.kind.symbol())?;
        }
        Ok(())
    }
}

impl FromStr for Cigar {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == "*" || s.is_empty() {
            return Ok(Self::default());
        }
        let invalid = || RecordError::InvalidCigarString(s.to_string());

        let mut ops = Vec::new();
        let mut len: Option<u32> = None;
        for byte in s.bytes() {
            if byte.is_ascii_digit() {
                let digit = u32::from(byte - b'0');
                let value = len
                    .unwrap_or(0)
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(digit))
                    .filter(|&v| v <= MAX_OP_LEN)
                    .ok_or_else(invalid)?;
                len = Some(value);
            } else {
                let kind = Kind::from_symbol(byte).ok_or_else(invalid)?;
                ops.push(Op::new(kind, len.take().ok_or_else(invalid)?));
            }
        }
        if len.is_some() {
            return Err(invalid().into());
        }
        Ok(Self(ops))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_format() -> Result<()> {
        let cigar: Cigar = "5S10M2I3M1D20M4H".parse()?;
        assert_eq!(cigar.len(), 7);
        assert_eq!(cigar.ops()[0], Op::new(Kind::SoftClip, 5));
        assert_eq!(cigar.ops()[2], Op::new(Kind::Insertion, 2));
        assert_eq!(cigar.to_string(), "5S10M2I3M1D20M4H");
        Ok(())
    }

    #[test]
    fn test_empty_is_star() -> Result<()> {
        let cigar: Cigar = "*".parse()?;
        assert!(cigar.is_empty());
        assert_eq!(cigar.to_string(), "*");
        Ok(())
    }

    #[test]
    fn test_invalid_strings() {
        for text in ["10", "M", "10Q", "5M3", "99999999999M"] {
            let result = text.parse::<Cigar>();
            assert!(
                matches!(
                    result,
                    Err(crate::Error::RecordError(RecordError::InvalidCigarString(_)))
                ),
                "{text} should not parse"
            );
        }
    }

    #[test]
    fn test_raw_packing() -> Result<()> {
        let op = Op::new(Kind::Deletion, 300);
        assert_eq!(op.to_raw(), (300 << 4) | 2);
        assert_eq!(Op::from_raw(op.to_raw())?, op);

        let cigar: Cigar = "3M2D3M".parse()?;
        let mut bytes = Vec::new();
        cigar.encode_into(&mut bytes);
        assert_eq!(bytes.len(), 12);
        assert_eq!(Cigar::decode(&bytes)?, cigar);
        Ok(())
    }

    #[test]
    fn test_all_nine_codes_decode() -> Result<()> {
        for code in 0..9 {
            let op = Op::from_raw((1 << 4) | code)?;
            assert_eq!(op.kind().code(), code);
        }
        assert!(matches!(
            Op::from_raw((1 << 4) | 9),
            Err(crate::Error::RecordError(RecordError::InvalidCigarOp(9)))
        ));
        Ok(())
    }

    #[test]
    fn test_reference_and_read_lengths() -> Result<()> {
        let cigar: Cigar = "2S5M2I3M1D4N2=1X3H1P".parse()?;
        // M, D, N, = and X consume the reference, clips do not
        assert_eq!(cigar.reference_len(), 5 + 3 + 1 + 4 + 2 + 1);
        assert_eq!(cigar.read_len(), 2 + 5 + 2 + 3 + 2 + 1);
        Ok(())
    }

    #[test]
    fn test_insertions_do_not_move_reference_length() -> Result<()> {
        let plain: Cigar = "10M".parse()?;
        let inserted: Cigar = "5M7I5M".parse()?;
        assert_eq!(plain.reference_len(), inserted.reference_len());

        let longer: Cigar = "5M3D5M".parse()?;
        assert!(longer.reference_len() > plain.reference_len());
        Ok(())
    }
}
