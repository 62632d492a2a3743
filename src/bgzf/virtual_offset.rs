use std::fmt;

/// A 64-bit address into a block-compressed stream.
///
/// The high 48 bits hold the byte offset of a block start within the
/// compressed file, the low 16 bits hold a byte offset within that block's
/// decompressed payload.
///
/// Ordering is by compressed offset first and intra-block offset second,
/// which is exactly the ordering of the packed `u64`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualOffset(u64);

impl VirtualOffset {
    /// Largest compressed offset representable in 48 bits
    pub const MAX_COMPRESSED_OFFSET: u64 = (1 << 48) - 1;

    /// Packs a compressed block offset and an intra-block offset
    ///
    /// Bits of `compressed` beyond the 48th are discarded.
    #[inline]
    #[must_use]
    pub fn new(compressed: u64, uncompressed: u16) -> Self {
        Self(((compressed & Self::MAX_COMPRESSED_OFFSET) << 16) | u64::from(uncompressed))
    }

    #[inline]
    #[must_use]
    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }

    #[inline]
    #[must_use]
    pub fn as_raw(self) -> u64 {
        self.0
    }

    /// Byte offset of the block start in the compressed file
    #[inline]
    #[must_use]
    pub fn compressed(self) -> u64 {
        self.0 >> 16
    }

    /// Byte offset within the decompressed block payload
    #[inline]
    #[must_use]
    pub fn uncompressed(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    #[inline]
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for VirtualOffset {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<VirtualOffset> for u64 {
    fn from(offset: VirtualOffset) -> Self {
        offset.0
    }
}

impl fmt::Display for VirtualOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.compressed(), self.uncompressed())
    }
}
