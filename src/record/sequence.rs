//! 4-bit nucleotide packing.
//!
//! Two bases share a byte, the first in the high nibble. An odd-length
//! sequence leaves the final low nibble zeroed.

use crate::{error::RecordError, Result};

/// The 16-symbol alphabet, indexed by 4-bit code
pub const ALPHABET: &[u8; 16] = b"=ACMGRSVTWYHKDBN";

const INVALID: u8 = 0xFF;

/// Maps an ASCII symbol to its 4-bit code, case-insensitively
const CODES: [u8; 256] = {
    let mut table = [INVALID; 256];
    let mut i = 0;
    while i < ALPHABET.len() {
        let symbol = ALPHABET[i];
        table[symbol as usize] = i as u8;
        table[symbol.to_ascii_lowercase() as usize] = i as u8;
        i += 1;
    }
    table
};

/// Number of packed bytes for `len` bases
#[inline]
#[must_use]
pub const fn packed_len(len: usize) -> usize {
    len.div_ceil(2)
}

/// Expands `len` bases from their packed form
#[must_use]
pub fn decode(packed: &[u8], len: usize) -> Vec<u8> {
    let mut bases = Vec::with_capacity(len);
    for &byte in packed {
        bases.push(ALPHABET[(byte >> 4) as usize]);
        bases.push(ALPHABET[(byte & 0x0F) as usize]);
    }
    bases.truncate(len);
    bases
}

/// Packs ASCII bases into `dst`
pub fn encode_into(bases: &[u8], dst: &mut Vec<u8>) -> Result<()> {
    let code = |base: u8| match CODES[base as usize] {
        INVALID => Err(RecordError::InvalidBase(base as char)),
        code => Ok(code),
    };
    for pair in bases.chunks(2) {
        let high = code(pair[0])?;
        let low = match pair.get(1) {
            Some(&base) => code(base)?,
            None => 0,
        };
        dst.push((high << 4) | low);
    }
    Ok(())
}
