//! Hierarchical binning arithmetic over a single reference.
//!
//! Level `l` bins cover `2^(29 - 3l)` bases; bin ids start at the level
//! offset below and are numbered left to right.

/// `(shift, first bin id)` for each level, coarsest first, excluding the root bin 0
pub const LEVELS: [(u32, u32); 5] = [(26, 1), (23, 9), (20, 73), (17, 585), (14, 4681)];

/// Width of a linear index window in bits
pub const LINEAR_SHIFT: u32 = 14;

/// Id of the per-reference summary pseudo-bin
pub const METADATA_BIN: u32 = 37450;

/// Bin assigned to records without a position
pub const UNPLACED_BIN: u16 = 4680;

/// Lists every bin that may hold records overlapping the half-open `[begin, end)`.
///
/// Bin 0 is always present. An empty or inverted interval yields only bin 0.
/// The result is in ascending order.
#[must_use]
pub fn reg2bins(begin: u32, end: u32) -> Vec<u32> {
    let mut bins = vec![0];
    if begin >= end {
        return bins;
    }
    let last = end - 1;
    for (shift, offset) in LEVELS {
        bins.extend((offset + (begin >> shift))..=(offset + (last >> shift)));
    }
    bins
}

/// Computes the smallest single bin fully containing `[begin, end)`.
///
/// Zero-length intervals are treated as covering the single base at `begin`.
#[must_use]
pub fn reg2bin(begin: u32, end: u32) -> u32 {
    let last = end.max(begin.saturating_add(1)) - 1;
    for &(shift, offset) in LEVELS.iter().rev() {
        if begin >> shift == last >> shift {
            return offset + (begin >> shift);
        }
    }
    0
}

/// Half-open base interval `[start, end)` covered by a bin id
#[must_use]
pub fn bin_interval(bin: u32) -> Option<(u64, u64)> {
    if bin == 0 {
        return Some((0, 1 << 29));
    }
    for (i, &(shift, offset)) in LEVELS.iter().enumerate() {
        let count = 8u32.pow(i as u32 + 1);
        if (offset..offset + count).contains(&bin) {
            let start = u64::from(bin - offset) << shift;
            return Some((start, start + (1u64 << shift)));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every bin whose interval overlaps `[begin, end)`
    fn overlapping_bins(begin: u32, end: u32) -> Vec<u32> {
        (0..METADATA_BIN)
            .filter(|&bin| {
                let (s, e) = bin_interval(bin).unwrap();
                s < u64::from(end) && u64::from(begin) < e
            })
            .collect()
    }

    #[test]
    fn test_inverted_interval_is_root_only() {
        assert_eq!(reg2bins(100, 100), vec![0]);
        assert_eq!(reg2bins(500, 10), vec![0]);
    }

    #[test]
    fn test_small_interval_one_bin_per_level() {
        assert_eq!(reg2bins(0, 100), vec![0, 1, 9, 73, 585, 4681]);
        assert_eq!(reg2bins(16_384, 16_385), vec![0, 1, 9, 73, 585, 4682]);
    }

    #[test]
    fn test_window_boundary_spans_two_leaf_bins() {
        let bins = reg2bins(16_000, 17_000);
        assert!(bins.contains(&4681));
        assert!(bins.contains(&4682));
        assert!(!bins.contains(&4683));
    }

    #[test]
    fn test_reg2bins_covers_true_overlaps() {
        let cases = [
            (0, 1),
            (0, 16_384),
            (16_383, 16_385),
            (131_000, 140_000),
            (1_000_000, 9_000_000),
            (67_108_863, 67_108_865),
            (500_000_000, 536_870_912),
        ];
        for (begin, end) in cases {
            let bins = reg2bins(begin, end);
            assert_eq!(bins[0], 0);
            assert!(bins.windows(2).all(|w| w[0] < w[1]));
            for bin in overlapping_bins(begin, end) {
                assert!(
                    bins.binary_search(&bin).is_ok(),
                    "bin {bin} overlaps [{begin}, {end}) but is missing"
                );
            }
        }
    }

    #[test]
    fn test_reg2bin() {
        assert_eq!(reg2bin(0, 100), 4681);
        assert_eq!(reg2bin(16_384, 16_400), 4682);
        // straddles a leaf boundary, so lands one level up
        assert_eq!(reg2bin(16_000, 17_000), 585);
        assert_eq!(reg2bin(0, 1 << 29), 0);
        // zero-length intervals cover one base
        assert_eq!(reg2bin(10, 10), 4681);
    }

    #[test]
    fn test_reg2bin_is_a_reg2bins_member() {
        for (begin, end) in [(5, 90), (16_000, 17_000), (1 << 20, (1 << 20) + 300_000)] {
            assert!(reg2bins(begin, end).contains(&reg2bin(begin, end)));
        }
    }

    #[test]
    fn test_bin_interval() {
        assert_eq!(bin_interval(4681), Some((0, 16_384)));
        assert_eq!(bin_interval(4682), Some((16_384, 32_768)));
        assert_eq!(bin_interval(1), Some((0, 1 << 26)));
        assert_eq!(bin_interval(METADATA_BIN), None);
    }
}
