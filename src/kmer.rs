//! Canonical integer indices for bases and k-mers, and the skip-bin lookup
//! that ties two adjacent k-mers' expected currents to a learned
//! skip-probability table.

use crate::error::{HmmError, Result};
use crate::pore_model::PoreModel;

/// Length, in bases, of the k-mers this crate indexes. A build-time constant
/// because every table shaped by `NUM_OF_KMERS` is sized at compile time.
pub const KMER_LENGTH: usize = 6;

/// Number of distinct symbols in the nucleotide alphabet (A, C, G, T); `N` is
/// handled separately as an out-of-range sentinel, not a fifth symbol.
pub const SYMBOL_NUMBER: usize = 4;

/// Symbol-set size `S = SYMBOL_NUMBER ^ KMER_LENGTH`: the number of distinct
/// k-mers, and therefore the size of every per-k-mer table.
#[must_use]
pub const fn num_of_kmers() -> usize {
    SYMBOL_NUMBER.pow(KMER_LENGTH as u32)
}

/// Number of skip-probability bins per group (alpha/open, beta/extend).
pub const NUM_SKIP_BINS: usize = 30;

/// Width, in pA, of one skip bin.
pub const SKIP_BIN_WIDTH: f64 = 0.5;

/// Maps a nucleotide base to its canonical index. `N` (and anything else
/// unrecognized) maps to the out-of-range sentinel `SYMBOL_NUMBER`, which
/// emission functions treat as "uniform distribution" rather than a lookup.
#[must_use]
pub const fn base_index(b: u8) -> usize {
    match b {
        b'A' | b'a' => 0,
        b'C' | b'c' => 1,
        b'G' | b'g' => 2,
        b'T' | b't' => 3,
        _ => SYMBOL_NUMBER,
    }
}

/// Returns `true` if `index` is the out-of-range sentinel produced by
/// [`base_index`] for an unrecognized base (conventionally `N`).
#[must_use]
pub const fn is_n(index: usize) -> bool {
    index >= SYMBOL_NUMBER
}

/// Computes the canonical index of a k-mer: positional base-`SYMBOL_NUMBER`
/// encoding with the leftmost base as the most significant digit.
///
/// # Errors
///
/// Returns [`HmmError::IndexOutOfRange`] if `kmer.len() != KMER_LENGTH`, and
/// treats any base that isn't `A`/`C`/`G`/`T` (e.g. `N`) as index 0 so the
/// k-mer as a whole still resolves to *some* index inside `0..num_of_kmers()`
/// (callers that need to detect an `N` inside a k-mer should check the bases
/// directly; the index itself can't represent "contains N").
pub fn kmer_index(kmer: &[u8]) -> Result<usize> {
    if kmer.len() != KMER_LENGTH {
        return Err(HmmError::IndexOutOfRange {
            what: "kmer length",
            value: kmer.len() as i64,
            bound: (KMER_LENGTH + 1) as i64,
        });
    }

    let mut index = 0usize;
    for &b in kmer {
        let digit = base_index(b);
        let digit = if is_n(digit) { 0 } else { digit };
        index = index * SYMBOL_NUMBER + digit;
    }
    Ok(index)
}

/// Inverse of [`kmer_index`]: reconstructs the canonical k-mer string for a
/// given index. Used by round-trip tests (`kmer_index(kmer_from_index(i)) ==
/// i`) and by the HDP assignment writer, which stores k-mer strings rather
/// than indices on disk.
#[must_use]
pub fn kmer_from_index(mut index: usize) -> Vec<u8> {
    const BASES: [u8; SYMBOL_NUMBER] = [b'A', b'C', b'G', b'T'];
    let mut out = vec![0u8; KMER_LENGTH];
    for slot in out.iter_mut().rev() {
        *slot = BASES[index % SYMBOL_NUMBER];
        index /= SYMBOL_NUMBER;
    }
    out
}

/// Bins the absolute difference in expected current between two adjacent
/// k-mers into `0..NUM_SKIP_BINS`, clamping at the top bin. Monotone
/// non-decreasing in the magnitude of the difference by construction.
#[must_use]
pub fn skip_bin(delta_level: f64) -> usize {
    let bin = (delta_level.abs() / SKIP_BIN_WIDTH) as i64;
    bin.clamp(0, (NUM_SKIP_BINS - 1) as i64) as usize
}

/// Computes the skip bin for a pair of adjacent k-mers given a pore model:
/// `Δ = |E[level | k_i] − E[level | k_{i-1}]|`, binned by [`SKIP_BIN_WIDTH`]
/// pA and clamped to `[0, NUM_SKIP_BINS)`.
///
/// # Errors
///
/// Propagates [`HmmError::IndexOutOfRange`] from [`kmer_index`] if either
/// k-mer is malformed.
pub fn skip_bin_for_kmers(prev_kmer: &[u8], kmer: &[u8], model: &PoreModel) -> Result<usize> {
    let prev_index = kmer_index(prev_kmer)?;
    let index = kmer_index(kmer)?;
    let delta = (model.level_mean(index) - model.level_mean(prev_index)).abs();
    Ok(skip_bin(delta))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_index_known_letters() {
        assert_eq!(base_index(b'A'), 0);
        assert_eq!(base_index(b'C'), 1);
        assert_eq!(base_index(b'G'), 2);
        assert_eq!(base_index(b'T'), 3);
        assert_eq!(base_index(b'N'), SYMBOL_NUMBER);
        assert_eq!(base_index(b'x'), SYMBOL_NUMBER);
    }

    #[test]
    fn kmer_index_round_trips() {
        for i in [0, 1, 42, 1000, num_of_kmers() - 1] {
            let kmer = kmer_from_index(i);
            assert_eq!(kmer_index(&kmer).unwrap(), i);
        }
    }

    #[test]
    fn kmer_index_rejects_wrong_length() {
        assert!(kmer_index(b"ACGT").is_err());
        assert!(kmer_index(b"ACGTACG").is_err());
    }

    #[test]
    fn skip_bin_boundaries() {
        // S3: literal boundary scenario from the spec.
        let cases = [
            (0.0, 0),
            (0.49, 0),
            (0.5, 1),
            (14.99, 29),
            (15.0, 29),
            (1000.0, 29),
        ];
        for (delta, expected) in cases {
            assert_eq!(skip_bin(delta), expected, "delta = {delta}");
        }
    }

    #[test]
    fn skip_bin_is_monotone() {
        let mut prev = skip_bin(0.0);
        for i in 1..2000 {
            let delta = f64::from(i) * 0.1;
            let bin = skip_bin(delta);
            assert!(bin >= prev);
            prev = bin;
        }
        assert_eq!(prev, NUM_SKIP_BINS - 1);
    }
}
