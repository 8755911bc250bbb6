// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Rank/select dictionary over an immutable bitmap.
//!
//! Two-level counting: absolute ranks per 512-bit superblock plus per-word
//! ranks relative to the superblock, giving O(1) rank. Select binary-searches
//! the superblock ranks, then scans at most eight words.
//!
//! Conventions, held crate-wide:
//! - `rank1(i)` counts set bits in `[0, i]` — inclusive of position `i`.
//! - `select1(k)` returns the position of the `(k + 1)`-th set bit, so
//!   `select1(rank1(i) - 1) == i` whenever bit `i` is set.
//!
//! Only the bitmap is persisted; the counting directories are derived data
//! and are rebuilt on load.

use std::io::{self, Read, Write};

use crate::bits::{words_for, Bitmap};
use crate::stream::{CrcReader, CrcWriter, MapCursor};

const WORDS_PER_SUPER: usize = 8;
const SUPER_BITS: u64 = 512;

/// Immutable bitmap with O(1) rank and near-O(1) select.
pub struct Dictionary {
    bits: Bitmap,
    /// Set bits before each 512-bit superblock (exclusive), plus a final
    /// total entry.
    super_ranks: Vec<u64>,
    /// Set bits before each word, relative to its superblock.
    word_ranks: Vec<u16>,
    ones: u64,
}

impl Dictionary {
    pub fn new(bits: Bitmap) -> Self {
        let num_words = words_for(bits.size_bits());
        let num_supers = num_words.div_ceil(WORDS_PER_SUPER);
        let mut super_ranks = Vec::with_capacity(num_supers + 1);
        let mut word_ranks = Vec::with_capacity(num_words);

        // Slack bits past size_bits are zero in built dictionaries, so word
        // popcounts equal logical popcounts.
        let mut total = 0u64;
        for sb in 0..num_supers {
            super_ranks.push(total);
            let mut within = 0u16;
            for w in 0..WORDS_PER_SUPER {
                let idx = sb * WORDS_PER_SUPER + w;
                if idx >= num_words {
                    break;
                }
                word_ranks.push(within);
                within += word_at(&bits, idx).count_ones() as u16;
            }
            total += within as u64;
        }
        super_ranks.push(total);

        Self {
            bits,
            super_ranks,
            word_ranks,
            ones: total,
        }
    }

    /// Total number of bits.
    #[inline]
    pub fn size_bits(&self) -> u64 {
        self.bits.size_bits()
    }

    /// Total number of set bits.
    #[inline]
    pub fn ones(&self) -> u64 {
        self.ones
    }

    /// Test the bit at position `i`.
    #[inline]
    pub fn is_set(&self, i: u64) -> bool {
        self.bits.get_bit(i)
    }

    /// Count of set bits in `[0, i]`.
    pub fn rank1(&self, i: u64) -> u64 {
        debug_assert!(i < self.size_bits());
        let word_idx = (i / 64) as usize;
        let sb = word_idx / WORDS_PER_SUPER;
        let mut rank = self.super_ranks[sb] + self.word_ranks[word_idx] as u64;
        let word = word_at(&self.bits, word_idx);
        // MSB-first: positions 0..=i%64 are the top i%64+1 bits of the word.
        let keep = i % 64 + 1;
        let masked = if keep == 64 {
            word
        } else {
            word & !(u64::MAX >> keep)
        };
        rank += masked.count_ones() as u64;
        rank
    }

    /// Count of clear bits in `[0, i]`.
    #[inline]
    pub fn rank0(&self, i: u64) -> u64 {
        i + 1 - self.rank1(i)
    }

    /// Position of the `(k + 1)`-th set bit. `k` must be below [`Self::ones`].
    pub fn select1(&self, k: u64) -> u64 {
        debug_assert!(k < self.ones);
        let target = k + 1;
        // Last superblock with fewer than `target` ones before it.
        let sb = self.super_ranks.partition_point(|&r| r < target) - 1;
        let mut remaining = target - self.super_ranks[sb];

        let first = sb * WORDS_PER_SUPER;
        let last = (first + WORDS_PER_SUPER).min(self.word_ranks.len());
        let mut word_idx = first;
        for w in (first..last).rev() {
            if (self.word_ranks[w] as u64) < remaining {
                word_idx = w;
                break;
            }
        }
        remaining -= self.word_ranks[word_idx] as u64;

        word_idx as u64 * 64 + select_in_word(word_at(&self.bits, word_idx), remaining)
    }

    /// Position of the `(k + 1)`-th clear bit.
    pub fn select0(&self, k: u64) -> u64 {
        debug_assert!(k < self.size_bits() - self.ones);
        let target = k + 1;
        // Zeros before superblock s is s * 512 - super_ranks[s]; find the
        // last real superblock where that count stays below the target.
        let num_supers = self.super_ranks.len() - 1;
        let mut lo = 0usize;
        let mut hi = num_supers - 1;
        while lo < hi {
            let mid = (lo + hi + 1) / 2;
            let zeros_before = mid as u64 * SUPER_BITS - self.super_ranks[mid];
            if zeros_before < target {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        let sb = lo;
        let mut remaining = target - (sb as u64 * SUPER_BITS - self.super_ranks[sb]);

        let first = sb * WORDS_PER_SUPER;
        let last = (first + WORDS_PER_SUPER).min(self.word_ranks.len());
        let mut word_idx = first;
        for w in (first..last).rev() {
            let zeros_before = (w - first) as u64 * 64 - self.word_ranks[w] as u64;
            if zeros_before < remaining {
                word_idx = w;
                break;
            }
        }
        remaining -= (word_idx - first) as u64 * 64 - self.word_ranks[word_idx] as u64;

        word_idx as u64 * 64 + select_in_word(!word_at(&self.bits, word_idx), remaining)
    }

    pub fn storage_bytes(&self) -> u64 {
        self.bits.storage_bytes()
            + self.super_ranks.len() as u64 * 8
            + self.word_ranks.len() as u64 * 2
    }

    /// Persist as the raw bitmap; directories are rebuilt on load.
    pub fn write<W: Write>(out: &mut CrcWriter<W>, d: Option<&Dictionary>) -> io::Result<()> {
        Bitmap::write_opt(out, d.map(|d| &d.bits))
    }

    pub fn read<R: Read>(input: &mut CrcReader<R>) -> io::Result<Option<Dictionary>> {
        Ok(Bitmap::read_opt(input)?.map(Dictionary::new))
    }

    pub fn map(cur: &mut MapCursor) -> io::Result<Option<Dictionary>> {
        Ok(Bitmap::map_opt(cur)?.map(Dictionary::new))
    }
}

impl std::fmt::Debug for Dictionary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dictionary")
            .field("size_bits", &self.size_bits())
            .field("ones", &self.ones)
            .finish()
    }
}

#[inline]
fn word_at(bits: &Bitmap, idx: usize) -> u64 {
    bits.get_bits(idx as u64 * 64, 64)
}

/// MSB-first position of the `remaining`-th set bit in `word` (1-indexed).
#[inline]
fn select_in_word(word: u64, remaining: u64) -> u64 {
    debug_assert!(remaining >= 1);
    let mut seen = 0u64;
    for bit in 0..64 {
        if (word >> (63 - bit)) & 1 != 0 {
            seen += 1;
            if seen == remaining {
                return bit;
            }
        }
    }
    63
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict_from_bits(set: &[u64], size: u64) -> Dictionary {
        let mut b = Bitmap::new(size);
        for &p in set {
            b.set_bit(p);
        }
        Dictionary::new(b)
    }

    fn naive(set: &[u64], size: u64) -> Vec<bool> {
        let mut v = vec![false; size as usize];
        for &p in set {
            v[p as usize] = true;
        }
        v
    }

    #[test]
    fn rank_matches_naive_scan() {
        let size = 1500u64;
        // Deterministic pseudo-random pattern.
        let set: Vec<u64> = (0..size).filter(|i| (i * 2654435761) % 7 < 2).collect();
        let d = dict_from_bits(&set, size);
        let bits = naive(&set, size);

        let mut ones = 0u64;
        for i in 0..size {
            if bits[i as usize] {
                ones += 1;
            }
            assert_eq!(d.rank1(i), ones, "rank1({}) wrong", i);
            assert_eq!(d.rank0(i), i + 1 - ones, "rank0({}) wrong", i);
        }
        assert_eq!(d.ones(), ones);
    }

    #[test]
    fn select_inverts_rank() {
        let size = 2100u64;
        let set: Vec<u64> = (0..size).filter(|i| i % 5 == 0 || i % 17 == 3).collect();
        let d = dict_from_bits(&set, size);

        for (k, &pos) in set.iter().enumerate() {
            assert_eq!(d.select1(k as u64), pos, "select1({}) wrong", k);
            assert_eq!(d.rank1(pos), k as u64 + 1);
        }

        let zeros: Vec<u64> = (0..size).filter(|i| !set.contains(i)).collect();
        for (k, &pos) in zeros.iter().enumerate().step_by(13) {
            assert_eq!(d.select0(k as u64), pos, "select0({}) wrong", k);
        }
    }

    #[test]
    fn sparse_and_dense_extremes() {
        // Single bit at the very end.
        let d = dict_from_bits(&[1023], 1024);
        assert_eq!(d.select1(0), 1023);
        assert_eq!(d.rank1(1022), 0);
        assert_eq!(d.rank1(1023), 1);

        // All bits set.
        let all: Vec<u64> = (0..700).collect();
        let d = dict_from_bits(&all, 700);
        for i in (0..700).step_by(37) {
            assert_eq!(d.rank1(i), i + 1);
            assert_eq!(d.select1(i), i);
        }
    }

    #[test]
    fn serialize_rebuilds_directories() {
        let set: Vec<u64> = (0..900).filter(|i| i % 3 == 1).collect();
        let d = dict_from_bits(&set, 900);

        let mut buf = Vec::new();
        {
            let mut w = CrcWriter::new(&mut buf);
            Dictionary::write(&mut w, Some(&d)).unwrap();
            w.finish().unwrap();
        }
        let mut r = CrcReader::new(&buf[..]);
        let back = Dictionary::read(&mut r).unwrap().unwrap();
        r.finish().unwrap();

        assert_eq!(back.ones(), d.ones());
        for i in (0..900).step_by(11) {
            assert_eq!(back.rank1(i), d.rank1(i));
        }
        for k in (0..back.ones()).step_by(7) {
            assert_eq!(back.select1(k), d.select1(k));
        }
    }
}
