// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Bit-packed storage: the primitive everything else is built on.
//!
//! A [`Bitmap`] is an array of 64-bit words addressed by *bit* offset, with
//! bits numbered from the most significant end of each word. Fixed-width
//! fields may straddle a word boundary; reads and writes mask and shift
//! across it. Writers assume zero-initialized storage and OR values in, so a
//! field must be written at most once — that is how every structure in this
//! crate uses it (built once, immutable afterwards; the opportunistic layers
//! guard single-writes with a presence bit).
//!
//! Word storage is either owned or a view into a shared memory map, so a
//! loaded index can serve queries straight out of the mapped file. Reads past
//! the final word yield zero: decoders are allowed to read a full 16- or
//! 64-bit window near the end of a stream and rely on zero padding.

use std::io::{self, Read, Write};
use std::sync::Arc;

use memmap2::Mmap;

use crate::stream::{self, CrcReader, CrcWriter, MapCursor};

/// Number of 64-bit words needed for `bits` bits.
#[inline]
pub(crate) fn words_for(bits: u64) -> usize {
    bits.div_ceil(64) as usize
}

/// Backing storage for a [`Bitmap`]: owned words or a view into a mapped file.
pub(crate) enum Words {
    Owned(Vec<u64>),
    Mapped {
        map: Arc<Mmap>,
        byte_off: usize,
        words: usize,
    },
}

impl Words {
    #[inline]
    fn get(&self, i: usize) -> u64 {
        match self {
            Words::Owned(v) => v.get(i).copied().unwrap_or(0),
            Words::Mapped {
                map,
                byte_off,
                words,
            } => {
                if i >= *words {
                    return 0;
                }
                let at = byte_off + i * 8;
                u64::from_le_bytes(map[at..at + 8].try_into().expect("8-byte slice"))
            }
        }
    }

    fn len(&self) -> usize {
        match self {
            Words::Owned(v) => v.len(),
            Words::Mapped { words, .. } => *words,
        }
    }
}

/// Bit-packed array of 64-bit words, MSB-first within each word.
pub struct Bitmap {
    words: Words,
    size_bits: u64,
}

impl Bitmap {
    /// Zero-initialized bitmap of `size_bits` bits. `size_bits` must be > 0.
    pub fn new(size_bits: u64) -> Self {
        debug_assert!(size_bits > 0);
        Self {
            words: Words::Owned(vec![0u64; words_for(size_bits)]),
            size_bits,
        }
    }

    /// Bitmap of `size_bits` bits with every bit set.
    pub fn new_set(size_bits: u64) -> Self {
        debug_assert!(size_bits > 0);
        Self {
            words: Words::Owned(vec![u64::MAX; words_for(size_bits)]),
            size_bits,
        }
    }

    /// Pack `values` as consecutive `width`-bit fields. Returns `None` for an
    /// empty input (the serialized form uses a zero-size sentinel for that).
    pub fn from_values(values: &[u64], width: u32) -> Option<Self> {
        if values.is_empty() || width == 0 {
            return None;
        }
        let mut b = Bitmap::new(values.len() as u64 * width as u64);
        for (i, &v) in values.iter().enumerate() {
            b.set_field(i as u64, width, v);
        }
        Some(b)
    }

    #[inline]
    pub fn size_bits(&self) -> u64 {
        self.size_bits
    }

    #[inline]
    fn word(&self, i: usize) -> u64 {
        self.words.get(i)
    }

    /// Test the bit at `pos`.
    #[inline]
    pub fn get_bit(&self, pos: u64) -> bool {
        (self.word((pos / 64) as usize) >> (63 - pos % 64)) & 1 != 0
    }

    /// Set the bit at `pos`.
    #[inline]
    pub fn set_bit(&mut self, pos: u64) {
        match &mut self.words {
            Words::Owned(v) => v[(pos / 64) as usize] |= 1u64 << (63 - pos % 64),
            Words::Mapped { .. } => unreachable!("mapped bitmaps are read-only"),
        }
    }

    /// Read `width` bits starting at bit offset `pos`. `width` in `0..=64`.
    #[inline]
    pub fn get_bits(&self, pos: u64, width: u32) -> u64 {
        if width == 0 {
            return 0;
        }
        let s = pos;
        let e = pos + width as u64 - 1;
        let (sw, ew) = ((s / 64) as usize, (e / 64) as usize);
        let (s_off, e_off) = (s % 64, e % 64);
        if sw == ew {
            (self.word(sw) << s_off) >> (63 - e_off + s_off)
        } else {
            let hi = self.word(sw) << s_off;
            let lo = self.word(ew) >> (63 - e_off);
            (hi >> (s_off - (e_off + 1))) | lo
        }
    }

    /// OR `value` into the `width` bits starting at bit offset `pos`.
    ///
    /// The target bits must currently be zero for the result to equal
    /// `value`; that invariant is held by all builders.
    #[inline]
    pub fn set_bits(&mut self, pos: u64, width: u32, value: u64) {
        if width == 0 {
            return;
        }
        let s = pos;
        let e = pos + width as u64 - 1;
        let (sw, ew) = ((s / 64) as usize, (e / 64) as usize);
        let e_off = e % 64;
        let words = match &mut self.words {
            Words::Owned(v) => v,
            Words::Mapped { .. } => unreachable!("mapped bitmaps are read-only"),
        };
        if sw == ew {
            words[sw] |= value << (63 - e_off);
        } else {
            words[sw] |= value >> (e_off + 1);
            words[ew] |= value << (63 - e_off);
        }
    }

    /// Read the `i`-th `width`-bit field.
    #[inline]
    pub fn get_field(&self, i: u64, width: u32) -> u64 {
        self.get_bits(i * width as u64, width)
    }

    /// Write the `i`-th `width`-bit field (must currently be zero).
    #[inline]
    pub fn set_field(&mut self, i: u64, width: u32, value: u64) {
        self.set_bits(i * width as u64, width, value);
    }

    /// Reset every bit to zero. Only valid for owned storage.
    pub fn clear(&mut self) {
        match &mut self.words {
            Words::Owned(v) => v.fill(0),
            Words::Mapped { .. } => unreachable!("mapped bitmaps are read-only"),
        }
    }

    /// Number of set bits among the first `size_bits` bits.
    pub fn count_ones(&self) -> u64 {
        let n = self.words.len();
        if n == 0 {
            return 0;
        }
        let mut ones = 0u64;
        for i in 0..n - 1 {
            ones += self.word(i).count_ones() as u64;
        }
        // Mask slack bits in the last word (new_set leaves them set).
        let rem = self.size_bits - (n as u64 - 1) * 64;
        let mask = if rem == 64 { u64::MAX } else { !(u64::MAX >> rem) };
        ones + (self.word(n - 1) & mask).count_ones() as u64
    }

    /// Bytes occupied by the serialized form.
    pub fn storage_bytes(&self) -> u64 {
        8 + self.words.len() as u64 * 8
    }

    /// Serialized size of an optional bitmap (absent ones cost the sentinel).
    pub fn storage_bytes_opt(b: Option<&Bitmap>) -> u64 {
        b.map_or(8, Bitmap::storage_bytes)
    }

    /// Write `size_bits` then the raw words. An absent bitmap is written as a
    /// single zero size so readers can distinguish it.
    pub fn write_opt<W: Write>(out: &mut CrcWriter<W>, b: Option<&Bitmap>) -> io::Result<()> {
        match b {
            None => stream::write_u64(out, 0),
            Some(b) => {
                stream::write_u64(out, b.size_bits)?;
                for i in 0..b.words.len() {
                    stream::write_u64(out, b.word(i))?;
                }
                Ok(())
            }
        }
    }

    /// Read a bitmap written by [`Bitmap::write_opt`].
    pub fn read_opt<R: Read>(input: &mut CrcReader<R>) -> io::Result<Option<Bitmap>> {
        let size_bits = stream::read_u64(input)?;
        if size_bits == 0 {
            return Ok(None);
        }
        let n = words_for(size_bits);
        let mut words = Vec::with_capacity(n);
        for _ in 0..n {
            words.push(stream::read_u64(input)?);
        }
        Ok(Some(Bitmap {
            words: Words::Owned(words),
            size_bits,
        }))
    }

    /// Map a bitmap out of a mapped section without copying the words.
    pub fn map_opt(cur: &mut MapCursor) -> io::Result<Option<Bitmap>> {
        let size_bits = cur.read_u64()?;
        if size_bits == 0 {
            return Ok(None);
        }
        let n = words_for(size_bits);
        let (map, byte_off) = cur.take_words(n)?;
        Ok(Some(Bitmap {
            words: Words::Mapped {
                map,
                byte_off,
                words: n,
            },
            size_bits,
        }))
    }

    /// Like [`Bitmap::map_opt`] but copies the words into owned storage, for
    /// structures that are mutated after load (layer data).
    pub fn map_opt_owned(cur: &mut MapCursor) -> io::Result<Option<Bitmap>> {
        let mapped = Bitmap::map_opt(cur)?;
        Ok(mapped.map(|b| {
            let n = b.words.len();
            let mut words = Vec::with_capacity(n);
            for i in 0..n {
                words.push(b.word(i));
            }
            Bitmap {
                words: Words::Owned(words),
                size_bits: b.size_bits,
            }
        }))
    }
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("size_bits", &self.size_bits)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_bit_roundtrip() {
        let mut b = Bitmap::new(130);
        b.set_bit(0);
        b.set_bit(63);
        b.set_bit(64);
        b.set_bit(129);
        assert!(b.get_bit(0));
        assert!(b.get_bit(63));
        assert!(b.get_bit(64));
        assert!(b.get_bit(129));
        assert!(!b.get_bit(1));
        assert!(!b.get_bit(128));
        assert_eq!(b.count_ones(), 4);
    }

    #[test]
    fn field_straddles_word_boundary() {
        let mut b = Bitmap::new(256);
        // A 20-bit field starting at bit 54 crosses into the second word.
        b.set_bits(54, 20, 0xABCDE);
        assert_eq!(b.get_bits(54, 20), 0xABCDE);
        // Neighbors untouched.
        assert_eq!(b.get_bits(0, 54), 0);
        assert_eq!(b.get_bits(74, 64), 0);
    }

    #[test]
    fn full_width_fields() {
        let mut b = Bitmap::new(192);
        b.set_bits(0, 64, u64::MAX);
        b.set_bits(64, 64, 0x0123_4567_89AB_CDEF);
        assert_eq!(b.get_bits(0, 64), u64::MAX);
        assert_eq!(b.get_bits(64, 64), 0x0123_4567_89AB_CDEF);
        // Unaligned 64-bit read across the boundary.
        b.set_bits(130, 64, 0xDEAD_BEEF_CAFE_F00D);
        assert_eq!(b.get_bits(130, 64), 0xDEAD_BEEF_CAFE_F00D);
    }

    #[test]
    fn fixed_width_array() {
        let values: Vec<u64> = (0..100).map(|i| i * 37 % 1000).collect();
        let b = Bitmap::from_values(&values, 10).unwrap();
        for (i, &v) in values.iter().enumerate() {
            assert_eq!(b.get_field(i as u64, 10), v);
        }
    }

    #[test]
    fn reads_past_end_are_zero() {
        let mut b = Bitmap::new(40);
        b.set_bits(0, 40, (1 << 40) - 1);
        // A 16-bit window read at the tail sees zero padding.
        assert_eq!(b.get_bits(40, 16), 0);
        assert_eq!(b.get_bits(100, 64), 0);
    }

    #[test]
    fn empty_input_has_no_bitmap() {
        assert!(Bitmap::from_values(&[], 5).is_none());
    }

    #[test]
    fn serialize_roundtrip() {
        let values: Vec<u64> = (0..50).map(|i| i * i).collect();
        let b = Bitmap::from_values(&values, 12).unwrap();

        let mut buf = Vec::new();
        {
            let mut w = CrcWriter::new(&mut buf);
            Bitmap::write_opt(&mut w, Some(&b)).unwrap();
            Bitmap::write_opt(&mut w, None).unwrap();
            w.finish().unwrap();
        }

        let mut r = CrcReader::new(&buf[..]);
        let back = Bitmap::read_opt(&mut r).unwrap().unwrap();
        assert!(Bitmap::read_opt(&mut r).unwrap().is_none());
        r.finish().unwrap();

        assert_eq!(back.size_bits(), b.size_bits());
        for (i, &v) in values.iter().enumerate() {
            assert_eq!(back.get_field(i as u64, 12), v);
        }
    }
}
