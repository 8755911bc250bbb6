// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! The input alphabet and its bucket geometry in BWT rank space.
//!
//! Sorted rotations group by first byte, so each distinct byte owns a
//! contiguous *bucket* of ranks. This module maps bytes to their symbol id
//! and bucket start (driving backward search), and ranks back to bytes
//! (driving extraction). A virtual terminator entry with byte value 0 marks
//! the end of the last bucket, mirroring the construction scan.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};

use crate::stream::{self, CrcReader, CrcWriter, MapCursor};
use crate::util::rank_leq;

/// Byte alphabet with bucket starts, built once during construction.
pub struct Alphabet {
    /// byte -> (bucket start rank, symbol id); includes the virtual
    /// terminator entry `0 -> (input_size, sigma)`.
    map: BTreeMap<u8, (u64, u32)>,
    /// symbol id -> byte, with `chars[sigma] == 0`.
    chars: Vec<u8>,
    /// Bucket start ranks for symbols `1..sigma` (symbol 0 starts at 0).
    bucket_starts: Vec<u64>,
    sigma: u32,
}

impl Alphabet {
    /// Assemble from the symbol map produced by the first SA scan.
    ///
    /// `map` holds every distinct input byte (sentinel included) with its
    /// bucket start and symbol id in sorted-rotation order.
    pub fn new(mut map: BTreeMap<u8, (u64, u32)>, input_size: u64) -> Self {
        let sigma = map.len() as u32;
        map.insert(0, (input_size, sigma));

        let mut chars = vec![0u8; sigma as usize + 1];
        let mut starts_by_id = vec![0u64; sigma as usize + 1];
        for (&byte, &(first, id)) in &map {
            chars[id as usize] = byte;
            starts_by_id[id as usize] = first;
        }
        let bucket_starts = starts_by_id[1..sigma as usize].to_vec();

        Self {
            map,
            chars,
            bucket_starts,
            sigma,
        }
    }

    /// Number of distinct symbols (sentinel included, terminator excluded).
    #[inline]
    pub fn sigma(&self) -> u32 {
        self.sigma
    }

    /// The byte for a symbol id.
    #[inline]
    pub fn char_of(&self, id: u32) -> u8 {
        self.chars[id as usize]
    }

    /// The symbol id for a byte, if the byte occurs in the input.
    #[inline]
    pub fn symbol_id(&self, byte: u8) -> Option<u32> {
        if byte == 0 {
            return None;
        }
        self.map.get(&byte).map(|&(_, id)| id)
    }

    /// Bucket `[sp, ep]` of ranks whose rotations start with `byte`.
    pub fn bucket(&self, byte: u8) -> Option<(i64, i64)> {
        if byte == 0 {
            return None;
        }
        let &(first, id) = self.map.get(&byte)?;
        let next = self.chars[id as usize + 1];
        let &(next_first, _) = self.map.get(&next)?;
        Some((first as i64, next_first as i64 - 1))
    }

    /// Symbol id of the bucket containing rank `i`.
    #[inline]
    pub fn lookup_c(&self, i: u64) -> u32 {
        rank_leq(&self.bucket_starts, i) as u32
    }

    pub fn storage_bytes(&self) -> u64 {
        8 + self.map.len() as u64 * (1 + 8 + 4) + 4 + self.chars.len() as u64
    }

    /// Persist: entry count, (byte, first, id) triples, sigma, symbol table.
    pub fn write<W: Write>(&self, out: &mut CrcWriter<W>) -> io::Result<()> {
        stream::write_u64(out, self.map.len() as u64)?;
        for (&byte, &(first, id)) in &self.map {
            stream::write_u8(out, byte)?;
            stream::write_u64(out, first)?;
            stream::write_u32(out, id)?;
        }
        stream::write_u32(out, self.sigma)?;
        for &c in &self.chars {
            stream::write_u8(out, c)?;
        }
        Ok(())
    }

    pub fn read<R: Read>(input: &mut CrcReader<R>) -> io::Result<Self> {
        let count = stream::read_u64(input)? as usize;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let byte = stream::read_u8(input)?;
            let first = stream::read_u64(input)?;
            let id = stream::read_u32(input)?;
            map.insert(byte, (first, id));
        }
        let sigma = stream::read_u32(input)?;
        if count != sigma as usize + 1 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("alphabet map has {} entries for sigma {}", count, sigma),
            ));
        }
        let mut chars = vec![0u8; sigma as usize + 1];
        for c in chars.iter_mut() {
            *c = stream::read_u8(input)?;
        }
        Self::from_loaded(map, chars, sigma)
    }

    pub fn map_load(cur: &mut MapCursor) -> io::Result<Self> {
        let count = cur.read_u64()? as usize;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let byte = cur.read_u8()?;
            let first = cur.read_u64()?;
            let id = cur.read_u32()?;
            map.insert(byte, (first, id));
        }
        let sigma = cur.read_u32()?;
        if count != sigma as usize + 1 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("alphabet map has {} entries for sigma {}", count, sigma),
            ));
        }
        let mut chars = vec![0u8; sigma as usize + 1];
        for c in chars.iter_mut() {
            *c = cur.read_u8()?;
        }
        Self::from_loaded(map, chars, sigma)
    }

    fn from_loaded(
        map: BTreeMap<u8, (u64, u32)>,
        chars: Vec<u8>,
        sigma: u32,
    ) -> io::Result<Self> {
        let mut starts_by_id = vec![0u64; sigma as usize + 1];
        for (_, &(first, id)) in &map {
            if id > sigma {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("alphabet symbol id {} out of range", id),
                ));
            }
            starts_by_id[id as usize] = first;
        }
        let bucket_starts = starts_by_id[1..sigma as usize].to_vec();
        Ok(Self {
            map,
            chars,
            bucket_starts,
            sigma,
        })
    }
}

impl std::fmt::Debug for Alphabet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Alphabet").field("sigma", &self.sigma).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // "banana" + sentinel: sorted rotations start with
    // sentinel(1), a, a, a, b, n, n -> buckets: 0x01 [0,0], 'a' [1,3],
    // 'b' [4,4], 'n' [5,6].
    fn banana_alphabet() -> Alphabet {
        let mut map = BTreeMap::new();
        map.insert(1u8, (0u64, 0u32));
        map.insert(b'a', (1, 1));
        map.insert(b'b', (4, 2));
        map.insert(b'n', (5, 3));
        Alphabet::new(map, 7)
    }

    #[test]
    fn buckets_cover_rank_space() {
        let a = banana_alphabet();
        assert_eq!(a.sigma(), 4);
        assert_eq!(a.bucket(1), Some((0, 0)));
        assert_eq!(a.bucket(b'a'), Some((1, 3)));
        assert_eq!(a.bucket(b'b'), Some((4, 4)));
        assert_eq!(a.bucket(b'n'), Some((5, 6)));
        assert_eq!(a.bucket(b'z'), None);
    }

    #[test]
    fn lookup_c_finds_owning_bucket() {
        let a = banana_alphabet();
        let expect = [0u32, 1, 1, 1, 2, 3, 3];
        for (i, &id) in expect.iter().enumerate() {
            assert_eq!(a.lookup_c(i as u64), id, "rank {}", i);
            assert_eq!(a.char_of(a.lookup_c(i as u64)), [1, b'a', b'b', b'n'][id as usize]);
        }
    }

    #[test]
    fn serialize_roundtrip() {
        let a = banana_alphabet();
        let mut buf = Vec::new();
        {
            let mut w = CrcWriter::new(&mut buf);
            a.write(&mut w).unwrap();
            w.finish().unwrap();
        }
        let mut r = CrcReader::new(&buf[..]);
        let back = Alphabet::read(&mut r).unwrap();
        r.finish().unwrap();

        assert_eq!(back.sigma(), a.sigma());
        for i in 0..7 {
            assert_eq!(back.lookup_c(i), a.lookup_c(i));
        }
        assert_eq!(back.bucket(b'n'), a.bucket(b'n'));
    }
}
