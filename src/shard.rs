// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Key-value query surface over newline-delimited records.
//!
//! Construction treats each input line as one record; keys are the line
//! ordinals and value offsets the line start positions. Lookups binary
//! search the sorted key array, decode from the record's offset, and stop
//! before the delimiter. A bitmap of invalidated offsets supports logical
//! deletes: the record text stays in the compressed index but is no longer
//! reachable by key or search.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read};
use std::path::Path;

use crate::bits::Bitmap;
use crate::config::SuccinctConfig;
use crate::core::SuccinctCore;
use crate::stream::{self, CrcReader, CrcWriter, MapCursor};

const RECORD_DELIM: u8 = b'\n';

/// Key-value layer over the core: sorted keys, value offsets, and a
/// logical-delete bitmap.
pub struct SuccinctShard {
    core: SuccinctCore,
    keys: Vec<i64>,
    value_offsets: Vec<i64>,
    invalid_offsets: Bitmap,
}

impl SuccinctShard {
    /// Build from newline-delimited records. Record `i` gets key `i`.
    pub fn construct(input: &[u8], config: &SuccinctConfig) -> io::Result<Self> {
        let core = SuccinctCore::construct(input, config)?;

        let mut keys = Vec::new();
        let mut value_offsets = Vec::new();
        keys.push(0);
        value_offsets.push(0);
        for (pos, &b) in input.iter().enumerate() {
            if b == RECORD_DELIM {
                keys.push(keys.len() as i64);
                value_offsets.push(pos as i64 + 1);
            }
        }
        let invalid_offsets = Bitmap::new(keys.len() as u64);

        Ok(Self {
            core,
            keys,
            value_offsets,
            invalid_offsets,
        })
    }

    #[inline]
    pub fn core(&self) -> &SuccinctCore {
        &self.core
    }

    pub fn num_keys(&self) -> usize {
        self.keys.len()
    }

    pub fn sa_sampling_rate(&self) -> u32 {
        self.core.sa().sampling_rate()
    }

    pub fn isa_sampling_rate(&self) -> u32 {
        self.core.isa().sampling_rate()
    }

    /// Index of `key` in the offset arrays, or `None` when the key is absent
    /// or invalidated.
    pub fn value_offset_pos(&self, key: i64) -> Option<usize> {
        let pos = self.keys.binary_search(&key).ok()?;
        if self.invalid_offsets.get_bit(pos as u64) {
            return None;
        }
        Some(pos)
    }

    /// Record index owning text offset `offset`, or `None` if the owning
    /// record was invalidated.
    pub fn key_pos(&self, offset: i64) -> Option<usize> {
        let pos = match self.value_offsets.binary_search(&offset) {
            Ok(p) => p,
            Err(0) => return None,
            Err(p) => p - 1,
        };
        if self.invalid_offsets.get_bit(pos as u64) {
            return None;
        }
        Some(pos)
    }

    /// Start offset of record `pos`'s value.
    pub(crate) fn value_offset_at(&self, pos: usize) -> u64 {
        self.value_offsets[pos] as u64
    }

    /// Byte range `[start, end)` of a record's value, delimiter included.
    fn value_bounds(&self, pos: usize) -> (u64, u64) {
        let start = self.value_offsets[pos] as u64;
        let end = if pos + 1 < self.value_offsets.len() {
            self.value_offsets[pos + 1] as u64
        } else {
            self.core.input_size()
        };
        (start, end)
    }

    /// The full value of `key`, or `None` when absent/invalidated.
    pub fn get(&self, key: i64) -> Option<Vec<u8>> {
        let pos = self.value_offset_pos(key)?;
        let (start, end) = self.value_bounds(pos);
        Some(self.extract_value(start, end - start - 1))
    }

    /// Up to `len` bytes of `key`'s value starting at `offset` within it.
    pub fn access(&self, key: i64, offset: u64, len: u64) -> Option<Vec<u8>> {
        let pos = self.value_offset_pos(key)?;
        let (start, end) = self.value_bounds(pos);
        let start = start + offset;
        if start >= end {
            return Some(Vec::new());
        }
        let len = len.min(end - start - 1);
        Some(self.extract_value(start, len))
    }

    /// Decode `len` bytes from text offset `start`, re-anchoring through the
    /// ISA whenever the next position is sampled to keep hop chains short.
    fn extract_value(&self, start: u64, len: u64) -> Vec<u8> {
        let mut out = Vec::with_capacity(len as usize);
        if len == 0 {
            return out;
        }
        let mut idx = self.core.lookup_isa(start);
        for i in 0..len {
            out.push(self.core.alphabet().char_of(self.core.lookup_c(idx)));
            let next_pos = start + i + 1;
            if self.core.isa().is_sampled(next_pos) {
                idx = self.core.lookup_isa(next_pos);
            } else {
                idx = self.core.lookup_npa(idx);
            }
        }
        out
    }

    /// Keys whose records contain `pattern`, deduplicated.
    pub fn search(&self, pattern: &[u8]) -> BTreeSet<i64> {
        let mut result = BTreeSet::new();
        let (sp, ep) = self.core.bwd_search(pattern);
        if sp > ep {
            return result;
        }
        for i in sp as u64..=ep as u64 {
            let offset = self.core.lookup_sa(i) as i64;
            if let Some(pos) = self.key_pos(offset) {
                result.insert(self.keys[pos]);
            }
        }
        result
    }

    /// Number of distinct keys whose records contain `pattern`.
    pub fn count(&self, pattern: &[u8]) -> u64 {
        self.search(pattern).len() as u64
    }

    /// Occurrence count ignoring record boundaries.
    pub fn flat_count(&self, pattern: &[u8]) -> u64 {
        let (sp, ep) = self.core.bwd_search(pattern);
        (ep - sp + 1).max(0) as u64
    }

    /// Raw text offsets of every occurrence, ignoring record boundaries.
    pub fn flat_search(&self, pattern: &[u8]) -> Vec<u64> {
        let (sp, ep) = self.core.bwd_search(pattern);
        if sp > ep {
            return Vec::new();
        }
        (sp as u64..=ep as u64)
            .map(|i| self.core.lookup_sa(i))
            .collect()
    }

    /// Raw substring extraction ignoring record boundaries.
    pub fn flat_extract(&self, offset: u64, len: u64) -> Vec<u8> {
        let mut out = Vec::with_capacity(len as usize);
        let mut idx = self.core.lookup_isa(offset);
        for _ in 0..len {
            out.push(self.core.alphabet().char_of(self.core.lookup_c(idx)));
            idx = self.core.lookup_npa(idx);
        }
        out
    }

    /// Logically delete a key. Returns whether the key existed and was live.
    pub fn invalidate(&mut self, key: i64) -> bool {
        match self.keys.binary_search(&key) {
            Ok(pos) if !self.invalid_offsets.get_bit(pos as u64) => {
                self.invalid_offsets.set_bit(pos as u64);
                true
            }
            _ => false,
        }
    }

    pub fn storage_bytes(&self) -> u64 {
        self.core.storage_bytes()
            + 8
            + self.keys.len() as u64 * 8
            + 8
            + self.value_offsets.len() as u64 * 8
            + self.invalid_offsets.storage_bytes()
    }

    /// Persist core sections plus the `keyval` section.
    pub fn serialize(&self, dir: &Path) -> io::Result<u64> {
        let mut total = self.core.serialize(dir)?;

        let mut out = CrcWriter::new(BufWriter::new(File::create(dir.join("keyval"))?));
        stream::write_u64(&mut out, self.keys.len() as u64)?;
        for &k in &self.keys {
            stream::write_i64(&mut out, k)?;
        }
        stream::write_u64(&mut out, self.value_offsets.len() as u64)?;
        for &v in &self.value_offsets {
            stream::write_i64(&mut out, v)?;
        }
        Bitmap::write_opt(&mut out, Some(&self.invalid_offsets))?;
        total += out.finish()?;

        Ok(total)
    }

    pub fn load(dir: &Path, config: &SuccinctConfig) -> io::Result<Self> {
        let core = SuccinctCore::load(dir, config)?;
        let mut input = CrcReader::new(BufReader::new(File::open(dir.join("keyval"))?));
        let (keys, value_offsets, invalid_offsets) = read_keyval(&mut input)?;
        input.finish()?;
        Ok(Self {
            core,
            keys,
            value_offsets,
            invalid_offsets,
        })
    }

    pub fn map(dir: &Path, config: &SuccinctConfig) -> io::Result<Self> {
        let core = SuccinctCore::map(dir, config)?;
        let mut cur = MapCursor::open(&dir.join("keyval"))?;
        let keys = cur.read_vec_i64()?;
        let count = cur.read_u64()? as usize;
        if count != keys.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} keys but {} value offsets", keys.len(), count),
            ));
        }
        let mut value_offsets = Vec::with_capacity(count);
        for _ in 0..count {
            value_offsets.push(cur.read_i64()?);
        }
        // The invalid bitmap is mutated by invalidate(), so it is owned even
        // on the mapped path.
        let invalid_offsets = Bitmap::map_opt_owned(&mut cur)?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "keyval missing invalid bitmap")
        })?;
        Ok(Self {
            core,
            keys,
            value_offsets,
            invalid_offsets,
        })
    }
}

fn read_keyval<R: Read>(
    input: &mut CrcReader<R>,
) -> io::Result<(Vec<i64>, Vec<i64>, Bitmap)> {
    let key_count = stream::read_u64(input)? as usize;
    let mut keys = Vec::with_capacity(key_count.min(1 << 20));
    for _ in 0..key_count {
        keys.push(stream::read_i64(input)?);
    }
    let offset_count = stream::read_u64(input)? as usize;
    if offset_count != key_count {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} keys but {} value offsets", key_count, offset_count),
        ));
    }
    let mut value_offsets = Vec::with_capacity(offset_count.min(1 << 20));
    for _ in 0..offset_count {
        value_offsets.push(stream::read_i64(input)?);
    }
    let invalid_offsets = Bitmap::read_opt(input)?.ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "keyval missing invalid bitmap")
    })?;
    Ok((keys, value_offsets, invalid_offsets))
}

impl std::fmt::Debug for SuccinctShard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuccinctShard")
            .field("num_keys", &self.num_keys())
            .finish()
    }
}
