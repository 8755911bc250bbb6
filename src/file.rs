// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Flat-file query surface: the whole input is one document.
//!
//! `count` answers from the rank range alone — O(pattern length) binary
//! searches, no decoding, which is the point of searching compressed data.
//! `search` decodes every rank in the range back to a text offset, and
//! `extract` walks NPA links from an ISA entry to reproduce a substring.

use std::io;
use std::path::Path;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::SuccinctConfig;
use crate::core::SuccinctCore;

/// Query layer treating the indexed input as a flat byte sequence.
pub struct SuccinctFile {
    core: SuccinctCore,
}

impl SuccinctFile {
    /// Build from raw bytes.
    pub fn construct(input: &[u8], config: &SuccinctConfig) -> io::Result<Self> {
        Ok(Self {
            core: SuccinctCore::construct(input, config)?,
        })
    }

    /// Load a persisted index.
    pub fn load(dir: &Path, config: &SuccinctConfig) -> io::Result<Self> {
        Ok(Self {
            core: SuccinctCore::load(dir, config)?,
        })
    }

    /// Memory-map a persisted index.
    pub fn map(dir: &Path, config: &SuccinctConfig) -> io::Result<Self> {
        Ok(Self {
            core: SuccinctCore::map(dir, config)?,
        })
    }

    #[inline]
    pub fn core(&self) -> &SuccinctCore {
        &self.core
    }

    /// Size of the original input in bytes (sentinel excluded).
    pub fn len(&self) -> u64 {
        self.core.original_size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rank range of rotations prefixed by `pattern`; empty iff start > end.
    pub fn get_range(&self, pattern: &[u8]) -> (i64, i64) {
        self.core.bwd_search(pattern)
    }

    /// Number of occurrences of `pattern`. No decoding involved.
    pub fn count(&self, pattern: &[u8]) -> u64 {
        let (sp, ep) = self.get_range(pattern);
        (ep - sp + 1).max(0) as u64
    }

    /// Text offsets of every occurrence of `pattern`, unordered.
    pub fn search(&self, pattern: &[u8]) -> Vec<u64> {
        let (sp, ep) = self.get_range(pattern);
        if sp > ep {
            return Vec::new();
        }
        let ranks: Vec<u64> = (sp as u64..=ep as u64).collect();
        #[cfg(feature = "parallel")]
        {
            ranks.par_iter().map(|&i| self.core.lookup_sa(i)).collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            ranks.iter().map(|&i| self.core.lookup_sa(i)).collect()
        }
    }

    /// The `len` bytes starting at text offset `offset`.
    ///
    /// Walks NPA links from the ISA entry at `offset`; `offset + len` must
    /// stay within the original input.
    pub fn extract(&self, offset: u64, len: u64) -> Vec<u8> {
        debug_assert!(offset + len <= self.core.original_size());
        let mut out = Vec::with_capacity(len as usize);
        let mut idx = self.core.lookup_isa(offset);
        for _ in 0..len {
            out.push(self.core.alphabet().char_of(self.core.lookup_c(idx)));
            idx = self.core.lookup_npa(idx);
        }
        out
    }

    /// The byte at text offset `pos`.
    pub fn char_at(&self, pos: u64) -> u8 {
        self.core.char_at(pos)
    }

    /// Persist the index into `dir`.
    pub fn serialize(&self, dir: &Path) -> io::Result<u64> {
        self.core.serialize(dir)
    }

    pub fn storage_bytes(&self) -> u64 {
        self.core.storage_bytes()
    }
}

impl std::fmt::Debug for SuccinctFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuccinctFile")
            .field("len", &self.len())
            .finish()
    }
}
