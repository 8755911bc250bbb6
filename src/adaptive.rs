// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! The adaptive shard: trade compression for latency while serving queries.
//!
//! A shard built with layered sampling can drop sampling layers to shed
//! memory (hop chains get longer) or rebuild them to speed queries back up,
//! concurrently with readers. In opportunistic mode a rebuilt layer starts
//! empty and fills from values the query path computes anyway; `get` and
//! `access` offer every ISA value they derive to pending layers.
//!
//! Both layer operations are idempotent: removing an absent layer and
//! rebuilding a present one are benign no-ops reporting zero bytes.

use std::collections::BTreeSet;
use std::io;
use std::path::Path;

use crate::config::SuccinctConfig;
use crate::shard::SuccinctShard;

/// A [`SuccinctShard`] with runtime layer management.
pub struct AdaptiveShard {
    shard: SuccinctShard,
    opportunistic: bool,
}

impl AdaptiveShard {
    /// Build with layered (or opportunistic-layered) sampling on SA and ISA.
    ///
    /// `sampling_range` and the rates come from `config`; its sampling
    /// schemes are overridden to the layered variants.
    pub fn construct(
        input: &[u8],
        config: &SuccinctConfig,
        opportunistic: bool,
    ) -> io::Result<Self> {
        let layered = SuccinctConfig {
            sa_sampling_scheme: if opportunistic {
                crate::sampled::SamplingScheme::OpportunisticLayeredByIndex
            } else {
                crate::sampled::SamplingScheme::LayeredByIndex
            },
            isa_sampling_scheme: if opportunistic {
                crate::sampled::SamplingScheme::OpportunisticLayeredByIndex
            } else {
                crate::sampled::SamplingScheme::LayeredByIndex
            },
            ..config.clone()
        };
        Ok(Self {
            shard: SuccinctShard::construct(input, &layered)?,
            opportunistic,
        })
    }

    pub fn load(dir: &Path, config: &SuccinctConfig, opportunistic: bool) -> io::Result<Self> {
        Ok(Self {
            shard: SuccinctShard::load(dir, config)?,
            opportunistic,
        })
    }

    #[inline]
    pub fn shard(&self) -> &SuccinctShard {
        &self.shard
    }

    pub fn is_opportunistic(&self) -> bool {
        self.opportunistic
    }

    /// Drop sampling layer `layer_id` from both SA and ISA. Returns the
    /// bits freed (zero when already absent or when it is the last layer).
    pub fn remove_layer(&self, layer_id: u32) -> u64 {
        self.shard.core().remove_layer(layer_id)
    }

    /// Rebuild sampling layer `layer_id` on both SA and ISA. Returns the
    /// bits allocated (zero when the layer already exists).
    pub fn reconstruct_layer(&self, layer_id: u32) -> u64 {
        self.shard.core().reconstruct_layer(layer_id)
    }

    /// Materialized sample count (opportunistic mode).
    pub fn num_sampled_values(&self) -> u64 {
        self.shard.core().num_sampled_values()
    }

    pub fn storage_bytes(&self) -> u64 {
        self.shard.storage_bytes()
    }

    pub fn num_keys(&self) -> usize {
        self.shard.num_keys()
    }

    /// Key lookup; in opportunistic mode every ISA value computed along the
    /// way is offered to pending layers.
    pub fn get(&self, key: i64) -> Option<Vec<u8>> {
        if !self.opportunistic {
            return self.shard.get(key);
        }
        let pos = self.shard.value_offset_pos(key)?;
        Some(self.extract_storing(pos, 0, u64::MAX))
    }

    /// Ranged value read; same store-on-read behavior as [`Self::get`].
    pub fn access(&self, key: i64, offset: u64, len: u64) -> Option<Vec<u8>> {
        if !self.opportunistic {
            return self.shard.access(key, offset, len);
        }
        let pos = self.shard.value_offset_pos(key)?;
        Some(self.extract_storing(pos, offset, len))
    }

    fn extract_storing(&self, pos: usize, offset: u64, len: u64) -> Vec<u8> {
        let core = self.shard.core();
        let start = self.shard_value_start(pos) + offset;
        let end = self.shard_value_end(pos);
        if start >= end {
            return Vec::new();
        }
        let len = len.min(end - start - 1);

        let mut out = Vec::with_capacity(len as usize);
        let mut idx = core.lookup_isa(start);
        core.isa_store(start, idx);
        for i in 0..len {
            out.push(core.alphabet().char_of(core.lookup_c(idx)));
            let next_pos = start + i + 1;
            if core.isa().is_sampled(next_pos) {
                idx = core.lookup_isa(next_pos);
            } else {
                idx = core.lookup_npa(idx);
            }
            core.isa_store(next_pos, idx);
        }
        out
    }

    fn shard_value_start(&self, pos: usize) -> u64 {
        self.shard.value_offset_at(pos)
    }

    fn shard_value_end(&self, pos: usize) -> u64 {
        if pos + 1 < self.shard.num_keys() {
            self.shard.value_offset_at(pos + 1)
        } else {
            self.shard.core().input_size()
        }
    }

    /// Deduplicated keys whose records contain `pattern`.
    pub fn search(&self, pattern: &[u8]) -> BTreeSet<i64> {
        self.shard.search(pattern)
    }

    pub fn count(&self, pattern: &[u8]) -> u64 {
        self.shard.count(pattern)
    }

    pub fn serialize(&self, dir: &Path) -> io::Result<u64> {
        self.shard.serialize(dir)
    }
}

impl std::fmt::Debug for AdaptiveShard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveShard")
            .field("num_keys", &self.num_keys())
            .field("opportunistic", &self.opportunistic)
            .finish()
    }
}
