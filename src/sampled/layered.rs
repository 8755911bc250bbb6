// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Layered sampling: density layers that come and go at runtime.
//!
//! Samples are partitioned into `log2(range) + 1` layers (see
//! [`super::LayerMap`]). Removing a layer frees its storage and lengthens
//! hop chains; reconstructing it re-derives the values from whatever layers
//! remain. Both run concurrently with readers.
//!
//! The safety protocol: layer existence is an atomic bitmask, storage lives
//! in a per-layer `RwLock<Option<Bitmap>>`. Removal clears the existence bit
//! first and only then drops the storage under the write lock, so a reader
//! holds either a consistent read guard or sees the cleared slot and falls
//! back to NPA hops. The last remaining layer can never be removed; lookups
//! would have nowhere to land.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::{check_layer_consistency, sa_adjust, LayerMap};
use crate::bits::Bitmap;
use crate::npa::Npa;
use crate::stream::{self, CrcReader, CrcWriter, MapCursor};

/// Layer bitmask plus per-layer locked storage, shared by SA and ISA.
pub(crate) struct LayeredStore {
    pub map: LayerMap,
    exists: AtomicU64,
    layers: Vec<RwLock<Option<Bitmap>>>,
}

impl LayeredStore {
    /// Allocate every layer (zeroed) and mark them all present.
    pub fn with_all_layers(map: LayerMap) -> Self {
        let mut layers = Vec::with_capacity(map.num_layers as usize);
        for id in 0..map.num_layers {
            let bits = map.layer_entries(id) * map.data_bits as u64;
            layers.push(RwLock::new(Some(Bitmap::new(bits))));
        }
        let exists = AtomicU64::new((1u64 << map.num_layers) - 1);
        Self {
            map,
            exists,
            layers,
        }
    }

    #[inline]
    pub fn exists(&self, id: u32) -> bool {
        self.exists.load(Ordering::Acquire) & (1u64 << id) != 0
    }

    #[inline]
    pub fn layer_mask(&self) -> u64 {
        self.exists.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_sampled(&self, i: u64) -> bool {
        i % self.map.target_rate == 0
            && self.exists(self.map.layer_of[((i / self.map.target_rate) % self.map.range) as usize])
    }

    /// Read the sample stored for layer slot `(layer, idx)`, if the layer is
    /// still backed.
    #[inline]
    pub fn try_read(&self, layer: u32, idx: u64) -> Option<u64> {
        let guard = self.layers[layer as usize].read();
        guard
            .as_ref()
            .map(|data| data.get_field(idx, self.map.data_bits))
    }

    /// Read the sample for sampled position `i`, if its layer is backed.
    #[inline]
    pub fn try_sample_at(&self, i: u64) -> Option<u64> {
        let (layer, idx) = self.map.locate(i);
        self.try_read(layer, idx)
    }

    /// Nearest sampled position at or before `i` whose layer exists,
    /// walking backwards (with wraparound) in target-rate steps.
    ///
    /// Returns `(layer, slot, hops)` where `hops` is the NPA distance from
    /// the landing position forward to `i`, counted modulo the input size.
    pub fn layer_leq(&self, i: u64) -> (u32, u64, u64) {
        debug_assert!(self.layer_mask() != 0, "all layers missing");
        let target = self.map.target_rate;
        let n = self.map.original_size;
        let mut hops = i % target;
        let mut pos = i - hops;
        loop {
            let off = ((pos / target) % self.map.range) as usize;
            let layer = self.map.layer_of[off];
            if self.exists(layer) {
                let idx = (pos / self.map.base_rate) * self.map.count[layer as usize]
                    + self.map.index_in[off];
                return (layer, idx, hops);
            }
            if pos == 0 {
                let top = (n - 1) / target * target;
                hops += n - top;
                pos = top;
            } else {
                hops += target;
                pos -= target;
            }
        }
    }

    /// Clear the existence bit, then drop the storage. Refuses to remove the
    /// last remaining layer. Returns the bits freed.
    pub fn destroy(&self, id: u32) -> u64 {
        let bit = 1u64 << id;
        loop {
            let mask = self.exists.load(Ordering::Acquire);
            if mask & bit == 0 || mask == bit {
                return 0;
            }
            if self
                .exists
                .compare_exchange(mask, mask & !bit, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }
        let mut slot = self.layers[id as usize].write();
        slot.take().map_or(0, |b| b.size_bits())
    }

    /// Install freshly built storage for a layer and mark it present.
    /// Returns 0 when a concurrent reconstruction won the race.
    pub fn publish(&self, id: u32, data: Bitmap) -> u64 {
        let mut slot = self.layers[id as usize].write();
        if self.exists(id) {
            return 0;
        }
        let bits = data.size_bits();
        *slot = Some(data);
        self.exists.fetch_or(1u64 << id, Ordering::AcqRel);
        bits
    }

    pub fn storage_bytes(&self) -> u64 {
        let mut total = 8 + 1 + 8;
        for slot in &self.layers {
            total += match slot.read().as_ref() {
                Some(b) => b.storage_bytes(),
                None => 8,
            };
        }
        total
    }

    pub fn write<W: Write>(&self, out: &mut CrcWriter<W>) -> io::Result<()> {
        stream::write_u64(out, self.layer_mask())?;
        stream::write_u8(out, self.map.data_bits as u8)?;
        stream::write_u64(out, self.map.original_size)?;
        for slot in &self.layers {
            Bitmap::write_opt(out, slot.read().as_ref())?;
        }
        Ok(())
    }

    pub fn read<R: Read>(
        input: &mut CrcReader<R>,
        target_rate: u32,
        base_rate: u32,
    ) -> io::Result<Self> {
        let mask = stream::read_u64(input)?;
        let data_bits = stream::read_u8(input)? as u32;
        let original_size = stream::read_u64(input)?;
        let map = LayerMap::new(target_rate, base_rate, original_size)?;
        if data_bits != map.data_bits {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "layered array width {} does not match input size (expected {})",
                    data_bits, map.data_bits
                ),
            ));
        }
        let mut layers = Vec::with_capacity(map.num_layers as usize);
        for id in 0..map.num_layers {
            let data = Bitmap::read_opt(input)?;
            check_layer_consistency(mask, id, data.is_some())?;
            layers.push(RwLock::new(data));
        }
        Ok(Self {
            map,
            exists: AtomicU64::new(mask),
            layers,
        })
    }

    pub fn map_load(
        cur: &mut MapCursor,
        target_rate: u32,
        base_rate: u32,
    ) -> io::Result<Self> {
        let mask = cur.read_u64()?;
        let data_bits = cur.read_u8()? as u32;
        let original_size = cur.read_u64()?;
        let map = LayerMap::new(target_rate, base_rate, original_size)?;
        if data_bits != map.data_bits {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "layered array width {} does not match input size (expected {})",
                    data_bits, map.data_bits
                ),
            ));
        }
        // Layer storage is mutated at runtime, so even the mapped path owns
        // copies of the layer bitmaps.
        let mut layers = Vec::with_capacity(map.num_layers as usize);
        for id in 0..map.num_layers {
            let data = Bitmap::map_opt_owned(cur)?;
            check_layer_consistency(mask, id, data.is_some())?;
            layers.push(RwLock::new(data));
        }
        Ok(Self {
            map,
            exists: AtomicU64::new(mask),
            layers,
        })
    }

    /// Direct slot write during single-threaded construction.
    fn construct_write(&mut self, layer: u32, idx: u64, value: u64) {
        let data_bits = self.map.data_bits;
        if let Some(data) = self.layers[layer as usize].get_mut().as_mut() {
            data.set_field(idx, data_bits, value);
        }
    }
}

/// Layered sampled suffix array.
pub struct LayeredSa {
    pub(crate) store: LayeredStore,
}

impl LayeredSa {
    pub(crate) fn build(
        target_rate: u32,
        base_rate: u32,
        compact_sa: &Bitmap,
        n: u64,
        pos_bits: u32,
    ) -> io::Result<Self> {
        let map = LayerMap::new(target_rate, base_rate, n)?;
        let mut store = LayeredStore::with_all_layers(map);
        for i in (0..n).step_by(target_rate as usize) {
            let sa_val = compact_sa.get_field(i, pos_bits);
            let (layer, idx) = store.map.locate(i);
            store.construct_write(layer, idx, sa_val);
        }
        Ok(Self { store })
    }

    #[inline]
    pub fn sampling_rate(&self) -> u32 {
        self.store.map.target_rate as u32
    }

    #[inline]
    pub fn is_sampled(&self, i: u64) -> bool {
        self.store.is_sampled(i)
    }

    pub fn lookup(&self, npa: &Npa, i: u64) -> u64 {
        debug_assert!(i < self.store.map.original_size);
        let mut i = i;
        let mut hops = 0u64;
        loop {
            if self.store.is_sampled(i) {
                if let Some(sample) = self.store.try_sample_at(i) {
                    return sa_adjust(sample, hops, self.store.map.original_size);
                }
                // The layer went away between the check and the read;
                // re-check and keep hopping.
                continue;
            }
            i = npa.lookup(i);
            hops += 1;
        }
    }

    /// Re-derive a deleted layer from the surviving ones. Idempotent: an
    /// existing layer reports zero added bits.
    ///
    /// One chain walk can cross several of the new layer's positions, so
    /// every crossing fills its slot too instead of walking again.
    pub fn reconstruct_layer(&self, npa: &Npa, layer_id: u32) -> u64 {
        if layer_id >= self.store.map.num_layers || self.store.exists(layer_id) {
            return 0;
        }
        let map = &self.store.map;
        let n = map.original_size;
        let rate = map.layer_rate(layer_id);
        let origin = map.layer_origin(layer_id);
        let entries = map.layer_entries(layer_id);

        let mut data = Bitmap::new(entries * map.data_bits as u64);
        let mut computed = vec![false; entries as usize];

        for e in 0..entries {
            let start = e * rate + origin;
            if start >= n {
                break;
            }
            if computed[e as usize] {
                continue;
            }

            let mut idx = start;
            let mut hops = 0u64;
            let mut fills = vec![(start, 0u64)];
            let sample = loop {
                if self.store.is_sampled(idx) {
                    if let Some(s) = self.store.try_sample_at(idx) {
                        break s;
                    }
                    continue;
                }
                idx = npa.lookup(idx);
                hops += 1;
                if idx >= origin && (idx - origin) % rate == 0 {
                    fills.push((idx, hops));
                }
            };

            for (pos, taken) in fills {
                let remaining = hops - taken;
                let slot = (pos - origin) / rate;
                if slot < entries && !computed[slot as usize] {
                    data.set_field(slot, map.data_bits, sa_adjust(sample, remaining, n));
                    computed[slot as usize] = true;
                }
            }
        }

        self.store.publish(layer_id, data)
    }

    /// Drop a layer. Idempotent; the last remaining layer is kept.
    pub fn remove_layer(&self, layer_id: u32) -> u64 {
        if layer_id >= self.store.map.num_layers {
            return 0;
        }
        self.store.destroy(layer_id)
    }

    pub fn storage_bytes(&self) -> u64 {
        self.store.storage_bytes()
    }

    pub fn write<W: Write>(&self, out: &mut CrcWriter<W>) -> io::Result<()> {
        self.store.write(out)
    }

    pub(crate) fn read<R: Read>(
        input: &mut CrcReader<R>,
        target_rate: u32,
        base_rate: u32,
    ) -> io::Result<Self> {
        Ok(Self {
            store: LayeredStore::read(input, target_rate, base_rate)?,
        })
    }

    pub(crate) fn map_load(
        cur: &mut MapCursor,
        target_rate: u32,
        base_rate: u32,
    ) -> io::Result<Self> {
        Ok(Self {
            store: LayeredStore::map_load(cur, target_rate, base_rate)?,
        })
    }
}

/// Layered sampled inverse suffix array.
pub struct LayeredIsa {
    pub(crate) store: LayeredStore,
}

impl LayeredIsa {
    pub(crate) fn build(
        target_rate: u32,
        base_rate: u32,
        compact_sa: &Bitmap,
        n: u64,
        pos_bits: u32,
    ) -> io::Result<Self> {
        let map = LayerMap::new(target_rate, base_rate, n)?;
        let mut store = LayeredStore::with_all_layers(map);
        for i in 0..n {
            let sa_val = compact_sa.get_field(i, pos_bits);
            if sa_val % target_rate as u64 == 0 {
                let (layer, idx) = store.map.locate(sa_val);
                store.construct_write(layer, idx, i);
            }
        }
        Ok(Self { store })
    }

    #[inline]
    pub fn sampling_rate(&self) -> u32 {
        self.store.map.target_rate as u32
    }

    #[inline]
    pub fn is_sampled(&self, i: u64) -> bool {
        self.store.is_sampled(i)
    }

    pub fn lookup(&self, npa: &Npa, i: u64) -> u64 {
        debug_assert!(i < self.store.map.original_size);
        loop {
            let (layer, idx, hops) = self.store.layer_leq(i);
            if let Some(mut pos) = self.store.try_read(layer, idx) {
                for _ in 0..hops {
                    pos = npa.lookup(pos);
                }
                return pos;
            }
            // Layer deleted between the walk and the read; walk again.
        }
    }

    /// Re-derive a deleted layer from the surviving ones.
    pub fn reconstruct_layer(&self, npa: &Npa, layer_id: u32) -> u64 {
        if layer_id >= self.store.map.num_layers || self.store.exists(layer_id) {
            return 0;
        }
        let map = &self.store.map;
        let n = map.original_size;
        let rate = map.layer_rate(layer_id);
        let origin = map.layer_origin(layer_id);
        let entries = map.layer_entries(layer_id);

        let mut data = Bitmap::new(entries * map.data_bits as u64);
        for e in 0..entries {
            let target_pos = e * rate + origin;
            if target_pos >= n {
                break;
            }
            let pos = loop {
                let (layer, idx, hops) = self.store.layer_leq(target_pos);
                if let Some(mut pos) = self.store.try_read(layer, idx) {
                    for _ in 0..hops {
                        pos = npa.lookup(pos);
                    }
                    break pos;
                }
            };
            data.set_field(e, map.data_bits, pos);
        }

        self.store.publish(layer_id, data)
    }

    /// Drop a layer. Idempotent; the last remaining layer is kept.
    pub fn remove_layer(&self, layer_id: u32) -> u64 {
        if layer_id >= self.store.map.num_layers {
            return 0;
        }
        self.store.destroy(layer_id)
    }

    pub fn storage_bytes(&self) -> u64 {
        self.store.storage_bytes()
    }

    pub fn write<W: Write>(&self, out: &mut CrcWriter<W>) -> io::Result<()> {
        self.store.write(out)
    }

    pub(crate) fn read<R: Read>(
        input: &mut CrcReader<R>,
        target_rate: u32,
        base_rate: u32,
    ) -> io::Result<Self> {
        Ok(Self {
            store: LayeredStore::read(input, target_rate, base_rate)?,
        })
    }

    pub(crate) fn map_load(
        cur: &mut MapCursor,
        target_rate: u32,
        base_rate: u32,
    ) -> io::Result<Self> {
        Ok(Self {
            store: LayeredStore::map_load(cur, target_rate, base_rate)?,
        })
    }
}
