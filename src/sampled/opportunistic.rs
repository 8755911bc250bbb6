// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Opportunistic layered sampling: layers that fill themselves from query
//! traffic.
//!
//! Creating a layer only allocates zeroed storage and marks it *pending*.
//! Every value a query computes on its way through the hop chain is offered
//! to pending layers (`store`), tracked per slot by a presence bitmap, so a
//! layer densifies at the pace of organic reads instead of paying an eager
//! reconstruction pass. A running counter reports how many values are
//! materialized across all layers.
//!
//! The store-on-read mutation is an explicit, short write-lock acquisition
//! on the one slot being filled; presence bits make it idempotent.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::{check_layer_consistency, sa_adjust, LayerMap};
use crate::bits::Bitmap;
use crate::npa::Npa;
use crate::stream::{self, CrcReader, CrcWriter, MapCursor};

/// A layer's storage plus its per-slot presence bitmap.
struct OppLayer {
    data: Bitmap,
    present: Bitmap,
}

/// Layered storage with lazily filled slots.
pub(crate) struct OppStore {
    pub map: LayerMap,
    exists: AtomicU64,
    /// Layers accepting store-on-read fills.
    pending: AtomicU64,
    num_sampled: AtomicU64,
    layers: Vec<RwLock<Option<OppLayer>>>,
}

impl OppStore {
    /// Allocate every layer fully present (construction fills all slots).
    pub fn with_all_layers(map: LayerMap) -> Self {
        let mut layers = Vec::with_capacity(map.num_layers as usize);
        let mut total = 0u64;
        for id in 0..map.num_layers {
            let entries = map.layer_entries(id);
            total += entries;
            layers.push(RwLock::new(Some(OppLayer {
                data: Bitmap::new(entries * map.data_bits as u64),
                present: Bitmap::new_set(entries),
            })));
        }
        let exists = AtomicU64::new((1u64 << map.num_layers) - 1);
        Self {
            map,
            exists,
            pending: AtomicU64::new(0),
            num_sampled: AtomicU64::new(total),
            layers,
        }
    }

    #[inline]
    pub fn exists(&self, id: u32) -> bool {
        self.exists.load(Ordering::Acquire) & (1u64 << id) != 0
    }

    #[inline]
    fn is_pending(&self, id: u32) -> bool {
        self.pending.load(Ordering::Acquire) & (1u64 << id) != 0
    }

    #[inline]
    pub fn layer_mask(&self) -> u64 {
        self.exists.load(Ordering::Acquire)
    }

    pub fn num_sampled_values(&self) -> u64 {
        self.num_sampled.load(Ordering::Acquire)
    }

    /// Sampled and actually materialized.
    pub fn is_sampled(&self, i: u64) -> bool {
        if i % self.map.target_rate != 0 {
            return false;
        }
        let (layer, idx) = self.map.locate(i);
        if !self.exists(layer) {
            return false;
        }
        let guard = self.layers[layer as usize].read();
        guard.as_ref().is_some_and(|l| l.present.get_bit(idx))
    }

    /// Read the value for sampled position `i` when it is materialized.
    pub fn try_sample_at(&self, i: u64) -> Option<u64> {
        let (layer, idx) = self.map.locate(i);
        let guard = self.layers[layer as usize].read();
        let l = guard.as_ref()?;
        if !l.present.get_bit(idx) {
            return None;
        }
        Some(l.data.get_field(idx, self.map.data_bits))
    }

    /// Would a store at `i` land in a pending, not-yet-filled slot?
    pub fn wants_fill(&self, i: u64) -> bool {
        if i % self.map.target_rate != 0 {
            return false;
        }
        let (layer, idx) = self.map.locate(i);
        if !self.is_pending(layer) {
            return false;
        }
        let guard = self.layers[layer as usize].read();
        guard.as_ref().is_some_and(|l| !l.present.get_bit(idx))
    }

    /// Fill a pending slot with a value computed en route. Returns whether
    /// the value was persisted.
    pub fn store(&self, i: u64, value: u64) -> bool {
        if i % self.map.target_rate != 0 {
            return false;
        }
        let (layer, idx) = self.map.locate(i);
        if !self.is_pending(layer) {
            return false;
        }
        self.fill_slot(layer, idx, value)
    }

    /// Fill without the pending check; used for positions collected during a
    /// hop walk, which were pending when observed.
    pub fn store_collected(&self, i: u64, value: u64) -> bool {
        let (layer, idx) = self.map.locate(i);
        self.fill_slot(layer, idx, value)
    }

    fn fill_slot(&self, layer: u32, idx: u64, value: u64) -> bool {
        let mut guard = self.layers[layer as usize].write();
        let data_bits = self.map.data_bits;
        match guard.as_mut() {
            Some(l) if !l.present.get_bit(idx) => {
                l.data.set_field(idx, data_bits, value);
                l.present.set_bit(idx);
                self.num_sampled.fetch_add(1, Ordering::AcqRel);
                true
            }
            _ => false,
        }
    }

    /// Like the layered walk, but a landing spot must also be materialized.
    pub fn layer_leq(&self, i: u64) -> (u32, u64, u64) {
        debug_assert!(self.num_sampled_values() != 0, "no materialized samples");
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
                let guard = self.layers[layer as usize].read();
                if guard
                    .as_ref()
                    .is_some_and(|l| l.present.get_bit(idx))
                {
                    return (layer, idx, hops);
                }
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

    pub fn try_read(&self, layer: u32, idx: u64) -> Option<u64> {
        let guard = self.layers[layer as usize].read();
        let l = guard.as_ref()?;
        if !l.present.get_bit(idx) {
            return None;
        }
        Some(l.data.get_field(idx, self.map.data_bits))
    }

    /// Remove a layer. Refuses when it is the last existing layer or holds
    /// every materialized value (lookups would have nowhere to land).
    pub fn destroy(&self, id: u32) -> u64 {
        let bit = 1u64 << id;
        {
            let guard = self.layers[id as usize].read();
            let Some(l) = guard.as_ref() else { return 0 };
            if self.num_sampled_values() <= l.present.count_ones() {
                return 0;
            }
        }
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
        self.pending.fetch_and(!bit, Ordering::AcqRel);
        let mut slot = self.layers[id as usize].write();
        match slot.take() {
            Some(l) => {
                self.num_sampled
                    .fetch_sub(l.present.count_ones(), Ordering::AcqRel);
                l.data.size_bits()
            }
            None => 0,
        }
    }

    /// Allocate an empty layer and mark it pending; values arrive from
    /// store-on-read. Returns the bits allocated (0 if it already exists).
    pub fn reconstruct(&self, id: u32) -> u64 {
        if self.exists(id) {
            return 0;
        }
        let entries = self.map.layer_entries(id);
        let data = Bitmap::new(entries * self.map.data_bits as u64);
        let present = Bitmap::new(entries);

        let mut slot = self.layers[id as usize].write();
        if self.exists(id) {
            return 0;
        }
        let bits = data.size_bits();
        *slot = Some(OppLayer { data, present });
        self.exists.fetch_or(1u64 << id, Ordering::AcqRel);
        self.pending.fetch_or(1u64 << id, Ordering::AcqRel);
        bits
    }

    pub fn storage_bytes(&self) -> u64 {
        let mut total = 8 + 1 + 8;
        for slot in &self.layers {
            total += match slot.read().as_ref() {
                Some(l) => l.data.storage_bytes() + l.present.storage_bytes(),
                None => 8,
            };
        }
        total
    }

    pub fn write<W: Write>(&self, out: &mut CrcWriter<W>) -> io::Result<()> {
        // Pending layers are only partially filled; persisting them would
        // resurrect their empty slots as real values on load. They are
        // written as absent and re-created pending by a later reconstruct.
        let mask = self.layer_mask() & !self.pending.load(Ordering::Acquire);
        stream::write_u64(out, mask)?;
        stream::write_u8(out, self.map.data_bits as u8)?;
        stream::write_u64(out, self.map.original_size)?;
        for (id, slot) in self.layers.iter().enumerate() {
            let guard = slot.read();
            let data = if mask & (1u64 << id) != 0 {
                guard.as_ref().map(|l| &l.data)
            } else {
                None
            };
            Bitmap::write_opt(out, data)?;
        }
        Ok(())
    }

    fn finish_load(
        mask: u64,
        map: LayerMap,
        datas: Vec<Option<Bitmap>>,
    ) -> io::Result<Self> {
        // Persisted layers are fully populated, so presence resets to
        // all-set and the counter to the full slot count.
        let mut layers = Vec::with_capacity(map.num_layers as usize);
        let mut total = 0u64;
        for (id, data) in datas.into_iter().enumerate() {
            check_layer_consistency(mask, id as u32, data.is_some())?;
            match data {
                Some(data) => {
                    let entries = map.layer_entries(id as u32);
                    total += entries;
                    layers.push(RwLock::new(Some(OppLayer {
                        data,
                        present: Bitmap::new_set(entries),
                    })));
                }
                None => layers.push(RwLock::new(None)),
            }
        }
        Ok(Self {
            map,
            exists: AtomicU64::new(mask),
            pending: AtomicU64::new(0),
            num_sampled: AtomicU64::new(total),
            layers,
        })
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
                "opportunistic array width does not match input size",
            ));
        }
        let mut datas = Vec::with_capacity(map.num_layers as usize);
        for _ in 0..map.num_layers {
            datas.push(Bitmap::read_opt(input)?);
        }
        Self::finish_load(mask, map, datas)
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
                "opportunistic array width does not match input size",
            ));
        }
        let mut datas = Vec::with_capacity(map.num_layers as usize);
        for _ in 0..map.num_layers {
            datas.push(Bitmap::map_opt_owned(cur)?);
        }
        Self::finish_load(mask, map, datas)
    }

    /// Direct slot write during single-threaded construction.
    fn construct_write(&mut self, layer: u32, idx: u64, value: u64) {
        let data_bits = self.map.data_bits;
        if let Some(l) = self.layers[layer as usize].get_mut().as_mut() {
            l.data.set_field(idx, data_bits, value);
        }
    }
}

/// Opportunistic layered suffix array.
pub struct OpportunisticSa {
    pub(crate) store: OppStore,
}

impl OpportunisticSa {
    pub(crate) fn build(
        target_rate: u32,
        base_rate: u32,
        compact_sa: &Bitmap,
        n: u64,
        pos_bits: u32,
    ) -> io::Result<Self> {
        let map = LayerMap::new(target_rate, base_rate, n)?;
        let mut store = OppStore::with_all_layers(map);
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

    /// Lookup that fills pending slots it crosses, plus its own position.
    pub fn lookup(&self, npa: &Npa, i: u64) -> u64 {
        debug_assert!(i < self.store.map.original_size);
        let n = self.store.map.original_size;
        let origin = i;
        let mut idx = i;
        let mut hops = 0u64;
        let mut crossings: Vec<(u64, u64)> = Vec::new();
        let sample = loop {
            if self.store.is_sampled(idx) {
                if let Some(s) = self.store.try_sample_at(idx) {
                    break s;
                }
                continue;
            }
            idx = npa.lookup(idx);
            hops += 1;
            if self.store.wants_fill(idx) {
                crossings.push((idx, hops));
            }
        };

        for &(pos, taken) in &crossings {
            let value = sa_adjust(sample, hops - taken, n);
            self.store.store_collected(pos, value);
        }

        let result = sa_adjust(sample, hops, n);
        self.store.store(origin, result);
        result
    }

    pub fn reconstruct_layer(&self, layer_id: u32) -> u64 {
        if layer_id >= self.store.map.num_layers {
            return 0;
        }
        self.store.reconstruct(layer_id)
    }

    pub fn remove_layer(&self, layer_id: u32) -> u64 {
        if layer_id >= self.store.map.num_layers {
            return 0;
        }
        self.store.destroy(layer_id)
    }

    pub fn num_sampled_values(&self) -> u64 {
        self.store.num_sampled_values()
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
            store: OppStore::read(input, target_rate, base_rate)?,
        })
    }

    pub(crate) fn map_load(
        cur: &mut MapCursor,
        target_rate: u32,
        base_rate: u32,
    ) -> io::Result<Self> {
        Ok(Self {
            store: OppStore::map_load(cur, target_rate, base_rate)?,
        })
    }
}

/// Opportunistic layered inverse suffix array.
pub struct OpportunisticIsa {
    pub(crate) store: OppStore,
}

impl OpportunisticIsa {
    pub(crate) fn build(
        target_rate: u32,
        base_rate: u32,
        compact_sa: &Bitmap,
        n: u64,
        pos_bits: u32,
    ) -> io::Result<Self> {
        let map = LayerMap::new(target_rate, base_rate, n)?;
        let mut store = OppStore::with_all_layers(map);
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
        }
    }

    /// Persist an ISA value computed by a query (pending layers only).
    pub fn store(&self, i: u64, value: u64) -> bool {
        self.store.store(i, value)
    }

    pub fn reconstruct_layer(&self, layer_id: u32) -> u64 {
        if layer_id >= self.store.map.num_layers {
            return 0;
        }
        self.store.reconstruct(layer_id)
    }

    pub fn remove_layer(&self, layer_id: u32) -> u64 {
        if layer_id >= self.store.map.num_layers {
            return 0;
        }
        self.store.destroy(layer_id)
    }

    pub fn num_sampled_values(&self) -> u64 {
        self.store.num_sampled_values()
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
            store: OppStore::read(input, target_rate, base_rate)?,
        })
    }

    pub(crate) fn map_load(
        cur: &mut MapCursor,
        target_rate: u32,
        base_rate: u32,
    ) -> io::Result<Self> {
        Ok(Self {
            store: OppStore::map_load(cur, target_rate, base_rate)?,
        })
    }
}
