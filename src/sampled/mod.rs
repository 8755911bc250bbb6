// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Sampled suffix / inverse-suffix arrays.
//!
//! Neither SA nor ISA is ever stored in full. A sampled array keeps values at
//! a sparse subset of positions and recovers the rest by chasing NPA links
//! until it lands on a sampled position, then adjusting by the hop count —
//! subtracting (with wraparound) for SA, stepping forward for ISA.
//!
//! Four schemes trade memory for hop-chain length:
//!
//! - flat by index: every `rate`-th array index
//! - flat by value: positions whose *value* is a multiple of `rate`, located
//!   through a shared rank/select dictionary
//! - layered: samples split into independently creatable/destroyable density
//!   layers
//! - opportunistic layered: layers allocate empty and densify from values
//!   computed by ordinary queries
//!
//! Layer storage sits behind per-layer `RwLock`s with an atomic existence
//! mask; a reader that observes a layer as present either finishes its read
//! under the lock or notices the `None` slot and falls back to NPA hops.

mod flat;
mod layered;
mod opportunistic;

pub use flat::{SampledByIndexIsa, SampledByIndexSa, SampledByValueIsa, SampledByValueSa};
pub use layered::{LayeredIsa, LayeredSa};
pub use opportunistic::{OpportunisticIsa, OpportunisticSa};

use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::dictionary::Dictionary;
use crate::npa::Npa;
use crate::stream::{CrcReader, CrcWriter, MapCursor};
use crate::util::int_log2;

/// On-disk / CLI identifiers for the sampling schemes.
#[derive(Clone, Copy, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
pub enum SamplingScheme {
    FlatByIndex = 0,
    FlatByValue = 1,
    LayeredByIndex = 2,
    OpportunisticLayeredByIndex = 3,
}

impl SamplingScheme {
    pub fn from_u64(v: u64) -> Option<Self> {
        match v {
            0 => Some(SamplingScheme::FlatByIndex),
            1 => Some(SamplingScheme::FlatByValue),
            2 => Some(SamplingScheme::LayeredByIndex),
            3 => Some(SamplingScheme::OpportunisticLayeredByIndex),
            _ => None,
        }
    }

    pub fn is_layered(self) -> bool {
        matches!(
            self,
            SamplingScheme::LayeredByIndex | SamplingScheme::OpportunisticLayeredByIndex
        )
    }
}

/// Pure layer geometry: which sample offset belongs to which layer, and
/// where it sits inside that layer's storage.
///
/// For a sampling range `r = base / target`, offset `o` (in target-rate
/// units, mod `r`) maps to layer `log2(gcd(o, r))`: the coarsest layer holds
/// the base-rate-aligned samples, and each finer layer holds the odd
/// multiples of its stride.
#[derive(Clone)]
pub(crate) struct LayerMap {
    pub target_rate: u64,
    pub base_rate: u64,
    pub range: u64,
    pub num_layers: u32,
    /// offset (mod range) -> owning layer id.
    pub layer_of: Vec<u32>,
    /// offset (mod range) -> ordinal among the layer's offsets.
    pub index_in: Vec<u64>,
    /// layer id -> offsets per base period.
    pub count: Vec<u64>,
    pub original_size: u64,
    pub data_bits: u32,
}

impl LayerMap {
    pub fn new(target_rate: u32, base_rate: u32, n: u64) -> io::Result<Self> {
        if !target_rate.is_power_of_two()
            || !base_rate.is_power_of_two()
            || target_rate >= base_rate
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "layered sampling needs power-of-two rates with target < base, got {}/{}",
                    target_rate, base_rate
                ),
            ));
        }
        let target = target_rate as u64;
        let base = base_rate as u64;
        let range = base / target;
        let num_layers = int_log2(range) + 1;

        let mut layer_of = Vec::with_capacity(range as usize);
        let mut index_in = Vec::with_capacity(range as usize);
        let mut count = vec![0u64; num_layers as usize];
        for o in 0..range {
            let layer = int_log2(gcd(o, range));
            layer_of.push(layer);
            index_in.push(count[layer as usize]);
            count[layer as usize] += 1;
        }

        Ok(Self {
            target_rate: target,
            base_rate: base,
            range,
            num_layers,
            layer_of,
            index_in,
            count,
            original_size: n,
            data_bits: int_log2(n + 1),
        })
    }

    /// Stride between consecutive samples of a layer.
    pub fn layer_rate(&self, id: u32) -> u64 {
        let r = (1u64 << id) * self.target_rate;
        if id == self.num_layers - 1 {
            r
        } else {
            r * 2
        }
    }

    /// First sampled position of a layer.
    pub fn layer_origin(&self, id: u32) -> u64 {
        if id == self.num_layers - 1 {
            0
        } else {
            self.layer_rate(id) / 2
        }
    }

    /// Storage slots allocated for a layer.
    pub fn layer_entries(&self, id: u32) -> u64 {
        self.original_size / self.layer_rate(id) + 1
    }

    /// Layer and slot owning sampled position `i` (`i % target_rate == 0`).
    #[inline]
    pub fn locate(&self, i: u64) -> (u32, u64) {
        let off = ((i / self.target_rate) % self.range) as usize;
        let layer = self.layer_of[off];
        let idx = (i / self.base_rate) * self.count[layer as usize] + self.index_in[off];
        (layer, idx)
    }
}

fn gcd(a: u64, b: u64) -> u64 {
    if a == 0 {
        b
    } else {
        gcd(b % a, a)
    }
}

/// A persisted layer mask must agree with which layer bitmaps are present;
/// a mismatch would send lookups into storage that is not there.
pub(crate) fn check_layer_consistency(mask: u64, id: u32, present: bool) -> io::Result<()> {
    if (mask & (1u64 << id) != 0) != present {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "layer map bit {} disagrees with serialized layer data",
                id
            ),
        ));
    }
    Ok(())
}

/// SA adjustment: the value at the sampled landing spot minus the hops taken
/// to get there, wrapping below zero.
#[inline]
pub(crate) fn sa_adjust(sample: u64, hops: u64, n: u64) -> u64 {
    if sample < hops {
        n - (hops - sample)
    } else {
        sample - hops
    }
}

/// The sampled suffix array under one of the four schemes.
pub enum SampledSa {
    ByIndex(SampledByIndexSa),
    ByValue(SampledByValueSa),
    Layered(LayeredSa),
    Opportunistic(OpportunisticSa),
}

impl SampledSa {
    pub fn scheme(&self) -> SamplingScheme {
        match self {
            SampledSa::ByIndex(_) => SamplingScheme::FlatByIndex,
            SampledSa::ByValue(_) => SamplingScheme::FlatByValue,
            SampledSa::Layered(_) => SamplingScheme::LayeredByIndex,
            SampledSa::Opportunistic(_) => SamplingScheme::OpportunisticLayeredByIndex,
        }
    }

    pub fn sampling_rate(&self) -> u32 {
        match self {
            SampledSa::ByIndex(s) => s.sampling_rate(),
            SampledSa::ByValue(s) => s.sampling_rate(),
            SampledSa::Layered(s) => s.sampling_rate(),
            SampledSa::Opportunistic(s) => s.sampling_rate(),
        }
    }

    /// SA value at rank `i`, reconstructed through NPA hops when unsampled.
    pub fn lookup(&self, npa: &Npa, i: u64) -> u64 {
        match self {
            SampledSa::ByIndex(s) => s.lookup(npa, i),
            SampledSa::ByValue(s) => s.lookup(npa, i),
            SampledSa::Layered(s) => s.lookup(npa, i),
            SampledSa::Opportunistic(s) => s.lookup(npa, i),
        }
    }

    pub fn is_sampled(&self, i: u64) -> bool {
        match self {
            SampledSa::ByIndex(s) => s.is_sampled(i),
            SampledSa::ByValue(s) => s.is_sampled(i),
            SampledSa::Layered(s) => s.is_sampled(i),
            SampledSa::Opportunistic(s) => s.is_sampled(i),
        }
    }

    /// Rebuild a deleted layer; flat schemes have no layers and no-op.
    pub fn reconstruct_layer(&self, npa: &Npa, layer_id: u32) -> u64 {
        match self {
            SampledSa::Layered(s) => s.reconstruct_layer(npa, layer_id),
            SampledSa::Opportunistic(s) => s.reconstruct_layer(layer_id),
            _ => 0,
        }
    }

    /// Drop a layer's storage; flat schemes no-op.
    pub fn remove_layer(&self, layer_id: u32) -> u64 {
        match self {
            SampledSa::Layered(s) => s.remove_layer(layer_id),
            SampledSa::Opportunistic(s) => s.remove_layer(layer_id),
            _ => 0,
        }
    }

    pub fn storage_bytes(&self) -> u64 {
        match self {
            SampledSa::ByIndex(s) => s.storage_bytes(),
            SampledSa::ByValue(s) => s.storage_bytes(),
            SampledSa::Layered(s) => s.storage_bytes(),
            SampledSa::Opportunistic(s) => s.storage_bytes(),
        }
    }

    pub fn write<W: Write>(&self, out: &mut CrcWriter<W>) -> io::Result<()> {
        match self {
            SampledSa::ByIndex(s) => s.write(out),
            SampledSa::ByValue(s) => s.write(out),
            SampledSa::Layered(s) => s.write(out),
            SampledSa::Opportunistic(s) => s.write(out),
        }
    }

    pub fn read<R: Read>(
        input: &mut CrcReader<R>,
        scheme: SamplingScheme,
        sampling_rate: u32,
        sampling_range: u32,
    ) -> io::Result<Self> {
        match scheme {
            SamplingScheme::FlatByIndex => Ok(SampledSa::ByIndex(SampledByIndexSa::read(input)?)),
            SamplingScheme::FlatByValue => Ok(SampledSa::ByValue(SampledByValueSa::read(input)?)),
            SamplingScheme::LayeredByIndex => Ok(SampledSa::Layered(LayeredSa::read(
                input,
                sampling_rate,
                sampling_rate * sampling_range,
            )?)),
            SamplingScheme::OpportunisticLayeredByIndex => Ok(SampledSa::Opportunistic(
                OpportunisticSa::read(input, sampling_rate, sampling_rate * sampling_range)?,
            )),
        }
    }

    pub fn map_load(
        cur: &mut MapCursor,
        scheme: SamplingScheme,
        sampling_rate: u32,
        sampling_range: u32,
    ) -> io::Result<Self> {
        match scheme {
            SamplingScheme::FlatByIndex => {
                Ok(SampledSa::ByIndex(SampledByIndexSa::map_load(cur)?))
            }
            SamplingScheme::FlatByValue => {
                Ok(SampledSa::ByValue(SampledByValueSa::map_load(cur)?))
            }
            SamplingScheme::LayeredByIndex => Ok(SampledSa::Layered(LayeredSa::map_load(
                cur,
                sampling_rate,
                sampling_rate * sampling_range,
            )?)),
            SamplingScheme::OpportunisticLayeredByIndex => Ok(SampledSa::Opportunistic(
                OpportunisticSa::map_load(cur, sampling_rate, sampling_rate * sampling_range)?,
            )),
        }
    }

    /// The shared sampled-positions dictionary (by-value scheme only).
    pub fn sampled_positions(&self) -> Option<Arc<Dictionary>> {
        match self {
            SampledSa::ByValue(s) => Some(s.sampled_positions()),
            _ => None,
        }
    }

    /// Attach the shared sampled-positions dictionary after a load.
    pub fn set_sampled_positions(&mut self, d: Arc<Dictionary>) {
        if let SampledSa::ByValue(s) = self {
            s.set_sampled_positions(d);
        }
    }
}

/// The sampled inverse suffix array under one of the four schemes.
pub enum SampledIsa {
    ByIndex(SampledByIndexIsa),
    ByValue(SampledByValueIsa),
    Layered(LayeredIsa),
    Opportunistic(OpportunisticIsa),
}

impl SampledIsa {
    pub fn scheme(&self) -> SamplingScheme {
        match self {
            SampledIsa::ByIndex(_) => SamplingScheme::FlatByIndex,
            SampledIsa::ByValue(_) => SamplingScheme::FlatByValue,
            SampledIsa::Layered(_) => SamplingScheme::LayeredByIndex,
            SampledIsa::Opportunistic(_) => SamplingScheme::OpportunisticLayeredByIndex,
        }
    }

    pub fn sampling_rate(&self) -> u32 {
        match self {
            SampledIsa::ByIndex(s) => s.sampling_rate(),
            SampledIsa::ByValue(s) => s.sampling_rate(),
            SampledIsa::Layered(s) => s.sampling_rate(),
            SampledIsa::Opportunistic(s) => s.sampling_rate(),
        }
    }

    /// ISA value at text position `i`.
    pub fn lookup(&self, npa: &Npa, i: u64) -> u64 {
        match self {
            SampledIsa::ByIndex(s) => s.lookup(npa, i),
            SampledIsa::ByValue(s) => s.lookup(npa, i),
            SampledIsa::Layered(s) => s.lookup(npa, i),
            SampledIsa::Opportunistic(s) => s.lookup(npa, i),
        }
    }

    /// Whether position `i` currently resolves without NPA hops.
    pub fn is_sampled(&self, i: u64) -> bool {
        match self {
            SampledIsa::ByIndex(s) => s.is_sampled(i),
            SampledIsa::ByValue(s) => s.is_sampled(i),
            SampledIsa::Layered(s) => s.is_sampled(i),
            SampledIsa::Opportunistic(s) => s.is_sampled(i),
        }
    }

    /// Opportunistically persist a computed ISA value (pending layers only).
    pub fn store(&self, i: u64, value: u64) -> bool {
        match self {
            SampledIsa::Opportunistic(s) => s.store(i, value),
            _ => false,
        }
    }

    pub fn reconstruct_layer(&self, npa: &Npa, layer_id: u32) -> u64 {
        match self {
            SampledIsa::Layered(s) => s.reconstruct_layer(npa, layer_id),
            SampledIsa::Opportunistic(s) => s.reconstruct_layer(layer_id),
            _ => 0,
        }
    }

    pub fn remove_layer(&self, layer_id: u32) -> u64 {
        match self {
            SampledIsa::Layered(s) => s.remove_layer(layer_id),
            SampledIsa::Opportunistic(s) => s.remove_layer(layer_id),
            _ => 0,
        }
    }

    /// Values currently materialized (opportunistic scheme only).
    pub fn num_sampled_values(&self) -> u64 {
        match self {
            SampledIsa::Opportunistic(s) => s.num_sampled_values(),
            _ => 0,
        }
    }

    pub fn storage_bytes(&self) -> u64 {
        match self {
            SampledIsa::ByIndex(s) => s.storage_bytes(),
            SampledIsa::ByValue(s) => s.storage_bytes(),
            SampledIsa::Layered(s) => s.storage_bytes(),
            SampledIsa::Opportunistic(s) => s.storage_bytes(),
        }
    }

    pub fn write<W: Write>(&self, out: &mut CrcWriter<W>) -> io::Result<()> {
        match self {
            SampledIsa::ByIndex(s) => s.write(out),
            SampledIsa::ByValue(s) => s.write(out),
            SampledIsa::Layered(s) => s.write(out),
            SampledIsa::Opportunistic(s) => s.write(out),
        }
    }

    pub fn read<R: Read>(
        input: &mut CrcReader<R>,
        scheme: SamplingScheme,
        sampling_rate: u32,
        sampling_range: u32,
    ) -> io::Result<Self> {
        match scheme {
            SamplingScheme::FlatByIndex => {
                Ok(SampledIsa::ByIndex(SampledByIndexIsa::read(input)?))
            }
            SamplingScheme::FlatByValue => {
                Ok(SampledIsa::ByValue(SampledByValueIsa::read(input)?))
            }
            SamplingScheme::LayeredByIndex => Ok(SampledIsa::Layered(LayeredIsa::read(
                input,
                sampling_rate,
                sampling_rate * sampling_range,
            )?)),
            SamplingScheme::OpportunisticLayeredByIndex => Ok(SampledIsa::Opportunistic(
                OpportunisticIsa::read(input, sampling_rate, sampling_rate * sampling_range)?,
            )),
        }
    }

    pub fn map_load(
        cur: &mut MapCursor,
        scheme: SamplingScheme,
        sampling_rate: u32,
        sampling_range: u32,
    ) -> io::Result<Self> {
        match scheme {
            SamplingScheme::FlatByIndex => {
                Ok(SampledIsa::ByIndex(SampledByIndexIsa::map_load(cur)?))
            }
            SamplingScheme::FlatByValue => {
                Ok(SampledIsa::ByValue(SampledByValueIsa::map_load(cur)?))
            }
            SamplingScheme::LayeredByIndex => Ok(SampledIsa::Layered(LayeredIsa::map_load(
                cur,
                sampling_rate,
                sampling_rate * sampling_range,
            )?)),
            SamplingScheme::OpportunisticLayeredByIndex => Ok(SampledIsa::Opportunistic(
                OpportunisticIsa::map_load(cur, sampling_rate, sampling_rate * sampling_range)?,
            )),
        }
    }

    /// Attach the shared sampled-positions dictionary (by-value scheme).
    pub fn set_sampled_positions(&mut self, d: Arc<Dictionary>) {
        if let SampledIsa::ByValue(s) = self {
            s.set_sampled_positions(d);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_map_geometry_range_8() {
        let m = LayerMap::new(2, 16, 1000).unwrap();
        assert_eq!(m.range, 8);
        assert_eq!(m.num_layers, 4);
        // gcd-based assignment: offsets 0..8 -> layers 3,0,1,0,2,0,1,0
        assert_eq!(m.layer_of, vec![3, 0, 1, 0, 2, 0, 1, 0]);
        assert_eq!(m.count, vec![4, 2, 1, 1]);
        // Layer strides: finest holds odd multiples of 2 (stride 4 in target
        // units doubled), coarsest every base-rate sample.
        assert_eq!(m.layer_rate(3), 16);
        assert_eq!(m.layer_origin(3), 0);
        assert_eq!(m.layer_rate(0), 4);
        assert_eq!(m.layer_origin(0), 2);
    }

    #[test]
    fn locate_is_injective_per_layer() {
        let m = LayerMap::new(2, 16, 512).unwrap();
        let mut seen = std::collections::HashSet::new();
        for i in (0..512).step_by(2) {
            let (layer, idx) = m.locate(i);
            assert!(idx < m.layer_entries(layer), "slot fits: i={}", i);
            assert!(seen.insert((layer, idx)), "slot reused: i={}", i);
        }
    }

    #[test]
    fn rejects_bad_rates() {
        assert!(LayerMap::new(3, 16, 100).is_err());
        assert!(LayerMap::new(16, 16, 100).is_err());
        assert!(LayerMap::new(32, 16, 100).is_err());
    }
}
