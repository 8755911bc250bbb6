// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Flat sampling: one bit-packed sample table, no layers.
//!
//! By-index samples every `rate`-th rank (SA) or text position (ISA).
//! By-value samples positions whose *value* is a multiple of `rate`; since
//! those are not evenly spaced in index space, a rank/select dictionary over
//! the sampled positions maps between the two, and SA and ISA share that one
//! dictionary.

use std::io::{self, Read, Write};
use std::sync::Arc;

use super::sa_adjust;
use crate::bits::Bitmap;
use crate::dictionary::Dictionary;
use crate::npa::Npa;
use crate::stream::{self, CrcReader, CrcWriter, MapCursor};
use crate::util::{int_log2, modulo};

/// Fields every flat variant persists, in the on-disk order.
struct FlatData {
    data: Bitmap,
    data_bits: u32,
    data_size: u64,
    original_size: u64,
    sampling_rate: u32,
}

impl FlatData {
    fn write<W: Write>(&self, out: &mut CrcWriter<W>) -> io::Result<()> {
        stream::write_u64(out, self.data_size)?;
        stream::write_u8(out, self.data_bits as u8)?;
        stream::write_u64(out, self.original_size)?;
        stream::write_u32(out, self.sampling_rate)?;
        Bitmap::write_opt(out, Some(&self.data))
    }

    fn read<R: Read>(input: &mut CrcReader<R>) -> io::Result<Self> {
        let data_size = stream::read_u64(input)?;
        let data_bits = stream::read_u8(input)? as u32;
        let original_size = stream::read_u64(input)?;
        let sampling_rate = stream::read_u32(input)?;
        if sampling_rate == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "sampled array has zero sampling rate",
            ));
        }
        let data = Bitmap::read_opt(input)?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "sampled array missing data")
        })?;
        Ok(Self {
            data,
            data_bits,
            data_size,
            original_size,
            sampling_rate,
        })
    }

    fn map_load(cur: &mut MapCursor) -> io::Result<Self> {
        let data_size = cur.read_u64()?;
        let data_bits = cur.read_u8()? as u32;
        let original_size = cur.read_u64()?;
        let sampling_rate = cur.read_u32()?;
        if sampling_rate == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "sampled array has zero sampling rate",
            ));
        }
        let data = Bitmap::map_opt(cur)?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "sampled array missing data")
        })?;
        Ok(Self {
            data,
            data_bits,
            data_size,
            original_size,
            sampling_rate,
        })
    }

    fn storage_bytes(&self) -> u64 {
        8 + 1 + 8 + 4 + self.data.storage_bytes()
    }
}

/// SA sampled at every `rate`-th rank.
pub struct SampledByIndexSa {
    inner: FlatData,
}

impl SampledByIndexSa {
    pub(crate) fn build(sampling_rate: u32, compact_sa: &Bitmap, n: u64, pos_bits: u32) -> Self {
        let data_bits = int_log2(n + 1);
        let data_size = n / sampling_rate as u64 + 1;
        let mut data = Bitmap::new(data_size * data_bits as u64);
        for i in (0..n).step_by(sampling_rate as usize) {
            let sa_val = compact_sa.get_field(i, pos_bits);
            data.set_field(i / sampling_rate as u64, data_bits, sa_val);
        }
        Self {
            inner: FlatData {
                data,
                data_bits,
                data_size,
                original_size: n,
                sampling_rate,
            },
        }
    }

    #[inline]
    pub fn sampling_rate(&self) -> u32 {
        self.inner.sampling_rate
    }

    #[inline]
    pub fn is_sampled(&self, i: u64) -> bool {
        i % self.inner.sampling_rate as u64 == 0
    }

    pub fn lookup(&self, npa: &Npa, i: u64) -> u64 {
        debug_assert!(i < self.inner.original_size);
        let rate = self.inner.sampling_rate as u64;
        let mut i = i;
        let mut hops = 0u64;
        while i % rate != 0 {
            i = npa.lookup(i);
            hops += 1;
        }
        let sample = self.inner.data.get_field(i / rate, self.inner.data_bits);
        sa_adjust(sample, hops, self.inner.original_size)
    }

    pub fn storage_bytes(&self) -> u64 {
        self.inner.storage_bytes()
    }

    pub fn write<W: Write>(&self, out: &mut CrcWriter<W>) -> io::Result<()> {
        self.inner.write(out)
    }

    pub(crate) fn read<R: Read>(input: &mut CrcReader<R>) -> io::Result<Self> {
        Ok(Self {
            inner: FlatData::read(input)?,
        })
    }

    pub(crate) fn map_load(cur: &mut MapCursor) -> io::Result<Self> {
        Ok(Self {
            inner: FlatData::map_load(cur)?,
        })
    }
}

/// ISA sampled at every `rate`-th text position.
pub struct SampledByIndexIsa {
    inner: FlatData,
}

impl SampledByIndexIsa {
    pub(crate) fn build(sampling_rate: u32, compact_sa: &Bitmap, n: u64, pos_bits: u32) -> Self {
        let data_bits = int_log2(n + 1);
        let data_size = n / sampling_rate as u64 + 1;
        let mut data = Bitmap::new(data_size * data_bits as u64);
        for i in 0..n {
            let sa_val = compact_sa.get_field(i, pos_bits);
            if sa_val % sampling_rate as u64 == 0 {
                data.set_field(sa_val / sampling_rate as u64, data_bits, i);
            }
        }
        Self {
            inner: FlatData {
                data,
                data_bits,
                data_size,
                original_size: n,
                sampling_rate,
            },
        }
    }

    #[inline]
    pub fn sampling_rate(&self) -> u32 {
        self.inner.sampling_rate
    }

    #[inline]
    pub fn is_sampled(&self, i: u64) -> bool {
        i % self.inner.sampling_rate as u64 == 0
    }

    pub fn lookup(&self, npa: &Npa, i: u64) -> u64 {
        debug_assert!(i < self.inner.original_size);
        let rate = self.inner.sampling_rate as u64;
        let sample_idx = i / rate;
        let mut pos = self.inner.data.get_field(sample_idx, self.inner.data_bits);
        let mut hops = i - sample_idx * rate;
        while hops > 0 {
            pos = npa.lookup(pos);
            hops -= 1;
        }
        pos
    }

    pub fn storage_bytes(&self) -> u64 {
        self.inner.storage_bytes()
    }

    pub fn write<W: Write>(&self, out: &mut CrcWriter<W>) -> io::Result<()> {
        self.inner.write(out)
    }

    pub(crate) fn read<R: Read>(input: &mut CrcReader<R>) -> io::Result<Self> {
        Ok(Self {
            inner: FlatData::read(input)?,
        })
    }

    pub(crate) fn map_load(cur: &mut MapCursor) -> io::Result<Self> {
        Ok(Self {
            inner: FlatData::map_load(cur)?,
        })
    }
}

/// SA sampled where the value is a multiple of `rate`.
pub struct SampledByValueSa {
    inner: FlatData,
    sampled_positions: Arc<Dictionary>,
}

impl SampledByValueSa {
    pub(crate) fn build(
        sampling_rate: u32,
        compact_sa: &Bitmap,
        n: u64,
        pos_bits: u32,
    ) -> io::Result<Self> {
        if !sampling_rate.is_power_of_two() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "by-value sampling rate must be a power of two",
            ));
        }
        let data_size = n / sampling_rate as u64 + 1;
        let data_bits = int_log2(data_size + 1);
        let mut data = Bitmap::new(data_size * data_bits as u64);
        let mut positions = Bitmap::new(n);
        let mut slot = 0u64;
        for i in 0..n {
            let sa_val = compact_sa.get_field(i, pos_bits);
            if sa_val % sampling_rate as u64 == 0 {
                data.set_field(slot, data_bits, sa_val / sampling_rate as u64);
                slot += 1;
                positions.set_bit(i);
            }
        }
        Ok(Self {
            inner: FlatData {
                data,
                data_bits,
                data_size,
                original_size: n,
                sampling_rate,
            },
            sampled_positions: Arc::new(Dictionary::new(positions)),
        })
    }

    pub(crate) fn sampled_positions(&self) -> Arc<Dictionary> {
        Arc::clone(&self.sampled_positions)
    }

    #[inline]
    pub fn sampling_rate(&self) -> u32 {
        self.inner.sampling_rate
    }

    #[inline]
    pub fn is_sampled(&self, i: u64) -> bool {
        self.sampled_positions.is_set(i)
    }

    pub fn lookup(&self, npa: &Npa, i: u64) -> u64 {
        debug_assert!(i < self.inner.original_size);
        let mut i = i;
        let mut hops = 0u64;
        while !self.is_sampled(i) {
            i = npa.lookup(i);
            hops += 1;
        }
        let r = modulo(
            self.sampled_positions.rank1(i) as i64 - 1,
            self.inner.data_size,
        );
        let a = self.inner.data.get_field(r, self.inner.data_bits);
        modulo(
            (self.inner.sampling_rate as u64 * a) as i64 - hops as i64,
            self.inner.original_size,
        )
    }

    pub fn storage_bytes(&self) -> u64 {
        self.inner.storage_bytes() + self.sampled_positions.storage_bytes()
    }

    pub fn write<W: Write>(&self, out: &mut CrcWriter<W>) -> io::Result<()> {
        // The shared dictionary is persisted once, in the core metadata.
        self.inner.write(out)
    }

    pub(crate) fn read<R: Read>(input: &mut CrcReader<R>) -> io::Result<Self> {
        Ok(Self {
            inner: FlatData::read(input)?,
            sampled_positions: Arc::new(Dictionary::new(Bitmap::new(1))),
        })
    }

    pub(crate) fn map_load(cur: &mut MapCursor) -> io::Result<Self> {
        Ok(Self {
            inner: FlatData::map_load(cur)?,
            sampled_positions: Arc::new(Dictionary::new(Bitmap::new(1))),
        })
    }

    pub(crate) fn set_sampled_positions(&mut self, d: Arc<Dictionary>) {
        self.sampled_positions = d;
    }
}

/// ISA counterpart of by-value sampling, sharing the SA's dictionary.
pub struct SampledByValueIsa {
    inner: FlatData,
    sampled_positions: Arc<Dictionary>,
}

impl SampledByValueIsa {
    pub(crate) fn build(
        sampling_rate: u32,
        compact_sa: &Bitmap,
        n: u64,
        pos_bits: u32,
        sampled_positions: Arc<Dictionary>,
    ) -> io::Result<Self> {
        if !sampling_rate.is_power_of_two() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "by-value sampling rate must be a power of two",
            ));
        }
        let data_size = n / sampling_rate as u64 + 1;
        let data_bits = int_log2(data_size + 1);
        let mut data = Bitmap::new(data_size * data_bits as u64);
        let mut slot = 0u64;
        for i in 0..n {
            let sa_val = compact_sa.get_field(i, pos_bits);
            if sa_val % sampling_rate as u64 == 0 {
                data.set_field(sa_val / sampling_rate as u64, data_bits, slot);
                slot += 1;
            }
        }
        Ok(Self {
            inner: FlatData {
                data,
                data_bits,
                data_size,
                original_size: n,
                sampling_rate,
            },
            sampled_positions,
        })
    }

    #[inline]
    pub fn sampling_rate(&self) -> u32 {
        self.inner.sampling_rate
    }

    #[inline]
    pub fn is_sampled(&self, i: u64) -> bool {
        i % self.inner.sampling_rate as u64 == 0
    }

    pub fn lookup(&self, npa: &Npa, i: u64) -> u64 {
        debug_assert!(i < self.inner.original_size);
        let rate = self.inner.sampling_rate as u64;
        let mut hops = i % rate;
        let a = self.inner.data.get_field(i / rate, self.inner.data_bits);
        let mut pos = self.sampled_positions.select1(a);
        while hops > 0 {
            pos = npa.lookup(pos);
            hops -= 1;
        }
        pos
    }

    pub fn storage_bytes(&self) -> u64 {
        self.inner.storage_bytes()
    }

    pub fn write<W: Write>(&self, out: &mut CrcWriter<W>) -> io::Result<()> {
        self.inner.write(out)
    }

    pub(crate) fn read<R: Read>(input: &mut CrcReader<R>) -> io::Result<Self> {
        Ok(Self {
            inner: FlatData::read(input)?,
            sampled_positions: Arc::new(Dictionary::new(Bitmap::new(1))),
        })
    }

    pub(crate) fn map_load(cur: &mut MapCursor) -> io::Result<Self> {
        Ok(Self {
            inner: FlatData::map_load(cur)?,
            sampled_positions: Arc::new(Dictionary::new(Bitmap::new(1))),
        })
    }

    pub(crate) fn set_sampled_positions(&mut self, d: Arc<Dictionary>) {
        self.sampled_positions = d;
    }
}
