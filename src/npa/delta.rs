// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Sample-plus-delta NPA encodings (Elias-gamma and Elias-delta).
//!
//! Each character column is one [`DeltaEncodedVector`]: raw samples every
//! `sampling_rate`-th value, the gaps between consecutive values coded with
//! the chosen Elias family, and per-sample bit offsets into the gap stream.
//! A lookup reads the preceding sample and prefix-sums the gaps after it;
//! both stay inside one sample block.
//!
//! Elias-delta differs from gamma only in how a gap is coded: the bit length
//! of the value is itself gamma-coded, which wins for large gaps at a
//! constant-factor cost on small ones.

use std::io::{self, Read, Write};

use super::gamma::{gamma_decode, gamma_encode, gamma_prefix_sum, gamma_size};
use super::{column_of, NpaCommon};
use crate::bits::Bitmap;
use crate::stream::{self, CrcReader, CrcWriter, MapCursor};
use crate::util::{floor_log2, int_log2};

/// Which Elias family codes the per-cell gaps.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DeltaCoding {
    Gamma,
    Delta,
}

impl DeltaCoding {
    /// Bits needed to code `v` (`v >= 1`).
    pub fn code_size(self, v: u64) -> u32 {
        match self {
            DeltaCoding::Gamma => gamma_size(v),
            DeltaCoding::Delta => {
                let n_prime = floor_log2(v);
                gamma_size(n_prime as u64 + 1) + n_prime
            }
        }
    }

    /// Append the code of `v` at `pos`, returning the next free bit.
    pub fn encode(self, bits: &mut Bitmap, pos: u64, v: u64) -> u64 {
        match self {
            DeltaCoding::Gamma => gamma_encode(bits, pos, v),
            DeltaCoding::Delta => {
                let n_prime = floor_log2(v);
                let pos = gamma_encode(bits, pos, n_prime as u64 + 1);
                bits.set_bits(pos, n_prime, v - (1u64 << n_prime));
                pos + n_prime as u64
            }
        }
    }

    /// Decode one code at `*offset`, advancing the offset.
    pub fn decode(self, bits: &Bitmap, offset: &mut u64) -> u64 {
        match self {
            DeltaCoding::Gamma => gamma_decode(bits, offset),
            DeltaCoding::Delta => {
                let n = gamma_decode(bits, offset) as u32;
                let low = bits.get_bits(*offset, n - 1);
                *offset += n as u64 - 1;
                low | (1u64 << (n - 1))
            }
        }
    }

    /// Sum of the first `count` codes starting at bit `offset`.
    pub fn prefix_sum(self, bits: &Bitmap, offset: u64, count: u64) -> u64 {
        match self {
            DeltaCoding::Gamma => gamma_prefix_sum(bits, offset, count),
            DeltaCoding::Delta => {
                let mut off = offset;
                let mut sum = 0u64;
                for _ in 0..count {
                    sum += self.decode(bits, &mut off);
                }
                sum
            }
        }
    }
}

/// One strictly increasing sequence, sampled and gap-coded.
pub struct DeltaEncodedVector {
    pub sample_bits: u8,
    pub delta_offset_bits: u8,
    pub samples: Bitmap,
    pub deltas: Option<Bitmap>,
    pub delta_offsets: Bitmap,
}

impl DeltaEncodedVector {
    /// Encode a non-empty strictly increasing sequence.
    pub fn create(data: &[u64], sampling_rate: u32, coding: DeltaCoding) -> Self {
        debug_assert!(!data.is_empty());
        let rate = sampling_rate as usize;

        let mut samples = Vec::new();
        let mut deltas = Vec::new();
        let mut delta_offsets = Vec::new();
        let mut max_sample = 0u64;
        let mut max_offset = 0u64;
        let mut cum_bits = 0u64;
        let mut last = 0u64;

        for (i, &v) in data.iter().enumerate() {
            if i % rate == 0 {
                samples.push(v);
                max_sample = max_sample.max(v);
                max_offset = max_offset.max(cum_bits);
                delta_offsets.push(cum_bits);
            } else {
                debug_assert!(v > last, "cell values must be strictly increasing");
                let d = v - last;
                deltas.push(d);
                cum_bits += coding.code_size(d) as u64;
            }
            last = v;
        }

        // A zero max only happens when 0 is the cell's only value.
        let sample_bits = if max_sample == 0 {
            1
        } else {
            int_log2(max_sample + 1) as u8
        };
        let delta_offset_bits = if max_offset == 0 {
            1
        } else {
            int_log2(max_offset + 1) as u8
        };

        let samples_bm =
            Bitmap::from_values(&samples, sample_bits as u32).expect("cell has a sample");
        let deltas_bm = if cum_bits > 0 {
            let mut b = Bitmap::new(cum_bits);
            let mut pos = 0u64;
            for &d in &deltas {
                pos = coding.encode(&mut b, pos, d);
            }
            Some(b)
        } else {
            None
        };
        let delta_offsets_bm = Bitmap::from_values(&delta_offsets, delta_offset_bits as u32)
            .expect("cell has a sample");

        Self {
            sample_bits,
            delta_offset_bits,
            samples: samples_bm,
            deltas: deltas_bm,
            delta_offsets: delta_offsets_bm,
        }
    }

    #[inline]
    pub fn num_samples(&self) -> u64 {
        self.samples.size_bits() / self.sample_bits as u64
    }

    /// Value at index `i` within the cell.
    pub fn lookup(&self, i: u64, sampling_rate: u32, coding: DeltaCoding) -> u64 {
        let sample_off = i / sampling_rate as u64;
        let delta_idx = i % sampling_rate as u64;
        let val = self.samples.get_field(sample_off, self.sample_bits as u32);
        if delta_idx == 0 {
            return val;
        }
        let delta_off = self
            .delta_offsets
            .get_field(sample_off, self.delta_offset_bits as u32);
        match &self.deltas {
            Some(d) => val + coding.prefix_sum(d, delta_off, delta_idx),
            None => val,
        }
    }

    pub fn storage_bytes(&self) -> u64 {
        2 + self.samples.storage_bytes()
            + Bitmap::storage_bytes_opt(self.deltas.as_ref())
            + self.delta_offsets.storage_bytes()
    }

    pub fn write<W: Write>(&self, out: &mut CrcWriter<W>) -> io::Result<()> {
        stream::write_u8(out, self.sample_bits)?;
        stream::write_u8(out, self.delta_offset_bits)?;
        Bitmap::write_opt(out, Some(&self.samples))?;
        Bitmap::write_opt(out, self.deltas.as_ref())?;
        Bitmap::write_opt(out, Some(&self.delta_offsets))
    }

    pub fn read<R: Read>(input: &mut CrcReader<R>) -> io::Result<Self> {
        let sample_bits = stream::read_u8(input)?;
        let delta_offset_bits = stream::read_u8(input)?;
        let samples = Bitmap::read_opt(input)?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "cell is missing its samples")
        })?;
        let deltas = Bitmap::read_opt(input)?;
        let delta_offsets = Bitmap::read_opt(input)?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "cell is missing its offsets")
        })?;
        Ok(Self {
            sample_bits,
            delta_offset_bits,
            samples,
            deltas,
            delta_offsets,
        })
    }

    pub fn map_load(cur: &mut MapCursor) -> io::Result<Self> {
        let sample_bits = cur.read_u8()?;
        let delta_offset_bits = cur.read_u8()?;
        let samples = Bitmap::map_opt(cur)?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "cell is missing its samples")
        })?;
        let deltas = Bitmap::map_opt(cur)?;
        let delta_offsets = Bitmap::map_opt(cur)?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "cell is missing its offsets")
        })?;
        Ok(Self {
            sample_bits,
            delta_offset_bits,
            samples,
            deltas,
            delta_offsets,
        })
    }
}

/// NPA with one delta-encoded vector per character column.
pub struct DeltaNpa {
    pub(crate) coding: DeltaCoding,
    pub(crate) common: NpaCommon,
    pub(crate) cells: Vec<DeltaEncodedVector>,
}

impl DeltaNpa {
    pub(crate) fn encode(
        coding: DeltaCoding,
        scan: super::EncodeScan,
        context_len: u32,
        sampling_rate: u32,
        n: u64,
        sigma: u64,
    ) -> Self {
        let cells = scan
            .columns
            .iter()
            .map(|col| DeltaEncodedVector::create(col, sampling_rate, coding))
            .collect();
        let common = scan.into_common(context_len, sampling_rate, n, sigma);
        Self {
            coding,
            common,
            cells,
        }
    }

    #[inline]
    pub fn lookup(&self, i: u64) -> u64 {
        let col = column_of(&self.common.col_offsets, i);
        self.cells[col].lookup(
            i - self.common.col_offsets[col],
            self.common.sampling_rate,
            self.coding,
        )
    }

    /// Specialized binary search for the gamma encoding: binary search over
    /// the raw samples, then decode gaps only inside the one candidate
    /// sample block.
    ///
    /// The gap walk is bounded by the block's end offset, so a target that
    /// falls between the last value of a block and the next sample resolves
    /// to the block boundary instead of running into the next block's gap
    /// stream.
    pub fn binary_search_gamma(&self, val: u64, s: u64, e: u64, upper: bool) -> i64 {
        let col = column_of(&self.common.col_offsets, s);
        let col_off = self.common.col_offsets[col];
        let dv = &self.cells[col];
        let rate = self.common.sampling_rate as u64;
        let s_rel = s - col_off;
        let e_rel = e - col_off;

        // Largest sample index in range with sample value <= val.
        let mut sp = (s_rel / rate) as i64;
        let mut ep = (e_rel / rate) as i64;
        while sp <= ep {
            let m = (sp + ep) / 2;
            let sv = dv.samples.get_field(m as u64, dv.sample_bits as u32);
            if sv == val {
                sp = m;
                ep = m;
                break;
            } else if val < sv {
                ep = m - 1;
            } else {
                sp = m + 1;
            }
        }
        let sample_off = ep.max(0) as u64;

        let mut delta_sum = dv.samples.get_field(sample_off, dv.sample_bits as u32);
        let base = (col_off + sample_off * rate) as i64;
        if delta_sum >= val {
            return if delta_sum == val {
                base
            } else if upper {
                base - 1
            } else {
                base
            };
        }

        let mut delta_idx = 0u64;
        if let Some(deltas) = &dv.deltas {
            let start = dv
                .delta_offsets
                .get_field(sample_off, dv.delta_offset_bits as u32);
            let block_end = if sample_off + 1 < dv.num_samples() {
                dv.delta_offsets
                    .get_field(sample_off + 1, dv.delta_offset_bits as u32)
            } else {
                deltas.size_bits()
            };
            let (sum, used) = super::gamma::gamma_walk_until(
                deltas,
                start,
                block_end,
                delta_sum,
                val,
                rate - 1,
            );
            delta_sum = sum;
            delta_idx = used;
        }

        let res = base + delta_idx as i64;
        if delta_sum == val {
            res
        } else if delta_sum > val {
            if upper {
                res - 1
            } else {
                res
            }
        } else {
            // Every value up to the block end is below val.
            if upper {
                res
            } else {
                res + 1
            }
        }
    }

    pub fn storage_bytes(&self) -> u64 {
        self.common.storage_bytes()
            + self
                .cells
                .iter()
                .map(DeltaEncodedVector::storage_bytes)
                .sum::<u64>()
    }

    pub(crate) fn write_cells<W: Write>(&self, out: &mut CrcWriter<W>) -> io::Result<()> {
        for cell in &self.cells {
            cell.write(out)?;
        }
        Ok(())
    }

    pub(crate) fn read_cells<R: Read>(
        common: NpaCommon,
        coding: DeltaCoding,
        input: &mut CrcReader<R>,
    ) -> io::Result<Self> {
        let mut cells = Vec::with_capacity(common.sigma_size as usize);
        for _ in 0..common.sigma_size {
            cells.push(DeltaEncodedVector::read(input)?);
        }
        Ok(Self {
            coding,
            common,
            cells,
        })
    }

    pub(crate) fn map_cells(
        common: NpaCommon,
        coding: DeltaCoding,
        cur: &mut MapCursor,
    ) -> io::Result<Self> {
        let mut cells = Vec::with_capacity(common.sigma_size as usize);
        for _ in 0..common.sigma_size {
            cells.push(DeltaEncodedVector::map_load(cur)?);
        }
        Ok(Self {
            coding,
            common,
            cells,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(coding: DeltaCoding, data: &[u64], rate: u32) {
        let dv = DeltaEncodedVector::create(data, rate, coding);
        for (i, &v) in data.iter().enumerate() {
            assert_eq!(
                dv.lookup(i as u64, rate, coding),
                v,
                "{:?} rate {} index {}",
                coding,
                rate,
                i
            );
        }
    }

    #[test]
    fn dev_roundtrip_both_codings() {
        let data: Vec<u64> = (0..300).map(|i| i * 8 + (i % 7)).collect();
        for coding in [DeltaCoding::Gamma, DeltaCoding::Delta] {
            for rate in [1u32, 2, 3, 8, 16, 128] {
                roundtrip(coding, &data, rate);
            }
        }
    }

    #[test]
    fn dev_roundtrip_irregular_gaps() {
        // Gaps spanning several code-length classes, including >16-bit codes.
        let mut data = vec![0u64];
        for (i, gap) in [1u64, 1, 900, 2, 70000, 3, 5, 100000, 1, 12]
            .iter()
            .cycle()
            .take(60)
            .enumerate()
        {
            let last = *data.last().expect("non-empty");
            data.push(last + gap + (i as u64 % 2));
        }
        for coding in [DeltaCoding::Gamma, DeltaCoding::Delta] {
            roundtrip(coding, &data, 4);
        }
    }

    #[test]
    fn dev_single_value_cell() {
        for coding in [DeltaCoding::Gamma, DeltaCoding::Delta] {
            let dv = DeltaEncodedVector::create(&[0], 128, coding);
            assert_eq!(dv.lookup(0, 128, coding), 0);
            assert!(dv.deltas.is_none());
        }
    }

    #[test]
    fn delta_coding_primitives() {
        let values = [1u64, 2, 3, 4, 16, 17, 255, 256, 1 << 33];
        let coding = DeltaCoding::Delta;
        let total: u64 = values.iter().map(|&v| coding.code_size(v) as u64).sum();
        let mut b = Bitmap::new(total);
        let mut pos = 0;
        for &v in &values {
            pos = coding.encode(&mut b, pos, v);
        }
        assert_eq!(pos, total);
        let mut off = 0;
        for &v in &values {
            assert_eq!(coding.decode(&b, &mut off), v);
        }
    }

    #[test]
    fn dev_serialize_roundtrip() {
        let data: Vec<u64> = (0..100).map(|i| i * 5 + 2).collect();
        let dv = DeltaEncodedVector::create(&data, 8, DeltaCoding::Gamma);

        let mut buf = Vec::new();
        {
            let mut w = CrcWriter::new(&mut buf);
            dv.write(&mut w).unwrap();
            w.finish().unwrap();
        }
        let mut r = CrcReader::new(&buf[..]);
        let back = DeltaEncodedVector::read(&mut r).unwrap();
        r.finish().unwrap();

        for (i, &v) in data.iter().enumerate() {
            assert_eq!(back.lookup(i as u64, 8, DeltaCoding::Gamma), v);
        }
    }
}
