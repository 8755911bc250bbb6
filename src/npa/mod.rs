// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! NPA: the next-pointer array, navigation primitive of the whole index.
//!
//! `npa[i] = isa[(sa[i] + 1) mod n]` — given the rank of a rotation, the rank
//! of the rotation one character later. Every decode operation is a bounded
//! chain of these hops, and backward search narrows rank ranges with binary
//! searches over them.
//!
//! Ranks partition into per-character *columns* (rotations grouped by first
//! byte), and within a column into *cells* (grouped by the context: the next
//! `context_len` characters). NPA values are strictly increasing within a
//! column, which is what makes sample-plus-delta coding work. Three
//! interchangeable encodings share the same cell scan:
//!
//! ```text
//!              ┌────────────────┐
//!              │  encode scan   │  contexts, col/cell boundaries,
//!              │  (this module) │  non-empty-cell maps, row offsets
//!              └──────┬─────────┘
//!        ┌────────────┼──────────────┐
//!        ▼            ▼              ▼
//!  Elias-gamma   Elias-delta   wavelet tree
//!  (delta.rs)    (delta.rs)    (wavelet.rs)
//! ```
//!
//! Encoding selection is a sum type, not a cast: the [`Npa`] enum dispatches
//! to the concrete encoding chosen at construction.

mod delta;
mod gamma;
mod wavelet;

pub use delta::{DeltaCoding, DeltaEncodedVector, DeltaNpa};
pub use wavelet::WaveletNpa;

use std::collections::BTreeMap;
use std::io::{self, Read, Write};

use crate::bits::Bitmap;
use crate::stream::{self, CrcReader, CrcWriter, MapCursor};
use crate::util::rank_leq;

/// On-disk identifiers for the NPA encodings.
#[derive(Clone, Copy, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
pub enum NpaScheme {
    WaveletTree = 0,
    EliasDelta = 1,
    EliasGamma = 2,
}

impl NpaScheme {
    pub fn from_u64(v: u64) -> Option<Self> {
        match v {
            0 => Some(NpaScheme::WaveletTree),
            1 => Some(NpaScheme::EliasDelta),
            2 => Some(NpaScheme::EliasGamma),
            _ => None,
        }
    }
}

/// Cell geometry and metadata shared by every encoding.
pub struct NpaCommon {
    pub npa_size: u64,
    pub sigma_size: u64,
    pub context_len: u32,
    pub sampling_rate: u32,
    /// context value -> context id, ids dense in sorted-value order.
    pub contexts: BTreeMap<u64, u64>,
    /// Start of each context row in NPA value space.
    pub row_offsets: Vec<u64>,
    /// Start rank of each character column.
    pub col_offsets: Vec<u64>,
    /// Per column: context ids of its non-empty cells, in rank order.
    pub col_nec: Vec<Vec<u64>>,
    /// Per context row: column ids of its non-empty cells, ascending.
    pub row_nec: Vec<Vec<u64>>,
    /// Per column: cell start positions relative to the column start.
    pub cell_offsets: Vec<Vec<u64>>,
}

impl NpaCommon {
    pub fn storage_bytes(&self) -> u64 {
        let vec_bytes = |v: &Vec<u64>| 8 + v.len() as u64 * 8;
        8 + 8 + 8 + 4 + 4
            + 8
            + self.contexts.len() as u64 * 16
            + vec_bytes(&self.row_offsets)
            + vec_bytes(&self.col_offsets)
            + self.col_nec.iter().map(vec_bytes).sum::<u64>()
            + self.row_nec.iter().map(vec_bytes).sum::<u64>()
            + self.cell_offsets.iter().map(vec_bytes).sum::<u64>()
    }

    fn write<W: Write>(&self, out: &mut CrcWriter<W>, scheme: NpaScheme) -> io::Result<()> {
        stream::write_u64(out, scheme as u64)?;
        stream::write_u64(out, self.npa_size)?;
        stream::write_u64(out, self.sigma_size)?;
        stream::write_u32(out, self.context_len)?;
        stream::write_u32(out, self.sampling_rate)?;

        stream::write_u64(out, self.contexts.len() as u64)?;
        for (&value, &id) in &self.contexts {
            stream::write_u64(out, value)?;
            stream::write_u64(out, id)?;
        }

        stream::write_vec_u64(out, &self.row_offsets)?;
        stream::write_vec_u64(out, &self.col_offsets)?;
        for v in &self.col_nec {
            stream::write_vec_u64(out, v)?;
        }
        for v in &self.row_nec {
            stream::write_vec_u64(out, v)?;
        }
        for v in &self.cell_offsets {
            stream::write_vec_u64(out, v)?;
        }
        Ok(())
    }

    fn read<R: Read>(input: &mut CrcReader<R>) -> io::Result<(Self, NpaScheme)> {
        let scheme_raw = stream::read_u64(input)?;
        let scheme = NpaScheme::from_u64(scheme_raw).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown NPA encoding scheme {}", scheme_raw),
            )
        })?;
        let npa_size = stream::read_u64(input)?;
        let sigma_size = stream::read_u64(input)?;
        let context_len = stream::read_u32(input)?;
        let sampling_rate = stream::read_u32(input)?;

        let context_count = stream::read_u64(input)?;
        let mut contexts = BTreeMap::new();
        for _ in 0..context_count {
            let value = stream::read_u64(input)?;
            let id = stream::read_u64(input)?;
            contexts.insert(value, id);
        }

        let row_offsets = stream::read_vec_u64(input)?;
        let col_offsets = stream::read_vec_u64(input)?;
        if col_offsets.len() as u64 != sigma_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "col_offsets has {} entries for sigma {}",
                    col_offsets.len(),
                    sigma_size
                ),
            ));
        }
        let mut col_nec = Vec::with_capacity(sigma_size as usize);
        for _ in 0..sigma_size {
            col_nec.push(stream::read_vec_u64(input)?);
        }
        let mut row_nec = Vec::with_capacity(contexts.len());
        for _ in 0..contexts.len() {
            row_nec.push(stream::read_vec_u64(input)?);
        }
        let mut cell_offsets = Vec::with_capacity(sigma_size as usize);
        for _ in 0..sigma_size {
            cell_offsets.push(stream::read_vec_u64(input)?);
        }

        Ok((
            Self {
                npa_size,
                sigma_size,
                context_len,
                sampling_rate,
                contexts,
                row_offsets,
                col_offsets,
                col_nec,
                row_nec,
                cell_offsets,
            },
            scheme,
        ))
    }

    fn map_load(cur: &mut MapCursor) -> io::Result<(Self, NpaScheme)> {
        let scheme_raw = cur.read_u64()?;
        let scheme = NpaScheme::from_u64(scheme_raw).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown NPA encoding scheme {}", scheme_raw),
            )
        })?;
        let npa_size = cur.read_u64()?;
        let sigma_size = cur.read_u64()?;
        let context_len = cur.read_u32()?;
        let sampling_rate = cur.read_u32()?;

        let context_count = cur.read_u64()?;
        let mut contexts = BTreeMap::new();
        for _ in 0..context_count {
            let value = cur.read_u64()?;
            let id = cur.read_u64()?;
            contexts.insert(value, id);
        }

        let row_offsets = cur.read_vec_u64()?;
        let col_offsets = cur.read_vec_u64()?;
        if col_offsets.len() as u64 != sigma_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "col_offsets has {} entries for sigma {}",
                    col_offsets.len(),
                    sigma_size
                ),
            ));
        }
        let mut col_nec = Vec::with_capacity(sigma_size as usize);
        for _ in 0..sigma_size {
            col_nec.push(cur.read_vec_u64()?);
        }
        let mut row_nec = Vec::with_capacity(contexts.len());
        for _ in 0..contexts.len() {
            row_nec.push(cur.read_vec_u64()?);
        }
        let mut cell_offsets = Vec::with_capacity(sigma_size as usize);
        for _ in 0..sigma_size {
            cell_offsets.push(cur.read_vec_u64()?);
        }

        Ok((
            Self {
                npa_size,
                sigma_size,
                context_len,
                sampling_rate,
                contexts,
                row_offsets,
                col_offsets,
                col_nec,
                row_nec,
                cell_offsets,
            },
            scheme,
        ))
    }
}

/// Construction inputs: the compacted symbol stream plus SA and ISA.
pub(crate) struct EncodeInput<'a> {
    pub data: &'a Bitmap,
    pub sa: &'a Bitmap,
    pub isa: &'a Bitmap,
    pub n: u64,
    pub sigma: u64,
    pub sigma_bits: u32,
    pub pos_bits: u32,
}

impl EncodeInput<'_> {
    #[inline]
    fn symbol(&self, pos: u64) -> u64 {
        self.data.get_field(pos, self.sigma_bits)
    }

    /// Radix hash of the `context_len` symbols starting at `pos`, wrapping
    /// around the end of the input.
    fn context_value(&self, pos: u64, context_len: u32) -> u64 {
        let mut val = 0u64;
        for t in 0..context_len as u64 {
            let p = (pos + t) % self.n;
            val = val.wrapping_mul(self.sigma).wrapping_add(self.symbol(p));
        }
        val
    }
}

/// Everything the shared scan learns about cells, plus the raw per-column
/// NPA value lists the encoders consume.
pub(crate) struct EncodeScan {
    pub contexts: BTreeMap<u64, u64>,
    pub row_offsets: Vec<u64>,
    pub col_offsets: Vec<u64>,
    pub col_nec: Vec<Vec<u64>>,
    pub row_nec: Vec<Vec<u64>>,
    pub cell_offsets: Vec<Vec<u64>>,
    /// Cumulative count of non-empty cells per context row.
    pub column_sizes: Vec<u64>,
    /// Per context row: (column id, start within column, length) per cell.
    pub rows: Vec<Vec<(u64, u64, u64)>>,
    /// NPA values per character column, in rank order.
    pub columns: Vec<Vec<u64>>,
}

impl EncodeScan {
    fn into_common(self, context_len: u32, sampling_rate: u32, n: u64, sigma: u64) -> NpaCommon {
        NpaCommon {
            npa_size: n,
            sigma_size: sigma,
            context_len,
            sampling_rate,
            contexts: self.contexts,
            row_offsets: self.row_offsets,
            col_offsets: self.col_offsets,
            col_nec: self.col_nec,
            row_nec: self.row_nec,
            cell_offsets: self.cell_offsets,
        }
    }
}

/// One pass over rank space, grouping ranks into columns and cells.
pub(crate) fn encode_scan(input: &EncodeInput<'_>, context_len: u32) -> EncodeScan {
    let n = input.n;
    let sigma = input.sigma as usize;

    // Assign dense context ids in sorted context-value order.
    let mut contexts: BTreeMap<u64, u64> = BTreeMap::new();
    for i in 0..n {
        contexts.entry(input.context_value(i, context_len)).or_insert(0);
    }
    let mut next_id = 0u64;
    for id in contexts.values_mut() {
        *id = next_id;
        next_id += 1;
    }
    let k = next_id as usize;

    let mut col_offsets: Vec<u64> = Vec::with_capacity(sigma);
    let mut cell_offsets: Vec<Vec<u64>> = vec![Vec::new(); sigma];
    let mut col_nec: Vec<Vec<u64>> = vec![Vec::new(); sigma];
    let mut columns: Vec<Vec<u64>> = vec![Vec::new(); sigma];

    let mut cur_col = 0usize;
    let mut col_start = 0u64;
    let mut prev_sa = 0u64;
    let mut prev_ctx = 0u64;

    for i in 0..n {
        let k1 = input.sa.get_field(i, input.pos_bits);
        let succ = (k1 + 1) % n;
        let npa_val = input.isa.get_field(succ, input.pos_bits);
        let ctx = contexts[&input.context_value(succ, context_len)];

        if i == 0 {
            col_offsets.push(0);
            cell_offsets[0].push(0);
            col_nec[0].push(ctx);
        } else {
            let k2 = prev_sa;
            if input.symbol(k1) != input.symbol(k2) {
                cur_col += 1;
                col_start = i;
                col_offsets.push(i);
                cell_offsets[cur_col].push(0);
                col_nec[cur_col].push(ctx);
            } else if ctx != prev_ctx {
                // Context changed within the column: new cell.
                cell_offsets[cur_col].push(i - col_start);
                col_nec[cur_col].push(ctx);
            }
        }

        columns[cur_col].push(npa_val);
        prev_sa = k1;
        prev_ctx = ctx;
    }

    debug_assert_eq!(col_offsets.len(), sigma);

    // Row-major view: for each context row, its cells in column order.
    let mut rows: Vec<Vec<(u64, u64, u64)>> = vec![Vec::new(); k];
    for c in 0..sigma {
        for t in 0..col_nec[c].len() {
            let ctx = col_nec[c][t] as usize;
            let start = cell_offsets[c][t];
            let end = if t + 1 < cell_offsets[c].len() {
                cell_offsets[c][t + 1]
            } else {
                columns[c].len() as u64
            };
            rows[ctx].push((c as u64, start, end - start));
        }
    }

    let mut row_offsets = Vec::with_capacity(k);
    let mut row_nec: Vec<Vec<u64>> = vec![Vec::new(); k];
    let mut column_sizes = Vec::with_capacity(k);
    let mut p = 0u64;
    let mut cells_seen = 0u64;
    for (ctx, cells) in rows.iter().enumerate() {
        row_offsets.push(p);
        for &(col, _, len) in cells {
            row_nec[ctx].push(col);
            p += len;
        }
        cells_seen += cells.len() as u64;
        column_sizes.push(cells_seen);
    }

    EncodeScan {
        contexts,
        row_offsets,
        col_offsets,
        col_nec,
        row_nec,
        cell_offsets,
        column_sizes,
        rows,
        columns,
    }
}

/// The next-pointer array under one of its three encodings.
pub enum Npa {
    EliasGamma(DeltaNpa),
    EliasDelta(DeltaNpa),
    WaveletTree(WaveletNpa),
}

impl Npa {
    /// Build the NPA from construction inputs under the chosen scheme.
    pub(crate) fn encode(
        scheme: NpaScheme,
        input: &EncodeInput<'_>,
        context_len: u32,
        sampling_rate: u32,
    ) -> Self {
        let scan = encode_scan(input, context_len);
        match scheme {
            NpaScheme::EliasGamma => Npa::EliasGamma(DeltaNpa::encode(
                DeltaCoding::Gamma,
                scan,
                context_len,
                sampling_rate,
                input.n,
                input.sigma,
            )),
            NpaScheme::EliasDelta => Npa::EliasDelta(DeltaNpa::encode(
                DeltaCoding::Delta,
                scan,
                context_len,
                sampling_rate,
                input.n,
                input.sigma,
            )),
            NpaScheme::WaveletTree => Npa::WaveletTree(WaveletNpa::encode(
                scan,
                context_len,
                sampling_rate,
                input.n,
                input.sigma,
            )),
        }
    }

    #[inline]
    fn common(&self) -> &NpaCommon {
        match self {
            Npa::EliasGamma(npa) | Npa::EliasDelta(npa) => &npa.common,
            Npa::WaveletTree(npa) => &npa.common,
        }
    }

    pub fn scheme(&self) -> NpaScheme {
        match self {
            Npa::EliasGamma(_) => NpaScheme::EliasGamma,
            Npa::EliasDelta(_) => NpaScheme::EliasDelta,
            Npa::WaveletTree(_) => NpaScheme::WaveletTree,
        }
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.common().npa_size
    }

    #[inline]
    pub fn sampling_rate(&self) -> u32 {
        self.common().sampling_rate
    }

    #[inline]
    pub fn context_len(&self) -> u32 {
        self.common().context_len
    }

    /// The next-pointer value at rank `i`.
    #[inline]
    pub fn lookup(&self, i: u64) -> u64 {
        match self {
            Npa::EliasGamma(npa) | Npa::EliasDelta(npa) => npa.lookup(i),
            Npa::WaveletTree(npa) => npa.lookup(i),
        }
    }

    /// Find, in `[s, e]`, the last index with value `<= val` (`upper` true)
    /// or the first index with value `>= val` (`upper` false).
    ///
    /// On an exact match the matching index is returned for either flag. The
    /// result may fall outside `[s, e]` when no qualifying index exists;
    /// callers detect emptiness with their `sp > ep` range check. `s` must be
    /// a column start (backward search always passes character buckets).
    pub fn binary_search(&self, val: u64, s: u64, e: u64, upper: bool) -> i64 {
        match self {
            Npa::EliasGamma(npa) => npa.binary_search_gamma(val, s, e, upper),
            _ => self.binary_search_by_lookup(val, s, e, upper),
        }
    }

    /// Plain binary search through `lookup`, used by the encodings without a
    /// specialized path.
    pub fn binary_search_by_lookup(&self, val: u64, s: u64, e: u64, upper: bool) -> i64 {
        let mut sp = s as i64;
        let mut ep = e as i64;
        while sp <= ep {
            let m = (sp + ep) / 2;
            let v = self.lookup(m as u64);
            if v == val {
                return m;
            } else if val < v {
                ep = m - 1;
            } else {
                sp = m + 1;
            }
        }
        if upper {
            ep
        } else {
            sp
        }
    }

    pub fn storage_bytes(&self) -> u64 {
        match self {
            Npa::EliasGamma(npa) | Npa::EliasDelta(npa) => npa.storage_bytes(),
            Npa::WaveletTree(npa) => npa.storage_bytes(),
        }
    }

    pub fn write<W: Write>(&self, out: &mut CrcWriter<W>) -> io::Result<()> {
        match self {
            Npa::EliasGamma(npa) | Npa::EliasDelta(npa) => {
                npa.common.write(out, self.scheme())?;
                npa.write_cells(out)
            }
            Npa::WaveletTree(npa) => {
                npa.common.write(out, NpaScheme::WaveletTree)?;
                npa.write_trees(out)
            }
        }
    }

    pub fn read<R: Read>(input: &mut CrcReader<R>, expected: NpaScheme) -> io::Result<Self> {
        let (common, scheme) = NpaCommon::read(input)?;
        if scheme != expected {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "index encoded with {:?} but loaded as {:?}",
                    scheme, expected
                ),
            ));
        }
        match scheme {
            NpaScheme::EliasGamma => Ok(Npa::EliasGamma(DeltaNpa::read_cells(
                common,
                DeltaCoding::Gamma,
                input,
            )?)),
            NpaScheme::EliasDelta => Ok(Npa::EliasDelta(DeltaNpa::read_cells(
                common,
                DeltaCoding::Delta,
                input,
            )?)),
            NpaScheme::WaveletTree => Ok(Npa::WaveletTree(WaveletNpa::read_trees(common, input)?)),
        }
    }

    pub fn map_load(cur: &mut MapCursor, expected: NpaScheme) -> io::Result<Self> {
        let (common, scheme) = NpaCommon::map_load(cur)?;
        if scheme != expected {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "index encoded with {:?} but loaded as {:?}",
                    scheme, expected
                ),
            ));
        }
        match scheme {
            NpaScheme::EliasGamma => Ok(Npa::EliasGamma(DeltaNpa::map_cells(
                common,
                DeltaCoding::Gamma,
                cur,
            )?)),
            NpaScheme::EliasDelta => Ok(Npa::EliasDelta(DeltaNpa::map_cells(
                common,
                DeltaCoding::Delta,
                cur,
            )?)),
            NpaScheme::WaveletTree => Ok(Npa::WaveletTree(WaveletNpa::map_trees(common, cur)?)),
        }
    }
}

/// Column of rank `i` given sorted column start offsets.
#[inline]
pub(crate) fn column_of(col_offsets: &[u64], i: u64) -> usize {
    (rank_leq(col_offsets, i) - 1) as usize
}

impl std::fmt::Debug for Npa {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Npa")
            .field("scheme", &self.scheme())
            .field("size", &self.size())
            .finish()
    }
}
