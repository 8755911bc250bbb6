// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! The core engine: alphabet + NPA + sampled SA/ISA under one roof.
//!
//! Construction is a one-shot batch: read the input, append the sentinel,
//! build the suffix array, derive the alphabet and bucket boundaries, invert
//! into the ISA, compact everything into bit-packed form, then encode the
//! NPA and sample SA/ISA under the configured schemes. After that the engine
//! is immutable except for the layered sampling structures.
//!
//! Two other ways in: deserialize a persisted index, or map it from disk
//! with the big immutable sections served zero-copy out of the file.
//!
//! Query primitives live here too: the four lookups, backward search
//! (narrowing a rank range one pattern byte at a time, right to left) and
//! comparison-based forward search.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::alphabet::Alphabet;
use crate::bits::Bitmap;
use crate::config::SuccinctConfig;
use crate::dictionary::Dictionary;
use crate::npa::{EncodeInput, Npa};
use crate::sais;
use crate::sampled::{
    LayeredIsa, LayeredSa, OpportunisticIsa, OpportunisticSa, SampledByIndexIsa,
    SampledByIndexSa, SampledByValueIsa, SampledByValueSa, SampledIsa, SampledSa, SamplingScheme,
};
use crate::stream::{self, CrcReader, CrcWriter, MapCursor};
use crate::util::int_log2;

/// Sentinel appended to the input; must sort below every input byte.
pub const SENTINEL: u8 = 1;

/// Name of the directory holding a persisted index.
pub fn index_dir(path: &Path) -> PathBuf {
    let mut name = path.file_name().map_or_else(
        || std::ffi::OsString::from("input"),
        std::ffi::OsStr::to_os_string,
    );
    name.push(".succinct");
    path.with_file_name(name)
}

/// Compressed index core over one input.
pub struct SuccinctCore {
    input_size: u64,
    alphabet: Alphabet,
    sa: SampledSa,
    isa: SampledIsa,
    npa: Npa,
}

impl SuccinctCore {
    /// One-time construction from raw input bytes.
    ///
    /// Bytes `0x00` and `0x01` are reserved (the sentinel must sort first)
    /// and rejected up front, as is empty input.
    pub fn construct(input: &[u8], config: &SuccinctConfig) -> io::Result<Self> {
        config.validate()?;
        if input.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot index empty input",
            ));
        }
        if let Some(pos) = input.iter().position(|&b| b <= SENTINEL) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "input byte {:#04x} at offset {} collides with the sentinel range",
                    input[pos], pos
                ),
            ));
        }

        let mut data = Vec::with_capacity(input.len() + 1);
        data.extend_from_slice(input);
        data.push(SENTINEL);
        let n = data.len() as u64;
        let pos_bits = int_log2(n + 1);

        // Suffix array, compacted.
        let sa_vec = sais::suffix_array(&data);
        let compact_sa = Bitmap::from_values(&sa_vec, pos_bits).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "suffix array construction failed")
        })?;

        // One scan in rank order: invert into the ISA and find the bucket
        // boundaries (ranks where the first byte changes).
        let mut compact_isa = Bitmap::new(n * pos_bits as u64);
        let mut symbol_map: BTreeMap<u8, (u64, u32)> = BTreeMap::new();
        let mut prev = sa_vec[0];
        compact_isa.set_field(prev, pos_bits, 0);
        symbol_map.insert(data[prev as usize], (0, 0));
        let mut sigma = 1u32;
        for (i, &cur) in sa_vec.iter().enumerate().skip(1) {
            compact_isa.set_field(cur, pos_bits, i as u64);
            if data[cur as usize] != data[prev as usize] {
                symbol_map.insert(data[cur as usize], (i as u64, sigma));
                sigma += 1;
            }
            prev = cur;
        }
        let alphabet = Alphabet::new(symbol_map, n);

        // Compact the input itself down to symbol ids.
        let sigma_bits = int_log2(sigma as u64 + 1);
        let mut data_bitmap = Bitmap::new(n * sigma_bits as u64);
        for (i, &b) in data.iter().enumerate() {
            let sym = alphabet.symbol_id(b).ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "alphabet scan out of sync")
            })?;
            data_bitmap.set_field(i as u64, sigma_bits, sym as u64);
        }
        drop(data);
        drop(sa_vec);

        let npa = Npa::encode(
            config.npa_encoding,
            &EncodeInput {
                data: &data_bitmap,
                sa: &compact_sa,
                isa: &compact_isa,
                n,
                sigma: sigma as u64,
                sigma_bits,
                pos_bits,
            },
            config.context_len,
            config.npa_sampling_rate,
        );
        drop(data_bitmap);
        drop(compact_isa);

        let sa = match config.sa_sampling_scheme {
            SamplingScheme::FlatByIndex => SampledSa::ByIndex(SampledByIndexSa::build(
                config.sa_sampling_rate,
                &compact_sa,
                n,
                pos_bits,
            )),
            SamplingScheme::FlatByValue => SampledSa::ByValue(SampledByValueSa::build(
                config.sa_sampling_rate,
                &compact_sa,
                n,
                pos_bits,
            )?),
            SamplingScheme::LayeredByIndex => SampledSa::Layered(LayeredSa::build(
                config.sa_sampling_rate,
                config.sa_sampling_rate * config.sampling_range,
                &compact_sa,
                n,
                pos_bits,
            )?),
            SamplingScheme::OpportunisticLayeredByIndex => {
                SampledSa::Opportunistic(OpportunisticSa::build(
                    config.sa_sampling_rate,
                    config.sa_sampling_rate * config.sampling_range,
                    &compact_sa,
                    n,
                    pos_bits,
                )?)
            }
        };

        let isa = match config.isa_sampling_scheme {
            SamplingScheme::FlatByIndex => SampledIsa::ByIndex(SampledByIndexIsa::build(
                config.isa_sampling_rate,
                &compact_sa,
                n,
                pos_bits,
            )),
            SamplingScheme::FlatByValue => {
                let positions = sa.sampled_positions().ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "by-value ISA sampling requires by-value SA sampling",
                    )
                })?;
                SampledIsa::ByValue(SampledByValueIsa::build(
                    config.sa_sampling_rate,
                    &compact_sa,
                    n,
                    pos_bits,
                    positions,
                )?)
            }
            SamplingScheme::LayeredByIndex => SampledIsa::Layered(LayeredIsa::build(
                config.isa_sampling_rate,
                config.isa_sampling_rate * config.sampling_range,
                &compact_sa,
                n,
                pos_bits,
            )?),
            SamplingScheme::OpportunisticLayeredByIndex => {
                SampledIsa::Opportunistic(OpportunisticIsa::build(
                    config.isa_sampling_rate,
                    config.isa_sampling_rate * config.sampling_range,
                    &compact_sa,
                    n,
                    pos_bits,
                )?)
            }
        };

        Ok(Self {
            input_size: n,
            alphabet,
            sa,
            isa,
            npa,
        })
    }

    /// Size of the indexed input, sentinel included.
    #[inline]
    pub fn input_size(&self) -> u64 {
        self.input_size
    }

    /// Size of the original input, without the sentinel.
    #[inline]
    pub fn original_size(&self) -> u64 {
        self.input_size - 1
    }

    #[inline]
    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    #[inline]
    pub fn npa(&self) -> &Npa {
        &self.npa
    }

    #[inline]
    pub fn sa(&self) -> &SampledSa {
        &self.sa
    }

    #[inline]
    pub fn isa(&self) -> &SampledIsa {
        &self.isa
    }

    /// Next-pointer value at rank `i`.
    #[inline]
    pub fn lookup_npa(&self, i: u64) -> u64 {
        self.npa.lookup(i)
    }

    /// Text position of the rank-`i` rotation.
    #[inline]
    pub fn lookup_sa(&self, i: u64) -> u64 {
        self.sa.lookup(&self.npa, i)
    }

    /// Rank of the rotation starting at text position `i`.
    #[inline]
    pub fn lookup_isa(&self, i: u64) -> u64 {
        self.isa.lookup(&self.npa, i)
    }

    /// Symbol id of the bucket containing rank `i`.
    #[inline]
    pub fn lookup_c(&self, i: u64) -> u32 {
        self.alphabet.lookup_c(i)
    }

    /// Byte at text position `pos`.
    pub fn char_at(&self, pos: u64) -> u8 {
        self.alphabet.char_of(self.lookup_c(self.lookup_isa(pos)))
    }

    /// Backward search: the rank range of rotations prefixed by `pattern`.
    ///
    /// Empty result is any range with `start > end`; callers check that, not
    /// an error. The empty pattern and patterns containing bytes absent from
    /// the input both come back empty.
    pub fn bwd_search(&self, pattern: &[u8]) -> (i64, i64) {
        let empty = (0i64, -1i64);
        let Some((&last, rest)) = pattern.split_last() else {
            return empty;
        };
        let Some((mut sp, mut ep)) = self.alphabet.bucket(last) else {
            return empty;
        };

        for &b in rest.iter().rev() {
            let Some((c1, c2)) = self.alphabet.bucket(b) else {
                return empty;
            };
            if c2 < c1 {
                return empty;
            }
            sp = self.npa.binary_search(sp as u64, c1 as u64, c2 as u64, false);
            ep = self.npa.binary_search(ep as u64, c1 as u64, c2 as u64, true);
            if sp > ep {
                return (sp, ep);
            }
        }
        (sp, ep)
    }

    /// Narrow an existing rank range by further pattern bytes (the pattern
    /// extends the already-matched string to the left).
    pub fn continue_bwd_search(&self, pattern: &[u8], range: (i64, i64)) -> (i64, i64) {
        let empty = (0i64, -1i64);
        let (mut sp, mut ep) = range;
        if sp > ep {
            return empty;
        }
        for &b in pattern.iter().rev() {
            let Some((c1, c2)) = self.alphabet.bucket(b) else {
                return empty;
            };
            if c2 < c1 {
                return empty;
            }
            sp = self.npa.binary_search(sp as u64, c1 as u64, c2 as u64, false);
            ep = self.npa.binary_search(ep as u64, c1 as u64, c2 as u64, true);
            if sp > ep {
                return (sp, ep);
            }
        }
        (sp, ep)
    }

    /// Compare `pattern` against the rotation at rank `i`, skipping
    /// `offset` leading characters of the rotation.
    fn compare_at(&self, pattern: &[u8], i: u64, offset: u64) -> std::cmp::Ordering {
        let mut i = i;
        for _ in 0..offset {
            i = self.lookup_npa(i);
        }
        for &p in pattern {
            let c = self.alphabet.char_of(self.lookup_c(i));
            match p.cmp(&c) {
                std::cmp::Ordering::Equal => {}
                other => return other,
            }
            i = self.lookup_npa(i);
        }
        std::cmp::Ordering::Equal
    }

    /// Forward search: binary search rank space by rotation comparison.
    pub fn fwd_search(&self, pattern: &[u8]) -> (i64, i64) {
        if pattern.is_empty() {
            return (0, -1);
        }
        let mut sp = 0i64;
        let mut st = self.input_size as i64 - 1;
        while sp < st {
            let s = (sp + st) / 2;
            if self.compare_at(pattern, s as u64, 0) == std::cmp::Ordering::Greater {
                sp = s + 1;
            } else {
                st = s;
            }
        }

        let mut ep = sp - 1;
        let mut et = self.input_size as i64 - 1;
        while ep < et {
            let e = (ep + et + 1) / 2;
            if self.compare_at(pattern, e as u64, 0) == std::cmp::Ordering::Equal {
                ep = e;
            } else {
                et = e - 1;
            }
        }

        (sp, ep)
    }

    /// Narrow an existing forward-search range by further pattern bytes at
    /// depth `len`.
    pub fn continue_fwd_search(&self, pattern: &[u8], range: (i64, i64), len: u64) -> (i64, i64) {
        if pattern.is_empty() {
            return range;
        }
        if range.0 > range.1 {
            return (0, -1);
        }
        let mut sp = range.0;
        let mut st = range.1;
        while sp < st {
            let s = (sp + st) / 2;
            if self.compare_at(pattern, s as u64, len) == std::cmp::Ordering::Greater {
                sp = s + 1;
            } else {
                st = s;
            }
        }

        let mut ep = sp - 1;
        let mut et = range.1;
        while ep < et {
            let e = (ep + et + 1) / 2;
            if self.compare_at(pattern, e as u64, len) == std::cmp::Ordering::Equal {
                ep = e;
            } else {
                et = e - 1;
            }
        }

        (sp, ep)
    }

    /// Rebuild one sampling layer on SA and ISA. Returns bits added; zero
    /// when the layer already exists (idempotent).
    pub fn reconstruct_layer(&self, layer_id: u32) -> u64 {
        self.sa.reconstruct_layer(&self.npa, layer_id)
            + self.isa.reconstruct_layer(&self.npa, layer_id)
    }

    /// Drop one sampling layer on SA and ISA. Returns bits freed; zero when
    /// the layer is already absent.
    pub fn remove_layer(&self, layer_id: u32) -> u64 {
        self.sa.remove_layer(layer_id) + self.isa.remove_layer(layer_id)
    }

    /// Materialized sample count (opportunistic ISA scheme).
    pub fn num_sampled_values(&self) -> u64 {
        self.isa.num_sampled_values()
    }

    /// Offer a computed ISA value to pending opportunistic layers.
    #[inline]
    pub fn isa_store(&self, pos: u64, value: u64) -> bool {
        self.isa.store(pos, value)
    }

    /// In-memory footprint of the persisted representation.
    pub fn storage_bytes(&self) -> u64 {
        let dict = self
            .sa
            .sampled_positions()
            .map_or(0, |d| d.storage_bytes());
        8 + self.alphabet.storage_bytes()
            + dict
            + self.sa.storage_bytes()
            + self.isa.storage_bytes()
            + self.npa.storage_bytes()
    }

    /// Persist into `dir` as `metadata`, `sa`, `isa` and `npa` section
    /// files. Returns total bytes written.
    pub fn serialize(&self, dir: &Path) -> io::Result<u64> {
        fs::create_dir_all(dir)?;
        let mut total = 0u64;

        let mut meta = CrcWriter::new(BufWriter::new(File::create(dir.join("metadata"))?));
        stream::write_u64(&mut meta, self.input_size)?;
        self.alphabet.write(&mut meta)?;
        if let Some(d) = self.sa.sampled_positions() {
            Dictionary::write(&mut meta, Some(d.as_ref()))?;
        }
        total += meta.finish()?;

        let mut sa_out = CrcWriter::new(BufWriter::new(File::create(dir.join("sa"))?));
        self.sa.write(&mut sa_out)?;
        total += sa_out.finish()?;

        let mut isa_out = CrcWriter::new(BufWriter::new(File::create(dir.join("isa"))?));
        self.isa.write(&mut isa_out)?;
        total += isa_out.finish()?;

        let mut npa_out = CrcWriter::new(BufWriter::new(File::create(dir.join("npa"))?));
        self.npa.write(&mut npa_out)?;
        total += npa_out.finish()?;

        Ok(total)
    }

    /// Deserialize an index persisted by [`SuccinctCore::serialize`]. The
    /// configuration must match the one used at construction.
    pub fn load(dir: &Path, config: &SuccinctConfig) -> io::Result<Self> {
        config.validate()?;

        let mut meta = CrcReader::new(BufReader::new(File::open(dir.join("metadata"))?));
        let input_size = stream::read_u64(&mut meta)?;
        let alphabet = Alphabet::read(&mut meta)?;
        let positions = if config.sa_sampling_scheme == SamplingScheme::FlatByValue {
            let d = Dictionary::read(&mut meta)?.ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    "by-value index missing its sampled-positions dictionary",
                )
            })?;
            Some(Arc::new(d))
        } else {
            None
        };
        meta.finish()?;

        let mut sa_in = CrcReader::new(BufReader::new(File::open(dir.join("sa"))?));
        let mut sa = SampledSa::read(
            &mut sa_in,
            config.sa_sampling_scheme,
            config.sa_sampling_rate,
            config.sampling_range,
        )?;
        sa_in.finish()?;

        let mut isa_in = CrcReader::new(BufReader::new(File::open(dir.join("isa"))?));
        let mut isa = SampledIsa::read(
            &mut isa_in,
            config.isa_sampling_scheme,
            config.isa_sampling_rate,
            config.sampling_range,
        )?;
        isa_in.finish()?;

        if let Some(d) = positions {
            sa.set_sampled_positions(Arc::clone(&d));
            isa.set_sampled_positions(d);
        }

        let mut npa_in = CrcReader::new(BufReader::new(File::open(dir.join("npa"))?));
        let npa = Npa::read(&mut npa_in, config.npa_encoding)?;
        npa_in.finish()?;

        if npa.size() != input_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "NPA covers {} positions but metadata says {}",
                    npa.size(),
                    input_size
                ),
            ));
        }

        Ok(Self {
            input_size,
            alphabet,
            sa,
            isa,
            npa,
        })
    }

    /// Memory-map a persisted index. Immutable sections are served straight
    /// from the mapped files; layer storage is copied (it is written to at
    /// runtime). Each section's checksum is verified once at open.
    pub fn map(dir: &Path, config: &SuccinctConfig) -> io::Result<Self> {
        config.validate()?;

        let mut meta = MapCursor::open(&dir.join("metadata"))?;
        let input_size = meta.read_u64()?;
        let alphabet = Alphabet::map_load(&mut meta)?;
        let positions = if config.sa_sampling_scheme == SamplingScheme::FlatByValue {
            let d = Dictionary::map(&mut meta)?.ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    "by-value index missing its sampled-positions dictionary",
                )
            })?;
            Some(Arc::new(d))
        } else {
            None
        };

        let mut sa_cur = MapCursor::open(&dir.join("sa"))?;
        let mut sa = SampledSa::map_load(
            &mut sa_cur,
            config.sa_sampling_scheme,
            config.sa_sampling_rate,
            config.sampling_range,
        )?;

        let mut isa_cur = MapCursor::open(&dir.join("isa"))?;
        let mut isa = SampledIsa::map_load(
            &mut isa_cur,
            config.isa_sampling_scheme,
            config.isa_sampling_rate,
            config.sampling_range,
        )?;

        if let Some(d) = positions {
            sa.set_sampled_positions(Arc::clone(&d));
            isa.set_sampled_positions(d);
        }

        let mut npa_cur = MapCursor::open(&dir.join("npa"))?;
        let npa = Npa::map_load(&mut npa_cur, config.npa_encoding)?;

        if npa.size() != input_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "NPA covers {} positions but metadata says {}",
                    npa.size(),
                    input_size
                ),
            ));
        }

        Ok(Self {
            input_size,
            alphabet,
            sa,
            isa,
            npa,
        })
    }
}

impl std::fmt::Debug for SuccinctCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuccinctCore")
            .field("input_size", &self.input_size)
            .field("sigma", &self.alphabet.sigma())
            .field("npa", &self.npa.scheme())
            .finish()
    }
}
