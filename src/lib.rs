// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Compressed full-text index with queries that run on the compressed data.
//!
//! The input is never stored; what is stored is a navigable form of its
//! suffix-array structure, small enough to beat the raw text and rich enough
//! to answer `search`, `count` and `extract` without decompressing anything.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────────────┐
//! │ bits.rs  │──▶│ dictionary.rs │──▶│ npa/ (3 encodings)│
//! │ (bit-    │   │ (rank/select) │   │ gamma·delta·wavelet│
//! │  packed) │   └──────────────┘   └─────────┬─────────┘
//! └────┬─────┘                                │
//!      │         ┌──────────────┐             ▼
//!      └────────▶│   sampled/    │◀──── NPA hop chains
//!                │ SA / ISA, 4   │
//!                │ schemes,      │
//!                │ layers        │
//!                └──────┬───────┘
//!                       ▼
//!              ┌─────────────────┐
//!              │    core.rs      │  construct / load / mmap,
//!              │  SuccinctCore   │  lookups, backward search
//!              └──────┬──────────┘
//!        ┌────────────┼────────────────┐
//!        ▼            ▼                ▼
//!   SuccinctFile  SuccinctShard   AdaptiveShard
//!   (flat text)   (key-value)     (runtime layers)
//! ```
//!
//! # Usage
//!
//! ```
//! use terse::{SuccinctConfig, SuccinctFile};
//!
//! let config = SuccinctConfig {
//!     sa_sampling_rate: 4,
//!     isa_sampling_rate: 4,
//!     npa_sampling_rate: 8,
//!     ..SuccinctConfig::default()
//! };
//! let index = SuccinctFile::construct(b"banana bandana", &config).unwrap();
//!
//! assert_eq!(index.count(b"ana"), 3);
//! assert_eq!(index.extract(7, 7), b"bandana");
//! ```

pub mod alphabet;
pub mod bits;
pub mod dictionary;
pub mod npa;
pub mod sampled;
pub mod stream;

mod adaptive;
mod config;
mod core;
mod file;
mod sais;
mod shard;
mod util;

pub use adaptive::AdaptiveShard;
pub use alphabet::Alphabet;
pub use bits::Bitmap;
pub use config::SuccinctConfig;
pub use self::core::{index_dir, SuccinctCore, SENTINEL};
pub use dictionary::Dictionary;
pub use file::SuccinctFile;
pub use npa::{Npa, NpaScheme};
pub use sais::suffix_array;
pub use sampled::{SampledIsa, SampledSa, SamplingScheme};
pub use shard::SuccinctShard;

#[cfg(test)]
mod tests {
    //! Cross-component properties: every query must agree with a naive scan
    //! of the uncompressed input, for every encoding and sampling scheme.

    use super::*;
    use proptest::prelude::*;

    fn small_config(encoding: NpaScheme, sampling: SamplingScheme) -> SuccinctConfig {
        SuccinctConfig {
            sa_sampling_rate: 4,
            isa_sampling_rate: 4,
            npa_sampling_rate: 8,
            context_len: 2,
            npa_encoding: encoding,
            sa_sampling_scheme: sampling,
            isa_sampling_scheme: sampling,
            sampling_range: 4,
        }
    }

    fn naive_occurrences(text: &[u8], pattern: &[u8]) -> Vec<u64> {
        if pattern.is_empty() || pattern.len() > text.len() {
            return Vec::new();
        }
        (0..=text.len() - pattern.len())
            .filter(|&i| &text[i..i + pattern.len()] == pattern)
            .map(|i| i as u64)
            .collect()
    }

    fn all_schemes() -> Vec<(NpaScheme, SamplingScheme)> {
        let encodings = [
            NpaScheme::EliasGamma,
            NpaScheme::EliasDelta,
            NpaScheme::WaveletTree,
        ];
        let samplings = [
            SamplingScheme::FlatByIndex,
            SamplingScheme::FlatByValue,
            SamplingScheme::LayeredByIndex,
            SamplingScheme::OpportunisticLayeredByIndex,
        ];
        let mut out = Vec::new();
        for &e in &encodings {
            for &s in &samplings {
                out.push((e, s));
            }
        }
        out
    }

    #[test]
    fn every_scheme_agrees_with_naive_scan() {
        let text = b"the quick brown fox jumps over the lazy dog and the quick cat";
        for (encoding, sampling) in all_schemes() {
            let index =
                SuccinctFile::construct(text, &small_config(encoding, sampling)).unwrap();
            for pattern in [&b"the"[..], b"quick", b"q", b"og a", b"zebra", b" "] {
                let mut got = index.search(pattern);
                got.sort_unstable();
                let want = naive_occurrences(text, pattern);
                assert_eq!(
                    got, want,
                    "search mismatch: {:?}/{:?} pattern {:?}",
                    encoding, sampling, pattern
                );
                assert_eq!(index.count(pattern), want.len() as u64);
            }
            assert_eq!(index.extract(4, 11), b"quick brown");
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn search_matches_naive_scan(
            text in proptest::collection::vec(prop_oneof![Just(b'a'), Just(b'b'), Just(b'c')], 1..120),
            pattern in proptest::collection::vec(prop_oneof![Just(b'a'), Just(b'b'), Just(b'c')], 1..5),
        ) {
            let config = small_config(NpaScheme::EliasGamma, SamplingScheme::FlatByIndex);
            let index = SuccinctFile::construct(&text, &config).unwrap();

            let mut got = index.search(&pattern);
            got.sort_unstable();
            prop_assert_eq!(&got, &naive_occurrences(&text, &pattern));
            prop_assert_eq!(index.count(&pattern), got.len() as u64);
        }

        #[test]
        fn extract_matches_slices(
            text in proptest::collection::vec(prop_oneof![Just(b'x'), Just(b'y'), Just(b'z'), Just(b'w')], 2..100),
            split in 0.0f64..1.0,
        ) {
            let config = small_config(NpaScheme::EliasDelta, SamplingScheme::FlatByIndex);
            let index = SuccinctFile::construct(&text, &config).unwrap();

            let offset = ((text.len() - 1) as f64 * split) as usize;
            let len = text.len() - offset;
            prop_assert_eq!(index.extract(offset as u64, len as u64), &text[offset..]);
        }

        #[test]
        fn count_never_disagrees_with_search(
            text in proptest::collection::vec(prop_oneof![Just(b'm'), Just(b'n')], 1..80),
        ) {
            let config = small_config(NpaScheme::EliasGamma, SamplingScheme::LayeredByIndex);
            let index = SuccinctFile::construct(&text, &config).unwrap();
            for pattern in [&b"m"[..], b"n", b"mn", b"nm", b"mm", b"nn"] {
                prop_assert_eq!(index.count(pattern), index.search(pattern).len() as u64);
            }
        }
    }
}
