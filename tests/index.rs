// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! End-to-end correctness against naive scans of the uncompressed input.

use terse::{NpaScheme, SamplingScheme, SuccinctConfig, SuccinctFile, SuccinctShard};

fn config(encoding: NpaScheme, sampling: SamplingScheme) -> SuccinctConfig {
    SuccinctConfig {
        sa_sampling_rate: 4,
        isa_sampling_rate: 4,
        npa_sampling_rate: 8,
        context_len: 3,
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

const ENCODINGS: [NpaScheme; 3] = [
    NpaScheme::EliasGamma,
    NpaScheme::EliasDelta,
    NpaScheme::WaveletTree,
];

const SAMPLINGS: [SamplingScheme; 4] = [
    SamplingScheme::FlatByIndex,
    SamplingScheme::FlatByValue,
    SamplingScheme::LayeredByIndex,
    SamplingScheme::OpportunisticLayeredByIndex,
];

#[test]
fn banana_scenario() {
    // The canonical example: rates of 2, seven input bytes.
    let cfg = SuccinctConfig {
        sa_sampling_rate: 2,
        isa_sampling_rate: 2,
        npa_sampling_rate: 4,
        ..SuccinctConfig::default()
    };
    let index = SuccinctFile::construct(b"banana\n", &cfg).unwrap();

    assert_eq!(index.count(b"ana"), 2);
    let mut hits = index.search(b"ana");
    hits.sort_unstable();
    assert_eq!(hits, vec![1, 3]);
    assert_eq!(index.extract(0, 6), b"banana");
}

#[test]
fn npa_is_a_single_cycle_permutation() {
    let text = b"mississippi river mississippi delta";
    for encoding in ENCODINGS {
        let index =
            SuccinctFile::construct(text, &config(encoding, SamplingScheme::FlatByIndex))
                .unwrap();
        let core = index.core();
        let n = core.input_size();

        // ISA[SA[i]] == i
        for i in 0..n {
            assert_eq!(
                core.lookup_isa(core.lookup_sa(i)),
                i,
                "{:?}: inverse broken at {}",
                encoding,
                i
            );
        }

        // Following NPA from rank 0 visits all n ranks exactly once.
        let mut seen = vec![false; n as usize];
        let mut idx = 0u64;
        for _ in 0..n {
            assert!(!seen[idx as usize], "{:?}: rank {} revisited", encoding, idx);
            seen[idx as usize] = true;
            idx = core.lookup_npa(idx);
        }
        assert_eq!(idx, 0, "{:?}: cycle has period != n", encoding);
    }
}

#[test]
fn search_count_extract_all_schemes() {
    let text: Vec<u8> = b"abracadabra alakazam abracadabra hocus pocus abra"
        .iter()
        .copied()
        .collect();
    let patterns: [&[u8]; 8] = [
        b"abra", b"a", b"cada", b"zam", b"abracadabra", b"q", b"us", b" ",
    ];

    for encoding in ENCODINGS {
        for sampling in SAMPLINGS {
            let index = SuccinctFile::construct(&text, &config(encoding, sampling)).unwrap();
            for pattern in patterns {
                let want = naive_occurrences(&text, pattern);
                let mut got = index.search(pattern);
                got.sort_unstable();
                assert_eq!(
                    got, want,
                    "search {:?}/{:?} pattern {:?}",
                    encoding, sampling, pattern
                );
                assert_eq!(index.count(pattern), want.len() as u64);
            }

            // Extract every suffix-aligned window.
            for offset in [0u64, 1, 11, 20, 44] {
                let len = (text.len() as u64 - offset).min(9);
                assert_eq!(
                    index.extract(offset, len),
                    &text[offset as usize..(offset + len) as usize],
                    "extract {:?}/{:?} at {}",
                    encoding,
                    sampling,
                    offset
                );
            }
            for pos in [0u64, 7, 31, 48] {
                assert_eq!(index.char_at(pos), text[pos as usize]);
            }
        }
    }
}

#[test]
fn empty_and_absent_patterns_are_empty_results() {
    let index = SuccinctFile::construct(
        b"needle in a haystack",
        &config(NpaScheme::EliasGamma, SamplingScheme::FlatByIndex),
    )
    .unwrap();

    assert_eq!(index.count(b""), 0);
    assert!(index.search(b"").is_empty());
    assert_eq!(index.count(b"zzz"), 0);
    assert!(index.search(b"zzz").is_empty());
    // Absent byte short-circuits mid-pattern too.
    assert_eq!(index.count(b"ne~dle"), 0);
}

#[test]
fn construction_rejects_bad_input() {
    let cfg = SuccinctConfig::default();
    assert!(SuccinctFile::construct(b"", &cfg).is_err());
    assert!(SuccinctFile::construct(b"ok\x00bad", &cfg).is_err());
    assert!(SuccinctFile::construct(b"ok\x01bad", &cfg).is_err());
}

#[test]
fn forward_search_agrees_with_backward_search() {
    let text = b"banana bandana cabana";
    let index =
        SuccinctFile::construct(text, &config(NpaScheme::EliasGamma, SamplingScheme::FlatByIndex))
            .unwrap();
    let core = index.core();

    for pattern in [&b"ana"[..], b"ban", b"cab", b"a", b"zeta"] {
        let (bsp, bep) = core.bwd_search(pattern);
        let (fsp, fep) = core.fwd_search(pattern);
        let bwd_count = (bep - bsp + 1).max(0);
        let fwd_count = (fep - fsp + 1).max(0);
        assert_eq!(bwd_count, fwd_count, "pattern {:?}", pattern);
    }
}

#[test]
fn continued_backward_search_composes() {
    let text = b"banana bandana cabana";
    let index =
        SuccinctFile::construct(text, &config(NpaScheme::EliasGamma, SamplingScheme::FlatByIndex))
            .unwrap();
    let core = index.core();

    let full = core.bwd_search(b"bana");
    let partial = core.bwd_search(b"ana");
    let continued = core.continue_bwd_search(b"b", partial);
    assert_eq!(full, continued);
}

#[test]
fn shard_get_access_and_search() {
    let records = b"apple pie\nbanana split\ncherry cake\napple turnover";
    for encoding in ENCODINGS {
        let shard =
            SuccinctShard::construct(records, &config(encoding, SamplingScheme::FlatByIndex))
                .unwrap();

        assert_eq!(shard.num_keys(), 4);
        assert_eq!(shard.get(0).unwrap(), b"apple pie");
        assert_eq!(shard.get(1).unwrap(), b"banana split");
        assert_eq!(shard.get(2).unwrap(), b"cherry cake");
        assert_eq!(shard.get(3).unwrap(), b"apple turnover");
        assert!(shard.get(4).is_none());

        assert_eq!(shard.access(1, 7, 5).unwrap(), b"split");
        // Length clamps to the record end.
        assert_eq!(shard.access(0, 6, 100).unwrap(), b"pie");

        let apple_keys: Vec<i64> = shard.search(b"apple").into_iter().collect();
        assert_eq!(apple_keys, vec![0, 3]);
        assert_eq!(shard.count(b"apple"), 2);

        // flat_* variants see raw offsets.
        assert_eq!(
            shard.flat_count(b"apple"),
            naive_occurrences(records, b"apple").len() as u64
        );
    }
}

#[test]
fn shard_invalidate_hides_keys() {
    let records = b"red fox\nblue fox\ngreen owl";
    let mut shard = SuccinctShard::construct(
        records,
        &config(NpaScheme::EliasGamma, SamplingScheme::FlatByIndex),
    )
    .unwrap();

    assert_eq!(shard.count(b"fox"), 2);
    assert!(shard.invalidate(0));
    assert!(!shard.invalidate(0), "second invalidate is a no-op");

    assert!(shard.get(0).is_none());
    let fox_keys: Vec<i64> = shard.search(b"fox").into_iter().collect();
    assert_eq!(fox_keys, vec![1]);
    assert_eq!(shard.count(b"fox"), 1);
    // Other records unaffected.
    assert_eq!(shard.get(2).unwrap(), b"green owl");
}

#[test]
fn trailing_newline_yields_empty_final_record() {
    let shard = SuccinctShard::construct(
        b"one\ntwo\n",
        &config(NpaScheme::EliasGamma, SamplingScheme::FlatByIndex),
    )
    .unwrap();
    assert_eq!(shard.num_keys(), 3);
    assert_eq!(shard.get(0).unwrap(), b"one");
    assert_eq!(shard.get(1).unwrap(), b"two");
    assert_eq!(shard.get(2).unwrap(), b"");
}

#[test]
fn specialized_and_generic_binary_search_agree() {
    // The gamma encoding has a specialized search path; it must return the
    // same bounds as the lookup-based search for every query the backward
    // search could issue.
    let text = b"tobeornottobethatisthequestiontobe";
    let index =
        SuccinctFile::construct(text, &config(NpaScheme::EliasGamma, SamplingScheme::FlatByIndex))
            .unwrap();
    let core = index.core();
    let npa = core.npa();
    let n = core.input_size();

    for byte in [b'a', b'b', b'e', b'h', b'i', b'n', b'o', b'q', b'r', b's', b't', b'u'] {
        let Some((c1, c2)) = core.alphabet().bucket(byte) else {
            continue;
        };
        for val in 0..n {
            for upper in [false, true] {
                let fast = npa.binary_search(val, c1 as u64, c2 as u64, upper);
                let slow = npa.binary_search_by_lookup(val, c1 as u64, c2 as u64, upper);
                assert_eq!(fast, slow, "byte {} val {} upper {}", byte, val, upper);
            }
        }
    }
}
