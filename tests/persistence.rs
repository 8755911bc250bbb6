// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Serialize / load / memory-map round trips, plus corruption handling.

use std::fs;

use terse::{NpaScheme, SamplingScheme, SuccinctConfig, SuccinctFile, SuccinctShard};

const TEXT: &[u8] = b"peter piper picked a peck of pickled peppers";

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

fn check_queries(index: &SuccinctFile, label: &str) {
    assert_eq!(index.count(b"pick"), 2, "{}", label);
    assert_eq!(index.count(b"pe"), 5, "{}", label);
    let mut hits = index.search(b"pe");
    hits.sort_unstable();
    assert_eq!(hits, vec![0, 8, 21, 37, 40], "{}", label);
    assert_eq!(index.extract(6, 5), b"piper", "{}", label);
}

#[test]
fn load_roundtrip_every_scheme() {
    let samplings = [
        SamplingScheme::FlatByIndex,
        SamplingScheme::FlatByValue,
        SamplingScheme::LayeredByIndex,
        SamplingScheme::OpportunisticLayeredByIndex,
    ];
    for encoding in [
        NpaScheme::EliasGamma,
        NpaScheme::EliasDelta,
        NpaScheme::WaveletTree,
    ] {
        for sampling in samplings {
            let cfg = config(encoding, sampling);
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("index");

            let built = SuccinctFile::construct(TEXT, &cfg).unwrap();
            check_queries(&built, "built");
            built.serialize(&path).unwrap();

            let loaded = SuccinctFile::load(&path, &cfg).unwrap();
            check_queries(&loaded, "loaded");
        }
    }
}

#[test]
fn mmap_roundtrip() {
    for encoding in [
        NpaScheme::EliasGamma,
        NpaScheme::EliasDelta,
        NpaScheme::WaveletTree,
    ] {
        let cfg = config(encoding, SamplingScheme::FlatByIndex);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index");

        SuccinctFile::construct(TEXT, &cfg)
            .unwrap()
            .serialize(&path)
            .unwrap();

        let mapped = SuccinctFile::map(&path, &cfg).unwrap();
        check_queries(&mapped, "mapped");
    }
}

#[test]
fn mmap_roundtrip_by_value_sampling() {
    let cfg = config(NpaScheme::EliasGamma, SamplingScheme::FlatByValue);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index");

    SuccinctFile::construct(TEXT, &cfg)
        .unwrap()
        .serialize(&path)
        .unwrap();

    let mapped = SuccinctFile::map(&path, &cfg).unwrap();
    check_queries(&mapped, "mapped by-value");
}

#[test]
fn shard_roundtrip_with_invalidation() {
    let records = b"alpha bravo\ncharlie delta\nalpha echo";
    let cfg = config(NpaScheme::EliasGamma, SamplingScheme::FlatByIndex);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index");

    let mut shard = SuccinctShard::construct(records, &cfg).unwrap();
    assert!(shard.invalidate(0));
    shard.serialize(&path).unwrap();

    let loaded = SuccinctShard::load(&path, &cfg).unwrap();
    assert_eq!(loaded.num_keys(), 3);
    assert!(loaded.get(0).is_none(), "invalidation survives persistence");
    assert_eq!(loaded.get(2).unwrap(), b"alpha echo");
    let keys: Vec<i64> = loaded.search(b"alpha").into_iter().collect();
    assert_eq!(keys, vec![2]);

    let mapped = SuccinctShard::map(&path, &cfg).unwrap();
    assert_eq!(mapped.get(1).unwrap(), b"charlie delta");
}

#[test]
fn corrupted_section_is_rejected() {
    let cfg = config(NpaScheme::EliasGamma, SamplingScheme::FlatByIndex);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index");
    SuccinctFile::construct(TEXT, &cfg)
        .unwrap()
        .serialize(&path)
        .unwrap();

    let npa_path = path.join("npa");
    let mut bytes = fs::read(&npa_path).unwrap();
    // Flip a bit in the last data word, just ahead of the CRC32 footer, so
    // the section still parses and the corruption is caught by the checksum.
    let at = bytes.len() - 5;
    bytes[at] ^= 0xFF;
    fs::write(&npa_path, &bytes).unwrap();

    let err = SuccinctFile::load(&path, &cfg).unwrap_err();
    let msg = err.to_string();
    assert!(
        msg.contains("CRC32") || msg.contains("mismatch") || msg.contains("scheme"),
        "unexpected error: {}",
        msg
    );
    assert!(SuccinctFile::map(&path, &cfg).is_err());
}

#[test]
fn truncated_section_is_rejected() {
    let cfg = config(NpaScheme::EliasGamma, SamplingScheme::FlatByIndex);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index");
    SuccinctFile::construct(TEXT, &cfg)
        .unwrap()
        .serialize(&path)
        .unwrap();

    let sa_path = path.join("sa");
    let bytes = fs::read(&sa_path).unwrap();
    fs::write(&sa_path, &bytes[..bytes.len() / 2]).unwrap();

    assert!(SuccinctFile::load(&path, &cfg).is_err());
    assert!(SuccinctFile::map(&path, &cfg).is_err());
}

#[test]
fn scheme_mismatch_is_rejected() {
    let gamma = config(NpaScheme::EliasGamma, SamplingScheme::FlatByIndex);
    let wavelet = config(NpaScheme::WaveletTree, SamplingScheme::FlatByIndex);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index");
    SuccinctFile::construct(TEXT, &gamma)
        .unwrap()
        .serialize(&path)
        .unwrap();

    let err = SuccinctFile::load(&path, &wavelet).unwrap_err();
    assert!(err.to_string().contains("encoded with"), "{}", err);
}

#[test]
fn missing_section_is_rejected() {
    let cfg = config(NpaScheme::EliasGamma, SamplingScheme::FlatByIndex);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index");
    SuccinctFile::construct(TEXT, &cfg)
        .unwrap()
        .serialize(&path)
        .unwrap();

    fs::remove_file(path.join("isa")).unwrap();
    assert!(SuccinctFile::load(&path, &cfg).is_err());
}
