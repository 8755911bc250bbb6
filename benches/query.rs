// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Query throughput: count (no decode), search (range decode), extract
//! (NPA hop chains), across the three NPA encodings.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use terse::{NpaScheme, SamplingScheme, SuccinctConfig, SuccinctFile};

fn synth_text(len: usize) -> Vec<u8> {
    // Deterministic skewed text: word-ish chunks with repeats, so backward
    // search ranges have realistic sizes.
    let words: [&[u8]; 6] = [b"lorem", b"ipsum", b"dolor", b"sit", b"amet", b"lorem"];
    let mut out = Vec::with_capacity(len + 8);
    let mut seed = 0x9E3779B97F4A7C15u64;
    while out.len() < len {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        out.extend_from_slice(words[(seed >> 33) as usize % words.len()]);
        out.push(b' ');
    }
    out.truncate(len);
    out
}

fn build(encoding: NpaScheme) -> SuccinctFile {
    let config = SuccinctConfig {
        sa_sampling_rate: 32,
        isa_sampling_rate: 32,
        npa_sampling_rate: 128,
        context_len: 3,
        npa_encoding: encoding,
        sa_sampling_scheme: SamplingScheme::FlatByIndex,
        isa_sampling_scheme: SamplingScheme::FlatByIndex,
        sampling_range: 8,
    };
    SuccinctFile::construct(&synth_text(64 * 1024), &config).expect("bench index")
}

fn bench_queries(c: &mut Criterion) {
    for (name, encoding) in [
        ("gamma", NpaScheme::EliasGamma),
        ("delta", NpaScheme::EliasDelta),
        ("wavelet", NpaScheme::WaveletTree),
    ] {
        let index = build(encoding);

        c.bench_function(&format!("count/{}", name), |b| {
            b.iter(|| black_box(index.count(black_box(b"lorem"))))
        });

        c.bench_function(&format!("search/{}", name), |b| {
            b.iter(|| black_box(index.search(black_box(b"dolor sit"))))
        });

        c.bench_function(&format!("extract/{}", name), |b| {
            b.iter(|| black_box(index.extract(black_box(1024), black_box(256))))
        });
    }
}

criterion_group!(benches, bench_queries);
criterion_main!(benches);
