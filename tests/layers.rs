// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Runtime layer management: remove, reconstruct, opportunistic fill.

use terse::{AdaptiveShard, NpaScheme, SamplingScheme, SuccinctConfig, SuccinctFile};

const RECORDS: &[u8] = b"salmon river\ntrout creek\npike lake\nsalmon bay\nperch pond";

fn layered_config(sampling: SamplingScheme) -> SuccinctConfig {
    SuccinctConfig {
        sa_sampling_rate: 2,
        isa_sampling_rate: 2,
        npa_sampling_rate: 8,
        context_len: 3,
        npa_encoding: NpaScheme::EliasGamma,
        sa_sampling_scheme: sampling,
        isa_sampling_scheme: sampling,
        // range 4 -> 3 layers per array
        sampling_range: 4,
    }
}

fn check_all_records(shard: &AdaptiveShard, label: &str) {
    let values: [&[u8]; 5] = [
        b"salmon river",
        b"trout creek",
        b"pike lake",
        b"salmon bay",
        b"perch pond",
    ];
    for (key, want) in values.iter().enumerate() {
        assert_eq!(
            shard.get(key as i64).unwrap(),
            *want,
            "{}: key {}",
            label,
            key
        );
    }
    let salmon: Vec<i64> = shard.search(b"salmon").into_iter().collect();
    assert_eq!(salmon, vec![0, 3], "{}", label);
}

#[test]
fn remove_then_reconstruct_restores_queries() {
    let shard =
        AdaptiveShard::construct(RECORDS, &layered_config(SamplingScheme::LayeredByIndex), false)
            .unwrap();
    check_all_records(&shard, "fresh");

    let freed = shard.remove_layer(1);
    assert!(freed > 0, "removing an existing layer frees storage");
    check_all_records(&shard, "layer 1 removed");

    let rebuilt = shard.reconstruct_layer(1);
    assert_eq!(rebuilt, freed, "reconstruction restores the same storage");
    check_all_records(&shard, "layer 1 rebuilt");
}

#[test]
fn layer_operations_are_idempotent() {
    let shard =
        AdaptiveShard::construct(RECORDS, &layered_config(SamplingScheme::LayeredByIndex), false)
            .unwrap();

    // Reconstructing an existing layer adds nothing.
    assert_eq!(shard.reconstruct_layer(0), 0);

    let freed = shard.remove_layer(2);
    assert!(freed > 0);
    // Removing it again is a no-op.
    assert_eq!(shard.remove_layer(2), 0);

    let rebuilt = shard.reconstruct_layer(2);
    assert!(rebuilt > 0);
    // Second reconstruction reports a zero storage delta.
    assert_eq!(shard.reconstruct_layer(2), 0);
}

#[test]
fn only_finest_layer_left_still_answers_correctly() {
    // Drop every layer except the finest (layer 0); hop chains are bounded
    // by the base sampling rate and every record must still decode.
    let shard =
        AdaptiveShard::construct(RECORDS, &layered_config(SamplingScheme::LayeredByIndex), false)
            .unwrap();
    assert!(shard.remove_layer(1) > 0);
    assert!(shard.remove_layer(2) > 0);
    check_all_records(&shard, "finest layer only");

    // Storage can be rebuilt from the single remaining layer.
    assert!(shard.reconstruct_layer(2) > 0);
    assert!(shard.reconstruct_layer(1) > 0);
    check_all_records(&shard, "all layers back");
}

#[test]
fn last_layer_is_never_removed() {
    let shard =
        AdaptiveShard::construct(RECORDS, &layered_config(SamplingScheme::LayeredByIndex), false)
            .unwrap();
    assert!(shard.remove_layer(0) > 0);
    assert!(shard.remove_layer(1) > 0);
    // Layer 2 is the last one standing; removal must refuse.
    assert_eq!(shard.remove_layer(2), 0);
    check_all_records(&shard, "single remaining layer");
}

#[test]
fn out_of_range_layer_ids_are_noops() {
    let shard =
        AdaptiveShard::construct(RECORDS, &layered_config(SamplingScheme::LayeredByIndex), false)
            .unwrap();
    assert_eq!(shard.remove_layer(60), 0);
    assert_eq!(shard.reconstruct_layer(60), 0);
}

#[test]
fn opportunistic_layers_densify_from_reads() {
    let shard = AdaptiveShard::construct(
        RECORDS,
        &layered_config(SamplingScheme::OpportunisticLayeredByIndex),
        true,
    )
    .unwrap();
    check_all_records(&shard, "fresh opportunistic");

    let before_removal = shard.num_sampled_values();
    assert!(before_removal > 0);

    let freed = shard.remove_layer(1);
    assert!(freed > 0);
    let after_removal = shard.num_sampled_values();
    assert!(
        after_removal < before_removal,
        "removal drops materialized values"
    );

    // Reconstruction allocates but materializes nothing by itself.
    assert!(shard.reconstruct_layer(1) > 0);
    assert_eq!(shard.num_sampled_values(), after_removal);

    // Reads fill the pending layer back in.
    check_all_records(&shard, "pending layer");
    assert!(
        shard.num_sampled_values() > after_removal,
        "reads materialize pending slots"
    );
    check_all_records(&shard, "after densification");
}

#[test]
fn flat_file_layer_calls_are_noops() {
    let cfg = SuccinctConfig {
        sa_sampling_rate: 4,
        isa_sampling_rate: 4,
        npa_sampling_rate: 8,
        ..SuccinctConfig::default()
    };
    let index = SuccinctFile::construct(b"no layers here", &cfg).unwrap();
    assert_eq!(index.core().remove_layer(0), 0);
    assert_eq!(index.core().reconstruct_layer(0), 0);
    assert_eq!(index.core().num_sampled_values(), 0);
}
