//! Shard counts, boundaries and per-shard bucket plans.

use ironshard::error::ErrorKind;
use ironshard::file_instruction::{FileInstruction, Take};
use ironshard::shard_plan::{
    ShardSizing, compute_shard_count, compute_shard_count_with, shard_boundaries, shard_filename,
    shard_specs,
};
use std::path::Path;

const GIB: u64 = 1 << 30;

#[test]
fn tiny_dataset_gets_one_shard() {
    assert_eq!(compute_shard_count(1_000, 10), 1);
    assert_eq!(compute_shard_count(0, 1), 1);
}

#[test]
fn preferred_count_when_it_fits() {
    assert_eq!(compute_shard_count(100 * GIB, 1_000_000), 1024);
}

#[test]
fn falls_back_to_smaller_powers_of_two() {
    // ~10 GiB: between 10 and 160 shards fit the band
    assert_eq!(compute_shard_count(10 * GIB, 1_000_000), 128);
    // a 100 GiB dataset with fewer records than the preferred count
    assert_eq!(compute_shard_count(100 * GIB, 600), 512);
}

#[test]
fn huge_dataset_uses_multiples_of_1024() {
    assert_eq!(compute_shard_count(2048 * GIB, 10_000_000), 2048);
    assert_eq!(compute_shard_count(3000 * GIB, 10_000_000), 3072);
}

#[test]
fn huge_dataset_with_few_records_gets_one_shard() {
    assert_eq!(compute_shard_count(2048 * GIB, 1_500), 1);
}

#[test]
fn shard_count_is_within_one_and_the_record_count() {
    let sizes = [0, 1, 1 << 20, 64 << 20, GIB, 50 * GIB, 700 * GIB, 1500 * GIB, 5000 * GIB];
    let counts = [1, 2, 3, 100, 511, 512, 1023, 1024, 1025, 2047, 5000, 1_000_000];
    for &size in &sizes {
        for &n in &counts {
            let k = compute_shard_count(size, n);
            assert!(k >= 1, "size={size} n={n}");
            assert!(k <= n, "size={size} n={n} -> {k}");
        }
    }
}

#[test]
fn custom_band() {
    let sizing = ShardSizing {
        min_shard_bytes: 100,
        max_shard_bytes: 1_000,
        record_overhead: 0,
    };
    assert_eq!(compute_shard_count_with(&sizing, 400, 8), 4);
    assert_eq!(compute_shard_count_with(&sizing, 400, 3), 2);
}

#[test]
fn boundaries_round_half_to_even() -> anyhow::Result<()> {
    assert_eq!(shard_boundaries(10, 3)?, vec![3, 7, 10]);
    assert_eq!(shard_boundaries(5, 2)?, vec![2, 5]);
    assert_eq!(shard_boundaries(7, 2)?, vec![4, 7]);
    assert_eq!(shard_boundaries(4, 4)?, vec![1, 2, 3, 4]);
    assert_eq!(shard_boundaries(9, 1)?, vec![9]);
    Ok(())
}

#[test]
fn boundaries_are_strictly_increasing() -> anyhow::Result<()> {
    for n in 1..=80u64 {
        for k in 1..=n {
            let b = shard_boundaries(n, k)?;
            assert_eq!(b.len() as u64, k);
            assert!(b[0] > 0, "n={n} k={k}");
            assert_eq!(*b.last().unwrap_or(&0), n);
            assert!(b.windows(2).all(|w| w[0] < w[1]), "n={n} k={k}: {b:?}");
        }
    }
    Ok(())
}

#[test]
fn boundaries_need_enough_records() {
    for (n, k) in [(0, 1), (3, 5), (3, 0)] {
        assert_eq!(
            shard_boundaries(n, k).unwrap_err().kind,
            ErrorKind::InsufficientExamples,
            "n={n} k={k}"
        );
    }
}

#[test]
fn filenames_are_zero_padded() {
    assert_eq!(
        shard_filename("data/train", 3, 12, "tfrecord"),
        "data/train-00003-of-00012.tfrecord"
    );
    assert_eq!(shard_filename("t", 0, 123_456, "x"), "t-00000-of-123456.x");
}

#[test]
fn specs_map_shards_onto_buckets() -> anyhow::Result<()> {
    let sizing = ShardSizing {
        min_shard_bytes: 100,
        max_shard_bytes: 1_000,
        record_overhead: 0,
    };
    let specs = shard_specs(8, 400, &[3, 0, 5], Path::new("/d/train"), "tfrecord", &sizing)?;
    let counts: Vec<u64> = specs.iter().map(|s| s.examples_number).collect();
    assert_eq!(counts, vec![2, 2, 2, 2]);
    assert_eq!(specs[1].filename(), "train-00001-of-00004.tfrecord");
    assert_eq!(specs[1].path, Path::new("/d/train-00001-of-00004.tfrecord"));

    let fi = |source: usize, skip: u64, take: Take| FileInstruction { source, skip, take };
    assert_eq!(specs[0].reading_instructions, vec![fi(0, 0, Take::Count(2))]);
    assert_eq!(
        specs[1].reading_instructions,
        vec![fi(0, 2, Take::Remaining), fi(2, 0, Take::Count(1))]
    );
    assert_eq!(specs[2].reading_instructions, vec![fi(2, 1, Take::Count(2))]);
    assert_eq!(specs[3].reading_instructions, vec![fi(2, 3, Take::Remaining)]);
    Ok(())
}

#[test]
fn specs_cover_every_record_once() -> anyhow::Result<()> {
    let sizing = ShardSizing {
        min_shard_bytes: 100,
        max_shard_bytes: 1_000,
        record_overhead: 16,
    };
    let buckets = [0, 4, 1, 0, 0, 9, 3, 3];
    let n: u64 = buckets.iter().sum();
    let specs = shard_specs(n, 84 * n, &buckets, Path::new("out/train"), "tfrecord", &sizing)?;
    assert_eq!(specs.len(), 16);
    assert_eq!(specs.iter().map(|s| s.examples_number).sum::<u64>(), n);
    for spec in &specs {
        assert!(spec.examples_number > 0);
        let from_buckets: u64 = spec
            .reading_instructions
            .iter()
            .map(|fi| fi.num_examples(buckets[fi.source]))
            .sum();
        assert_eq!(from_buckets, spec.examples_number, "shard {}", spec.shard_index);
    }
    Ok(())
}

#[test]
fn specs_reject_inconsistent_buckets() {
    let err = shard_specs(10, 100, &[3, 3], Path::new("x"), "tfrecord", &ShardSizing::default())
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Metadata);
    let err = shard_specs(0, 0, &[0, 0], Path::new("x"), "tfrecord", &ShardSizing::default())
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InsufficientExamples);
}
