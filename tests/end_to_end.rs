//! Write splits through the cache, then read slices of them back.

use ironshard::config::{ReadConfig, WriteConfig};
use ironshard::reader::{JsonRecords, Nested, Reader};
use ironshard::shard_plan::ShardSizing;
use ironshard::testing::{Numbered, assert_permutation, indexes, write_dataset};
use tempfile::TempDir;

fn small_shards() -> WriteConfig {
    WriteConfig {
        shard_sizing: ShardSizing {
            min_shard_bytes: 2_000,
            max_shard_bytes: 20_000,
            record_overhead: 16,
        },
        parallel_writes: true,
        ..WriteConfig::default()
    }
}

#[test]
fn head_and_tail_slices_of_a_written_split() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let info = write_dataset(dir.path(), &[("train", 600), ("test", 80)], &small_shards())?;
    let (names, _) = info.split_shards("train").unwrap_or_default();
    assert!(names.len() > 1, "{names:?}");

    let reader = Reader::new(dir.path(), ReadConfig::default());
    let ds = reader.read_spec("train[:10%]+train[-10%:]", false, JsonRecords::<Numbered>::new())?;
    assert_eq!(ds.len(), 120);
    let records = ds.collect_all()?;
    assert_eq!(records.len(), 120);
    assert!(records.iter().all(|r| r.split == "train"));

    // Shards hold cache order, so the slices are some 120 distinct records.
    let mut seen = indexes(&records);
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), 120);
    Ok(())
}

#[test]
fn shuffled_full_read_covers_the_split() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    write_dataset(dir.path(), &[("train", 400)], &small_shards())?;
    let config = ReadConfig {
        interleave_cycle_length: Some(4),
        interleave_block_length: 3,
        num_parallel_calls: 4,
        ..ReadConfig::default()
    };
    let reader = Reader::new(dir.path(), config);
    let ds = reader.read_spec("train", true, JsonRecords::<Numbered>::new())?;
    let expected: Vec<u64> = (0..400).collect();
    assert_permutation(&indexes(&ds.collect_all()?), &expected);
    assert_permutation(&indexes(&ds.collect_all()?), &expected);
    Ok(())
}

#[test]
fn splits_read_together_as_a_map() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    write_dataset(dir.path(), &[("train", 90), ("test", 30)], &WriteConfig::default())?;
    let specs = Nested::Map(
        [("train", "train[:50%]"), ("test", "test")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    );
    let reader = Reader::new(dir.path(), ReadConfig::default());
    let datasets = reader
        .read(specs.parse_specs()?, false, JsonRecords::<Numbered>::new())?
        .into_map()
        .unwrap_or_default();
    assert_eq!(datasets["train"].len(), 45);
    assert_eq!(datasets["test"].len(), 30);
    assert!(datasets["test"].collect_all()?.iter().all(|r| r.split == "test"));
    Ok(())
}
