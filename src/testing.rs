//! Fixtures for tests that need a real dataset directory on disk.
//!
//! Records written by these helpers are JSON [`Numbered`] values, so a read can be
//! checked against the exact indexes it is expected to select:
//!
//! ```
//! use ironshard::config::ReadConfig;
//! use ironshard::reader::{JsonRecords, Reader};
//! use ironshard::testing::{Numbered, indexes, write_raw_shards};
//! # fn main() -> anyhow::Result<()> {
//! let dir = tempfile::tempdir()?;
//! write_raw_shards(dir.path(), "train", &[0, 3, 5, 0, 2])?;
//!
//! let reader = Reader::new(dir.path(), ReadConfig::default());
//! let ds = reader.read_spec("train[2:9]", false, JsonRecords::<Numbered>::new())?;
//! assert_eq!(indexes(&ds.collect_all()?), (2..9).collect::<Vec<_>>());
//! # Ok(())
//! # }
//! ```

use crate::config::WriteConfig;
use crate::io::compression::{Compression, ShardSink};
use crate::io::record::RecordWriter;
use crate::shard_info::{MergePolicy, ShardInfo};
use crate::shard_plan::shard_filename;
use crate::writer::write_split;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Debug;
use std::fs::create_dir_all;
use std::hash::Hash;
use std::path::Path;

/// Test record: its split and its position within the split.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Numbered {
    pub split: String,
    pub index: u64,
}

impl Numbered {
    /// Serialized form stored in shard files.
    ///
    /// # Panics
    /// Never; serializing this struct cannot fail.
    #[must_use]
    pub fn to_record(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("Numbered serializes")
    }
}

/// `n` keyed records of `split`, keyed by their index.
#[must_use]
pub fn numbered_records(split: &str, n: u64) -> Vec<(String, Vec<u8>)> {
    (0..n)
        .map(|index| {
            let record = Numbered {
                split: split.to_string(),
                index,
            };
            (format!("{split}/{index}"), record.to_record())
        })
        .collect()
}

/// Write each `(split, num_records)` through the regular write pass.
///
/// Returns the merged `shard_info.json` content.
///
/// # Errors
/// Any write pass failure.
pub fn write_dataset(
    root: &Path,
    splits: &[(&str, u64)],
    config: &WriteConfig,
) -> Result<ShardInfo> {
    for (split, n) in splits {
        write_split(root, split, numbered_records(split, *n), config.clone())?;
    }
    ShardInfo::load(root)
}

/// Write `split` as hand-laid shards with the given lengths, records in index order.
///
/// Zero lengths produce empty shard files. The split's entry is merged into
/// `shard_info.json`.
///
/// # Errors
/// Any I/O failure.
pub fn write_raw_shards(root: &Path, split: &str, lengths: &[u64]) -> Result<ShardInfo> {
    write_raw_shards_with(root, split, lengths, Compression::None)
}

/// [`write_raw_shards`] with a chosen codec.
///
/// # Errors
/// Any I/O failure.
pub fn write_raw_shards_with(
    root: &Path,
    split: &str,
    lengths: &[u64],
    compression: Compression,
) -> Result<ShardInfo> {
    create_dir_all(root)?;
    let ext = format!("tfrecord{}", compression.suffix());
    let n = lengths.len() as u64;
    let mut next = 0u64;
    let mut entries = Vec::with_capacity(lengths.len());
    for (i, &len) in lengths.iter().enumerate() {
        let name = shard_filename(split, i as u64, n, &ext);
        let mut writer = RecordWriter::new(ShardSink::create(root.join(&name), compression)?);
        for index in next..next + len {
            let record = Numbered {
                split: split.to_string(),
                index,
            };
            writer.write_record(&record.to_record())?;
        }
        writer.into_inner().finish()?;
        next += len;
        entries.push((name, len));
    }
    ShardInfo::merge_into_dir(root, ShardInfo::from_split(split, entries), MergePolicy::Overwrite)
}

/// Indexes of the given records, in order.
#[must_use]
pub fn indexes(records: &[Numbered]) -> Vec<u64> {
    records.iter().map(|r| r.index).collect()
}

/// Assert `actual` holds exactly the elements of `expected`, in any order, each once.
///
/// # Panics
/// If the two differ as sets or `actual` holds duplicates.
pub fn assert_permutation<T: Eq + Hash + Debug + Clone>(actual: &[T], expected: &[T]) {
    let seen: HashSet<&T> = actual.iter().collect();
    assert_eq!(seen.len(), actual.len(), "duplicates in {actual:?}");
    assert_eq!(actual.len(), expected.len(), "lengths differ: {actual:?} vs {expected:?}");
    for e in expected {
        assert!(seen.contains(e), "{e:?} missing from {actual:?}");
    }
}
