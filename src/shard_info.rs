//! Persisted shard-length metadata (`shard_info.json`).
//!
//! The file maps every split to an ordered `{shard_filename: example_count}` object;
//! insertion order is shard index order. Split totals are always derived from the
//! per-shard counts, so the two views can never disagree.
//!
//! # Features
//!
//! - **Order preserving** - shard order survives a load/save cycle
//! - **Atomic saves** - written to a temp file in the same directory, then renamed
//! - **Merge policies** - [`MergePolicy`] decides whether a rewritten split replaces
//!   its old entry
//!
//! # Usage
//!
//! ```
//! use ironshard::shard_info::{MergePolicy, ShardInfo};
//! # fn main() -> anyhow::Result<()> {
//! let dir = tempfile::tempdir()?;
//! let train = ShardInfo::from_split("train", [("train-00000-of-00001.tfrecord", 5u64)]);
//! ShardInfo::merge_into_dir(dir.path(), train, MergePolicy::Overwrite)?;
//!
//! let info = ShardInfo::load(dir.path())?;
//! assert_eq!(info.split_lengths()["train"], 5);
//! # Ok(())
//! # }
//! ```

use crate::error::SliceError;
use anyhow::{Context, Result};
use indexmap::IndexMap;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{File, create_dir_all};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// File name of the metadata inside a dataset directory.
pub const SHARD_INFO_FILENAME: &str = "shard_info.json";

/// What to do when a write pass records a split that is already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MergePolicy {
    /// The newest entry replaces the existing one.
    #[default]
    Overwrite,
    /// The existing entry is kept and the new one dropped.
    Preserve,
}

/// `split -> {shard_filename -> example_count}`, order preserving.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShardInfo {
    splits: IndexMap<String, IndexMap<String, u64>>,
}

impl ShardInfo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata holding a single split.
    pub fn from_split<I, S>(split: impl Into<String>, shards: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        let mut info = Self::new();
        info.insert_split(split, shards);
        info
    }

    /// Insert or replace a split entry, returning the previous one.
    pub fn insert_split<I, S>(
        &mut self,
        split: impl Into<String>,
        shards: I,
    ) -> Option<IndexMap<String, u64>>
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        let shards = shards.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self.splits.insert(split.into(), shards)
    }

    #[must_use]
    pub fn split(&self, split: &str) -> Option<&IndexMap<String, u64>> {
        self.splits.get(split)
    }

    pub fn split_names(&self) -> impl Iterator<Item = &str> {
        self.splits.keys().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.splits.is_empty()
    }

    /// Total record count per split.
    #[must_use]
    pub fn split_lengths(&self) -> IndexMap<String, u64> {
        self.splits
            .iter()
            .map(|(split, shards)| (split.clone(), shards.values().sum()))
            .collect()
    }

    /// Shard file names and lengths of `split`, in shard index order.
    #[must_use]
    pub fn split_shards(&self, split: &str) -> Option<(Vec<String>, Vec<u64>)> {
        self.splits
            .get(split)
            .map(|shards| shards.iter().map(|(k, v)| (k.clone(), *v)).unzip())
    }

    /// Fold `other` into `self`. New splits are appended; splits present in both
    /// follow `policy`.
    pub fn merge(&mut self, other: Self, policy: MergePolicy) {
        for (split, shards) in other.splits {
            match (self.splits.contains_key(&split), policy) {
                (false, _) => {
                    self.splits.insert(split, shards);
                }
                (true, MergePolicy::Overwrite) => {
                    warn!("overwriting existing shard info of split \"{split}\"");
                    self.splits.insert(split, shards);
                }
                (true, MergePolicy::Preserve) => {
                    warn!("keeping existing shard info of split \"{split}\"; new entry dropped");
                }
            }
        }
    }

    /// Load `root/shard_info.json`.
    ///
    /// # Errors
    /// Fails if the file is missing or is not a valid `{split: {file: count}}` object.
    pub fn load(root: impl AsRef<Path>) -> Result<Self> {
        let path = root.as_ref().join(SHARD_INFO_FILENAME);
        let f = File::open(&path).with_context(|| format!("open {}", path.display()))?;
        let info: Self = serde_json::from_reader(BufReader::new(f))
            .map_err(|e| SliceError::metadata(format!("{}: {e}", path.display())))
            .with_context(|| format!("parse {}", path.display()))?;
        Ok(info)
    }

    /// Like [`ShardInfo::load`], but a missing file yields empty metadata.
    ///
    /// # Errors
    /// Fails if the file exists but cannot be read or parsed.
    pub fn load_or_default(root: impl AsRef<Path>) -> Result<Self> {
        if root.as_ref().join(SHARD_INFO_FILENAME).is_file() {
            Self::load(root)
        } else {
            Ok(Self::new())
        }
    }

    /// Write `root/shard_info.json` atomically (temporary file + rename).
    ///
    /// # Errors
    /// Fails if the directory or file cannot be created or written.
    pub fn save(&self, root: impl AsRef<Path>) -> Result<()> {
        let root = root.as_ref();
        create_dir_all(root).with_context(|| format!("mkdir -p {}", root.display()))?;
        let path = root.join(SHARD_INFO_FILENAME);
        let tmp = tempfile::NamedTempFile::new_in(root)
            .with_context(|| format!("create temporary file in {}", root.display()))?;
        {
            let mut w = BufWriter::new(tmp.as_file());
            serde_json::to_writer(&mut w, self)
                .with_context(|| format!("serialize shard info for {}", path.display()))?;
            w.flush()?;
        }
        tmp.persist(&path)
            .with_context(|| format!("replace {}", path.display()))?;
        Ok(())
    }

    /// Merge `update` into the metadata stored under `root` and write the result back.
    ///
    /// # Errors
    /// Fails if the existing metadata cannot be read or the merged metadata cannot be written.
    pub fn merge_into_dir(
        root: impl AsRef<Path>,
        update: Self,
        policy: MergePolicy,
    ) -> Result<Self> {
        let root = root.as_ref();
        let mut info = Self::load_or_default(root)?;
        info.merge(update, policy);
        info.save(root)?;
        info!(
            "saved shard info for splits {:?} to {}",
            info.split_names().collect::<Vec<_>>(),
            root.display()
        );
        Ok(info)
    }
}
