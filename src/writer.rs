//! Write pass: turn one cached split into shard files plus `shard_info.json`.
//!
//! ```no_run
//! use ironshard::cache::BucketCache;
//! use ironshard::writer::SplitWriter;
//! # fn main() -> anyhow::Result<()> {
//! let mut cache = BucketCache::default();
//! for i in 0..10_000u32 {
//!     cache.add(i.to_le_bytes(), format!("record {i}").into_bytes());
//! }
//! let info = SplitWriter::new("data/numbers", "train").write(&cache)?;
//! # Ok(())
//! # }
//! ```

use crate::cache::{BucketCache, ExampleCache};
use crate::config::WriteConfig;
use crate::error::SliceError;
use crate::file_instruction::Take;
use crate::io::compression::ShardSink;
use crate::io::record::RecordWriter;
use crate::progress::{NoProgress, ProgressReporter};
use crate::shard_info::ShardInfo;
use crate::shard_plan::{ShardSpec, shard_specs};
use anyhow::{Context, Result};
use log::info;
use std::fs::create_dir_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Writes the shards of one split into a dataset directory.
pub struct SplitWriter {
    root: PathBuf,
    split: String,
    config: WriteConfig,
    progress: Arc<dyn ProgressReporter>,
}

impl SplitWriter {
    pub fn new(root: impl Into<PathBuf>, split: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            split: split.into(),
            config: WriteConfig::default(),
            progress: Arc::new(NoProgress),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: WriteConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Shard layout this writer would produce for `cache`.
    ///
    /// # Errors
    /// [`crate::error::ErrorKind::InsufficientExamples`] for an empty cache.
    pub fn plan(&self, cache: &dyn ExampleCache) -> Result<Vec<ShardSpec>> {
        let specs = shard_specs(
            cache.len(),
            cache.size(),
            &cache.bucket_lengths(),
            &self.root.join(&self.split),
            &self.config.file_extension(),
            &self.config.shard_sizing,
        )?;
        Ok(specs)
    }

    /// Write every shard, then merge the split's entry into `shard_info.json`.
    ///
    /// Returns metadata holding only this split.
    ///
    /// # Errors
    /// Fails on I/O errors, on an empty cache, and with
    /// [`crate::error::ErrorKind::DuplicateKey`] if the cache holds a duplicate key;
    /// `shard_info.json` is left untouched in every failure case.
    pub fn write(&self, cache: &dyn ExampleCache) -> Result<ShardInfo> {
        create_dir_all(&self.root).with_context(|| format!("mkdir -p {}", self.root.display()))?;
        let specs = self.plan(cache)?;
        info!(
            "writing {} examples of \"{}\" into {} shards under {}",
            cache.len(),
            self.split,
            specs.len(),
            self.root.display()
        );

        self.progress.start(&self.split, Some(cache.len()));
        if self.config.parallel_writes {
            self.write_parallel(&specs, cache)?;
        } else {
            self.write_sequential(&specs, cache)?;
        }
        self.progress.finish();

        let info = ShardInfo::from_split(
            self.split.clone(),
            specs.iter().map(|s| (s.filename(), s.examples_number)),
        );
        ShardInfo::merge_into_dir(&self.root, info.clone(), self.config.shard_info_merge)?;
        info!(
            "done writing \"{}\"; shard lengths: {:?}",
            self.split,
            specs.iter().map(|s| s.examples_number).collect::<Vec<_>>()
        );
        Ok(info)
    }

    /// Pull each shard's records off the single ordered stream.
    fn write_sequential(&self, specs: &[ShardSpec], cache: &dyn ExampleCache) -> Result<()> {
        let mut stream = cache.stream();
        for spec in specs {
            let sink = ShardSink::create(&spec.path, self.config.compression)?;
            let mut writer = RecordWriter::new(sink);
            for _ in 0..spec.examples_number {
                let (_, record) = stream.next().ok_or_else(|| {
                    SliceError::metadata(format!(
                        "cache stream ended before shard {} was complete",
                        spec.shard_index
                    ))
                })??;
                writer
                    .write_record(&record)
                    .with_context(|| format!("write record to {}", spec.path.display()))?;
                self.progress.advance(1);
            }
            writer.into_inner().finish()?;
        }
        Ok(())
    }

    #[cfg(feature = "parallel-io")]
    fn write_parallel(&self, specs: &[ShardSpec], cache: &dyn ExampleCache) -> Result<()> {
        use rayon::prelude::*;
        specs
            .par_iter()
            .try_for_each(|spec| self.write_from_buckets(spec, cache))
    }

    #[cfg(not(feature = "parallel-io"))]
    fn write_parallel(&self, specs: &[ShardSpec], cache: &dyn ExampleCache) -> Result<()> {
        specs
            .iter()
            .try_for_each(|spec| self.write_from_buckets(spec, cache))
    }

    /// Assemble one shard from the bucket slices named by its reading instructions.
    fn write_from_buckets(&self, spec: &ShardSpec, cache: &dyn ExampleCache) -> Result<()> {
        let mut writer = RecordWriter::new(ShardSink::create(&spec.path, self.config.compression)?);
        for instr in &spec.reading_instructions {
            let records = cache.read_bucket(instr.source)?;
            let skip = usize::try_from(instr.skip)?;
            let end = match instr.take {
                Take::Count(n) => skip + usize::try_from(n)?,
                Take::Remaining => records.len(),
            };
            let slice = records.get(skip..end).ok_or_else(|| {
                SliceError::metadata(format!(
                    "bucket {} holds {} records, shard {} needs [{skip}:{end})",
                    instr.source,
                    records.len(),
                    spec.shard_index
                ))
            })?;
            for record in slice {
                writer
                    .write_record(record)
                    .with_context(|| format!("write record to {}", spec.path.display()))?;
            }
            self.progress.advance(slice.len() as u64);
        }
        if writer.records() != spec.examples_number {
            return Err(SliceError::metadata(format!(
                "shard {} got {} records, planned {}",
                spec.shard_index,
                writer.records(),
                spec.examples_number
            ))
            .into());
        }
        writer.into_inner().finish()
    }
}

/// Cache `records` by key and write them as `split` under `root`.
///
/// # Errors
/// See [`SplitWriter::write`].
pub fn write_split<K, I>(
    root: impl Into<PathBuf>,
    split: &str,
    records: I,
    config: WriteConfig,
) -> Result<ShardInfo>
where
    K: AsRef<[u8]>,
    I: IntoIterator<Item = (K, Vec<u8>)>,
{
    let mut cache = BucketCache::default();
    cache.extend(records);
    SplitWriter::new(root, split).with_config(config).write(&cache)
}
