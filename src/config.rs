//! Read and write configuration.
//!
//! Both configs are plain structs with documented defaults. [`ReadConfig::merge`]
//! and [`WriteConfig::merge`] combine two configs field by field: a default value
//! yields to a non-default one, and two different non-default values are a
//! [`ErrorKind::ConfigConflict`]. Merging is order independent.
//!
//! ```
//! use ironshard::config::ReadConfig;
//!
//! let a = ReadConfig { seed: 7, ..Default::default() };
//! let b = ReadConfig { interleave_block_length: 4, ..Default::default() };
//! let merged = a.merge(&b)?;
//! assert_eq!((merged.seed, merged.interleave_block_length), (7, 4));
//! # Ok::<(), ironshard::error::SliceError>(())
//! ```

use crate::error::{ErrorKind, SliceError, SliceResult};
use crate::file_instruction::FileInstruction;
use crate::io::compression::Compression;
use crate::shard_info::MergePolicy;
use crate::shard_plan::ShardSizing;
use std::fmt::{self, Debug, Formatter};
use std::path::PathBuf;
use std::sync::Arc;

/// Default seed of file shuffling.
pub const DEFAULT_SEED: u64 = 6_052_020;

/// Reorders the file instructions of a read before shuffling and interleaving.
pub type SortFn = Arc<dyn Fn(&mut Vec<FileInstruction<PathBuf>>) + Send + Sync>;

/// Read-side configuration.
#[derive(Clone)]
pub struct ReadConfig {
    /// Seed of the file-order shuffle.
    pub seed: u64,
    /// Shuffle files again on every iteration of a dataset.
    pub shuffle_reshuffle_each_iteration: bool,
    /// Files read concurrently. `None` uses the number of CPUs when files are
    /// shuffled and 1 otherwise, so unshuffled reads keep record order.
    pub interleave_cycle_length: Option<usize>,
    /// Consecutive records taken from one file before moving to the next.
    pub interleave_block_length: usize,
    /// Read the open files of a cycle in parallel.
    pub parallel_reads: bool,
    /// Records parsed concurrently; 1 parses inline.
    pub num_parallel_calls: usize,
    /// Keep record order when parsing in parallel.
    pub deterministic: bool,
    /// Check record CRCs.
    pub verify_checksums: bool,
    /// Read buffer per open file, in bytes.
    pub read_buffer_size: usize,
    /// Custom ordering of file instructions, applied before shuffling.
    pub interleave_sort_fn: Option<SortFn>,
}

impl Default for ReadConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            shuffle_reshuffle_each_iteration: true,
            interleave_cycle_length: None,
            interleave_block_length: 1,
            parallel_reads: true,
            num_parallel_calls: 1,
            deterministic: true,
            verify_checksums: true,
            read_buffer_size: 8 << 20,
            interleave_sort_fn: None,
        }
    }
}

impl Debug for ReadConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadConfig")
            .field("seed", &self.seed)
            .field("shuffle_reshuffle_each_iteration", &self.shuffle_reshuffle_each_iteration)
            .field("interleave_cycle_length", &self.interleave_cycle_length)
            .field("interleave_block_length", &self.interleave_block_length)
            .field("parallel_reads", &self.parallel_reads)
            .field("num_parallel_calls", &self.num_parallel_calls)
            .field("deterministic", &self.deterministic)
            .field("verify_checksums", &self.verify_checksums)
            .field("read_buffer_size", &self.read_buffer_size)
            .field("interleave_sort_fn", &self.interleave_sort_fn.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl PartialEq for ReadConfig {
    fn eq(&self, other: &Self) -> bool {
        self.seed == other.seed
            && self.shuffle_reshuffle_each_iteration == other.shuffle_reshuffle_each_iteration
            && self.interleave_cycle_length == other.interleave_cycle_length
            && self.interleave_block_length == other.interleave_block_length
            && self.parallel_reads == other.parallel_reads
            && self.num_parallel_calls == other.num_parallel_calls
            && self.deterministic == other.deterministic
            && self.verify_checksums == other.verify_checksums
            && self.read_buffer_size == other.read_buffer_size
            && same_sort_fn(self.interleave_sort_fn.as_ref(), other.interleave_sort_fn.as_ref())
    }
}

fn same_sort_fn(a: Option<&SortFn>, b: Option<&SortFn>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}

/// Non-default wins; conflicting non-defaults fail.
fn merge_field<T: PartialEq + Clone + Debug>(
    name: &str,
    this: &T,
    that: &T,
    default: &T,
) -> SliceResult<T> {
    if that == default || this == that {
        Ok(this.clone())
    } else if this == default {
        Ok(that.clone())
    } else {
        Err(SliceError::new(
            ErrorKind::ConfigConflict,
            format!("cannot merge incompatible values ({this:?} and {that:?}) of config: {name}"),
        ))
    }
}

impl ReadConfig {
    /// Cycle length actually used for interleaving.
    #[must_use]
    pub fn cycle_length(&self, shuffle_files: bool) -> usize {
        self.interleave_cycle_length
            .unwrap_or_else(|| if shuffle_files { num_cpus::get() } else { 1 })
            .max(1)
    }

    /// Order-independent merge of two configs.
    ///
    /// # Errors
    /// [`ErrorKind::ConfigConflict`] if a field holds two different non-default values.
    pub fn merge(&self, other: &Self) -> SliceResult<Self> {
        let d = Self::default();
        let interleave_sort_fn = match (&self.interleave_sort_fn, &other.interleave_sort_fn) {
            (Some(a), Some(b)) if !Arc::ptr_eq(a, b) => {
                return Err(SliceError::new(
                    ErrorKind::ConfigConflict,
                    "cannot merge two different interleave_sort_fn values",
                ));
            }
            (a, b) => a.clone().or_else(|| b.clone()),
        };
        Ok(Self {
            seed: merge_field("seed", &self.seed, &other.seed, &d.seed)?,
            shuffle_reshuffle_each_iteration: merge_field(
                "shuffle_reshuffle_each_iteration",
                &self.shuffle_reshuffle_each_iteration,
                &other.shuffle_reshuffle_each_iteration,
                &d.shuffle_reshuffle_each_iteration,
            )?,
            interleave_cycle_length: merge_field(
                "interleave_cycle_length",
                &self.interleave_cycle_length,
                &other.interleave_cycle_length,
                &d.interleave_cycle_length,
            )?,
            interleave_block_length: merge_field(
                "interleave_block_length",
                &self.interleave_block_length,
                &other.interleave_block_length,
                &d.interleave_block_length,
            )?,
            parallel_reads: merge_field(
                "parallel_reads",
                &self.parallel_reads,
                &other.parallel_reads,
                &d.parallel_reads,
            )?,
            num_parallel_calls: merge_field(
                "num_parallel_calls",
                &self.num_parallel_calls,
                &other.num_parallel_calls,
                &d.num_parallel_calls,
            )?,
            deterministic: merge_field(
                "deterministic",
                &self.deterministic,
                &other.deterministic,
                &d.deterministic,
            )?,
            verify_checksums: merge_field(
                "verify_checksums",
                &self.verify_checksums,
                &other.verify_checksums,
                &d.verify_checksums,
            )?,
            read_buffer_size: merge_field(
                "read_buffer_size",
                &self.read_buffer_size,
                &other.read_buffer_size,
                &d.read_buffer_size,
            )?,
            interleave_sort_fn,
        })
    }
}

/// Write-side configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteConfig {
    /// Record file extension, without compression suffix.
    pub extension: String,
    pub compression: Compression,
    pub shard_sizing: ShardSizing,
    /// Write shards concurrently from bucket slices instead of one sequential stream.
    pub parallel_writes: bool,
    /// Handling of a split that already has an entry in `shard_info.json`.
    pub shard_info_merge: MergePolicy,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            extension: "tfrecord".to_string(),
            compression: Compression::None,
            shard_sizing: ShardSizing::default(),
            parallel_writes: false,
            shard_info_merge: MergePolicy::Overwrite,
        }
    }
}

impl WriteConfig {
    /// Full shard file extension, compression suffix included.
    #[must_use]
    pub fn file_extension(&self) -> String {
        format!("{}{}", self.extension, self.compression.suffix())
    }

    /// Order-independent merge of two configs.
    ///
    /// # Errors
    /// [`ErrorKind::ConfigConflict`] if a field holds two different non-default values.
    pub fn merge(&self, other: &Self) -> SliceResult<Self> {
        let d = Self::default();
        Ok(Self {
            extension: merge_field("extension", &self.extension, &other.extension, &d.extension)?,
            compression: merge_field(
                "compression",
                &self.compression,
                &other.compression,
                &d.compression,
            )?,
            shard_sizing: merge_field(
                "shard_sizing",
                &self.shard_sizing,
                &other.shard_sizing,
                &d.shard_sizing,
            )?,
            parallel_writes: merge_field(
                "parallel_writes",
                &self.parallel_writes,
                &other.parallel_writes,
                &d.parallel_writes,
            )?,
            shard_info_merge: merge_field(
                "shard_info_merge",
                &self.shard_info_merge,
                &other.shard_info_merge,
                &d.shard_info_merge,
            )?,
        })
    }
}
