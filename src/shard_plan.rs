//! Write-time shard planning: how many shards, where their boundaries fall, and
//! which bucket slices feed each of them.
//!
//! Shards aim for 64 MiB..1 GiB on disk and prefer power-of-two counts so that
//! shards of one split are close to uniform.
//!
//! # Features
//!
//! - **Size-banded shard counts** - 1024 when it fits, else a multiple of 1024 or
//!   a power of two, never more shards than records
//! - **Even boundaries** - shard `i` ends at `round(n * i / k)`, ties to even
//! - **Bucket slicing** - each shard's inputs come from the same skip/take mapper
//!   the reader uses
//!
//! # Usage
//!
//! ```
//! use ironshard::shard_plan::{compute_shard_count, shard_boundaries, shard_filename};
//!
//! assert_eq!(compute_shard_count(1 << 20, 10), 1);
//! assert_eq!(shard_boundaries(10, 3)?, vec![3, 7, 10]);
//! assert_eq!(shard_filename("train", 2, 3, "tfrecord"), "train-00002-of-00003.tfrecord");
//! # Ok::<(), ironshard::error::SliceError>(())
//! ```

use crate::error::{SliceError, SliceResult};
use crate::file_instruction::{FileInstruction, read_instructions};
use crate::utils::div_round_half_even;
use std::path::{Path, PathBuf};

/// Smallest preferred shard size in bytes.
pub const MIN_SHARD_SIZE: u64 = 64 << 20;
/// Largest preferred shard size in bytes.
pub const MAX_SHARD_SIZE: u64 = 1024 << 20;
/// On-disk framing bytes added to every record.
pub const RECORD_OVERHEAD: u64 = 16;

const PREFERRED_SHARD_COUNT: u64 = 1024;
const SMALLER_SHARD_COUNTS: [u64; 9] = [512, 256, 128, 64, 32, 16, 8, 4, 2];

/// Size band used by [`compute_shard_count_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShardSizing {
    pub min_shard_bytes: u64,
    pub max_shard_bytes: u64,
    pub record_overhead: u64,
}

impl Default for ShardSizing {
    fn default() -> Self {
        Self {
            min_shard_bytes: MIN_SHARD_SIZE,
            max_shard_bytes: MAX_SHARD_SIZE,
            record_overhead: RECORD_OVERHEAD,
        }
    }
}

/// Number of shards for `num_examples` records of `total_size` serialized bytes,
/// using the default 64 MiB..1 GiB band.
#[must_use]
pub fn compute_shard_count(total_size: u64, num_examples: u64) -> u64 {
    compute_shard_count_with(&ShardSizing::default(), total_size, num_examples)
}

/// [`compute_shard_count`] with an explicit size band.
///
/// Never returns 0, and never more shards than records (an empty split gets 1).
#[must_use]
pub fn compute_shard_count_with(sizing: &ShardSizing, total_size: u64, num_examples: u64) -> u64 {
    let size = total_size.saturating_add(num_examples.saturating_mul(sizing.record_overhead));
    let max_shards = size / sizing.min_shard_bytes.max(1);
    let min_shards = size / sizing.max_shard_bytes.max(1);

    if (min_shards..=max_shards).contains(&PREFERRED_SHARD_COUNT)
        && num_examples >= PREFERRED_SHARD_COUNT
    {
        return PREFERRED_SHARD_COUNT;
    }
    if min_shards > PREFERRED_SHARD_COUNT {
        // Multiples of 1024 above min_shards, bounded by the record count.
        let first = min_shards.div_ceil(PREFERRED_SHARD_COUNT) * PREFERRED_SHARD_COUNT;
        if first <= num_examples {
            return first;
        }
        return 1;
    }
    SMALLER_SHARD_COUNTS
        .into_iter()
        .find(|&n| (min_shards..=max_shards).contains(&n) && num_examples >= n)
        .unwrap_or(1)
}

/// Exclusive end index of every shard: boundary `i` is `round(n * i / k)`.
///
/// The result is strictly increasing and ends at `num_examples`.
///
/// # Errors
/// [`crate::error::ErrorKind::InsufficientExamples`] when there are no records,
/// no shards, or fewer records than shards.
pub fn shard_boundaries(num_examples: u64, num_shards: u64) -> SliceResult<Vec<u64>> {
    if num_examples == 0 {
        return Err(SliceError::insufficient("no examples were yielded"));
    }
    if num_shards == 0 || num_examples < num_shards {
        return Err(SliceError::insufficient(format!(
            "num_examples ({num_examples}) < number_of_shards ({num_shards})"
        )));
    }
    let n = i128::from(num_examples);
    let k = i128::from(num_shards);
    Ok((1..=k)
        .map(|i| {
            // Each boundary lies in (0, num_examples], so it fits a u64.
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            let b = div_round_half_even(n * i, k) as u64;
            b
        })
        .collect())
}

/// `{prefix}-{index:05}-of-{count:05}.{extension}`
#[must_use]
pub fn shard_filename(prefix: &str, shard_index: u64, num_shards: u64, extension: &str) -> String {
    format!("{prefix}-{shard_index:05}-of-{num_shards:05}.{extension}")
}

/// One output shard of a write pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardSpec {
    pub shard_index: u64,
    pub path: PathBuf,
    pub examples_number: u64,
    /// Bucket slices that, concatenated, make up this shard.
    pub reading_instructions: Vec<FileInstruction<usize>>,
}

impl ShardSpec {
    /// File name component of [`ShardSpec::path`].
    #[must_use]
    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Plan every shard of a split.
///
/// `path_prefix` is the dataset directory joined with the split name; files are
/// named with [`shard_filename`]. `bucket_lengths` describes the cache's buckets
/// in stream order.
///
/// # Errors
/// [`crate::error::ErrorKind::InsufficientExamples`] for an empty split, and
/// [`crate::error::ErrorKind::Metadata`] if the bucket lengths don't add up to
/// `num_examples`.
pub fn shard_specs(
    num_examples: u64,
    total_size: u64,
    bucket_lengths: &[u64],
    path_prefix: &Path,
    extension: &str,
    sizing: &ShardSizing,
) -> SliceResult<Vec<ShardSpec>> {
    let bucket_total: u64 = bucket_lengths.iter().sum();
    if bucket_total != num_examples {
        return Err(SliceError::metadata(format!(
            "buckets hold {bucket_total} records but {num_examples} were cached"
        )));
    }
    let num_shards = compute_shard_count_with(sizing, total_size, num_examples);
    let boundaries = shard_boundaries(num_examples, num_shards)?;
    let bucket_indexes: Vec<usize> = (0..bucket_lengths.len()).collect();
    let prefix = path_prefix.to_string_lossy();

    let mut from = 0u64;
    let mut specs = Vec::with_capacity(boundaries.len());
    for (shard_index, to) in (0u64..).zip(boundaries) {
        specs.push(ShardSpec {
            shard_index,
            path: PathBuf::from(shard_filename(&prefix, shard_index, num_shards, extension)),
            examples_number: to - from,
            reading_instructions: read_instructions(from, to, &bucket_indexes, bucket_lengths)?,
        });
        from = to;
    }
    Ok(specs)
}
