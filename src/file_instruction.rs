//! Mapping absolute record ranges onto ordered, variable-length sources.
//!
//! The same algorithm serves two address spaces:
//! - at write time the sources are the cache's buckets (`usize` indexes), and the
//!   output tells a shard writer which bucket slices make up its records;
//! - at read time the sources are the persisted shard files (`String` names).
//!
//! Sources are contiguous blocks in order: source 0 holds `[0, len0)`, source 1
//! holds `[len0, len0 + len1)`, and so on. Zero-length sources never produce an
//! instruction.

use crate::error::{ErrorKind, SliceError, SliceResult};
use crate::instruction::ReadInstruction;
use crate::shard_info::ShardInfo;
use log::error;
use std::fmt::{self, Display, Formatter};

/// How many records to keep after the skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Take {
    Count(u64),
    /// Everything up to the end of the source.
    Remaining,
}

impl Take {
    /// Signed form: `-1` stands for [`Take::Remaining`].
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::Count(n) => n as i64,
            Self::Remaining => -1,
        }
    }
}

/// Read `take` records of `source` after discarding the first `skip`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileInstruction<R> {
    pub source: R,
    pub skip: u64,
    pub take: Take,
}

impl<R> FileInstruction<R> {
    /// Records this instruction yields from a source holding `source_len` records.
    #[must_use]
    pub fn num_examples(&self, source_len: u64) -> u64 {
        let available = source_len.saturating_sub(self.skip);
        match self.take {
            Take::Count(n) => n.min(available),
            Take::Remaining => available,
        }
    }

    pub fn map_source<S>(self, f: impl FnOnce(R) -> S) -> FileInstruction<S> {
        FileInstruction {
            source: f(self.source),
            skip: self.skip,
            take: self.take,
        }
    }
}

impl<R: Display> Display for FileInstruction<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} skip={} take={}", self.source, self.skip, self.take.as_i64())
    }
}

/// Instructions reading records `[from, to)` out of `sources` with the given lengths.
///
/// Concatenating the selected records in the returned order reproduces exactly
/// `[from, to)`: no gaps, no duplicates, original order.
///
/// # Errors
/// [`ErrorKind::Metadata`] if `sources` and `lengths` differ in length,
/// [`ErrorKind::EmptyShard`] for a non-empty range over sources holding no records,
/// [`ErrorKind::OutOfRange`] if `from > to` or `to` exceeds the sum of `lengths`.
pub fn read_instructions<R: Clone>(
    from: u64,
    to: u64,
    sources: &[R],
    lengths: &[u64],
) -> SliceResult<Vec<FileInstruction<R>>> {
    if sources.len() != lengths.len() {
        return Err(SliceError::metadata(format!(
            "{} sources but {} lengths",
            sources.len(),
            lengths.len()
        )));
    }
    let total: u64 = lengths.iter().sum();
    if total == 0 && to > from {
        let msg = format!(
            "range [{from}:{to}) asked of {} sources holding no records",
            sources.len()
        );
        error!("{msg}");
        return Err(SliceError::new(ErrorKind::EmptyShard, msg));
    }
    if from > to || to > total {
        return Err(SliceError::out_of_range(format!(
            "range [{from}:{to}) does not fit in {total} records"
        )));
    }

    let mut index_start = 0u64;
    let mut out = Vec::new();
    for (source, &length) in sources.iter().zip(lengths) {
        if length == 0 {
            continue;
        }
        let index_end = index_start + length;
        if from < index_end && to > index_start {
            let skip = from.saturating_sub(index_start);
            let take = if to < index_end {
                Take::Count(to - index_start - skip)
            } else {
                Take::Remaining
            };
            if take != Take::Count(0) {
                out.push(FileInstruction {
                    source: source.clone(),
                    skip,
                    take,
                });
            }
        }
        index_start = index_end;
    }
    Ok(out)
}

/// Resolved read plan for one [`ReadInstruction`] over persisted shards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePlan {
    /// Instructions over shard file names, in reading order.
    pub instructions: Vec<FileInstruction<String>>,
    /// Persisted length of the shard each instruction reads, parallel to `instructions`.
    pub shard_lengths: Vec<u64>,
    /// Records selected by each absolute instruction, in term order.
    pub examples_per_term: Vec<u64>,
}

impl FilePlan {
    /// Total number of records the plan yields.
    #[must_use]
    pub fn num_examples(&self) -> u64 {
        self.examples_per_term.iter().sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// Resolve `instruction` against `shard_info` down to per-file skip/take instructions.
///
/// Absolute instructions are resolved from the per-split totals, then each one is
/// mapped onto that split's shards; the per-term instruction lists are concatenated
/// in term order, which is how `train + val` becomes one physical read order.
///
/// # Errors
/// Resolution errors from [`ReadInstruction::to_absolute`], and
/// [`ErrorKind::EmptyShard`] when a referenced split has no persisted records.
pub fn make_file_instructions(
    shard_info: &ShardInfo,
    instruction: &ReadInstruction,
) -> SliceResult<FilePlan> {
    let absolutes = instruction.to_absolute(&shard_info.split_lengths())?;
    let mut plan = FilePlan {
        instructions: Vec::new(),
        shard_lengths: Vec::new(),
        examples_per_term: Vec::with_capacity(absolutes.len()),
    };
    for abs in absolutes {
        let (names, lengths) = shard_info.split_shards(&abs.split).ok_or_else(|| {
            SliceError::new(ErrorKind::UnknownSplit, format!("no shards for \"{}\"", abs.split))
        })?;
        let total: u64 = lengths.iter().sum();
        if total == 0 {
            let msg = format!(
                "split \"{}\" has no records; the dataset might not have been generated",
                abs.split
            );
            error!("{msg}");
            return Err(SliceError::new(ErrorKind::EmptyShard, msg));
        }
        let (from, to) = abs.bounds(total);
        plan.examples_per_term.push(to - from);
        let sources: Vec<(String, u64)> = names.into_iter().zip(lengths.iter().copied()).collect();
        for instr in read_instructions(from, to, &sources, &lengths)? {
            plan.shard_lengths.push(instr.source.1);
            plan.instructions.push(instr.map_source(|(name, _)| name));
        }
    }
    Ok(plan)
}
