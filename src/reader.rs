//! Read orchestration: instructions in, lazily pulled record streams out.
//!
//! A read resolves each [`ReadInstruction`] against the dataset's `shard_info.json`,
//! maps it to per-file skip/take instructions, optionally reorders and shuffles the
//! files, then interleaves the per-file record streams and parses every record.
//!
//! ```no_run
//! use ironshard::config::ReadConfig;
//! use ironshard::reader::{Nested, RawRecords, Reader};
//! # fn main() -> anyhow::Result<()> {
//! let reader = Reader::new("data/numbers", ReadConfig::default());
//! let train = reader.read_spec("train[:10%]+val", false, RawRecords)?;
//! for record in &train {
//!     let bytes = record?;
//! }
//!
//! let both = reader.read(
//!     Nested::List(vec!["train[:50%]".parse()?, "train[50%:]".parse()?]),
//!     true,
//!     RawRecords,
//! )?;
//! # Ok(())
//! # }
//! ```

use crate::config::ReadConfig;
use crate::error::{ErrorKind, SliceError, SliceResult};
use crate::file_instruction::{FileInstruction, FilePlan, Take, make_file_instructions};
use crate::instruction::ReadInstruction;
use crate::io::compression::open_reader;
use crate::io::glob::verify_split_files;
use crate::io::record::RecordReader;
use crate::shard_info::ShardInfo;
use crate::utils::{SplitMix64, epoch_seed, shuffle_in_place};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use log::{debug, error};
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::io::Read;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A single value, a list of values or a name-keyed map of values.
///
/// Reads keep the container shape of their input: a list of instructions yields a
/// list of datasets in the same order, a map yields a map with the same keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Nested<T> {
    Single(T),
    List(Vec<T>),
    Map(IndexMap<String, T>),
}

impl<T> Nested<T> {
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Nested<U> {
        match self {
            Self::Single(v) => Nested::Single(f(v)),
            Self::List(vs) => Nested::List(vs.into_iter().map(f).collect()),
            Self::Map(m) => Nested::Map(m.into_iter().map(|(k, v)| (k, f(v))).collect()),
        }
    }

    /// Like [`Nested::map`], stopping at the first error.
    ///
    /// # Errors
    /// The first error returned by `f`.
    pub fn try_map<U, E>(self, mut f: impl FnMut(T) -> Result<U, E>) -> Result<Nested<U>, E> {
        Ok(match self {
            Self::Single(v) => Nested::Single(f(v)?),
            Self::List(vs) => Nested::List(vs.into_iter().map(f).collect::<Result<_, _>>()?),
            Self::Map(m) => Nested::Map(
                m.into_iter()
                    .map(|(k, v)| f(v).map(|u| (k, u)))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }

    /// Number of leaf values.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::List(vs) => vs.len(),
            Self::Map(m) => m.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The value of a [`Nested::Single`].
    pub fn into_single(self) -> Option<T> {
        match self {
            Self::Single(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_list(self) -> Option<Vec<T>> {
        match self {
            Self::List(vs) => Some(vs),
            _ => None,
        }
    }

    pub fn into_map(self) -> Option<IndexMap<String, T>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl<S: AsRef<str>> Nested<S> {
    /// Parse every slice spec, failing on the first malformed one.
    ///
    /// # Errors
    /// [`ErrorKind::Format`] and the other parse errors of [`ReadInstruction::from_spec`].
    pub fn parse_specs(self) -> SliceResult<Nested<ReadInstruction>> {
        self.try_map(|s| ReadInstruction::from_spec(s.as_ref()))
    }
}

/// Turns one raw record into a value.
pub trait RecordParser: Send + Sync {
    type Output: Send;

    /// # Errors
    /// Any decoding failure; it ends the stream.
    fn parse(&self, record: Vec<u8>) -> Result<Self::Output>;
}

/// Passes records through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawRecords;

impl RecordParser for RawRecords {
    type Output = Vec<u8>;

    fn parse(&self, record: Vec<u8>) -> Result<Vec<u8>> {
        Ok(record)
    }
}

/// Decodes every record as one JSON document.
pub struct JsonRecords<T>(PhantomData<fn() -> T>);

impl<T> JsonRecords<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for JsonRecords<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned + Send> RecordParser for JsonRecords<T> {
    type Output = T;

    fn parse(&self, record: Vec<u8>) -> Result<T> {
        serde_json::from_slice(&record).context("decode JSON record")
    }
}

/// Adapts a closure into a [`RecordParser`].
pub struct FnParser<F>(pub F);

impl<F, T> RecordParser for FnParser<F>
where
    F: Fn(Vec<u8>) -> Result<T> + Send + Sync,
    T: Send,
{
    type Output = T;

    fn parse(&self, record: Vec<u8>) -> Result<T> {
        (self.0)(record)
    }
}

/// Reads datasets stored under one root directory.
pub struct Reader {
    root: PathBuf,
    config: ReadConfig,
}

impl Reader {
    pub fn new(root: impl Into<PathBuf>, config: ReadConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub const fn config(&self) -> &ReadConfig {
        &self.config
    }

    /// Resolved per-file plan of `instruction`, without opening any shard.
    ///
    /// # Errors
    /// Metadata loading and resolution errors.
    pub fn file_plan(&self, instruction: &ReadInstruction) -> Result<FilePlan> {
        let shard_info = ShardInfo::load(&self.root)?;
        Ok(make_file_instructions(&shard_info, instruction)?)
    }

    /// One dataset per instruction, in the shape of `instructions`.
    ///
    /// # Errors
    /// Fails on unreadable or inconsistent metadata, on any resolution error, and
    /// with [`ErrorKind::EmptySelection`] when an instruction selects no records.
    /// Only the shard files of splits named by an instruction are checked.
    pub fn read<P: RecordParser>(
        &self,
        instructions: Nested<ReadInstruction>,
        shuffle_files: bool,
        parser: P,
    ) -> Result<Nested<RecordDataset<P>>> {
        let shard_info = ShardInfo::load(&self.root)?;
        let parser = Arc::new(parser);
        instructions.try_map(|instr| {
            self.dataset(&shard_info, &instr, shuffle_files, Arc::clone(&parser))
        })
    }

    /// Parse `spec` and read it as a single dataset.
    ///
    /// # Errors
    /// Parse errors come back before any file is touched; otherwise as [`Reader::read`].
    pub fn read_spec<P: RecordParser>(
        &self,
        spec: &str,
        shuffle_files: bool,
        parser: P,
    ) -> Result<RecordDataset<P>> {
        let instruction = ReadInstruction::from_spec(spec)?;
        let datasets = self.read(Nested::Single(instruction), shuffle_files, parser)?;
        datasets
            .into_single()
            .context("single instruction produced several datasets")
    }

    fn dataset<P: RecordParser>(
        &self,
        shard_info: &ShardInfo,
        instruction: &ReadInstruction,
        shuffle_files: bool,
        parser: Arc<P>,
    ) -> Result<RecordDataset<P>> {
        let plan = make_file_instructions(shard_info, instruction)?;
        for term in instruction.terms() {
            verify_split_files(&self.root, shard_info, &term.split)?;
        }
        if plan.is_empty() {
            return Err(SliceError::new(
                ErrorKind::EmptySelection,
                format!("instruction \"{instruction}\" selects no records"),
            )
            .into());
        }
        let mut files: Vec<FileInstruction<PathBuf>> = plan
            .instructions
            .iter()
            .cloned()
            .map(|fi| fi.map_source(|name| self.root.join(name)))
            .collect();
        if let Some(sort) = &self.config.interleave_sort_fn {
            sort(&mut files);
        }
        debug!(
            "\"{instruction}\": {} records from {} files",
            plan.num_examples(),
            files.len()
        );
        Ok(RecordDataset {
            num_examples: plan.num_examples(),
            files,
            shuffle_files,
            config: self.config.clone(),
            parser,
            epoch: AtomicU64::new(0),
        })
    }
}

/// A resolved, re-iterable read of one instruction.
pub struct RecordDataset<P: RecordParser> {
    files: Vec<FileInstruction<PathBuf>>,
    num_examples: u64,
    shuffle_files: bool,
    config: ReadConfig,
    parser: Arc<P>,
    epoch: AtomicU64,
}

impl<P: RecordParser> RecordDataset<P> {
    /// Records every full iteration yields.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.num_examples
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.num_examples == 0
    }

    /// File instructions before shuffling.
    #[must_use]
    pub fn files(&self) -> &[FileInstruction<PathBuf>] {
        &self.files
    }

    /// File order of iteration number `epoch`.
    #[must_use]
    pub fn file_order(&self, epoch: u64) -> Vec<FileInstruction<PathBuf>> {
        let mut files = self.files.clone();
        if self.shuffle_files {
            let seed = if self.config.shuffle_reshuffle_each_iteration {
                epoch_seed(self.config.seed, epoch)
            } else {
                self.config.seed
            };
            shuffle_in_place(&mut files, &mut SplitMix64::new(seed));
        }
        files
    }

    /// Start a new pass over the records.
    #[must_use]
    pub fn iter(&self) -> RecordStream<P> {
        let epoch = self.epoch.fetch_add(1, Ordering::Relaxed);
        let files = self.file_order(epoch);
        debug!("iteration {epoch} over {} files", files.len());
        RecordStream {
            source: Interleave::new(files, &self.config, self.shuffle_files),
            parser: Arc::clone(&self.parser),
            batch_size: self.config.num_parallel_calls.max(1),
            deterministic: self.config.deterministic,
            pending: VecDeque::new(),
            expected: self.num_examples,
            seen: 0,
            finished: false,
        }
    }

    /// Every record of one pass.
    ///
    /// # Errors
    /// The first error of the pass.
    pub fn collect_all(&self) -> Result<Vec<P::Output>> {
        self.iter().collect()
    }
}

impl<'a, P: RecordParser> IntoIterator for &'a RecordDataset<P> {
    type Item = Result<P::Output>;
    type IntoIter = RecordStream<P>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy stream of parsed records. Ends after the first error.
pub struct RecordStream<P: RecordParser> {
    source: Interleave,
    parser: Arc<P>,
    batch_size: usize,
    deterministic: bool,
    pending: VecDeque<Result<P::Output>>,
    expected: u64,
    seen: u64,
    finished: bool,
}

impl<P: RecordParser> RecordStream<P> {
    fn parse_batch(&self, batch: Vec<Vec<u8>>) -> Vec<Result<P::Output>> {
        if batch.len() <= 1 {
            return batch.into_iter().map(|r| self.parser.parse(r)).collect();
        }
        parse_parallel(self.parser.as_ref(), batch, self.deterministic)
    }

    fn pull(&mut self) {
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut read_error = None;
        let mut exhausted = false;
        while batch.len() < self.batch_size {
            match self.source.next() {
                Some(Ok(record)) => batch.push(record),
                Some(Err(e)) => {
                    read_error = Some(e);
                    break;
                }
                None => {
                    exhausted = true;
                    break;
                }
            }
        }
        self.seen += batch.len() as u64;

        for parsed in self.parse_batch(batch) {
            let failed = parsed.is_err();
            self.pending.push_back(parsed);
            if failed {
                self.finished = true;
                return;
            }
        }
        if let Some(e) = read_error {
            self.pending.push_back(Err(e));
            self.finished = true;
        } else if exhausted {
            self.finished = true;
            if self.seen != self.expected {
                let msg = format!(
                    "read {} records where shard metadata promises {}",
                    self.seen, self.expected
                );
                error!("{msg}");
                self.pending
                    .push_back(Err(SliceError::new(ErrorKind::Cardinality, msg).into()));
            }
        }
    }
}

impl<P: RecordParser> Iterator for RecordStream<P> {
    type Item = Result<P::Output>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }
            if self.finished {
                return None;
            }
            self.pull();
        }
    }
}

fn parse_parallel<P: RecordParser>(
    parser: &P,
    batch: Vec<Vec<u8>>,
    deterministic: bool,
) -> Vec<Result<P::Output>> {
    use rayon::prelude::*;
    if deterministic {
        return batch.into_par_iter().map(|r| parser.parse(r)).collect();
    }
    let (tx, rx) = std::sync::mpsc::channel();
    batch
        .into_par_iter()
        .for_each_with(tx, |tx, r| {
            let _ = tx.send(parser.parse(r));
        });
    rx.into_iter().collect()
}

/// One open shard with its remaining take budget.
struct OpenFile {
    path: PathBuf,
    records: RecordReader<Box<dyn Read + Send>>,
    remaining: Option<u64>,
}

impl OpenFile {
    fn open(instr: FileInstruction<PathBuf>, config: &ReadConfig) -> Result<Self> {
        let inner = open_reader(&instr.source, config.read_buffer_size)?;
        let mut records = RecordReader::new(inner).verify_checksums(config.verify_checksums);
        let skipped = records
            .skip_records(instr.skip)
            .with_context(|| format!("skip records of {}", instr.source.display()))?;
        if skipped < instr.skip {
            return Err(SliceError::metadata(format!(
                "{} holds {skipped} records, cannot skip {}",
                instr.source.display(),
                instr.skip
            ))
            .into());
        }
        Ok(Self {
            path: instr.source,
            records,
            remaining: match instr.take {
                Take::Count(n) => Some(n),
                Take::Remaining => None,
            },
        })
    }

    /// Up to `block` records; the flag is set once the file has nothing more to give.
    fn read_block(&mut self, block: usize) -> Result<(Vec<Vec<u8>>, bool)> {
        let want = match self.remaining {
            Some(r) => usize::try_from(r).map_or(block, |r| r.min(block)),
            None => block,
        };
        let mut out = Vec::with_capacity(want);
        while out.len() < want {
            match self.records.next() {
                Some(record) => {
                    out.push(record.with_context(|| format!("read {}", self.path.display()))?);
                }
                None => break,
            }
        }
        if let Some(r) = self.remaining.as_mut() {
            *r -= out.len() as u64;
        }
        let exhausted = out.len() < block || self.remaining == Some(0);
        Ok((out, exhausted))
    }
}

/// Round-robin over up to `cycle_length` open files, `block_length` records at a time.
struct Interleave {
    queue: VecDeque<FileInstruction<PathBuf>>,
    slots: Vec<Option<OpenFile>>,
    block_length: usize,
    parallel: bool,
    config: ReadConfig,
    buffered: VecDeque<Vec<u8>>,
    error: Option<anyhow::Error>,
    failed: bool,
}

impl Interleave {
    fn new(files: Vec<FileInstruction<PathBuf>>, config: &ReadConfig, shuffle_files: bool) -> Self {
        let cycle = config.cycle_length(shuffle_files).min(files.len()).max(1);
        Self {
            queue: files.into(),
            slots: (0..cycle).map(|_| None).collect(),
            block_length: config.interleave_block_length.max(1),
            parallel: config.parallel_reads,
            config: config.clone(),
            buffered: VecDeque::new(),
            error: None,
            failed: false,
        }
    }

    fn fill_slots(&mut self) -> Result<()> {
        for slot in &mut self.slots {
            if slot.is_none()
                && let Some(instr) = self.queue.pop_front()
            {
                *slot = Some(OpenFile::open(instr, &self.config)?);
            }
        }
        Ok(())
    }

    /// Read one block from every open file; `false` once everything is consumed.
    ///
    /// A failing file keeps the blocks of the slots before it; the error is held
    /// back until those are emitted.
    fn next_round(&mut self) -> Result<bool> {
        self.fill_slots()?;
        if self.slots.iter().all(Option::is_none) {
            return Ok(false);
        }
        let blocks = read_blocks(&mut self.slots, self.block_length, self.parallel);
        for (slot, block) in self.slots.iter_mut().zip(blocks) {
            match block {
                Some(Ok((records, exhausted))) => {
                    self.buffered.extend(records);
                    if exhausted {
                        *slot = None;
                    }
                }
                Some(Err(e)) => {
                    self.error = Some(e);
                    self.failed = true;
                    break;
                }
                None => {}
            }
        }
        Ok(true)
    }
}

type Block = Option<Result<(Vec<Vec<u8>>, bool)>>;

#[cfg(feature = "parallel-io")]
fn read_blocks(slots: &mut [Option<OpenFile>], block: usize, parallel: bool) -> Vec<Block> {
    use rayon::prelude::*;
    if parallel && slots.len() > 1 {
        slots
            .par_iter_mut()
            .map(|slot| slot.as_mut().map(|f| f.read_block(block)))
            .collect()
    } else {
        slots
            .iter_mut()
            .map(|slot| slot.as_mut().map(|f| f.read_block(block)))
            .collect()
    }
}

#[cfg(not(feature = "parallel-io"))]
fn read_blocks(slots: &mut [Option<OpenFile>], block: usize, _parallel: bool) -> Vec<Block> {
    slots
        .iter_mut()
        .map(|slot| slot.as_mut().map(|f| f.read_block(block)))
        .collect()
}

impl Iterator for Interleave {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.buffered.pop_front() {
                return Some(Ok(record));
            }
            if self.failed {
                return self.error.take().map(Err);
            }
            match self.next_round() {
                Ok(true) => {}
                Ok(false) => return None,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
