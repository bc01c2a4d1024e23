//! # Ironshard
//!
//! Split slicing and shard planning for record datasets stored as sharded files.
//!
//! A dataset directory holds one or more named **splits** (`train`, `val`, ...), each
//! written as numbered shard files (`train-00000-of-00004.tfrecord`) plus a
//! `shard_info.json` that records how many records every shard holds. Ironshard
//! covers both directions:
//!
//! - **Writing**: [`writer::SplitWriter`] takes a keyed, de-duplicated
//!   [`cache::ExampleCache`], sizes the shards so each stays within a byte band,
//!   cuts the split into contiguous shard ranges and records the layout.
//! - **Reading**: a slice spec such as `"train[:10%]+val[-500:]"` is parsed into a
//!   [`ReadInstruction`], resolved to absolute record ranges, mapped onto per-file
//!   skip/take windows and read back by [`reader::Reader`] as a lazily pulled,
//!   optionally file-shuffled and interleaved stream.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ironshard::config::{ReadConfig, WriteConfig};
//! use ironshard::reader::{RawRecords, Reader};
//! use ironshard::writer::write_split;
//! # fn main() -> anyhow::Result<()> {
//! let records = (0..50_000u32).map(|i| (i.to_le_bytes(), format!("example {i}").into_bytes()));
//! write_split("data/demo", "train", records, WriteConfig::default())?;
//!
//! let reader = Reader::new("data/demo", ReadConfig::default());
//! let first_tenth = reader.read_spec("train[:10%]", true, RawRecords)?;
//! assert_eq!(first_tenth.len(), 5_000);
//! for record in &first_tenth {
//!     let _bytes = record?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Slice specs
//!
//! | spec             | selects                                  |
//! |------------------|------------------------------------------|
//! | `train`          | the whole split                          |
//! | `train[10:20]`   | records 10 to 19                         |
//! | `train[-100:]`   | the last 100 records                     |
//! | `train[:25%]`    | the first quarter, rounded per [`Rounding`] |
//! | `train+val[:5%]` | all of `train`, then the start of `val`  |
//!
//! Every failure carries an [`error::ErrorKind`], recoverable from an
//! [`anyhow::Error`] with [`error::error_kind`].
//!
//! ## Features
//!
//! - `parallel-io` (default): parallel shard writes and parallel per-file reads with rayon
//! - `compression-gzip` (default): `.gz` shard files
//! - `compression-zstd` (default): `.zst` shard files

pub mod cache;
pub mod config;
pub mod error;
pub mod file_instruction;
pub mod instruction;
pub mod io;
pub mod progress;
pub mod reader;
pub mod shard_info;
pub mod shard_plan;
pub mod testing;
pub mod utils;
pub mod writer;

pub use error::{ErrorKind, SliceError, SliceResult, error_kind};
pub use file_instruction::{
    FileInstruction, FilePlan, Take, make_file_instructions, read_instructions,
};
pub use instruction::{
    AbsoluteInstruction, ReadInstruction, RelativeInstruction, Rounding, SplitLengths, Unit,
};
pub use reader::{Nested, Reader, RecordDataset};
pub use shard_info::{MergePolicy, ShardInfo};
pub use shard_plan::{compute_shard_count, shard_boundaries, shard_filename};
pub use writer::{SplitWriter, write_split};
