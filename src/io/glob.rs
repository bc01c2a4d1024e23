//! Shard file discovery and on-disk consistency checks.
//!
//! ```no_run
//! use ironshard::io::glob::{split_shard_files, verify_shard_files};
//! use ironshard::shard_info::ShardInfo;
//!
//! let files = split_shard_files("data/mnist", "train")?;
//! let info = ShardInfo::load("data/mnist")?;
//! verify_shard_files("data/mnist", &info)?;
//! # use anyhow::Error; Ok::<(), Error>(())
//! ```

use crate::error::SliceError;
use crate::shard_info::ShardInfo;
use anyhow::{Context, Result};
use glob::{Pattern, glob};
use log::debug;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static SHARD_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<split>.+)-(?P<index>\d{5,})-of-(?P<count>\d{5,})\.")
        .expect("static shard name regex")
});

/// Parts of a shard file name: split, shard index, shard count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardName {
    pub split: String,
    pub index: u64,
    pub count: u64,
}

/// Parse `{split}-{index:05}-of-{count:05}.{ext}`.
#[must_use]
pub fn parse_shard_filename(name: &str) -> Option<ShardName> {
    let caps = SHARD_NAME_RE.captures(name)?;
    Some(ShardName {
        split: caps["split"].to_string(),
        index: caps["index"].parse().ok()?,
        count: caps["count"].parse().ok()?,
    })
}

/// Every shard file of `split` under `root`, sorted by name (which is shard order).
///
/// # Errors
/// Fails on an unreadable directory or an invalid pattern.
pub fn split_shard_files(root: impl AsRef<Path>, split: &str) -> Result<Vec<PathBuf>> {
    let root = root.as_ref();
    let pattern = format!(
        "{}/{}-[0-9][0-9][0-9][0-9][0-9]*-of-[0-9][0-9][0-9][0-9][0-9]*.*",
        Pattern::escape(&root.to_string_lossy()),
        Pattern::escape(split)
    );
    let mut files = Vec::new();
    for entry in glob(&pattern).with_context(|| format!("invalid glob pattern: {pattern}"))? {
        let path =
            entry.with_context(|| format!("error reading glob entry for pattern: {pattern}"))?;
        let belongs = path
            .file_name()
            .and_then(|n| parse_shard_filename(&n.to_string_lossy()))
            .is_some_and(|s| s.split == split);
        if path.is_file() && belongs {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Check that every shard listed in `info` exists under `root` and that the listed
/// shards of each split are exactly `0..count` of one `-of-count` family.
///
/// # Errors
/// [`crate::error::ErrorKind::Metadata`] describing the first inconsistency.
pub fn verify_shard_files(root: impl AsRef<Path>, info: &ShardInfo) -> Result<()> {
    let root = root.as_ref();
    info.split_names().try_for_each(|split| verify_split_files(root, info, split))
}

/// [`verify_shard_files`] restricted to one split. A split absent from `info` has
/// nothing to check.
///
/// # Errors
/// [`crate::error::ErrorKind::Metadata`] describing the first inconsistency.
pub fn verify_split_files(root: impl AsRef<Path>, info: &ShardInfo, split: &str) -> Result<()> {
    let root = root.as_ref();
    let Some((names, _)) = info.split_shards(split) else {
        return Ok(());
    };
    let count = names.len() as u64;
    for (expected_index, name) in (0u64..).zip(&names) {
        let parsed = parse_shard_filename(name).ok_or_else(|| {
            SliceError::metadata(format!(
                "`{name}` of split \"{split}\" is not a shard file name"
            ))
        })?;
        if parsed.index != expected_index || parsed.count != count {
            return Err(SliceError::metadata(format!(
                "`{name}` is out of place: expected shard {expected_index} of {count}"
            ))
            .into());
        }
        if !root.join(name).is_file() {
            return Err(SliceError::metadata(format!(
                "shard `{name}` of split \"{split}\" is missing from {}",
                root.display()
            ))
            .into());
        }
    }
    debug!("split \"{split}\": {count} shard files present");
    Ok(())
}
