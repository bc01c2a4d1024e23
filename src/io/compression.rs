//! Optional compression of shard files.
//!
//! Compression is chosen per write pass and recorded only in the shard file
//! extension (`.tfrecord.gz`, `.tfrecord.zst`); readers detect it from the
//! extension first and fall back to magic bytes.
//!
//! ```no_run
//! use ironshard::io::compression::{Compression, open_reader};
//! # fn main() -> anyhow::Result<()> {
//! let codec = Compression::from_path("train-00000-of-00004.tfrecord.gz");
//! let reader = open_reader("data/train-00000-of-00004.tfrecord.gz", 8 << 20)?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result, bail};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Codec applied to a whole shard file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Zstd,
}

impl Compression {
    /// Suffix appended after the record extension, including the dot.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Gzip => ".gz",
            Self::Zstd => ".zst",
        }
    }

    const fn magic_bytes(self) -> &'static [u8] {
        match self {
            Self::None => &[],
            Self::Gzip => &[0x1f, 0x8b],
            Self::Zstd => &[0x28, 0xb5, 0x2f, 0xfd],
        }
    }

    /// Codec implied by the file extension.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let name = path.as_ref().to_string_lossy().to_lowercase();
        if name.ends_with(".gz") || name.ends_with(".gzip") {
            Self::Gzip
        } else if name.ends_with(".zst") || name.ends_with(".zstd") {
            Self::Zstd
        } else {
            Self::None
        }
    }

    fn from_magic(head: &[u8]) -> Self {
        [Self::Gzip, Self::Zstd]
            .into_iter()
            .find(|c| head.starts_with(c.magic_bytes()))
            .unwrap_or(Self::None)
    }

    fn wrap_reader(self, reader: BufReader<File>) -> Result<Box<dyn Read + Send>> {
        match self {
            Self::None => Ok(Box::new(reader)),
            #[cfg(feature = "compression-gzip")]
            Self::Gzip => Ok(Box::new(flate2::bufread::MultiGzDecoder::new(reader))),
            #[cfg(feature = "compression-zstd")]
            Self::Zstd => Ok(Box::new(
                zstd::stream::read::Decoder::with_buffer(reader).context("init zstd decoder")?,
            )),
            #[allow(unreachable_patterns)]
            other => bail!("{other:?} support is not compiled in"),
        }
    }
}

/// Open `path` for reading with transparent decompression.
///
/// # Errors
/// Fails if the file cannot be opened or its codec is not compiled in.
pub fn open_reader(path: impl AsRef<Path>, buffer_size: usize) -> Result<Box<dyn Read + Send>> {
    let path = path.as_ref();
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut reader = BufReader::with_capacity(buffer_size.max(1024), f);
    let codec = match Compression::from_path(path) {
        Compression::None => {
            let head = reader
                .fill_buf()
                .with_context(|| format!("read header of {}", path.display()))?;
            Compression::from_magic(head)
        }
        codec => codec,
    };
    codec
        .wrap_reader(reader)
        .with_context(|| format!("setup decompression for {}", path.display()))
}

/// Buffered, optionally compressing file writer. Call [`ShardSink::finish`] to
/// flush and write any codec trailer; dropping without it may lose data.
pub enum ShardSink {
    Plain(BufWriter<File>),
    #[cfg(feature = "compression-gzip")]
    Gzip(flate2::write::GzEncoder<BufWriter<File>>),
    #[cfg(feature = "compression-zstd")]
    Zstd(zstd::stream::write::Encoder<'static, BufWriter<File>>),
}

impl ShardSink {
    /// Create `path` and wrap it with `codec`.
    ///
    /// # Errors
    /// Fails if the file cannot be created or the codec is not compiled in.
    pub fn create(path: impl AsRef<Path>, codec: Compression) -> Result<Self> {
        let path = path.as_ref();
        let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let w = BufWriter::new(f);
        match codec {
            Compression::None => Ok(Self::Plain(w)),
            #[cfg(feature = "compression-gzip")]
            Compression::Gzip => Ok(Self::Gzip(flate2::write::GzEncoder::new(
                w,
                flate2::Compression::default(),
            ))),
            #[cfg(feature = "compression-zstd")]
            Compression::Zstd => Ok(Self::Zstd(
                zstd::stream::write::Encoder::new(w, 3).context("init zstd encoder")?,
            )),
            #[allow(unreachable_patterns)]
            other => bail!("{other:?} support is not compiled in"),
        }
    }

    /// Flush buffers, finish the codec stream and sync the file.
    ///
    /// # Errors
    /// Fails on any write or sync error.
    pub fn finish(self) -> Result<()> {
        let w = match self {
            Self::Plain(w) => w,
            #[cfg(feature = "compression-gzip")]
            Self::Gzip(e) => e.finish().context("finish gzip stream")?,
            #[cfg(feature = "compression-zstd")]
            Self::Zstd(e) => e.finish().context("finish zstd stream")?,
        };
        let f = w.into_inner().map_err(|e| e.into_error()).context("flush shard")?;
        f.sync_all().context("sync shard to disk")?;
        Ok(())
    }
}

impl Write for ShardSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::Plain(w) => w.write(buf),
            #[cfg(feature = "compression-gzip")]
            Self::Gzip(w) => w.write(buf),
            #[cfg(feature = "compression-zstd")]
            Self::Zstd(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Plain(w) => w.flush(),
            #[cfg(feature = "compression-gzip")]
            Self::Gzip(w) => w.flush(),
            #[cfg(feature = "compression-zstd")]
            Self::Zstd(w) => w.flush(),
        }
    }
}
