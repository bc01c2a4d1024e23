//! Length-delimited record files.
//!
//! Every record is framed as
//!
//! ```text
//! u64 LE   payload length
//! u32 LE   masked CRC32C of the 8 length bytes
//! [u8]     payload
//! u32 LE   masked CRC32C of the payload
//! ```
//!
//! which is the [`RECORD_OVERHEAD`](crate::shard_plan::RECORD_OVERHEAD) of 16 bytes
//! the shard planner budgets for. The layout is the TFRecord one, so shard files
//! stay readable by other tooling.

use crate::error::{ErrorKind, SliceError};
use anyhow::{Context, Result, anyhow};
use std::io::{self, ErrorKind as IoErrorKind, Read, Write};

const MASK_DELTA: u32 = 0xa282_ead8;
const INITIAL_PAYLOAD_CAPACITY: u64 = 1 << 20;

/// CRC32C rotated and offset, so that CRCs of data containing CRCs stay well distributed.
#[must_use]
pub fn masked_crc32c(data: &[u8]) -> u32 {
    let crc = crc32c::crc32c(data);
    ((crc >> 15) | (crc << 17)).wrapping_add(MASK_DELTA)
}

/// Appends framed records to any writer.
pub struct RecordWriter<W: Write> {
    inner: W,
    records: u64,
    bytes: u64,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            records: 0,
            bytes: 0,
        }
    }

    /// Frame and write one record.
    ///
    /// # Errors
    /// Propagates I/O errors from the underlying writer.
    pub fn write_record(&mut self, payload: &[u8]) -> io::Result<()> {
        let len = (payload.len() as u64).to_le_bytes();
        self.inner.write_all(&len)?;
        self.inner.write_all(&masked_crc32c(&len).to_le_bytes())?;
        self.inner.write_all(payload)?;
        self.inner.write_all(&masked_crc32c(payload).to_le_bytes())?;
        self.records += 1;
        self.bytes += payload.len() as u64 + 16;
        Ok(())
    }

    /// Records written so far.
    pub const fn records(&self) -> u64 {
        self.records
    }

    /// Framed bytes written so far.
    pub const fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Iterates the records of a framed stream.
///
/// A clean end of stream between records ends the iteration; a stream that stops
/// inside a record yields an error.
pub struct RecordReader<R: Read> {
    inner: R,
    verify_checksums: bool,
    position: u64,
    done: bool,
}

impl<R: Read> RecordReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            verify_checksums: true,
            position: 0,
            done: false,
        }
    }

    #[must_use]
    pub fn verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Index of the next record.
    pub const fn position(&self) -> u64 {
        self.position
    }

    /// Discard up to `n` records without checking payload CRCs. Returns how many
    /// were actually skipped (fewer only at end of stream).
    ///
    /// # Errors
    /// Fails on I/O errors and truncated records.
    pub fn skip_records(&mut self, n: u64) -> Result<u64> {
        let mut skipped = 0;
        while skipped < n {
            let Some(len) = self.read_header()? else {
                break;
            };
            let want = len.checked_add(4).ok_or_else(|| {
                anyhow!("record {} claims an impossible length {len}", self.position)
            })?;
            let got = io::copy(&mut (&mut self.inner).take(want), &mut io::sink())
                .context("skip record payload")?;
            if got != want {
                return Err(anyhow!("truncated record {} while skipping", self.position));
            }
            self.position += 1;
            skipped += 1;
        }
        Ok(skipped)
    }

    /// Reads the length header; `None` on a clean end of stream.
    fn read_header(&mut self) -> Result<Option<u64>> {
        let mut header = [0u8; 12];
        let mut filled = 0;
        while filled < header.len() {
            match self.inner.read(&mut header[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == IoErrorKind::Interrupted => {}
                Err(e) => return Err(e).context("read record header"),
            }
        }
        if filled == 0 {
            self.done = true;
            return Ok(None);
        }
        if filled < header.len() {
            return Err(anyhow!("truncated header of record {}", self.position));
        }
        let (len_bytes, crc_bytes) = header.split_at(8);
        if self.verify_checksums {
            let expected = u32::from_le_bytes(crc_bytes.try_into()?);
            if masked_crc32c(len_bytes) != expected {
                return Err(SliceError::new(
                    ErrorKind::Checksum,
                    format!("corrupt length header of record {}", self.position),
                )
                .into());
            }
        }
        Ok(Some(u64::from_le_bytes(len_bytes.try_into()?)))
    }

    fn read_record(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(len) = self.read_header()? else {
            return Ok(None);
        };
        // The buffer grows with the bytes actually present, never with the header's claim.
        let capacity = usize::try_from(len.min(INITIAL_PAYLOAD_CAPACITY))?;
        let mut payload = Vec::with_capacity(capacity);
        let got = (&mut self.inner)
            .take(len)
            .read_to_end(&mut payload)
            .with_context(|| format!("read payload of record {}", self.position))?;
        if got as u64 != len {
            return Err(anyhow!(
                "truncated payload of record {}: {got} of {len} bytes",
                self.position
            ));
        }
        let mut crc = [0u8; 4];
        self.inner
            .read_exact(&mut crc)
            .with_context(|| format!("truncated payload of record {}", self.position))?;
        if self.verify_checksums && masked_crc32c(&payload) != u32::from_le_bytes(crc) {
            return Err(SliceError::new(
                ErrorKind::Checksum,
                format!("corrupt payload of record {}", self.position),
            )
            .into());
        }
        self.position += 1;
        Ok(Some(payload))
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
