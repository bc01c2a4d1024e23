//! The write-time record producer.
//!
//! A write pass needs an ordered, de-duplicated source of serialized records whose
//! total count, total size and bucket layout are known before shards are planned.
//! [`ExampleCache`] is that seam; [`BucketCache`] is an in-memory implementation
//! that hash-orders records by key.

use crate::error::{ErrorKind, SliceError};
use anyhow::Result;
use log::error;
use sha2::{Digest, Sha256};

/// Ordered producer of `(key_hash, serialized_record)` pairs grouped into buckets.
///
/// `stream()` yields every bucket in index order, and `read_bucket(i)` yields the
/// records of bucket `i` in the same order as the stream does.
pub trait ExampleCache: Send + Sync {
    /// Number of records.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of serialized record sizes in bytes, without framing.
    fn size(&self) -> u64;

    /// Records per bucket, in stream order.
    fn bucket_lengths(&self) -> Vec<u64>;

    /// Every record, bucket after bucket.
    fn stream(&self) -> Box<dyn Iterator<Item = Result<(u128, Vec<u8>)>> + Send + '_>;

    /// The records of one bucket.
    ///
    /// # Errors
    /// [`ErrorKind::DuplicateKey`] if two records of the bucket share a key.
    fn read_bucket(&self, index: usize) -> Result<Vec<Vec<u8>>>;
}

/// Stable 128-bit hash of a record key (leading bytes of its SHA-256).
#[must_use]
pub fn hash_key(key: &[u8]) -> u128 {
    let digest = Sha256::digest(key);
    let mut head = [0u8; 16];
    head.copy_from_slice(&digest[..16]);
    u128::from_be_bytes(head)
}

/// In-memory cache: records are spread over `num_buckets` buckets by key hash and
/// ordered by hash within each bucket, which makes the final order a deterministic
/// shuffle of the input.
#[derive(Debug, Clone)]
pub struct BucketCache {
    buckets: Vec<Vec<(u128, Vec<u8>)>>,
    len: u64,
    size: u64,
}

impl Default for BucketCache {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl BucketCache {
    #[must_use]
    pub fn new(num_buckets: usize) -> Self {
        Self {
            buckets: vec![Vec::new(); num_buckets.max(1)],
            len: 0,
            size: 0,
        }
    }

    /// Add one serialized record under `key`.
    pub fn add(&mut self, key: impl AsRef<[u8]>, record: Vec<u8>) {
        let hash = hash_key(key.as_ref());
        #[allow(clippy::cast_possible_truncation)]
        let bucket = (hash % self.buckets.len() as u128) as usize;
        self.len += 1;
        self.size += record.len() as u64;
        self.buckets[bucket].push((hash, record));
    }

    fn sorted_bucket(&self, index: usize) -> Result<Vec<(u128, Vec<u8>)>> {
        let mut bucket = self.buckets.get(index).cloned().unwrap_or_default();
        bucket.sort_by_key(|(hash, _)| *hash);
        if let Some(pair) = bucket.windows(2).find(|w| w[0].0 == w[1].0) {
            let msg = format!("two records share the same hashed key {:032x}", pair[0].0);
            error!("{msg}");
            return Err(SliceError::new(ErrorKind::DuplicateKey, msg).into());
        }
        Ok(bucket)
    }
}

impl<K: AsRef<[u8]>> Extend<(K, Vec<u8>)> for BucketCache {
    fn extend<I: IntoIterator<Item = (K, Vec<u8>)>>(&mut self, iter: I) {
        for (key, record) in iter {
            self.add(key, record);
        }
    }
}

impl ExampleCache for BucketCache {
    fn len(&self) -> u64 {
        self.len
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn bucket_lengths(&self) -> Vec<u64> {
        self.buckets.iter().map(|b| b.len() as u64).collect()
    }

    fn stream(&self) -> Box<dyn Iterator<Item = Result<(u128, Vec<u8>)>> + Send + '_> {
        Box::new((0..self.buckets.len()).flat_map(move |i| {
            match self.sorted_bucket(i) {
                Ok(records) => records.into_iter().map(Ok).collect::<Vec<_>>(),
                Err(e) => vec![Err(e)],
            }
        }))
    }

    fn read_bucket(&self, index: usize) -> Result<Vec<Vec<u8>>> {
        Ok(self
            .sorted_bucket(index)?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }
}
