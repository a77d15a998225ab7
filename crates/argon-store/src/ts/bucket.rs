//! Bucket index: per-bucket record list persistence.
//!
//! A bucket is one substrate entry, keyed by its integer bucket key and
//! holding the bucket's records as a length-prefixed frame list:
//!
//! ```text
//! ┌──────────────────────────────┐
//! │  Record Count: u32           │
//! ├──────────────────────────────┤
//! │  Per record:                 │
//! │  - Length: u32               │
//! │  - Canonical record bytes    │
//! └──────────────────────────────┘
//! ```
//!
//! A bucket mutation is a full rewrite of the blob in a single substrate
//! `put`, so readers never observe a partially updated bucket. Integrity
//! is covered by the substrate log's per-entry checksum.

use crate::error::{ArgonError, Result};
use crate::ts::BucketKey;
use crate::volume::{Datastore, ScalarKey};

/// Persistence for ordered per-bucket record lists.
///
/// Owns the underlying datastore exclusively; every bucket maps to one
/// substrate entry under `ScalarKey::Int(bucket_key)`.
pub struct BucketIndex {
    ds: Datastore,
}

impl BucketIndex {
    /// Wraps a datastore as a bucket index.
    pub fn new(ds: Datastore) -> Self {
        Self { ds }
    }

    /// Consumes the index, returning the underlying datastore.
    pub fn into_datastore(self) -> Datastore {
        self.ds
    }

    /// Loads the raw record frames for `bucket_key`.
    ///
    /// Returns an empty sequence for an unknown bucket key.
    ///
    /// # Errors
    ///
    /// Returns `CorruptBucket` if the stored blob does not decode.
    pub fn load(&self, bucket_key: BucketKey) -> Result<Vec<Vec<u8>>> {
        match self.ds.get(&ScalarKey::Int(bucket_key)) {
            Some(blob) => decode_bucket(blob),
            None => Ok(Vec::new()),
        }
    }

    /// Persists `frames` as the full contents of `bucket_key`.
    ///
    /// Replaces any prior contents in a single substrate put; an
    /// immediate `load` returns byte-identical frames.
    pub fn store(&mut self, bucket_key: BucketKey, frames: &[Vec<u8>]) -> Result<()> {
        self.ds.put(ScalarKey::Int(bucket_key), encode_bucket(frames))
    }

    /// Returns all bucket keys in ascending numeric order.
    pub fn bucket_keys(&self) -> Vec<BucketKey> {
        self.ds
            .keys()
            .into_iter()
            .filter_map(|key| match key {
                ScalarKey::Int(k) => Some(k),
                ScalarKey::Str(_) => None,
            })
            .collect()
    }
}

/// Encodes record frames into a bucket blob.
fn encode_bucket(frames: &[Vec<u8>]) -> Vec<u8> {
    let size = 4 + frames.iter().map(|f| 4 + f.len()).sum::<usize>();
    let mut blob = Vec::with_capacity(size);
    blob.extend_from_slice(&(frames.len() as u32).to_le_bytes());
    for frame in frames {
        blob.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        blob.extend_from_slice(frame);
    }
    blob
}

/// Decodes a bucket blob into record frames.
fn decode_bucket(blob: &[u8]) -> Result<Vec<Vec<u8>>> {
    let corrupt = |msg: &str| ArgonError::CorruptBucket(msg.to_string());

    if blob.len() < 4 {
        return Err(corrupt("blob shorter than record count"));
    }
    let count = u32::from_le_bytes(blob[..4].try_into().unwrap()) as usize;

    let mut frames = Vec::with_capacity(count);
    let mut pos = 4;
    for _ in 0..count {
        if blob.len() < pos + 4 {
            return Err(corrupt("frame length truncated"));
        }
        let len = u32::from_le_bytes(blob[pos..pos + 4].try_into().unwrap()) as usize;
        pos += 4;
        if blob.len() < pos + len {
            return Err(corrupt("frame body truncated"));
        }
        frames.push(blob[pos..pos + len].to_vec());
        pos += len;
    }

    if pos != blob.len() {
        return Err(corrupt("trailing bytes after frames"));
    }

    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::OpenFlags;
    use tempfile::TempDir;

    fn open_index(dir: &TempDir) -> BucketIndex {
        let ds = Datastore::open(
            dir.path().to_str().unwrap(),
            "ts",
            OpenFlags::CREATE | OpenFlags::CREATE_VOLUME,
        )
        .unwrap();
        BucketIndex::new(ds)
    }

    #[test]
    fn test_load_unknown_bucket_is_empty() {
        let dir = TempDir::new().unwrap();
        let index = open_index(&dir);
        assert!(index.load(1000).unwrap().is_empty());
    }

    #[test]
    fn test_store_then_load_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let mut index = open_index(&dir);

        let frames = vec![b"alpha".to_vec(), b"".to_vec(), b"gamma".to_vec()];
        index.store(1000, &frames).unwrap();

        assert_eq!(index.load(1000).unwrap(), frames);
    }

    #[test]
    fn test_store_replaces_prior_contents() {
        let dir = TempDir::new().unwrap();
        let mut index = open_index(&dir);

        index.store(0, &[b"old".to_vec()]).unwrap();
        index.store(0, &[b"new".to_vec(), b"er".to_vec()]).unwrap();

        assert_eq!(index.load(0).unwrap(), vec![b"new".to_vec(), b"er".to_vec()]);
    }

    #[test]
    fn test_bucket_keys_ascending() {
        let dir = TempDir::new().unwrap();
        let mut index = open_index(&dir);

        index.store(2000, &[b"c".to_vec()]).unwrap();
        index.store(0, &[b"a".to_vec()]).unwrap();
        index.store(1000, &[b"b".to_vec()]).unwrap();

        assert_eq!(index.bucket_keys(), vec![0, 1000, 2000]);
    }

    #[test]
    fn test_empty_bucket_key_still_listed() {
        let dir = TempDir::new().unwrap();
        let mut index = open_index(&dir);

        index.store(1000, &[]).unwrap();
        assert_eq!(index.bucket_keys(), vec![1000]);
        assert!(index.load(1000).unwrap().is_empty());
    }

    #[test]
    fn test_decode_rejects_truncated_blob() {
        // count says 1 frame, but no frame follows
        let blob = 1u32.to_le_bytes().to_vec();
        assert!(matches!(
            decode_bucket(&blob),
            Err(ArgonError::CorruptBucket(_))
        ));
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut blob = encode_bucket(&[b"x".to_vec()]);
        blob.push(0);
        assert!(matches!(
            decode_bucket(&blob),
            Err(ArgonError::CorruptBucket(_))
        ));
    }
}
