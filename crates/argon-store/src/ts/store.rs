//! Time-series store: insertion, lookup, predicate search and delete.

use crate::error::{ArgonError, Result};
use crate::record::{Criteria, Record, Value};
use crate::ts::bucket::BucketIndex;
use crate::ts::{BucketKey, TsConfig};
use crate::volume::{Datastore, OpenFlags};
use tracing::debug;

/// A time-series store over one datastore.
///
/// Records are routed to fixed-width buckets by the value of the
/// configured index field at insertion time; bucket membership never
/// changes afterwards. Search and delete are full scans in ascending
/// bucket-key order, then insertion order within each bucket — no
/// secondary index beyond the bucket key is maintained, so
/// arbitrary-field filtering is O(total records).
pub struct TsStore {
    /// Bucket persistence; `None` after cleanup.
    index: Option<BucketIndex>,
    /// Index-field designation and bucket width, fixed at open.
    config: TsConfig,
    /// Datastore name, kept for logging after cleanup.
    name: String,
}

impl TsStore {
    /// Opens (or creates, per `flags`) the time-series datastore `name`
    /// inside the volume addressed by `url`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBucketWidth` for a non-positive bucket width and
    /// propagates volume-open failures; see [`Datastore::open`].
    pub fn open(url: &str, name: &str, flags: OpenFlags, config: TsConfig) -> Result<Self> {
        if config.bucket_width <= 0 {
            return Err(ArgonError::InvalidBucketWidth(config.bucket_width));
        }

        let ds = Datastore::open(url, name, flags)?;
        Ok(Self {
            index: Some(BucketIndex::new(ds)),
            config,
            name: name.to_string(),
        })
    }

    /// Returns the store's configuration.
    pub fn config(&self) -> &TsConfig {
        &self.config
    }

    fn index(&self) -> Result<&BucketIndex> {
        self.index.as_ref().ok_or(ArgonError::StoreClosed)
    }

    fn index_mut(&mut self) -> Result<&mut BucketIndex> {
        self.index.as_mut().ok_or(ArgonError::StoreClosed)
    }

    /// Reads the index-field value from a record.
    fn index_value(&self, record: &Record) -> Result<i64> {
        let field = self.config.index_field;
        match record.get(field) {
            Ok(Value::Int(v)) => Ok(*v),
            Ok(_) => Err(ArgonError::InvalidIndexField { field }),
            Err(_) => Err(ArgonError::MissingIndexField { field }),
        }
    }

    /// Inserts a single record.
    ///
    /// The record's bucket is derived from its index-field value, the
    /// record is appended to that bucket's list, and the bucket is
    /// persisted in one substrate put. Records inserted into the same
    /// bucket keep their insertion order.
    ///
    /// # Errors
    ///
    /// Returns `MissingIndexField` if the record lacks the index field,
    /// `InvalidIndexField` if it is not an integer.
    pub fn insert_one(&mut self, record: &Record) -> Result<()> {
        let bucket_key = self.config.bucket_key_for(self.index_value(record)?);

        let index = self.index_mut()?;
        let mut frames = index.load(bucket_key)?;
        frames.push(record.encode());
        index.store(bucket_key, &frames)
    }

    /// Inserts records in input order.
    ///
    /// Fail-fast: each record's bucket update is independently persisted,
    /// and the first failure stops the batch — records before it remain
    /// stored, the failing record and everything after it do not.
    pub fn insert_many(&mut self, records: &[Record]) -> Result<()> {
        for record in records {
            self.insert_one(record)?;
        }
        Ok(())
    }

    /// Returns all bucket keys in ascending order.
    pub fn keys(&self) -> Result<Vec<BucketKey>> {
        Ok(self.index()?.bucket_keys())
    }

    /// Returns the records in `bucket_key`, in insertion order.
    ///
    /// An unknown bucket key yields an empty sequence.
    pub fn get(&self, bucket_key: BucketKey) -> Result<Vec<Record>> {
        self.index()?
            .load(bucket_key)?
            .iter()
            .map(|frame| Record::decode(frame))
            .collect()
    }

    /// Returns every record matching all `criteria` pairs.
    ///
    /// Scans every bucket in ascending bucket-key order and every record
    /// within a bucket in insertion order. Zero matches is success.
    pub fn find(&self, criteria: &Criteria) -> Result<Vec<Record>> {
        let index = self.index()?;

        let mut results = Vec::new();
        for bucket_key in index.bucket_keys() {
            for frame in index.load(bucket_key)? {
                let record = Record::decode(&frame)?;
                if record.matches(criteria) {
                    results.push(record);
                }
            }
        }
        Ok(results)
    }

    /// Returns the first record matching all `criteria` pairs, in scan
    /// order, or `None`.
    pub fn find_one(&self, criteria: &Criteria) -> Result<Option<Record>> {
        let index = self.index()?;

        for bucket_key in index.bucket_keys() {
            for frame in index.load(bucket_key)? {
                let record = Record::decode(&frame)?;
                if record.matches(criteria) {
                    return Ok(Some(record));
                }
            }
        }
        Ok(None)
    }

    /// Removes every record matching all `criteria` pairs.
    ///
    /// Non-matching records keep their relative order; each affected
    /// bucket is written back exactly once. A bucket emptied by the
    /// delete keeps its key present with an empty record list.
    ///
    /// Returns the number of records removed.
    pub fn delete(&mut self, criteria: &Criteria) -> Result<usize> {
        let index = self.index_mut()?;

        let mut removed = 0usize;
        for bucket_key in index.bucket_keys() {
            let frames = index.load(bucket_key)?;
            let before = frames.len();

            let mut kept = Vec::with_capacity(before);
            for frame in frames {
                if Record::decode(&frame)?.matches(criteria) {
                    removed += 1;
                } else {
                    kept.push(frame);
                }
            }

            if kept.len() != before {
                index.store(bucket_key, &kept)?;
            }
        }

        if removed > 0 {
            debug!("Deleted {} records from {}", removed, self.name);
        }
        Ok(removed)
    }

    /// Removes the first record matching all `criteria` pairs, in scan
    /// order.
    ///
    /// Returns true if a record was removed.
    pub fn delete_one(&mut self, criteria: &Criteria) -> Result<bool> {
        let index = self.index_mut()?;

        for bucket_key in index.bucket_keys() {
            let frames = index.load(bucket_key)?;
            for (i, frame) in frames.iter().enumerate() {
                if Record::decode(frame)?.matches(criteria) {
                    let mut kept = frames.clone();
                    kept.remove(i);
                    index.store(bucket_key, &kept)?;
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Destroys the backing datastore and releases the handle.
    ///
    /// Idempotent: calling `cleanup` on an already-cleaned handle is a
    /// no-op `Ok`. Any other operation after cleanup fails with
    /// `ArgonError::StoreClosed`.
    pub fn cleanup(&mut self) -> Result<()> {
        if let Some(index) = self.index.take() {
            index.into_datastore().destroy()?;
            debug!("Cleaned up time-series datastore {}", self.name);
        }
        Ok(())
    }
}
