//! Time-series storage layer.
//!
//! Records are grouped into fixed-width buckets keyed by the value of a
//! designated index field at insertion time. Each bucket is one substrate
//! entry holding the bucket's records in insertion order.
//!
//! # Components
//!
//! - [`TsConfig`]: index-field designation and bucket width
//! - [`BucketIndex`](bucket::BucketIndex): per-bucket record list persistence
//! - [`TsStore`](store::TsStore): insert / point lookup / predicate
//!   search / predicate delete

pub mod bucket;
pub mod store;

use crate::record::FieldTag;

pub use store::TsStore;

/// A bucket key: the index-field value floored to a multiple of the
/// bucket width.
pub type BucketKey = i64;

/// Default bucket width.
pub const DEFAULT_BUCKET_WIDTH: i64 = 10;

/// Configuration for a time-series store.
///
/// Both settings are fixed for the lifetime of a store handle: a record's
/// bucket membership is decided once, at insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsConfig {
    /// Tag of the field whose value drives bucket assignment.
    pub index_field: FieldTag,

    /// Width of each bucket.
    ///
    /// Index values `v` map to bucket key `floor(v / width) * width`.
    /// Must be positive. Default: 10.
    pub bucket_width: i64,
}

impl TsConfig {
    /// Creates a configuration for the given index field with the
    /// default bucket width.
    pub fn new(index_field: FieldTag) -> Self {
        Self {
            index_field,
            bucket_width: DEFAULT_BUCKET_WIDTH,
        }
    }

    /// Creates a new configuration with a custom bucket width.
    pub fn with_bucket_width(mut self, width: i64) -> Self {
        self.bucket_width = width;
        self
    }

    /// Calculates the bucket key for an index-field value.
    ///
    /// The key is the value floored to a multiple of the bucket width;
    /// negative values floor toward negative infinity, so e.g. -1 with
    /// width 10 lands in bucket -10, not 0.
    pub fn bucket_key_for(&self, index_value: i64) -> BucketKey {
        index_value.div_euclid(self.bucket_width) * self.bucket_width
    }
}
