//! Argon - Embedded File-Backed Storage Engine
//!
//! This crate provides two access models over one persistent volume: a
//! generic scalar key-value store and a bucketed time-series store.
//!
//! # Components
//!
//! - [`Db`]: flat-keyspace scalar key-value store
//! - [`TsStore`]: time-series store routing records into fixed-width
//!   buckets by a designated index field
//! - [`Record`] / [`Value`]: variable-field records with a canonical
//!   byte encoding
//! - [`volume`]: the shared durable substrate (checksummed append log
//!   with replay and compaction)
//!
//! # Example
//!
//! ```rust,ignore
//! use argon_store::{OpenFlags, Record, TsConfig, TsStore};
//!
//! // Open a time-series datastore, bucketing on field 52.
//! let flags = OpenFlags::CREATE | OpenFlags::CREATE_VOLUME;
//! let config = TsConfig::new(52).with_bucket_width(1000);
//! let mut store = TsStore::open("argon://var/data/vol", "trades", flags, config)?;
//!
//! // Insert a record; field 52 drives bucket assignment.
//! let mut record = Record::new();
//! record.set(55, "AAPL").set(52, 1005i64).set(56, 100i64);
//! store.insert_one(&record)?;
//!
//! // The record landed in bucket 1000.
//! assert_eq!(store.keys()?, vec![1000]);
//! ```

#![deny(missing_docs)]

pub mod error;
pub mod kv;
pub mod record;
pub mod ts;
pub mod volume;

pub use error::{ArgonError, Result};
pub use kv::Db;
pub use record::{Criteria, FieldTag, Record, Value};
pub use ts::{BucketKey, TsConfig, TsStore, DEFAULT_BUCKET_WIDTH};
pub use volume::{OpenFlags, ScalarKey};
