//! Generic scalar key-value store.
//!
//! [`Db`] is the flat-keyspace access model over a persistent volume:
//! typed scalar values under scalar keys, with no bucketing or predicate
//! logic. The time-series layer is built on the same substrate but keeps
//! its own datastores; a `Db` handle owns one datastore exclusively.

use crate::error::{ArgonError, Result};
use crate::record::Value;
use crate::volume::{Datastore, OpenFlags, ScalarKey};
use tracing::debug;

/// A generic key-value store over one datastore.
///
/// Keys order ascending with integers before strings (see
/// [`ScalarKey`]); values are scalar [`Value`]s in their canonical byte
/// encoding.
pub struct Db {
    /// The backing datastore; `None` after cleanup.
    ds: Option<Datastore>,
    /// Datastore name, kept for logging after cleanup.
    name: String,
}

impl Db {
    /// Opens (or creates, per `flags`) the datastore `name` inside the
    /// volume addressed by `url`.
    ///
    /// # Errors
    ///
    /// Propagates volume-open failures; see [`Datastore::open`].
    pub fn open(url: &str, name: &str, flags: OpenFlags) -> Result<Self> {
        let ds = Datastore::open(url, name, flags)?;
        Ok(Self {
            ds: Some(ds),
            name: name.to_string(),
        })
    }

    /// Returns the live datastore or fails if the handle was cleaned up.
    fn datastore(&self) -> Result<&Datastore> {
        self.ds.as_ref().ok_or(ArgonError::StoreClosed)
    }

    fn datastore_mut(&mut self) -> Result<&mut Datastore> {
        self.ds.as_mut().ok_or(ArgonError::StoreClosed)
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set(&mut self, key: impl Into<ScalarKey>, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.datastore_mut()?.put(key.into(), value.encode())
    }

    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `ArgonError::KeyNotFound` if the key is absent. Use
    /// [`Db::get_or`] to suppress the failure with a default.
    pub fn get(&self, key: impl Into<ScalarKey>) -> Result<Value> {
        let key = key.into();
        match self.datastore()?.get(&key) {
            Some(bytes) => Value::decode(bytes),
            None => Err(ArgonError::KeyNotFound(key.to_string())),
        }
    }

    /// Returns the value stored under `key`, or `default` if absent.
    pub fn get_or(&self, key: impl Into<ScalarKey>, default: impl Into<Value>) -> Result<Value> {
        let key = key.into();
        match self.datastore()?.get(&key) {
            Some(bytes) => Value::decode(bytes),
            None => Ok(default.into()),
        }
    }

    /// Returns true if `key` has a value.
    pub fn contains(&self, key: impl Into<ScalarKey>) -> Result<bool> {
        Ok(self.datastore()?.contains(&key.into()))
    }

    /// Removes `key` and returns its value.
    ///
    /// # Errors
    ///
    /// Returns `ArgonError::KeyNotFound` if the key is absent.
    pub fn pop(&mut self, key: impl Into<ScalarKey>) -> Result<Value> {
        let key = key.into();
        let value = self.get(key.clone())?;
        self.datastore_mut()?.delete(&key)?;
        Ok(value)
    }

    /// Removes `key`.
    ///
    /// # Errors
    ///
    /// Returns `ArgonError::KeyNotFound` if the key is absent.
    pub fn delete(&mut self, key: impl Into<ScalarKey>) -> Result<()> {
        let key = key.into();
        if !self.datastore_mut()?.delete(&key)? {
            return Err(ArgonError::KeyNotFound(key.to_string()));
        }
        Ok(())
    }

    /// Returns all keys in ascending order, integers before strings.
    pub fn keys(&self) -> Result<Vec<ScalarKey>> {
        Ok(self.datastore()?.keys())
    }

    /// Returns the number of stored keys.
    pub fn len(&self) -> Result<usize> {
        Ok(self.datastore()?.len())
    }

    /// Returns true if the store holds no keys.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.datastore()?.is_empty())
    }

    /// Destroys the backing datastore and releases the handle.
    ///
    /// Idempotent: calling `cleanup` on an already-cleaned handle is a
    /// no-op `Ok`. Any other operation after cleanup fails with
    /// `ArgonError::StoreClosed`.
    pub fn cleanup(&mut self) -> Result<()> {
        if let Some(ds) = self.ds.take() {
            ds.destroy()?;
            debug!("Cleaned up datastore {}", self.name);
        }
        Ok(())
    }
}
