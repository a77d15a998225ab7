//! File-backed key-value substrate.
//!
//! This module provides the durable associative store both public access
//! models are built on. A *volume* is a directory; each *datastore* inside
//! it is a single append-only log file with the `.argon` extension.
//!
//! # Log format
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Header (14 bytes)                          │
//! │  - Magic: "ARGN" (4 bytes)                  │
//! │  - Version: u16 (2 bytes) = 1               │
//! │  - Created At: i64 (8 bytes)                │
//! ├─────────────────────────────────────────────┤
//! │  Entries (repeated)                         │
//! │  - Length: u32                              │
//! │  - CRC32:  u32 (over the payload)           │
//! │  - Payload: op u8, key, [value]             │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Every `put`/`delete` appends one entry and fsyncs, so a single put is
//! the durability and atomicity boundary. On open the log is replayed
//! into an in-memory map; a torn tail entry (partial last write after a
//! crash) is discarded with a warning. When dead entries dominate, the
//! live state is rewritten to a temp file and swapped in atomically.

use crate::error::{ArgonError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Datastore log magic bytes.
const LOG_MAGIC: [u8; 4] = *b"ARGN";

/// Current datastore log format version.
const LOG_VERSION: u16 = 1;

/// Header size in bytes.
const HEADER_SIZE: u64 = 14;

/// Datastore file extension.
const DATASTORE_EXTENSION: &str = "argon";

/// URL scheme for volume addressing.
const URL_SCHEME: &str = "argon://";

/// Entry op byte: put.
const OP_PUT: u8 = 1;
/// Entry op byte: delete.
const OP_DELETE: u8 = 2;

/// Minimum log size before compaction is considered (64 KB).
const COMPACT_MIN_BYTES: u64 = 64 * 1024;

/// Flags controlling volume and datastore creation on open.
///
/// Mirrors the open semantics of the embedding API: `CREATE` creates a
/// missing datastore, `CREATE_VOLUME` creates a missing backing volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags(u8);

impl OpenFlags {
    /// Create the datastore if absent.
    pub const CREATE: OpenFlags = OpenFlags(0b01);
    /// Create the backing volume directory if absent.
    pub const CREATE_VOLUME: OpenFlags = OpenFlags(0b10);

    /// Creates flags with no bits set.
    pub fn new() -> Self {
        Self(0)
    }

    /// Returns true if the `CREATE` flag is set.
    pub fn create(self) -> bool {
        self.0 & Self::CREATE.0 != 0
    }

    /// Returns true if the `CREATE_VOLUME` flag is set.
    pub fn create_volume(self) -> bool {
        self.0 & Self::CREATE_VOLUME.0 != 0
    }
}

impl std::ops::BitOr for OpenFlags {
    type Output = OpenFlags;

    fn bitor(self, rhs: OpenFlags) -> OpenFlags {
        OpenFlags(self.0 | rhs.0)
    }
}

/// A scalar key in the flat key space.
///
/// The derived ordering sorts all integer keys before all string keys,
/// integers numerically and strings lexicographically within their group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScalarKey {
    /// Integer key.
    Int(i64),
    /// String key.
    Str(String),
}

/// Key type byte: integer.
const KEY_INT: u8 = 1;
/// Key type byte: string.
const KEY_STR: u8 = 2;

impl ScalarKey {
    /// Serializes the key to bytes (type byte + payload).
    pub fn encode(&self) -> Vec<u8> {
        match self {
            ScalarKey::Int(v) => {
                let mut buf = Vec::with_capacity(9);
                buf.push(KEY_INT);
                buf.extend_from_slice(&v.to_le_bytes());
                buf
            }
            ScalarKey::Str(s) => {
                let mut buf = Vec::with_capacity(1 + s.len());
                buf.push(KEY_STR);
                buf.extend_from_slice(s.as_bytes());
                buf
            }
        }
    }

    /// Deserializes a key from bytes.
    ///
    /// # Errors
    ///
    /// Returns `UnknownValueType` on an unrecognized type byte and
    /// `TruncatedRecord` on a short buffer.
    pub fn decode(bytes: &[u8]) -> Result<ScalarKey> {
        let (&tag, payload) = bytes.split_first().ok_or(ArgonError::TruncatedRecord {
            expected: 1,
            actual: 0,
        })?;
        match tag {
            KEY_INT => {
                let raw: [u8; 8] =
                    payload
                        .try_into()
                        .map_err(|_| ArgonError::TruncatedRecord {
                            expected: 8,
                            actual: payload.len(),
                        })?;
                Ok(ScalarKey::Int(i64::from_le_bytes(raw)))
            }
            KEY_STR => Ok(ScalarKey::Str(
                String::from_utf8(payload.to_vec())
                    .map_err(|e| ArgonError::CorruptBucket(e.to_string()))?,
            )),
            other => Err(ArgonError::UnknownValueType(other)),
        }
    }
}

impl fmt::Display for ScalarKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarKey::Int(v) => write!(f, "{v}"),
            ScalarKey::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for ScalarKey {
    fn from(v: i64) -> Self {
        ScalarKey::Int(v)
    }
}

impl From<&str> for ScalarKey {
    fn from(v: &str) -> Self {
        ScalarKey::Str(v.to_string())
    }
}

impl From<String> for ScalarKey {
    fn from(v: String) -> Self {
        ScalarKey::Str(v)
    }
}

/// Parses a volume URL into the volume directory path.
///
/// Accepts `argon://<path>` or a bare filesystem path. Any other scheme
/// is rejected.
pub fn parse_volume_url(url: &str) -> Result<PathBuf> {
    if let Some(path) = url.strip_prefix(URL_SCHEME) {
        if path.is_empty() {
            return Err(ArgonError::InvalidUrl(url.to_string()));
        }
        return Ok(PathBuf::from(path));
    }
    if url.contains("://") {
        return Err(ArgonError::InvalidUrl(url.to_string()));
    }
    if url.is_empty() {
        return Err(ArgonError::InvalidUrl(url.to_string()));
    }
    Ok(PathBuf::from(url))
}

/// Datastore log header.
#[derive(Debug, Clone)]
struct LogHeader {
    magic: [u8; 4],
    version: u16,
    created_at: i64,
}

impl LogHeader {
    fn new() -> Self {
        Self {
            magic: LOG_MAGIC,
            version: LOG_VERSION,
            created_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos() as i64)
                .unwrap_or(0),
        }
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.magic)?;
        writer.write_all(&self.version.to_le_bytes())?;
        writer.write_all(&self.created_at.to_le_bytes())?;
        Ok(())
    }

    fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != LOG_MAGIC {
            return Err(ArgonError::InvalidMagic(magic));
        }

        let mut buf = [0u8; 2];
        reader.read_exact(&mut buf)?;
        let version = u16::from_le_bytes(buf);
        if version != LOG_VERSION {
            return Err(ArgonError::UnsupportedVersion(version));
        }

        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf)?;
        let created_at = i64::from_le_bytes(buf);

        Ok(Self {
            magic,
            version,
            created_at,
        })
    }
}

/// A mutation entry in the datastore log.
enum LogEntry {
    Put(ScalarKey, Vec<u8>),
    Delete(ScalarKey),
}

impl LogEntry {
    /// Serializes the entry payload (op byte, key, optional value).
    fn to_payload(&self) -> Vec<u8> {
        match self {
            LogEntry::Put(key, value) => {
                let key_bytes = key.encode();
                let mut buf =
                    Vec::with_capacity(1 + 4 + key_bytes.len() + 4 + value.len());
                buf.push(OP_PUT);
                buf.extend_from_slice(&(key_bytes.len() as u32).to_le_bytes());
                buf.extend_from_slice(&key_bytes);
                buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
                buf.extend_from_slice(value);
                buf
            }
            LogEntry::Delete(key) => {
                let key_bytes = key.encode();
                let mut buf = Vec::with_capacity(1 + 4 + key_bytes.len());
                buf.push(OP_DELETE);
                buf.extend_from_slice(&(key_bytes.len() as u32).to_le_bytes());
                buf.extend_from_slice(&key_bytes);
                buf
            }
        }
    }

    /// Deserializes an entry from its payload bytes.
    fn from_payload(payload: &[u8]) -> Result<LogEntry> {
        let read_chunk = |bytes: &[u8], at: usize| -> Result<(Vec<u8>, usize)> {
            let len_end = at + 4;
            if bytes.len() < len_end {
                return Err(ArgonError::TruncatedRecord {
                    expected: len_end,
                    actual: bytes.len(),
                });
            }
            let len = u32::from_le_bytes(bytes[at..len_end].try_into().unwrap()) as usize;
            let end = len_end + len;
            if bytes.len() < end {
                return Err(ArgonError::TruncatedRecord {
                    expected: end,
                    actual: bytes.len(),
                });
            }
            Ok((bytes[len_end..end].to_vec(), end))
        };

        let op = *payload.first().ok_or(ArgonError::TruncatedRecord {
            expected: 1,
            actual: 0,
        })?;

        match op {
            OP_PUT => {
                let (key_bytes, next) = read_chunk(payload, 1)?;
                let (value, _) = read_chunk(payload, next)?;
                Ok(LogEntry::Put(ScalarKey::decode(&key_bytes)?, value))
            }
            OP_DELETE => {
                let (key_bytes, _) = read_chunk(payload, 1)?;
                Ok(LogEntry::Delete(ScalarKey::decode(&key_bytes)?))
            }
            other => Err(ArgonError::UnknownValueType(other)),
        }
    }
}

/// A durable flat key-value datastore backed by one log file.
///
/// Provides `put`/`get`/`delete` of byte blobs under [`ScalarKey`]s with
/// read-your-writes semantics. All state is replayed into memory on open;
/// the log is the single source of durability.
pub struct Datastore {
    /// Path to the log file.
    path: PathBuf,
    /// Append handle to the log file.
    writer: BufWriter<File>,
    /// Live state, replayed from the log.
    entries: BTreeMap<ScalarKey, Vec<u8>>,
    /// Payload bytes of live entries.
    live_bytes: u64,
    /// Payload bytes appended since the header (live + dead).
    total_bytes: u64,
}

impl Datastore {
    /// Opens a datastore named `name` inside the volume addressed by `url`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidUrl` if the URL cannot be parsed, `VolumeMissing`
    /// if the volume directory is absent without `CREATE_VOLUME`,
    /// `DatastoreMissing` if the datastore file is absent without
    /// `CREATE`, and any replay error for an existing log.
    pub fn open(url: &str, name: &str, flags: OpenFlags) -> Result<Self> {
        let volume_dir = parse_volume_url(url)?;

        if !volume_dir.is_dir() {
            if !flags.create_volume() {
                return Err(ArgonError::VolumeMissing(volume_dir));
            }
            fs::create_dir_all(&volume_dir)?;
        }

        let path = volume_dir.join(format!("{name}.{DATASTORE_EXTENSION}"));

        if !path.is_file() {
            if !flags.create() {
                return Err(ArgonError::DatastoreMissing(name.to_string()));
            }
            let file = OpenOptions::new().create_new(true).write(true).open(&path)?;
            let mut writer = BufWriter::new(file);
            LogHeader::new().write_to(&mut writer)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;

            return Ok(Self {
                path,
                writer,
                entries: BTreeMap::new(),
                live_bytes: 0,
                total_bytes: 0,
            });
        }

        let (entries, live_bytes, total_bytes, good_len) = Self::replay(&path)?;

        let mut file = OpenOptions::new().write(true).open(&path)?;
        // Discard any torn tail so fresh appends follow the last good entry.
        if file.metadata()?.len() != good_len {
            file.set_len(good_len)?;
        }
        file.seek(SeekFrom::End(0))?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            entries,
            live_bytes,
            total_bytes,
        })
    }

    /// Replays the log file into a live map.
    ///
    /// Returns the map, live/total payload byte counts, and the offset of
    /// the end of the last complete entry.
    fn replay(path: &Path) -> Result<(BTreeMap<ScalarKey, Vec<u8>>, u64, u64, u64)> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let _header = LogHeader::read_from(&mut reader)?;

        let mut entries: BTreeMap<ScalarKey, Vec<u8>> = BTreeMap::new();
        let mut live_bytes = 0u64;
        let mut total_bytes = 0u64;
        let mut good_len = HEADER_SIZE;

        loop {
            match Self::read_entry(&mut reader)? {
                ReadOutcome::Entry(payload_len, entry) => {
                    total_bytes += payload_len;
                    good_len += 8 + payload_len;
                    match entry {
                        LogEntry::Put(key, value) => {
                            let len = value.len() as u64;
                            if let Some(old) = entries.insert(key, value) {
                                live_bytes -= old.len() as u64;
                            }
                            live_bytes += len;
                        }
                        LogEntry::Delete(key) => {
                            if let Some(old) = entries.remove(&key) {
                                live_bytes -= old.len() as u64;
                            }
                        }
                    }
                }
                ReadOutcome::Eof => break,
                ReadOutcome::TornTail => {
                    warn!(
                        "Discarding torn tail entry in {} at offset {}",
                        path.display(),
                        good_len
                    );
                    break;
                }
            }
        }

        debug!(
            "Replayed {}: {} live keys, {} live bytes, {} total bytes",
            path.display(),
            entries.len(),
            live_bytes,
            total_bytes
        );

        Ok((entries, live_bytes, total_bytes, good_len))
    }

    /// Reads a single log entry.
    fn read_entry<R: Read>(reader: &mut R) -> Result<ReadOutcome> {
        let mut len_buf = [0u8; 4];
        match reader.read_exact(&mut len_buf) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(ReadOutcome::Eof)
            }
            Err(e) => return Err(e.into()),
        }
        let len = u32::from_le_bytes(len_buf) as usize;

        let mut crc_buf = [0u8; 4];
        if reader.read_exact(&mut crc_buf).is_err() {
            return Ok(ReadOutcome::TornTail);
        }
        let expected_crc = u32::from_le_bytes(crc_buf);

        let mut payload = vec![0u8; len];
        if reader.read_exact(&mut payload).is_err() {
            return Ok(ReadOutcome::TornTail);
        }

        let actual_crc = crc32fast::hash(&payload);
        if actual_crc != expected_crc {
            return Err(ArgonError::ChecksumMismatch {
                expected: expected_crc,
                actual: actual_crc,
            });
        }

        let entry = LogEntry::from_payload(&payload)?;
        Ok(ReadOutcome::Entry(len as u64, entry))
    }

    /// Appends an entry to the log and fsyncs.
    fn append(&mut self, entry: &LogEntry) -> Result<u64> {
        let payload = entry.to_payload();
        let crc = crc32fast::hash(&payload);

        self.writer
            .write_all(&(payload.len() as u32).to_le_bytes())?;
        self.writer.write_all(&crc.to_le_bytes())?;
        self.writer.write_all(&payload)?;
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;

        let len = payload.len() as u64;
        self.total_bytes += len;
        Ok(len)
    }

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// The entry is durable when this returns: the log append is flushed
    /// and fsynced before the in-memory state is updated.
    pub fn put(&mut self, key: ScalarKey, value: Vec<u8>) -> Result<()> {
        self.append(&LogEntry::Put(key.clone(), value.clone()))?;

        let len = value.len() as u64;
        if let Some(old) = self.entries.insert(key, value) {
            self.live_bytes -= old.len() as u64;
        }
        self.live_bytes += len;

        self.maybe_compact()
    }

    /// Returns the value stored under `key`, if any.
    pub fn get(&self, key: &ScalarKey) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Returns true if `key` has a value.
    pub fn contains(&self, key: &ScalarKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Removes `key`, returning true if it was present.
    ///
    /// Removing an absent key appends nothing and is a no-op.
    pub fn delete(&mut self, key: &ScalarKey) -> Result<bool> {
        if !self.entries.contains_key(key) {
            return Ok(false);
        }

        self.append(&LogEntry::Delete(key.clone()))?;
        if let Some(old) = self.entries.remove(key) {
            self.live_bytes -= old.len() as u64;
        }

        self.maybe_compact()?;
        Ok(true)
    }

    /// Returns all keys in ascending order (integers before strings).
    pub fn keys(&self) -> Vec<ScalarKey> {
        self.entries.keys().cloned().collect()
    }

    /// Returns the number of live keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the datastore holds no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compacts the log when dead entries dominate a non-trivial file.
    fn maybe_compact(&mut self) -> Result<()> {
        if self.total_bytes >= COMPACT_MIN_BYTES && self.live_bytes * 2 < self.total_bytes {
            self.compact()?;
        }
        Ok(())
    }

    /// Rewrites the log to contain only live entries.
    ///
    /// Uses the atomic write pattern: write to a temp file, fsync it,
    /// fsync the directory, rename over the log, fsync the directory
    /// again. A crash at any point leaves either the old or the new log
    /// intact.
    pub fn compact(&mut self) -> Result<()> {
        let tmp_path = self.path.with_extension(format!("{DATASTORE_EXTENSION}.tmp"));

        let mut live_bytes = 0u64;
        {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            LogHeader::new().write_to(&mut writer)?;

            for (key, value) in &self.entries {
                let payload = LogEntry::Put(key.clone(), value.clone()).to_payload();
                let crc = crc32fast::hash(&payload);
                writer.write_all(&(payload.len() as u32).to_le_bytes())?;
                writer.write_all(&crc.to_le_bytes())?;
                writer.write_all(&payload)?;
                live_bytes += payload.len() as u64;
            }

            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        if let Some(dir) = self.path.parent() {
            File::open(dir)?.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        if let Some(dir) = self.path.parent() {
            File::open(dir)?.sync_all()?;
        }

        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        file.seek(SeekFrom::End(0))?;
        self.writer = BufWriter::new(file);

        debug!(
            "Compacted {}: {} -> {} payload bytes",
            self.path.display(),
            self.total_bytes,
            live_bytes
        );
        self.total_bytes = live_bytes;
        self.live_bytes = self.entries.values().map(|v| v.len() as u64).sum();

        Ok(())
    }

    /// Removes the datastore's backing file, consuming the handle.
    pub fn destroy(self) -> Result<()> {
        let path = self.path.clone();
        drop(self);
        fs::remove_file(&path)?;
        debug!("Destroyed datastore {}", path.display());
        Ok(())
    }
}

/// Outcome of reading one log entry during replay.
enum ReadOutcome {
    /// A complete, checksummed entry (payload length, decoded entry).
    Entry(u64, LogEntry),
    /// Clean end of log.
    Eof,
    /// Partial last entry, written mid-crash.
    TornTail,
}
