//! Record type and canonical byte codec.
//!
//! A [`Record`] is an ordered mapping from small integer field tags to
//! scalar values. Records are the unit of storage for the time-series
//! layer: they are serialized to a canonical little-endian byte form on
//! insertion and decoded back on every scan.
//!
//! # Canonical form
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  Field Count: u32                            │
//! ├──────────────────────────────────────────────┤
//! │  Per field, ascending by tag:                │
//! │  - Tag: u32                                  │
//! │  - Type: u8 (Int=1, Float=2, Str=3, Bytes=4) │
//! │  - Payload: i64 / f64 / len:u32 + raw        │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Fields are held in a `BTreeMap`, so encoding is deterministic: two
//! records with identical tag-value mappings produce identical bytes no
//! matter the order the fields were set in.

use crate::error::{ArgonError, Result};
use std::collections::BTreeMap;

/// A record field tag (small non-negative integer).
pub type FieldTag = u32;

/// Type byte for an integer value.
const TYPE_INT: u8 = 1;
/// Type byte for a floating-point value.
const TYPE_FLOAT: u8 = 2;
/// Type byte for a string value.
const TYPE_STR: u8 = 3;
/// Type byte for a raw byte-blob value.
const TYPE_BYTES: u8 = 4;

/// A scalar value held by a record field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns true if `self` and `other` have the same type and value.
    ///
    /// Floats compare within `f64::EPSILON`; all other types compare
    /// exactly. A type mismatch is never a match, even when the numeric
    /// values coincide.
    pub fn matches(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => (a - b).abs() < f64::EPSILON,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            _ => false,
        }
    }

    /// Serializes the value to bytes (type byte + payload).
    ///
    /// This is the same per-field form used inside a serialized record;
    /// the generic key-value store uses it for standalone values.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16);
        self.encode_into(&mut buf);
        buf
    }

    /// Deserializes a standalone value from bytes.
    ///
    /// # Errors
    ///
    /// Returns `UnknownValueType` on an unrecognized type byte,
    /// `TruncatedRecord` on a short buffer, and `TrailingBytes` if bytes
    /// remain after the value.
    pub fn decode(bytes: &[u8]) -> Result<Value> {
        let mut cursor = Cursor::new(bytes);
        let value = Value::decode_from(&mut cursor)?;
        let remaining = cursor.remaining();
        if remaining != 0 {
            return Err(ArgonError::TrailingBytes(remaining));
        }
        Ok(value)
    }

    /// Reads one value (type byte + payload) from the cursor.
    fn decode_from(cursor: &mut Cursor<'_>) -> Result<Value> {
        match cursor.read_u8()? {
            TYPE_INT => Ok(Value::Int(i64::from_le_bytes(cursor.read_array()?))),
            TYPE_FLOAT => Ok(Value::Float(f64::from_le_bytes(cursor.read_array()?))),
            TYPE_STR => {
                let len = cursor.read_u32()? as usize;
                let raw = cursor.read_slice(len)?;
                Ok(Value::Str(
                    String::from_utf8(raw.to_vec())
                        .map_err(|e| ArgonError::CorruptBucket(e.to_string()))?,
                ))
            }
            TYPE_BYTES => {
                let len = cursor.read_u32()? as usize;
                Ok(Value::Bytes(cursor.read_slice(len)?.to_vec()))
            }
            other => Err(ArgonError::UnknownValueType(other)),
        }
    }

    /// Appends the type byte and payload to `buf`.
    fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Value::Int(v) => {
                buf.push(TYPE_INT);
                buf.extend_from_slice(&v.to_le_bytes());
            }
            Value::Float(v) => {
                buf.push(TYPE_FLOAT);
                buf.extend_from_slice(&v.to_le_bytes());
            }
            Value::Str(s) => {
                buf.push(TYPE_STR);
                buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
                buf.extend_from_slice(s.as_bytes());
            }
            Value::Bytes(b) => {
                buf.push(TYPE_BYTES);
                buf.extend_from_slice(&(b.len() as u32).to_le_bytes());
                buf.extend_from_slice(b);
            }
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

/// A filter mapping field tags to required values.
///
/// A record satisfies the criteria iff every (tag, value) pair is present
/// on the record with a matching type and value. Fields not named by the
/// criteria are ignored.
pub type Criteria = BTreeMap<FieldTag, Value>;

/// An ordered mapping from field tags to scalar values.
///
/// Tags are unique by construction; setting an existing tag replaces its
/// value. Iteration and encoding order is ascending by tag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: BTreeMap<FieldTag, Value>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets field `tag` to `value`, replacing any previous value.
    pub fn set(&mut self, tag: FieldTag, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(tag, value.into());
        self
    }

    /// Returns the value of field `tag`.
    ///
    /// # Errors
    ///
    /// Returns `ArgonError::FieldNotFound` if the tag is absent.
    pub fn get(&self, tag: FieldTag) -> Result<&Value> {
        self.fields.get(&tag).ok_or(ArgonError::FieldNotFound(tag))
    }

    /// Returns true if the record has a field with the given tag.
    pub fn contains(&self, tag: FieldTag) -> bool {
        self.fields.contains_key(&tag)
    }

    /// Returns the field tags in ascending order.
    pub fn tags(&self) -> impl Iterator<Item = FieldTag> + '_ {
        self.fields.keys().copied()
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns true if the record satisfies every (tag, value) pair in
    /// `criteria`.
    ///
    /// An absent tag or a type mismatch on any criterion means no match.
    /// Empty criteria match every record.
    pub fn matches(&self, criteria: &Criteria) -> bool {
        criteria.iter().all(|(tag, expected)| {
            self.fields
                .get(tag)
                .is_some_and(|actual| expected.matches(actual))
        })
    }

    /// Returns true if `self` and `other` are equal under the dual rule:
    /// identical field-tag sets AND identical canonical byte forms.
    ///
    /// The two comparisons are performed independently so a
    /// canonicalization bug in the codec cannot mask a field-set
    /// difference, or vice versa.
    pub fn canonical_eq(&self, other: &Record) -> bool {
        let same_tags = self.fields.len() == other.fields.len()
            && self.tags().eq(other.tags());
        let same_bytes = self.encode() == other.encode();
        same_tags && same_bytes
    }

    /// Serializes the record to its canonical byte form.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + self.fields.len() * 16);
        buf.extend_from_slice(&(self.fields.len() as u32).to_le_bytes());
        for (tag, value) in &self.fields {
            buf.extend_from_slice(&tag.to_le_bytes());
            value.encode_into(&mut buf);
        }
        buf
    }

    /// Decodes a record from its canonical byte form.
    ///
    /// # Errors
    ///
    /// Returns `TruncatedRecord` if the buffer ends before the declared
    /// content, `UnknownValueType` on an unrecognized type byte,
    /// `DuplicateField` if a tag appears twice, and `TrailingBytes` if
    /// the buffer extends past the declared content.
    pub fn decode(bytes: &[u8]) -> Result<Record> {
        let mut cursor = Cursor::new(bytes);
        let field_count = cursor.read_u32()?;

        let mut fields = BTreeMap::new();
        for _ in 0..field_count {
            let tag = cursor.read_u32()?;
            let value = Value::decode_from(&mut cursor)?;

            if fields.insert(tag, value).is_some() {
                return Err(ArgonError::DuplicateField(tag));
            }
        }

        let remaining = cursor.remaining();
        if remaining != 0 {
            return Err(ArgonError::TrailingBytes(remaining));
        }

        Ok(Record { fields })
    }
}

/// Bounds-checked reader over a byte slice.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(ArgonError::TruncatedRecord {
                expected: len,
                actual: self.remaining(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let slice = self.read_slice(N)?;
        // read_slice guarantees the length
        Ok(slice.try_into().unwrap())
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> Record {
        let mut r = Record::new();
        r.set(55, "AAPL").set(52, 1000i64).set(56, 100i64);
        r
    }

    #[test]
    fn test_set_and_get() {
        let r = sample_record();

        assert_eq!(r.len(), 3);
        assert_eq!(r.get(55).unwrap(), &Value::Str("AAPL".to_string()));
        assert_eq!(r.get(52).unwrap(), &Value::Int(1000));
        assert!(matches!(r.get(99), Err(ArgonError::FieldNotFound(99))));
    }

    #[test]
    fn test_tags_ascending() {
        let r = sample_record();
        let tags: Vec<_> = r.tags().collect();
        assert_eq!(tags, vec![52, 55, 56]);
    }

    #[test]
    fn test_encode_is_construction_order_independent() {
        let mut a = Record::new();
        a.set(55, "AAPL").set(52, 1000i64);

        let mut b = Record::new();
        b.set(52, 1000i64).set(55, "AAPL");

        assert_eq!(a.encode(), b.encode());
        assert!(a.canonical_eq(&b));
    }

    #[test]
    fn test_decode_roundtrip() {
        let r = sample_record();
        let decoded = Record::decode(&r.encode()).unwrap();
        assert!(decoded.canonical_eq(&r));
        assert_eq!(decoded, r);
    }

    #[test]
    fn test_decode_all_value_types() {
        let mut r = Record::new();
        r.set(1, -42i64)
            .set(2, 0.5f64)
            .set(3, "hello")
            .set(4, vec![0u8, 255, 7]);

        let decoded = Record::decode(&r.encode()).unwrap();
        assert_eq!(decoded, r);
    }

    #[test]
    fn test_decode_truncated() {
        let bytes = sample_record().encode();
        let result = Record::decode(&bytes[..bytes.len() - 1]);
        assert!(matches!(result, Err(ArgonError::TruncatedRecord { .. })));
    }

    #[test]
    fn test_decode_trailing_bytes() {
        let mut bytes = sample_record().encode();
        bytes.push(0);
        assert!(matches!(
            Record::decode(&bytes),
            Err(ArgonError::TrailingBytes(1))
        ));
    }

    #[test]
    fn test_decode_unknown_value_type() {
        // field_count=1, tag=7, bogus type byte
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&7u32.to_le_bytes());
        bytes.push(99);
        assert!(matches!(
            Record::decode(&bytes),
            Err(ArgonError::UnknownValueType(99))
        ));
    }

    #[test]
    fn test_decode_duplicate_field() {
        // field_count=2, both fields use tag 7
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&2u32.to_le_bytes());
        for _ in 0..2 {
            bytes.extend_from_slice(&7u32.to_le_bytes());
            bytes.push(TYPE_INT);
            bytes.extend_from_slice(&1i64.to_le_bytes());
        }
        assert!(matches!(
            Record::decode(&bytes),
            Err(ArgonError::DuplicateField(7))
        ));
    }

    #[test]
    fn test_matches_all_criteria_required() {
        let r = sample_record();

        let mut criteria = Criteria::new();
        criteria.insert(55, Value::from("AAPL"));
        assert!(r.matches(&criteria));

        criteria.insert(56, Value::Int(100));
        assert!(r.matches(&criteria));

        // one mismatching pair fails the whole match
        criteria.insert(56, Value::Int(101));
        assert!(!r.matches(&criteria));
    }

    #[test]
    fn test_matches_absent_field_is_no_match() {
        let r = sample_record();
        let mut criteria = Criteria::new();
        criteria.insert(99, Value::Int(1));
        assert!(!r.matches(&criteria));
    }

    #[test]
    fn test_matches_type_mismatch_is_no_match() {
        let r = sample_record();
        let mut criteria = Criteria::new();
        // field 52 holds Int(1000), not Float
        criteria.insert(52, Value::Float(1000.0));
        assert!(!r.matches(&criteria));
    }

    #[test]
    fn test_matches_empty_criteria_matches_everything() {
        assert!(sample_record().matches(&Criteria::new()));
        assert!(Record::new().matches(&Criteria::new()));
    }

    #[test]
    fn test_float_matching_within_epsilon() {
        let mut r = Record::new();
        r.set(1, 0.1f64 + 0.2f64);

        let mut criteria = Criteria::new();
        criteria.insert(1, Value::Float(0.3));
        // 0.1 + 0.2 != 0.3 exactly, but within epsilon
        assert!(r.matches(&criteria));
    }

    #[test]
    fn test_canonical_eq_detects_field_set_difference() {
        let mut a = Record::new();
        a.set(1, 1i64);
        let mut b = Record::new();
        b.set(2, 1i64);
        assert!(!a.canonical_eq(&b));
    }

    #[test]
    fn test_standalone_value_roundtrip() {
        for value in [
            Value::Int(-1),
            Value::Float(3.25),
            Value::from("abc"),
            Value::Bytes(vec![1, 2, 3]),
        ] {
            assert_eq!(Value::decode(&value.encode()).unwrap(), value);
        }

        let mut bytes = Value::Int(1).encode();
        bytes.push(0);
        assert!(matches!(
            Value::decode(&bytes),
            Err(ArgonError::TrailingBytes(1))
        ));
    }

    #[test]
    fn test_empty_record_roundtrip() {
        let r = Record::new();
        let decoded = Record::decode(&r.encode()).unwrap();
        assert!(decoded.is_empty());
    }
}
