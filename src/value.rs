use crate::error::DockvError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

/// String form of the all-zeroes UUID, the zero sentinel for UUID fields.
pub const NIL_UUID_STR: &str = "00000000-0000-0000-0000-000000000000";

/// RFC3339 rendering of the zero time, the zero sentinel for datetime fields.
pub const ZERO_TIME_STR: &str = "0001-01-01T00:00:00Z";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Unknown,
    Bool,
    Int32,
    Int64,
    Double,
    String,
    Bytes,
    Uuid,
    DateTime,
    Array,
}

impl FieldType {
    /// Whether values of this type can back a secondary-index plan.
    pub fn indexable(self) -> bool {
        !matches!(self, FieldType::Bytes | FieldType::Unknown | FieldType::Array)
    }
}

/// A typed scalar extracted from a document or filter literal.
///
/// UUID and datetime field values travel as their canonical string forms;
/// the dedicated `Uuid` variant exists for callers that build keys from
/// binary identifiers directly.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(CompactString),
    Bytes(Vec<u8>),
    Uuid(Uuid),
}

impl FieldValue {
    /// Parses a raw JSON value into the typed form declared by the schema.
    pub fn from_json(
        field_type: FieldType,
        value: &serde_json::Value,
    ) -> Result<FieldValue, DockvError> {
        if value.is_null() {
            return Ok(FieldValue::Null);
        }

        match field_type {
            FieldType::Bool => value
                .as_bool()
                .map(FieldValue::Bool)
                .ok_or_else(|| type_mismatch("bool", value)),
            FieldType::Int32 => {
                let v = value.as_i64().ok_or_else(|| type_mismatch("int32", value))?;
                i32::try_from(v)
                    .map(|v| FieldValue::Int(i64::from(v)))
                    .map_err(|_| {
                        DockvError::InvalidArgument(format!("value {v} out of range for int32"))
                    })
            }
            FieldType::Int64 => value
                .as_i64()
                .map(FieldValue::Int)
                .ok_or_else(|| type_mismatch("int64", value)),
            FieldType::Double => value
                .as_f64()
                .map(FieldValue::Double)
                .ok_or_else(|| type_mismatch("double", value)),
            FieldType::String => value
                .as_str()
                .map(|s| FieldValue::String(s.into()))
                .ok_or_else(|| type_mismatch("string", value)),
            FieldType::Uuid => {
                let s = value.as_str().ok_or_else(|| type_mismatch("uuid", value))?;
                Uuid::parse_str(s)
                    .map_err(|e| DockvError::InvalidArgument(format!("invalid uuid '{s}': {e}")))?;
                Ok(FieldValue::String(s.into()))
            }
            FieldType::DateTime => {
                let s = value
                    .as_str()
                    .ok_or_else(|| type_mismatch("datetime", value))?;
                chrono::DateTime::parse_from_rfc3339(s).map_err(|e| {
                    DockvError::InvalidArgument(format!("invalid datetime '{s}': {e}"))
                })?;
                Ok(FieldValue::String(s.into()))
            }
            FieldType::Bytes => {
                let s = value.as_str().ok_or_else(|| type_mismatch("bytes", value))?;
                BASE64
                    .decode(s)
                    .map(FieldValue::Bytes)
                    .map_err(|e| DockvError::InvalidArgument(format!("invalid base64 bytes: {e}")))
            }
            FieldType::Unknown | FieldType::Array => Err(DockvError::InvalidArgument(format!(
                "field type {field_type:?} cannot be used as a key value"
            ))),
        }
    }

    /// Whether a raw JSON value is the zero sentinel of its declared type.
    pub fn is_zero(field_type: FieldType, value: &serde_json::Value) -> bool {
        match field_type {
            FieldType::Int32 | FieldType::Int64 => value.as_i64() == Some(0),
            FieldType::Uuid => value.as_str() == Some(NIL_UUID_STR),
            FieldType::DateTime => value.as_str() == Some(ZERO_TIME_STR),
            FieldType::String | FieldType::Bytes => value.as_str().is_some_and(str::is_empty),
            _ => false,
        }
    }

    // Ranks mirror the tuple codec's type tags so semantic compare equals
    // byte compare on packed keys.
    fn kind_rank(&self) -> u8 {
        match self {
            FieldValue::Null => 0,
            FieldValue::Bytes(_) => 1,
            FieldValue::String(_) => 2,
            FieldValue::Int(_) => 3,
            FieldValue::Double(_) => 4,
            FieldValue::Bool(_) => 5,
            FieldValue::Uuid(_) => 6,
        }
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FieldValue {}

impl PartialOrd for FieldValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FieldValue {
    fn cmp(&self, other: &Self) -> Ordering {
        let rank_cmp = self.kind_rank().cmp(&other.kind_rank());
        if rank_cmp != Ordering::Equal {
            return rank_cmp;
        }

        match (self, other) {
            (FieldValue::Null, FieldValue::Null) => Ordering::Equal,
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a.cmp(b),
            (FieldValue::Int(a), FieldValue::Int(b)) => a.cmp(b),
            (FieldValue::Double(a), FieldValue::Double(b)) => a.total_cmp(b),
            (FieldValue::String(a), FieldValue::String(b)) => a.cmp(b),
            (FieldValue::Bytes(a), FieldValue::Bytes(b)) => a.cmp(b),
            (FieldValue::Uuid(a), FieldValue::Uuid(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "null"),
            FieldValue::Bool(v) => write!(f, "{v}"),
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Double(v) => write!(f, "{v}"),
            FieldValue::String(v) => write!(f, "{v}"),
            FieldValue::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            FieldValue::Uuid(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.into())
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(i64::from(v))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Double(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v.into())
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(v: Vec<u8>) -> Self {
        FieldValue::Bytes(v)
    }
}

impl From<&[u8]> for FieldValue {
    fn from(v: &[u8]) -> Self {
        FieldValue::Bytes(v.to_vec())
    }
}

impl From<Uuid> for FieldValue {
    fn from(v: Uuid) -> Self {
        FieldValue::Uuid(v)
    }
}

/// Small integer tag written before a literal in secondary-index keys so
/// heterogeneous-type ordering stays deterministic. All numeric types share
/// one tag, so cross-width comparisons on the same field order by value.
pub fn type_order(field_type: FieldType, value: &FieldValue) -> i64 {
    if matches!(value, FieldValue::Null) {
        return 1;
    }
    match field_type {
        FieldType::Bool => 2,
        FieldType::Int32 | FieldType::Int64 | FieldType::Double => 3,
        FieldType::String => 4,
        FieldType::Uuid => 5,
        FieldType::DateTime => 6,
        FieldType::Bytes | FieldType::Unknown | FieldType::Array => 7,
    }
}

fn type_mismatch(expected: &str, value: &serde_json::Value) -> DockvError {
    DockvError::InvalidArgument(format!("expected {expected}, got {value}"))
}
