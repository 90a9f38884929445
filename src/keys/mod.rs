pub mod tuple;

use crate::error::DockvError;
use crate::value::FieldValue;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;

/// Packed keys are usually short; keep them inline.
pub type KeyBuf = SmallVec<[u8; 64]>;

/// An encoded key: a table subspace prefix plus the ordered index parts
/// appended to it. The table groups related data; the parts identify one
/// row (or row prefix) within it. Value-typed and never mutated after
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    table: Vec<u8>,
    parts: Vec<FieldValue>,
}

impl Key {
    pub fn new(table: impl Into<Vec<u8>>, parts: Vec<FieldValue>) -> Self {
        Self {
            table: table.into(),
            parts,
        }
    }

    pub fn table(&self) -> &[u8] {
        &self.table
    }

    pub fn parts(&self) -> &[FieldValue] {
        &self.parts
    }

    /// Serialized form: the table prefix verbatim followed by the tuple-packed
    /// parts. A key with no parts serializes to the table bytes unchanged.
    /// This follows the persisted ordering, so comparing serialized keys is
    /// comparing rows.
    pub fn serialize_to_bytes(&self) -> Vec<u8> {
        if self.parts.is_empty() {
            return self.table.clone();
        }

        let mut out = KeyBuf::new();
        out.extend_from_slice(&self.table);
        tuple::pack_into(&self.parts, &mut out);
        out.to_vec()
    }

    /// Compares the serialized form against raw stored bytes. `nil` is
    /// equivalent to an empty slice.
    pub fn compare_bytes(&self, other: &[u8]) -> Ordering {
        self.serialize_to_bytes().as_slice().cmp(other)
    }

    /// Decodes a stored key back into parts. The `table` prefix must match
    /// exactly.
    pub fn from_binary(table: &[u8], packed: &[u8]) -> Result<Key, DockvError> {
        let tail = packed.strip_prefix(table).ok_or_else(|| {
            DockvError::Decode(format!(
                "key does not start with table prefix {:?}",
                String::from_utf8_lossy(table)
            ))
        })?;

        Ok(Key {
            table: table.to_vec(),
            parts: tuple::unpack(tail)?,
        })
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table:{}, parts:[", String::from_utf8_lossy(&self.table))?;
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{part}")?;
        }
        write!(f, "]")
    }
}

/// First byte string strictly greater than every key with `prefix`: strips
/// trailing `0xFF` bytes and increments the last remaining one. `None` when
/// the prefix is all `0xFF`.
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut next = prefix.to_vec();
    for i in (0..next.len()).rev() {
        if next[i] != 0xFF {
            next[i] += 1;
            next.truncate(i + 1);
            return Some(next);
        }
    }
    None
}
