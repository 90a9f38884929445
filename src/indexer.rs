//! Write-side maintenance of secondary-index rows.
//!
//! Index rows live under the collection's encoded index table with the
//! layout `[keyword, kvs, field, type_order, literal, …primary key parts…]`
//! and an empty body; the trailing primary-key parts are what the read path
//! joins back to document rows.

use crate::context::RequestContext;
use crate::error::DockvError;
use crate::keys::Key;
use crate::kv::Tx;
use crate::kv::envelope::TableData;
use crate::schema::{Collection, QueryableField};
use crate::value::{FieldValue, type_order};
use serde_json::{Map, Value as JsonValue};

pub const INDEX_KEYWORD: &str = "idx";
pub const KVS_SEGMENT: &str = "kvs";

const INDEX_PREFIX_SEGMENTS: usize = 2; // [INDEX_KEYWORD, KVS_SEGMENT]
const FIELD_SEGMENTS: usize = 3; // [field_name, type_order, literal]

/// Offset of the first primary-key part in an unpacked index key, derived
/// from the layout above.
pub const PRIMARY_KEY_POS: usize = INDEX_PREFIX_SEGMENTS + FIELD_SEGMENTS;

/// Key parts addressing everything indexed under one field.
pub fn field_prefix_parts(field_name: &str) -> Vec<FieldValue> {
    vec![
        INDEX_KEYWORD.into(),
        KVS_SEGMENT.into(),
        field_name.into(),
    ]
}

/// Key parts addressing one indexed literal of one field.
pub fn field_value_parts(field: &QueryableField, value: &FieldValue) -> Vec<FieldValue> {
    let mut parts = field_prefix_parts(&field.name);
    parts.push(FieldValue::Int(type_order(field.field_type, value)));
    parts.push(value.clone());
    parts
}

pub struct SecondaryIndexer<'a> {
    coll: &'a Collection,
}

impl<'a> SecondaryIndexer<'a> {
    pub fn new(coll: &'a Collection) -> Self {
        Self { coll }
    }

    /// Writes one index row per active indexed field present in the
    /// document. Replace semantics keep re-indexing after an update
    /// idempotent.
    pub fn index_document(
        &self,
        ctx: &RequestContext,
        tx: &dyn Tx,
        document: &[u8],
        pk_parts: &[FieldValue],
    ) -> Result<(), DockvError> {
        for key in self.row_keys(document, pk_parts)? {
            tx.replace(
                ctx,
                &self.coll.encoded_index_name,
                &key,
                &TableData::new(Vec::new()),
                false,
            )?;
        }
        Ok(())
    }

    /// Removes the rows `index_document` wrote for this document version.
    pub fn remove_document(
        &self,
        ctx: &RequestContext,
        tx: &dyn Tx,
        document: &[u8],
        pk_parts: &[FieldValue],
    ) -> Result<(), DockvError> {
        for key in self.row_keys(document, pk_parts)? {
            tx.delete(ctx, &self.coll.encoded_index_name, &key)?;
        }
        Ok(())
    }

    fn row_keys(
        &self,
        document: &[u8],
        pk_parts: &[FieldValue],
    ) -> Result<Vec<Key>, DockvError> {
        let doc: Map<String, JsonValue> = serde_json::from_slice(document)
            .map_err(|e| DockvError::InvalidArgument(format!("malformed document: {e}")))?;

        let mut keys = Vec::new();
        for field in self.coll.active_indexed_fields() {
            if !field.field_type.indexable() {
                continue;
            }
            let Some(json_val) = doc.get(&field.name) else {
                continue;
            };
            let value = FieldValue::from_json(field.field_type, json_val)?;
            if value == FieldValue::Null {
                continue;
            }
            let mut parts = field_value_parts(field, &value);
            parts.extend(pk_parts.iter().cloned());
            keys.push(Key::new(self.coll.encoded_index_name.clone(), parts));
        }
        Ok(keys)
    }
}
