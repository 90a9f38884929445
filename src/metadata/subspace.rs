use crate::context::RequestContext;
use crate::error::DockvError;
use crate::keys::{Key, prefix_successor};
use crate::kv::envelope::TableData;
use crate::kv::{KeyValue, Tx};
use crate::metadata::KEY_DROPPED_END;
use crate::value::FieldValue;
use serde::Serialize;

/// Generic versioned CRUD over `(subspace, key_version, …coords…, kind,
/// name, terminator)`-shaped keys. Specializations own key construction and
/// argument validation and pass the validation result through, so every
/// operation rejects bad arguments before touching the transaction.
#[derive(Debug, Clone)]
pub struct MetadataSubspace {
    pub subspace_name: Vec<u8>,
    pub key_version: Vec<u8>,
}

impl MetadataSubspace {
    pub fn insert_metadata<T: Serialize>(
        &self,
        ctx: &RequestContext,
        tx: &dyn Tx,
        validation: Result<(), DockvError>,
        key: &Key,
        ver: i32,
        payload: &T,
    ) -> Result<(), DockvError> {
        validation?;
        let mut data = TableData::with_version(ver, encode_payload(payload)?);
        data.created_at = Some(now_millis());
        tx.insert(ctx, &self.subspace_name, key, &data)
    }

    pub fn get_payload(
        &self,
        ctx: &RequestContext,
        tx: &dyn Tx,
        validation: Result<(), DockvError>,
        key: &Key,
    ) -> Result<Option<TableData>, DockvError> {
        validation?;
        let mut it = tx.read(ctx, &self.subspace_name, key)?;
        let mut kv = KeyValue::default();
        if it.next(&mut kv) {
            return Ok(Some(kv.data));
        }
        if let Some(e) = it.err() {
            return Err(e.clone());
        }
        Ok(None)
    }

    pub fn update_metadata<T: Serialize>(
        &self,
        ctx: &RequestContext,
        tx: &dyn Tx,
        validation: Result<(), DockvError>,
        key: &Key,
        ver: i32,
        payload: &T,
    ) -> Result<(), DockvError> {
        validation?;
        let mut data = TableData::with_version(ver, encode_payload(payload)?);
        data.updated_at = Some(now_millis());
        tx.replace(ctx, &self.subspace_name, key, &data, true)
    }

    pub fn delete_metadata(
        &self,
        ctx: &RequestContext,
        tx: &dyn Tx,
        validation: Result<(), DockvError>,
        key: &Key,
    ) -> Result<(), DockvError> {
        validation?;
        tx.delete(ctx, &self.subspace_name, key)
    }

    /// Rewrites the record under its tombstone key, id preserved. An older
    /// tombstone for the same name is overwritten; only the latest dropped
    /// incarnation matters for the retrogression check.
    pub fn soft_delete_metadata(
        &self,
        ctx: &RequestContext,
        tx: &dyn Tx,
        validation: Result<(), DockvError>,
        old_key: &Key,
        new_key: &Key,
    ) -> Result<(), DockvError> {
        validation?;
        let data = self
            .get_payload(ctx, tx, Ok(()), old_key)?
            .ok_or_else(|| DockvError::NotFound(format!("metadata record: {old_key}")))?;
        tx.delete(ctx, &self.subspace_name, old_key)?;
        tx.replace(ctx, &self.subspace_name, new_key, &data, false)
    }

    /// Scans every record under `prefix`, active and tombstoned alike, and
    /// hands each to `visit` with its dropped-state and the name found at
    /// `name_pos` in the unpacked key.
    pub fn list_metadata(
        &self,
        ctx: &RequestContext,
        tx: &dyn Tx,
        prefix: &Key,
        name_pos: usize,
        visit: &mut dyn FnMut(bool, &str, TableData) -> Result<(), DockvError>,
    ) -> Result<(), DockvError> {
        let lo = prefix.serialize_to_bytes();
        let hi = prefix_successor(&lo)
            .ok_or_else(|| DockvError::Internal("metadata prefix has no successor".into()))?;

        let mut it = tx.read_range(ctx, &self.subspace_name, &lo, &hi, false)?;
        let mut kv = KeyValue::default();
        while it.next(&mut kv) {
            let key = Key::from_binary(&self.subspace_name, &kv.raw_key)?;
            let parts = key.parts();
            let Some(FieldValue::String(name)) = parts.get(name_pos) else {
                return Err(DockvError::Internal(format!(
                    "unexpected metadata key shape: {key}"
                )));
            };
            let dropped = parts.last() == Some(&FieldValue::Bytes(vec![KEY_DROPPED_END]));
            visit(dropped, name.as_str(), std::mem::take(&mut kv.data))?;
        }
        if let Some(e) = it.err() {
            return Err(e.clone());
        }
        Ok(())
    }
}

fn encode_payload<T: Serialize>(payload: &T) -> Result<Vec<u8>, DockvError> {
    serde_json::to_vec(payload).map_err(|e| DockvError::Encode(e.to_string()))
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
