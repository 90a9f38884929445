use crate::context::RequestContext;
use crate::error::DockvError;
use crate::keys::Key;
use crate::kv::Tx;
use crate::kv::envelope::TableData;
use crate::metadata::subspace::MetadataSubspace;
use crate::metadata::{
    ENCODING_SUBSPACE_NAME, INDEX_KIND, KEY_DROPPED_END, KEY_END, KEY_VERSION, bytes_to_u32,
    u32_to_bytes,
};
use crate::value::FieldValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Per-collection primary-index metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryIndexMetadata {
    pub id: u32,
    pub name: String,
}

const INDEX_META_VALUE_VERSION: i32 = 1;

/// Segments preceding the name in an unpacked primary-index metadata key:
/// `[key_version, ns, db, coll, kind]`.
const NAME_POS: usize = 5;

/// Stores metadata about primary key indexes under the encoding subspace,
/// keyed by `(ns, db, coll, kind, name)`.
#[derive(Debug, Clone)]
pub struct PrimaryIndexSubspace {
    sub: MetadataSubspace,
}

impl Default for PrimaryIndexSubspace {
    fn default() -> Self {
        Self::new()
    }
}

impl PrimaryIndexSubspace {
    pub fn new() -> Self {
        Self {
            sub: MetadataSubspace {
                subspace_name: ENCODING_SUBSPACE_NAME.to_vec(),
                key_version: vec![KEY_VERSION],
            },
        }
    }

    fn key(&self, ns_id: u32, db_id: u32, coll_id: u32, name: &str, terminator: u8) -> Key {
        let mut parts = vec![
            FieldValue::Bytes(self.sub.key_version.clone()),
            FieldValue::Bytes(u32_to_bytes(ns_id)),
            FieldValue::Bytes(u32_to_bytes(db_id)),
            FieldValue::Bytes(u32_to_bytes(coll_id)),
            FieldValue::Bytes(vec![INDEX_KIND]),
        ];
        if !name.is_empty() {
            parts.push(FieldValue::String(name.into()));
            parts.push(FieldValue::Bytes(vec![terminator]));
        }
        Key::new(self.sub.subspace_name.clone(), parts)
    }

    fn validate_args(
        &self,
        ns_id: u32,
        db_id: u32,
        coll_id: u32,
        name: &str,
    ) -> Result<(), DockvError> {
        if ns_id == 0 || db_id == 0 || coll_id == 0 {
            return Err(DockvError::InvalidArgument("invalid id".into()));
        }
        if name.is_empty() {
            return Err(DockvError::InvalidArgument("empty index name".into()));
        }
        Ok(())
    }

    fn decode_metadata(name: &str, payload: &TableData) -> Result<PrimaryIndexMetadata, DockvError> {
        if payload.ver == 0 {
            return Ok(PrimaryIndexMetadata {
                id: bytes_to_u32(&payload.raw_data)?,
                name: name.to_string(),
            });
        }

        serde_json::from_slice(&payload.raw_data)
            .map_err(|_| DockvError::Internal("failed to unmarshal index metadata".into()))
    }

    pub fn insert(
        &self,
        ctx: &RequestContext,
        tx: &dyn Tx,
        ns_id: u32,
        db_id: u32,
        coll_id: u32,
        name: &str,
        metadata: &PrimaryIndexMetadata,
    ) -> Result<(), DockvError> {
        self.sub.insert_metadata(
            ctx,
            tx,
            self.validate_args(ns_id, db_id, coll_id, name),
            &self.key(ns_id, db_id, coll_id, name, KEY_END),
            INDEX_META_VALUE_VERSION,
            metadata,
        )
    }

    pub fn get(
        &self,
        ctx: &RequestContext,
        tx: &dyn Tx,
        ns_id: u32,
        db_id: u32,
        coll_id: u32,
        name: &str,
    ) -> Result<PrimaryIndexMetadata, DockvError> {
        let payload = self.sub.get_payload(
            ctx,
            tx,
            self.validate_args(ns_id, db_id, coll_id, name),
            &self.key(ns_id, db_id, coll_id, name, KEY_END),
        )?;

        match payload {
            Some(payload) => Self::decode_metadata(name, &payload),
            None => Err(DockvError::NotFound(format!("index '{name}'"))),
        }
    }

    pub fn update(
        &self,
        ctx: &RequestContext,
        tx: &dyn Tx,
        ns_id: u32,
        db_id: u32,
        coll_id: u32,
        name: &str,
        metadata: &PrimaryIndexMetadata,
    ) -> Result<(), DockvError> {
        self.sub.update_metadata(
            ctx,
            tx,
            self.validate_args(ns_id, db_id, coll_id, name),
            &self.key(ns_id, db_id, coll_id, name, KEY_END),
            INDEX_META_VALUE_VERSION,
            metadata,
        )
    }

    pub fn delete(
        &self,
        ctx: &RequestContext,
        tx: &dyn Tx,
        ns_id: u32,
        db_id: u32,
        coll_id: u32,
        name: &str,
    ) -> Result<(), DockvError> {
        self.sub.delete_metadata(
            ctx,
            tx,
            self.validate_args(ns_id, db_id, coll_id, name),
            &self.key(ns_id, db_id, coll_id, name, KEY_END),
        )
    }

    pub fn soft_delete(
        &self,
        ctx: &RequestContext,
        tx: &dyn Tx,
        ns_id: u32,
        db_id: u32,
        coll_id: u32,
        name: &str,
    ) -> Result<(), DockvError> {
        self.sub.soft_delete_metadata(
            ctx,
            tx,
            self.validate_args(ns_id, db_id, coll_id, name),
            &self.key(ns_id, db_id, coll_id, name, KEY_END),
            &self.key(ns_id, db_id, coll_id, name, KEY_DROPPED_END),
        )
    }

    /// Lists active indexes of a collection. A name that is both tombstoned
    /// and active must have been recreated with a strictly larger id; any
    /// other history is impossible and refuses reads over the collection.
    pub fn list(
        &self,
        ctx: &RequestContext,
        tx: &dyn Tx,
        ns_id: u32,
        db_id: u32,
        coll_id: u32,
    ) -> Result<HashMap<String, PrimaryIndexMetadata>, DockvError> {
        let mut indexes: HashMap<String, PrimaryIndexMetadata> = HashMap::new();
        let mut dropped_indexes: HashMap<String, u32> = HashMap::new();

        self.sub.list_metadata(
            ctx,
            tx,
            &self.key(ns_id, db_id, coll_id, "", KEY_END),
            NAME_POS,
            &mut |dropped, name, data| {
                let metadata = Self::decode_metadata(name, &data)?;
                if dropped {
                    dropped_indexes.insert(name.to_string(), metadata.id);
                } else {
                    indexes.insert(name.to_string(), metadata);
                }
                Ok(())
            },
        )?;

        debug!(db = db_id, coll = coll_id, list = ?dropped_indexes, "dropped indexes");
        debug!(db = db_id, coll = coll_id, list = ?indexes, "created indexes");

        // retrogression check
        for (name, dropped_id) in &dropped_indexes {
            if let Some(created) = indexes.get(name) {
                if *dropped_id >= created.id {
                    return Err(DockvError::Internal(format!(
                        "retrogression found in indexes assigned value index [{name}] droppedValue [{dropped_id}] createdValue [{}]",
                        created.id
                    )));
                }
            }
        }

        Ok(indexes)
    }
}
