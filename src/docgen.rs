use crate::config::{DockvConfig, Int64KeyStrategy};
use crate::context::RequestContext;
use crate::error::DockvError;
use crate::keys::Key;
use crate::kv::Tx;
use crate::metadata::key_generator::TableKeyGenerator;
use crate::schema::{Field, Index};
use crate::value::{FieldType, FieldValue};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

/// Seam between key generation and the key layout of the table being
/// written.
pub trait KeyEncoder {
    fn encode_key(
        &self,
        table: &[u8],
        index: &Index,
        parts: Vec<FieldValue>,
    ) -> Result<Key, DockvError>;
}

/// Primary document rows live directly under the collection table: the
/// encoded table name followed by the primary-key parts.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrimaryKeyEncoder;

impl KeyEncoder for PrimaryKeyEncoder {
    fn encode_key(
        &self,
        table: &[u8],
        _index: &Index,
        parts: Vec<FieldValue>,
    ) -> Result<Key, DockvError> {
        Ok(Key::new(table.to_vec(), parts))
    }
}

/// Extracts the primary-key components from a document and produces the
/// encoded key for the insert/replace path.
///
/// When an index field is auto-generated and the document is missing it (or
/// carries its type's zero sentinel), the generator fills it in and writes
/// the value back into a private copy of the document; the caller's input is
/// never mutated. Re-running on the mutated document regenerates nothing and
/// yields the same key.
pub struct KeyGenerator<'a> {
    generator: &'a TableKeyGenerator,
    document: Vec<u8>,
    keys_for_response: Map<String, JsonValue>,
    index: &'a Index,
    force_insert: bool,
    int64_strategy: Int64KeyStrategy,
    max_document_bytes: usize,
}

impl<'a> KeyGenerator<'a> {
    pub fn new(document: Vec<u8>, generator: &'a TableKeyGenerator, index: &'a Index) -> Self {
        let defaults = DockvConfig::default();
        Self {
            generator,
            document,
            keys_for_response: Map::new(),
            index,
            force_insert: false,
            int64_strategy: defaults.int64_key_strategy,
            max_document_bytes: defaults.max_document_bytes,
        }
    }

    pub fn with_config(mut self, config: &DockvConfig) -> Self {
        self.int64_strategy = config.int64_key_strategy;
        self.max_document_bytes = config.max_document_bytes;
        self
    }

    /// The document as it should be persisted, with any generated key fields
    /// filled in.
    pub fn document(&self) -> &[u8] {
        &self.document
    }

    /// Advisory hint: a generated component is prone to collide, so callers
    /// should prefer insert-over-replace semantics for this write.
    pub fn force_insert(&self) -> bool {
        self.force_insert
    }

    /// The key fields of this document as a JSON object, for the response
    /// payload.
    pub fn keys_for_response(&self) -> Result<Vec<u8>, DockvError> {
        serde_json::to_vec(&self.keys_for_response).map_err(|e| DockvError::Encode(e.to_string()))
    }

    pub fn generate(
        &mut self,
        ctx: &RequestContext,
        tx: &dyn Tx,
        encoder: &dyn KeyEncoder,
        table: &[u8],
    ) -> Result<Key, DockvError> {
        if self.document.len() > self.max_document_bytes {
            return Err(DockvError::InvalidArgument(format!(
                "document exceeds {} bytes",
                self.max_document_bytes
            )));
        }
        let mut doc: Map<String, JsonValue> = serde_json::from_slice(&self.document)
            .map_err(|e| DockvError::InvalidArgument(format!("malformed document: {e}")))?;

        let index = self.index;
        let mut index_parts = Vec::with_capacity(index.fields.len());
        let mut mutated = false;
        for field in &index.fields {
            let existing = doc.get(&field.name);
            let auto_generate = field.auto_generate
                && existing
                    .is_none_or(|v| v.is_null() || FieldValue::is_zero(field.field_type, v));

            let (json_val, value) = if auto_generate {
                let (json_val, value) = self.generated_value(ctx, tx, table, field)?;
                doc.insert(field.name.clone(), json_val.clone());
                mutated = true;
                (json_val, value)
            } else {
                let json_val = existing.ok_or_else(|| {
                    DockvError::InvalidArgument(format!(
                        "missing index key column(s) '{}'",
                        field.name
                    ))
                })?;
                if json_val.is_null() {
                    return Err(DockvError::InvalidArgument(format!(
                        "null value for index key column '{}'",
                        field.name
                    )));
                }
                let value = FieldValue::from_json(field.field_type, json_val)?;
                (json_val.clone(), value)
            };

            self.keys_for_response.insert(field.name.clone(), json_val);
            index_parts.push(value);
        }

        if mutated {
            self.document =
                serde_json::to_vec(&doc).map_err(|e| DockvError::Encode(e.to_string()))?;
        }

        encoder.encode_key(table, self.index, index_parts)
    }

    fn generated_value(
        &mut self,
        ctx: &RequestContext,
        tx: &dyn Tx,
        table: &[u8],
        field: &Field,
    ) -> Result<(JsonValue, FieldValue), DockvError> {
        match field.field_type {
            FieldType::String | FieldType::Uuid => {
                let s = Uuid::new_v4().to_string();
                Ok((JsonValue::String(s.clone()), FieldValue::String(s.into())))
            }
            FieldType::Bytes => {
                let raw = Uuid::new_v4().to_string().into_bytes();
                Ok((
                    JsonValue::String(BASE64.encode(&raw)),
                    FieldValue::Bytes(raw),
                ))
            }
            FieldType::DateTime => {
                // Nanosecond precision keeps contention low when concurrent
                // writers stamp the same wall-clock instant; collisions stay
                // possible, hence the insert hint.
                let s = Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true);
                self.force_insert = true;
                Ok((JsonValue::String(s.clone()), FieldValue::String(s.into())))
            }
            FieldType::Int64 => match self.int64_strategy {
                Int64KeyStrategy::WallClockNanos => {
                    let nanos = Utc::now().timestamp_nanos_opt().ok_or_else(|| {
                        DockvError::Internal("wall clock out of nanosecond range".into())
                    })?;
                    self.force_insert = true;
                    Ok((JsonValue::from(nanos), FieldValue::Int(nanos)))
                }
                Int64KeyStrategy::Counter => {
                    let v = i64::from(self.generator.generate_counter(ctx, tx, table)?);
                    Ok((JsonValue::from(v), FieldValue::Int(v)))
                }
            },
            FieldType::Int32 => {
                let v = self.generator.generate_counter(ctx, tx, table)?;
                Ok((JsonValue::from(v), FieldValue::Int(i64::from(v))))
            }
            _ => Err(DockvError::InvalidArgument(
                "unsupported type found in auto-generator".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{KeyGenerator, PrimaryKeyEncoder};
    use crate::context::RequestContext;
    use crate::error::DockvError;
    use crate::kv::Store;
    use crate::kv::mem::MemStore;
    use crate::metadata::key_generator::TableKeyGenerator;
    use crate::schema::{Field, Index};
    use crate::value::{FieldType, FieldValue};

    fn index(fields: Vec<Field>) -> Index {
        Index {
            name: "pkey".into(),
            fields,
        }
    }

    fn field(name: &str, field_type: FieldType, auto_generate: bool) -> Field {
        Field {
            name: name.into(),
            field_type,
            auto_generate,
        }
    }

    #[test]
    fn extracts_present_key_fields_in_index_order() {
        let store = MemStore::new();
        let ctx = RequestContext::new();
        let tx = store.begin_tx().expect("begin");
        let generator = TableKeyGenerator::new();
        let idx = index(vec![
            field("tenant", FieldType::String, false),
            field("id", FieldType::Int64, false),
        ]);

        let mut keygen = KeyGenerator::new(
            br#"{"id":7,"tenant":"acme","name":"x"}"#.to_vec(),
            &generator,
            &idx,
        );
        let key = keygen
            .generate(&ctx, tx.as_ref(), &PrimaryKeyEncoder, b"t_users")
            .expect("generate");

        assert_eq!(key.table(), b"t_users");
        assert_eq!(
            key.parts(),
            &[FieldValue::String("acme".into()), FieldValue::Int(7)]
        );
        assert!(!keygen.force_insert());
        let resp: serde_json::Value =
            serde_json::from_slice(&keygen.keys_for_response().expect("resp")).expect("json");
        assert_eq!(resp, serde_json::json!({"tenant":"acme","id":7}));
    }

    #[test]
    fn missing_field_without_auto_generate_is_invalid() {
        let store = MemStore::new();
        let ctx = RequestContext::new();
        let tx = store.begin_tx().expect("begin");
        let generator = TableKeyGenerator::new();
        let idx = index(vec![field("id", FieldType::Int64, false)]);

        let mut keygen = KeyGenerator::new(b"{}".to_vec(), &generator, &idx);
        let err = keygen
            .generate(&ctx, tx.as_ref(), &PrimaryKeyEncoder, b"t")
            .unwrap_err();
        assert!(matches!(err, DockvError::InvalidArgument(_)));
    }

    #[test]
    fn int32_auto_generate_draws_from_the_table_counter() {
        let store = MemStore::new();
        let ctx = RequestContext::new();
        let tx = store.begin_tx().expect("begin");
        let generator = TableKeyGenerator::new();
        let idx = index(vec![field("id", FieldType::Int32, true)]);

        let mut keygen = KeyGenerator::new(b"{}".to_vec(), &generator, &idx);
        let key = keygen
            .generate(&ctx, tx.as_ref(), &PrimaryKeyEncoder, b"t")
            .expect("generate");
        assert_eq!(key.parts(), &[FieldValue::Int(1)]);
        let doc: serde_json::Value = serde_json::from_slice(keygen.document()).expect("doc");
        assert_eq!(doc, serde_json::json!({"id": 1}));
        assert!(!keygen.force_insert());

        let mut again = KeyGenerator::new(b"{}".to_vec(), &generator, &idx);
        let key = again
            .generate(&ctx, tx.as_ref(), &PrimaryKeyEncoder, b"t")
            .expect("generate");
        assert_eq!(key.parts(), &[FieldValue::Int(2)]);
    }

    #[test]
    fn generation_is_idempotent_on_a_populated_document() {
        let store = MemStore::new();
        let ctx = RequestContext::new();
        let tx = store.begin_tx().expect("begin");
        let generator = TableKeyGenerator::new();
        let idx = index(vec![field("id", FieldType::Uuid, true)]);

        let mut first = KeyGenerator::new(b"{}".to_vec(), &generator, &idx);
        let key = first
            .generate(&ctx, tx.as_ref(), &PrimaryKeyEncoder, b"t")
            .expect("generate");
        let mutated = first.document().to_vec();

        let mut second = KeyGenerator::new(mutated.clone(), &generator, &idx);
        let rerun_key = second
            .generate(&ctx, tx.as_ref(), &PrimaryKeyEncoder, b"t")
            .expect("generate");
        assert_eq!(rerun_key, key);
        assert_eq!(second.document(), mutated.as_slice());
    }

    #[test]
    fn zero_sentinels_trigger_generation() {
        let store = MemStore::new();
        let ctx = RequestContext::new();
        let tx = store.begin_tx().expect("begin");
        let generator = TableKeyGenerator::new();
        let idx = index(vec![field("id", FieldType::Int32, true)]);

        for doc in [br#"{"id":0}"#.to_vec(), br#"{"id":null}"#.to_vec()] {
            let mut keygen = KeyGenerator::new(doc, &generator, &idx);
            keygen
                .generate(&ctx, tx.as_ref(), &PrimaryKeyEncoder, b"t")
                .expect("generate");
            let parsed: serde_json::Value =
                serde_json::from_slice(keygen.document()).expect("doc");
            assert_ne!(parsed["id"], serde_json::json!(0));
            assert!(parsed["id"].is_i64());
        }
    }

    #[test]
    fn timestamp_generators_set_the_insert_hint() {
        let store = MemStore::new();
        let ctx = RequestContext::new();
        let tx = store.begin_tx().expect("begin");
        let generator = TableKeyGenerator::new();

        let idx = index(vec![field("id", FieldType::Int64, true)]);
        let mut keygen = KeyGenerator::new(b"{}".to_vec(), &generator, &idx);
        keygen
            .generate(&ctx, tx.as_ref(), &PrimaryKeyEncoder, b"t")
            .expect("generate");
        assert!(keygen.force_insert());

        let idx = index(vec![field("at", FieldType::DateTime, true)]);
        let mut keygen = KeyGenerator::new(b"{}".to_vec(), &generator, &idx);
        keygen
            .generate(&ctx, tx.as_ref(), &PrimaryKeyEncoder, b"t")
            .expect("generate");
        assert!(keygen.force_insert());
    }

    #[test]
    fn counter_strategy_for_int64_never_hints_insert() {
        let store = MemStore::new();
        let ctx = RequestContext::new();
        let tx = store.begin_tx().expect("begin");
        let generator = TableKeyGenerator::new();
        let idx = index(vec![field("id", FieldType::Int64, true)]);

        let mut keygen = KeyGenerator::new(b"{}".to_vec(), &generator, &idx)
            .with_config(&crate::config::DockvConfig::counter_keys());
        let key = keygen
            .generate(&ctx, tx.as_ref(), &PrimaryKeyEncoder, b"t")
            .expect("generate");
        assert_eq!(key.parts(), &[FieldValue::Int(1)]);
        assert!(!keygen.force_insert());
    }

    #[test]
    fn unsupported_auto_generate_type_is_invalid() {
        let store = MemStore::new();
        let ctx = RequestContext::new();
        let tx = store.begin_tx().expect("begin");
        let generator = TableKeyGenerator::new();
        let idx = index(vec![field("tags", FieldType::Array, true)]);

        let mut keygen = KeyGenerator::new(b"{}".to_vec(), &generator, &idx);
        let err = keygen
            .generate(&ctx, tx.as_ref(), &PrimaryKeyEncoder, b"t")
            .unwrap_err();
        assert!(matches!(err, DockvError::InvalidArgument(_)));
    }
}
