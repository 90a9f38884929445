use crate::value::FieldType;
use serde::{Deserialize, Serialize};

/// One component of a primary index, in index order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub auto_generate: bool,
}

/// Ordered field list of a primary index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Index {
    pub name: String,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FieldState {
    Active,
    Writing,
    Deleted,
}

/// A document field the query planner may consider. Only `Active` fields
/// participate in plan selection; `Writing` fields are being backfilled and
/// `Deleted` fields are awaiting cleanup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryableField {
    pub name: String,
    pub field_type: FieldType,
    pub indexed: bool,
    pub state: FieldState,
}

impl QueryableField {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            indexed: true,
            state: FieldState::Active,
        }
    }
}

/// Collection-level schema the write and read paths share: the encoded
/// table names carve the collection's row and secondary-index subspaces out
/// of the substrate keyspace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Collection {
    pub name: String,
    pub encoded_name: Vec<u8>,
    pub encoded_index_name: Vec<u8>,
    pub primary_index: Index,
    pub queryable_fields: Vec<QueryableField>,
}

impl Collection {
    pub fn active_indexed_fields(&self) -> Vec<&QueryableField> {
        self.queryable_fields
            .iter()
            .filter(|f| f.indexed && f.state == FieldState::Active)
            .collect()
    }

    pub fn queryable_field(&self, name: &str) -> Option<&QueryableField> {
        self.queryable_fields.iter().find(|f| f.name == name)
    }
}
