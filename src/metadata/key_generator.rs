use crate::context::RequestContext;
use crate::error::DockvError;
use crate::keys::Key;
use crate::kv::Tx;
use crate::metadata::GENERATOR_SUBSPACE_NAME;
use crate::value::FieldValue;

/// Owner of the per-table int32 counters backing auto-generated keys.
///
/// Counters are plain substrate rows bumped with the conflict-free atomic
/// add, so concurrent writers never contend on them. The add and the read
/// run inside the caller's transaction and observe the pending delta.
#[derive(Debug, Clone)]
pub struct TableKeyGenerator {
    subspace_name: Vec<u8>,
}

impl Default for TableKeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TableKeyGenerator {
    pub fn new() -> Self {
        Self {
            subspace_name: GENERATOR_SUBSPACE_NAME.to_vec(),
        }
    }

    fn counter_key(&self, table: &[u8]) -> Key {
        Key::new(
            self.subspace_name.clone(),
            vec![FieldValue::Bytes(table.to_vec())],
        )
    }

    /// Bumps the table's counter and returns the post-increment value.
    pub fn generate_counter(
        &self,
        ctx: &RequestContext,
        tx: &dyn Tx,
        table: &[u8],
    ) -> Result<i32, DockvError> {
        let key = self.counter_key(table);
        tx.atomic_add(ctx, &self.subspace_name, &key, 1)?;
        let value = tx.atomic_read(ctx, &self.subspace_name, &key)?;
        i32::try_from(value)
            .map_err(|_| DockvError::Internal(format!("table counter out of int32 range: {value}")))
    }

    /// Drops the counter row, for collection teardown.
    pub fn remove_counter(
        &self,
        ctx: &RequestContext,
        tx: &dyn Tx,
        table: &[u8],
    ) -> Result<(), DockvError> {
        tx.delete(ctx, &self.subspace_name, &self.counter_key(table))
    }
}
