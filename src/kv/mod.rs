pub mod envelope;
pub mod mem;

use crate::context::RequestContext;
use crate::error::DockvError;
use crate::keys::Key;
use envelope::TableData;

/// One stored row: the raw persisted key and its decoded value envelope.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KeyValue {
    pub raw_key: Vec<u8>,
    pub data: TableData,
}

/// Finite, forward-only cursor over stored rows. Invalidated by the owning
/// transaction's commit or rollback.
pub trait KvIterator {
    fn next(&mut self, kv: &mut KeyValue) -> bool;
    fn err(&self) -> Option<&DockvError>;
}

/// The substrate contract the document layers bind to. Implementations must
/// provide serializable multi-key transactions, ordered range scans, and
/// conflict-free 64-bit atomic adds.
///
/// Every operation may block on substrate I/O and must check the request
/// context before doing work. Range bounds are full packed keys as produced
/// by [`Key::serialize_to_bytes`].
pub trait Tx {
    /// Fails with `Conflict` if the key already exists.
    fn insert(
        &self,
        ctx: &RequestContext,
        table: &[u8],
        key: &Key,
        data: &TableData,
    ) -> Result<(), DockvError>;

    /// Overwrites. With `is_update` set, fails with `NotFound` unless the key
    /// already exists.
    fn replace(
        &self,
        ctx: &RequestContext,
        table: &[u8],
        key: &Key,
        data: &TableData,
        is_update: bool,
    ) -> Result<(), DockvError>;

    /// Idempotent removal.
    fn delete(&self, ctx: &RequestContext, table: &[u8], key: &Key) -> Result<(), DockvError>;

    /// Point read exposed as a single-element iterator.
    fn read<'a>(
        &'a self,
        ctx: &RequestContext,
        table: &[u8],
        key: &Key,
    ) -> Result<Box<dyn KvIterator + 'a>, DockvError>;

    /// Half-open scan over `[lo, hi)`. With `snapshot` set the scan skips
    /// read-conflict tracking in substrates that do it.
    fn read_range<'a>(
        &'a self,
        ctx: &RequestContext,
        table: &[u8],
        lo: &[u8],
        hi: &[u8],
        snapshot: bool,
    ) -> Result<Box<dyn KvIterator + 'a>, DockvError>;

    /// Conflict-free counter update.
    fn atomic_add(
        &self,
        ctx: &RequestContext,
        table: &[u8],
        key: &Key,
        delta: i64,
    ) -> Result<(), DockvError>;

    fn atomic_read(&self, ctx: &RequestContext, table: &[u8], key: &Key)
    -> Result<i64, DockvError>;

    /// Stores `payload` with its first ten bytes replaced by the commit
    /// versionstamp when the transaction commits.
    fn set_versionstamped_value(
        &self,
        ctx: &RequestContext,
        key: &Key,
        payload: &[u8],
    ) -> Result<(), DockvError>;

    fn commit(&self, ctx: &RequestContext) -> Result<(), DockvError>;

    /// Releases the transaction's resources; buffered writes are discarded.
    fn rollback(&self, ctx: &RequestContext) -> Result<(), DockvError>;

    /// After a failure, whether the error class permits an automatic retry.
    fn is_retriable(&self) -> bool;
}

pub trait Store {
    fn begin_tx(&self) -> Result<Box<dyn Tx>, DockvError>;
    fn create_table(&self, ctx: &RequestContext, name: &[u8]) -> Result<(), DockvError>;
    fn drop_table(&self, ctx: &RequestContext, name: &[u8]) -> Result<(), DockvError>;
}
