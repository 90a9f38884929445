//! In-memory substrate used for embedding and tests.
//!
//! The world is an `im::OrdMap`, so beginning a transaction takes an O(1)
//! copy-on-write snapshot; scans over that snapshot never observe later
//! commits. Writes buffer in the transaction and apply atomically under the
//! store lock at commit. Atomic adds merge against the committed world, not
//! the snapshot, which keeps counters conflict-free across transactions.

use crate::context::RequestContext;
use crate::error::DockvError;
use crate::keys::{Key, KeyBuf, tuple};
use crate::kv::envelope::TableData;
use crate::kv::{KeyValue, KvIterator, Store, Tx};
use im::OrdMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

const VERSIONSTAMP_LEN: usize = 10;

#[derive(Debug, Default)]
struct World {
    data: OrdMap<Vec<u8>, Vec<u8>>,
    version: u64,
}

#[derive(Debug, Clone, Default)]
pub struct MemStore {
    world: Arc<Mutex<World>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemStore {
    fn begin_tx(&self) -> Result<Box<dyn Tx>, DockvError> {
        let snapshot = self.world.lock().data.clone();
        Ok(Box::new(MemTx {
            world: Arc::clone(&self.world),
            state: Mutex::new(TxState {
                snapshot,
                writes: BTreeMap::new(),
                adds: BTreeMap::new(),
                stamped: Vec::new(),
                completed: false,
            }),
        }))
    }

    // Tables are carved out of the shared keyspace by prefix; nothing needs
    // to be allocated up front.
    fn create_table(&self, ctx: &RequestContext, _name: &[u8]) -> Result<(), DockvError> {
        ctx.check()
    }

    fn drop_table(&self, ctx: &RequestContext, name: &[u8]) -> Result<(), DockvError> {
        ctx.check()?;
        let mut world = self.world.lock();
        let doomed: Vec<Vec<u8>> = world
            .data
            .keys()
            .filter(|k| k.starts_with(name))
            .cloned()
            .collect();
        for key in doomed {
            world.data.remove(&key);
        }
        Ok(())
    }
}

struct TxState {
    snapshot: OrdMap<Vec<u8>, Vec<u8>>,
    /// `None` marks a buffered delete.
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    adds: BTreeMap<Vec<u8>, i64>,
    stamped: Vec<(Vec<u8>, Vec<u8>)>,
    completed: bool,
}

impl TxState {
    fn ensure_open(&self) -> Result<(), DockvError> {
        if self.completed {
            return Err(DockvError::Internal("transaction already completed".into()));
        }
        Ok(())
    }

    fn lookup(&self, raw: &[u8]) -> Option<Vec<u8>> {
        if let Some(delta) = self.adds.get(raw) {
            return Some(encode_counter(self.counter_base(raw) + delta));
        }
        match self.writes.get(raw) {
            Some(buffered) => buffered.clone(),
            None => self.snapshot.get(raw).cloned(),
        }
    }

    fn counter_base(&self, raw: &[u8]) -> i64 {
        match self.writes.get(raw) {
            Some(Some(v)) => decode_counter(v),
            Some(None) => 0,
            None => self.snapshot.get(raw).map(|v| decode_counter(v)).unwrap_or(0),
        }
    }
}

pub struct MemTx {
    world: Arc<Mutex<World>>,
    state: Mutex<TxState>,
}

fn raw_key(table: &[u8], key: &Key) -> Vec<u8> {
    if key.parts().is_empty() {
        return table.to_vec();
    }
    let mut out = KeyBuf::new();
    out.extend_from_slice(table);
    tuple::pack_into(key.parts(), &mut out);
    out.to_vec()
}

// Counters are little-endian i64, zero-extended like the substrate's native
// atomic add treats short values.
fn decode_counter(bytes: &[u8]) -> i64 {
    let mut buf = [0u8; 8];
    let n = bytes.len().min(8);
    buf[..n].copy_from_slice(&bytes[..n]);
    i64::from_le_bytes(buf)
}

fn encode_counter(v: i64) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

impl Tx for MemTx {
    fn insert(
        &self,
        ctx: &RequestContext,
        table: &[u8],
        key: &Key,
        data: &TableData,
    ) -> Result<(), DockvError> {
        ctx.check()?;
        let raw = raw_key(table, key);
        let mut state = self.state.lock();
        state.ensure_open()?;
        if state.lookup(&raw).is_some() {
            return Err(DockvError::Conflict(format!("key already exists: {key}")));
        }
        state.writes.insert(raw, Some(data.encode()?));
        Ok(())
    }

    fn replace(
        &self,
        ctx: &RequestContext,
        table: &[u8],
        key: &Key,
        data: &TableData,
        is_update: bool,
    ) -> Result<(), DockvError> {
        ctx.check()?;
        let raw = raw_key(table, key);
        let mut state = self.state.lock();
        state.ensure_open()?;
        if is_update && state.lookup(&raw).is_none() {
            return Err(DockvError::NotFound(format!("key does not exist: {key}")));
        }
        state.writes.insert(raw, Some(data.encode()?));
        Ok(())
    }

    fn delete(&self, ctx: &RequestContext, table: &[u8], key: &Key) -> Result<(), DockvError> {
        ctx.check()?;
        let raw = raw_key(table, key);
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.adds.remove(&raw);
        state.writes.insert(raw, None);
        Ok(())
    }

    fn read<'a>(
        &'a self,
        ctx: &RequestContext,
        table: &[u8],
        key: &Key,
    ) -> Result<Box<dyn KvIterator + 'a>, DockvError> {
        ctx.check()?;
        let raw = raw_key(table, key);
        let state = self.state.lock();
        state.ensure_open()?;
        let entries = match state.lookup(&raw) {
            Some(value) => vec![(raw, value)],
            None => Vec::new(),
        };
        Ok(Box::new(MemIterator::new(ctx.clone(), self, entries)))
    }

    fn read_range<'a>(
        &'a self,
        ctx: &RequestContext,
        _table: &[u8],
        lo: &[u8],
        hi: &[u8],
        _snapshot: bool,
    ) -> Result<Box<dyn KvIterator + 'a>, DockvError> {
        ctx.check()?;
        let state = self.state.lock();
        state.ensure_open()?;

        // An inverted range is legal input and simply matches nothing.
        if lo >= hi {
            return Ok(Box::new(MemIterator::new(ctx.clone(), self, Vec::new())));
        }

        let bounds = (
            Bound::Included(lo.to_vec()),
            Bound::Excluded(hi.to_vec()),
        );
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = state
            .snapshot
            .range(bounds.clone())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (k, buffered) in state.writes.range(bounds.clone()) {
            match buffered {
                Some(v) => {
                    merged.insert(k.clone(), v.clone());
                }
                None => {
                    merged.remove(k);
                }
            }
        }
        for (k, delta) in state.adds.range(bounds) {
            merged.insert(k.clone(), encode_counter(state.counter_base(k) + delta));
        }

        Ok(Box::new(MemIterator::new(
            ctx.clone(),
            self,
            merged.into_iter().collect(),
        )))
    }

    fn atomic_add(
        &self,
        ctx: &RequestContext,
        table: &[u8],
        key: &Key,
        delta: i64,
    ) -> Result<(), DockvError> {
        ctx.check()?;
        let raw = raw_key(table, key);
        let mut state = self.state.lock();
        state.ensure_open()?;
        let pending = state.adds.get(&raw).copied().unwrap_or(0);
        state.adds.insert(raw, pending + delta);
        Ok(())
    }

    fn atomic_read(
        &self,
        ctx: &RequestContext,
        table: &[u8],
        key: &Key,
    ) -> Result<i64, DockvError> {
        ctx.check()?;
        let raw = raw_key(table, key);
        let state = self.state.lock();
        state.ensure_open()?;
        let pending = state.adds.get(&raw).copied().unwrap_or(0);
        Ok(state.counter_base(&raw) + pending)
    }

    fn set_versionstamped_value(
        &self,
        ctx: &RequestContext,
        key: &Key,
        payload: &[u8],
    ) -> Result<(), DockvError> {
        ctx.check()?;
        if payload.len() < VERSIONSTAMP_LEN {
            return Err(DockvError::InvalidArgument(format!(
                "versionstamped payload must reserve {VERSIONSTAMP_LEN} bytes"
            )));
        }
        let raw = key.serialize_to_bytes();
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.stamped.push((raw, payload.to_vec()));
        Ok(())
    }

    fn commit(&self, ctx: &RequestContext) -> Result<(), DockvError> {
        ctx.check()?;
        let mut state = self.state.lock();
        state.ensure_open()?;

        let mut world = self.world.lock();
        for (raw, buffered) in std::mem::take(&mut state.writes) {
            match buffered {
                Some(value) => {
                    world.data.insert(raw, value);
                }
                None => {
                    world.data.remove(&raw);
                }
            }
        }
        for (raw, delta) in std::mem::take(&mut state.adds) {
            let base = world.data.get(&raw).map(|v| decode_counter(v)).unwrap_or(0);
            world.data.insert(raw, encode_counter(base + delta));
        }
        world.version += 1;
        let version = world.version;
        for (order, (raw, mut payload)) in std::mem::take(&mut state.stamped).into_iter().enumerate()
        {
            payload[..8].copy_from_slice(&version.to_be_bytes());
            payload[8..VERSIONSTAMP_LEN].copy_from_slice(&(order as u16).to_be_bytes());
            world.data.insert(raw, payload);
        }

        state.completed = true;
        Ok(())
    }

    fn rollback(&self, ctx: &RequestContext) -> Result<(), DockvError> {
        ctx.check()?;
        let mut state = self.state.lock();
        state.writes.clear();
        state.adds.clear();
        state.stamped.clear();
        state.completed = true;
        Ok(())
    }

    // This substrate serializes commits under the store lock, so no error it
    // produces clears up on retry.
    fn is_retriable(&self) -> bool {
        false
    }
}

struct MemIterator<'a> {
    ctx: RequestContext,
    tx: &'a MemTx,
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    pos: usize,
    err: Option<DockvError>,
}

impl<'a> MemIterator<'a> {
    fn new(ctx: RequestContext, tx: &'a MemTx, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        Self {
            ctx,
            tx,
            entries,
            pos: 0,
            err: None,
        }
    }
}

impl KvIterator for MemIterator<'_> {
    fn next(&mut self, kv: &mut KeyValue) -> bool {
        if self.err.is_some() {
            return false;
        }
        if let Err(e) = self.ctx.check() {
            self.err = Some(e);
            return false;
        }
        if self.tx.state.lock().completed {
            self.err = Some(DockvError::Internal(
                "iterator outlived its transaction".into(),
            ));
            return false;
        }
        let Some((raw, value)) = self.entries.get(self.pos) else {
            return false;
        };
        self.pos += 1;

        match TableData::decode(value) {
            Ok(data) => {
                kv.raw_key = raw.clone();
                kv.data = data;
                true
            }
            Err(e) => {
                self.err = Some(e);
                false
            }
        }
    }

    fn err(&self) -> Option<&DockvError> {
        self.err.as_ref()
    }
}
