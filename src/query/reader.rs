use crate::context::RequestContext;
use crate::error::DockvError;
use crate::indexer::PRIMARY_KEY_POS;
use crate::keys::{Key, prefix_successor};
use crate::kv::{KeyValue, KvIterator, Tx};
use crate::query::plan::{QueryPlan, QueryType};
use crate::query::{Row, RowIterator};
use crate::schema::Collection;
use tracing::debug;

/// Executes a query plan: scans the secondary-index ranges it describes,
/// extracts the trailing primary-key parts from each hit, and point-reads
/// the document row inside the same transaction, so a scan-then-read pair
/// never observes a torn update. Single-pass; must not outlive its
/// transaction.
pub struct SecondaryIndexReader<'a> {
    ctx: &'a RequestContext,
    tx: &'a dyn Tx,
    coll: &'a Collection,
    plan: QueryPlan,
    kv_iter: Box<dyn KvIterator + 'a>,
    err: Option<DockvError>,
}

impl<'a> SecondaryIndexReader<'a> {
    pub fn new(
        ctx: &'a RequestContext,
        tx: &'a dyn Tx,
        coll: &'a Collection,
        plan: QueryPlan,
    ) -> Result<Self, DockvError> {
        debug!(field = %plan.field_name, query_type = ?plan.query_type, "executing query plan");

        let kv_iter: Box<dyn KvIterator + 'a> = match plan.query_type {
            QueryType::Equal => Box::new(MultiPointIterator::new(
                ctx,
                tx,
                coll.encoded_index_name.clone(),
                plan.keys.clone(),
            )),
            QueryType::Range | QueryType::FullRange => {
                let (lo, hi) = plan.scan_bounds()?;
                tx.read_range(ctx, &coll.encoded_index_name, &lo, &hi, false)?
            }
        };

        Ok(Self {
            ctx,
            tx,
            coll,
            plan,
            kv_iter,
            err: None,
        })
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }
}

impl RowIterator for SecondaryIndexReader<'_> {
    fn next(&mut self, row: &mut Row) -> bool {
        if self.err.is_some() {
            return false;
        }
        let ctx = self.ctx;
        let tx = self.tx;

        let mut index_kv = KeyValue::default();
        loop {
            if !self.kv_iter.next(&mut index_kv) {
                if let Some(e) = self.kv_iter.err() {
                    self.err = Some(e.clone());
                }
                return false;
            }

            let index_key =
                match Key::from_binary(&self.coll.encoded_index_name, &index_kv.raw_key) {
                    Ok(key) => key,
                    Err(e) => {
                        self.err = Some(e);
                        return false;
                    }
                };
            if index_key.parts().len() <= PRIMARY_KEY_POS {
                self.err = Some(DockvError::Internal(format!(
                    "index row missing primary key parts: {index_key}"
                )));
                return false;
            }

            let pk_parts = index_key.parts()[PRIMARY_KEY_POS..].to_vec();
            let pk = Key::new(self.coll.encoded_name.clone(), pk_parts);
            let mut doc_iter = match tx.read(ctx, &self.coll.encoded_name, &pk) {
                Ok(it) => it,
                Err(e) => {
                    self.err = Some(e);
                    return false;
                }
            };

            let mut doc_kv = KeyValue::default();
            if doc_iter.next(&mut doc_kv) {
                row.key = std::mem::take(&mut doc_kv.raw_key);
                row.data = std::mem::take(&mut doc_kv.data);
                return true;
            }
            if let Some(e) = doc_iter.err() {
                self.err = Some(e.clone());
                return false;
            }
            // The primary row vanished between the index hit and the join
            // (deleted in this transaction window); skip it.
        }
    }

    fn interrupted(&self) -> Option<&DockvError> {
        self.err.as_ref()
    }
}

/// Iterates the keys of an equality plan in order. Each key addresses a
/// value prefix whose rows append primary-key parts, so every point expands
/// to the prefix range `[key, successor)`.
struct MultiPointIterator<'a> {
    ctx: &'a RequestContext,
    tx: &'a dyn Tx,
    table: Vec<u8>,
    keys: std::vec::IntoIter<Key>,
    current: Option<Box<dyn KvIterator + 'a>>,
    err: Option<DockvError>,
}

impl<'a> MultiPointIterator<'a> {
    fn new(ctx: &'a RequestContext, tx: &'a dyn Tx, table: Vec<u8>, keys: Vec<Key>) -> Self {
        Self {
            ctx,
            tx,
            table,
            keys: keys.into_iter(),
            current: None,
            err: None,
        }
    }
}

impl KvIterator for MultiPointIterator<'_> {
    fn next(&mut self, kv: &mut KeyValue) -> bool {
        if self.err.is_some() {
            return false;
        }
        let ctx = self.ctx;
        let tx = self.tx;

        loop {
            if let Some(current) = &mut self.current {
                if current.next(kv) {
                    return true;
                }
                if let Some(e) = current.err() {
                    self.err = Some(e.clone());
                    return false;
                }
                self.current = None;
            }

            let Some(key) = self.keys.next() else {
                return false;
            };
            let lo = key.serialize_to_bytes();
            let Some(hi) = prefix_successor(&lo) else {
                self.err = Some(DockvError::Internal(
                    "equality key has no prefix successor".into(),
                ));
                return false;
            };
            match tx.read_range(ctx, &self.table, &lo, &hi, false) {
                Ok(it) => self.current = Some(it),
                Err(e) => {
                    self.err = Some(e);
                    return false;
                }
            }
        }
    }

    fn err(&self) -> Option<&DockvError> {
        self.err.as_ref()
    }
}
