use dockv::context::RequestContext;
use dockv::docgen::{KeyGenerator, PrimaryKeyEncoder};
use dockv::indexer::SecondaryIndexer;
use dockv::keys::Key;
use dockv::kv::envelope::TableData;
use dockv::kv::mem::MemStore;
use dockv::kv::{Store, Tx};
use dockv::metadata::key_generator::TableKeyGenerator;
use dockv::query::filter::Filter;
use dockv::query::plan::QueryType;
use dockv::query::planner::build_secondary_index_plan;
use dockv::query::reader::SecondaryIndexReader;
use dockv::query::{Row, RowIterator};
use dockv::schema::{Collection, Field, Index, QueryableField};
use dockv::value::{FieldType, FieldValue};

fn users() -> Collection {
    Collection {
        name: "users".into(),
        encoded_name: b"t_users".to_vec(),
        encoded_index_name: b"i_users".to_vec(),
        primary_index: Index {
            name: "pkey".into(),
            fields: vec![Field {
                name: "id".into(),
                field_type: FieldType::Int64,
                auto_generate: false,
            }],
        },
        queryable_fields: vec![QueryableField::new("age", FieldType::Int64)],
    }
}

fn seed_user(ctx: &RequestContext, tx: &dyn Tx, coll: &Collection, id: i64, age: i64) -> Key {
    let doc = format!(r#"{{"id":{id},"age":{age}}}"#).into_bytes();
    let key = Key::new(coll.encoded_name.clone(), vec![FieldValue::Int(id)]);
    tx.insert(ctx, &coll.encoded_name, &key, &TableData::new(doc.clone()))
        .expect("insert document");
    SecondaryIndexer::new(coll)
        .index_document(ctx, tx, &doc, &[FieldValue::Int(id)])
        .expect("index document");
    key
}

fn collect_ages(reader: &mut SecondaryIndexReader<'_>) -> Vec<i64> {
    let mut row = Row::default();
    let mut ages = Vec::new();
    while reader.next(&mut row) {
        let doc: serde_json::Value = serde_json::from_slice(&row.data.raw_data).expect("doc");
        ages.push(doc["age"].as_i64().expect("age"));
    }
    assert!(reader.interrupted().is_none(), "{:?}", reader.interrupted());
    ages
}

#[test]
fn equality_filter_joins_index_hits_to_documents() {
    let store = MemStore::new();
    let ctx = RequestContext::new();
    let coll = users();

    let tx = store.begin_tx().expect("begin");
    for (id, age) in [(1, 30), (2, 41), (3, 30)] {
        seed_user(&ctx, tx.as_ref(), &coll, id, age);
    }
    tx.commit(&ctx).expect("commit");

    let plan = build_secondary_index_plan(&coll, &[Filter::eq("age", 30)]).expect("plan");
    assert_eq!(plan.query_type, QueryType::Equal);
    assert_eq!(plan.keys[0].parts().last(), Some(&FieldValue::Int(30)));

    let tx = store.begin_tx().expect("begin");
    let mut reader =
        SecondaryIndexReader::new(&ctx, tx.as_ref(), &coll, plan).expect("reader");
    let mut row = Row::default();
    let mut ids = Vec::new();
    while reader.next(&mut row) {
        let doc: serde_json::Value = serde_json::from_slice(&row.data.raw_data).expect("doc");
        assert_eq!(doc["age"], serde_json::json!(30));
        ids.push(doc["id"].as_i64().expect("id"));
    }
    assert!(reader.interrupted().is_none());
    assert_eq!(ids, vec![1, 3]);
}

#[test]
fn range_filter_surfaces_rows_in_ascending_order() {
    let store = MemStore::new();
    let ctx = RequestContext::new();
    let coll = users();

    let tx = store.begin_tx().expect("begin");
    for (id, age) in [(1, 25), (2, 5), (3, 15), (4, 10), (5, 20)] {
        seed_user(&ctx, tx.as_ref(), &coll, id, age);
    }
    tx.commit(&ctx).expect("commit");

    let plan =
        build_secondary_index_plan(&coll, &[Filter::gte("age", 10), Filter::lt("age", 20)])
            .expect("plan");
    assert_eq!(plan.query_type, QueryType::Range);

    let tx = store.begin_tx().expect("begin");
    let mut reader =
        SecondaryIndexReader::new(&ctx, tx.as_ref(), &coll, plan).expect("reader");
    assert_eq!(collect_ages(&mut reader), vec![10, 15]);
}

#[test]
fn inclusive_upper_bound_keeps_boundary_rows() {
    let store = MemStore::new();
    let ctx = RequestContext::new();
    let coll = users();

    let tx = store.begin_tx().expect("begin");
    for (id, age) in [(1, 10), (2, 20), (3, 30)] {
        seed_user(&ctx, tx.as_ref(), &coll, id, age);
    }
    tx.commit(&ctx).expect("commit");

    let plan =
        build_secondary_index_plan(&coll, &[Filter::gt("age", 10), Filter::lte("age", 30)])
            .expect("plan");

    let tx = store.begin_tx().expect("begin");
    let mut reader =
        SecondaryIndexReader::new(&ctx, tx.as_ref(), &coll, plan).expect("reader");
    assert_eq!(collect_ages(&mut reader), vec![20, 30]);
}

#[test]
fn full_range_plan_scans_the_whole_field_index() {
    let store = MemStore::new();
    let ctx = RequestContext::new();
    let coll = users();

    let tx = store.begin_tx().expect("begin");
    for (id, age) in [(1, 30), (2, 41)] {
        seed_user(&ctx, tx.as_ref(), &coll, id, age);
    }
    tx.commit(&ctx).expect("commit");

    let plan = build_secondary_index_plan(&coll, &[Filter::ne("age", 30)]).expect("plan");
    assert_eq!(plan.query_type, QueryType::FullRange);

    // The residual `ne` predicate is the handler's business; the plan spans
    // every row of the field's index.
    let tx = store.begin_tx().expect("begin");
    let mut reader =
        SecondaryIndexReader::new(&ctx, tx.as_ref(), &coll, plan).expect("reader");
    assert_eq!(collect_ages(&mut reader), vec![30, 41]);
}

#[test]
fn concurrently_deleted_primary_rows_are_skipped() {
    let store = MemStore::new();
    let ctx = RequestContext::new();
    let coll = users();

    let tx = store.begin_tx().expect("begin");
    let mut keys = Vec::new();
    for (id, age) in [(1, 10), (2, 20), (3, 30)] {
        keys.push(seed_user(&ctx, tx.as_ref(), &coll, id, age));
    }
    tx.commit(&ctx).expect("commit");

    // Delete one primary row but leave its index row behind, as a
    // concurrent writer would within the scan's transaction window.
    let tx = store.begin_tx().expect("begin");
    tx.delete(&ctx, &coll.encoded_name, &keys[1]).expect("delete");

    let plan = build_secondary_index_plan(&coll, &[Filter::gte("age", 10)]).expect("plan");
    let mut reader =
        SecondaryIndexReader::new(&ctx, tx.as_ref(), &coll, plan).expect("reader");
    assert_eq!(collect_ages(&mut reader), vec![10, 30]);
}

#[test]
fn generated_document_roundtrips_through_index_scan() {
    let store = MemStore::new();
    let ctx = RequestContext::new();
    let coll = users();
    let generator = TableKeyGenerator::new();

    let index = Index {
        name: "pkey".into(),
        fields: vec![Field {
            name: "id".into(),
            field_type: FieldType::Int32,
            auto_generate: true,
        }],
    };

    let tx = store.begin_tx().expect("begin");
    let mut keygen = KeyGenerator::new(br#"{"id":0,"age":33}"#.to_vec(), &generator, &index);
    let key = keygen
        .generate(&ctx, tx.as_ref(), &PrimaryKeyEncoder, &coll.encoded_name)
        .expect("generate");
    tx.insert(
        &ctx,
        &coll.encoded_name,
        &key,
        &TableData::new(keygen.document().to_vec()),
    )
    .expect("insert");
    SecondaryIndexer::new(&coll)
        .index_document(&ctx, tx.as_ref(), keygen.document(), key.parts())
        .expect("index");
    tx.commit(&ctx).expect("commit");

    let plan = build_secondary_index_plan(&coll, &[Filter::eq("age", 33)]).expect("plan");
    let tx = store.begin_tx().expect("begin");
    let mut reader =
        SecondaryIndexReader::new(&ctx, tx.as_ref(), &coll, plan).expect("reader");
    let mut row = Row::default();
    assert!(reader.next(&mut row));
    assert_eq!(row.key, key.serialize_to_bytes());
    assert!(!reader.next(&mut row));
    assert!(reader.interrupted().is_none());
}

#[test]
fn cancelled_context_interrupts_the_reader() {
    let store = MemStore::new();
    let ctx = RequestContext::new();
    let coll = users();

    let tx = store.begin_tx().expect("begin");
    for (id, age) in [(1, 10), (2, 20)] {
        seed_user(&ctx, tx.as_ref(), &coll, id, age);
    }
    tx.commit(&ctx).expect("commit");

    let plan = build_secondary_index_plan(&coll, &[Filter::gte("age", 10)]).expect("plan");
    let tx = store.begin_tx().expect("begin");
    let mut reader =
        SecondaryIndexReader::new(&ctx, tx.as_ref(), &coll, plan).expect("reader");
    let mut row = Row::default();
    assert!(reader.next(&mut row));

    ctx.cancel();
    assert!(!reader.next(&mut row));
    assert!(reader.interrupted().is_some());
}
