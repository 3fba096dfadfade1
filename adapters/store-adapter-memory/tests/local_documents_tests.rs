//! Tests of the merged local document view: overlay recomputation on
//! existence flips, field transforms through the write pipeline, and
//! cursor bounds.

use std::collections::BTreeMap;

use cumulo::key::DocumentKey;
use cumulo::path::{FieldPath, ResourcePath};
use cumulo::types::{BatchId, SnapshotVersion, Timestamp, User};
use cumulo::value::Value;
use cumulo_local::{LocalStore, LocalStoreConfig, RemoteEvent};
use cumulo_model::{
	DocumentKeySet, FieldMask, FieldTransform, MutableDocument, Mutation, MutationBatchResult,
	MutationResult, ObjectValue, Precondition, TransformOperation,
};
use cumulo_query::{Bound, OrderBy, Query};
use cumulo_store_adapter_memory::MemoryPersistence;
use serde_json::json;

fn new_store() -> LocalStore<MemoryPersistence> {
	let mut store = LocalStore::new(
		MemoryPersistence::new(),
		User::unauthenticated(),
		LocalStoreConfig::default(),
	);
	store.start().expect("store should start");
	store
}

fn key(path: &str) -> DocumentKey {
	DocumentKey::parse(path).unwrap()
}

fn field(path: &str) -> FieldPath {
	FieldPath::from_server_format(path).unwrap()
}

fn version(seconds: i64) -> SnapshotVersion {
	SnapshotVersion::new(Timestamp::new(seconds, 0))
}

fn apply_docs(store: &mut LocalStore<MemoryPersistence>, at: SnapshotVersion, docs: Vec<MutableDocument>) {
	let event = RemoteEvent {
		snapshot_version: at,
		target_changes: BTreeMap::new(),
		document_updates: docs.into_iter().map(|d| (d.key().clone(), d)).collect(),
		limbo_document_changes: DocumentKeySet::new(),
	};
	store.apply_remote_event(&event).unwrap();
}

fn patch(path: &str, data: serde_json::Value, mask_fields: &[&str]) -> Mutation {
	Mutation::patch(
		key(path),
		ObjectValue::from_json(&data),
		FieldMask::from_paths(mask_fields.iter().map(|f| field(f))),
		Precondition::Exists(true),
	)
}

#[test]
fn test_patch_starts_applying_when_document_appears() {
	let mut store = new_store();

	// The document is known to not exist, so the patch's precondition
	// fails and the local view keeps the tombstone.
	apply_docs(
		&mut store,
		version(5),
		vec![MutableDocument::no_document(key("coll/a"), version(5))],
	);
	store.write_locally(vec![patch("coll/a", json!({"x": 1}), &["x"])]).unwrap();
	assert!(store.read_document(&key("coll/a")).is_no_document());

	// The server reports the document exists after all; the existence flip
	// forces the pending patch to be replayed, and it now applies.
	let event = RemoteEvent {
		snapshot_version: version(6),
		target_changes: BTreeMap::new(),
		document_updates: [(
			key("coll/a"),
			MutableDocument::found(
				key("coll/a"),
				version(6),
				ObjectValue::from_json(&json!({"x": 0, "other": true})),
			),
		)]
		.into_iter()
		.collect(),
		limbo_document_changes: DocumentKeySet::new(),
	};
	let changed = store.apply_remote_event(&event).unwrap();

	let doc = changed.get(&key("coll/a")).expect("coll/a changed");
	assert!(doc.is_found_document());
	assert!(doc.has_local_mutations());
	assert_eq!(doc.data(), &ObjectValue::from_json(&json!({"x": 1, "other": true})));

	// Subsequent point reads serve the recomputed overlay.
	let doc = store.read_document(&key("coll/a"));
	assert_eq!(doc.data(), &ObjectValue::from_json(&json!({"x": 1, "other": true})));
}

#[test]
fn test_patch_stops_applying_when_document_disappears() {
	let mut store = new_store();

	apply_docs(
		&mut store,
		version(5),
		vec![MutableDocument::found(
			key("coll/a"),
			version(5),
			ObjectValue::from_json(&json!({"x": 0})),
		)],
	);
	store.write_locally(vec![patch("coll/a", json!({"x": 1}), &["x"])]).unwrap();
	assert_eq!(
		store.read_document(&key("coll/a")).data(),
		&ObjectValue::from_json(&json!({"x": 1}))
	);

	// The server deletes the document; the patch precondition no longer
	// holds, so the local view flips to the tombstone.
	apply_docs(
		&mut store,
		version(7),
		vec![MutableDocument::no_document(key("coll/a"), version(7))],
	);
	assert!(store.read_document(&key("coll/a")).is_no_document());
}

#[test]
fn test_server_timestamp_and_increment_pipeline() {
	let mut store = new_store();

	apply_docs(
		&mut store,
		version(5),
		vec![MutableDocument::found(
			key("coll/a"),
			version(5),
			ObjectValue::from_json(&json!({"counter": 10})),
		)],
	);

	let mutation = Mutation::patch_with_transforms(
		key("coll/a"),
		ObjectValue::new(),
		FieldMask::default(),
		Precondition::Exists(true),
		vec![
			FieldTransform {
				field_path: field("counter"),
				operation: TransformOperation::Increment(Value::Integer(5)),
			},
			FieldTransform {
				field_path: field("updated"),
				operation: TransformOperation::ServerTimestamp,
			},
		],
	);
	let write = store.write_locally(vec![mutation]).unwrap();

	// Locally: the increment resolves against the recorded base, and the
	// server timestamp shows as a pending sentinel.
	let doc = store.read_document(&key("coll/a"));
	assert_eq!(doc.field(&field("counter")), Some(&Value::Integer(15)));
	assert!(matches!(doc.field(&field("updated")), Some(Value::ServerTimestamp { .. })));

	// The server acknowledges with its own transform results.
	let batch = store.get_next_mutation_batch(BatchId::NONE).unwrap();
	assert!(!batch.base_mutations().is_empty(), "the increment records a base value");
	let committed_at = Value::Timestamp(Timestamp::new(100, 0));
	let result = MutationResult::with_transform_results(
		version(9),
		vec![Value::Integer(15), committed_at.clone()],
	);
	let batch_result =
		MutationBatchResult::new(batch, version(9), vec![result], Vec::new()).unwrap();
	let changed = store.acknowledge_batch(&batch_result).unwrap();

	let doc = changed.get(&key("coll/a")).expect("coll/a changed");
	assert_eq!(write.batch_id, BatchId(1));
	assert_eq!(doc.field(&field("counter")), Some(&Value::Integer(15)));
	assert_eq!(doc.field(&field("updated")), Some(&committed_at));
	assert!(!doc.has_local_mutations());
}

#[test]
fn test_array_union_and_remove_transforms() {
	let mut store = new_store();

	apply_docs(
		&mut store,
		version(5),
		vec![MutableDocument::found(
			key("coll/a"),
			version(5),
			ObjectValue::from_json(&json!({"tags": ["a", "b"]})),
		)],
	);

	let mutation = Mutation::patch_with_transforms(
		key("coll/a"),
		ObjectValue::new(),
		FieldMask::default(),
		Precondition::Exists(true),
		vec![
			FieldTransform {
				field_path: field("tags"),
				operation: TransformOperation::ArrayUnion(vec![
					Value::String("b".into()),
					Value::String("c".into()),
				]),
			},
			FieldTransform {
				field_path: field("gone"),
				operation: TransformOperation::ArrayRemove(vec![Value::String("x".into())]),
			},
		],
	);
	store.write_locally(vec![mutation]).unwrap();

	let doc = store.read_document(&key("coll/a"));
	assert_eq!(doc.field(&field("tags")), Some(&Value::from_json(&json!(["a", "b", "c"]))));
	assert_eq!(doc.field(&field("gone")), Some(&Value::from_json(&json!([]))));
}

#[test]
fn test_cursor_bounds_through_the_store() {
	let mut store = new_store();

	let docs = (1..=5)
		.map(|i| {
			MutableDocument::found(
				key(&format!("coll/d{}", i)),
				version(5),
				ObjectValue::from_json(&json!({ "n": i })),
			)
		})
		.collect();
	apply_docs(&mut store, version(5), docs);

	let base = Query::new(ResourcePath::parse("coll").unwrap())
		.adding_order_by(OrderBy::ascending(field("n")));

	let from_two = base.starting_at(Bound::new(vec![Value::Integer(2)], true));
	let result = store.execute_query(&from_two, false);
	assert_eq!(result.documents.len(), 4);
	assert_eq!(result.documents[0].field(&field("n")), Some(&Value::Integer(2)));

	let after_two = base.starting_at(Bound::new(vec![Value::Integer(2)], false));
	let result = store.execute_query(&after_two, false);
	assert_eq!(result.documents.len(), 3);

	let until_four = base
		.starting_at(Bound::new(vec![Value::Integer(2)], true))
		.ending_at(Bound::new(vec![Value::Integer(4)], false));
	let result = store.execute_query(&until_four, false);
	let ns: Vec<&Value> =
		result.documents.iter().filter_map(|d| d.field(&field("n"))).collect();
	assert_eq!(ns, [&Value::Integer(2), &Value::Integer(3)]);
}

#[test]
fn test_delete_then_set_in_one_batch() {
	let mut store = new_store();

	apply_docs(
		&mut store,
		version(5),
		vec![MutableDocument::found(
			key("coll/a"),
			version(5),
			ObjectValue::from_json(&json!({"old": true})),
		)],
	);

	store
		.write_locally(vec![
			Mutation::delete(key("coll/a"), Precondition::None),
			Mutation::set(key("coll/a"), ObjectValue::from_json(&json!({"new": true}))),
		])
		.unwrap();

	let doc = store.read_document(&key("coll/a"));
	assert!(doc.is_found_document());
	assert_eq!(doc.data(), &ObjectValue::from_json(&json!({"new": true})));
	assert!(doc.has_local_mutations());
}

// vim: ts=4
