//! Tests of query execution strategies against memory persistence:
//! incremental execution from remote keys, refill fallback, index-served
//! queries, and composite filter evaluation.

use std::collections::BTreeMap;

use cumulo::key::DocumentKey;
use cumulo::path::{FieldPath, ResourcePath};
use cumulo::types::{SnapshotVersion, TargetId, Timestamp, User};
use cumulo::value::Value;
use cumulo_local::{
	IndexBackfiller, IndexType, LocalStore, LocalStoreConfig, LocalViewChanges, RemoteEvent,
	TargetChange,
};
use cumulo_model::{
	DocumentKeySet, FieldIndex, FieldMask, IndexState, MutableDocument, Mutation, ObjectValue,
	Precondition, Segment, SegmentKind,
};
use cumulo_query::{
	CompositeFilter, FieldFilter, Filter, Operator, OrderBy, Query,
};
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

fn coll_query() -> Query {
	Query::new(ResourcePath::parse("coll").unwrap())
}

fn filter(path: &str, op: Operator, value: serde_json::Value) -> Filter {
	Filter::Field(FieldFilter::new(field(path), op, Value::from_json(&value)))
}

fn found_doc(path: &str, at: SnapshotVersion, data: serde_json::Value) -> MutableDocument {
	MutableDocument::found(key(path), at, ObjectValue::from_json(&data))
}

fn doc_keys(result: &[MutableDocument]) -> Vec<String> {
	result.iter().map(|d| d.key().to_string()).collect()
}

/// Allocates the query's target, feeds the documents through one remote
/// event with all keys matching, and marks the view limbo-free at that
/// snapshot so incremental execution is eligible.
fn seed_synced_target(
	store: &mut LocalStore<MemoryPersistence>,
	query: &Query,
	at: SnapshotVersion,
	docs: Vec<MutableDocument>,
) -> TargetId {
	let target_data = store.allocate_target(query.to_target().clone());
	let target_id = target_data.target_id();

	let keys: DocumentKeySet = docs.iter().map(|d| d.key().clone()).collect();
	let mut changes = BTreeMap::new();
	changes.insert(
		target_id,
		TargetChange {
			resume_token: b"resume".to_vec(),
			added_documents: keys.clone(),
			..TargetChange::default()
		},
	);
	let event = RemoteEvent {
		snapshot_version: at,
		target_changes: changes,
		document_updates: docs.into_iter().map(|d| (d.key().clone(), d)).collect(),
		limbo_document_changes: DocumentKeySet::new(),
	};
	store.apply_remote_event(&event).unwrap();

	store
		.notify_local_view_changes(vec![LocalViewChanges {
			target_id,
			from_cache: false,
			added_keys: keys,
			removed_keys: DocumentKeySet::new(),
		}])
		.unwrap();

	target_id
}

#[test]
fn test_limit_query_reuses_remote_keys_without_refill() {
	let mut store = new_store();
	let query = coll_query()
		.adding_order_by(OrderBy::ascending(field("n")))
		.with_limit_to_first(1);

	seed_synced_target(
		&mut store,
		&query,
		version(10),
		vec![
			found_doc("coll/a", version(5), json!({"n": 1})),
			found_doc("coll/b", version(5), json!({"n": 2})),
		],
	);

	let result = store.execute_query(&query, true);
	assert_eq!(doc_keys(&result.documents), ["coll/a"]);
	assert_eq!(result.remote_keys.len(), 2);
}

#[test]
fn test_pending_write_on_limit_edge_forces_full_scan() {
	let mut store = new_store();
	let query = coll_query()
		.adding_order_by(OrderBy::ascending(field("n")))
		.with_limit_to_first(1);

	seed_synced_target(
		&mut store,
		&query,
		version(10),
		vec![
			found_doc("coll/a", version(5), json!({"n": 1})),
			found_doc("coll/b", version(5), json!({"n": 2})),
		],
	);

	// The pending patch moves coll/a past coll/b, so the old top-1 can no
	// longer be trusted; the refill path must rerun as a scan and surface
	// coll/b as the new smallest.
	store
		.write_locally(vec![Mutation::patch(
			key("coll/a"),
			ObjectValue::from_json(&json!({"n": 3})),
			FieldMask::from_paths([field("n")]),
			Precondition::Exists(true),
		)])
		.unwrap();

	let result = store.execute_query(&query, true);
	assert_eq!(doc_keys(&result.documents), ["coll/b"]);
	assert_eq!(result.documents[0].field(&field("n")), Some(&Value::Integer(2)));
}

#[test]
fn test_limit_to_last_edge_is_the_first_document() {
	let mut store = new_store();
	let query = coll_query()
		.adding_order_by(OrderBy::ascending(field("n")))
		.with_limit_to_last(1);

	seed_synced_target(
		&mut store,
		&query,
		version(10),
		vec![
			found_doc("coll/a", version(5), json!({"n": 1})),
			found_doc("coll/b", version(5), json!({"n": 2})),
		],
	);

	// Without local changes, limit-to-last returns the largest.
	let result = store.execute_query(&query, true);
	assert_eq!(doc_keys(&result.documents), ["coll/b"]);

	// A pending write on the first document (the limit edge for
	// limit-to-last) invalidates incremental execution; the full scan picks
	// up its new position.
	store
		.write_locally(vec![Mutation::patch(
			key("coll/a"),
			ObjectValue::from_json(&json!({"n": 9})),
			FieldMask::from_paths([field("n")]),
			Precondition::Exists(true),
		)])
		.unwrap();

	let result = store.execute_query(&query, true);
	assert_eq!(doc_keys(&result.documents), ["coll/a"]);
}

#[test]
fn test_document_leaving_the_result_set_forces_refill() {
	let mut store = new_store();
	let query = coll_query()
		.adding_filter(filter("live", Operator::Equal, json!(true)))
		.adding_order_by(OrderBy::ascending(field("n")))
		.with_limit_to_first(2);

	// coll/c is cached from before the limbo-free snapshot and is not part
	// of the target's remote keys; only a full scan can find it.
	let early = RemoteEvent {
		snapshot_version: version(9),
		target_changes: BTreeMap::new(),
		document_updates: [(
			key("coll/c"),
			found_doc("coll/c", version(9), json!({"live": true, "n": 3})),
		)]
		.into_iter()
		.collect(),
		limbo_document_changes: DocumentKeySet::new(),
	};
	store.apply_remote_event(&early).unwrap();

	seed_synced_target(
		&mut store,
		&query,
		version(10),
		vec![
			found_doc("coll/a", version(10), json!({"live": true, "n": 1})),
			found_doc("coll/b", version(10), json!({"live": true, "n": 2})),
		],
	);

	// coll/a stops matching; the remote keys still list it, so the count
	// mismatch invalidates incremental execution, and the full scan must
	// pull coll/c into the top-2.
	let update = RemoteEvent {
		snapshot_version: version(12),
		target_changes: BTreeMap::new(),
		document_updates: [(
			key("coll/a"),
			found_doc("coll/a", version(12), json!({"live": false, "n": 1})),
		)]
		.into_iter()
		.collect(),
		limbo_document_changes: DocumentKeySet::new(),
	};
	store.apply_remote_event(&update).unwrap();

	let result = store.execute_query(&query, true);
	assert_eq!(doc_keys(&result.documents), ["coll/b", "coll/c"]);
}

#[test]
fn test_updates_after_limbo_free_snapshot_are_merged() {
	let mut store = new_store();
	let query = coll_query().adding_filter(filter("live", Operator::Equal, json!(true)));

	seed_synced_target(
		&mut store,
		&query,
		version(10),
		vec![found_doc("coll/a", version(5), json!({"live": true}))],
	);

	// A later remote event delivers another matching document that the
	// target has not reported yet.
	let event = RemoteEvent {
		snapshot_version: version(12),
		target_changes: BTreeMap::new(),
		document_updates: [(
			key("coll/b"),
			found_doc("coll/b", version(12), json!({"live": true})),
		)]
		.into_iter()
		.collect(),
		limbo_document_changes: DocumentKeySet::new(),
	};
	store.apply_remote_event(&event).unwrap();

	let result = store.execute_query(&query, true);
	assert_eq!(doc_keys(&result.documents), ["coll/a", "coll/b"]);
}

#[test]
fn test_composite_and_or_with_in_expansion_semantics() {
	let mut store = new_store();

	for (path, a, b) in [
		("coll/w", 1, 2),
		("coll/x", 1, 3),
		("coll/y", 1, 4),
		("coll/z", 2, 2),
	] {
		let event = RemoteEvent {
			snapshot_version: version(5),
			target_changes: BTreeMap::new(),
			document_updates: [(
				key(path),
				found_doc(path, version(5), json!({"a": a, "b": b})),
			)]
			.into_iter()
			.collect(),
			limbo_document_changes: DocumentKeySet::new(),
		};
		store.apply_remote_event(&event).unwrap();
	}

	// (a == 1) AND (b IN [2, 3]) matches exactly the docs its DNF terms
	// (a==1 AND b==2) OR (a==1 AND b==3) match.
	let composite = Filter::Composite(CompositeFilter::and(vec![
		filter("a", Operator::Equal, json!(1)),
		filter("b", Operator::In, json!([2, 3])),
	]));
	let query = coll_query().adding_filter(composite);

	let result = store.execute_query(&query, false);
	assert_eq!(doc_keys(&result.documents), ["coll/w", "coll/x"]);
}

#[test]
fn test_index_served_query() {
	let mut store = new_store();

	let docs: Vec<MutableDocument> = (1..=5)
		.map(|i| found_doc(&format!("coll/d{}", i), version(i), json!({ "n": i })))
		.collect();
	let event = RemoteEvent {
		snapshot_version: version(6),
		target_changes: BTreeMap::new(),
		document_updates: docs.into_iter().map(|d| (d.key().clone(), d)).collect(),
		limbo_document_changes: DocumentKeySet::new(),
	};
	store.apply_remote_event(&event).unwrap();

	store.index_manager().write().add_field_index(FieldIndex::new(
		FieldIndex::UNKNOWN_ID,
		"coll",
		vec![Segment { field_path: field("n"), kind: SegmentKind::Ascending }],
		IndexState::default(),
	));

	// Backfill in two passes of three documents each.
	let backfiller = IndexBackfiller::new(cumulo_local::BackfillerConfig {
		max_documents_to_process: 3,
	});
	assert_eq!(backfiller.write_index_entries(&mut store), 3);
	assert_eq!(backfiller.write_index_entries(&mut store), 2);

	let query = coll_query().adding_filter(filter("n", Operator::GreaterThan, json!(2)));
	assert_eq!(
		store.index_manager().read().index_type(query.to_target()),
		IndexType::Full
	);

	let result = store.execute_query(&query, false);
	assert_eq!(doc_keys(&result.documents), ["coll/d3", "coll/d4", "coll/d5"]);
}

#[test]
fn test_index_results_merge_documents_written_after_backfill() {
	let mut store = new_store();

	let event = RemoteEvent {
		snapshot_version: version(2),
		target_changes: BTreeMap::new(),
		document_updates: [(
			key("coll/a"),
			found_doc("coll/a", version(1), json!({"n": 10})),
		)]
		.into_iter()
		.collect(),
		limbo_document_changes: DocumentKeySet::new(),
	};
	store.apply_remote_event(&event).unwrap();

	store.index_manager().write().add_field_index(FieldIndex::new(
		FieldIndex::UNKNOWN_ID,
		"coll",
		vec![Segment { field_path: field("n"), kind: SegmentKind::Ascending }],
		IndexState::default(),
	));
	let backfiller = IndexBackfiller::new(cumulo_local::BackfillerConfig::default());
	backfiller.write_index_entries(&mut store);

	// This write lands after the offset; the engine has to merge it with
	// the indexed results.
	store
		.write_locally(vec![Mutation::set(
			key("coll/b"),
			ObjectValue::from_json(&json!({"n": 20})),
		)])
		.unwrap();

	let query = coll_query().adding_filter(filter("n", Operator::GreaterThan, json!(5)));
	let result = store.execute_query(&query, false);
	assert_eq!(doc_keys(&result.documents), ["coll/a", "coll/b"]);
}

#[test]
fn test_order_by_direction_and_key_tiebreak() {
	let mut store = new_store();

	for (path, n) in [("coll/b", 1), ("coll/a", 1), ("coll/c", 2)] {
		store
			.write_locally(vec![Mutation::set(
				key(path),
				ObjectValue::from_json(&json!({ "n": n })),
			)])
			.unwrap();
	}

	let ascending = coll_query().adding_order_by(OrderBy::ascending(field("n")));
	let result = store.execute_query(&ascending, false);
	assert_eq!(doc_keys(&result.documents), ["coll/a", "coll/b", "coll/c"]);

	let descending = coll_query()
		.adding_order_by(OrderBy::new(field("n"), cumulo_query::Direction::Descending));
	let result = store.execute_query(&descending, false);
	assert_eq!(doc_keys(&result.documents), ["coll/c", "coll/b", "coll/a"]);
}

#[test]
fn test_missing_order_by_field_excludes_documents() {
	let mut store = new_store();
	store
		.write_locally(vec![
			Mutation::set(key("coll/with"), ObjectValue::from_json(&json!({"n": 1}))),
			Mutation::set(key("coll/without"), ObjectValue::from_json(&json!({"m": 1}))),
		])
		.unwrap();

	let query = coll_query().adding_order_by(OrderBy::ascending(field("n")));
	let result = store.execute_query(&query, false);
	assert_eq!(doc_keys(&result.documents), ["coll/with"]);
}

// vim: ts=4
