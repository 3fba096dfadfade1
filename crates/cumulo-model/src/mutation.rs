//! Mutations and field transforms.
//!
//! A mutation is a self-contained change to one document: Set replaces it,
//! Patch updates masked fields, Delete tombstones it, and Verify only
//! asserts a precondition at commit time. Field transforms attached to Set
//! and Patch run after value application.

use std::collections::BTreeSet;

use cumulo_types::key::DocumentKey;
use cumulo_types::path::FieldPath;
use cumulo_types::prelude::*;
use cumulo_types::value::Value;

use crate::document::MutableDocument;
use crate::object_value::{FieldMask, ObjectValue};

/// The server's result for a single committed mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationResult {
	/// The version the mutation committed at. For deletes this is the
	/// commit version of the delete.
	pub version: SnapshotVersion,
	/// One value per field transform of the mutation, in order. Empty when
	/// the mutation carried no transforms.
	pub transform_results: Vec<Value>,
}

impl MutationResult {
	pub fn new(version: SnapshotVersion) -> Self {
		Self { version, transform_results: Vec::new() }
	}

	pub fn with_transform_results(version: SnapshotVersion, transform_results: Vec<Value>) -> Self {
		Self { version, transform_results }
	}
}

/// A condition the server checks before committing a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Precondition {
	#[default]
	None,
	/// The document must (or must not) exist.
	Exists(bool),
	/// The document must exist at exactly this version.
	UpdateTime(SnapshotVersion),
}

impl Precondition {
	pub fn is_none(&self) -> bool {
		matches!(self, Precondition::None)
	}

	/// Whether a mutation with this precondition applies to the document.
	pub fn is_valid_for(&self, doc: &MutableDocument) -> bool {
		match self {
			Precondition::None => true,
			Precondition::Exists(exists) => *exists == doc.is_found_document(),
			Precondition::UpdateTime(version) => {
				doc.is_found_document() && doc.version() == *version
			}
		}
	}
}

/// A transform applied to one field after the mutation's value.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldTransform {
	pub field_path: FieldPath,
	pub operation: TransformOperation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransformOperation {
	/// Resolves to the commit time on the server; locally a pending
	/// sentinel carrying the previous value.
	ServerTimestamp,
	/// Adds a numeric operand to the field. Integer sums saturate; mixed
	/// integer/double sums become doubles.
	Increment(Value),
	/// Appends operand elements not already present.
	ArrayUnion(Vec<Value>),
	/// Removes all elements equal to any operand element.
	ArrayRemove(Vec<Value>),
}

impl TransformOperation {
	/// The value this transform produces when applied locally, before any
	/// server acknowledgement.
	pub fn apply_to_local_view(
		&self,
		previous: Option<&Value>,
		local_write_time: Timestamp,
	) -> Value {
		match self {
			TransformOperation::ServerTimestamp => {
				// A pending server timestamp keeps the pre-transform value
				// for display estimates; chains collapse to the oldest one.
				let estimate = match previous {
					Some(Value::ServerTimestamp { previous, .. }) => previous.clone(),
					Some(other) => Some(Box::new(other.clone())),
					None => None,
				};
				Value::ServerTimestamp { local_write_time, previous: estimate }
			}
			TransformOperation::Increment(operand) => increment(previous, operand),
			TransformOperation::ArrayUnion(elements) => {
				let mut result = base_array(previous);
				for element in elements {
					if !result.contains(element) {
						result.push(element.clone());
					}
				}
				Value::Array(result)
			}
			TransformOperation::ArrayRemove(elements) => {
				let mut result = base_array(previous);
				result.retain(|existing| !elements.contains(existing));
				Value::Array(result)
			}
		}
	}

	/// The value this transform produces once the server acknowledged it.
	/// Server timestamps and increments use the server-computed result; the
	/// array transforms are computed locally because the server does not
	/// echo a result for them.
	pub fn apply_to_remote_document(
		&self,
		previous: Option<&Value>,
		transform_result: Value,
	) -> Value {
		match self {
			TransformOperation::ServerTimestamp | TransformOperation::Increment(_) => {
				transform_result
			}
			TransformOperation::ArrayUnion(_) | TransformOperation::ArrayRemove(_) => {
				// Reuse the local computation; the write time is irrelevant
				// for array transforms.
				self.apply_to_local_view(previous, Timestamp::default())
			}
		}
	}

	/// The base value to record before applying a non-idempotent transform,
	/// or `None` for idempotent transforms.
	pub fn compute_base_value(&self, previous: Option<&Value>) -> Option<Value> {
		match self {
			TransformOperation::Increment(_) => Some(match previous {
				Some(value) if value.is_number() => value.clone(),
				_ => Value::Integer(0),
			}),
			_ => None,
		}
	}
}

fn increment(previous: Option<&Value>, operand: &Value) -> Value {
	let base = match previous {
		Some(value) if value.is_number() => value.clone(),
		_ => Value::Integer(0),
	};
	match (&base, operand) {
		(Value::Integer(x), Value::Integer(y)) => Value::Integer(x.saturating_add(*y)),
		_ => Value::Double(as_double(&base) + as_double(operand)),
	}
}

fn as_double(value: &Value) -> f64 {
	match value {
		Value::Integer(i) => *i as f64,
		Value::Double(d) => *d,
		_ => 0.0,
	}
}

fn base_array(previous: Option<&Value>) -> Vec<Value> {
	match previous {
		Some(Value::Array(values)) => values.clone(),
		_ => Vec::new(),
	}
}

#[derive(Debug, Clone, PartialEq)]
enum MutationData {
	Set(ObjectValue),
	Patch { value: ObjectValue, mask: FieldMask },
	Delete,
	Verify,
}

/// A self-contained change to a single document.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
	key: DocumentKey,
	data: MutationData,
	precondition: Precondition,
	field_transforms: Vec<FieldTransform>,
}

impl Mutation {
	pub fn set(key: DocumentKey, value: ObjectValue) -> Self {
		Self::set_with_transforms(key, value, Vec::new())
	}

	pub fn set_with_transforms(
		key: DocumentKey,
		value: ObjectValue,
		field_transforms: Vec<FieldTransform>,
	) -> Self {
		Self {
			key,
			data: MutationData::Set(value),
			precondition: Precondition::None,
			field_transforms,
		}
	}

	pub fn patch(
		key: DocumentKey,
		value: ObjectValue,
		mask: FieldMask,
		precondition: Precondition,
	) -> Self {
		Self::patch_with_transforms(key, value, mask, precondition, Vec::new())
	}

	pub fn patch_with_transforms(
		key: DocumentKey,
		value: ObjectValue,
		mask: FieldMask,
		precondition: Precondition,
		field_transforms: Vec<FieldTransform>,
	) -> Self {
		Self { key, data: MutationData::Patch { value, mask }, precondition, field_transforms }
	}

	pub fn delete(key: DocumentKey, precondition: Precondition) -> Self {
		Self { key, data: MutationData::Delete, precondition, field_transforms: Vec::new() }
	}

	pub fn verify(key: DocumentKey, precondition: Precondition) -> Self {
		Self { key, data: MutationData::Verify, precondition, field_transforms: Vec::new() }
	}

	pub fn key(&self) -> &DocumentKey {
		&self.key
	}

	pub fn precondition(&self) -> &Precondition {
		&self.precondition
	}

	pub fn field_transforms(&self) -> &[FieldTransform] {
		&self.field_transforms
	}

	/// The mask of fields this mutation writes, or `None` when it replaces
	/// or deletes the whole document.
	pub fn field_mask(&self) -> Option<&FieldMask> {
		match &self.data {
			MutationData::Patch { mask, .. } => Some(mask),
			_ => None,
		}
	}

	pub fn is_set(&self) -> bool {
		matches!(self.data, MutationData::Set(_))
	}

	pub fn is_patch(&self) -> bool {
		matches!(self.data, MutationData::Patch { .. })
	}

	pub fn is_delete(&self) -> bool {
		matches!(self.data, MutationData::Delete)
	}

	pub fn is_verify(&self) -> bool {
		matches!(self.data, MutationData::Verify)
	}

	/// Applies an acknowledged mutation. The server committed it, so the
	/// precondition held there: a failing local precondition check means the
	/// cache is stale and the document becomes Unknown at the commit
	/// version.
	pub fn apply_to_remote_document(&self, doc: &mut MutableDocument, result: &MutationResult) {
		debug_assert_eq!(self.key, *doc.key(), "mutation applied to wrong document");
		match &self.data {
			MutationData::Set(value) => {
				let mut new_data = value.clone();
				new_data.set_all(self.server_transform_results(doc, &result.transform_results));
				doc.convert_to_found(result.version, new_data);
				doc.set_has_committed_mutations();
			}
			MutationData::Patch { value, mask } => {
				if !self.precondition.is_valid_for(doc) {
					doc.convert_to_unknown(result.version);
					return;
				}
				let transform_results =
					self.server_transform_results(doc, &result.transform_results);
				let mut data = doc.data().clone();
				data.set_all(patch_changes(value, mask));
				data.set_all(transform_results);
				doc.convert_to_found(result.version, data);
				doc.set_has_committed_mutations();
			}
			MutationData::Delete => {
				// The delete is stored at its commit version so that any
				// older document version from the server is discarded.
				doc.convert_to_no_document(result.version);
				doc.set_has_committed_mutations();
			}
			MutationData::Verify => {}
		}
	}

	/// Applies this mutation for latency compensation, before any server
	/// acknowledgement. Returns the accumulated mask of mutated fields:
	/// `None` means the whole document was replaced or deleted.
	pub fn apply_to_local_view(
		&self,
		doc: &mut MutableDocument,
		previous_mask: Option<FieldMask>,
		local_write_time: Timestamp,
	) -> Option<FieldMask> {
		debug_assert_eq!(self.key, *doc.key(), "mutation applied to wrong document");
		if !self.precondition.is_valid_for(doc) {
			return previous_mask;
		}
		match &self.data {
			MutationData::Set(value) => {
				let transform_results = self.local_transform_results(doc, local_write_time);
				let mut new_data = value.clone();
				new_data.set_all(transform_results);
				// A document the server does not know about yet stays at
				// version zero until it confirms.
				let version =
					if doc.is_found_document() { doc.version() } else { SnapshotVersion::NONE };
				doc.convert_to_found(version, new_data);
				doc.set_has_local_mutations();
				None
			}
			MutationData::Patch { value, mask } => {
				let transform_results = self.local_transform_results(doc, local_write_time);
				let mut data = doc.data().clone();
				data.set_all(patch_changes(value, mask));
				data.set_all(transform_results);
				doc.convert_to_found(doc.version(), data);
				doc.set_has_local_mutations();
				previous_mask.map(|previous| {
					let mut merged = previous.union(mask);
					for transform in &self.field_transforms {
						merged.insert(transform.field_path.clone());
					}
					merged
				})
			}
			MutationData::Delete => {
				doc.convert_to_no_document(SnapshotVersion::NONE);
				doc.set_has_local_mutations();
				None
			}
			MutationData::Verify => previous_mask,
		}
	}

	/// Records the pre-transform state of every non-idempotent transform so
	/// replays against newer base documents stay stable.
	pub fn extract_transform_base_value(&self, doc: &MutableDocument) -> Option<ObjectValue> {
		let mut base: Option<ObjectValue> = None;
		for transform in &self.field_transforms {
			let previous = doc.field(&transform.field_path);
			if let Some(coerced) = transform.operation.compute_base_value(previous) {
				base.get_or_insert_with(ObjectValue::new).set(&transform.field_path, coerced);
			}
		}
		base
	}

	/// Computes the single mutation equivalent to the accumulated local
	/// changes on `doc`. `mask` is the accumulated mutated-field mask from
	/// replaying the queue; `None` means the document was replaced wholesale
	/// and the overlay is a Set (or Delete for missing documents).
	pub fn calculate_overlay_mutation(
		doc: &MutableDocument,
		mask: Option<&FieldMask>,
	) -> Option<Mutation> {
		if !doc.has_local_mutations() {
			return None;
		}
		match mask {
			None => {
				if doc.is_no_document() {
					Some(Mutation::delete(doc.key().clone(), Precondition::None))
				} else {
					Some(Mutation::set(doc.key().clone(), doc.data().clone()))
				}
			}
			Some(mask) if mask.is_empty() => None,
			Some(mask) => {
				let mut patch_value = ObjectValue::new();
				let mut patch_mask = BTreeSet::new();
				for path in mask.iter() {
					let mut path = path.clone();
					if patch_mask.contains(&path) {
						continue;
					}
					let mut value = doc.data().get(&path);
					if value.is_none() && path.len() > 1 {
						// A deleted nested field is covered by its parent.
						path = path.pop_last();
						value = doc.data().get(&path);
					}
					match value {
						Some(value) => patch_value.set(&path, value.clone()),
						None => patch_value.delete(&path),
					}
					patch_mask.insert(path);
				}
				Some(Mutation::patch(
					doc.key().clone(),
					patch_value,
					FieldMask::from_set(patch_mask),
					Precondition::None,
				))
			}
		}
	}

	fn local_transform_results(
		&self,
		doc: &MutableDocument,
		local_write_time: Timestamp,
	) -> Vec<(FieldPath, Option<Value>)> {
		self.field_transforms
			.iter()
			.map(|transform| {
				let previous = doc.field(&transform.field_path);
				let result = transform.operation.apply_to_local_view(previous, local_write_time);
				(transform.field_path.clone(), Some(result))
			})
			.collect()
	}

	fn server_transform_results(
		&self,
		doc: &MutableDocument,
		server_results: &[Value],
	) -> Vec<(FieldPath, Option<Value>)> {
		debug_assert_eq!(
			self.field_transforms.len(),
			server_results.len(),
			"server transform count mismatch"
		);
		self.field_transforms
			.iter()
			.zip(server_results.iter())
			.map(|(transform, server_value)| {
				let previous = doc.field(&transform.field_path);
				let result =
					transform.operation.apply_to_remote_document(previous, server_value.clone());
				(transform.field_path.clone(), Some(result))
			})
			.collect()
	}
}

/// Expands a patch into per-path changes: masked paths present in the value
/// are set, masked paths absent from the value are deleted.
fn patch_changes(value: &ObjectValue, mask: &FieldMask) -> Vec<(FieldPath, Option<Value>)> {
	mask.iter().map(|path| (path.clone(), value.get(path).cloned())).collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn key() -> DocumentKey {
		DocumentKey::parse("coll/doc").unwrap()
	}

	fn version(seconds: i64) -> SnapshotVersion {
		SnapshotVersion::new(Timestamp::new(seconds, 0))
	}

	fn field(path: &str) -> FieldPath {
		FieldPath::from_server_format(path).unwrap()
	}

	fn found(seconds: i64, data: serde_json::Value) -> MutableDocument {
		MutableDocument::found(key(), version(seconds), ObjectValue::from_json(&data))
	}

	#[test]
	fn test_set_applies_locally() {
		let mut doc = found(3, json!({"old": true}));
		let mutation = Mutation::set(key(), ObjectValue::from_json(&json!({"x": 1})));

		let mask = mutation.apply_to_local_view(&mut doc, Some(FieldMask::default()), Timestamp::now());

		assert!(mask.is_none(), "set replaces every field");
		assert!(doc.has_local_mutations());
		assert_eq!(doc.version(), version(3));
		assert_eq!(doc.data(), &ObjectValue::from_json(&json!({"x": 1})));
	}

	#[test]
	fn test_set_on_missing_document_stays_at_version_zero() {
		let mut doc = MutableDocument::no_document(key(), version(3));
		let mutation = Mutation::set(key(), ObjectValue::from_json(&json!({"x": 1})));

		mutation.apply_to_local_view(&mut doc, None, Timestamp::now());

		assert!(doc.is_found_document());
		assert!(doc.version().is_none());
	}

	#[test]
	fn test_patch_applies_mask_only() {
		let mut doc = found(3, json!({"a": {"b": 1}, "keep": true}));
		let mutation = Mutation::patch(
			key(),
			ObjectValue::from_json(&json!({"a": {"b": 2}})),
			FieldMask::from_paths([field("a.b"), field("gone")]),
			Precondition::Exists(true),
		);

		let mask = mutation.apply_to_local_view(&mut doc, Some(FieldMask::default()), Timestamp::now());

		assert_eq!(doc.data(), &ObjectValue::from_json(&json!({"a": {"b": 2}, "keep": true})));
		let mask = mask.unwrap();
		assert!(mask.contains(&field("a.b")));
		assert!(mask.contains(&field("gone")), "masked-but-absent paths are deletions");
	}

	#[test]
	fn test_patch_skips_when_precondition_fails() {
		let mut doc = MutableDocument::no_document(key(), version(3));
		let before = doc.clone();
		let mutation = Mutation::patch(
			key(),
			ObjectValue::from_json(&json!({"x": 1})),
			FieldMask::from_paths([field("x")]),
			Precondition::Exists(true),
		);

		mutation.apply_to_local_view(&mut doc, None, Timestamp::now());

		assert_eq!(doc, before, "failed precondition leaves the document untouched");
	}

	#[test]
	fn test_delete_tombstones_locally() {
		let mut doc = found(3, json!({"x": 1}));
		let mutation = Mutation::delete(key(), Precondition::None);

		let mask = mutation.apply_to_local_view(&mut doc, None, Timestamp::now());

		assert!(mask.is_none());
		assert!(doc.is_no_document());
		assert!(doc.version().is_none());
		assert!(doc.has_local_mutations());
	}

	#[test]
	fn test_remote_patch_with_stale_cache_becomes_unknown() {
		let mut doc = MutableDocument::no_document(key(), version(3));
		let mutation = Mutation::patch(
			key(),
			ObjectValue::from_json(&json!({"x": 1})),
			FieldMask::from_paths([field("x")]),
			Precondition::Exists(true),
		);

		mutation.apply_to_remote_document(&mut doc, &MutationResult::new(version(7)));

		assert!(doc.is_unknown_document());
		assert_eq!(doc.version(), version(7));
	}

	#[test]
	fn test_remote_delete_uses_commit_version() {
		let mut doc = found(3, json!({"x": 1}));
		Mutation::delete(key(), Precondition::None)
			.apply_to_remote_document(&mut doc, &MutationResult::new(version(9)));

		assert!(doc.is_no_document());
		assert_eq!(doc.version(), version(9));
		assert!(doc.has_committed_mutations());
	}

	#[test]
	fn test_increment_transform() {
		let op = TransformOperation::Increment(Value::Integer(5));

		assert_eq!(op.apply_to_local_view(Some(&Value::Integer(1)), Timestamp::default()), Value::Integer(6));
		assert_eq!(op.apply_to_local_view(None, Timestamp::default()), Value::Integer(5));
		assert_eq!(
			op.apply_to_local_view(Some(&Value::String("nan".into())), Timestamp::default()),
			Value::Integer(5),
			"non-numeric previous values coerce to zero"
		);
		assert_eq!(
			op.apply_to_local_view(Some(&Value::Integer(i64::MAX)), Timestamp::default()),
			Value::Integer(i64::MAX),
			"integer overflow saturates"
		);
		assert_eq!(
			TransformOperation::Increment(Value::Double(0.5))
				.apply_to_local_view(Some(&Value::Integer(1)), Timestamp::default()),
			Value::Double(1.5)
		);
	}

	#[test]
	fn test_array_transforms() {
		let union = TransformOperation::ArrayUnion(vec![Value::Integer(2), Value::Integer(3)]);
		let previous = Value::from_json(&json!([1, 2]));
		assert_eq!(
			union.apply_to_local_view(Some(&previous), Timestamp::default()),
			Value::from_json(&json!([1, 2, 3]))
		);

		let remove = TransformOperation::ArrayRemove(vec![Value::Integer(1)]);
		assert_eq!(
			remove.apply_to_local_view(Some(&previous), Timestamp::default()),
			Value::from_json(&json!([2]))
		);
		assert_eq!(
			remove.apply_to_local_view(Some(&Value::Boolean(true)), Timestamp::default()),
			Value::from_json(&json!([])),
			"non-array previous values coerce to the empty array"
		);
	}

	#[test]
	fn test_server_timestamp_keeps_estimate() {
		let write_time = Timestamp::new(100, 0);
		let op = TransformOperation::ServerTimestamp;

		let first = op.apply_to_local_view(Some(&Value::Integer(1)), write_time);
		let Value::ServerTimestamp { previous, .. } = &first else {
			panic!("expected a pending server timestamp");
		};
		assert_eq!(previous.as_deref(), Some(&Value::Integer(1)));

		// Chained pending timestamps keep the original estimate.
		let second = op.apply_to_local_view(Some(&first), Timestamp::new(200, 0));
		let Value::ServerTimestamp { previous, .. } = &second else {
			panic!("expected a pending server timestamp");
		};
		assert_eq!(previous.as_deref(), Some(&Value::Integer(1)));
	}

	#[test]
	fn test_extract_transform_base_value() {
		let doc = found(1, json!({"counter": 7, "name": "x"}));
		let mutation = Mutation::patch_with_transforms(
			key(),
			ObjectValue::new(),
			FieldMask::default(),
			Precondition::None,
			vec![
				FieldTransform {
					field_path: field("counter"),
					operation: TransformOperation::Increment(Value::Integer(1)),
				},
				FieldTransform {
					field_path: field("stamp"),
					operation: TransformOperation::ServerTimestamp,
				},
			],
		);

		let base = mutation.extract_transform_base_value(&doc).unwrap();
		assert_eq!(base.get(&field("counter")), Some(&Value::Integer(7)));
		assert_eq!(base.get(&field("stamp")), None, "idempotent transforms record no base");
	}

	#[test]
	fn test_overlay_mutation_for_whole_document() {
		let mut doc = found(1, json!({}));
		Mutation::set(key(), ObjectValue::from_json(&json!({"x": 1})))
			.apply_to_local_view(&mut doc, None, Timestamp::now());

		let overlay = Mutation::calculate_overlay_mutation(&doc, None).unwrap();
		assert!(overlay.is_set());

		let mut deleted = found(1, json!({}));
		Mutation::delete(key(), Precondition::None).apply_to_local_view(&mut deleted, None, Timestamp::now());
		let overlay = Mutation::calculate_overlay_mutation(&deleted, None).unwrap();
		assert!(overlay.is_delete());
	}

	#[test]
	fn test_overlay_mutation_for_masked_changes() {
		let mut doc = found(1, json!({"a": {"b": 1}, "z": 9}));
		let patch = Mutation::patch(
			key(),
			ObjectValue::from_json(&json!({"a": {"b": 2}})),
			FieldMask::from_paths([field("a.b"), field("z")]),
			Precondition::Exists(true),
		);
		let mask = patch.apply_to_local_view(&mut doc, Some(FieldMask::default()), Timestamp::now());

		let overlay = Mutation::calculate_overlay_mutation(&doc, mask.as_ref()).unwrap();
		assert!(overlay.is_patch());

		// Applying the overlay to the pre-mutation state reproduces the doc.
		let mut replay = found(1, json!({"a": {"b": 1}, "z": 9}));
		overlay.apply_to_local_view(&mut replay, None, Timestamp::now());
		assert_eq!(replay.data(), doc.data());
	}

	#[test]
	fn test_overlay_mutation_without_local_changes() {
		let doc = found(1, json!({"x": 1}));
		assert!(Mutation::calculate_overlay_mutation(&doc, None).is_none());
	}
}

// vim: ts=4
