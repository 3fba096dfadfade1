//! Structured document data: nested field access and field masks.

use std::collections::{BTreeMap, BTreeSet};

use cumulo_types::path::FieldPath;
use cumulo_types::value::Value;

/// A set of field paths. A mask covers a path when it contains that path or
/// one of its prefixes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldMask {
	fields: BTreeSet<FieldPath>,
}

impl FieldMask {
	pub fn from_set(fields: BTreeSet<FieldPath>) -> Self {
		Self { fields }
	}

	pub fn from_paths(paths: impl IntoIterator<Item = FieldPath>) -> Self {
		Self { fields: paths.into_iter().collect() }
	}

	pub fn is_empty(&self) -> bool {
		self.fields.is_empty()
	}

	pub fn len(&self) -> usize {
		self.fields.len()
	}

	pub fn covers(&self, path: &FieldPath) -> bool {
		self.fields.iter().any(|mask_path| mask_path.is_prefix_of(path))
	}

	pub fn contains(&self, path: &FieldPath) -> bool {
		self.fields.contains(path)
	}

	pub fn insert(&mut self, path: FieldPath) {
		self.fields.insert(path);
	}

	pub fn union(&self, other: &FieldMask) -> FieldMask {
		Self { fields: self.fields.union(&other.fields).cloned().collect() }
	}

	pub fn iter(&self) -> impl Iterator<Item = &FieldPath> {
		self.fields.iter()
	}
}

/// A document's data: a map value with nested field access by `FieldPath`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectValue {
	fields: BTreeMap<String, Value>,
}

impl ObjectValue {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn from_map(fields: BTreeMap<String, Value>) -> Self {
		Self { fields }
	}

	/// Builds an object value from a JSON object. Non-object input yields an
	/// empty object.
	pub fn from_json(json: &serde_json::Value) -> Self {
		match Value::from_json(json) {
			Value::Map(fields) => Self { fields },
			_ => Self::default(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.fields.is_empty()
	}

	pub fn as_map(&self) -> &BTreeMap<String, Value> {
		&self.fields
	}

	pub fn into_value(self) -> Value {
		Value::Map(self.fields)
	}

	pub fn to_value(&self) -> Value {
		Value::Map(self.fields.clone())
	}

	/// Reads the value at `path`, walking nested maps.
	pub fn get(&self, path: &FieldPath) -> Option<&Value> {
		debug_assert!(!path.is_empty(), "cannot get the empty field path");
		let mut fields = &self.fields;
		let segments = path.segments();
		for segment in &segments[..segments.len() - 1] {
			match fields.get(segment) {
				Some(Value::Map(nested)) => fields = nested,
				_ => return None,
			}
		}
		fields.get(segments[segments.len() - 1].as_str())
	}

	/// Writes `value` at `path`, creating intermediate maps as needed.
	/// Intermediate non-map values are overwritten.
	pub fn set(&mut self, path: &FieldPath, value: Value) {
		debug_assert!(!path.is_empty(), "cannot set the empty field path");
		let mut fields = &mut self.fields;
		let segments = path.segments();
		for segment in &segments[..segments.len() - 1] {
			let entry = fields
				.entry(segment.clone())
				.and_modify(|v| {
					if !v.is_map() {
						*v = Value::map();
					}
				})
				.or_insert_with(Value::map);
			match entry {
				Value::Map(nested) => fields = nested,
				_ => unreachable!("entry was just forced to a map"),
			}
		}
		fields.insert(segments[segments.len() - 1].clone(), value);
	}

	/// Removes the value at `path`. Missing intermediate maps make this a
	/// no-op.
	pub fn delete(&mut self, path: &FieldPath) {
		debug_assert!(!path.is_empty(), "cannot delete the empty field path");
		let mut fields = &mut self.fields;
		let segments = path.segments();
		for segment in &segments[..segments.len() - 1] {
			match fields.get_mut(segment) {
				Some(Value::Map(nested)) => fields = nested,
				_ => return,
			}
		}
		fields.remove(segments[segments.len() - 1].as_str());
	}

	/// Applies a batch of writes and deletes: `Some(value)` sets the path,
	/// `None` deletes it.
	pub fn set_all(&mut self, changes: impl IntoIterator<Item = (FieldPath, Option<Value>)>) {
		for (path, change) in changes {
			match change {
				Some(value) => self.set(&path, value),
				None => self.delete(&path),
			}
		}
	}

	/// The mask of all leaf field paths in this object. An empty nested map
	/// counts as a leaf.
	pub fn field_mask(&self) -> FieldMask {
		let mut fields = BTreeSet::new();
		collect_leaf_paths(&self.fields, &FieldPath::default(), &mut fields);
		FieldMask::from_set(fields)
	}
}

fn collect_leaf_paths(
	fields: &BTreeMap<String, Value>,
	prefix: &FieldPath,
	out: &mut BTreeSet<FieldPath>,
) {
	for (name, value) in fields {
		let path = prefix.append(name.clone());
		match value {
			Value::Map(nested) if !nested.is_empty() => collect_leaf_paths(nested, &path, out),
			_ => {
				out.insert(path);
			}
		}
	}
}


// vim: ts=4
