//! Two-sided references between document keys and target ids.

use std::collections::{BTreeMap, BTreeSet};

use cumulo_model::DocumentKeySet;
use cumulo_types::key::DocumentKey;
use cumulo_types::prelude::*;

/// A set of (key, id) references queryable from both sides: which documents
/// does a target pin, and is a document pinned at all.
#[derive(Debug, Default)]
pub struct ReferenceSet {
	ids_by_key: BTreeMap<DocumentKey, BTreeSet<TargetId>>,
	keys_by_id: BTreeMap<TargetId, DocumentKeySet>,
}

impl ReferenceSet {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_empty(&self) -> bool {
		self.ids_by_key.is_empty()
	}

	pub fn add_reference(&mut self, key: &DocumentKey, id: TargetId) {
		self.ids_by_key.entry(key.clone()).or_default().insert(id);
		self.keys_by_id.entry(id).or_default().insert(key.clone());
	}

	pub fn add_references(&mut self, keys: &DocumentKeySet, id: TargetId) {
		for key in keys {
			self.add_reference(key, id);
		}
	}

	pub fn remove_reference(&mut self, key: &DocumentKey, id: TargetId) {
		if let Some(ids) = self.ids_by_key.get_mut(key) {
			ids.remove(&id);
			if ids.is_empty() {
				self.ids_by_key.remove(key);
			}
		}
		if let Some(keys) = self.keys_by_id.get_mut(&id) {
			keys.remove(key);
			if keys.is_empty() {
				self.keys_by_id.remove(&id);
			}
		}
	}

	pub fn remove_references(&mut self, keys: &DocumentKeySet, id: TargetId) {
		for key in keys {
			self.remove_reference(key, id);
		}
	}

	/// Removes every reference held by `id` and returns the keys that were
	/// referenced.
	pub fn remove_references_for_id(&mut self, id: TargetId) -> DocumentKeySet {
		let keys = self.keys_by_id.remove(&id).unwrap_or_default();
		for key in &keys {
			if let Some(ids) = self.ids_by_key.get_mut(key) {
				ids.remove(&id);
				if ids.is_empty() {
					self.ids_by_key.remove(key);
				}
			}
		}
		keys
	}

	pub fn references_for_id(&self, id: TargetId) -> DocumentKeySet {
		self.keys_by_id.get(&id).cloned().unwrap_or_default()
	}

	pub fn contains_key(&self, key: &DocumentKey) -> bool {
		self.ids_by_key.contains_key(key)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn key(path: &str) -> DocumentKey {
		DocumentKey::parse(path).unwrap()
	}

	#[test]
	fn test_add_and_remove() {
		let mut set = ReferenceSet::new();
		set.add_reference(&key("coll/a"), TargetId(1));
		set.add_reference(&key("coll/a"), TargetId(2));
		set.add_reference(&key("coll/b"), TargetId(1));

		assert!(set.contains_key(&key("coll/a")));
		assert_eq!(set.references_for_id(TargetId(1)).len(), 2);

		set.remove_reference(&key("coll/a"), TargetId(1));
		assert!(set.contains_key(&key("coll/a")), "still pinned by target 2");

		set.remove_reference(&key("coll/a"), TargetId(2));
		assert!(!set.contains_key(&key("coll/a")));
	}

	#[test]
	fn test_remove_references_for_id() {
		let mut set = ReferenceSet::new();
		set.add_reference(&key("coll/a"), TargetId(1));
		set.add_reference(&key("coll/b"), TargetId(1));
		set.add_reference(&key("coll/b"), TargetId(2));

		let removed = set.remove_references_for_id(TargetId(1));
		assert_eq!(removed.len(), 2);
		assert!(!set.contains_key(&key("coll/a")));
		assert!(set.contains_key(&key("coll/b")), "reference from target 2 remains");
		assert!(set.references_for_id(TargetId(1)).is_empty());
	}
}

// vim: ts=4
