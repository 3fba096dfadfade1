//! In-memory target cache.

use std::collections::HashMap;

use cumulo::key::DocumentKey;
use cumulo::prelude::*;
use cumulo_local::{ReferenceSet, TargetCache};
use cumulo_model::DocumentKeySet;
use cumulo_query::{Target, TargetData};

/// Target metadata by id with a canonical-id lookup, the per-target
/// matching-key reference set, and the global snapshot watermark.
#[derive(Default)]
pub struct MemoryTargetCache {
	targets: HashMap<TargetId, TargetData>,
	target_ids_by_canonical_id: HashMap<String, Vec<TargetId>>,
	references: ReferenceSet,
	highest_target_id: TargetId,
	highest_sequence_number: ListenSequenceNumber,
	last_remote_snapshot_version: SnapshotVersion,
}

impl MemoryTargetCache {
	pub fn new() -> Self {
		Self::default()
	}
}

impl TargetCache for MemoryTargetCache {
	fn add_target(&mut self, data: TargetData) {
		let target_id = data.target_id();
		let canonical_id = data.target().canonical_id();

		self.highest_target_id = self.highest_target_id.max(target_id);
		self.highest_sequence_number = self.highest_sequence_number.max(data.sequence_number());

		self.target_ids_by_canonical_id.entry(canonical_id).or_default().push(target_id);
		self.targets.insert(target_id, data);
	}

	fn update_target(&mut self, data: TargetData) {
		self.highest_sequence_number = self.highest_sequence_number.max(data.sequence_number());
		self.targets.insert(data.target_id(), data);
	}

	fn remove_target(&mut self, data: &TargetData) {
		let target_id = data.target_id();
		if self.targets.remove(&target_id).is_none() {
			return;
		}
		let canonical_id = data.target().canonical_id();
		if let Some(ids) = self.target_ids_by_canonical_id.get_mut(&canonical_id) {
			ids.retain(|id| *id != target_id);
			if ids.is_empty() {
				self.target_ids_by_canonical_id.remove(&canonical_id);
			}
		}
		self.references.remove_references_for_id(target_id);
	}

	fn get_target(&self, target: &Target) -> Option<TargetData> {
		// Canonical ids may collide in principle; verify target equality.
		let ids = self.target_ids_by_canonical_id.get(&target.canonical_id())?;
		ids.iter()
			.filter_map(|id| self.targets.get(id))
			.find(|data| data.target() == target)
			.cloned()
	}

	fn target_count(&self) -> usize {
		self.targets.len()
	}

	fn all_target_data(&self) -> Vec<TargetData> {
		self.targets.values().cloned().collect()
	}

	fn highest_target_id(&self) -> TargetId {
		self.highest_target_id
	}

	fn highest_sequence_number(&self) -> ListenSequenceNumber {
		self.highest_sequence_number
	}

	fn last_remote_snapshot_version(&self) -> SnapshotVersion {
		self.last_remote_snapshot_version
	}

	fn set_last_remote_snapshot_version(&mut self, version: SnapshotVersion) {
		self.last_remote_snapshot_version = version;
	}

	fn add_matching_keys(&mut self, keys: &DocumentKeySet, target_id: TargetId) {
		self.references.add_references(keys, target_id);
	}

	fn remove_matching_keys(&mut self, keys: &DocumentKeySet, target_id: TargetId) {
		self.references.remove_references(keys, target_id);
	}

	fn matching_keys(&self, target_id: TargetId) -> DocumentKeySet {
		self.references.references_for_id(target_id)
	}

	fn contains_key(&self, key: &DocumentKey) -> bool {
		self.references.contains_key(key)
	}
}

// vim: ts=4
