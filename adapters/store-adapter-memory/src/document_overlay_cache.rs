//! In-memory overlay cache.

use std::collections::BTreeMap;

use cumulo::key::DocumentKey;
use cumulo::path::ResourcePath;
use cumulo::prelude::*;
use cumulo_local::DocumentOverlayCache;
use cumulo_model::{DocumentKeySet, Mutation, Overlay};

/// One overlay per document key, with a reverse index by contributing batch
/// id for invalidation on ack and reject.
#[derive(Debug, Default)]
pub struct MemoryDocumentOverlayCache {
	overlays: BTreeMap<DocumentKey, Overlay>,
	keys_by_batch_id: BTreeMap<BatchId, DocumentKeySet>,
}

impl MemoryDocumentOverlayCache {
	pub fn new() -> Self {
		Self::default()
	}

	fn save_overlay(&mut self, largest_batch_id: BatchId, mutation: Mutation) {
		let key = mutation.key().clone();
		if let Some(existing) = self.overlays.get(&key) {
			if let Some(keys) = self.keys_by_batch_id.get_mut(&existing.largest_batch_id()) {
				keys.remove(&key);
			}
		}
		self.overlays.insert(key.clone(), Overlay::new(largest_batch_id, mutation));
		self.keys_by_batch_id.entry(largest_batch_id).or_default().insert(key);
	}
}

impl DocumentOverlayCache for MemoryDocumentOverlayCache {
	fn get_overlay(&self, key: &DocumentKey) -> Option<Overlay> {
		self.overlays.get(key).cloned()
	}

	fn get_overlays(&self, keys: &DocumentKeySet) -> BTreeMap<DocumentKey, Overlay> {
		keys.iter()
			.filter_map(|key| self.overlays.get(key).map(|o| (key.clone(), o.clone())))
			.collect()
	}

	fn save_overlays(
		&mut self,
		largest_batch_id: BatchId,
		overlays: BTreeMap<DocumentKey, Mutation>,
	) {
		for mutation in overlays.into_values() {
			self.save_overlay(largest_batch_id, mutation);
		}
	}

	fn remove_overlays_for_batch_id(&mut self, batch_id: BatchId) {
		if let Some(keys) = self.keys_by_batch_id.remove(&batch_id) {
			for key in keys {
				self.overlays.remove(&key);
			}
		}
	}

	fn get_overlays_in_collection(
		&self,
		collection: &ResourcePath,
		since_batch_id: BatchId,
	) -> BTreeMap<DocumentKey, Overlay> {
		self.overlays
			.iter()
			.filter(|(key, overlay)| {
				collection.is_immediate_parent_of(key.path())
					&& overlay.largest_batch_id() > since_batch_id
			})
			.map(|(key, overlay)| (key.clone(), overlay.clone()))
			.collect()
	}

	fn get_overlays_in_collection_group(
		&self,
		collection_group: &str,
		since_batch_id: BatchId,
		count: usize,
	) -> BTreeMap<DocumentKey, Overlay> {
		// Overlays return in batch-id order, and a started batch is always
		// returned whole even when that exceeds `count`.
		let mut results = BTreeMap::new();
		let mut current_batch_id = None;
		for (batch_id, keys) in self.keys_by_batch_id.range(since_batch_id.next()..) {
			if results.len() >= count && current_batch_id != Some(*batch_id) {
				break;
			}
			current_batch_id = Some(*batch_id);
			for key in keys {
				if key.collection_id() != collection_group {
					continue;
				}
				if let Some(overlay) = self.overlays.get(key) {
					results.insert(key.clone(), overlay.clone());
				}
			}
		}
		results
	}
}

// vim: ts=4
