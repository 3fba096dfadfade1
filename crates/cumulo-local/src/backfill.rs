//! Index backfill.
//!
//! Field indexes are populated in the background: each pass picks the
//! collection group that has waited longest, reads a bounded chunk of
//! documents past the group's offset, writes index entries, and advances
//! the offset.

use std::collections::HashSet;

use cumulo_model::{DocumentMap, IndexOffset};
use cumulo_types::prelude::*;

use crate::local_store::LocalStore;
use crate::persistence::Persistence;

#[derive(Debug, Clone)]
pub struct BackfillerConfig {
	/// Documents processed per pass, across all collection groups.
	pub max_documents_to_process: usize,
}

impl Default for BackfillerConfig {
	fn default() -> Self {
		Self { max_documents_to_process: 50 }
	}
}

#[derive(Debug, Default)]
pub struct IndexBackfiller {
	config: BackfillerConfig,
}

impl IndexBackfiller {
	pub fn new(config: BackfillerConfig) -> Self {
		Self { config }
	}

	/// Runs one backfill pass. Returns the number of documents processed.
	pub fn write_index_entries<P: Persistence>(&self, store: &mut LocalStore<P>) -> usize {
		let mut processed_groups: HashSet<String> = HashSet::new();
		let mut documents_remaining = self.config.max_documents_to_process;

		while documents_remaining > 0 {
			let group = store.index_manager().read().next_collection_group_to_update();
			let Some(group) = group else { break };
			if processed_groups.contains(&group) {
				break;
			}
			debug!("backfilling collection group: {}", group);
			documents_remaining -=
				self.write_entries_for_collection_group(store, &group, documents_remaining);
			processed_groups.insert(group);
		}

		self.config.max_documents_to_process - documents_remaining
	}

	fn write_entries_for_collection_group<P: Persistence>(
		&self,
		store: &mut LocalStore<P>,
		collection_group: &str,
		documents_remaining: usize,
	) -> usize {
		// The earliest offset across the group's indexes decides where the
		// next chunk starts.
		let existing_offset =
			store.index_manager().read().min_offset_for_collection_group(collection_group);
		let (largest_batch_id, docs) = store.local_documents().get_next_documents(
			collection_group,
			&existing_offset,
			documents_remaining,
		);
		store.index_manager().write().update_index_entries(&docs);

		let new_offset = Self::new_offset(&existing_offset, largest_batch_id, &docs);
		store.index_manager().write().update_collection_group(collection_group, new_offset);

		docs.len()
	}

	/// The furthest (read-time, key) position seen, carrying the largest
	/// overlay batch id of the chunk.
	fn new_offset(
		existing: &IndexOffset,
		largest_batch_id: BatchId,
		docs: &DocumentMap,
	) -> IndexOffset {
		let largest_batch_id = largest_batch_id.max(existing.largest_batch_id());
		let mut best: Option<IndexOffset> = None;
		for (key, doc) in docs {
			let candidate = IndexOffset::new(doc.read_time(), key.clone(), largest_batch_id);
			if best.as_ref().is_none_or(|b| candidate > *b) {
				best = Some(candidate);
			}
		}
		best.unwrap_or_else(|| existing.clone())
	}
}

// vim: ts=4
