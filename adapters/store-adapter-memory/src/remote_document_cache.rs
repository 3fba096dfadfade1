//! In-memory remote document cache.

use std::collections::BTreeMap;

use cumulo::key::DocumentKey;
use cumulo::path::ResourcePath;
use cumulo::prelude::*;
use cumulo_local::RemoteDocumentCache;
use cumulo_model::{DocumentKeySet, DocumentMap, IndexOffset, MutableDocument};
use cumulo_query::Query;

/// Documents keyed by their path so collection scans are ordered prefix
/// scans, mirroring how a persistent backend would range over its primary
/// key space.
#[derive(Debug, Default)]
pub struct MemoryRemoteDocumentCache {
	docs: BTreeMap<ResourcePath, Entry>,
}

#[derive(Debug)]
struct Entry {
	document: MutableDocument,
	read_time: SnapshotVersion,
}

impl MemoryRemoteDocumentCache {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.docs.len()
	}

	pub fn is_empty(&self) -> bool {
		self.docs.is_empty()
	}
}

impl RemoteDocumentCache for MemoryRemoteDocumentCache {
	fn add(&mut self, mut document: MutableDocument, read_time: SnapshotVersion) {
		document.set_read_time(read_time);
		let path = document.key().path().clone();
		self.docs.insert(path, Entry { document, read_time });
	}

	fn remove(&mut self, key: &DocumentKey) {
		self.docs.remove(key.path());
	}

	fn get(&self, key: &DocumentKey) -> MutableDocument {
		match self.docs.get(key.path()) {
			Some(entry) => entry.document.clone(),
			None => MutableDocument::invalid(key.clone()),
		}
	}

	fn get_all(&self, keys: &DocumentKeySet) -> DocumentMap {
		keys.iter().map(|key| (key.clone(), self.get(key))).collect()
	}

	fn get_all_in_collection_group(
		&self,
		collection_group: &str,
		offset: &IndexOffset,
		limit: usize,
	) -> DocumentMap {
		// Order by (read-time, key) so the backfill offset advances
		// deterministically.
		let mut matching: Vec<(&SnapshotVersion, &MutableDocument)> = self
			.docs
			.values()
			.filter(|entry| {
				entry.document.key().collection_id() == collection_group
					&& offset.comes_before(entry.read_time, entry.document.key())
			})
			.map(|entry| (&entry.read_time, &entry.document))
			.collect();
		matching.sort_by(|(time_a, doc_a), (time_b, doc_b)| {
			time_a.cmp(time_b).then_with(|| doc_a.key().cmp(doc_b.key()))
		});
		matching
			.into_iter()
			.take(limit)
			.map(|(_, doc)| (doc.key().clone(), doc.clone()))
			.collect()
	}

	fn get_matching(
		&self,
		query: &Query,
		offset: &IndexOffset,
		mutated_keys: &DocumentKeySet,
	) -> DocumentMap {
		let collection = query.path();
		let mut results = DocumentMap::new();

		for (path, entry) in self.docs.range(collection.clone()..) {
			if !collection.is_prefix_of(path) {
				break;
			}
			// Only direct children; nested collections have their own scans.
			if !collection.is_immediate_parent_of(path) {
				continue;
			}
			let key = entry.document.key();
			if offset.comes_before(entry.read_time, key) || mutated_keys.contains(key) {
				results.insert(key.clone(), entry.document.clone());
			}
		}
		results
	}

	fn keys(&self) -> DocumentKeySet {
		self.docs.values().map(|entry| entry.document.key().clone()).collect()
	}
}

// vim: ts=4
