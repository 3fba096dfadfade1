//! The merged local view of documents.
//!
//! Combines the remote document cache, the mutation queue, and the overlay
//! cache into the documents the user actually sees: server state with every
//! pending write applied.

use std::collections::BTreeMap;

use cumulo_model::{
	DocumentKeySet, DocumentMap, FieldMask, IndexOffset, MutableDocument, Mutation, Overlay,
	OverlayedDocument,
};
use cumulo_query::Query;
use cumulo_types::key::DocumentKey;
use cumulo_types::prelude::*;

use crate::persistence::{
	SharedDocumentOverlayCache, SharedIndexManager, SharedMutationQueue,
	SharedRemoteDocumentCache,
};

/// Read path over the three caches. Cheap to clone; clones share the same
/// underlying components.
#[derive(Clone)]
pub struct LocalDocumentsView {
	remote_document_cache: SharedRemoteDocumentCache,
	mutation_queue: SharedMutationQueue,
	document_overlay_cache: SharedDocumentOverlayCache,
	index_manager: SharedIndexManager,
}

impl LocalDocumentsView {
	pub fn new(
		remote_document_cache: SharedRemoteDocumentCache,
		mutation_queue: SharedMutationQueue,
		document_overlay_cache: SharedDocumentOverlayCache,
		index_manager: SharedIndexManager,
	) -> Self {
		Self { remote_document_cache, mutation_queue, document_overlay_cache, index_manager }
	}

	pub fn index_manager(&self) -> &SharedIndexManager {
		&self.index_manager
	}

	/// The local view of a single document: the base document with its
	/// overlay applied.
	pub fn get_document(&self, key: &DocumentKey) -> MutableDocument {
		let overlay = self.document_overlay_cache.read().get_overlay(key);
		let mut document = self.get_base_document(key, overlay.as_ref());
		if let Some(overlay) = overlay {
			overlay.mutation().apply_to_local_view(&mut document, None, Timestamp::now());
		}
		document
	}

	/// Batch form of `get_document`. Missing documents surface as invalid
	/// placeholders.
	pub fn get_documents(&self, keys: &DocumentKeySet) -> DocumentMap {
		let docs = self.remote_document_cache.read().get_all(keys);
		self.get_local_view_of_documents(docs, &DocumentKeySet::new())
	}

	/// Applies overlays to the given base documents. Documents in
	/// `existence_state_changed` whose overlay is a patch (or missing) are
	/// recomputed from the queue, because a remote existence flip may have
	/// toggled a patch precondition.
	pub fn get_local_view_of_documents(
		&self,
		docs: DocumentMap,
		existence_state_changed: &DocumentKeySet,
	) -> DocumentMap {
		let views = self.get_overlayed_documents_impl(docs, existence_state_changed);
		views.into_iter().map(|(key, overlayed)| (key, overlayed.document)).collect()
	}

	/// Like `get_local_view_of_documents`, but keeps the per-document
	/// mutated-field masks for overlay computation during writes.
	pub fn get_overlayed_documents(
		&self,
		docs: DocumentMap,
	) -> BTreeMap<DocumentKey, OverlayedDocument> {
		self.get_overlayed_documents_impl(docs, &DocumentKeySet::new())
	}

	fn get_overlayed_documents_impl(
		&self,
		docs: DocumentMap,
		existence_state_changed: &DocumentKeySet,
	) -> BTreeMap<DocumentKey, OverlayedDocument> {
		let keys: DocumentKeySet = docs.keys().cloned().collect();
		let overlays = self.document_overlay_cache.read().get_overlays(&keys);
		self.compute_views(docs, &overlays, existence_state_changed)
	}

	fn compute_views(
		&self,
		mut docs: DocumentMap,
		overlays: &BTreeMap<DocumentKey, Overlay>,
		existence_state_changed: &DocumentKeySet,
	) -> BTreeMap<DocumentKey, OverlayedDocument> {
		let mut recalculate = DocumentMap::new();
		let mut mutated_fields: BTreeMap<DocumentKey, Option<FieldMask>> = BTreeMap::new();
		let now = Timestamp::now();

		for (key, doc) in &mut docs {
			let overlay = overlays.get(key);
			let overlay_is_patch = overlay.is_some_and(|o| o.mutation().is_patch());
			if existence_state_changed.contains(key) && (overlay.is_none() || overlay_is_patch) {
				// The patch precondition may have started or stopped
				// matching; replay the queue for this document.
				recalculate.insert(key.clone(), doc.clone());
			} else if let Some(overlay) = overlay {
				mutated_fields.insert(key.clone(), overlay.mutation().field_mask().cloned());
				overlay.mutation().apply_to_local_view(
					doc,
					overlay.mutation().field_mask().cloned(),
					now,
				);
			} else {
				mutated_fields.insert(key.clone(), Some(FieldMask::default()));
			}
		}

		let recalculated_fields = self.recalculate_and_save_overlays(&mut recalculate);
		mutated_fields.extend(recalculated_fields);
		for (key, doc) in recalculate {
			docs.insert(key, doc);
		}

		docs.into_iter()
			.map(|(key, document)| {
				let fields = mutated_fields.get(&key).cloned().unwrap_or_default();
				(key, OverlayedDocument { document, mutated_fields: fields })
			})
			.collect()
	}

	/// Replays the mutation queue over the given base documents, saving the
	/// resulting net overlay per key grouped under the largest contributing
	/// batch id. Returns the accumulated mutated-field masks.
	fn recalculate_and_save_overlays(
		&self,
		docs: &mut DocumentMap,
	) -> BTreeMap<DocumentKey, Option<FieldMask>> {
		let keys: DocumentKeySet = docs.keys().cloned().collect();
		if keys.is_empty() {
			return BTreeMap::new();
		}
		let batches =
			self.mutation_queue.read().all_mutation_batches_affecting_document_keys(&keys);

		let mut masks: BTreeMap<DocumentKey, Option<FieldMask>> = BTreeMap::new();
		let mut documents_by_batch_id: BTreeMap<BatchId, DocumentKeySet> = BTreeMap::new();

		for batch in &batches {
			for key in batch.keys() {
				let Some(base_doc) = docs.get_mut(&key) else { continue };
				let mask =
					masks.get(&key).cloned().unwrap_or_else(|| Some(FieldMask::default()));
				let mask = batch.apply_to_local_view(base_doc, mask);
				masks.insert(key.clone(), mask);
				documents_by_batch_id.entry(batch.batch_id()).or_default().insert(key);
			}
		}

		// Save each key's overlay under the newest batch that touched it.
		let mut processed = DocumentKeySet::new();
		for (batch_id, batch_keys) in documents_by_batch_id.iter().rev() {
			let mut overlays: BTreeMap<DocumentKey, Mutation> = BTreeMap::new();
			for key in batch_keys {
				if processed.contains(key) {
					continue;
				}
				if let Some(doc) = docs.get(key) {
					let mask = masks.get(key).and_then(Option::as_ref);
					if let Some(mutation) = Mutation::calculate_overlay_mutation(doc, mask) {
						overlays.insert(key.clone(), mutation);
					}
				}
				processed.insert(key.clone());
			}
			self.document_overlay_cache.write().save_overlays(*batch_id, overlays);
		}

		masks
	}

	/// Recomputes and saves overlays for the given keys from their remote
	/// base documents.
	pub fn recalculate_and_save_overlays_for_keys(&self, keys: &DocumentKeySet) {
		let mut docs = self.remote_document_cache.read().get_all(keys);
		self.recalculate_and_save_overlays(&mut docs);
	}

	/// Every local document matching the query, reading documents changed
	/// past `offset`.
	pub fn get_documents_matching_query(
		&self,
		query: &Query,
		offset: &IndexOffset,
	) -> DocumentMap {
		if query.is_document_query() {
			self.get_documents_matching_document_query(query)
		} else if query.is_collection_group_query() {
			self.get_documents_matching_collection_group_query(query, offset)
		} else {
			self.get_documents_matching_collection_query(query, offset)
		}
	}

	fn get_documents_matching_document_query(&self, query: &Query) -> DocumentMap {
		let mut results = DocumentMap::new();
		if let Ok(key) = DocumentKey::from_path(query.path().clone()) {
			let doc = self.get_document(&key);
			if doc.is_found_document() {
				results.insert(key, doc);
			}
		}
		results
	}

	fn get_documents_matching_collection_group_query(
		&self,
		query: &Query,
		offset: &IndexOffset,
	) -> DocumentMap {
		debug_assert!(
			query.path().is_empty(),
			"collection group queries are only supported at the root"
		);
		let Some(collection_id) = query.collection_group_id() else {
			return DocumentMap::new();
		};
		let parents = self.index_manager.read().collection_parents(collection_id);

		// Run a collection query against each parent containing the group
		// and aggregate the results.
		let mut results = DocumentMap::new();
		for parent in parents {
			let collection_query =
				query.as_collection_query_at_path(parent.append(collection_id));
			results.extend(self.get_documents_matching_collection_query(&collection_query, offset));
		}
		results
	}

	fn get_documents_matching_collection_query(
		&self,
		query: &Query,
		offset: &IndexOffset,
	) -> DocumentMap {
		let overlays = self
			.document_overlay_cache
			.read()
			.get_overlays_in_collection(query.path(), offset.largest_batch_id());
		let mutated_keys: DocumentKeySet = overlays.keys().cloned().collect();
		let mut remote_documents =
			self.remote_document_cache.read().get_matching(query, offset, &mutated_keys);

		// Documents may match only because of their overlay, so the overlay
		// keys join the candidate set even without a remote base.
		for key in overlays.keys() {
			remote_documents
				.entry(key.clone())
				.or_insert_with(|| MutableDocument::invalid(key.clone()));
		}

		let now = Timestamp::now();
		let mut results = DocumentMap::new();
		for (key, mut doc) in remote_documents {
			if let Some(overlay) = overlays.get(&key) {
				overlay.mutation().apply_to_local_view(
					&mut doc,
					Some(FieldMask::default()),
					now,
				);
			}
			if query.matches(&doc) {
				results.insert(key, doc);
			}
		}
		results
	}

	/// The next chunk of documents for index backfill: up to `count`
	/// documents of the collection group past `offset`, local view applied.
	/// Returns the largest overlay batch id seen alongside the documents.
	pub fn get_next_documents(
		&self,
		collection_group: &str,
		offset: &IndexOffset,
		count: usize,
	) -> (BatchId, DocumentMap) {
		let mut docs = self.remote_document_cache.read().get_all_in_collection_group(
			collection_group,
			offset,
			count,
		);
		let overlays = if docs.len() < count {
			self.document_overlay_cache.read().get_overlays_in_collection_group(
				collection_group,
				offset.largest_batch_id(),
				count - docs.len(),
			)
		} else {
			BTreeMap::new()
		};

		let mut largest_batch_id = BatchId::NONE;
		for overlay in overlays.values() {
			largest_batch_id = largest_batch_id.max(overlay.largest_batch_id());
			docs.entry(overlay.key().clone())
				.or_insert_with(|| self.get_base_document(overlay.key(), Some(overlay)));
		}

		let keys: DocumentKeySet = docs.keys().cloned().collect();
		let all_overlays = self.document_overlay_cache.read().get_overlays(&keys);
		let views = self.compute_views(docs, &all_overlays, &DocumentKeySet::new());
		let documents =
			views.into_iter().map(|(key, overlayed)| (key, overlayed.document)).collect();
		(largest_batch_id, documents)
	}

	/// A Set or Delete overlay replaces the document wholesale, so the base
	/// does not need to be read; patches apply on top of the remote base.
	fn get_base_document(
		&self,
		key: &DocumentKey,
		overlay: Option<&Overlay>,
	) -> MutableDocument {
		match overlay {
			None => self.remote_document_cache.read().get(key),
			Some(overlay) if overlay.mutation().is_patch() => {
				self.remote_document_cache.read().get(key)
			}
			Some(_) => MutableDocument::invalid(key.clone()),
		}
	}
}

// vim: ts=4
