//! Query execution strategies.
//!
//! A query runs one of three ways: from a field index, incrementally from
//! the keys the server last reported for its target, or as a full
//! collection scan. The incremental strategies are only sound for limit
//! queries when the previous result set is provably still the top-k; the
//! refill check guards that and falls back to a scan otherwise.

use cumulo_model::{DocumentKeySet, DocumentMap, IndexOffset, MutableDocument};
use cumulo_query::{LimitType, Query};
use cumulo_types::prelude::*;

use crate::local_documents::LocalDocumentsView;
use crate::persistence::{IndexType, SharedIndexManager};

pub struct QueryEngine {
	local_documents: LocalDocumentsView,
	index_manager: SharedIndexManager,
}

impl QueryEngine {
	pub fn new(local_documents: LocalDocumentsView) -> Self {
		let index_manager = local_documents.index_manager().clone();
		Self { local_documents, index_manager }
	}

	/// Executes the query against the local caches, returning matching
	/// documents in query order with the limit applied.
	pub fn get_documents_matching_query(
		&self,
		query: &Query,
		last_limbo_free_snapshot_version: SnapshotVersion,
		remote_keys: &DocumentKeySet,
	) -> Vec<MutableDocument> {
		if let Some(result) = self.perform_query_using_index(query) {
			return result;
		}
		if let Some(result) = self.perform_query_using_remote_keys(
			query,
			remote_keys,
			last_limbo_free_snapshot_version,
		) {
			return result;
		}
		self.execute_full_collection_scan(query)
	}

	fn perform_query_using_index(&self, query: &Query) -> Option<Vec<MutableDocument>> {
		if query.matches_all_documents() {
			// A plain collection scan beats an index walk here.
			return None;
		}

		let target = query.to_target();
		let index_type = self.index_manager.read().index_type(target);
		if index_type == IndexType::None {
			return None;
		}

		if query.limit().is_some() && index_type == IndexType::Partial {
			// A partial index may return a superset or a differently
			// ordered set, so the limit can only be applied in memory after
			// every candidate is known.
			return self.perform_query_using_index(&query.without_limit());
		}

		let keys = self.index_manager.read().documents_matching_target(target)?;
		let indexed_keys: DocumentKeySet = keys.into_iter().collect();
		let indexed_documents = self.local_documents.get_documents(&indexed_keys);
		let offset = self.index_manager.read().min_offset(target);

		let previous_results = self.apply_query(query, indexed_documents);
		if self.needs_refill(query, &previous_results, &indexed_keys, offset.read_time()) {
			return self.perform_query_using_index(&query.without_limit());
		}

		Some(self.append_remaining_results(query, previous_results, &offset))
	}

	fn perform_query_using_remote_keys(
		&self,
		query: &Query,
		remote_keys: &DocumentKeySet,
		last_limbo_free_snapshot_version: SnapshotVersion,
	) -> Option<Vec<MutableDocument>> {
		if query.matches_all_documents() {
			return None;
		}
		// Without a limbo-free baseline the remote keys prove nothing.
		if last_limbo_free_snapshot_version.is_none() {
			return None;
		}

		let documents = self.local_documents.get_documents(remote_keys);
		let previous_results = self.apply_query(query, documents);

		if query.limit().is_some()
			&& self.needs_refill(
				query,
				&previous_results,
				remote_keys,
				last_limbo_free_snapshot_version,
			) {
			return None;
		}

		debug!(
			"re-using previous result from {} to execute query: {}",
			last_limbo_free_snapshot_version,
			query.canonical_id()
		);

		// Pick up anything that changed since the baseline snapshot.
		let offset = IndexOffset::create_successor(last_limbo_free_snapshot_version);
		Some(self.append_remaining_results(query, previous_results, &offset))
	}

	fn execute_full_collection_scan(&self, query: &Query) -> Vec<MutableDocument> {
		debug!("using full collection scan to execute query: {}", query.canonical_id());
		let documents = self.local_documents.get_documents_matching_query(query, &IndexOffset::none());
		self.sort_and_limit(query, documents)
	}

	/// Re-applies the filter (previously matching documents may no longer
	/// match) and sorts by the query order. The limit is NOT applied here;
	/// the refill check needs the full candidate list.
	fn apply_query(&self, query: &Query, documents: DocumentMap) -> Vec<MutableDocument> {
		let mut results: Vec<MutableDocument> = documents
			.into_values()
			.filter(|doc| doc.is_found_document() && query.matches(doc))
			.collect();
		results.sort_by(|a, b| query.compare_docs(a, b));
		results
	}

	/// A limit query's incremental result is invalid if a document may have
	/// left the set (count mismatch) or if the document at the limit edge
	/// has an uncertain sort position (pending writes, or changed after the
	/// baseline snapshot).
	fn needs_refill(
		&self,
		query: &Query,
		sorted_previous_results: &[MutableDocument],
		remote_keys: &DocumentKeySet,
		limbo_free_snapshot_version: SnapshotVersion,
	) -> bool {
		if query.limit().is_none() {
			return false;
		}

		if remote_keys.len() != sorted_previous_results.len() {
			// A previously matching document dropped out.
			return true;
		}

		// Only a change to the edge document can move the limit boundary;
		// interior reorderings stay inside it.
		let edge = match query.limit_type() {
			LimitType::First => sorted_previous_results.last(),
			LimitType::Last => sorted_previous_results.first(),
		};
		let Some(edge) = edge else {
			return false;
		};
		edge.has_pending_writes() || edge.version() > limbo_free_snapshot_version
	}

	/// Merges documents updated past `offset` into the incremental results,
	/// then sorts and applies the limit.
	fn append_remaining_results(
		&self,
		query: &Query,
		previous_results: Vec<MutableDocument>,
		offset: &IndexOffset,
	) -> Vec<MutableDocument> {
		let mut merged = self.local_documents.get_documents_matching_query(query, offset);
		for doc in previous_results {
			merged.insert(doc.key().clone(), doc);
		}
		self.sort_and_limit(query, merged)
	}

	fn sort_and_limit(&self, query: &Query, documents: DocumentMap) -> Vec<MutableDocument> {
		let mut results: Vec<MutableDocument> = documents.into_values().collect();
		results.sort_by(|a, b| query.compare_docs(a, b));
		if let Some(limit) = query.limit() {
			let limit = usize::try_from(limit).unwrap_or(0);
			match query.limit_type() {
				LimitType::First => results.truncate(limit),
				LimitType::Last => {
					if results.len() > limit {
						results.drain(..results.len() - limit);
					}
				}
			}
		}
		results
	}
}

// vim: ts=4
