//! Persistence contracts.
//!
//! The local store reads and writes through these component traits; the
//! byte-level backend behind them only has to provide transactional
//! semantics and the iteration orders documented per method. All access is
//! serialized by the worker, so implementations need no internal locking;
//! the shared handles exist so the store, the documents view, and the query
//! engine can reference the same component.

use std::sync::Arc;

use parking_lot::RwLock;

use cumulo_model::{
	DocumentKeySet, DocumentMap, FieldIndex, IndexOffset, MutableDocument, Mutation,
	MutationBatch, Overlay,
};
use cumulo_query::{Query, Target, TargetData};
use cumulo_types::key::DocumentKey;
use cumulo_types::path::ResourcePath;
use cumulo_types::prelude::*;
use cumulo_types::types::User;

pub type SharedMutationQueue = Arc<RwLock<dyn MutationQueue + Send + Sync>>;
pub type SharedRemoteDocumentCache = Arc<RwLock<dyn RemoteDocumentCache + Send + Sync>>;
pub type SharedDocumentOverlayCache = Arc<RwLock<dyn DocumentOverlayCache + Send + Sync>>;
pub type SharedIndexManager = Arc<RwLock<dyn IndexManager + Send + Sync>>;
pub type SharedTargetCache = Arc<RwLock<dyn TargetCache + Send + Sync>>;

/// An ordered, ack-gated queue of pending write batches, scoped to one user.
///
/// Batch ids are strictly increasing, and acknowledged batches leave the
/// queue strictly in batch-id order.
pub trait MutationQueue {
	/// Prepares the queue after startup or a user change.
	fn start(&mut self);

	fn is_empty(&self) -> bool;

	/// Assigns the next batch id and persists the batch.
	fn add_mutation_batch(
		&mut self,
		local_write_time: Timestamp,
		base_mutations: Vec<Mutation>,
		mutations: Vec<Mutation>,
	) -> CuResult<MutationBatch>;

	/// Records the batch as acknowledged and stores the stream token.
	fn acknowledge_batch(&mut self, batch: &MutationBatch, stream_token: Vec<u8>) -> CuResult<()>;

	/// Removes the batch. Only the lowest-id batch may be removed; removing
	/// out of order is an error.
	fn remove_mutation_batch(&mut self, batch: &MutationBatch) -> CuResult<()>;

	fn lookup_mutation_batch(&self, batch_id: BatchId) -> Option<MutationBatch>;

	/// The first batch with an id strictly greater than `batch_id`, used by
	/// the write stream to feed the server.
	fn next_mutation_batch_after_batch_id(&self, batch_id: BatchId) -> Option<MutationBatch>;

	/// The largest batch id that has been written, acknowledged or not.
	/// `BatchId::NONE` when the queue has never held a batch.
	fn highest_unacknowledged_batch_id(&self) -> BatchId;

	fn all_mutation_batches(&self) -> Vec<MutationBatch>;

	fn all_mutation_batches_affecting_document_key(&self, key: &DocumentKey)
	-> Vec<MutationBatch>;

	fn all_mutation_batches_affecting_document_keys(
		&self,
		keys: &DocumentKeySet,
	) -> Vec<MutationBatch>;

	/// Every batch containing a mutation on a document directly inside the
	/// query's collection path.
	fn all_mutation_batches_affecting_query(&self, query: &Query) -> Vec<MutationBatch>;

	fn last_stream_token(&self) -> Vec<u8>;

	fn set_last_stream_token(&mut self, token: Vec<u8>);

	/// Verifies queue invariants; the queue must be empty when no batches
	/// are pending.
	fn perform_consistency_check(&self) -> CuResult<()>;
}

/// Keyed cache of the authoritative server documents, with a secondary
/// (read-time, key) ordering for range scans.
pub trait RemoteDocumentCache {
	/// Adds or replaces a document, tagging it with its read time.
	fn add(&mut self, document: MutableDocument, read_time: SnapshotVersion);

	fn remove(&mut self, key: &DocumentKey);

	/// The cached document, or an invalid placeholder on a miss.
	fn get(&self, key: &DocumentKey) -> MutableDocument;

	/// Batch lookup. Missing keys surface as invalid placeholders.
	fn get_all(&self, keys: &DocumentKeySet) -> DocumentMap;

	/// Scans a collection group past the offset in (read-time, key) order,
	/// up to `limit` documents. Used by index backfill.
	fn get_all_in_collection_group(
		&self,
		collection_group: &str,
		offset: &IndexOffset,
		limit: usize,
	) -> DocumentMap;

	/// Scans the query's collection for documents past the offset.
	/// `mutated_keys` forces inclusion of documents with pending mutations
	/// regardless of their remote read time.
	fn get_matching(
		&self,
		query: &Query,
		offset: &IndexOffset,
		mutated_keys: &DocumentKeySet,
	) -> DocumentMap;

	/// Every cached key. Used by garbage collection.
	fn keys(&self) -> DocumentKeySet;
}

/// At most one overlay mutation per document key, tagged with its largest
/// contributing batch id, scoped to one user.
pub trait DocumentOverlayCache {
	fn get_overlay(&self, key: &DocumentKey) -> Option<Overlay>;

	fn get_overlays(&self, keys: &DocumentKeySet) -> std::collections::BTreeMap<DocumentKey, Overlay>;

	/// Saves the overlays under the batch id, replacing any previous
	/// overlay for the same keys.
	fn save_overlays(
		&mut self,
		largest_batch_id: BatchId,
		overlays: std::collections::BTreeMap<DocumentKey, Mutation>,
	);

	fn remove_overlays_for_batch_id(&mut self, batch_id: BatchId);

	/// Overlays for documents directly inside `collection` whose largest
	/// batch id is greater than `since_batch_id`.
	fn get_overlays_in_collection(
		&self,
		collection: &ResourcePath,
		since_batch_id: BatchId,
	) -> std::collections::BTreeMap<DocumentKey, Overlay>;

	/// Overlays for a collection group past `since_batch_id`, in batch-id
	/// order, returning whole batches until `count` is reached.
	fn get_overlays_in_collection_group(
		&self,
		collection_group: &str,
		since_batch_id: BatchId,
		count: usize,
	) -> std::collections::BTreeMap<DocumentKey, Overlay>;
}

/// How completely an index can serve a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
	/// No index covers the target.
	None,
	/// An index covers some of the target's constraints; results are a
	/// superset and limits must not be applied at the index level.
	Partial,
	/// An index covers every constraint of the target.
	Full,
}

/// Collection-parent bookkeeping and optional field-value indexes.
pub trait IndexManager {
	/// Records that a collection with this path exists. Safe to call
	/// repeatedly.
	fn add_to_collection_parent_index(&mut self, collection_path: &ResourcePath);

	/// Every parent location (document path or root) containing a
	/// collection with the given id.
	fn collection_parents(&self, collection_id: &str) -> Vec<ResourcePath>;

	fn add_field_index(&mut self, index: FieldIndex);

	fn delete_field_index(&mut self, index: &FieldIndex);

	fn field_indexes(&self) -> Vec<FieldIndex>;

	fn field_indexes_for_group(&self, collection_group: &str) -> Vec<FieldIndex>;

	/// Classifies how completely configured indexes can serve the target.
	fn index_type(&self, target: &Target) -> IndexType;

	/// Candidate keys for the target from its indexes, or `None` when the
	/// target is not index-served. Candidates are a superset of the
	/// matching documents that have been indexed so far.
	fn documents_matching_target(&self, target: &Target) -> Option<Vec<DocumentKey>>;

	/// The smallest backfill offset across the indexes serving the target.
	fn min_offset(&self, target: &Target) -> IndexOffset;

	fn min_offset_for_collection_group(&self, collection_group: &str) -> IndexOffset;

	/// The collection group whose indexes have waited longest for backfill.
	fn next_collection_group_to_update(&self) -> Option<String>;

	/// Advances the offset of every index of the group and bumps their
	/// sequence numbers so other groups get their turn.
	fn update_collection_group(&mut self, collection_group: &str, offset: IndexOffset);

	/// Indexes the given documents into every matching field index.
	fn update_index_entries(&mut self, documents: &DocumentMap);
}

/// Target metadata keyed by target id and by canonical target, plus the
/// per-target matching-key sets and the global remote snapshot watermark.
pub trait TargetCache {
	fn add_target(&mut self, data: TargetData);

	fn update_target(&mut self, data: TargetData);

	/// Removes the target's metadata and its matching keys.
	fn remove_target(&mut self, data: &TargetData);

	fn get_target(&self, target: &Target) -> Option<TargetData>;

	fn target_count(&self) -> usize;

	fn all_target_data(&self) -> Vec<TargetData>;

	fn highest_target_id(&self) -> TargetId;

	fn highest_sequence_number(&self) -> ListenSequenceNumber;

	fn last_remote_snapshot_version(&self) -> SnapshotVersion;

	fn set_last_remote_snapshot_version(&mut self, version: SnapshotVersion);

	fn add_matching_keys(&mut self, keys: &DocumentKeySet, target_id: TargetId);

	fn remove_matching_keys(&mut self, keys: &DocumentKeySet, target_id: TargetId);

	fn matching_keys(&self, target_id: TargetId) -> DocumentKeySet;

	/// Whether any target's matching keys reference the document.
	fn contains_key(&self, key: &DocumentKey) -> bool;
}

/// The umbrella over all components, owning the transaction boundary.
///
/// Every public local-store operation runs inside exactly one transaction:
/// `begin_transaction`, synchronous reads and writes, `commit_transaction`.
/// Per-user components (mutation queue, overlays) are created on first use.
pub trait Persistence {
	fn mutation_queue(&mut self, user: &User) -> SharedMutationQueue;

	fn document_overlay_cache(&mut self, user: &User) -> SharedDocumentOverlayCache;

	fn remote_document_cache(&self) -> SharedRemoteDocumentCache;

	fn index_manager(&self) -> SharedIndexManager;

	fn target_cache(&self) -> SharedTargetCache;

	/// The sequence number of the current transaction.
	fn current_sequence_number(&self) -> ListenSequenceNumber;

	fn begin_transaction(&mut self, label: &str);

	fn commit_transaction(&mut self);

	/// Whether overlays must be rebuilt before the store starts serving.
	/// Cleared with `set_overlay_migration_complete` once the rebuild
	/// committed.
	fn overlay_migration_pending(&self) -> bool;

	fn set_overlay_migration_complete(&mut self);
}

// vim: ts=4
