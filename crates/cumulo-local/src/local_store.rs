//! The local store: the single entry point for writes, acknowledgements,
//! remote events, target lifecycle, queries, and garbage collection.
//!
//! Every public operation runs inside one persistence transaction on the
//! serial worker; observers always see a consistent post-transaction view.

use std::collections::HashMap;

use cumulo_model::{
	DocumentKeySet, DocumentMap, MutableDocument, Mutation, MutationBatch, MutationBatchResult,
	Precondition,
};
use cumulo_query::{Query, QueryPurpose, Target, TargetData};
use cumulo_types::error::internal;
use cumulo_types::key::DocumentKey;
use cumulo_types::prelude::*;
use cumulo_types::types::User;

use crate::local_documents::LocalDocumentsView;
use crate::persistence::{
	Persistence, SharedDocumentOverlayCache, SharedIndexManager, SharedMutationQueue,
	SharedRemoteDocumentCache, SharedTargetCache,
};
use crate::query_engine::QueryEngine;
use crate::reference_set::ReferenceSet;
use crate::remote_event::{RemoteEvent, TargetChange};

/// The maximum time to leave a resume token buffered without writing it
/// out. Long enough to coalesce writes, short enough that replay after a
/// crash stays cheap.
const RESUME_TOKEN_MAX_AGE_SECONDS: i64 = 5 * 60;

/// The result of a local write: the assigned batch id and the new local
/// view of every touched document.
#[derive(Debug)]
pub struct LocalWriteResult {
	pub batch_id: BatchId,
	pub changed_documents: DocumentMap,
}

/// The result of a query: matching documents in query order, plus the keys
/// the server reported as matching at the last snapshot.
#[derive(Debug)]
pub struct QueryResult {
	pub documents: Vec<MutableDocument>,
	pub remote_keys: DocumentKeySet,
}

/// A view's bookkeeping delta, used to pin locally relevant documents.
#[derive(Debug, Clone)]
pub struct LocalViewChanges {
	pub target_id: TargetId,
	pub from_cache: bool,
	pub added_keys: DocumentKeySet,
	pub removed_keys: DocumentKeySet,
}

/// Thresholds for sequence-number based collection.
#[derive(Debug, Clone)]
pub struct LruParams {
	/// The percentile of least-recently-used targets to collect per pass.
	pub percentile_to_collect: u32,

	/// Upper bound of targets considered in one pass.
	pub max_sequence_numbers_to_collect: usize,
}

impl Default for LruParams {
	fn default() -> Self {
		Self { percentile_to_collect: 10, max_sequence_numbers_to_collect: 1000 }
	}
}

#[derive(Debug, Clone)]
pub enum GcPolicy {
	/// Remove every document no target, view, or pending write references.
	Eager,
	/// Remove the least recently used inactive targets, then orphaned
	/// documents.
	Lru(LruParams),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GcResults {
	pub targets_removed: usize,
	pub documents_removed: usize,
}

/// Store-level configuration.
#[derive(Debug, Clone)]
pub struct LocalStoreConfig {
	/// Under eager GC, released targets are dropped from the target cache
	/// immediately; under LRU they are kept for later resumption.
	pub eager_gc: bool,
}

impl Default for LocalStoreConfig {
	fn default() -> Self {
		Self { eager_gc: true }
	}
}

/// Target ids allocated by the store advance in the even lane, leaving the
/// odd lane to the sync layer's short-lived limbo targets.
#[derive(Debug)]
struct TargetIdGenerator {
	last_id: i32,
}

impl TargetIdGenerator {
	fn for_target_cache(highest: TargetId) -> Self {
		// Force even parity; ids from other lanes round down.
		Self { last_id: highest.0 - (highest.0 % 2) }
	}

	fn next(&mut self) -> TargetId {
		self.last_id += 2;
		TargetId(self.last_id)
	}
}

pub struct LocalStore<P: Persistence> {
	persistence: P,
	user: User,
	config: LocalStoreConfig,
	mutation_queue: SharedMutationQueue,
	remote_document_cache: SharedRemoteDocumentCache,
	document_overlay_cache: SharedDocumentOverlayCache,
	index_manager: SharedIndexManager,
	target_cache: SharedTargetCache,
	local_documents: LocalDocumentsView,
	query_engine: QueryEngine,
	target_data_by_id: HashMap<TargetId, TargetData>,
	target_id_by_target: HashMap<Target, TargetId>,
	local_view_references: ReferenceSet,
	target_id_generator: TargetIdGenerator,
}

impl<P: Persistence> LocalStore<P> {
	pub fn new(mut persistence: P, user: User, config: LocalStoreConfig) -> Self {
		let mutation_queue = persistence.mutation_queue(&user);
		let document_overlay_cache = persistence.document_overlay_cache(&user);
		let remote_document_cache = persistence.remote_document_cache();
		let index_manager = persistence.index_manager();
		let target_cache = persistence.target_cache();

		let local_documents = LocalDocumentsView::new(
			remote_document_cache.clone(),
			mutation_queue.clone(),
			document_overlay_cache.clone(),
			index_manager.clone(),
		);
		let query_engine = QueryEngine::new(local_documents.clone());

		Self {
			persistence,
			user,
			config,
			mutation_queue,
			remote_document_cache,
			document_overlay_cache,
			index_manager,
			target_cache,
			local_documents,
			query_engine,
			target_data_by_id: HashMap::new(),
			target_id_by_target: HashMap::new(),
			local_view_references: ReferenceSet::new(),
			target_id_generator: TargetIdGenerator::for_target_cache(TargetId(0)),
		}
	}

	/// Prepares the store: starts the mutation queue, seeds the target id
	/// generator from persistence, and rebuilds overlays when a pending
	/// migration requires it.
	pub fn start(&mut self) -> CuResult<()> {
		self.persistence.begin_transaction("Start LocalStore");
		self.mutation_queue.write().start();
		let highest = self.target_cache.read().highest_target_id();
		self.target_id_generator = TargetIdGenerator::for_target_cache(highest);

		if self.persistence.overlay_migration_pending() {
			let mut keys = DocumentKeySet::new();
			for batch in self.mutation_queue.read().all_mutation_batches() {
				keys.extend(batch.keys());
			}
			info!("rebuilding overlays for {} documents after migration", keys.len());
			self.local_documents.recalculate_and_save_overlays_for_keys(&keys);
			self.persistence.set_overlay_migration_complete();
		}
		self.persistence.commit_transaction();
		Ok(())
	}

	pub fn user(&self) -> &User {
		&self.user
	}

	pub fn local_documents(&self) -> &LocalDocumentsView {
		&self.local_documents
	}

	pub fn index_manager(&self) -> &SharedIndexManager {
		&self.index_manager
	}

	/// Swaps in the new user's mutation queue and overlays, returning the
	/// local view of every document either user had pending writes for.
	pub fn handle_user_change(&mut self, user: User) -> DocumentMap {
		self.persistence.begin_transaction("Handle user change");
		let old_batches = self.mutation_queue.read().all_mutation_batches();

		self.user = user;
		self.mutation_queue = self.persistence.mutation_queue(&self.user);
		self.document_overlay_cache = self.persistence.document_overlay_cache(&self.user);
		self.mutation_queue.write().start();
		let new_batches = self.mutation_queue.read().all_mutation_batches();

		// The documents view must read through the new user's queue.
		self.local_documents = LocalDocumentsView::new(
			self.remote_document_cache.clone(),
			self.mutation_queue.clone(),
			self.document_overlay_cache.clone(),
			self.index_manager.clone(),
		);
		self.query_engine = QueryEngine::new(self.local_documents.clone());

		let mut changed_keys = DocumentKeySet::new();
		for batch in old_batches.iter().chain(new_batches.iter()) {
			changed_keys.extend(batch.keys());
		}
		let result = self.local_documents.get_documents(&changed_keys);
		self.persistence.commit_transaction();
		result
	}

	/// Writes a batch of mutations: records transform base values, appends
	/// the batch to the queue, and stores the replacement overlays.
	pub fn write_locally(&mut self, mutations: Vec<Mutation>) -> CuResult<LocalWriteResult> {
		let local_write_time = Timestamp::now();
		let keys: DocumentKeySet = mutations.iter().map(|m| m.key().clone()).collect();

		self.persistence.begin_transaction("Locally write mutations");
		let result = self.write_locally_impl(mutations, local_write_time, &keys);
		self.persistence.commit_transaction();
		result
	}

	fn write_locally_impl(
		&mut self,
		mutations: Vec<Mutation>,
		local_write_time: Timestamp,
		keys: &DocumentKeySet,
	) -> CuResult<LocalWriteResult> {
		// Load the current local state of every touched key so the base
		// state of non-idempotent transforms is recorded before any new
		// write applies.
		let remote_docs = self.remote_document_cache.read().get_all(keys);
		let docs_without_remote_version: DocumentKeySet = remote_docs
			.iter()
			.filter(|(_, doc)| !doc.is_valid_document())
			.map(|(key, _)| key.clone())
			.collect();
		let mut overlayed = self.local_documents.get_overlayed_documents(remote_docs);

		// Base values guarantee consistent transform results even if the
		// backend sends an update that already contains the transform.
		let mut base_mutations = Vec::new();
		for mutation in &mutations {
			if let Some(overlayed_doc) = overlayed.get(mutation.key()) {
				if let Some(base_value) =
					mutation.extract_transform_base_value(&overlayed_doc.document)
				{
					let mask = base_value.field_mask();
					base_mutations.push(Mutation::patch(
						mutation.key().clone(),
						base_value,
						mask,
						Precondition::Exists(true),
					));
				}
			}
			self.index_manager
				.write()
				.add_to_collection_parent_index(&mutation.key().collection_path());
		}

		let batch = self.mutation_queue.write().add_mutation_batch(
			local_write_time,
			base_mutations,
			mutations,
		)?;
		let overlays =
			batch.apply_to_local_document_set(&mut overlayed, &docs_without_remote_version);
		self.document_overlay_cache.write().save_overlays(batch.batch_id(), overlays);

		let changed_documents =
			overlayed.into_iter().map(|(key, od)| (key, od.document)).collect();
		Ok(LocalWriteResult { batch_id: batch.batch_id(), changed_documents })
	}

	/// Applies a server acknowledgement: reconciles the remote cache,
	/// removes the batch, and refreshes overlays for transformed keys.
	pub fn acknowledge_batch(
		&mut self,
		batch_result: &MutationBatchResult,
	) -> CuResult<DocumentMap> {
		self.persistence.begin_transaction("Acknowledge batch");
		let result = self.acknowledge_batch_impl(batch_result);
		self.persistence.commit_transaction();
		result
	}

	fn acknowledge_batch_impl(
		&mut self,
		batch_result: &MutationBatchResult,
	) -> CuResult<DocumentMap> {
		let batch = batch_result.batch();
		self.mutation_queue
			.write()
			.acknowledge_batch(batch, batch_result.stream_token().to_vec())?;
		self.apply_batch_result(batch_result)?;
		self.mutation_queue.read().perform_consistency_check()?;
		self.document_overlay_cache.write().remove_overlays_for_batch_id(batch.batch_id());
		self.local_documents
			.recalculate_and_save_overlays_for_keys(&batch_result.keys_with_transform_results());
		Ok(self.local_documents.get_documents(&batch.keys()))
	}

	fn apply_batch_result(&mut self, batch_result: &MutationBatchResult) -> CuResult<()> {
		let batch = batch_result.batch();
		for key in batch.keys() {
			let mut cached = self.remote_document_cache.read().get(&key);
			let ack_version = batch_result
				.doc_versions()
				.get(&key)
				.ok_or_else(|| internal("doc_versions should contain every doc in the write"))?;

			// Only write the acknowledged state when the cache holds
			// nothing newer.
			if !cached.is_valid_document() || cached.version() < *ack_version {
				batch.apply_to_remote_document(&mut cached, batch_result)?;
				if cached.is_valid_document() {
					self.remote_document_cache
						.write()
						.add(cached, batch_result.commit_version());
					self.index_manager
						.write()
						.add_to_collection_parent_index(&key.collection_path());
				}
			}
		}
		self.mutation_queue.write().remove_mutation_batch(batch)
	}

	/// Drops a rejected batch without touching the remote cache.
	pub fn reject_batch(&mut self, batch_id: BatchId) -> CuResult<DocumentMap> {
		self.persistence.begin_transaction("Reject batch");
		let result = self.reject_batch_impl(batch_id);
		self.persistence.commit_transaction();
		result
	}

	fn reject_batch_impl(&mut self, batch_id: BatchId) -> CuResult<DocumentMap> {
		let to_reject = self
			.mutation_queue
			.read()
			.lookup_mutation_batch(batch_id)
			.ok_or_else(|| internal("attempt to reject nonexistent batch"))?;
		self.mutation_queue.write().remove_mutation_batch(&to_reject)?;
		self.mutation_queue.read().perform_consistency_check()?;
		self.document_overlay_cache.write().remove_overlays_for_batch_id(batch_id);
		self.local_documents.recalculate_and_save_overlays_for_keys(&to_reject.keys());
		Ok(self.local_documents.get_documents(&to_reject.keys()))
	}

	pub fn last_stream_token(&self) -> Vec<u8> {
		self.mutation_queue.read().last_stream_token()
	}

	pub fn set_last_stream_token(&mut self, token: Vec<u8>) {
		self.persistence.begin_transaction("Set stream token");
		self.mutation_queue.write().set_last_stream_token(token);
		self.persistence.commit_transaction();
	}

	pub fn get_last_remote_snapshot_version(&self) -> SnapshotVersion {
		self.target_cache.read().last_remote_snapshot_version()
	}

	/// Applies one watch snapshot atomically: target membership, resume
	/// tokens, document contents, and the global snapshot watermark.
	pub fn apply_remote_event(&mut self, remote_event: &RemoteEvent) -> CuResult<DocumentMap> {
		let last_remote_version = self.target_cache.read().last_remote_snapshot_version();

		self.persistence.begin_transaction("Apply remote event");
		let result = self.apply_remote_event_impl(remote_event, last_remote_version);
		self.persistence.commit_transaction();
		result
	}

	fn apply_remote_event_impl(
		&mut self,
		remote_event: &RemoteEvent,
		last_remote_version: SnapshotVersion,
	) -> CuResult<DocumentMap> {
		let sequence_number = self.persistence.current_sequence_number();

		for (target_id, change) in &remote_event.target_changes {
			// Inactive targets do not get their remote keys updated, so the
			// assignment is only ever persisted with matching target data.
			let Some(old_target_data) = self.target_data_by_id.get(target_id).cloned() else {
				continue;
			};

			{
				let mut target_cache = self.target_cache.write();
				target_cache.remove_matching_keys(&change.removed_documents, *target_id);
				target_cache.add_matching_keys(&change.added_documents, *target_id);
			}

			if !change.resume_token.is_empty() {
				let new_target_data = old_target_data
					.clone()
					.with_resume_token(change.resume_token.clone(), remote_event.snapshot_version)
					.with_sequence_number(sequence_number);
				self.target_data_by_id.insert(*target_id, new_target_data.clone());

				if Self::should_persist_target_data(&new_target_data, &old_target_data, change) {
					self.target_cache.write().update_target(new_target_data);
				}
			}
		}

		let mut changed_docs = DocumentMap::new();
		let mut existence_changed_keys = DocumentKeySet::new();
		let updated_keys: DocumentKeySet =
			remote_event.document_updates.keys().cloned().collect();
		// Each iteration only touches its own document, so reading them all
		// up front in one call is safe.
		let existing_docs = self.remote_document_cache.read().get_all(&updated_keys);

		for (key, doc) in &remote_event.document_updates {
			let existing = existing_docs
				.get(key)
				.ok_or_else(|| internal("existing docs must cover every update"))?;

			// Tombstones with no version are synthesized when access to a
			// limbo document is lost; they must never populate the cache.
			if doc.is_no_document() && doc.version().is_none() {
				self.remote_document_cache.write().remove(key);
				changed_docs.insert(key.clone(), doc.clone());
			} else if !existing.is_valid_document()
				|| doc.version() > existing.version()
				|| (doc.version() == existing.version() && existing.has_pending_writes())
			{
				if remote_event.snapshot_version.is_none() {
					return Err(internal("cannot add a document when the remote version is zero"));
				}
				self.remote_document_cache
					.write()
					.add(doc.clone(), remote_event.snapshot_version);
				self.index_manager
					.write()
					.add_to_collection_parent_index(&key.collection_path());
				changed_docs.insert(key.clone(), doc.clone());
				if existing.is_valid_document()
					&& doc.is_found_document() != existing.is_found_document()
				{
					existence_changed_keys.insert(key.clone());
				}
			} else {
				debug!(
					"ignoring outdated watch update for {}. current version: {}, watch version: {}",
					key,
					existing.version(),
					doc.version()
				);
			}
		}

		// An empty snapshot version only occurs on synthesized events for
		// limbo resolution; real snapshots advance the watermark.
		let remote_version = remote_event.snapshot_version;
		if !remote_version.is_none() {
			if remote_version < last_remote_version {
				return Err(internal(format!(
					"watch stream reverted to previous snapshot ({} < {})",
					remote_version, last_remote_version
				)));
			}
			self.target_cache.write().set_last_remote_snapshot_version(remote_version);
		}

		Ok(self
			.local_documents
			.get_local_view_of_documents(changed_docs, &existence_changed_keys))
	}

	/// A new resume token is only worth persisting when there was no token
	/// before, documents changed, or enough time passed since the last
	/// persisted snapshot.
	fn should_persist_target_data(
		new_target_data: &TargetData,
		old_target_data: &TargetData,
		change: &TargetChange,
	) -> bool {
		debug_assert!(
			!new_target_data.resume_token().is_empty(),
			"attempted to persist target data with empty resume token"
		);
		if old_target_data.resume_token().is_empty() {
			return true;
		}

		let new_seconds = new_target_data.snapshot_version().timestamp().seconds();
		let old_seconds = old_target_data.snapshot_version().timestamp().seconds();
		if new_seconds - old_seconds >= RESUME_TOKEN_MAX_AGE_SECONDS {
			return true;
		}

		change.document_change_count() > 0
	}

	/// Returns existing target data for the target, or allocates a fresh
	/// target id and persists new data.
	pub fn allocate_target(&mut self, target: Target) -> TargetData {
		self.persistence.begin_transaction("Allocate target");
		let cached = self.target_cache.read().get_target(&target);
		let target_data = match cached {
			Some(data) => data,
			None => {
				let data = TargetData::new(
					target.clone(),
					self.target_id_generator.next(),
					self.persistence.current_sequence_number(),
					QueryPurpose::Listen,
				);
				self.target_cache.write().add_target(data.clone());
				data
			}
		};
		self.persistence.commit_transaction();

		let target_id = target_data.target_id();
		if !self.target_data_by_id.contains_key(&target_id) {
			self.target_data_by_id.insert(target_id, target_data.clone());
			self.target_id_by_target.insert(target, target_id);
		}
		target_data
	}

	pub fn target_data_for_target(&self, target: &Target) -> Option<TargetData> {
		match self.target_id_by_target.get(target) {
			Some(target_id) => self.target_data_by_id.get(target_id).cloned(),
			None => self.target_cache.read().get_target(target),
		}
	}

	/// Deactivates a target. Under eager GC its metadata is dropped
	/// immediately; under LRU it is kept (with a fresh sequence number) so
	/// a later listen can resume it.
	pub fn release_target(&mut self, target_id: TargetId) -> CuResult<()> {
		let target_data = self
			.target_data_by_id
			.get(&target_id)
			.cloned()
			.ok_or_else(|| internal(format!("tried to release nonexistent target {:?}", target_id)))?;

		self.persistence.begin_transaction("Release target");

		// Matching keys from the server go away with the target data;
		// locally mutated documents were pinned through the view references
		// and are released here.
		self.local_view_references.remove_references_for_id(target_id);

		if self.config.eager_gc {
			self.target_cache.write().remove_target(&target_data);
		} else {
			let sequence_number = self.persistence.current_sequence_number();
			self.target_cache
				.write()
				.update_target(target_data.clone().with_sequence_number(sequence_number));
		}

		self.target_data_by_id.remove(&target_id);
		self.target_id_by_target.remove(target_data.target());
		self.persistence.commit_transaction();
		Ok(())
	}

	/// Runs a query through the engine. With `use_previous_results` the
	/// last limbo-free snapshot and the target's remote keys seed
	/// incremental execution.
	pub fn execute_query(&mut self, query: &Query, use_previous_results: bool) -> QueryResult {
		self.persistence.begin_transaction("Execute query");
		let target_data = self.target_data_for_target(query.to_target());
		let (last_limbo_free_version, remote_keys) = match &target_data {
			Some(data) => (
				data.last_limbo_free_snapshot_version(),
				self.target_cache.read().matching_keys(data.target_id()),
			),
			None => (SnapshotVersion::NONE, DocumentKeySet::new()),
		};

		let empty_keys = DocumentKeySet::new();
		let documents = self.query_engine.get_documents_matching_query(
			query,
			if use_previous_results { last_limbo_free_version } else { SnapshotVersion::NONE },
			if use_previous_results { &remote_keys } else { &empty_keys },
		);
		self.persistence.commit_transaction();

		QueryResult { documents, remote_keys }
	}

	/// The keys the server last reported as matching the target.
	pub fn get_remote_document_keys(&self, target_id: TargetId) -> DocumentKeySet {
		self.target_cache.read().matching_keys(target_id)
	}

	/// Updates view reference pins and advances limbo-free snapshot
	/// versions for views that are no longer from cache.
	pub fn notify_local_view_changes(
		&mut self,
		view_changes: Vec<LocalViewChanges>,
	) -> CuResult<()> {
		self.persistence.begin_transaction("Notify local view changes");
		for view_change in view_changes {
			let target_id = view_change.target_id;

			self.local_view_references.add_references(&view_change.added_keys, target_id);
			self.local_view_references.remove_references(&view_change.removed_keys, target_id);

			if !view_change.from_cache {
				let target_data = self.target_data_by_id.get(&target_id).ok_or_else(|| {
					internal(format!(
						"can't set limbo-free snapshot version for unknown target {:?}",
						target_id
					))
				})?;

				// This view saw a snapshot with no limbo documents; its
				// snapshot version becomes a safe baseline for incremental
				// query execution.
				let limbo_free_version = target_data.snapshot_version();
				let updated = target_data
					.clone()
					.with_last_limbo_free_snapshot_version(limbo_free_version);
				self.target_data_by_id.insert(target_id, updated);
			}
		}
		self.persistence.commit_transaction();
		Ok(())
	}

	pub fn get_next_mutation_batch(&self, after_batch_id: BatchId) -> Option<MutationBatch> {
		self.mutation_queue.read().next_mutation_batch_after_batch_id(after_batch_id)
	}

	pub fn get_highest_unacknowledged_batch_id(&self) -> BatchId {
		self.mutation_queue.read().highest_unacknowledged_batch_id()
	}

	/// The local view of a single document.
	pub fn read_document(&self, key: &DocumentKey) -> MutableDocument {
		self.local_documents.get_document(key)
	}

	/// Removes unreferenced state according to the policy.
	pub fn collect_garbage(&mut self, policy: &GcPolicy) -> GcResults {
		self.persistence.begin_transaction("Collect garbage");
		let results = match policy {
			GcPolicy::Eager => GcResults {
				targets_removed: 0,
				documents_removed: self.remove_orphaned_documents(),
			},
			GcPolicy::Lru(params) => self.collect_lru(params),
		};
		self.persistence.commit_transaction();
		info!(
			"garbage collection removed {} targets and {} documents",
			results.targets_removed, results.documents_removed
		);
		results
	}

	/// A document is orphaned when no target's matching keys, no local
	/// view, and no pending mutation references it.
	fn remove_orphaned_documents(&mut self) -> usize {
		let keys = self.remote_document_cache.read().keys();
		let mut removed = 0;
		for key in keys {
			let pinned = self.target_cache.read().contains_key(&key)
				|| self.local_view_references.contains_key(&key)
				|| !self
					.mutation_queue
					.read()
					.all_mutation_batches_affecting_document_key(&key)
					.is_empty();
			if !pinned {
				self.remote_document_cache.write().remove(&key);
				removed += 1;
			}
		}
		removed
	}

	fn collect_lru(&mut self, params: &LruParams) -> GcResults {
		let all_targets = self.target_cache.read().all_target_data();

		// The collection threshold is the sequence number at the requested
		// percentile of all known targets.
		let mut sequence_numbers: Vec<ListenSequenceNumber> =
			all_targets.iter().map(TargetData::sequence_number).collect();
		sequence_numbers.sort_unstable();
		let count = (sequence_numbers.len() * params.percentile_to_collect as usize / 100)
			.min(params.max_sequence_numbers_to_collect);
		if count == 0 {
			return GcResults { targets_removed: 0, documents_removed: 0 };
		}
		let threshold = sequence_numbers[count - 1];

		let mut targets_removed = 0;
		for target_data in all_targets {
			if target_data.sequence_number() <= threshold
				&& !self.target_data_by_id.contains_key(&target_data.target_id())
			{
				self.target_cache.write().remove_target(&target_data);
				targets_removed += 1;
			}
		}

		GcResults { targets_removed, documents_removed: self.remove_orphaned_documents() }
	}
}

// vim: ts=4
