//! Async facade over the serial worker.
//!
//! The store itself is synchronous; this handle owns the dedicated worker
//! thread, enqueues every operation FIFO, and hands results back as
//! futures. Callers on any thread share one handle.

use cumulo_model::{
	DocumentKeySet, DocumentMap, MutableDocument, Mutation, MutationBatch, MutationBatchResult,
};
use cumulo_query::{Query, Target, TargetData};
use cumulo_types::key::DocumentKey;
use cumulo_types::prelude::*;
use cumulo_types::worker::Executor;

use crate::local_store::{
	GcPolicy, GcResults, LocalStore, LocalViewChanges, LocalWriteResult, QueryResult,
};
use crate::persistence::Persistence;
use crate::remote_event::RemoteEvent;

pub struct LocalStoreHandle<P: Persistence + 'static> {
	executor: Executor<LocalStore<P>>,
}

impl<P: Persistence + 'static> LocalStoreHandle<P> {
	/// Builds the store on its worker thread and starts it.
	pub fn spawn<F>(init: F) -> Self
	where
		F: FnOnce() -> LocalStore<P> + Send + 'static,
	{
		let executor = Executor::spawn("local-store", move || {
			let mut store = init();
			if let Err(e) = store.start() {
				warn!("local store failed to start cleanly: {}", e);
			}
			store
		});
		Self { executor }
	}

	pub async fn write_locally(&self, mutations: Vec<Mutation>) -> CuResult<LocalWriteResult> {
		self.executor.try_run(move |store| store.write_locally(mutations)).await
	}

	pub async fn acknowledge_batch(
		&self,
		batch_result: MutationBatchResult,
	) -> CuResult<DocumentMap> {
		self.executor.try_run(move |store| store.acknowledge_batch(&batch_result)).await
	}

	pub async fn reject_batch(&self, batch_id: BatchId) -> CuResult<DocumentMap> {
		self.executor.try_run(move |store| store.reject_batch(batch_id)).await
	}

	pub async fn apply_remote_event(&self, remote_event: RemoteEvent) -> CuResult<DocumentMap> {
		self.executor.try_run(move |store| store.apply_remote_event(&remote_event)).await
	}

	pub async fn allocate_target(&self, target: Target) -> CuResult<TargetData> {
		self.executor.run(move |store| store.allocate_target(target)).await
	}

	pub async fn release_target(&self, target_id: TargetId) -> CuResult<()> {
		self.executor.try_run(move |store| store.release_target(target_id)).await
	}

	pub async fn execute_query(
		&self,
		query: Query,
		use_previous_results: bool,
	) -> CuResult<QueryResult> {
		self.executor.run(move |store| store.execute_query(&query, use_previous_results)).await
	}

	pub async fn notify_local_view_changes(
		&self,
		view_changes: Vec<LocalViewChanges>,
	) -> CuResult<()> {
		self.executor.try_run(move |store| store.notify_local_view_changes(view_changes)).await
	}

	pub async fn get_next_mutation_batch(
		&self,
		after_batch_id: BatchId,
	) -> CuResult<Option<MutationBatch>> {
		self.executor.run(move |store| store.get_next_mutation_batch(after_batch_id)).await
	}

	pub async fn get_last_remote_snapshot_version(&self) -> CuResult<SnapshotVersion> {
		self.executor.run(|store| store.get_last_remote_snapshot_version()).await
	}

	pub async fn get_remote_document_keys(&self, target_id: TargetId) -> CuResult<DocumentKeySet> {
		self.executor.run(move |store| store.get_remote_document_keys(target_id)).await
	}

	pub async fn read_document(&self, key: DocumentKey) -> CuResult<MutableDocument> {
		self.executor.run(move |store| store.read_document(&key)).await
	}

	pub async fn collect_garbage(&self, policy: GcPolicy) -> CuResult<GcResults> {
		self.executor.run(move |store| store.collect_garbage(&policy)).await
	}
}

// vim: ts=4
