//! In-memory mutation queue.

use std::collections::VecDeque;

use cumulo::key::DocumentKey;
use cumulo::prelude::*;
use cumulo_local::MutationQueue;
use cumulo_model::{DocumentKeySet, Mutation, MutationBatch};
use cumulo_query::Query;

/// FIFO queue of pending batches. Batch ids start at 1 and never repeat
/// within a process; acknowledged batches leave from the front only.
#[derive(Debug)]
pub struct MemoryMutationQueue {
	queue: VecDeque<MutationBatch>,
	next_batch_id: BatchId,
	highest_acknowledged_batch_id: BatchId,
	last_stream_token: Vec<u8>,
}

impl Default for MemoryMutationQueue {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryMutationQueue {
	pub fn new() -> Self {
		Self {
			queue: VecDeque::new(),
			next_batch_id: BatchId(1),
			highest_acknowledged_batch_id: BatchId::NONE,
			last_stream_token: Vec::new(),
		}
	}
}

impl MutationQueue for MemoryMutationQueue {
	fn start(&mut self) {
		// An empty queue can safely reset its ack watermark; ids keep
		// advancing so references from older batches stay unambiguous.
		if self.queue.is_empty() {
			self.highest_acknowledged_batch_id = BatchId::NONE;
		}
	}

	fn is_empty(&self) -> bool {
		self.queue.is_empty()
	}

	fn add_mutation_batch(
		&mut self,
		local_write_time: Timestamp,
		base_mutations: Vec<Mutation>,
		mutations: Vec<Mutation>,
	) -> CuResult<MutationBatch> {
		if mutations.is_empty() {
			return Err(Error::InvalidArgument("mutation batches must not be empty".into()));
		}
		let batch_id = self.next_batch_id;
		self.next_batch_id = batch_id.next();

		let batch = MutationBatch::new(batch_id, local_write_time, base_mutations, mutations);
		self.queue.push_back(batch.clone());
		Ok(batch)
	}

	fn acknowledge_batch(&mut self, batch: &MutationBatch, stream_token: Vec<u8>) -> CuResult<()> {
		let batch_id = batch.batch_id();
		let front_id = self.queue.front().map(MutationBatch::batch_id);
		if front_id != Some(batch_id) {
			return Err(Error::Internal(format!(
				"batches must be acknowledged in order: got {:?}, expected {:?}",
				batch_id, front_id
			)));
		}
		self.highest_acknowledged_batch_id = batch_id;
		self.last_stream_token = stream_token;
		Ok(())
	}

	fn remove_mutation_batch(&mut self, batch: &MutationBatch) -> CuResult<()> {
		match self.queue.front() {
			Some(front) if front.batch_id() == batch.batch_id() => {
				self.queue.pop_front();
				Ok(())
			}
			_ => Err(Error::Internal(
				"can only remove the first entry of the mutation queue".into(),
			)),
		}
	}

	fn lookup_mutation_batch(&self, batch_id: BatchId) -> Option<MutationBatch> {
		self.queue.iter().find(|b| b.batch_id() == batch_id).cloned()
	}

	fn next_mutation_batch_after_batch_id(&self, batch_id: BatchId) -> Option<MutationBatch> {
		self.queue.iter().find(|b| b.batch_id() > batch_id).cloned()
	}

	fn highest_unacknowledged_batch_id(&self) -> BatchId {
		self.queue.back().map_or(BatchId::NONE, MutationBatch::batch_id)
	}

	fn all_mutation_batches(&self) -> Vec<MutationBatch> {
		self.queue.iter().cloned().collect()
	}

	fn all_mutation_batches_affecting_document_key(
		&self,
		key: &DocumentKey,
	) -> Vec<MutationBatch> {
		self.queue.iter().filter(|batch| batch.applies_to(key)).cloned().collect()
	}

	fn all_mutation_batches_affecting_document_keys(
		&self,
		keys: &DocumentKeySet,
	) -> Vec<MutationBatch> {
		self.queue
			.iter()
			.filter(|batch| batch.mutations().iter().any(|m| keys.contains(m.key())))
			.cloned()
			.collect()
	}

	fn all_mutation_batches_affecting_query(&self, query: &Query) -> Vec<MutationBatch> {
		let collection = query.path();
		self.queue
			.iter()
			.filter(|batch| {
				batch
					.mutations()
					.iter()
					.any(|m| collection.is_immediate_parent_of(m.key().path()))
			})
			.cloned()
			.collect()
	}

	fn last_stream_token(&self) -> Vec<u8> {
		self.last_stream_token.clone()
	}

	fn set_last_stream_token(&mut self, token: Vec<u8>) {
		self.last_stream_token = token;
	}

	fn perform_consistency_check(&self) -> CuResult<()> {
		let mut previous = self.highest_acknowledged_batch_id;
		for batch in &self.queue {
			if batch.batch_id() <= previous {
				return Err(Error::Internal(
					"mutation queue batch ids are not strictly increasing".into(),
				));
			}
			previous = batch.batch_id();
		}
		Ok(())
	}
}

// vim: ts=4
