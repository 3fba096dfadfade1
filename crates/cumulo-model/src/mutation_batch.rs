//! Batches of mutations and their acknowledgement results.

use std::collections::{BTreeMap, BTreeSet};

use cumulo_types::error::internal;
use cumulo_types::key::DocumentKey;
use cumulo_types::prelude::*;

use crate::document::MutableDocument;
use crate::mutation::{Mutation, MutationResult};
use crate::object_value::FieldMask;
use crate::overlay::OverlayedDocument;

/// An ordered, non-empty list of mutations applied as one atomic unit.
///
/// `base_mutations` record the pre-write state of fields touched by
/// non-idempotent transforms; they apply before the user mutations during
/// local replays but are never sent to the server.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationBatch {
	batch_id: BatchId,
	local_write_time: Timestamp,
	base_mutations: Vec<Mutation>,
	mutations: Vec<Mutation>,
}

impl MutationBatch {
	pub fn new(
		batch_id: BatchId,
		local_write_time: Timestamp,
		base_mutations: Vec<Mutation>,
		mutations: Vec<Mutation>,
	) -> Self {
		debug_assert!(!mutations.is_empty(), "mutation batches must not be empty");
		Self { batch_id, local_write_time, base_mutations, mutations }
	}

	pub fn batch_id(&self) -> BatchId {
		self.batch_id
	}

	pub fn local_write_time(&self) -> Timestamp {
		self.local_write_time
	}

	pub fn base_mutations(&self) -> &[Mutation] {
		&self.base_mutations
	}

	pub fn mutations(&self) -> &[Mutation] {
		&self.mutations
	}

	/// The set of document keys the user mutations touch.
	pub fn keys(&self) -> BTreeSet<DocumentKey> {
		self.mutations.iter().map(|m| m.key().clone()).collect()
	}

	pub fn applies_to(&self, key: &DocumentKey) -> bool {
		self.mutations.iter().any(|m| m.key() == key)
	}

	/// Applies the batch to a document using the server's per-mutation
	/// results.
	pub fn apply_to_remote_document(
		&self,
		doc: &mut MutableDocument,
		batch_result: &MutationBatchResult,
	) -> CuResult<()> {
		for (i, mutation) in self.mutations.iter().enumerate() {
			if mutation.key() != doc.key() {
				continue;
			}
			let result = batch_result
				.mutation_results
				.get(i)
				.ok_or_else(|| internal("mutation result missing for batch entry"))?;
			mutation.apply_to_remote_document(doc, result);
		}
		Ok(())
	}

	/// Applies the batch for latency compensation, threading the accumulated
	/// mutated-field mask through every mutation that touches the document.
	pub fn apply_to_local_view(
		&self,
		doc: &mut MutableDocument,
		mut mask: Option<FieldMask>,
	) -> Option<FieldMask> {
		for mutation in &self.base_mutations {
			if mutation.key() == doc.key() {
				mask = mutation.apply_to_local_view(doc, mask, self.local_write_time);
			}
		}
		for mutation in &self.mutations {
			if mutation.key() == doc.key() {
				mask = mutation.apply_to_local_view(doc, mask, self.local_write_time);
			}
		}
		mask
	}

	/// Applies the batch on top of already-overlaid documents and computes
	/// the replacement overlay for every touched key.
	///
	/// Keys in `docs_without_remote_version` exist only locally; their
	/// overlay is forced to a whole-document Set or Delete so replays do not
	/// depend on a remote base that is not there.
	pub fn apply_to_local_document_set(
		&self,
		docs: &mut BTreeMap<DocumentKey, OverlayedDocument>,
		docs_without_remote_version: &BTreeSet<DocumentKey>,
	) -> BTreeMap<DocumentKey, Mutation> {
		let mut overlays = BTreeMap::new();
		for key in self.keys() {
			let Some(overlayed) = docs.get_mut(&key) else { continue };
			let mut mutated_fields =
				self.apply_to_local_view(&mut overlayed.document, overlayed.mutated_fields.clone());
			if docs_without_remote_version.contains(&key) {
				mutated_fields = None;
			}
			overlayed.mutated_fields = mutated_fields.clone();
			if let Some(overlay) =
				Mutation::calculate_overlay_mutation(&overlayed.document, mutated_fields.as_ref())
			{
				overlays.insert(key.clone(), overlay);
			}
			if !overlayed.document.is_valid_document() {
				overlayed.document.convert_to_no_document(SnapshotVersion::NONE);
			}
		}
		overlays
	}
}

/// The server's acknowledgement of a committed batch.
#[derive(Debug, Clone)]
pub struct MutationBatchResult {
	batch: MutationBatch,
	commit_version: SnapshotVersion,
	mutation_results: Vec<MutationResult>,
	stream_token: Vec<u8>,
	doc_versions: BTreeMap<DocumentKey, SnapshotVersion>,
}

impl MutationBatchResult {
	pub fn new(
		batch: MutationBatch,
		commit_version: SnapshotVersion,
		mutation_results: Vec<MutationResult>,
		stream_token: Vec<u8>,
	) -> CuResult<Self> {
		if batch.mutations().len() != mutation_results.len() {
			return Err(Error::InvalidArgument(format!(
				"batch has {} mutations but {} results were provided",
				batch.mutations().len(),
				mutation_results.len()
			)));
		}
		let doc_versions = batch
			.mutations()
			.iter()
			.zip(&mutation_results)
			.map(|(mutation, result)| (mutation.key().clone(), result.version))
			.collect();
		Ok(Self { batch, commit_version, mutation_results, stream_token, doc_versions })
	}

	pub fn batch(&self) -> &MutationBatch {
		&self.batch
	}

	pub fn commit_version(&self) -> SnapshotVersion {
		self.commit_version
	}

	pub fn mutation_results(&self) -> &[MutationResult] {
		&self.mutation_results
	}

	pub fn stream_token(&self) -> &[u8] {
		&self.stream_token
	}

	/// The acknowledged version per document key.
	pub fn doc_versions(&self) -> &BTreeMap<DocumentKey, SnapshotVersion> {
		&self.doc_versions
	}

	/// Keys whose mutations carried transforms the server resolved; their
	/// overlays must be recomputed after the acknowledgement.
	pub fn keys_with_transform_results(&self) -> BTreeSet<DocumentKey> {
		self.batch
			.mutations()
			.iter()
			.zip(&self.mutation_results)
			.filter(|(_, result)| !result.transform_results.is_empty())
			.map(|(mutation, _)| mutation.key().clone())
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::mutation::Precondition;
	use crate::object_value::ObjectValue;
	use serde_json::json;

	fn key(path: &str) -> DocumentKey {
		DocumentKey::parse(path).unwrap()
	}

	fn version(seconds: i64) -> SnapshotVersion {
		SnapshotVersion::new(Timestamp::new(seconds, 0))
	}

	fn set(path: &str, data: serde_json::Value) -> Mutation {
		Mutation::set(key(path), ObjectValue::from_json(&data))
	}

	fn batch(id: i32, mutations: Vec<Mutation>) -> MutationBatch {
		MutationBatch::new(BatchId(id), Timestamp::new(10, 0), Vec::new(), mutations)
	}

	#[test]
	fn test_keys_deduplicate() {
		let b = batch(1, vec![set("coll/a", json!({"x": 1})), set("coll/a", json!({"x": 2}))]);
		assert_eq!(b.keys().len(), 1);
	}

	#[test]
	fn test_mutations_apply_in_order() {
		let b = batch(1, vec![set("coll/a", json!({"x": 1})), set("coll/a", json!({"x": 2}))]);
		let mut doc = MutableDocument::invalid(key("coll/a"));

		b.apply_to_local_view(&mut doc, None);

		assert_eq!(doc.data(), &ObjectValue::from_json(&json!({"x": 2})));
	}

	#[test]
	fn test_batch_result_requires_matching_counts() {
		let b = batch(1, vec![set("coll/a", json!({}))]);
		assert!(MutationBatchResult::new(b, version(1), Vec::new(), Vec::new()).is_err());
	}

	#[test]
	fn test_doc_versions() {
		let b = batch(
			1,
			vec![
				set("coll/a", json!({})),
				Mutation::delete(key("coll/b"), Precondition::None),
			],
		);
		let result = MutationBatchResult::new(
			b,
			version(10),
			vec![MutationResult::new(version(10)), MutationResult::new(version(9))],
			Vec::new(),
		)
		.unwrap();

		assert_eq!(result.doc_versions().get(&key("coll/a")), Some(&version(10)));
		assert_eq!(result.doc_versions().get(&key("coll/b")), Some(&version(9)));
	}
}

// vim: ts=4
