//! Remote event types consumed from the RPC layer.

use std::collections::BTreeMap;

use cumulo_model::{DocumentKeySet, DocumentMap};
use cumulo_types::prelude::*;

/// The per-target membership delta of one watch snapshot.
#[derive(Debug, Clone, Default)]
pub struct TargetChange {
	/// Opaque server cookie to resume the listen. Empty means "unchanged".
	pub resume_token: Vec<u8>,
	pub added_documents: DocumentKeySet,
	pub modified_documents: DocumentKeySet,
	pub removed_documents: DocumentKeySet,
}

impl TargetChange {
	/// The number of documents this change touched; resume tokens are only
	/// worth persisting when this is non-zero or enough time has passed.
	pub fn document_change_count(&self) -> usize {
		self.added_documents.len() + self.modified_documents.len() + self.removed_documents.len()
	}
}

/// One consistent watch snapshot: target membership deltas plus document
/// contents, applied to the local store atomically.
#[derive(Debug, Clone, Default)]
pub struct RemoteEvent {
	pub snapshot_version: SnapshotVersion,
	pub target_changes: BTreeMap<TargetId, TargetChange>,
	pub document_updates: DocumentMap,
	/// Documents currently being probed by limbo-resolution targets.
	pub limbo_document_changes: DocumentKeySet,
}

// vim: ts=4
