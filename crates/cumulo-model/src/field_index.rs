//! Field-value index definitions and index offsets.

use std::cmp::Ordering;

use cumulo_types::key::DocumentKey;
use cumulo_types::path::FieldPath;
use cumulo_types::prelude::*;

/// How far a collection has been indexed: documents at or before this
/// (read-time, key) position are covered, later ones still need backfill.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexOffset {
	read_time: SnapshotVersion,
	/// `None` sorts before every document key at the same read time.
	document_key: Option<DocumentKey>,
	largest_batch_id: BatchId,
}

impl IndexOffset {
	/// The offset before all documents.
	pub fn none() -> Self {
		Self { read_time: SnapshotVersion::NONE, document_key: None, largest_batch_id: BatchId::NONE }
	}

	pub fn new(
		read_time: SnapshotVersion,
		document_key: DocumentKey,
		largest_batch_id: BatchId,
	) -> Self {
		Self { read_time, document_key: Some(document_key), largest_batch_id }
	}

	/// An offset that admits every document read at or after `read_time`.
	pub fn create_successor(read_time: SnapshotVersion) -> Self {
		Self { read_time, document_key: None, largest_batch_id: BatchId::NONE }
	}

	pub fn read_time(&self) -> SnapshotVersion {
		self.read_time
	}

	pub fn document_key(&self) -> Option<&DocumentKey> {
		self.document_key.as_ref()
	}

	pub fn largest_batch_id(&self) -> BatchId {
		self.largest_batch_id
	}

	/// Whether a document at (read_time, key) lies beyond this offset.
	pub fn comes_before(&self, read_time: SnapshotVersion, key: &DocumentKey) -> bool {
		match self.read_time.cmp(&read_time) {
			Ordering::Less => true,
			Ordering::Greater => false,
			Ordering::Equal => match &self.document_key {
				None => true,
				Some(own) => own < key,
			},
		}
	}
}

impl PartialOrd for IndexOffset {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for IndexOffset {
	/// Offsets order by (read-time, key); the batch id is bookkeeping only.
	fn cmp(&self, other: &Self) -> Ordering {
		self.read_time
			.cmp(&other.read_time)
			.then_with(|| self.document_key.cmp(&other.document_key))
	}
}

/// The role of one field within an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
	Ascending,
	Descending,
	/// Indexes individual array elements for array-contains filters.
	Contains,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
	pub field_path: FieldPath,
	pub kind: SegmentKind,
}

/// Backfill state of one field index.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexState {
	pub sequence_number: ListenSequenceNumber,
	pub offset: IndexOffset,
}

/// A user-configured index over one collection group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIndex {
	index_id: i32,
	collection_group: String,
	segments: Vec<Segment>,
	state: IndexState,
}

impl FieldIndex {
	/// Id of an index that has not been persisted yet.
	pub const UNKNOWN_ID: i32 = -1;

	pub fn new(
		index_id: i32,
		collection_group: impl Into<String>,
		segments: Vec<Segment>,
		state: IndexState,
	) -> Self {
		Self { index_id, collection_group: collection_group.into(), segments, state }
	}

	pub fn index_id(&self) -> i32 {
		self.index_id
	}

	pub fn collection_group(&self) -> &str {
		&self.collection_group
	}

	pub fn segments(&self) -> &[Segment] {
		&self.segments
	}

	pub fn state(&self) -> &IndexState {
		&self.state
	}

	pub fn set_state(&mut self, state: IndexState) {
		self.state = state;
	}

	/// The ordered segments that define value ordering (everything but
	/// Contains segments).
	pub fn directional_segments(&self) -> impl Iterator<Item = &Segment> {
		self.segments.iter().filter(|s| s.kind != SegmentKind::Contains)
	}

	/// The array segment, if the index has one. At most one is allowed.
	pub fn array_segment(&self) -> Option<&Segment> {
		self.segments.iter().find(|s| s.kind == SegmentKind::Contains)
	}
}


// vim: ts=4
