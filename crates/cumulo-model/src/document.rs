//! Document states.
//!
//! Every document key resolves to exactly one state. `Invalid` is a
//! structural placeholder for cache misses and never reaches users; `Found`,
//! `No`, and `Unknown` track what is known about the document's existence on
//! the server. The mutation flags record whether local writes still affect
//! the document.

use std::fmt;

use cumulo_types::key::DocumentKey;
use cumulo_types::path::FieldPath;
use cumulo_types::prelude::*;
use cumulo_types::value::Value;

use crate::object_value::ObjectValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentType {
	/// Nothing is known about the document at this key.
	Invalid,
	/// The document exists and its data is known.
	Found,
	/// The document is known to not exist.
	No,
	/// A mutation on the document was acknowledged, but the resulting state
	/// is unknown until the next remote event.
	Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentState {
	/// The document matches the server state.
	Synced,
	/// A write was acknowledged but the remote event confirming it is still
	/// outstanding.
	HasCommittedMutations,
	/// An uncommitted local write affects the document.
	HasLocalMutations,
}

/// A document in one of its five states, with version, read time, data, and
/// mutation flags.
#[derive(Debug, Clone, PartialEq)]
pub struct MutableDocument {
	key: DocumentKey,
	document_type: DocumentType,
	version: SnapshotVersion,
	read_time: SnapshotVersion,
	data: ObjectValue,
	document_state: DocumentState,
}

impl MutableDocument {
	/// A placeholder for a key with no cached state.
	pub fn invalid(key: DocumentKey) -> Self {
		Self {
			key,
			document_type: DocumentType::Invalid,
			version: SnapshotVersion::NONE,
			read_time: SnapshotVersion::NONE,
			data: ObjectValue::new(),
			document_state: DocumentState::Synced,
		}
	}

	pub fn found(key: DocumentKey, version: SnapshotVersion, data: ObjectValue) -> Self {
		let mut doc = Self::invalid(key);
		doc.convert_to_found(version, data);
		doc
	}

	pub fn no_document(key: DocumentKey, version: SnapshotVersion) -> Self {
		let mut doc = Self::invalid(key);
		doc.convert_to_no_document(version);
		doc
	}

	pub fn unknown(key: DocumentKey, version: SnapshotVersion) -> Self {
		let mut doc = Self::invalid(key);
		doc.convert_to_unknown(version);
		doc
	}

	pub fn convert_to_found(&mut self, version: SnapshotVersion, data: ObjectValue) {
		self.version = version;
		self.document_type = DocumentType::Found;
		self.data = data;
		self.document_state = DocumentState::Synced;
	}

	pub fn convert_to_no_document(&mut self, version: SnapshotVersion) {
		self.version = version;
		self.document_type = DocumentType::No;
		self.data = ObjectValue::new();
		self.document_state = DocumentState::Synced;
	}

	pub fn convert_to_unknown(&mut self, version: SnapshotVersion) {
		self.version = version;
		self.document_type = DocumentType::Unknown;
		self.data = ObjectValue::new();
		self.document_state = DocumentState::HasCommittedMutations;
	}

	pub fn set_has_committed_mutations(&mut self) {
		self.document_state = DocumentState::HasCommittedMutations;
	}

	pub fn set_has_local_mutations(&mut self) {
		self.document_state = DocumentState::HasLocalMutations;
	}

	pub fn set_read_time(&mut self, read_time: SnapshotVersion) {
		self.read_time = read_time;
	}

	pub fn key(&self) -> &DocumentKey {
		&self.key
	}

	pub fn version(&self) -> SnapshotVersion {
		self.version
	}

	pub fn read_time(&self) -> SnapshotVersion {
		self.read_time
	}

	pub fn data(&self) -> &ObjectValue {
		&self.data
	}

	pub fn field(&self, path: &FieldPath) -> Option<&Value> {
		self.data.get(path)
	}

	pub fn is_valid_document(&self) -> bool {
		self.document_type != DocumentType::Invalid
	}

	pub fn is_found_document(&self) -> bool {
		self.document_type == DocumentType::Found
	}

	pub fn is_no_document(&self) -> bool {
		self.document_type == DocumentType::No
	}

	pub fn is_unknown_document(&self) -> bool {
		self.document_type == DocumentType::Unknown
	}

	pub fn has_local_mutations(&self) -> bool {
		self.document_state == DocumentState::HasLocalMutations
	}

	pub fn has_committed_mutations(&self) -> bool {
		self.document_state == DocumentState::HasCommittedMutations
	}

	pub fn has_pending_writes(&self) -> bool {
		self.has_local_mutations() || self.has_committed_mutations()
	}
}

impl fmt::Display for MutableDocument {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(
			f,
			"Document({}, {}, {:?}, {:?})",
			self.key, self.version, self.document_type, self.document_state
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn key() -> DocumentKey {
		DocumentKey::parse("rooms/a").unwrap()
	}

	fn version(seconds: i64) -> SnapshotVersion {
		SnapshotVersion::new(Timestamp::new(seconds, 0))
	}

	#[test]
	fn test_states_are_exclusive() {
		let invalid = MutableDocument::invalid(key());
		assert!(!invalid.is_valid_document());
		assert!(!invalid.is_found_document());

		let found = MutableDocument::found(key(), version(1), ObjectValue::from_json(&json!({"x": 1})));
		assert!(found.is_valid_document());
		assert!(found.is_found_document());
		assert!(!found.is_no_document());

		let missing = MutableDocument::no_document(key(), version(1));
		assert!(missing.is_no_document());
		assert!(missing.data().is_empty());

		let unknown = MutableDocument::unknown(key(), version(1));
		assert!(unknown.is_unknown_document());
		assert!(unknown.has_committed_mutations());
	}

	#[test]
	fn test_local_mutation_keeps_version() {
		let mut doc = MutableDocument::found(key(), version(5), ObjectValue::new());
		doc.set_has_local_mutations();

		assert!(doc.has_local_mutations());
		assert!(doc.has_pending_writes());
		assert_eq!(doc.version(), version(5));
	}

	#[test]
	fn test_conversion_clears_flags() {
		let mut doc = MutableDocument::found(key(), version(5), ObjectValue::new());
		doc.set_has_committed_mutations();
		assert!(doc.has_pending_writes());

		doc.convert_to_found(version(6), ObjectValue::new());
		assert!(!doc.has_pending_writes());
	}
}

// vim: ts=4
