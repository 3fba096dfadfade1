//! Document keys.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::path::ResourcePath;
use crate::prelude::*;

/// The location of a document: an even-length resource path whose
/// second-to-last segment names the collection the document lives in.
#[derive(
	Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct DocumentKey {
	path: ResourcePath,
}

impl DocumentKey {
	pub fn from_path(path: ResourcePath) -> CuResult<Self> {
		if !Self::is_document_key(&path) {
			return Err(Error::InvalidArgument(format!(
				"document keys must have an even number of segments: {}",
				path
			)));
		}
		Ok(Self { path })
	}

	/// Parses a slash separated string such as `rooms/firstroom`.
	pub fn parse(path: &str) -> CuResult<Self> {
		Self::from_path(ResourcePath::parse(path)?)
	}

	pub fn is_document_key(path: &ResourcePath) -> bool {
		!path.is_empty() && path.len() % 2 == 0
	}

	pub fn path(&self) -> &ResourcePath {
		&self.path
	}

	/// The collection path that contains this document.
	pub fn collection_path(&self) -> ResourcePath {
		self.path.pop_last()
	}

	/// The id of the collection that contains this document.
	pub fn collection_id(&self) -> &str {
		self.path.get(self.path.len() - 2).unwrap_or_default()
	}

	/// The last path segment.
	pub fn document_id(&self) -> &str {
		self.path.last_segment().unwrap_or_default()
	}

	/// True when this document lives in a collection with the given id, at
	/// any nesting depth.
	pub fn has_collection_id(&self, collection_id: &str) -> bool {
		self.collection_id() == collection_id
	}
}

impl fmt::Display for DocumentKey {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", self.path)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_document_key_parse() {
		let key = DocumentKey::parse("rooms/firstroom").unwrap();
		assert_eq!(key.collection_id(), "rooms");
		assert_eq!(key.document_id(), "firstroom");

		assert!(DocumentKey::parse("rooms").is_err(), "odd paths are collections");
		assert!(DocumentKey::parse("").is_err());
	}

	#[test]
	fn test_collection_membership() {
		let nested = DocumentKey::parse("rooms/firstroom/messages/msg1").unwrap();
		assert!(nested.has_collection_id("messages"));
		assert!(!nested.has_collection_id("rooms"));
		assert_eq!(nested.collection_path(), ResourcePath::parse("rooms/firstroom/messages").unwrap());
	}
}

// vim: ts=4
