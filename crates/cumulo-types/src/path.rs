//! Field and resource paths.
//!
//! A `ResourcePath` locates a document or collection as a sequence of slash
//! separated segments; a `FieldPath` addresses a (possibly nested) field
//! inside a document's data and has a canonical dot-separated server format
//! with backtick quoting.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::prelude::*;

/// A slash-separated path to a collection or document.
///
/// Even-length paths name documents, odd-length paths name collections.
#[derive(
	Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct ResourcePath {
	segments: Vec<String>,
}

impl ResourcePath {
	pub fn empty() -> Self {
		Self::default()
	}

	pub fn from_segments(segments: Vec<String>) -> Self {
		debug_assert!(segments.iter().all(|s| !s.is_empty()), "empty path segment");
		Self { segments }
	}

	/// Parses a slash separated string. Leading/trailing slashes are allowed,
	/// interior empty segments are not.
	pub fn parse(path: &str) -> CuResult<Self> {
		let mut segments = Vec::new();
		for segment in path.split('/') {
			if segment.is_empty() {
				continue;
			}
			segments.push(segment.to_string());
		}
		// Reject interior empty segments ("a//b") while tolerating the
		// slashes `split` produces at the ends.
		if path.contains("//") {
			return Err(Error::InvalidArgument(format!("invalid path: {}", path)));
		}
		Ok(Self { segments })
	}

	pub fn segments(&self) -> &[String] {
		&self.segments
	}

	pub fn len(&self) -> usize {
		self.segments.len()
	}

	pub fn is_empty(&self) -> bool {
		self.segments.is_empty()
	}

	pub fn first_segment(&self) -> Option<&str> {
		self.segments.first().map(String::as_str)
	}

	pub fn last_segment(&self) -> Option<&str> {
		self.segments.last().map(String::as_str)
	}

	pub fn get(&self, index: usize) -> Option<&str> {
		self.segments.get(index).map(String::as_str)
	}

	pub fn append(&self, segment: impl Into<String>) -> Self {
		let segment = segment.into();
		debug_assert!(!segment.is_empty(), "empty path segment");
		let mut segments = self.segments.clone();
		segments.push(segment);
		Self { segments }
	}

	pub fn append_path(&self, other: &ResourcePath) -> Self {
		let mut segments = self.segments.clone();
		segments.extend(other.segments.iter().cloned());
		Self { segments }
	}

	/// The path without its last segment.
	pub fn pop_last(&self) -> Self {
		let mut segments = self.segments.clone();
		segments.pop();
		Self { segments }
	}

	pub fn is_prefix_of(&self, other: &ResourcePath) -> bool {
		self.segments.len() <= other.segments.len()
			&& self.segments.iter().zip(&other.segments).all(|(a, b)| a == b)
	}

	/// True when `other` names an entry directly inside this path.
	pub fn is_immediate_parent_of(&self, other: &ResourcePath) -> bool {
		self.segments.len() + 1 == other.segments.len() && self.is_prefix_of(other)
	}

	pub fn canonical_string(&self) -> String {
		self.segments.join("/")
	}
}

impl fmt::Display for ResourcePath {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", self.canonical_string())
	}
}

/// The reserved field name denoting the document key.
pub const KEY_FIELD_NAME: &str = "__name__";

/// A dot-separated path to a field within a document.
#[derive(
	Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct FieldPath {
	segments: Vec<String>,
}

impl FieldPath {
	pub fn from_segments(segments: Vec<String>) -> Self {
		debug_assert!(segments.iter().all(|s| !s.is_empty()), "empty field path segment");
		Self { segments }
	}

	pub fn from_single_segment(segment: impl Into<String>) -> Self {
		Self { segments: vec![segment.into()] }
	}

	/// The singleton path addressing the document key.
	pub fn key_path() -> Self {
		Self::from_single_segment(KEY_FIELD_NAME)
	}

	pub fn is_key_field_path(&self) -> bool {
		self.segments.len() == 1 && self.segments[0] == KEY_FIELD_NAME
	}

	/// Parses the canonical server format: dot-separated segments, each
	/// either a simple identifier or a backtick-quoted string in which
	/// backslash escapes the next character.
	pub fn from_server_format(path: &str) -> CuResult<Self> {
		let mut segments = Vec::new();
		let mut segment = String::new();
		let mut in_backticks = false;
		let mut chars = path.chars();

		let invalid = || Error::InvalidArgument(format!("invalid field path: {}", path));

		while let Some(c) = chars.next() {
			match c {
				'\\' => match chars.next() {
					Some(escaped) => segment.push(escaped),
					None => return Err(invalid()),
				},
				'`' => in_backticks = !in_backticks,
				'.' if !in_backticks => {
					if segment.is_empty() {
						return Err(invalid());
					}
					segments.push(std::mem::take(&mut segment));
				}
				_ => segment.push(c),
			}
		}
		if in_backticks || segment.is_empty() {
			return Err(invalid());
		}
		segments.push(segment);

		Ok(Self { segments })
	}

	pub fn segments(&self) -> &[String] {
		&self.segments
	}

	pub fn len(&self) -> usize {
		self.segments.len()
	}

	pub fn is_empty(&self) -> bool {
		self.segments.is_empty()
	}

	pub fn first_segment(&self) -> Option<&str> {
		self.segments.first().map(String::as_str)
	}

	pub fn last_segment(&self) -> Option<&str> {
		self.segments.last().map(String::as_str)
	}

	pub fn append(&self, segment: impl Into<String>) -> Self {
		let mut segments = self.segments.clone();
		segments.push(segment.into());
		Self { segments }
	}

	pub fn pop_first(&self) -> Self {
		Self { segments: self.segments[1..].to_vec() }
	}

	pub fn pop_last(&self) -> Self {
		let mut segments = self.segments.clone();
		segments.pop();
		Self { segments }
	}

	pub fn is_prefix_of(&self, other: &FieldPath) -> bool {
		self.segments.len() <= other.segments.len()
			&& self.segments.iter().zip(&other.segments).all(|(a, b)| a == b)
	}

	/// The canonical server format, quoting segments that are not simple
	/// identifiers.
	pub fn canonical_string(&self) -> String {
		let mut out = String::new();
		for (i, segment) in self.segments.iter().enumerate() {
			if i > 0 {
				out.push('.');
			}
			if needs_quoting(segment) {
				out.push('`');
				for c in segment.chars() {
					if c == '`' || c == '\\' {
						out.push('\\');
					}
					out.push(c);
				}
				out.push('`');
			} else {
				out.push_str(segment);
			}
		}
		out
	}
}

fn needs_quoting(segment: &str) -> bool {
	let mut chars = segment.chars();
	match chars.next() {
		Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
		_ => return true,
	}
	!chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl fmt::Display for FieldPath {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", self.canonical_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_resource_path_parse() {
		let path = ResourcePath::parse("rooms/firstroom/messages").unwrap();
		assert_eq!(path.len(), 3);
		assert_eq!(path.get(1), Some("firstroom"));

		assert!(ResourcePath::parse("rooms//messages").is_err());
		assert!(ResourcePath::parse("").unwrap().is_empty());
		assert_eq!(ResourcePath::parse("/rooms/").unwrap().len(), 1);
	}

	#[test]
	fn test_resource_path_relations() {
		let rooms = ResourcePath::parse("rooms").unwrap();
		let room = ResourcePath::parse("rooms/firstroom").unwrap();
		let messages = ResourcePath::parse("rooms/firstroom/messages").unwrap();

		assert!(rooms.is_prefix_of(&room));
		assert!(rooms.is_prefix_of(&messages));
		assert!(rooms.is_immediate_parent_of(&room));
		assert!(!rooms.is_immediate_parent_of(&messages));
		assert_eq!(messages.pop_last(), room);
	}

	#[test]
	fn test_resource_path_ordering() {
		let a = ResourcePath::parse("coll").unwrap();
		let b = ResourcePath::parse("coll/doc").unwrap();
		let c = ResourcePath::parse("colz").unwrap();

		assert!(a < b, "prefix sorts before extension");
		assert!(b < c);
	}

	#[test]
	fn test_field_path_server_format() {
		let plain = FieldPath::from_server_format("foo.bar").unwrap();
		assert_eq!(plain.segments(), ["foo", "bar"]);

		let quoted = FieldPath::from_server_format("foo.`has.dots`").unwrap();
		assert_eq!(quoted.segments(), ["foo", "has.dots"]);

		let escaped = FieldPath::from_server_format("`back\\`tick`").unwrap();
		assert_eq!(escaped.segments(), ["back`tick"]);

		assert!(FieldPath::from_server_format("foo..bar").is_err());
		assert!(FieldPath::from_server_format("").is_err());
		assert!(FieldPath::from_server_format("`unterminated").is_err());
	}

	#[test]
	fn test_field_path_canonical_roundtrip() {
		for raw in ["a.b.c", "simple", "a.`has.dots`", "`0digit`"] {
			let parsed = FieldPath::from_server_format(raw).unwrap();
			let reparsed = FieldPath::from_server_format(&parsed.canonical_string()).unwrap();
			assert_eq!(parsed, reparsed, "canonical form of {:?} should roundtrip", raw);
		}
	}

	#[test]
	fn test_key_field_path() {
		assert!(FieldPath::key_path().is_key_field_path());
		assert!(!FieldPath::from_single_segment("name").is_key_field_path());
		assert_eq!(FieldPath::key_path().canonical_string(), "__name__");
	}
}

// vim: ts=4
