//! Orderings over documents.

use std::cmp::Ordering;

use cumulo_model::MutableDocument;
use cumulo_types::path::FieldPath;
use cumulo_types::value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
	Ascending,
	Descending,
}

impl Direction {
	pub fn canonical_name(&self) -> &'static str {
		match self {
			Direction::Ascending => "asc",
			Direction::Descending => "desc",
		}
	}

	pub fn invert(&self) -> Direction {
		match self {
			Direction::Ascending => Direction::Descending,
			Direction::Descending => Direction::Ascending,
		}
	}

	fn apply(&self, ordering: Ordering) -> Ordering {
		match self {
			Direction::Ascending => ordering,
			Direction::Descending => ordering.reverse(),
		}
	}
}

/// One component of a query's ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
	field: FieldPath,
	direction: Direction,
}

impl OrderBy {
	pub fn new(field: FieldPath, direction: Direction) -> Self {
		Self { field, direction }
	}

	pub fn ascending(field: FieldPath) -> Self {
		Self::new(field, Direction::Ascending)
	}

	pub fn field(&self) -> &FieldPath {
		&self.field
	}

	pub fn direction(&self) -> Direction {
		self.direction
	}

	pub fn invert(&self) -> OrderBy {
		Self::new(self.field.clone(), self.direction.invert())
	}

	/// Compares two documents on this component. Documents missing the
	/// ordered field sort before documents that have it; queries exclude
	/// them before ordering matters.
	pub fn compare(&self, lhs: &MutableDocument, rhs: &MutableDocument) -> Ordering {
		if self.field.is_key_field_path() {
			return self.direction.apply(lhs.key().cmp(rhs.key()));
		}
		let ordering = match (lhs.field(&self.field), rhs.field(&self.field)) {
			(Some(a), Some(b)) => value::compare(a, b),
			(None, Some(_)) => Ordering::Less,
			(Some(_), None) => Ordering::Greater,
			(None, None) => Ordering::Equal,
		};
		self.direction.apply(ordering)
	}

	pub fn canonical_id(&self) -> String {
		format!("{}{}", self.field.canonical_string(), self.direction.canonical_name())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use cumulo_model::ObjectValue;
	use cumulo_types::key::DocumentKey;
	use cumulo_types::types::{SnapshotVersion, Timestamp};
	use serde_json::json;

	fn doc(path: &str, data: serde_json::Value) -> MutableDocument {
		MutableDocument::found(
			DocumentKey::parse(path).unwrap(),
			SnapshotVersion::new(Timestamp::new(1, 0)),
			ObjectValue::from_json(&data),
		)
	}

	fn field(path: &str) -> FieldPath {
		FieldPath::from_server_format(path).unwrap()
	}

	#[test]
	fn test_field_ordering() {
		let small = doc("coll/a", json!({"n": 1}));
		let large = doc("coll/b", json!({"n": 2}));

		let asc = OrderBy::ascending(field("n"));
		assert_eq!(asc.compare(&small, &large), Ordering::Less);

		let desc = OrderBy::new(field("n"), Direction::Descending);
		assert_eq!(desc.compare(&small, &large), Ordering::Greater);
	}

	#[test]
	fn test_key_ordering() {
		let a = doc("coll/a", json!({}));
		let b = doc("coll/b", json!({}));

		let by_key = OrderBy::ascending(FieldPath::key_path());
		assert_eq!(by_key.compare(&a, &b), Ordering::Less);
		assert_eq!(by_key.invert().compare(&a, &b), Ordering::Greater);
	}
}

// vim: ts=4
