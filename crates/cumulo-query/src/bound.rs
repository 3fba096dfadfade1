//! Cursor bounds.

use std::cmp::Ordering;
use std::fmt::Write as _;

use cumulo_model::MutableDocument;
use cumulo_types::value::{self, Value};

use crate::order_by::OrderBy;

/// A position in a query's result order: one component value per order-by
/// component, prefix-wise, plus an inclusive flag that decides how ties at
/// exactly this position are treated.
#[derive(Debug, Clone, PartialEq)]
pub struct Bound {
	position: Vec<Value>,
	inclusive: bool,
}

impl Bound {
	pub fn new(position: Vec<Value>, inclusive: bool) -> Self {
		Self { position, inclusive }
	}

	pub fn position(&self) -> &[Value] {
		&self.position
	}

	pub fn is_inclusive(&self) -> bool {
		self.inclusive
	}

	/// Compares this position against the document, component-wise along
	/// the ordering.
	fn compare_to_document(&self, order_bys: &[OrderBy], doc: &MutableDocument) -> Ordering {
		for (component, order_by) in self.position.iter().zip(order_bys.iter()) {
			let ordering = if order_by.field().is_key_field_path() {
				match component {
					Value::Reference { key, .. } => key.cmp(doc.key()),
					// Bound positions on the key component must be
					// references; anything else sorts before every key.
					_ => Ordering::Less,
				}
			} else {
				match doc.field(order_by.field()) {
					Some(field_value) => value::compare(component, field_value),
					None => Ordering::Greater,
				}
			};
			let ordering = match order_by.direction() {
				crate::order_by::Direction::Ascending => ordering,
				crate::order_by::Direction::Descending => ordering.reverse(),
			};
			if ordering != Ordering::Equal {
				return ordering;
			}
		}
		Ordering::Equal
	}

	/// Whether a document comes at or after this bound when it is used as a
	/// start position.
	pub fn sorts_before_document(&self, order_bys: &[OrderBy], doc: &MutableDocument) -> bool {
		let ordering = self.compare_to_document(order_bys, doc);
		if self.inclusive { ordering != Ordering::Greater } else { ordering == Ordering::Less }
	}

	/// Whether a document comes at or before this bound when it is used as
	/// an end position.
	pub fn sorts_after_document(&self, order_bys: &[OrderBy], doc: &MutableDocument) -> bool {
		let ordering = self.compare_to_document(order_bys, doc);
		if self.inclusive { ordering != Ordering::Less } else { ordering == Ordering::Greater }
	}

	pub fn canonical_id(&self) -> String {
		let mut out = String::new();
		let _ = write!(out, "b:{}:", if self.inclusive { "i" } else { "e" });
		for (i, component) in self.position.iter().enumerate() {
			if i > 0 {
				out.push(',');
			}
			out.push_str(&component.canonical_id());
		}
		out
	}
}


// vim: ts=4
