//! Field and composite filters.

use std::cmp::Ordering;
use std::fmt;

use cumulo_model::MutableDocument;
use cumulo_types::path::FieldPath;
use cumulo_types::value::{self, Value};

/// A filter is either a single field comparison or a boolean combination of
/// sub-filters.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
	Field(FieldFilter),
	Composite(CompositeFilter),
}

impl Filter {
	pub fn matches(&self, doc: &MutableDocument) -> bool {
		match self {
			Filter::Field(filter) => filter.matches(doc),
			Filter::Composite(filter) => filter.matches(doc),
		}
	}

	pub fn canonical_id(&self) -> String {
		match self {
			Filter::Field(filter) => filter.canonical_id(),
			Filter::Composite(filter) => filter.canonical_id(),
		}
	}

	/// All field filters reachable through composite nesting, in pre-order.
	pub fn flattened_filters(&self) -> Vec<&FieldFilter> {
		match self {
			Filter::Field(filter) => vec![filter],
			Filter::Composite(filter) => {
				filter.filters().iter().flat_map(Filter::flattened_filters).collect()
			}
		}
	}

	pub fn as_field_filter(&self) -> Option<&FieldFilter> {
		match self {
			Filter::Field(filter) => Some(filter),
			Filter::Composite(_) => None,
		}
	}

	pub fn as_composite_filter(&self) -> Option<&CompositeFilter> {
		match self {
			Filter::Composite(filter) => Some(filter),
			Filter::Field(_) => None,
		}
	}
}

impl fmt::Display for Filter {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", self.canonical_id())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
	LessThan,
	LessThanOrEqual,
	Equal,
	NotEqual,
	GreaterThanOrEqual,
	GreaterThan,
	ArrayContains,
	In,
	ArrayContainsAny,
	NotIn,
}

impl Operator {
	pub fn canonical_name(&self) -> &'static str {
		match self {
			Operator::LessThan => "<",
			Operator::LessThanOrEqual => "<=",
			Operator::Equal => "==",
			Operator::NotEqual => "!=",
			Operator::GreaterThanOrEqual => ">=",
			Operator::GreaterThan => ">",
			Operator::ArrayContains => "array_contains",
			Operator::In => "in",
			Operator::ArrayContainsAny => "array-contains-any",
			Operator::NotIn => "not-in",
		}
	}

	/// Operators that constrain a field to a range (and therefore force an
	/// ordering on that field).
	pub fn is_inequality(&self) -> bool {
		matches!(
			self,
			Operator::LessThan
				| Operator::LessThanOrEqual
				| Operator::GreaterThan
				| Operator::GreaterThanOrEqual
				| Operator::NotEqual
				| Operator::NotIn
		)
	}

	pub fn is_array_operator(&self) -> bool {
		matches!(self, Operator::ArrayContains | Operator::ArrayContainsAny)
	}
}

/// A single comparison between a document field and a literal value.
///
/// Filters on the reserved `__name__` field compare document keys; their
/// value must be a reference (or an array of references for in/not-in).
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
	field: FieldPath,
	op: Operator,
	value: Value,
}

impl FieldFilter {
	pub fn new(field: FieldPath, op: Operator, value: Value) -> Self {
		if field.is_key_field_path() {
			debug_assert!(!op.is_array_operator(), "array operators do not apply to keys");
			match op {
				Operator::In | Operator::NotIn => {
					debug_assert!(value.is_array(), "key in/not-in requires an array value")
				}
				_ => debug_assert!(
					matches!(value, Value::Reference { .. }),
					"key filters require a reference value"
				),
			}
		} else if matches!(op, Operator::In | Operator::NotIn | Operator::ArrayContainsAny) {
			debug_assert!(value.is_array(), "{} requires an array value", op.canonical_name());
		}
		Self { field, op, value }
	}

	pub fn field(&self) -> &FieldPath {
		&self.field
	}

	pub fn op(&self) -> Operator {
		self.op
	}

	pub fn value(&self) -> &Value {
		&self.value
	}

	pub fn is_inequality(&self) -> bool {
		self.op.is_inequality()
	}

	pub fn matches(&self, doc: &MutableDocument) -> bool {
		if self.field.is_key_field_path() {
			return self.matches_key_field(doc);
		}
		self.matches_value(doc.field(&self.field))
	}

	/// Evaluates the filter against a raw field value (`None` = missing).
	/// Key-field filters cannot be evaluated this way.
	pub fn matches_value(&self, lhs: Option<&Value>) -> bool {
		debug_assert!(!self.field.is_key_field_path(), "key filters need the document key");
		let Some(lhs) = lhs else {
			// A missing field never matches, not even for != and not-in.
			return false;
		};
		match self.op {
			Operator::ArrayContains => match lhs.as_array() {
				Some(elements) => elements.iter().any(|e| value::equals(e, &self.value)),
				None => false,
			},
			Operator::ArrayContainsAny => match (lhs.as_array(), self.value.as_array()) {
				(Some(elements), Some(rhs)) => {
					elements.iter().any(|e| rhs.iter().any(|r| value::equals(e, r)))
				}
				_ => false,
			},
			Operator::In => match self.value.as_array() {
				Some(rhs) => rhs.iter().any(|r| value::equals(lhs, r)),
				None => false,
			},
			Operator::NotIn => match self.value.as_array() {
				Some(rhs) => {
					if rhs.iter().any(Value::is_null) {
						return false;
					}
					// Null and NaN field values never satisfy not-in.
					if lhs.is_null() || lhs.is_nan() {
						return false;
					}
					!rhs.iter().any(|r| value::equals(lhs, r))
				}
				None => false,
			},
			// != matches across types: any existing value that is not equal.
			Operator::NotEqual => self.matches_comparison(value::compare(lhs, &self.value)),
			_ => {
				value::comparable(lhs.type_order(), self.value.type_order())
					&& self.matches_comparison(value::compare(lhs, &self.value))
			}
		}
	}

	fn matches_key_field(&self, doc: &MutableDocument) -> bool {
		match self.op {
			Operator::In => match self.value.as_array() {
				Some(refs) => refs.iter().any(|r| reference_key_equals(r, doc)),
				None => false,
			},
			Operator::NotIn => match self.value.as_array() {
				Some(refs) => !refs.iter().any(|r| reference_key_equals(r, doc)),
				None => false,
			},
			Operator::ArrayContains | Operator::ArrayContainsAny => false,
			_ => match &self.value {
				Value::Reference { key, .. } => {
					self.matches_comparison(doc.key().cmp(key))
				}
				_ => false,
			},
		}
	}

	fn matches_comparison(&self, comparison: Ordering) -> bool {
		match self.op {
			Operator::LessThan => comparison == Ordering::Less,
			Operator::LessThanOrEqual => comparison != Ordering::Greater,
			Operator::Equal => comparison == Ordering::Equal,
			Operator::NotEqual => comparison != Ordering::Equal,
			Operator::GreaterThanOrEqual => comparison != Ordering::Less,
			Operator::GreaterThan => comparison == Ordering::Greater,
			_ => unreachable!("operator {} is not a comparison", self.op.canonical_name()),
		}
	}

	pub fn canonical_id(&self) -> String {
		format!(
			"{}{}{}",
			self.field.canonical_string(),
			self.op.canonical_name(),
			self.value.canonical_id()
		)
	}
}

fn reference_key_equals(value: &Value, doc: &MutableDocument) -> bool {
	matches!(value, Value::Reference { key, .. } if key == doc.key())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeOperator {
	And,
	Or,
}

impl CompositeOperator {
	pub fn canonical_name(&self) -> &'static str {
		match self {
			CompositeOperator::And => "and",
			CompositeOperator::Or => "or",
		}
	}
}

/// A boolean combination of sub-filters. Child order is the user-specified
/// order and is significant for the canonical id.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeFilter {
	op: CompositeOperator,
	filters: Vec<Filter>,
}

impl CompositeFilter {
	pub fn new(op: CompositeOperator, filters: Vec<Filter>) -> Self {
		Self { op, filters }
	}

	pub fn and(filters: Vec<Filter>) -> Self {
		Self::new(CompositeOperator::And, filters)
	}

	pub fn or(filters: Vec<Filter>) -> Self {
		Self::new(CompositeOperator::Or, filters)
	}

	pub fn op(&self) -> CompositeOperator {
		self.op
	}

	pub fn filters(&self) -> &[Filter] {
		&self.filters
	}

	pub fn is_empty(&self) -> bool {
		self.filters.is_empty()
	}

	pub fn is_conjunction(&self) -> bool {
		self.op == CompositeOperator::And
	}

	pub fn is_disjunction(&self) -> bool {
		self.op == CompositeOperator::Or
	}

	/// True when every child is a field filter.
	pub fn is_flat(&self) -> bool {
		self.filters.iter().all(|f| matches!(f, Filter::Field(_)))
	}

	pub fn with_added_filters(&self, extra: impl IntoIterator<Item = Filter>) -> CompositeFilter {
		let mut filters = self.filters.clone();
		filters.extend(extra);
		Self::new(self.op, filters)
	}

	pub fn matches(&self, doc: &MutableDocument) -> bool {
		match self.op {
			CompositeOperator::And => self.filters.iter().all(|f| f.matches(doc)),
			CompositeOperator::Or => self.filters.iter().any(|f| f.matches(doc)),
		}
	}

	pub fn canonical_id(&self) -> String {
		let children: Vec<String> = self.filters.iter().map(Filter::canonical_id).collect();
		format!("{}({})", self.op.canonical_name(), children.join(","))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use cumulo_model::ObjectValue;
	use cumulo_types::key::DocumentKey;
	use cumulo_types::types::{DatabaseId, SnapshotVersion, Timestamp};
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

	fn filter(path: &str, op: Operator, value: serde_json::Value) -> FieldFilter {
		FieldFilter::new(field(path), op, Value::from_json(&value))
	}

	#[test]
	fn test_comparison_operators() {
		let d = doc("coll/a", json!({"n": 5}));

		assert!(filter("n", Operator::Equal, json!(5)).matches(&d));
		assert!(filter("n", Operator::LessThan, json!(6)).matches(&d));
		assert!(filter("n", Operator::LessThanOrEqual, json!(5)).matches(&d));
		assert!(filter("n", Operator::GreaterThan, json!(4)).matches(&d));
		assert!(!filter("n", Operator::GreaterThan, json!(5)).matches(&d));
		assert!(filter("n", Operator::GreaterThanOrEqual, json!(5)).matches(&d));
	}

	#[test]
	fn test_missing_field_never_matches() {
		let d = doc("coll/a", json!({"other": 1}));

		assert!(!filter("n", Operator::Equal, json!(1)).matches(&d));
		assert!(!filter("n", Operator::NotEqual, json!(1)).matches(&d));
		assert!(!filter("n", Operator::NotIn, json!([1])).matches(&d));
	}

	#[test]
	fn test_cross_type_comparisons() {
		let d = doc("coll/a", json!({"n": "string"}));

		// Range comparisons require comparable types.
		assert!(!filter("n", Operator::LessThan, json!(100)).matches(&d));
		assert!(!filter("n", Operator::Equal, json!(100)).matches(&d));
		// != matches any existing, non-equal value, across types.
		assert!(filter("n", Operator::NotEqual, json!(100)).matches(&d));
	}

	#[test]
	fn test_null_and_nan_equality() {
		let with_null = doc("coll/a", json!({"x": null}));
		assert!(filter("x", Operator::Equal, json!(null)).matches(&with_null));
		assert!(!filter("x", Operator::Equal, json!(0)).matches(&with_null));

		let with_nan = MutableDocument::found(
			DocumentKey::parse("coll/b").unwrap(),
			SnapshotVersion::new(Timestamp::new(1, 0)),
			ObjectValue::from_map(
				[("x".to_string(), Value::Double(f64::NAN))].into_iter().collect(),
			),
		);
		let nan_filter = FieldFilter::new(field("x"), Operator::Equal, Value::Double(f64::NAN));
		assert!(nan_filter.matches(&with_nan));
		assert!(!nan_filter.matches(&with_null));
	}

	#[test]
	fn test_array_contains() {
		let d = doc("coll/a", json!({"tags": ["a", "b"], "scalar": "a"}));

		assert!(filter("tags", Operator::ArrayContains, json!("a")).matches(&d));
		assert!(!filter("tags", Operator::ArrayContains, json!("c")).matches(&d));
		assert!(!filter("scalar", Operator::ArrayContains, json!("a")).matches(&d));

		assert!(filter("tags", Operator::ArrayContainsAny, json!(["c", "b"])).matches(&d));
		assert!(!filter("tags", Operator::ArrayContainsAny, json!(["c", "d"])).matches(&d));
	}

	#[test]
	fn test_in_and_not_in() {
		let d = doc("coll/a", json!({"n": 2}));

		assert!(filter("n", Operator::In, json!([1, 2])).matches(&d));
		assert!(!filter("n", Operator::In, json!([3])).matches(&d));

		assert!(filter("n", Operator::NotIn, json!([1, 3])).matches(&d));
		assert!(!filter("n", Operator::NotIn, json!([2])).matches(&d));
		// A null in the rhs list makes not-in match nothing.
		assert!(!filter("n", Operator::NotIn, json!([1, null])).matches(&d));

		// Null and NaN field values are excluded even when absent from the
		// rhs list.
		let with_null = doc("coll/b", json!({"n": null}));
		assert!(!filter("n", Operator::NotIn, json!([1, 3])).matches(&with_null));

		let with_nan = MutableDocument::found(
			DocumentKey::parse("coll/c").unwrap(),
			SnapshotVersion::new(Timestamp::new(1, 0)),
			ObjectValue::from_map(
				[("n".to_string(), Value::Double(f64::NAN))].into_iter().collect(),
			),
		);
		assert!(!filter("n", Operator::NotIn, json!([1, 3])).matches(&with_nan));
	}

	#[test]
	fn test_key_field_filters() {
		let d = doc("coll/b", json!({}));
		let reference = |path: &str| Value::Reference {
			database: DatabaseId::from_project("p"),
			key: DocumentKey::parse(path).unwrap(),
		};

		let eq = FieldFilter::new(FieldPath::key_path(), Operator::Equal, reference("coll/b"));
		assert!(eq.matches(&d));

		let gt = FieldFilter::new(FieldPath::key_path(), Operator::GreaterThan, reference("coll/a"));
		assert!(gt.matches(&d));

		let key_in = FieldFilter::new(
			FieldPath::key_path(),
			Operator::In,
			Value::Array(vec![reference("coll/a"), reference("coll/b")]),
		);
		assert!(key_in.matches(&d));

		let key_not_in = FieldFilter::new(
			FieldPath::key_path(),
			Operator::NotIn,
			Value::Array(vec![reference("coll/b")]),
		);
		assert!(!key_not_in.matches(&d));
	}

	#[test]
	fn test_composite_filters() {
		let d = doc("coll/a", json!({"a": 1, "b": 2}));
		let a_is_1 = Filter::Field(filter("a", Operator::Equal, json!(1)));
		let b_is_9 = Filter::Field(filter("b", Operator::Equal, json!(9)));

		assert!(CompositeFilter::and(vec![a_is_1.clone()]).matches(&d));
		assert!(!CompositeFilter::and(vec![a_is_1.clone(), b_is_9.clone()]).matches(&d));
		assert!(CompositeFilter::or(vec![a_is_1, b_is_9]).matches(&d));
	}

	#[test]
	fn test_canonical_ids() {
		let f = filter("a", Operator::Equal, json!(1));
		assert_eq!(f.canonical_id(), "a==1");

		let composite = CompositeFilter::or(vec![
			Filter::Field(filter("a", Operator::Equal, json!(1))),
			Filter::Field(filter("b", Operator::LessThan, json!(2))),
		]);
		assert_eq!(composite.canonical_id(), "or(a==1,b<2)");
	}
}

// vim: ts=4
