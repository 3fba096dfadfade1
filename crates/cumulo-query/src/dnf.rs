//! Disjunctive normal form.
//!
//! Composite filters normalize to an OR of ANDs before they are dispatched
//! to the backend: `in` filters expand into disjunctions of equalities,
//! same-operator nesting flattens, and conjunction distributes over
//! disjunction. Each resulting term becomes one backend subquery whose union
//! matches the original filter.

use crate::filter::{CompositeFilter, FieldFilter, Filter, Operator};

/// The terms of the filter's disjunctive normal form.
///
/// For `(A || B) && C` this returns `[A && C, B && C]`.
pub fn dnf_terms(filter: &CompositeFilter) -> Vec<Filter> {
	if filter.is_empty() {
		return Vec::new();
	}

	let expanded = compute_in_expansion(&Filter::Composite(filter.clone()));
	let normal_form = compute_distributed_normal_form(&expanded);
	debug_assert!(is_disjunctive_normal_form(&normal_form));

	match normal_form {
		Filter::Composite(composite) if composite.is_disjunction() => {
			composite.filters().to_vec()
		}
		term => vec![term],
	}
}

/// Rewrites every `in` filter into a disjunction of equalities:
/// `a in [1,2,3]` becomes `a==1 || a==2 || a==3`.
pub fn compute_in_expansion(filter: &Filter) -> Filter {
	match filter {
		Filter::Field(field_filter) if field_filter.op() == Operator::In => {
			let elements = field_filter.value().as_array().unwrap_or_default();
			let equalities = elements
				.iter()
				.map(|element| {
					Filter::Field(FieldFilter::new(
						field_filter.field().clone(),
						Operator::Equal,
						element.clone(),
					))
				})
				.collect();
			Filter::Composite(CompositeFilter::or(equalities))
		}
		Filter::Field(_) => filter.clone(),
		Filter::Composite(composite) => Filter::Composite(CompositeFilter::new(
			composite.op(),
			composite.filters().iter().map(compute_in_expansion).collect(),
		)),
	}
}

/// Flattens nested composites that share their parent's operator:
/// `A | (B | C)` becomes `A | B | C`.
fn apply_association(filter: &Filter) -> Filter {
	let Filter::Composite(composite) = filter else {
		return filter.clone();
	};
	if composite.filters().len() == 1 {
		return apply_association(&composite.filters()[0]);
	}

	let mut flattened = Vec::new();
	for subfilter in composite.filters() {
		match apply_association(subfilter) {
			Filter::Field(field_filter) => flattened.push(Filter::Field(field_filter)),
			Filter::Composite(nested) => {
				if nested.op() == composite.op() {
					flattened.extend(nested.filters().iter().cloned());
				} else {
					flattened.push(Filter::Composite(nested));
				}
			}
		}
	}
	if flattened.len() == 1 {
		return flattened.into_iter().next().unwrap_or_else(|| filter.clone());
	}
	Filter::Composite(CompositeFilter::new(composite.op(), flattened))
}

/// Distributes conjunction over disjunction: `P & (Q | R)` becomes
/// `(P & Q) | (P & R)`. Operand order is preserved so the resulting terms
/// read in the user-specified filter order.
fn apply_distribution(lhs: &Filter, rhs: &Filter) -> Filter {
	let result = match (lhs, rhs) {
		(Filter::Field(a), Filter::Field(b)) => Filter::Composite(CompositeFilter::and(vec![
			Filter::Field(a.clone()),
			Filter::Field(b.clone()),
		])),
		(Filter::Field(field), Filter::Composite(composite)) => {
			if composite.is_conjunction() {
				// A & (B & C) == (A & B & C)
				let mut filters = vec![Filter::Field(field.clone())];
				filters.extend(composite.filters().iter().cloned());
				Filter::Composite(CompositeFilter::and(filters))
			} else {
				// A & (B | C) == (A & B) | (A & C)
				let distributed = composite
					.filters()
					.iter()
					.map(|subfilter| apply_distribution(lhs, subfilter))
					.collect();
				Filter::Composite(CompositeFilter::or(distributed))
			}
		}
		(Filter::Composite(composite), Filter::Field(field)) => {
			if composite.is_conjunction() {
				// (A & B) & C == (A & B & C)
				Filter::Composite(
					composite.with_added_filters([Filter::Field(field.clone())]),
				)
			} else {
				// (A | B) & C == (A & C) | (B & C)
				let distributed = composite
					.filters()
					.iter()
					.map(|subfilter| apply_distribution(subfilter, rhs))
					.collect();
				Filter::Composite(CompositeFilter::or(distributed))
			}
		}
		(Filter::Composite(a), Filter::Composite(b)) => distribute_composites(a, b),
	};
	apply_association(&result)
}

fn distribute_composites(lhs: &CompositeFilter, rhs: &CompositeFilter) -> Filter {
	debug_assert!(!lhs.is_empty() && !rhs.is_empty());

	if lhs.is_conjunction() && rhs.is_conjunction() {
		// (A & B) & (C & D) == (A & B & C & D)
		return Filter::Composite(lhs.with_added_filters(rhs.filters().iter().cloned()));
	}

	// At least one side is a disjunction: distribute each of its terms
	// against the whole other side, keeping left-to-right order.
	// (A | B) & (C | D) == (A & C) | (A & D) | (B & C) | (B & D)
	// (A & B) & (C | D) == (A & B & C) | (A & B & D)
	let distributed = if lhs.is_disjunction() {
		lhs.filters()
			.iter()
			.map(|subfilter| apply_distribution(subfilter, &Filter::Composite(rhs.clone())))
			.collect()
	} else {
		rhs.filters()
			.iter()
			.map(|subfilter| apply_distribution(&Filter::Composite(lhs.clone()), subfilter))
			.collect()
	};
	Filter::Composite(CompositeFilter::or(distributed))
}

fn compute_distributed_normal_form(filter: &Filter) -> Filter {
	let Filter::Composite(composite) = filter else {
		return filter.clone();
	};
	if composite.filters().len() == 1 {
		return compute_distributed_normal_form(&composite.filters()[0]);
	}

	let normalized: Vec<Filter> =
		composite.filters().iter().map(compute_distributed_normal_form).collect();
	let associated =
		apply_association(&Filter::Composite(CompositeFilter::new(composite.op(), normalized)));

	if is_disjunctive_normal_form(&associated) {
		return associated;
	}

	// A conjunction with disjunctive children remains; distribute pairwise.
	let Filter::Composite(conjunction) = &associated else {
		return associated;
	};
	debug_assert!(conjunction.is_conjunction());
	let mut filters = conjunction.filters().iter();
	let Some(first) = filters.next() else {
		return associated.clone();
	};
	filters.fold(first.clone(), |result, next| apply_distribution(&result, next))
}

fn is_single_field_filter(filter: &Filter) -> bool {
	matches!(filter, Filter::Field(_))
}

fn is_flat_conjunction(filter: &Filter) -> bool {
	matches!(filter, Filter::Composite(c) if c.is_conjunction() && c.is_flat())
}

fn is_disjunction_of_flat_terms(filter: &Filter) -> bool {
	matches!(filter, Filter::Composite(c) if c.is_disjunction()
		&& c.filters().iter().all(|f| is_single_field_filter(f) || is_flat_conjunction(f)))
}

fn is_disjunctive_normal_form(filter: &Filter) -> bool {
	is_single_field_filter(filter)
		|| is_flat_conjunction(filter)
		|| is_disjunction_of_flat_terms(filter)
}

#[cfg(test)]
mod tests {
	use super::*;
	use cumulo_types::path::FieldPath;
	use cumulo_types::value::Value;
	use serde_json::json;

	fn filter(path: &str, op: Operator, value: serde_json::Value) -> Filter {
		Filter::Field(FieldFilter::new(
			FieldPath::from_server_format(path).unwrap(),
			op,
			Value::from_json(&value),
		))
	}

	fn canonical(filters: &[Filter]) -> Vec<String> {
		filters.iter().map(Filter::canonical_id).collect()
	}

	#[test]
	fn test_flat_conjunction_is_one_term() {
		let composite = CompositeFilter::and(vec![
			filter("a", Operator::Equal, json!(1)),
			filter("b", Operator::Equal, json!(2)),
		]);
		let terms = dnf_terms(&composite);
		assert_eq!(canonical(&terms), ["and(a==1,b==2)"]);
	}

	#[test]
	fn test_disjunction_terms() {
		let composite = CompositeFilter::or(vec![
			filter("a", Operator::Equal, json!(1)),
			filter("b", Operator::Equal, json!(2)),
		]);
		let terms = dnf_terms(&composite);
		assert_eq!(canonical(&terms), ["a==1", "b==2"]);
	}

	#[test]
	fn test_conjunction_distributes_over_disjunction() {
		// (a==1 || b==2) && c==3  =>  (a==1 && c==3) || (b==2 && c==3)
		let composite = CompositeFilter::and(vec![
			Filter::Composite(CompositeFilter::or(vec![
				filter("a", Operator::Equal, json!(1)),
				filter("b", Operator::Equal, json!(2)),
			])),
			filter("c", Operator::Equal, json!(3)),
		]);
		let terms = dnf_terms(&composite);
		assert_eq!(canonical(&terms), ["and(a==1,c==3)", "and(b==2,c==3)"]);
	}

	#[test]
	fn test_in_expansion() {
		// a==1 && b in [2,3]  =>  (a==1 && b==2) || (a==1 && b==3)
		let composite = CompositeFilter::and(vec![
			filter("a", Operator::Equal, json!(1)),
			filter("b", Operator::In, json!([2, 3])),
		]);
		let terms = dnf_terms(&composite);
		assert_eq!(canonical(&terms), ["and(a==1,b==2)", "and(a==1,b==3)"]);
	}

	#[test]
	fn test_nested_same_operator_flattens() {
		let composite = CompositeFilter::or(vec![
			filter("a", Operator::Equal, json!(1)),
			Filter::Composite(CompositeFilter::or(vec![
				filter("b", Operator::Equal, json!(2)),
				filter("c", Operator::Equal, json!(3)),
			])),
		]);
		let terms = dnf_terms(&composite);
		assert_eq!(canonical(&terms), ["a==1", "b==2", "c==3"]);
	}

	#[test]
	fn test_two_disjunctions_cross_product() {
		// (a==1 || b==2) && (c==3 || d==4)
		let composite = CompositeFilter::and(vec![
			Filter::Composite(CompositeFilter::or(vec![
				filter("a", Operator::Equal, json!(1)),
				filter("b", Operator::Equal, json!(2)),
			])),
			Filter::Composite(CompositeFilter::or(vec![
				filter("c", Operator::Equal, json!(3)),
				filter("d", Operator::Equal, json!(4)),
			])),
		]);
		let terms = dnf_terms(&composite);
		assert_eq!(terms.len(), 4);
		assert_eq!(
			canonical(&terms),
			[
				"and(a==1,c==3)",
				"and(a==1,d==4)",
				"and(b==2,c==3)",
				"and(b==2,d==4)",
			]
		);
	}

	#[test]
	fn test_single_in_filter() {
		let composite = CompositeFilter::and(vec![filter("a", Operator::In, json!([1, 2]))]);
		let terms = dnf_terms(&composite);
		assert_eq!(canonical(&terms), ["a==1", "a==2"]);
	}

	#[test]
	fn test_empty_filter_has_no_terms() {
		assert!(dnf_terms(&CompositeFilter::and(Vec::new())).is_empty());
	}
}

// vim: ts=4
