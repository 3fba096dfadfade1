//! User-level queries.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

use cumulo_model::MutableDocument;
use cumulo_types::key::DocumentKey;
use cumulo_types::path::{FieldPath, ResourcePath};

use crate::bound::Bound;
use crate::filter::Filter;
use crate::order_by::{Direction, OrderBy};
use crate::target::Target;

/// Whether a limit applies to the first or the last results in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LimitType {
	#[default]
	First,
	Last,
}

/// A query as the user built it: path or collection group, filters, explicit
/// order-bys, cursor bounds, and an optional limit-to-first/limit-to-last.
///
/// The normalized order and the lowered `Target` are derived lazily and
/// cached; all builder methods produce a fresh query with fresh caches.
#[derive(Debug, Clone)]
pub struct Query {
	path: ResourcePath,
	collection_group: Option<String>,
	filters: Vec<Filter>,
	explicit_order_bys: Vec<OrderBy>,
	limit: Option<i32>,
	limit_type: LimitType,
	start_at: Option<Bound>,
	end_at: Option<Bound>,
	memoized_order_bys: Arc<OnceLock<Vec<OrderBy>>>,
	memoized_target: Arc<OnceLock<Target>>,
}

impl Query {
	/// A query over a single collection (or a single document, when `path`
	/// has even length).
	pub fn new(path: ResourcePath) -> Self {
		Self::build(path, None, Vec::new(), Vec::new(), None, LimitType::First, None, None)
	}

	/// A query over every collection with the given id.
	pub fn collection_group(collection_id: impl Into<String>) -> Self {
		Self::build(
			ResourcePath::empty(),
			Some(collection_id.into()),
			Vec::new(),
			Vec::new(),
			None,
			LimitType::First,
			None,
			None,
		)
	}

	#[allow(clippy::too_many_arguments)]
	fn build(
		path: ResourcePath,
		collection_group: Option<String>,
		filters: Vec<Filter>,
		explicit_order_bys: Vec<OrderBy>,
		limit: Option<i32>,
		limit_type: LimitType,
		start_at: Option<Bound>,
		end_at: Option<Bound>,
	) -> Self {
		Self {
			path,
			collection_group,
			filters,
			explicit_order_bys,
			limit,
			limit_type,
			start_at,
			end_at,
			memoized_order_bys: Arc::new(OnceLock::new()),
			memoized_target: Arc::new(OnceLock::new()),
		}
	}

	fn rebuild(&self) -> Self {
		Self::build(
			self.path.clone(),
			self.collection_group.clone(),
			self.filters.clone(),
			self.explicit_order_bys.clone(),
			self.limit,
			self.limit_type,
			self.start_at.clone(),
			self.end_at.clone(),
		)
	}

	// MARK: builder methods

	pub fn adding_filter(&self, filter: Filter) -> Self {
		debug_assert!(!self.is_document_query(), "no filter is allowed for document queries");
		let mut query = self.rebuild();
		query.filters.push(filter);
		query
	}

	pub fn adding_order_by(&self, order_by: OrderBy) -> Self {
		debug_assert!(!self.is_document_query(), "no ordering is allowed for document queries");
		let mut query = self.rebuild();
		query.explicit_order_bys.push(order_by);
		query
	}

	pub fn with_limit_to_first(&self, limit: i32) -> Self {
		let mut query = self.rebuild();
		query.limit = Some(limit);
		query.limit_type = LimitType::First;
		query
	}

	pub fn with_limit_to_last(&self, limit: i32) -> Self {
		let mut query = self.rebuild();
		query.limit = Some(limit);
		query.limit_type = LimitType::Last;
		query
	}

	pub fn without_limit(&self) -> Self {
		let mut query = self.rebuild();
		query.limit = None;
		query.limit_type = LimitType::First;
		query
	}

	pub fn starting_at(&self, bound: Bound) -> Self {
		let mut query = self.rebuild();
		query.start_at = Some(bound);
		query
	}

	pub fn ending_at(&self, bound: Bound) -> Self {
		let mut query = self.rebuild();
		query.end_at = Some(bound);
		query
	}

	/// The same query rooted at a concrete collection path. Used to fan a
	/// collection-group query out over its parents.
	pub fn as_collection_query_at_path(&self, path: ResourcePath) -> Self {
		let mut query = self.rebuild();
		query.path = path;
		query.collection_group = None;
		query
	}

	// MARK: accessors

	pub fn path(&self) -> &ResourcePath {
		&self.path
	}

	pub fn collection_group_id(&self) -> Option<&str> {
		self.collection_group.as_deref()
	}

	pub fn filters(&self) -> &[Filter] {
		&self.filters
	}

	pub fn explicit_order_bys(&self) -> &[OrderBy] {
		&self.explicit_order_bys
	}

	pub fn limit(&self) -> Option<i32> {
		self.limit
	}

	pub fn limit_type(&self) -> LimitType {
		self.limit_type
	}

	pub fn has_limit_to_first(&self) -> bool {
		self.limit.is_some() && self.limit_type == LimitType::First
	}

	pub fn has_limit_to_last(&self) -> bool {
		self.limit.is_some() && self.limit_type == LimitType::Last
	}

	pub fn start_at(&self) -> Option<&Bound> {
		self.start_at.as_ref()
	}

	pub fn end_at(&self) -> Option<&Bound> {
		self.end_at.as_ref()
	}

	pub fn is_document_query(&self) -> bool {
		DocumentKey::is_document_key(&self.path)
			&& self.collection_group.is_none()
			&& self.filters.is_empty()
	}

	pub fn is_collection_group_query(&self) -> bool {
		self.collection_group.is_some()
	}

	/// True when the query has no constraints beyond its collection: such
	/// queries are cheapest as plain collection scans.
	pub fn matches_all_documents(&self) -> bool {
		self.filters.is_empty()
			&& self.limit.is_none()
			&& self.start_at.is_none()
			&& self.end_at.is_none()
			&& (self.explicit_order_bys.is_empty()
				|| (self.explicit_order_bys.len() == 1
					&& self.explicit_order_bys[0].field().is_key_field_path()))
	}

	/// Fields constrained by an inequality, in field order.
	pub fn inequality_filter_fields(&self) -> BTreeSet<FieldPath> {
		let mut fields = BTreeSet::new();
		for filter in &self.filters {
			for field_filter in filter.flattened_filters() {
				if field_filter.is_inequality() {
					fields.insert(field_filter.field().clone());
				}
			}
		}
		fields
	}

	/// The full ordering: explicit order-bys, then fields with inequality
	/// filters not yet ordered, then the document key. The implicit
	/// components inherit the direction of the last explicit order-by.
	pub fn normalized_order_bys(&self) -> &[OrderBy] {
		self.memoized_order_bys.get_or_init(|| {
			let mut result = self.explicit_order_bys.clone();
			let mut ordered_fields: BTreeSet<FieldPath> =
				result.iter().map(|ob| ob.field().clone()).collect();

			let last_direction = self
				.explicit_order_bys
				.last()
				.map_or(Direction::Ascending, OrderBy::direction);

			for field in self.inequality_filter_fields() {
				if !ordered_fields.contains(&field) && !field.is_key_field_path() {
					ordered_fields.insert(field.clone());
					result.push(OrderBy::new(field, last_direction));
				}
			}

			if !ordered_fields.contains(&FieldPath::key_path()) {
				result.push(OrderBy::new(FieldPath::key_path(), last_direction));
			}

			result
		})
	}

	// MARK: matching

	pub fn matches(&self, doc: &MutableDocument) -> bool {
		doc.is_found_document()
			&& self.matches_path_and_collection_group(doc)
			&& self.matches_order_by(doc)
			&& self.matches_filters(doc)
			&& self.matches_bounds(doc)
	}

	fn matches_path_and_collection_group(&self, doc: &MutableDocument) -> bool {
		let doc_path = doc.key().path();
		if let Some(group) = &self.collection_group {
			doc.key().has_collection_id(group) && self.path.is_prefix_of(doc_path)
		} else if DocumentKey::is_document_key(&self.path) {
			self.path == *doc_path
		} else {
			self.path.is_immediate_parent_of(doc_path)
		}
	}

	fn matches_filters(&self, doc: &MutableDocument) -> bool {
		self.filters.iter().all(|filter| filter.matches(doc))
	}

	/// Every ordered field must exist in the document. The implicit
	/// order-bys count: an inequality on `a` orders by `a`, so documents
	/// without `a` never match, even inside an OR.
	fn matches_order_by(&self, doc: &MutableDocument) -> bool {
		self.normalized_order_bys().iter().all(|order_by| {
			order_by.field().is_key_field_path() || doc.field(order_by.field()).is_some()
		})
	}

	fn matches_bounds(&self, doc: &MutableDocument) -> bool {
		let order_bys = self.normalized_order_bys();
		if let Some(bound) = &self.start_at {
			if !bound.sorts_before_document(order_bys, doc) {
				return false;
			}
		}
		if let Some(bound) = &self.end_at {
			if !bound.sorts_after_document(order_bys, doc) {
				return false;
			}
		}
		true
	}

	/// Compares two documents along the normalized ordering.
	pub fn compare_docs(&self, lhs: &MutableDocument, rhs: &MutableDocument) -> Ordering {
		for order_by in self.normalized_order_bys() {
			let ordering = order_by.compare(lhs, rhs);
			if ordering != Ordering::Equal {
				return ordering;
			}
		}
		Ordering::Equal
	}

	// MARK: lowering

	/// The canonical server-facing form. Limit-to-last queries invert their
	/// order-by directions and swap the cursor bounds, so a limit-to-last
	/// query and its mirrored limit-to-first twin lower to equal targets.
	pub fn to_target(&self) -> &Target {
		self.memoized_target.get_or_init(|| {
			let order_bys = self.normalized_order_bys();
			if self.limit_type == LimitType::Last {
				let inverted = order_bys.iter().map(OrderBy::invert).collect();
				// The cursors swap roles to match the now-flipped ordering.
				let start_at = self.end_at.clone();
				let end_at = self.start_at.clone();
				Target::new(
					self.path.clone(),
					self.collection_group.clone(),
					self.filters.clone(),
					inverted,
					self.limit,
					start_at,
					end_at,
				)
			} else {
				Target::new(
					self.path.clone(),
					self.collection_group.clone(),
					self.filters.clone(),
					order_bys.to_vec(),
					self.limit,
					self.start_at.clone(),
					self.end_at.clone(),
				)
			}
		})
	}

	pub fn canonical_id(&self) -> String {
		let target_id = self.to_target().canonical_id();
		if self.limit.is_some() {
			let suffix = if self.limit_type == LimitType::Last { "l" } else { "f" };
			format!("{}|lt:{}", target_id, suffix)
		} else {
			target_id
		}
	}
}

impl PartialEq for Query {
	fn eq(&self, other: &Self) -> bool {
		self.limit_type == other.limit_type && self.to_target() == other.to_target()
	}
}

impl Eq for Query {}

impl fmt::Display for Query {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "Query({})", self.canonical_id())
	}
}


// vim: ts=4
