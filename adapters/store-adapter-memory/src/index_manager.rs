//! In-memory index manager.
//!
//! Maintains the collection-parent index used by collection-group queries
//! and user-configured field-value indexes. The field index stores the
//! decoded segment values per document and evaluates target constraints at
//! lookup time; candidates are a superset of the true matches and the query
//! engine re-applies the full predicate, the same contract a persistent
//! order-preserving encoding would satisfy.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use cumulo::key::DocumentKey;
use cumulo::path::{FieldPath, ResourcePath};
use cumulo::prelude::*;
use cumulo::value::Value;
use cumulo_local::{IndexManager, IndexType};
use cumulo_model::{
	DocumentMap, FieldIndex, IndexOffset, MutableDocument, Segment, SegmentKind,
};
use cumulo_query::dnf;
use cumulo_query::{CompositeFilter, FieldFilter, Filter, Operator, OrderBy, Target};

#[derive(Debug, Default)]
pub struct MemoryIndexManager {
	collection_parents: BTreeMap<String, BTreeSet<ResourcePath>>,
	field_indexes: Vec<FieldIndex>,
	next_index_id: i32,
	next_sequence_number: ListenSequenceNumber,
	/// Per index id: the indexed segment values of every indexed document.
	entries: HashMap<i32, BTreeMap<DocumentKey, Vec<Value>>>,
}

impl MemoryIndexManager {
	pub fn new() -> Self {
		Self { next_sequence_number: ListenSequenceNumber(1), ..Self::default() }
	}
}

impl IndexManager for MemoryIndexManager {
	fn add_to_collection_parent_index(&mut self, collection_path: &ResourcePath) {
		debug_assert!(collection_path.len() % 2 == 1, "expected a collection path");
		let Some(collection_id) = collection_path.last_segment() else { return };
		let parent = collection_path.pop_last();
		self.collection_parents.entry(collection_id.to_string()).or_default().insert(parent);
	}

	fn collection_parents(&self, collection_id: &str) -> Vec<ResourcePath> {
		self.collection_parents
			.get(collection_id)
			.map(|parents| parents.iter().cloned().collect())
			.unwrap_or_default()
	}

	fn add_field_index(&mut self, index: FieldIndex) {
		let index_id = if index.index_id() == FieldIndex::UNKNOWN_ID {
			let id = self.next_index_id;
			self.next_index_id += 1;
			id
		} else {
			self.next_index_id = self.next_index_id.max(index.index_id() + 1);
			index.index_id()
		};
		let index = FieldIndex::new(
			index_id,
			index.collection_group(),
			index.segments().to_vec(),
			index.state().clone(),
		);
		self.entries.insert(index_id, BTreeMap::new());
		self.field_indexes.push(index);
	}

	fn delete_field_index(&mut self, index: &FieldIndex) {
		self.field_indexes.retain(|existing| existing.index_id() != index.index_id());
		self.entries.remove(&index.index_id());
	}

	fn field_indexes(&self) -> Vec<FieldIndex> {
		self.field_indexes.clone()
	}

	fn field_indexes_for_group(&self, collection_group: &str) -> Vec<FieldIndex> {
		self.field_indexes
			.iter()
			.filter(|index| index.collection_group() == collection_group)
			.cloned()
			.collect()
	}

	fn index_type(&self, target: &Target) -> IndexType {
		let sub_targets = sub_targets(target);
		let mut result = IndexType::Full;
		for sub_target in &sub_targets {
			let Some(index) = self.matching_index(sub_target) else {
				return IndexType::None;
			};
			if index.segments().len() < sub_target.segment_count() {
				result = IndexType::Partial;
			}
		}
		// A limit cannot be served from multiple merged subqueries.
		if target.limit().is_some() && sub_targets.len() > 1 && result == IndexType::Full {
			result = IndexType::Partial;
		}
		result
	}

	fn documents_matching_target(&self, target: &Target) -> Option<Vec<DocumentKey>> {
		let mut keys = BTreeSet::new();
		for sub_target in sub_targets(target) {
			let index = self.matching_index(&sub_target)?;
			let entries = self.entries.get(&index.index_id())?;
			let indexed_fields: BTreeSet<&FieldPath> =
				index.segments().iter().map(|s| &s.field_path).collect();

			for key in entries.keys() {
				let matches = sub_target.filters.iter().all(|filter| {
					if !indexed_fields.contains(filter.field()) {
						// Unindexed constraints are checked by the engine.
						return true;
					}
					let doc_value = entry_value(index, entries, key, filter.field());
					filter_matches_entry(filter, doc_value.as_ref())
				});
				if matches {
					keys.insert(key.clone());
				}
			}
		}
		Some(keys.into_iter().collect())
	}

	fn min_offset(&self, target: &Target) -> IndexOffset {
		let mut offsets = Vec::new();
		for sub_target in sub_targets(target) {
			if let Some(index) = self.matching_index(&sub_target) {
				offsets.push(index.state().offset.clone());
			}
		}
		offsets.into_iter().min().unwrap_or_else(IndexOffset::none)
	}

	fn min_offset_for_collection_group(&self, collection_group: &str) -> IndexOffset {
		self.field_indexes
			.iter()
			.filter(|index| index.collection_group() == collection_group)
			.map(|index| index.state().offset.clone())
			.min()
			.unwrap_or_else(IndexOffset::none)
	}

	fn next_collection_group_to_update(&self) -> Option<String> {
		self.field_indexes
			.iter()
			.min_by_key(|index| (index.state().sequence_number, index.collection_group()))
			.map(|index| index.collection_group().to_string())
	}

	fn update_collection_group(&mut self, collection_group: &str, offset: IndexOffset) {
		let sequence_number = self.next_sequence_number;
		self.next_sequence_number = sequence_number.next();
		for index in &mut self.field_indexes {
			if index.collection_group() == collection_group {
				let mut state = index.state().clone();
				state.sequence_number = sequence_number;
				state.offset = offset.clone();
				index.set_state(state);
			}
		}
	}

	fn update_index_entries(&mut self, documents: &DocumentMap) {
		for (key, doc) in documents {
			for index in &self.field_indexes {
				if index.collection_group() != key.collection_id() {
					continue;
				}
				let Some(entries) = self.entries.get_mut(&index.index_id()) else { continue };
				match index_entry_values(index, doc) {
					Some(values) => {
						entries.insert(key.clone(), values);
					}
					// Sparse index: documents missing a segment field (or
					// deleted ones) have no entry.
					None => {
						entries.remove(key);
					}
				}
			}
		}
	}
}

impl MemoryIndexManager {
	/// The first configured index that can serve the sub-target.
	fn matching_index(&self, sub_target: &SubTarget<'_>) -> Option<&FieldIndex> {
		self.field_indexes
			.iter()
			.filter(|index| index.collection_group() == sub_target.collection_id)
			.find(|index| sub_target.served_by_index(index))
	}
}

/// The values a document contributes to an index, one per segment, or
/// `None` when the document cannot be indexed.
fn index_entry_values(index: &FieldIndex, doc: &MutableDocument) -> Option<Vec<Value>> {
	if !doc.is_found_document() {
		return None;
	}
	let mut values = Vec::with_capacity(index.segments().len());
	for segment in index.segments() {
		let value = doc.field(&segment.field_path)?;
		if segment.kind == SegmentKind::Contains && !value.is_array() {
			return None;
		}
		values.push(value.clone());
	}
	Some(values)
}

fn entry_value(
	index: &FieldIndex,
	entries: &BTreeMap<DocumentKey, Vec<Value>>,
	key: &DocumentKey,
	field: &FieldPath,
) -> Option<Value> {
	let position = index.segments().iter().position(|s| s.field_path == *field)?;
	entries.get(key).and_then(|values| values.get(position)).cloned()
}

fn filter_matches_entry(filter: &FieldFilter, value: Option<&Value>) -> bool {
	if filter.field().is_key_field_path() {
		// Key constraints are left to the engine's re-filtering.
		return true;
	}
	filter.matches_value(value)
}

/// One conjunction of the target's filter in disjunctive normal form,
/// paired with the ordering the index has to reproduce.
struct SubTarget<'a> {
	collection_id: String,
	filters: Vec<FieldFilter>,
	order_bys: &'a [OrderBy],
}

fn sub_targets(target: &Target) -> Vec<SubTarget<'_>> {
	let collection_id = target
		.collection_group()
		.map(str::to_string)
		.or_else(|| target.path().last_segment().map(str::to_string))
		.unwrap_or_default();

	if target.filters().is_empty() {
		return vec![SubTarget {
			collection_id,
			filters: Vec::new(),
			order_bys: target.order_bys(),
		}];
	}

	let conjunction = CompositeFilter::and(target.filters().to_vec());
	dnf::dnf_terms(&conjunction)
		.into_iter()
		.map(|term| {
			let filters = match &term {
				Filter::Field(field_filter) => vec![field_filter.clone()],
				Filter::Composite(_) => {
					term.flattened_filters().into_iter().cloned().collect()
				}
			};
			SubTarget { collection_id: collection_id.clone(), filters, order_bys: target.order_bys() }
		})
		.collect()
}

impl SubTarget<'_> {
	/// The number of index segments the sub-target needs for full service.
	fn segment_count(&self) -> usize {
		let mut fields = BTreeSet::new();
		let mut has_array_segment = false;
		for filter in &self.filters {
			if filter.field().is_key_field_path() {
				continue;
			}
			if filter.op().is_array_operator() {
				has_array_segment = true;
			} else {
				fields.insert(filter.field().clone());
			}
		}
		for order_by in self.order_bys {
			if !order_by.field().is_key_field_path() {
				fields.insert(order_by.field().clone());
			}
		}
		fields.len() + usize::from(has_array_segment)
	}

	/// Greedy segment matching: the array segment must be claimed by an
	/// array filter, equality filters may claim directional segments out of
	/// order, the inequality (if any) must align with the first unclaimed
	/// segment and the first order-by, and every remaining segment must
	/// follow the order-by prefix.
	fn served_by_index(&self, index: &FieldIndex) -> bool {
		let inequality_fields: BTreeSet<&FieldPath> = self
			.filters
			.iter()
			.filter(|f| f.is_inequality() && !f.field().is_key_field_path())
			.map(FieldFilter::field)
			.collect();
		if inequality_fields.len() > 1 {
			return false;
		}
		let inequality = self
			.filters
			.iter()
			.find(|f| f.is_inequality() && !f.field().is_key_field_path());

		if let Some(array_filter) =
			self.filters.iter().find(|f| f.op().is_array_operator())
		{
			match index.array_segment() {
				Some(segment) if segment.field_path == *array_filter.field() => {}
				_ => return false,
			}
		}

		let segments: Vec<&Segment> = index.directional_segments().collect();
		let mut order_bys = self.order_bys.iter().filter(|ob| !ob.field().is_key_field_path());
		let mut segment_index = 0;

		// Equalities can appear in any order and claim a prefix greedily.
		while segment_index < segments.len() {
			if !self.has_matching_equality_filter(segments[segment_index]) {
				break;
			}
			segment_index += 1;
		}
		if segment_index == segments.len() {
			return true;
		}

		if let Some(inequality) = inequality {
			let segment = segments[segment_index];
			if segment.field_path != *inequality.field() {
				return false;
			}
			match order_bys.next() {
				Some(order_by) if order_by_matches_segment(order_by, segment) => {}
				_ => return false,
			}
			segment_index += 1;
		}

		while segment_index < segments.len() {
			let segment = segments[segment_index];
			match order_bys.next() {
				Some(order_by) if order_by_matches_segment(order_by, segment) => {}
				_ => return false,
			}
			segment_index += 1;
		}
		true
	}

	fn has_matching_equality_filter(&self, segment: &Segment) -> bool {
		self.filters.iter().any(|filter| {
			filter.field() == &segment.field_path
				&& matches!(filter.op(), Operator::Equal | Operator::In)
		})
	}
}

fn order_by_matches_segment(order_by: &OrderBy, segment: &Segment) -> bool {
	if segment.field_path != *order_by.field() {
		return false;
	}
	match segment.kind {
		SegmentKind::Ascending => order_by.direction() == cumulo_query::Direction::Ascending,
		SegmentKind::Descending => order_by.direction() == cumulo_query::Direction::Descending,
		SegmentKind::Contains => false,
	}
}

// vim: ts=4
