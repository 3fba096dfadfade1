//! Targets: the canonical server-facing form of a query.

use std::fmt;
use std::fmt::Write as _;
use std::hash::{Hash, Hasher};

use cumulo_types::path::ResourcePath;
use cumulo_types::prelude::*;

use crate::bound::Bound;
use crate::filter::Filter;
use crate::order_by::OrderBy;

/// The unit of subscription: collection path or group, filters, normalized
/// order, limit, and cursor bounds. Targets derived from limit-to-last
/// queries arrive here with their order already inverted, so equal targets
/// always share a canonical id.
#[derive(Debug, Clone)]
pub struct Target {
	path: ResourcePath,
	collection_group: Option<String>,
	filters: Vec<Filter>,
	order_bys: Vec<OrderBy>,
	limit: Option<i32>,
	start_at: Option<Bound>,
	end_at: Option<Bound>,
}

impl Target {
	pub fn new(
		path: ResourcePath,
		collection_group: Option<String>,
		filters: Vec<Filter>,
		order_bys: Vec<OrderBy>,
		limit: Option<i32>,
		start_at: Option<Bound>,
		end_at: Option<Bound>,
	) -> Self {
		Self { path, collection_group, filters, order_bys, limit, start_at, end_at }
	}

	pub fn path(&self) -> &ResourcePath {
		&self.path
	}

	pub fn collection_group(&self) -> Option<&str> {
		self.collection_group.as_deref()
	}

	pub fn filters(&self) -> &[Filter] {
		&self.filters
	}

	pub fn order_bys(&self) -> &[OrderBy] {
		&self.order_bys
	}

	pub fn limit(&self) -> Option<i32> {
		self.limit
	}

	pub fn start_at(&self) -> Option<&Bound> {
		self.start_at.as_ref()
	}

	pub fn end_at(&self) -> Option<&Bound> {
		self.end_at.as_ref()
	}

	/// A deterministic identity string: equal targets produce equal ids.
	pub fn canonical_id(&self) -> String {
		let mut out = self.path.canonical_string();
		if let Some(group) = &self.collection_group {
			let _ = write!(out, "|cg:{}", group);
		}
		out.push_str("|f:");
		for filter in &self.filters {
			out.push_str(&filter.canonical_id());
		}
		out.push_str("|ob:");
		for order_by in &self.order_bys {
			out.push_str(&order_by.canonical_id());
		}
		if let Some(limit) = self.limit {
			let _ = write!(out, "|l:{}", limit);
		}
		if let Some(bound) = &self.start_at {
			let _ = write!(out, "|lb:{}", bound.canonical_id());
		}
		if let Some(bound) = &self.end_at {
			let _ = write!(out, "|ub:{}", bound.canonical_id());
		}
		out
	}
}

impl PartialEq for Target {
	fn eq(&self, other: &Self) -> bool {
		self.canonical_id() == other.canonical_id()
	}
}

impl Eq for Target {}

impl Hash for Target {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.canonical_id().hash(state);
	}
}

impl fmt::Display for Target {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "Target({})", self.canonical_id())
	}
}

/// Why a target is being listened to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPurpose {
	/// An ordinary client listen.
	Listen,
	/// Refreshing a target whose existence filter disagreed with the local
	/// view.
	ExistenceFilterMismatch,
	/// A short-lived single-document listen probing a limbo document.
	LimboResolution,
}

/// A target plus the local bookkeeping the store needs to resume and
/// garbage collect it.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetData {
	target: Target,
	target_id: TargetId,
	sequence_number: ListenSequenceNumber,
	purpose: QueryPurpose,
	snapshot_version: SnapshotVersion,
	last_limbo_free_snapshot_version: SnapshotVersion,
	resume_token: Vec<u8>,
	expected_count: Option<i32>,
}

impl TargetData {
	pub fn new(
		target: Target,
		target_id: TargetId,
		sequence_number: ListenSequenceNumber,
		purpose: QueryPurpose,
	) -> Self {
		Self {
			target,
			target_id,
			sequence_number,
			purpose,
			snapshot_version: SnapshotVersion::NONE,
			last_limbo_free_snapshot_version: SnapshotVersion::NONE,
			resume_token: Vec::new(),
			expected_count: None,
		}
	}

	pub fn target(&self) -> &Target {
		&self.target
	}

	pub fn target_id(&self) -> TargetId {
		self.target_id
	}

	pub fn sequence_number(&self) -> ListenSequenceNumber {
		self.sequence_number
	}

	pub fn purpose(&self) -> QueryPurpose {
		self.purpose
	}

	pub fn snapshot_version(&self) -> SnapshotVersion {
		self.snapshot_version
	}

	pub fn last_limbo_free_snapshot_version(&self) -> SnapshotVersion {
		self.last_limbo_free_snapshot_version
	}

	pub fn resume_token(&self) -> &[u8] {
		&self.resume_token
	}

	pub fn expected_count(&self) -> Option<i32> {
		self.expected_count
	}

	pub fn with_resume_token(
		mut self,
		resume_token: Vec<u8>,
		snapshot_version: SnapshotVersion,
	) -> Self {
		self.resume_token = resume_token;
		self.snapshot_version = snapshot_version;
		// A new token invalidates any previously reported count.
		self.expected_count = None;
		self
	}

	pub fn with_sequence_number(mut self, sequence_number: ListenSequenceNumber) -> Self {
		self.sequence_number = sequence_number;
		self
	}

	pub fn with_last_limbo_free_snapshot_version(mut self, version: SnapshotVersion) -> Self {
		self.last_limbo_free_snapshot_version = version;
		self
	}

	pub fn with_expected_count(mut self, expected_count: Option<i32>) -> Self {
		self.expected_count = expected_count;
		self
	}
}

// vim: ts=4
