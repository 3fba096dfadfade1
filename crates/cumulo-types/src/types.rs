//! Core identifier and version newtypes shared across the client.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a mutation batch, assigned monotonically per user.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct BatchId(pub i32);

impl BatchId {
	/// Sentinel for "no batch": smaller than every assigned id.
	pub const NONE: BatchId = BatchId(-1);

	pub fn next(self) -> BatchId {
		BatchId(self.0 + 1)
	}
}

/// Process-local identifier of an allocated target.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct TargetId(pub i32);

/// Monotonic sequence number used to order target activity for GC.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct ListenSequenceNumber(pub i64);

impl ListenSequenceNumber {
	pub fn next(self) -> ListenSequenceNumber {
		ListenSequenceNumber(self.0 + 1)
	}
}

/// The user a mutation queue is scoped to. Unauthenticated clients share a
/// single anonymous queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct User(Option<Box<str>>);

impl User {
	pub fn unauthenticated() -> Self {
		Self(None)
	}

	pub fn new(uid: impl Into<Box<str>>) -> Self {
		Self(Some(uid.into()))
	}

	pub fn is_authenticated(&self) -> bool {
		self.0.is_some()
	}

	pub fn uid(&self) -> Option<&str> {
		self.0.as_deref()
	}
}

impl fmt::Display for User {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match &self.0 {
			Some(uid) => write!(f, "{}", uid),
			None => write!(f, "(anonymous)"),
		}
	}
}

/// Identifies a database instance: `projects/<project>/databases/<database>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DatabaseId {
	pub project_id: Box<str>,
	pub database_id: Box<str>,
}

impl DatabaseId {
	pub const DEFAULT_DATABASE_ID: &'static str = "(default)";

	pub fn new(project_id: impl Into<Box<str>>, database_id: impl Into<Box<str>>) -> Self {
		Self { project_id: project_id.into(), database_id: database_id.into() }
	}

	pub fn from_project(project_id: impl Into<Box<str>>) -> Self {
		Self::new(project_id, Self::DEFAULT_DATABASE_ID)
	}
}

impl fmt::Display for DatabaseId {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "projects/{}/databases/{}", self.project_id, self.database_id)
	}
}

/// A point in time with nanosecond precision, ordered by (seconds, nanos).
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Timestamp {
	seconds: i64,
	nanos: i32,
}

impl Timestamp {
	pub fn new(seconds: i64, nanos: i32) -> Self {
		debug_assert!((0..1_000_000_000).contains(&nanos), "nanos out of range: {}", nanos);
		Self { seconds, nanos }
	}

	/// The current wall-clock time.
	pub fn now() -> Self {
		let now = chrono::Utc::now();
		Self { seconds: now.timestamp(), nanos: now.timestamp_subsec_nanos() as i32 }
	}

	pub fn seconds(&self) -> i64 {
		self.seconds
	}

	pub fn nanos(&self) -> i32 {
		self.nanos
	}
}

impl fmt::Display for Timestamp {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "time({},{})", self.seconds, self.nanos)
	}
}

/// The version of a document or snapshot as reported by the server.
///
/// `SnapshotVersion::NONE` (all zeroes) means "no known version" and is used
/// both for documents that only exist locally and for synthesized events.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct SnapshotVersion(Timestamp);

impl SnapshotVersion {
	pub const NONE: SnapshotVersion = SnapshotVersion(Timestamp { seconds: 0, nanos: 0 });

	pub fn new(timestamp: Timestamp) -> Self {
		Self(timestamp)
	}

	pub fn timestamp(&self) -> Timestamp {
		self.0
	}

	pub fn is_none(&self) -> bool {
		*self == Self::NONE
	}
}

impl fmt::Display for SnapshotVersion {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "v{}", self.0)
	}
}


// vim: ts=4
