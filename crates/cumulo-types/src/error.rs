//! Error handling subsystem. Implements a custom Error type.

use std::fmt;

use crate::prelude::*;

pub type CuResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	/// A referenced entity (batch, target, document) does not exist.
	NotFound,

	/// Input violates a documented constraint (bad path, empty segment, ...).
	InvalidArgument(String),

	/// Persisted state could not be interpreted (unknown type tag, bad bytes).
	DataCorruption(String),

	/// An internal invariant failed. Debug builds assert before this is built.
	Internal(String),

	/// Transient failure in the backing store; the surrounding transaction
	/// has been rolled back.
	Store(String),

	// externals
	Io(std::io::Error),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Error::NotFound => write!(f, "not found"),
			Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
			Error::DataCorruption(msg) => write!(f, "data corruption: {}", msg),
			Error::Internal(msg) => write!(f, "internal error: {}", msg),
			Error::Store(msg) => write!(f, "store error: {}", msg),
			Error::Io(err) => write!(f, "io error: {}", err),
		}
	}
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		warn!("io error: {}", err);
		Self::Io(err)
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Self::DataCorruption(err.to_string())
	}
}

/// Builds an `Error::Internal` after tripping a debug assertion, so invariant
/// violations abort in debug builds and bubble in release builds.
pub fn internal(msg: impl Into<String>) -> Error {
	let msg = msg.into();
	debug_assert!(false, "internal invariant violated: {}", msg);
	Error::Internal(msg)
}

// vim: ts=4
