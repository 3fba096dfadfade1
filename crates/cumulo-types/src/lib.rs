#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

//! Shared leaf types for the cumulo client core.
//!
//! This crate contains the foundational types every other cumulo crate builds
//! on: the error type, typed values and their cross-type total order, field
//! and resource paths, document keys, version/id newtypes, and the serial
//! worker that executes all state transitions.

pub mod error;
pub mod key;
pub mod path;
pub mod prelude;
pub mod types;
pub mod value;
pub mod worker;

// vim: ts=4
