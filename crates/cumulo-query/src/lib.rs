#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

//! Query and target representation.
//!
//! A `Query` is what the user builds: filters, explicit orderings, cursor
//! bounds, and a limit applied to the first or last results. A `Target` is
//! the canonical server-facing form of a query; equal targets share a
//! canonical id and can be deduplicated and persisted. Composite filters
//! normalize to disjunctive normal form before they reach the backend.

pub mod bound;
pub mod dnf;
pub mod filter;
pub mod order_by;
pub mod query;
pub mod target;

pub use bound::Bound;
pub use filter::{CompositeFilter, CompositeOperator, FieldFilter, Filter, Operator};
pub use order_by::{Direction, OrderBy};
pub use query::{LimitType, Query};
pub use target::{QueryPurpose, Target, TargetData};

// vim: ts=4
