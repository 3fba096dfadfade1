#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

//! Document and mutation model.
//!
//! Documents evolve through a pipeline of remote snapshots and local
//! mutations. This crate defines the document states, the structured object
//! values they carry, the mutation variants that change them, batches of
//! mutations, and the per-document overlays that summarize pending batches.

use std::collections::{BTreeMap, BTreeSet};

use cumulo_types::key::DocumentKey;

pub mod document;
pub mod field_index;
pub mod mutation;
pub mod mutation_batch;
pub mod object_value;
pub mod overlay;

/// Documents keyed and ordered by document key.
pub type DocumentMap = BTreeMap<DocumentKey, document::MutableDocument>;

/// An ordered set of document keys.
pub type DocumentKeySet = BTreeSet<DocumentKey>;

pub use document::MutableDocument;
pub use field_index::{FieldIndex, IndexOffset, IndexState, Segment, SegmentKind};
pub use mutation::{FieldTransform, Mutation, MutationResult, Precondition, TransformOperation};
pub use mutation_batch::{MutationBatch, MutationBatchResult};
pub use object_value::{FieldMask, ObjectValue};
pub use overlay::{Overlay, OverlayedDocument};

// vim: ts=4
