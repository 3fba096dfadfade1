//! Overlays: the precomputed net effect of pending writes on one document.

use cumulo_types::key::DocumentKey;
use cumulo_types::prelude::*;

use crate::document::MutableDocument;
use crate::mutation::Mutation;
use crate::object_value::FieldMask;

/// A single mutation equivalent to replaying every pending batch that
/// touches one document, tagged with the largest batch id that contributed.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
	largest_batch_id: BatchId,
	mutation: Mutation,
}

impl Overlay {
	pub fn new(largest_batch_id: BatchId, mutation: Mutation) -> Self {
		Self { largest_batch_id, mutation }
	}

	pub fn largest_batch_id(&self) -> BatchId {
		self.largest_batch_id
	}

	pub fn mutation(&self) -> &Mutation {
		&self.mutation
	}

	pub fn key(&self) -> &DocumentKey {
		self.mutation.key()
	}
}

/// A document with its overlay applied, remembering which fields the overlay
/// mutated. `mutated_fields` of `None` means the overlay replaced the whole
/// document.
#[derive(Debug, Clone)]
pub struct OverlayedDocument {
	pub document: MutableDocument,
	pub mutated_fields: Option<FieldMask>,
}

// vim: ts=4
