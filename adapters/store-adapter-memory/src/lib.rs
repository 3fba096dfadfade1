#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

//! In-memory implementation of the cumulo persistence contracts.
//!
//! Backs the local store entirely with process memory: handy for tests, and
//! the reference implementation of the iteration-order and transactional
//! semantics every persistent backend has to provide. Transactions are
//! sequence-number ticks; nothing survives the process.

mod document_overlay_cache;
mod index_manager;
mod mutation_queue;
mod remote_document_cache;
mod target_cache;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use cumulo::prelude::*;
use cumulo::types::User;
use cumulo_local::persistence::{
	Persistence, SharedDocumentOverlayCache, SharedIndexManager, SharedMutationQueue,
	SharedRemoteDocumentCache, SharedTargetCache,
};

pub use document_overlay_cache::MemoryDocumentOverlayCache;
pub use index_manager::MemoryIndexManager;
pub use mutation_queue::MemoryMutationQueue;
pub use remote_document_cache::MemoryRemoteDocumentCache;
pub use target_cache::MemoryTargetCache;

/// Memory-backed persistence. Component handles are created lazily per user
/// where the contract is user-scoped and shared otherwise.
pub struct MemoryPersistence {
	remote_document_cache: SharedRemoteDocumentCache,
	target_cache: SharedTargetCache,
	index_manager: SharedIndexManager,
	mutation_queues: HashMap<User, SharedMutationQueue>,
	overlay_caches: HashMap<User, SharedDocumentOverlayCache>,
	sequence_number: ListenSequenceNumber,
	overlay_migration_pending: bool,
}

impl Default for MemoryPersistence {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryPersistence {
	pub fn new() -> Self {
		let remote_document_cache: SharedRemoteDocumentCache =
			Arc::new(RwLock::new(MemoryRemoteDocumentCache::new()));
		let target_cache: SharedTargetCache = Arc::new(RwLock::new(MemoryTargetCache::new()));
		let index_manager: SharedIndexManager = Arc::new(RwLock::new(MemoryIndexManager::new()));

		Self {
			remote_document_cache,
			target_cache,
			index_manager,
			mutation_queues: HashMap::new(),
			overlay_caches: HashMap::new(),
			sequence_number: ListenSequenceNumber(0),
			overlay_migration_pending: false,
		}
	}

	/// Marks overlays as needing a rebuild on the next store start, the way
	/// a persistent backend would after a schema migration.
	pub fn set_overlay_migration_pending(&mut self) {
		self.overlay_migration_pending = true;
	}
}

impl Persistence for MemoryPersistence {
	fn mutation_queue(&mut self, user: &User) -> SharedMutationQueue {
		self.mutation_queues
			.entry(user.clone())
			.or_insert_with(|| {
				debug!("creating mutation queue for user {}", user);
				Arc::new(RwLock::new(MemoryMutationQueue::new()))
			})
			.clone()
	}

	fn document_overlay_cache(&mut self, user: &User) -> SharedDocumentOverlayCache {
		self.overlay_caches
			.entry(user.clone())
			.or_insert_with(|| Arc::new(RwLock::new(MemoryDocumentOverlayCache::new())))
			.clone()
	}

	fn remote_document_cache(&self) -> SharedRemoteDocumentCache {
		self.remote_document_cache.clone()
	}

	fn index_manager(&self) -> SharedIndexManager {
		self.index_manager.clone()
	}

	fn target_cache(&self) -> SharedTargetCache {
		self.target_cache.clone()
	}

	fn current_sequence_number(&self) -> ListenSequenceNumber {
		self.sequence_number
	}

	fn begin_transaction(&mut self, label: &str) {
		self.sequence_number = self.sequence_number.next();
		debug!("begin transaction: {}", label);
	}

	fn commit_transaction(&mut self) {
		// Memory state is the committed state; nothing to flush.
	}

	fn overlay_migration_pending(&self) -> bool {
		self.overlay_migration_pending
	}

	fn set_overlay_migration_complete(&mut self) {
		self.overlay_migration_pending = false;
	}
}

// vim: ts=4
