#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

//! The local store pipeline.
//!
//! Applies remote snapshots and user writes atomically, maintains the
//! mapping from active targets to matching document keys, merges caches and
//! pending mutations into coherent local documents, and executes queries
//! with index-served, remote-key-served, or full-scan strategies.

pub mod backfill;
pub mod handle;
pub mod local_documents;
pub mod local_store;
pub mod persistence;
pub mod query_engine;
pub mod reference_set;
pub mod remote_event;

pub use backfill::{BackfillerConfig, IndexBackfiller};
pub use handle::LocalStoreHandle;
pub use local_documents::LocalDocumentsView;
pub use local_store::{
	GcPolicy, GcResults, LocalStore, LocalStoreConfig, LocalViewChanges, LocalWriteResult,
	LruParams, QueryResult,
};
pub use persistence::{
	DocumentOverlayCache, IndexManager, IndexType, MutationQueue, Persistence,
	RemoteDocumentCache, SharedDocumentOverlayCache, SharedIndexManager, SharedMutationQueue,
	SharedRemoteDocumentCache, SharedTargetCache, TargetCache,
};
pub use query_engine::QueryEngine;
pub use reference_set::ReferenceSet;
pub use remote_event::{RemoteEvent, TargetChange};

// vim: ts=4
