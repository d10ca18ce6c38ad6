//! Branch engine for Arbor.
//!
//! A [`Branch`] owns one named tree and its append-only patch log. Every
//! mutation (single writes, deletes, transactional batches, merges, soft
//! deletes) becomes exactly one [`TreePatch`](arbor_types::TreePatch) with
//! the next gapless id, persisted before it becomes visible and then fanned
//! out to watchers.
//!
//! # Components
//!
//! - [`BranchNamespace`] -- maps names to their single engine instance
//! - [`Branch`] -- reads, writes, transactions, fork/diff/merge, watch
//! - [`BranchStorage`] -- durable patch log + state snapshot, with
//!   [`InMemoryBranchStorage`] and [`FileBranchStorage`] implementations
//! - [`FilePatch`] / [`TransactionResult`] -- transactional write batches
//!
//! # Recovery
//!
//! A branch loads lazily: its last state snapshot, then every logged patch
//! past the snapshot's `seq`. A crash between appending a patch and saving
//! the snapshot therefore loses nothing.

pub mod branch;
pub mod config;
pub mod error;
pub mod file;
pub mod namespace;
pub mod state;
pub mod storage;
pub mod transaction;

pub use branch::{Branch, MergeResult};
pub use config::EngineConfig;
pub use error::{BranchError, BranchResult};
pub use file::FileBranchStorage;
pub use namespace::BranchNamespace;
pub use state::{BranchState, NewBranch};
pub use storage::{BranchStorage, InMemoryBranchStorage};
pub use transaction::{FilePatch, TransactionResult, WriteResult};
