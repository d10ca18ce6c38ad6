//! Content-addressed blob storage for Arbor.
//!
//! Every file version written to a branch has its bytes stored here, keyed by
//! the BLAKE3 digest of the content. Branches only ever hold
//! [`BlobAddress`](arbor_types::BlobAddress) references; this crate is the
//! only place raw bytes live.
//!
//! # Storage Backends
//!
//! All backends implement the [`BlobStore`] trait:
//!
//! - [`InMemoryBlobStore`] -- `HashMap`-based store for tests and embedding
//! - [`FsBlobStore`] -- one file per blob under a sharded directory tree
//!
//! [`BlobStores`] lazily provisions one store per project and resolves
//! addresses back to their store.
//!
//! # Design Rules
//!
//! 1. Blobs are immutable; `put` is an idempotent upsert keyed by hash.
//! 2. Zero-length content is a valid, addressable blob.
//! 3. Unknown hashes yield `Ok(None)` / `Ok(false)`, never an error.
//! 4. Concurrent puts of the same content are safe without extra locking.
//! 5. Nothing in this crate deletes blobs; retention is handled elsewhere.

pub mod error;
pub mod fs;
pub mod memory;
pub mod registry;
pub mod traits;

pub use error::{BlobError, BlobResult};
pub use fs::FsBlobStore;
pub use memory::InMemoryBlobStore;
pub use registry::{BlobBackend, BlobStores};
pub use traits::{BlobReader, BlobStore};
