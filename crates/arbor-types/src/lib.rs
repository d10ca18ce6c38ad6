//! Foundation types for Arbor.
//!
//! Arbor is a versioned, content-addressable file store: named branches each
//! hold a path → file mapping that evolves through an append-only sequence of
//! patches, with file contents kept in a deduplicating blob store. Every other
//! Arbor crate depends on `arbor-types`.
//!
//! # Key Types
//!
//! - [`BlobHash`]: BLAKE3 digest identifying a blob's content
//! - [`BlobAddress`]: `blobs:<store-id>:<hash>` reference into a project-scoped store
//! - [`FileMetadata`]: one tree entry (address, user metadata, size, mtime/ctime)
//! - [`Tree`]: materialized path → [`FileMetadata`] snapshot
//! - [`TreePatch`]: immutable, ordered delta applied to a tree
//! - [`PatchClock`]: strictly increasing millisecond timestamps for patches

pub mod blob;
pub mod clock;
pub mod error;
pub mod file;
pub mod tree;

pub use blob::{BlobAddress, BlobHash, BlobInfo};
pub use clock::{wall_clock_ms, PatchClock};
pub use error::TypeError;
pub use file::{FileMetadata, UserMetadata};
pub use tree::{ChangeKind, Tree, TreePatch};
