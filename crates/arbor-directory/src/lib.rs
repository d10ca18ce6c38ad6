//! Branch directory for Arbor.
//!
//! A catalog of branch names with their creation time, free-form metadata,
//! and the branch they were forked from. The directory is bookkeeping for
//! listing and discovery only: the branch engine never consults it, and tree
//! content lives exclusively in the branch's own patch log.
//!
//! # Modules
//!
//! - [`error`]: Error types for catalog operations
//! - [`record`]: The [`BranchRecord`] catalog entry
//! - [`traits`]: The [`BranchCatalog`] trait
//! - [`names`]: Branch name validation
//! - [`memory`]: In-memory [`InMemoryBranchCatalog`]
//! - [`file`]: JSON-file [`JsonFileBranchCatalog`]

pub mod error;
pub mod file;
pub mod memory;
pub mod names;
pub mod record;
pub mod traits;

pub use error::{CatalogError, CatalogResult};
pub use file::JsonFileBranchCatalog;
pub use memory::InMemoryBranchCatalog;
pub use names::validate_branch_name;
pub use record::BranchRecord;
pub use traits::BranchCatalog;
