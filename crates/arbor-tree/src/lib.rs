//! Pure tree model for Arbor.
//!
//! Everything here is a referentially transparent function over
//! [`Tree`](arbor_types::Tree) values: no I/O, no clocks, no errors. Absent
//! paths produce empty results rather than failures.
//!
//! # Key Items
//!
//! - [`apply_patch`] / [`classify_patch`] -- fold a patch into a tree, and
//!   describe what it changed
//! - [`diff_trees`] / [`apply_diff`] -- what one tree must apply to become another
//! - [`plan_merge`] -- turn a diff into conditional writes under a [`MergeStrategy`]

pub mod diff;
pub mod merge;
pub mod patch;

pub use diff::{apply_diff, diff_trees, DiffEntry};
pub use merge::{
    plan_merge, resolve_last_write_wins, Conflict, MergePlan, MergeStrategy, MergeWrite,
    Resolution,
};
pub use patch::{apply_patch, classify_patch, fold_patches, PathChange};
