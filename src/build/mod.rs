//! Bundle-specific building blocks.
//!
//! - [`context`] - names and paths derived from the build configuration
//! - [`toolchain`] - populating toolchain directories from prebuilt trees
//! - [`licenses`] - the aggregated license notice

pub mod context;
pub mod licenses;
pub mod toolchain;
