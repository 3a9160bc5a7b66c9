//! Executors that mutate the bundle tree or delegate to external programs.
//!
//! - [`directories`] - clobbering and scaffolding
//! - [`files`] - applying resolved [`crate::install::FileMapping`]s
//! - [`commands`] - running hook programs

pub mod commands;
pub mod directories;
pub mod files;
