//! Subcommand implementations.

pub mod build;
pub mod metadata;
pub mod tag;
