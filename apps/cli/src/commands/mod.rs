//! Subcommand implementations.

pub mod inspect;
pub mod list;
pub mod predict;
pub mod train;
