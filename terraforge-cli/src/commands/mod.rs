//! Subcommand implementations.

pub mod config;
pub mod fetch_area;
pub mod locate;
pub mod snapshot;
