//! Subcommand implementations.

pub mod presets;
pub mod process;
pub mod validate;
