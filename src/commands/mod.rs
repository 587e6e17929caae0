//! CLI command implementations.
//!
//! Each submodule implements one medbay CLI command with pure
//! formatting logic separated from IO for testability.

pub mod clean;
pub mod preview;
pub mod provision;
pub mod status;
pub mod terminate;
