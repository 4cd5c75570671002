//! Shared helpers used by the substrate and its binaries.

pub mod bootstrap;
pub mod retry;
