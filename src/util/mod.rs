//! Utility modules.

pub mod usage;
