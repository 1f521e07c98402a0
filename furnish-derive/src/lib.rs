//! Derive macros for furnish.
//!
//! Re-exported by the `furnish` facade; depend on that instead.

pub use furnish_macros::*;
