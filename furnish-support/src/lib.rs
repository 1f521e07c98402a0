//! # Furnish Support
//!
//! Shared utilities for the furnish crates.
//!
//! This crate provides:
//! - Text rendering for resolution diagnostics (cycles, ambiguous
//!   factories, "did you mean?" hints)

pub mod rendering;
