//! Test infrastructure for the hybrid persistence layer.
//!
//! This module provides the `User` fixture schema, store construction over
//! the in-memory backends, and shared assertions.

#![allow(dead_code)]

pub mod assertions;
pub mod fixtures;

// Re-export commonly used items
pub use assertions::*;
pub use fixtures::*;
