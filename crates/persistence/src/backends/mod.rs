//! Backend implementations.
//!
//! This module contains implementations of the [`PrimaryStore`] and
//! [`SearchIndex`] traits. Each backend is gated behind a feature flag.
//!
//! # Available Backends
//!
//! | Backend | Feature | Description |
//! |---------|---------|-------------|
//! | Memory | `memory` | Process-local primary store and search index, used by tests |
//!
//! # Example
//!
//! ```
//! # #[cfg(feature = "memory")]
//! # {
//! use hybrid_persistence::backends::memory::{MemoryPrimaryStore, MemorySearchIndex};
//! use hybrid_persistence::core::{PrimaryStore, SearchIndex};
//!
//! let primary = MemoryPrimaryStore::new();
//! let search = MemorySearchIndex::new();
//! assert_eq!(primary.backend_name(), "memory-primary");
//! assert_eq!(search.backend_name(), "memory-search");
//! # }
//! ```
//!
//! [`PrimaryStore`]: crate::core::PrimaryStore
//! [`SearchIndex`]: crate::core::SearchIndex

#[cfg(feature = "memory")]
pub mod memory;
