//! Hybrid Persistence Layer
//!
//! This crate stores each entity across two backends: a primary store with
//! structured filters and strongly consistent key lookups, and a search index
//! with a richer query grammar. Model schemas declare, per property, which
//! backend holds it and which comparison operators it supports; named
//! queries are analyzed once and routed to whichever backend can answer them.
//!
//! # Features
//!
//! - **Typed schemas**: text, integer, float, boolean, timestamp, geo-point
//!   and reference properties with validation and default values
//! - **Query planning**: predicate trees are checked against each backend's
//!   constraints and compiled into a primary filter or a search query string
//! - **Parameter binding**: positional and named parameters with defaults,
//!   bound per invocation
//! - **Hybrid writes**: search documents are written first so that new
//!   entities take their primary key from the assigned document id; unchanged
//!   entities are not rewritten
//! - **Batching**: multi-entity writes use one backend call per index batch
//!
//! Available backend features:
//! - `memory` (default) - in-memory reference backends
//!
//! # Architecture
//!
//! - [`types`] - Field values, keys and backend record shapes
//! - [`error`] - Error types for all operations
//! - [`config`] - Store configuration
//! - [`schema`] - Property descriptors, model schemas and the schema registry
//! - [`query`] - Predicate trees, binding, analysis and compilation
//! - [`core`] - Backend client traits
//! - [`hybrid`] - Entities, the two-phase writer and the [`HybridStore`]
//! - [`backends`] - Backend implementations
//!
//! # Quick Start
//!
//! ```
//! use hybrid_persistence::query::{Param, Query};
//! use hybrid_persistence::schema::{PropertyDescriptor, Schema};
//!
//! let username = PropertyDescriptor::text("username").max_len(50).build().unwrap();
//! let age = PropertyDescriptor::integer("age").build().unwrap();
//!
//! let schema = Schema::builder("User")
//!     .property(username.clone())
//!     .property(age.clone())
//!     .query("by_username", Query::by(&username).unwrap())
//!     .query(
//!         "adults_named",
//!         Query::new(vec![
//!             username.eq(Param::positional()).unwrap(),
//!             age.ge(18).unwrap(),
//!         ]),
//!     )
//!     .build()
//!     .unwrap();
//!
//! assert!(schema.query("by_username").unwrap().uses_primary_store());
//! assert_eq!(
//!     schema.query("adults_named").unwrap().describe(),
//!     "AND(username = ?, age >= 18)"
//! );
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod config;
pub mod core;
pub mod error;
pub mod hybrid;
pub mod query;
pub mod schema;
pub mod types;

// Re-export commonly used types at crate root
pub use config::HybridConfig;
pub use error::{StorageError, StorageResult};
pub use hybrid::{Entity, HybridStore, SaveOutcome};
pub use query::{Query, QueryArgs};
pub use schema::{PropertyDescriptor, Schema, SchemaRegistry};
pub use types::{DocumentId, EntityKey, FieldValue};

// Re-export backend traits
pub use core::{PrimaryStore, SearchIndex};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
