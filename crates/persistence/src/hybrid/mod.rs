//! Hybrid persistence over a primary store and a search index.
//!
//! - [`Entity`] - a model instance with typed field values
//! - [`HybridEntity`] - the per-backend projection used for one save or delete
//! - [`BatchWriter`] - two-phase batched writes
//! - [`HybridStore`] - the entry point wiring backends, schemas and configuration
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use hybrid_persistence::backends::memory::{MemoryPrimaryStore, MemorySearchIndex};
//! use hybrid_persistence::config::HybridConfig;
//! use hybrid_persistence::hybrid::{HybridStore, SaveOutcome};
//! use hybrid_persistence::query::{Query, QueryArgs};
//! use hybrid_persistence::schema::{PropertyDescriptor, Schema, SchemaRegistry};
//!
//! # tokio_test_block(async {
//! let username = PropertyDescriptor::text("username").max_len(50).build().unwrap();
//! let schema = Schema::builder("User")
//!     .property(username.clone())
//!     .query("by_username", Query::by(&username).unwrap())
//!     .build()
//!     .unwrap();
//! let registry = SchemaRegistry::new().with(schema).unwrap();
//!
//! let store = HybridStore::new(
//!     Arc::new(MemoryPrimaryStore::new()),
//!     Arc::new(MemorySearchIndex::new()),
//!     registry,
//!     HybridConfig::default(),
//! )
//! .unwrap();
//!
//! let mut user = store.create("User").unwrap();
//! user.set("username", "alice").unwrap();
//! assert_eq!(store.save(&mut user).await.unwrap(), SaveOutcome::Written);
//! assert_eq!(store.save(&mut user).await.unwrap(), SaveOutcome::NoOp);
//!
//! let found = store
//!     .invoke("User", "by_username", &QueryArgs::new().arg("alice"))
//!     .await
//!     .unwrap();
//! assert_eq!(found, vec![user]);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

mod entity;
mod model;
mod store;
mod writer;

pub use entity::{HybridEntity, SaveOutcome};
pub use model::Entity;
pub use store::HybridStore;
pub use writer::BatchWriter;
