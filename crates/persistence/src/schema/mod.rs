//! Model schemas and property descriptors.
//!
//! Models are declared explicitly: properties are built with
//! [`PropertyDescriptor`] constructors, registered in order on a
//! [`SchemaBuilder`] together with the model's named queries, and the frozen
//! [`Schema`] is added to a [`SchemaRegistry`].

mod model;
pub mod property;
mod registry;

pub use model::{PrimaryIndex, Schema, SchemaBuilder};
pub use property::{PropertyBuilder, PropertyDescriptor, PropertyKind, StorageDestination};
pub use registry::SchemaRegistry;
