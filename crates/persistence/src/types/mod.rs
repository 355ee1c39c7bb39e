//! Core value, identity and record types.
//!
//! - [`FieldValue`] - typed values shared by models, queries and backends
//! - [`EntityKey`], [`DocumentId`] - the two linked entity identifiers
//! - [`PrimaryRecord`], [`SearchDocument`] - backend record shapes

mod key;
mod record;
mod value;

pub use key::{DocumentId, EntityKey};
pub use record::{FieldMap, PrimaryRecord, SearchDocument, diff_fields, merge_fields};
pub use value::{Distance, FieldValue, GeoPoint};
