//! Primary store client trait.

use async_trait::async_trait;

use crate::error::BackendError;
use crate::query::PrimaryFilter;
use crate::types::{EntityKey, PrimaryRecord};

/// Client for the strongly consistent, strictly typed primary store.
///
/// The store supports equality and range filters, with at most one property
/// compared by an inequality per query. Implementations report failures as
/// [`BackendError`]; the hybrid layer propagates them unchanged.
#[async_trait]
pub trait PrimaryStore: Send + Sync {
    /// Name used in logs and errors.
    fn backend_name(&self) -> &'static str;

    /// Loads records by key. The result has one slot per key, in order.
    async fn get_multi(
        &self,
        keys: &[EntityKey],
    ) -> Result<Vec<Option<PrimaryRecord>>, BackendError>;

    /// Writes records, replacing any existing record under the same key.
    async fn put_multi(&self, records: Vec<PrimaryRecord>) -> Result<(), BackendError>;

    /// Deletes records by key. Missing keys are ignored.
    async fn delete_multi(&self, keys: &[EntityKey]) -> Result<(), BackendError>;

    /// Returns the records of `kind` matching `filter`, ordered by key.
    ///
    /// `None` returns every record of the kind.
    async fn query(
        &self,
        kind: &str,
        filter: Option<&PrimaryFilter>,
    ) -> Result<Vec<PrimaryRecord>, BackendError>;
}
