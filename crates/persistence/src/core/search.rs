//! Search index client trait.

use async_trait::async_trait;

use crate::error::BackendError;
use crate::types::{DocumentId, SearchDocument};

/// Client for the full-text/attribute search index.
///
/// Documents live in named indexes and are queried with a textual grammar.
/// Document ids are assigned by the index on first write.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Name used in logs and errors.
    fn backend_name(&self) -> &'static str;

    /// Loads documents by id. The result has one slot per id, in order.
    async fn get_multi(
        &self,
        index: &str,
        ids: &[DocumentId],
    ) -> Result<Vec<Option<SearchDocument>>, BackendError>;

    /// Writes documents and returns their ids in input order.
    ///
    /// Documents without an id are assigned one; documents with an id replace
    /// the stored document.
    async fn put(
        &self,
        index: &str,
        documents: Vec<SearchDocument>,
    ) -> Result<Vec<DocumentId>, BackendError>;

    /// Deletes documents by id. Missing ids are ignored.
    async fn delete(&self, index: &str, ids: &[DocumentId]) -> Result<(), BackendError>;

    /// Runs a query string and returns at most `limit` matching documents,
    /// each carrying its id.
    async fn search(
        &self,
        index: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchDocument>, BackendError>;
}
