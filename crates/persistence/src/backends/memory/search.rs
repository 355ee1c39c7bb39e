//! In-memory search index.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, trace};
use uuid::Uuid;

use super::CallLog;
use super::grammar::SearchParser;
use crate::core::SearchIndex;
use crate::error::BackendError;
use crate::types::{DocumentId, FieldMap, SearchDocument};

const BACKEND_NAME: &str = "memory-search";

#[derive(Debug)]
struct StoredDocument {
    sequence: u64,
    fields: FieldMap,
}

#[derive(Debug, Default)]
struct SearchState {
    indexes: HashMap<String, BTreeMap<DocumentId, StoredDocument>>,
    next_sequence: u64,
    calls: CallLog,
}

/// A search index over per-index maps.
///
/// Documents without an id are assigned a random UUID. Search results are
/// returned in first-insertion order and evaluated with [`SearchParser`].
#[derive(Debug, Default)]
pub struct MemorySearchIndex {
    state: Mutex<SearchState>,
}

impl MemorySearchIndex {
    /// Creates an empty index set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `get_multi` calls.
    pub fn read_count(&self) -> usize {
        self.state.lock().calls.reads
    }

    /// Number of successful `put` and `delete` calls.
    pub fn write_count(&self) -> usize {
        self.state.lock().calls.writes
    }

    /// Number of successful `search` calls.
    pub fn search_count(&self) -> usize {
        self.state.lock().calls.queries
    }

    /// Number of documents in `index`.
    pub fn len(&self, index: &str) -> usize {
        self.state.lock().indexes.get(index).map_or(0, BTreeMap::len)
    }

    /// The document stored under `id`, bypassing the call counters.
    pub fn document(&self, index: &str, id: &DocumentId) -> Option<SearchDocument> {
        self.state
            .lock()
            .indexes
            .get(index)
            .and_then(|documents| documents.get(id))
            .map(|stored| SearchDocument::with_id(id.clone(), stored.fields.clone()))
    }

    /// Stores a document directly, bypassing the call counters.
    pub fn insert(&self, index: &str, id: DocumentId, fields: FieldMap) {
        let mut state = self.state.lock();
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state
            .indexes
            .entry(index.to_string())
            .or_default()
            .insert(id, StoredDocument { sequence, fields });
    }

    /// Makes the next write call fail as unavailable.
    pub fn fail_next_write(&self, message: impl Into<String>) {
        self.state.lock().calls.fail_write = Some(message.into());
    }

    /// Makes the next read or search call fail as unavailable.
    pub fn fail_next_read(&self, message: impl Into<String>) {
        self.state.lock().calls.fail_read = Some(message.into());
    }
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn get_multi(
        &self,
        index: &str,
        ids: &[DocumentId],
    ) -> Result<Vec<Option<SearchDocument>>, BackendError> {
        let mut state = self.state.lock();
        state.calls.read(BACKEND_NAME)?;
        let documents = state.indexes.get(index);
        Ok(ids
            .iter()
            .map(|id| {
                documents
                    .and_then(|documents| documents.get(id))
                    .map(|stored| SearchDocument::with_id(id.clone(), stored.fields.clone()))
            })
            .collect())
    }

    async fn put(
        &self,
        index: &str,
        documents: Vec<SearchDocument>,
    ) -> Result<Vec<DocumentId>, BackendError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.calls.write(BACKEND_NAME)?;

        let mut ids = Vec::with_capacity(documents.len());
        for document in documents {
            let id = document
                .id
                .unwrap_or_else(|| DocumentId::new(Uuid::new_v4().to_string()));
            let next = state.next_sequence;
            let entries = state.indexes.entry(index.to_string()).or_default();
            match entries.get_mut(&id) {
                Some(stored) => stored.fields = document.fields,
                None => {
                    entries.insert(
                        id.clone(),
                        StoredDocument {
                            sequence: next,
                            fields: document.fields,
                        },
                    );
                    state.next_sequence += 1;
                }
            }
            ids.push(id);
        }
        trace!(index, documents = ids.len(), "memory search put");
        Ok(ids)
    }

    async fn delete(&self, index: &str, ids: &[DocumentId]) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.calls.write(BACKEND_NAME)?;
        if let Some(documents) = state.indexes.get_mut(index) {
            for id in ids {
                documents.remove(id);
            }
        }
        Ok(())
    }

    async fn search(
        &self,
        index: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchDocument>, BackendError> {
        let expr = SearchParser::parse(query).map_err(|e| BackendError::QueryError {
            backend_name: BACKEND_NAME.to_string(),
            message: e.to_string(),
        })?;

        let mut state = self.state.lock();
        state.calls.query(BACKEND_NAME)?;
        let Some(documents) = state.indexes.get(index) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<(&DocumentId, &StoredDocument)> = documents
            .iter()
            .filter(|(_, stored)| expr.matches(&stored.fields))
            .collect();
        hits.sort_by_key(|(_, stored)| stored.sequence);
        debug!(index, query, hits = hits.len(), limit, "memory search");

        Ok(hits
            .into_iter()
            .take(limit)
            .map(|(id, stored)| SearchDocument::with_id(id.clone(), stored.fields.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldValue;

    fn doc(name: &str, age: f64) -> SearchDocument {
        let mut fields = FieldMap::new();
        fields.insert("name".to_string(), FieldValue::from(name));
        fields.insert("age".to_string(), FieldValue::Float(age));
        SearchDocument::new(fields)
    }

    #[tokio::test]
    async fn test_put_assigns_ids_and_keeps_given_ones() {
        let index = MemorySearchIndex::new();
        let ids = index
            .put("users", vec![doc("a", 1.0), doc("b", 2.0)])
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);

        let again = index
            .put("users", vec![SearchDocument::with_id(ids[0].clone(), FieldMap::new())])
            .await
            .unwrap();
        assert_eq!(again, vec![ids[0].clone()]);
        assert_eq!(index.len("users"), 2);
        assert!(index.document("users", &ids[0]).unwrap().fields.is_empty());
        assert_eq!(index.write_count(), 2);
    }

    #[tokio::test]
    async fn test_search_in_insertion_order_with_limit() {
        let index = MemorySearchIndex::new();
        index
            .put("users", vec![doc("c", 30.0), doc("a", 10.0), doc("b", 20.0)])
            .await
            .unwrap();

        let hits = index.search("users", "age >= 15", 10).await.unwrap();
        let names: Vec<_> = hits
            .iter()
            .map(|d| d.get("name").and_then(|v| v.as_text()).unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["c", "b"]);

        let limited = index.search("users", "age >= 0", 2).await.unwrap();
        assert_eq!(limited.len(), 2);
        assert!(limited.iter().all(|d| d.id.is_some()));
    }

    #[tokio::test]
    async fn test_search_unknown_index_is_empty() {
        let index = MemorySearchIndex::new();
        assert!(index.search("nope", "a = 1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_query_is_query_error() {
        let index = MemorySearchIndex::new();
        let err = index.search("users", "name = \"open", 10).await.unwrap_err();
        assert!(matches!(err, BackendError::QueryError { .. }));
    }

    #[tokio::test]
    async fn test_delete_and_failures() {
        let index = MemorySearchIndex::new();
        let ids = index.put("users", vec![doc("a", 1.0)]).await.unwrap();

        index.fail_next_write("index offline");
        assert!(index.delete("users", &ids).await.is_err());
        assert!(index.document("users", &ids[0]).is_some());

        index.delete("users", &ids).await.unwrap();
        assert!(index.document("users", &ids[0]).is_none());

        index.fail_next_read("index offline");
        assert!(index.get_multi("users", &ids).await.is_err());
        assert_eq!(index.get_multi("users", &ids).await.unwrap(), vec![None]);
    }
}
