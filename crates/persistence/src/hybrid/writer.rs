//! Two-phase batched writes.
//!
//! Phase one writes every entity's search document, grouped by index, and
//! collects the document ids the index assigns to new entities. Phase two
//! writes every primary record under its now-known key. Primary keys of new
//! entities derive from their document ids, so the phases always run in this
//! order.

use std::collections::BTreeMap;

use tracing::{debug, instrument};

use crate::config::HybridConfig;
use crate::core::{PrimaryStore, SearchIndex};
use crate::error::{BackendError, StorageResult};
use crate::hybrid::entity::HybridEntity;
use crate::types::PrimaryRecord;

/// Writes many entities with batched backend calls.
pub struct BatchWriter<'a> {
    primary: &'a dyn PrimaryStore,
    search: &'a dyn SearchIndex,
    config: &'a HybridConfig,
}

impl<'a> BatchWriter<'a> {
    /// Creates a writer over the two backends.
    pub fn new(
        primary: &'a dyn PrimaryStore,
        search: &'a dyn SearchIndex,
        config: &'a HybridConfig,
    ) -> Self {
        Self {
            primary,
            search,
            config,
        }
    }

    /// Writes all entities, assigning keys to new ones.
    ///
    /// Not atomic across backends: a failure in phase two leaves the search
    /// documents of phase one in place.
    #[instrument(skip_all, fields(entities = entities.len()))]
    pub async fn put(&self, entities: &mut [HybridEntity]) -> StorageResult<()> {
        if entities.is_empty() {
            return Ok(());
        }

        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, entity) in entities.iter().enumerate() {
            groups.entry(entity.index().to_string()).or_default().push(i);
        }

        for (index, members) in &groups {
            for chunk in members.chunks(self.config.search_batch_size.max(1)) {
                let documents = chunk.iter().map(|&i| entities[i].search_document()).collect();
                let ids = self.search.put(index, documents).await?;
                if ids.len() != chunk.len() {
                    return Err(BackendError::BatchMismatch {
                        backend_name: self.search.backend_name().to_string(),
                        expected: chunk.len(),
                        actual: ids.len(),
                    }
                    .into());
                }

                let mut assigned = 0usize;
                for (&i, id) in chunk.iter().zip(&ids) {
                    if entities[i].key().is_none() {
                        entities[i].assign_document_id(id);
                        assigned += 1;
                    }
                }
                debug!(
                    index = %index,
                    documents = chunk.len(),
                    assigned,
                    "wrote search batch"
                );
            }
        }

        let mut records = entities
            .iter()
            .map(HybridEntity::primary_record)
            .collect::<Result<Vec<PrimaryRecord>, _>>()?;

        while !records.is_empty() {
            let rest =
                records.split_off(records.len().min(self.config.primary_batch_size.max(1)));
            debug!(records = records.len(), "writing primary batch");
            self.primary.put_multi(records).await?;
            records = rest;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::{MemoryPrimaryStore, MemorySearchIndex};
    use crate::types::{EntityKey, FieldValue};

    fn entity(index: &str, name: &str) -> HybridEntity {
        let mut entity = HybridEntity::new(index, index);
        entity.set_primary("name", FieldValue::from(name));
        entity.set_search("name", FieldValue::from(name));
        entity
    }

    #[tokio::test]
    async fn test_one_search_call_per_index_then_one_primary_call() {
        let primary = MemoryPrimaryStore::new();
        let search = MemorySearchIndex::new();
        let config = HybridConfig::default();

        let mut entities = vec![
            entity("User", "a"),
            entity("Post", "b"),
            entity("User", "c"),
        ];
        BatchWriter::new(&primary, &search, &config)
            .put(&mut entities)
            .await
            .unwrap();

        assert_eq!(search.write_count(), 2);
        assert_eq!(primary.write_count(), 1);
        for e in &entities {
            let key = e.key().unwrap();
            assert_eq!(key.kind(), e.kind());
            assert_eq!(
                EntityKey::from_document_id(e.kind(), &e.document_id().unwrap()),
                *key
            );
            assert!(primary.record(key).is_some());
        }
    }

    #[tokio::test]
    async fn test_batches_respect_configured_sizes() {
        let primary = MemoryPrimaryStore::new();
        let search = MemorySearchIndex::new();
        let config = HybridConfig::builder()
            .search_batch_size(2)
            .primary_batch_size(3)
            .build()
            .unwrap();

        let mut entities: Vec<_> = (0..5).map(|i| entity("User", &i.to_string())).collect();
        BatchWriter::new(&primary, &search, &config)
            .put(&mut entities)
            .await
            .unwrap();

        assert_eq!(search.write_count(), 3);
        assert_eq!(primary.write_count(), 2);
    }

    #[tokio::test]
    async fn test_existing_entities_keep_their_keys() {
        let primary = MemoryPrimaryStore::new();
        let search = MemorySearchIndex::new();
        let config = HybridConfig::default();

        let mut entities = vec![entity("User", "a")];
        let writer = BatchWriter::new(&primary, &search, &config);
        writer.put(&mut entities).await.unwrap();
        let key = entities[0].key().cloned().unwrap();

        entities[0].set_primary("name", FieldValue::from("z"));
        writer.put(&mut entities).await.unwrap();

        assert_eq!(entities[0].key(), Some(&key));
        assert_eq!(primary.len(), 1);
        assert_eq!(
            primary.record(&key).unwrap().get("name"),
            Some(&FieldValue::from("z"))
        );
    }

    #[tokio::test]
    async fn test_search_failure_skips_primary_phase() {
        let primary = MemoryPrimaryStore::new();
        let search = MemorySearchIndex::new();
        let config = HybridConfig::default();

        search.fail_next_write("index unavailable");
        let mut entities = vec![entity("User", "a")];
        let err = BatchWriter::new(&primary, &search, &config)
            .put(&mut entities)
            .await
            .unwrap_err();

        assert!(!err.is_client_error());
        assert_eq!(primary.write_count(), 0);
        assert!(entities[0].key().is_none());
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_calls() {
        let primary = MemoryPrimaryStore::new();
        let search = MemorySearchIndex::new();
        let config = HybridConfig::default();
        BatchWriter::new(&primary, &search, &config)
            .put(&mut [])
            .await
            .unwrap();
        assert_eq!(search.write_count(), 0);
        assert_eq!(primary.write_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_batch_sizes_write_one_at_a_time() {
        let primary = MemoryPrimaryStore::new();
        let search = MemorySearchIndex::new();
        let config: HybridConfig =
            serde_json::from_str(r#"{ "search_batch_size": 0, "primary_batch_size": 0 }"#)
                .unwrap();

        let mut entities = vec![entity("User", "a"), entity("User", "b")];
        BatchWriter::new(&primary, &search, &config)
            .put(&mut entities)
            .await
            .unwrap();

        assert_eq!(search.write_count(), 2);
        assert_eq!(primary.write_count(), 2);
        assert_eq!(primary.len(), 2);
    }
}
