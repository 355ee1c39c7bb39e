//! The two-backend representation of one entity.
//!
//! A [`HybridEntity`] is created for a single save, delete or batch write.
//! It holds the entity's identifiers, the pending field maps for each backend
//! and, for existing entities, a snapshot of what each backend currently
//! stores. The snapshot is fetched at most once per instance.
//!
//! # Save protocol
//!
//! New entities (no key yet) are written to the search index first, which
//! assigns the document id; the primary key is derived from that id and the
//! primary record is written second.
//!
//! Existing entities diff their pending maps against the snapshot. A backend
//! whose diff is empty is not written. Writes merge pending fields over the
//! persisted ones, so fields outside this save are kept.

use tracing::{debug, instrument};

use crate::config::HybridConfig;
use crate::core::{PrimaryStore, SearchIndex};
use crate::error::{BackendError, EntityError, StorageResult};
use crate::hybrid::model::Entity;
use crate::types::{
    DocumentId, EntityKey, FieldMap, FieldValue, PrimaryRecord, SearchDocument, diff_fields,
    merge_fields,
};

/// Result of a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// At least one backend was written.
    Written,
    /// Both backends already held the pending values.
    NoOp,
}

/// What each backend currently stores for an existing entity.
#[derive(Debug, Clone, Default, PartialEq)]
struct Snapshot {
    primary: Option<FieldMap>,
    search: Option<FieldMap>,
}

/// Pending per-backend state of one entity.
#[derive(Debug, Clone)]
pub struct HybridEntity {
    kind: String,
    index: String,
    key: Option<EntityKey>,
    primary_pending: FieldMap,
    search_pending: FieldMap,
    snapshot: Option<Snapshot>,
}

impl HybridEntity {
    /// Creates an empty entity of `kind` stored in search index `index`.
    pub fn new(kind: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            index: index.into(),
            key: None,
            primary_pending: FieldMap::new(),
            search_pending: FieldMap::new(),
            snapshot: None,
        }
    }

    /// Projects a model instance into per-backend maps using each property's
    /// effective destination and backend encoding.
    ///
    /// Every property is projected; unset fields become nulls.
    pub fn project(entity: &Entity, config: &HybridConfig) -> Self {
        let schema = entity.schema();
        let mut hybrid = Self::new(schema.kind(), config.index_name(schema.kind()));
        hybrid.key = entity.key().cloned();

        for (property, destination) in schema.fields() {
            let value = entity
                .get(property.name())
                .cloned()
                .unwrap_or(FieldValue::Null);
            if destination.includes_primary() {
                hybrid.primary_pending.insert(
                    property.name().to_string(),
                    property.encode_for_primary(&value),
                );
            }
            if destination.includes_search() {
                hybrid.search_pending.insert(
                    property.name().to_string(),
                    property.encode_for_search(&value),
                );
            }
        }
        hybrid
    }

    /// Sets the key of an existing entity.
    pub fn with_key(mut self, key: EntityKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Sets a pending primary store field, already encoded.
    pub fn set_primary(&mut self, name: impl Into<String>, value: FieldValue) {
        self.primary_pending.insert(name.into(), value);
    }

    /// Sets a pending search index field, already encoded.
    pub fn set_search(&mut self, name: impl Into<String>, value: FieldValue) {
        self.search_pending.insert(name.into(), value);
    }

    /// The entity kind.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The search index holding the entity's document.
    pub fn index(&self) -> &str {
        &self.index
    }

    /// The primary key, once known.
    pub fn key(&self) -> Option<&EntityKey> {
        self.key.as_ref()
    }

    /// The search document id, once known.
    pub fn document_id(&self) -> Option<DocumentId> {
        self.key.as_ref().map(EntityKey::document_id)
    }

    /// Pending primary store fields.
    pub fn primary_fields(&self) -> &FieldMap {
        &self.primary_pending
    }

    /// Pending search index fields.
    pub fn search_fields(&self) -> &FieldMap {
        &self.search_pending
    }

    /// Records the id assigned by the search index and derives the key.
    pub(crate) fn assign_document_id(&mut self, id: &DocumentId) -> &EntityKey {
        self.key.insert(EntityKey::from_document_id(&self.kind, id))
    }

    fn require_key(&self) -> Result<&EntityKey, EntityError> {
        self.key.as_ref().ok_or_else(|| EntityError::NotPersisted {
            kind: self.kind.clone(),
        })
    }

    /// The pending search document, with its id when known.
    pub(crate) fn search_document(&self) -> SearchDocument {
        SearchDocument {
            id: self.document_id(),
            fields: without_nulls(&self.search_pending),
        }
    }

    /// The pending primary record. Fails until the key is known.
    pub(crate) fn primary_record(&self) -> Result<PrimaryRecord, EntityError> {
        Ok(PrimaryRecord::new(
            self.require_key()?.clone(),
            self.primary_pending.clone(),
        ))
    }

    async fn fetch_snapshot(
        &self,
        primary: &dyn PrimaryStore,
        search: &dyn SearchIndex,
    ) -> StorageResult<Snapshot> {
        let key = self.require_key()?;
        let document_id = key.document_id();
        let (records, documents) = tokio::join!(
            primary.get_multi(std::slice::from_ref(key)),
            search.get_multi(&self.index, std::slice::from_ref(&document_id)),
        );
        Ok(Snapshot {
            primary: records?.into_iter().next().flatten().map(|r| r.fields),
            search: documents?.into_iter().next().flatten().map(|d| d.fields),
        })
    }

    /// Persists the pending maps.
    #[instrument(skip_all, fields(kind = %self.kind, key = ?self.key))]
    pub async fn save(
        &mut self,
        primary: &dyn PrimaryStore,
        search: &dyn SearchIndex,
    ) -> StorageResult<SaveOutcome> {
        if self.key.is_none() {
            return self.save_new(primary, search).await;
        }

        let mut snapshot = match self.snapshot.take() {
            Some(snapshot) => snapshot,
            None => self.fetch_snapshot(primary, search).await?,
        };
        let key = self.require_key()?.clone();
        let mut written = false;

        let persisted = snapshot.search.take().unwrap_or_default();
        let changed = diff_fields(&self.search_pending, &persisted);
        let persisted = if changed.is_empty() {
            persisted
        } else {
            debug!(backend = search.backend_name(), fields = ?changed, "writing search document");
            let merged = merge_fields(&persisted, &self.search_pending);
            let document = SearchDocument::with_id(key.document_id(), without_nulls(&merged));
            search.put(&self.index, vec![document]).await?;
            written = true;
            merged
        };
        snapshot.search = Some(persisted);

        let persisted = snapshot.primary.take().unwrap_or_default();
        let changed = diff_fields(&self.primary_pending, &persisted);
        let persisted = if changed.is_empty() {
            persisted
        } else {
            debug!(backend = primary.backend_name(), fields = ?changed, "writing primary record");
            let merged = merge_fields(&persisted, &self.primary_pending);
            primary
                .put_multi(vec![PrimaryRecord::new(key, merged.clone())])
                .await?;
            written = true;
            merged
        };
        snapshot.primary = Some(persisted);

        self.snapshot = Some(snapshot);
        Ok(if written {
            SaveOutcome::Written
        } else {
            SaveOutcome::NoOp
        })
    }

    async fn save_new(
        &mut self,
        primary: &dyn PrimaryStore,
        search: &dyn SearchIndex,
    ) -> StorageResult<SaveOutcome> {
        let ids = search
            .put(&self.index, vec![self.search_document()])
            .await?;
        let [id] = ids.as_slice() else {
            return Err(BackendError::BatchMismatch {
                backend_name: search.backend_name().to_string(),
                expected: 1,
                actual: ids.len(),
            }
            .into());
        };
        let key = self.assign_document_id(id).clone();
        debug!(key = %key, "search index assigned document id");

        primary.put_multi(vec![self.primary_record()?]).await?;

        self.snapshot = Some(Snapshot {
            primary: Some(self.primary_pending.clone()),
            search: Some(without_nulls(&self.search_pending)),
        });
        Ok(SaveOutcome::Written)
    }

    /// Deletes the entity from the search index, then from the primary store.
    ///
    /// If the second delete fails the primary record is left in place.
    #[instrument(skip_all, fields(kind = %self.kind, key = ?self.key))]
    pub async fn delete(
        &self,
        primary: &dyn PrimaryStore,
        search: &dyn SearchIndex,
    ) -> StorageResult<()> {
        let key = self.require_key()?;
        search.delete(&self.index, &[key.document_id()]).await?;
        primary.delete_multi(std::slice::from_ref(key)).await?;
        Ok(())
    }
}

fn without_nulls(fields: &FieldMap) -> FieldMap {
    fields
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}
