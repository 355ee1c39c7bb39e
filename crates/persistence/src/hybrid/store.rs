//! The hybrid store: backend clients, schemas and configuration wired together.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::config::{ConfigError, HybridConfig};
use crate::core::{PrimaryStore, SearchIndex};
use crate::error::{
    BackendError, EntityError, SchemaError, StorageError, StorageResult, ValidationResult,
};
use crate::hybrid::entity::{HybridEntity, SaveOutcome};
use crate::hybrid::model::Entity;
use crate::hybrid::writer::BatchWriter;
use crate::query::{QueryArgs, QueryPlan};
use crate::schema::{Schema, SchemaRegistry, StorageDestination};
use crate::types::{DocumentId, EntityKey, FieldMap, PrimaryRecord, SearchDocument};

/// Entry point for persisting and querying hybrid entities.
///
/// Cloning is cheap; clones share the backends, registry and configuration.
#[derive(Clone)]
pub struct HybridStore {
    primary: Arc<dyn PrimaryStore>,
    search: Arc<dyn SearchIndex>,
    registry: Arc<SchemaRegistry>,
    config: Arc<HybridConfig>,
}

impl fmt::Debug for HybridStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HybridStore")
            .field("primary", &self.primary.backend_name())
            .field("search", &self.search.backend_name())
            .field("kinds", &self.registry.kinds().collect::<Vec<_>>())
            .field("config", &self.config)
            .finish()
    }
}

impl HybridStore {
    /// Creates a store over the given backends.
    ///
    /// The configuration is validated here, so deserialized configurations
    /// get the same checks as built ones.
    pub fn new(
        primary: Arc<dyn PrimaryStore>,
        search: Arc<dyn SearchIndex>,
        registry: SchemaRegistry,
        config: HybridConfig,
    ) -> Result<Self, ConfigError> {
        for warning in config.validate()? {
            debug!(warning = ?warning, "hybrid store configuration");
        }
        Ok(Self {
            primary,
            search,
            registry: Arc::new(registry),
            config: Arc::new(config),
        })
    }

    /// The store configuration.
    pub fn config(&self) -> &HybridConfig {
        &self.config
    }

    /// The schema registry.
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// The primary store client.
    pub fn primary(&self) -> &dyn PrimaryStore {
        self.primary.as_ref()
    }

    /// The search index client.
    pub fn search(&self) -> &dyn SearchIndex {
        self.search.as_ref()
    }

    /// Returns the schema registered for `kind`.
    pub fn schema(&self, kind: &str) -> Result<Arc<Schema>, SchemaError> {
        self.registry.get(kind)
    }

    /// Creates an unsaved instance of `kind`.
    pub fn create(&self, kind: &str) -> Result<Entity, SchemaError> {
        Ok(Entity::new(self.schema(kind)?))
    }

    /// Runs the query `name` registered on `kind`.
    pub async fn invoke(
        &self,
        kind: &str,
        name: &str,
        args: &QueryArgs,
    ) -> StorageResult<Vec<Entity>> {
        let schema = self.schema(kind)?;
        let query = schema.query(name)?;
        query.invoke(self, args).await
    }

    /// Validates and persists an entity, assigning its key when new.
    ///
    /// Returns [`SaveOutcome::NoOp`] when both backends already hold the
    /// entity's values.
    #[instrument(skip_all, fields(kind = %entity.kind()))]
    pub async fn save(&self, entity: &mut Entity) -> StorageResult<SaveOutcome> {
        entity.validate()?;
        let mut hybrid = HybridEntity::project(entity, &self.config);
        let outcome = hybrid
            .save(self.primary.as_ref(), self.search.as_ref())
            .await?;
        if let Some(key) = hybrid.key() {
            entity.set_key(key.clone());
        }
        debug!(outcome = ?outcome, key = ?entity.key(), "saved entity");
        Ok(outcome)
    }

    /// Deletes an entity from both backends and clears its key.
    #[instrument(skip_all, fields(kind = %entity.kind(), key = ?entity.key()))]
    pub async fn delete(&self, entity: &mut Entity) -> StorageResult<()> {
        let key = entity.key().cloned().ok_or_else(|| EntityError::NotPersisted {
            kind: entity.kind().to_string(),
        })?;
        self.delete_key(&key).await?;
        entity.clear_key();
        Ok(())
    }

    /// Deletes the entity stored under `key` from both backends.
    pub async fn delete_key(&self, key: &EntityKey) -> StorageResult<()> {
        let schema = self.schema(key.kind())?;
        HybridEntity::new(schema.kind(), self.config.index_name(schema.kind()))
            .with_key(key.clone())
            .delete(self.primary.as_ref(), self.search.as_ref())
            .await
    }

    /// Validates and persists many entities with batched writes.
    #[instrument(skip_all, fields(entities = entities.len()))]
    pub async fn put_multi(&self, entities: &mut [Entity]) -> StorageResult<()> {
        for entity in entities.iter() {
            entity.validate()?;
        }
        let mut hybrids: Vec<HybridEntity> = entities
            .iter()
            .map(|e| HybridEntity::project(e, &self.config))
            .collect();

        BatchWriter::new(self.primary.as_ref(), self.search.as_ref(), &self.config)
            .put(&mut hybrids)
            .await?;

        for (entity, hybrid) in entities.iter_mut().zip(&hybrids) {
            if let Some(key) = hybrid.key() {
                entity.set_key(key.clone());
            }
        }
        Ok(())
    }

    /// Loads the entity stored under `key`.
    pub async fn get(&self, key: &EntityKey) -> StorageResult<Option<Entity>> {
        Ok(self
            .get_multi(std::slice::from_ref(key))
            .await?
            .into_iter()
            .next()
            .flatten())
    }

    /// Loads the entity of `kind` whose search document id is `id`.
    pub async fn get_by_document_id(
        &self,
        kind: &str,
        id: &DocumentId,
    ) -> StorageResult<Option<Entity>> {
        self.get(&EntityKey::from_document_id(kind, id)).await
    }

    /// Loads several entities; one slot per key, in order.
    ///
    /// An entity exists when its primary record exists. Search documents are
    /// read only for kinds with search-only fields.
    #[instrument(skip_all, fields(keys = keys.len()))]
    pub async fn get_multi(&self, keys: &[EntityKey]) -> StorageResult<Vec<Option<Entity>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let schemas = keys
            .iter()
            .map(|key| self.schema(key.kind()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, schema) in schemas.iter().enumerate() {
            if has_search_only_fields(schema) {
                groups
                    .entry(self.config.index_name(schema.kind()))
                    .or_default()
                    .push(i);
            }
        }

        let search_reads = async {
            let mut documents: Vec<Option<SearchDocument>> = vec![None; keys.len()];
            for (index, positions) in &groups {
                let ids: Vec<DocumentId> =
                    positions.iter().map(|&i| keys[i].document_id()).collect();
                let found = self.search.get_multi(index, &ids).await?;
                for (&i, document) in positions.iter().zip(found) {
                    documents[i] = document;
                }
            }
            Ok::<_, BackendError>(documents)
        };
        let (records, documents) = tokio::join!(self.primary.get_multi(keys), search_reads);
        let records = records?;
        let documents = documents?;
        expect_len(self.primary.backend_name(), keys.len(), records.len())?;

        let mut out = Vec::with_capacity(keys.len());
        for (((key, schema), record), document) in
            keys.iter().zip(schemas).zip(records).zip(documents)
        {
            match record {
                Some(record) => out.push(Some(assemble(
                    schema,
                    key.clone(),
                    Some(&record.fields),
                    document.as_ref().map(|d| &d.fields),
                )?)),
                None => {
                    if document.is_some() {
                        warn!(key = %key, "search document has no primary record");
                    }
                    out.push(None);
                }
            }
        }
        Ok(out)
    }

    /// Runs a compiled plan for `schema`'s kind.
    pub(crate) async fn execute_plan(
        &self,
        schema: &Arc<Schema>,
        plan: &QueryPlan,
    ) -> StorageResult<Vec<Entity>> {
        match plan {
            QueryPlan::Primary { filter } => {
                let records = self.primary.query(schema.kind(), filter.as_ref()).await?;
                self.complete_from_primary(schema, records).await
            }
            QueryPlan::Search { query } => {
                let index = self.config.index_name(schema.kind());
                let documents = self
                    .search
                    .search(&index, query, self.config.search_result_limit)
                    .await?;
                self.complete_from_search(schema, documents).await
            }
        }
    }

    async fn complete_from_primary(
        &self,
        schema: &Arc<Schema>,
        records: Vec<PrimaryRecord>,
    ) -> StorageResult<Vec<Entity>> {
        let documents = if has_search_only_fields(schema) && !records.is_empty() {
            let ids: Vec<DocumentId> = records.iter().map(|r| r.key.document_id()).collect();
            let index = self.config.index_name(schema.kind());
            self.search.get_multi(&index, &ids).await?
        } else {
            vec![None; records.len()]
        };

        records
            .into_iter()
            .zip(documents)
            .map(|(record, document)| {
                assemble(
                    Arc::clone(schema),
                    record.key.clone(),
                    Some(&record.fields),
                    document.as_ref().map(|d| &d.fields),
                )
                .map_err(StorageError::from)
            })
            .collect()
    }

    async fn complete_from_search(
        &self,
        schema: &Arc<Schema>,
        documents: Vec<SearchDocument>,
    ) -> StorageResult<Vec<Entity>> {
        let (keys, documents): (Vec<EntityKey>, Vec<SearchDocument>) = documents
            .into_iter()
            .filter_map(|document| match &document.id {
                Some(id) => Some((EntityKey::from_document_id(schema.kind(), id), document)),
                None => {
                    warn!("search result without document id");
                    None
                }
            })
            .unzip();
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let records = self.primary.get_multi(&keys).await?;
        expect_len(self.primary.backend_name(), keys.len(), records.len())?;

        let mut out = Vec::with_capacity(keys.len());
        for ((key, document), record) in keys.into_iter().zip(documents).zip(records) {
            let Some(record) = record else {
                warn!(key = %key, "skipping search result with no primary record");
                continue;
            };
            out.push(assemble(
                Arc::clone(schema),
                key,
                Some(&record.fields),
                Some(&document.fields),
            )?);
        }
        debug!(results = out.len(), "completed search results");
        Ok(out)
    }
}

fn has_search_only_fields(schema: &Schema) -> bool {
    schema
        .fields()
        .any(|(_, destination)| destination == StorageDestination::Search)
}

fn expect_len(backend: &str, expected: usize, actual: usize) -> Result<(), BackendError> {
    if expected == actual {
        Ok(())
    } else {
        Err(BackendError::BatchMismatch {
            backend_name: backend.to_string(),
            expected,
            actual,
        })
    }
}

/// Decodes stored fields into a model instance.
///
/// Fields destined for the primary store are read from the record, falling
/// back to the document; search-only fields are read from the document.
fn assemble(
    schema: Arc<Schema>,
    key: EntityKey,
    primary: Option<&FieldMap>,
    search: Option<&FieldMap>,
) -> ValidationResult<Entity> {
    let mut values = FieldMap::new();
    for (property, destination) in schema.fields() {
        let name = property.name();
        let from_primary = primary
            .filter(|_| destination.includes_primary())
            .and_then(|fields| fields.get(name));
        let stored = from_primary.or_else(|| search.and_then(|fields| fields.get(name)));
        if let Some(stored) = stored {
            let value = property.decode(stored)?;
            if !value.is_null() {
                values.insert(name.to_string(), value);
            }
        }
    }
    Ok(Entity::from_stored(schema, key, values))
}
