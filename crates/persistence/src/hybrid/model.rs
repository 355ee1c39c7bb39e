//! Model instances.

use std::sync::Arc;

use crate::error::{StorageResult, ValidationError, ValidationResult};
use crate::hybrid::entity::SaveOutcome;
use crate::hybrid::store::HybridStore;
use crate::schema::Schema;
use crate::types::{DocumentId, EntityKey, FieldMap, FieldValue};

/// An instance of a model: typed field values plus the entity's key once it
/// has been persisted.
///
/// Values are validated against the schema on assignment and again before
/// every backend write.
///
/// # Example
///
/// ```
/// use hybrid_persistence::hybrid::Entity;
/// use hybrid_persistence::schema::{PropertyDescriptor, Schema};
///
/// let schema = Schema::builder("User")
///     .property(PropertyDescriptor::text("username").max_len(50).build().unwrap())
///     .property(PropertyDescriptor::integer("age").default(18).build().unwrap())
///     .build()
///     .unwrap();
///
/// let mut user = Entity::new(schema);
/// user.set("username", "alice").unwrap();
/// assert_eq!(user.get("age").and_then(|v| v.as_i64()), Some(18));
/// assert!(user.set("age", "old").is_err());
/// assert!(user.key().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct Entity {
    schema: Arc<Schema>,
    key: Option<EntityKey>,
    values: FieldMap,
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.schema.kind() == other.schema.kind()
            && self.key == other.key
            && self.values == other.values
    }
}

impl Entity {
    /// Creates an unsaved instance with defaults applied.
    pub fn new(schema: Arc<Schema>) -> Self {
        let values = schema
            .properties()
            .iter()
            .filter_map(|p| {
                p.default_value()
                    .map(|default| (p.name().to_string(), default.clone()))
            })
            .collect();
        Self {
            schema,
            key: None,
            values,
        }
    }

    /// Rebuilds a persisted instance from already decoded values.
    pub(crate) fn from_stored(schema: Arc<Schema>, key: EntityKey, values: FieldMap) -> Self {
        Self {
            schema,
            key: Some(key),
            values,
        }
    }

    /// The model schema.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The entity kind.
    pub fn kind(&self) -> &str {
        self.schema.kind()
    }

    /// The primary store key, once persisted.
    pub fn key(&self) -> Option<&EntityKey> {
        self.key.as_ref()
    }

    /// The search document id, once persisted.
    pub fn document_id(&self) -> Option<DocumentId> {
        self.key.as_ref().map(EntityKey::document_id)
    }

    pub(crate) fn set_key(&mut self, key: EntityKey) {
        self.key = Some(key);
    }

    pub(crate) fn clear_key(&mut self) {
        self.key = None;
    }

    /// The current value of a field, if set.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    /// All set field values.
    pub fn values(&self) -> &FieldMap {
        &self.values
    }

    /// Validates and assigns a field value.
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> ValidationResult<()> {
        let property = self
            .schema
            .property(name)
            .ok_or_else(|| ValidationError::UnknownField {
                kind: self.schema.kind().to_string(),
                field: name.to_string(),
            })?;
        let value = property.validate(&value.into())?;
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> ValidationResult<Self> {
        self.set(name, value)?;
        Ok(self)
    }

    /// Clears a field.
    pub fn unset(&mut self, name: &str) -> Option<FieldValue> {
        self.values.remove(name)
    }

    /// Validates every property, including required fields that were never set.
    pub fn validate(&self) -> ValidationResult<()> {
        for property in self.schema.properties() {
            let value = self.values.get(property.name()).unwrap_or(&FieldValue::Null);
            property.validate(value)?;
        }
        Ok(())
    }

    /// Persists the instance. See [`HybridStore::save`].
    pub async fn save(&mut self, store: &HybridStore) -> StorageResult<SaveOutcome> {
        store.save(self).await
    }

    /// Deletes the instance. See [`HybridStore::delete`].
    pub async fn delete(&mut self, store: &HybridStore) -> StorageResult<()> {
        store.delete(self).await
    }

    /// Loads an instance by primary key.
    pub async fn get_by_key(store: &HybridStore, key: &EntityKey) -> StorageResult<Option<Entity>> {
        store.get(key).await
    }

    /// Loads an instance of `kind` by search document id.
    pub async fn get_by_document_id(
        store: &HybridStore,
        kind: &str,
        id: &DocumentId,
    ) -> StorageResult<Option<Entity>> {
        store.get_by_document_id(kind, id).await
    }

    /// Loads several instances; one slot per key, in order.
    pub async fn get_multi(
        store: &HybridStore,
        keys: &[EntityKey],
    ) -> StorageResult<Vec<Option<Entity>>> {
        store.get_multi(keys).await
    }

    /// Persists several instances with one batched write per backend.
    pub async fn put_multi(store: &HybridStore, entities: &mut [Entity]) -> StorageResult<()> {
        store.put_multi(entities).await
    }
}
