//! Kind to schema registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::SchemaError;
use crate::schema::model::Schema;

/// Explicit mapping of entity kinds to their schemas.
///
/// The registry is assembled during application wiring and handed to the
/// [`HybridStore`](crate::hybrid::HybridStore); there is no process-wide
/// registry.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, Arc<Schema>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema under its kind.
    pub fn register(&mut self, schema: Arc<Schema>) -> Result<(), SchemaError> {
        let kind = schema.kind().to_string();
        if self.schemas.contains_key(&kind) {
            return Err(SchemaError::DuplicateKind { kind });
        }
        self.schemas.insert(kind, schema);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, schema: Arc<Schema>) -> Result<Self, SchemaError> {
        self.register(schema)?;
        Ok(self)
    }

    /// Returns the schema for `kind`.
    pub fn get(&self, kind: &str) -> Result<Arc<Schema>, SchemaError> {
        self.schemas
            .get(kind)
            .cloned()
            .ok_or_else(|| SchemaError::UnknownKind {
                kind: kind.to_string(),
            })
    }

    /// Registered kinds in sorted order.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Returns true if no schema is registered.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let registry = SchemaRegistry::new()
            .with(Schema::builder("User").build().unwrap())
            .unwrap()
            .with(Schema::builder("Post").build().unwrap())
            .unwrap();

        assert_eq!(registry.get("User").unwrap().kind(), "User");
        assert_eq!(registry.kinds().collect::<Vec<_>>(), vec!["Post", "User"]);
        assert!(matches!(
            registry.get("Comment"),
            Err(SchemaError::UnknownKind { .. })
        ));
    }

    #[test]
    fn test_duplicate_kind_rejected() {
        let mut registry = SchemaRegistry::new();
        registry.register(Schema::builder("User").build().unwrap()).unwrap();
        let err = registry
            .register(Schema::builder("User").build().unwrap())
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::DuplicateKind {
                kind: "User".to_string()
            }
        );
    }
}
