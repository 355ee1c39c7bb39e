//! Model schemas.
//!
//! A [`Schema`] is the static description of one entity kind: its ordered
//! properties, their effective storage destinations and its named queries.
//! Schemas are assembled once with a [`SchemaBuilder`] and shared as
//! `Arc<Schema>`.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::HybridConfig;
use crate::error::{QueryError, QueryResult, SchemaError};
use crate::query::{Node, Operator, Query, QueryAnalyzer};
use crate::schema::property::{PropertyDescriptor, StorageDestination};

/// The static description of an entity kind.
#[derive(Debug)]
pub struct Schema {
    kind: String,
    properties: Vec<Arc<PropertyDescriptor>>,
    positions: HashMap<String, usize>,
    destinations: Vec<StorageDestination>,
    queries: Vec<Query>,
}

impl Schema {
    /// Starts a schema for `kind`.
    pub fn builder(kind: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(kind)
    }

    /// The entity kind.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Properties in registration order.
    pub fn properties(&self) -> &[Arc<PropertyDescriptor>] {
        &self.properties
    }

    /// Looks up a property by name.
    pub fn property(&self, name: &str) -> Option<&Arc<PropertyDescriptor>> {
        self.positions.get(name).map(|&i| &self.properties[i])
    }

    /// The effective destination of a property.
    ///
    /// This is the declared destination, widened to include the search index
    /// when a registered query may be served by it.
    pub fn destination(&self, name: &str) -> Option<StorageDestination> {
        self.positions.get(name).map(|&i| self.destinations[i])
    }

    /// Properties paired with their effective destinations.
    pub fn fields(&self) -> impl Iterator<Item = (&Arc<PropertyDescriptor>, StorageDestination)> {
        self.properties
            .iter()
            .zip(self.destinations.iter().copied())
    }

    /// Looks up a registered query.
    pub fn get_query(&self, name: &str) -> Option<&Query> {
        self.queries.iter().find(|q| q.name() == Some(name))
    }

    /// Looks up a registered query, failing when it does not exist.
    pub fn query(&self, name: &str) -> QueryResult<&Query> {
        self.get_query(name).ok_or_else(|| QueryError::UnknownQuery {
            kind: self.kind.clone(),
            query: name.to_string(),
        })
    }

    /// Registered queries in registration order.
    pub fn queries(&self) -> &[Query] {
        &self.queries
    }

    /// The composite indexes the primary store needs for the registered
    /// queries it serves.
    ///
    /// Each index lists the equality properties in query order, followed by
    /// the inequality property if there is one. Queries routed to the search
    /// index and queries without predicates need no index.
    pub fn primary_indexes(&self) -> Vec<PrimaryIndex> {
        self.queries
            .iter()
            .filter(|query| query.uses_primary_store())
            .filter_map(|query| {
                let mut properties: Vec<&str> = Vec::new();
                let mut inequality = None;
                for comparison in query.nodes().iter().flat_map(Node::comparisons) {
                    let name = comparison.property().name();
                    if comparison.operator().is_inequality() {
                        inequality.get_or_insert(name);
                    } else if !properties.contains(&name) {
                        properties.push(name);
                    }
                }
                if let Some(name) = inequality {
                    properties.retain(|p| *p != name);
                    properties.push(name);
                }
                if properties.is_empty() {
                    return None;
                }
                Some(PrimaryIndex {
                    kind: self.kind.clone(),
                    query: query.name().unwrap_or_default().to_string(),
                    properties: properties.into_iter().map(str::to_string).collect(),
                })
            })
            .collect()
    }
}

/// A composite primary store index required by a registered query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryIndex {
    /// The entity kind.
    pub kind: String,
    /// The query the index serves.
    pub query: String,
    /// Indexed properties, inequality property last.
    pub properties: Vec<String>,
}

/// Builder for [`Schema`].
///
/// # Example
///
/// ```
/// use hybrid_persistence::query::Query;
/// use hybrid_persistence::schema::{PropertyDescriptor, Schema, StorageDestination};
///
/// let username = PropertyDescriptor::text("username").max_len(50).required().build().unwrap();
/// let bio = PropertyDescriptor::text("bio").max_len(2000).build().unwrap();
///
/// let schema = Schema::builder("User")
///     .property(username.clone())
///     .property(bio.clone())
///     .query("by_username", Query::by(&username).unwrap())
///     .query("by_bio", Query::by(&bio).unwrap())
///     .build()
///     .unwrap();
///
/// assert_eq!(schema.destination("username"), Some(StorageDestination::Primary));
/// // `by_bio` runs on the search index, so bio is indexed there too.
/// assert_eq!(schema.destination("bio"), Some(StorageDestination::Both));
/// ```
#[derive(Debug)]
pub struct SchemaBuilder {
    kind: String,
    properties: Vec<Arc<PropertyDescriptor>>,
    queries: Vec<(String, Query)>,
    analyzer: QueryAnalyzer,
}

impl SchemaBuilder {
    /// Creates a builder for `kind`.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            properties: Vec::new(),
            queries: Vec::new(),
            analyzer: QueryAnalyzer::default(),
        }
    }

    /// Adds a property. Order is preserved.
    pub fn property(mut self, property: Arc<PropertyDescriptor>) -> Self {
        self.properties.push(property);
        self
    }

    /// Adds several properties in order.
    pub fn properties(
        mut self,
        properties: impl IntoIterator<Item = Arc<PropertyDescriptor>>,
    ) -> Self {
        self.properties.extend(properties);
        self
    }

    /// Registers a named query.
    pub fn query(mut self, name: impl Into<String>, query: Query) -> Self {
        self.queries.push((name.into(), query));
        self
    }

    /// Applies the store configuration to query analysis.
    pub fn config(mut self, config: &HybridConfig) -> Self {
        self.analyzer = QueryAnalyzer::from_config(config);
        self
    }

    /// Validates the registrations and freezes the schema.
    pub fn build(self) -> Result<Arc<Schema>, SchemaError> {
        let mut positions = HashMap::new();
        for (i, property) in self.properties.iter().enumerate() {
            if positions.insert(property.name().to_string(), i).is_some() {
                return Err(SchemaError::DuplicateProperty {
                    kind: self.kind.clone(),
                    property: property.name().to_string(),
                });
            }
        }

        let mut destinations: Vec<StorageDestination> =
            self.properties.iter().map(|p| p.destination()).collect();
        let mut queries: Vec<Query> = Vec::with_capacity(self.queries.len());

        for (name, mut query) in self.queries {
            if queries.iter().any(|q| q.name() == Some(name.as_str())) {
                return Err(SchemaError::DuplicateQuery {
                    kind: self.kind.clone(),
                    query: name,
                });
            }

            let comparisons: Vec<(Arc<PropertyDescriptor>, Operator)> = query
                .nodes()
                .iter()
                .flat_map(Node::comparisons)
                .map(|c| (Arc::clone(c.property()), c.operator()))
                .collect();
            for (property, _) in &comparisons {
                let registered = positions
                    .get(property.name())
                    .map(|&i| &self.properties[i]);
                if registered.is_none_or(|p| p != property) {
                    return Err(SchemaError::UnknownProperty {
                        kind: self.kind.clone(),
                        query: name,
                        property: property.name().to_string(),
                    });
                }
            }

            query.register(&self.kind, &name, self.analyzer);

            // IN eligibility depends on the list length, known only at invocation.
            let may_search = !query.uses_primary_store()
                || comparisons.iter().any(|(_, op)| *op == Operator::In);
            if may_search {
                for (property, _) in &comparisons {
                    if let Some(&i) = positions.get(property.name()) {
                        destinations[i] = destinations[i].with_search();
                    }
                }
            }

            debug!(
                kind = %self.kind,
                query = %name,
                primary = query.uses_primary_store(),
                "registered query"
            );
            queries.push(query);
        }

        Ok(Arc::new(Schema {
            kind: self.kind,
            properties: self.properties,
            positions,
            destinations,
            queries,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Param, QueryArgs};

    fn username() -> Arc<PropertyDescriptor> {
        PropertyDescriptor::text("username").max_len(50).build().unwrap()
    }

    #[test]
    fn test_build_registers_queries() {
        let username = username();
        let schema = Schema::builder("User")
            .property(username.clone())
            .query("by_username", Query::by(&username).unwrap())
            .build()
            .unwrap();

        let query = schema.query("by_username").unwrap();
        assert_eq!(query.kind(), Some("User"));
        assert_eq!(query.name(), Some("by_username"));
        assert!(matches!(
            schema.query("missing"),
            Err(QueryError::UnknownQuery { .. })
        ));
    }

    #[test]
    fn test_duplicate_property_rejected() {
        let err = Schema::builder("User")
            .property(username())
            .property(username())
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateProperty { .. }));
    }

    #[test]
    fn test_duplicate_query_rejected() {
        let username = username();
        let err = Schema::builder("User")
            .property(username.clone())
            .query("q", Query::by(&username).unwrap())
            .query("q", Query::by(&username).unwrap())
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateQuery { .. }));
    }

    #[test]
    fn test_query_on_foreign_property_rejected() {
        let other = PropertyDescriptor::integer("age").build().unwrap();
        let err = Schema::builder("User")
            .property(username())
            .query("by_age", Query::by(&other).unwrap())
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnknownProperty {
                kind: "User".to_string(),
                query: "by_age".to_string(),
                property: "age".to_string(),
            }
        );
    }

    #[test]
    fn test_search_queries_widen_destinations() {
        let age = PropertyDescriptor::integer("age").build().unwrap();
        let score = PropertyDescriptor::float("score").build().unwrap();
        let username = username();
        let schema = Schema::builder("User")
            .properties([username.clone(), age.clone(), score.clone()])
            .query("by_username", Query::by(&username).unwrap())
            .query(
                "ranged",
                Query::new([
                    age.gt(Param::positional()).unwrap(),
                    score.lt(Param::positional()).unwrap(),
                ]),
            )
            .build()
            .unwrap();

        assert_eq!(schema.destination("username"), Some(StorageDestination::Primary));
        assert_eq!(schema.destination("age"), Some(StorageDestination::Both));
        assert_eq!(schema.destination("score"), Some(StorageDestination::Both));
    }

    #[test]
    fn test_config_limits_flow_into_queries() {
        let age = PropertyDescriptor::integer("age").build().unwrap();
        let config = HybridConfig::builder()
            .max_primary_in_values(2)
            .build()
            .unwrap();
        let schema = Schema::builder("User")
            .property(age.clone())
            .query("in_ages", Query::new([age.is_in(Param::positional()).unwrap()]))
            .config(&config)
            .build()
            .unwrap();

        let plan = schema
            .query("in_ages")
            .unwrap()
            .plan(&QueryArgs::new().arg(vec![1, 2, 3]))
            .unwrap();
        assert!(plan.to_string().starts_with("search:"));
        assert_eq!(schema.destination("age"), Some(StorageDestination::Both));
    }

    #[test]
    fn test_primary_indexes_put_inequality_last() {
        let username = username();
        let age = PropertyDescriptor::integer("age").build().unwrap();
        let score = PropertyDescriptor::float("score").build().unwrap();
        let schema = Schema::builder("User")
            .properties([username.clone(), age.clone(), score.clone()])
            .query("by_username", Query::by(&username).unwrap())
            .query(
                "adults_named",
                Query::new([
                    age.ge(18).unwrap(),
                    username.eq(Param::positional()).unwrap(),
                    age.lt(Param::positional()).unwrap(),
                ]),
            )
            .query(
                "ranged",
                Query::new([
                    age.gt(Param::positional()).unwrap(),
                    score.lt(Param::positional()).unwrap(),
                ]),
            )
            .query("all", Query::all())
            .build()
            .unwrap();

        let indexes = schema.primary_indexes();
        assert_eq!(
            indexes,
            vec![
                PrimaryIndex {
                    kind: "User".to_string(),
                    query: "by_username".to_string(),
                    properties: vec!["username".to_string()],
                },
                PrimaryIndex {
                    kind: "User".to_string(),
                    query: "adults_named".to_string(),
                    properties: vec!["username".to_string(), "age".to_string()],
                },
            ]
        );
    }
}
