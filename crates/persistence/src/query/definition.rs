//! Named query definitions.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{QueryError, QueryResult, StorageResult};
use crate::hybrid::{Entity, HybridStore};
use crate::query::analyzer::{QueryAnalysis, QueryAnalyzer, TargetBackend};
use crate::query::binding::{BoundNode, QueryArgs, bind};
use crate::query::compiler::{PrimaryFilter, compile_primary, compile_search};
use crate::query::node::{Node, Param};
use crate::schema::PropertyDescriptor;

/// A compiled query, ready for a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum QueryPlan {
    /// Run against the primary store; `None` scans the whole kind.
    Primary {
        /// The structured filter.
        filter: Option<PrimaryFilter>,
    },
    /// Run against the search index.
    Search {
        /// The query string.
        query: String,
    },
}

impl QueryPlan {
    /// The backend this plan runs on.
    pub fn target(&self) -> TargetBackend {
        match self {
            QueryPlan::Primary { .. } => TargetBackend::Primary,
            QueryPlan::Search { .. } => TargetBackend::Search,
        }
    }
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryPlan::Primary { filter: Some(filter) } => write!(f, "primary: {}", filter),
            QueryPlan::Primary { filter: None } => write!(f, "primary: <all>"),
            QueryPlan::Search { query } => write!(f, "search: {}", query),
        }
    }
}

/// A predicate tree registered on a model under a name.
///
/// The top-level nodes are implicitly joined with AND. A query must be
/// registered through [`SchemaBuilder::query`](crate::schema::SchemaBuilder::query)
/// before it can run, which records the owning kind and name.
///
/// # Example
///
/// ```
/// use hybrid_persistence::query::{Query, QueryArgs, QueryPlan};
/// use hybrid_persistence::schema::{PropertyDescriptor, Schema};
///
/// let username = PropertyDescriptor::text("username").max_len(50).build().unwrap();
/// let schema = Schema::builder("User")
///     .property(username.clone())
///     .query("by_username", Query::by(&username).unwrap())
///     .build()
///     .unwrap();
///
/// let query = schema.get_query("by_username").unwrap();
/// assert_eq!(query.describe(), "AND(username = ?)");
///
/// let plan = query.plan(&QueryArgs::new().arg("alice")).unwrap();
/// assert!(matches!(plan, QueryPlan::Primary { filter: Some(_) }));
/// assert_eq!(plan.to_string(), "primary: username = \"alice\"");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    nodes: Vec<Node>,
    kind: Option<String>,
    name: Option<String>,
    analyzer: QueryAnalyzer,
}

impl Query {
    /// Creates a query over the given top-level nodes.
    pub fn new(nodes: impl IntoIterator<Item = Node>) -> Self {
        Self {
            nodes: nodes.into_iter().collect(),
            kind: None,
            name: None,
            analyzer: QueryAnalyzer::default(),
        }
    }

    /// A query with no predicates, matching every entity of the kind.
    pub fn all() -> Self {
        Self::new(Vec::new())
    }

    /// Shorthand for `Query::new([property.eq(Param::positional())])`.
    pub fn by(property: &Arc<PropertyDescriptor>) -> QueryResult<Self> {
        Ok(Self::new([property.eq(Param::positional())?]))
    }

    /// The top-level nodes.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// The owning kind, once registered.
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    /// The registered name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn register(&mut self, kind: &str, name: &str, analyzer: QueryAnalyzer) {
        self.kind = Some(kind.to_string());
        self.name = Some(name.to_string());
        self.analyzer = analyzer;
    }

    fn label(&self) -> String {
        match (&self.kind, &self.name) {
            (Some(kind), Some(name)) => format!("{}.{}", kind, name),
            _ => self.describe(),
        }
    }

    /// Renders the unbound tree, e.g. `AND(username = ?, age > :min)`.
    pub fn describe(&self) -> String {
        let parts: Vec<String> = self.nodes.iter().map(ToString::to_string).collect();
        format!("AND({})", parts.join(", "))
    }

    /// Analyzes the definition with parameters unbound.
    ///
    /// Value-dependent checks such as IN-list length are deferred to
    /// invocation, so this is the optimistic view used at registration.
    pub fn analyze(&self) -> QueryAnalysis {
        self.analyzer.analyze(
            self.nodes
                .iter()
                .flat_map(Node::comparisons)
                .map(|c| c.leaf()),
        )
    }

    /// Whether the definition, with parameters unbound, targets the primary store.
    pub fn uses_primary_store(&self) -> bool {
        self.analyze().uses_primary_store()
    }

    /// Binds `args` and compiles the query for its backend without running it.
    pub fn plan(&self, args: &QueryArgs) -> QueryResult<QueryPlan> {
        self.plan_with(&self.analyzer, args)
    }

    /// Like [`plan`](Self::plan), with the IN-list limit of `analyzer`.
    pub fn plan_with(
        &self,
        analyzer: &QueryAnalyzer,
        args: &QueryArgs,
    ) -> QueryResult<QueryPlan> {
        let bound = bind(&self.nodes, args)?;
        self.plan_bound(analyzer, bound.as_ref())
    }

    fn plan_bound(
        &self,
        analyzer: &QueryAnalyzer,
        bound: Option<&BoundNode>,
    ) -> QueryResult<QueryPlan> {
        let Some(root) = bound else {
            return Ok(QueryPlan::Primary { filter: None });
        };

        let analysis = analyzer.analyze(root.leaves());
        match analysis.target() {
            Some(TargetBackend::Primary) => Ok(QueryPlan::Primary {
                filter: Some(compile_primary(root)),
            }),
            Some(TargetBackend::Search) => {
                debug!(
                    query = %self.label(),
                    reason = analysis.primary_rejection().unwrap_or_default(),
                    "routing query to search index"
                );
                Ok(QueryPlan::Search {
                    query: compile_search(root),
                })
            }
            None => Err(QueryError::IllegalQueryComposition {
                query: self.label(),
                reason: analysis.rejection_reason(),
            }),
        }
    }

    /// Binds `args`, runs the query on the chosen backend and returns the
    /// matching entities.
    ///
    /// Planning uses the store's IN-list limit.
    #[instrument(skip(self, store, args), fields(query = %self.label()))]
    pub async fn invoke(
        &self,
        store: &HybridStore,
        args: &QueryArgs,
    ) -> StorageResult<Vec<Entity>> {
        let kind = self.kind.as_deref().ok_or_else(|| QueryError::UnboundQuery {
            query: self.describe(),
        })?;
        let schema = store.schema(kind)?;
        let plan = self.plan_with(&QueryAnalyzer::from_config(store.config()), args)?;
        debug!(plan = %plan, "executing query");
        store.execute_plan(&schema, &plan).await
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::node::{and, or};
    use crate::types::GeoPoint;

    fn username() -> Arc<PropertyDescriptor> {
        PropertyDescriptor::text("username").max_len(50).build().unwrap()
    }

    fn age() -> Arc<PropertyDescriptor> {
        PropertyDescriptor::integer("age").build().unwrap()
    }

    #[test]
    fn test_equality_on_eligible_properties_uses_primary() {
        let query = Query::new([
            username().eq(Param::positional()).unwrap(),
            age().eq(Param::positional()).unwrap(),
        ]);
        assert!(query.uses_primary_store());

        let plan = query
            .plan(&QueryArgs::from_positional(["bob"]).arg(40))
            .unwrap();
        assert_eq!(
            plan.to_string(),
            "primary: (username = \"bob\" AND age = 40)"
        );
    }

    #[test]
    fn test_two_inequality_properties_use_search() {
        let score = PropertyDescriptor::float("score").build().unwrap();
        let query = Query::new([
            age().gt(Param::named("age")).unwrap(),
            score.lt(Param::named("score")).unwrap(),
        ]);
        assert!(!query.uses_primary_store());

        let plan = query
            .plan(&QueryArgs::new().kwarg("age", 30).kwarg("score", 2.5))
            .unwrap();
        assert_eq!(
            plan,
            QueryPlan::Search {
                query: "(age > 30 AND score < 2.5)".to_string()
            }
        );
    }

    #[test]
    fn test_long_text_forces_search() {
        let bio = PropertyDescriptor::text("bio").max_len(1000).build().unwrap();
        let query = Query::by(&bio).unwrap();
        assert!(!query.uses_primary_store());
        let plan = query.plan(&QueryArgs::new().arg("hello")).unwrap();
        assert_eq!(plan.target(), TargetBackend::Search);
    }

    #[test]
    fn test_no_satisfiable_backend() {
        let bio = PropertyDescriptor::text("bio")
            .unbounded()
            .without_search_fallback()
            .build()
            .unwrap();
        let query = Query::by(&bio).unwrap();
        let err = query.plan(&QueryArgs::new().arg("x")).unwrap_err();
        assert!(matches!(err, QueryError::IllegalQueryComposition { .. }));
    }

    #[test]
    fn test_in_list_size_decided_at_invocation() {
        let query = Query::new([age().is_in(Param::positional()).unwrap()]);
        assert!(query.uses_primary_store());

        let small = query.plan(&QueryArgs::new().arg(vec![1, 2])).unwrap();
        assert_eq!(small.target(), TargetBackend::Primary);

        let large = query
            .plan(&QueryArgs::new().arg((0..40).collect::<Vec<i64>>()))
            .unwrap();
        assert_eq!(large.target(), TargetBackend::Search);
    }

    #[test]
    fn test_plan_with_uses_given_in_limit() {
        let query = Query::new([age().is_in(Param::positional()).unwrap()]);
        let args = QueryArgs::new().arg(vec![1, 2, 3, 4, 5]);
        assert_eq!(query.plan(&args).unwrap().target(), TargetBackend::Primary);

        let strict = QueryAnalyzer::new(2);
        assert_eq!(
            query.plan_with(&strict, &args).unwrap().target(),
            TargetBackend::Search
        );
    }

    #[test]
    fn test_geo_query_plans_search() {
        let location = PropertyDescriptor::geo_point("location").build().unwrap();
        let query = Query::new([
            location.within(GeoPoint::new(0.0, 0.0), 250.0).unwrap(),
            or([age().lt(10).unwrap(), age().gt(90).unwrap()]).unwrap(),
        ]);
        let plan = query.plan(&QueryArgs::new()).unwrap();
        assert_eq!(
            plan.to_string(),
            "search: (distance(location, geopoint(0, 0)) < 250 AND (age < 10 OR age > 90))"
        );
    }

    #[test]
    fn test_empty_query_scans_primary() {
        let plan = Query::all().plan(&QueryArgs::new()).unwrap();
        assert_eq!(plan, QueryPlan::Primary { filter: None });
    }

    #[test]
    fn test_describe_unbound_tree() {
        let query = Query::new([
            username().eq(Param::positional()).unwrap(),
            and([age().gt(Param::named("min")).unwrap()]).unwrap(),
        ]);
        assert_eq!(query.describe(), "AND(username = ?, (age > :min))");
        assert_eq!(query.kind(), None);
    }
}
