//! Invocation arguments and parameter binding.
//!
//! Binding turns a predicate tree with deferred parameters into a
//! [`BoundNode`] tree whose operands are all concrete values. Each invocation
//! works on its own copy of the caller's arguments, so a query definition can
//! be invoked concurrently without the invocations observing each other.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::error::{QueryError, QueryResult};
use crate::query::node::{Comparison, Connective, Leaf, Node, Operand, Operator, Param};
use crate::schema::PropertyDescriptor;
use crate::types::FieldValue;

/// Arguments supplied when invoking a query.
///
/// # Example
///
/// ```
/// use hybrid_persistence::query::QueryArgs;
///
/// let args = QueryArgs::new().arg("alice").kwarg("min_age", 18);
/// assert_eq!(args.positional().len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryArgs {
    positional: Vec<FieldValue>,
    keyword: HashMap<String, FieldValue>,
}

impl QueryArgs {
    /// Creates an empty argument set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an argument set from positional values.
    pub fn from_positional<V: Into<FieldValue>>(values: impl IntoIterator<Item = V>) -> Self {
        Self {
            positional: values.into_iter().map(Into::into).collect(),
            keyword: HashMap::new(),
        }
    }

    /// Appends a positional argument.
    pub fn arg(mut self, value: impl Into<FieldValue>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Sets a keyword argument.
    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.keyword.insert(key.into(), value.into());
        self
    }

    /// Positional arguments in order.
    pub fn positional(&self) -> &[FieldValue] {
        &self.positional
    }

    /// Keyword arguments.
    pub fn keyword(&self) -> &HashMap<String, FieldValue> {
        &self.keyword
    }
}

/// Per-invocation argument state consumed while binding.
#[derive(Debug)]
struct ArgumentPool {
    positional: VecDeque<FieldValue>,
    keyword: HashMap<String, FieldValue>,
    consumed: usize,
}

impl ArgumentPool {
    fn new(args: &QueryArgs) -> Self {
        Self {
            positional: args.positional.iter().cloned().collect(),
            keyword: args.keyword.clone(),
            consumed: 0,
        }
    }

    fn resolve(&mut self, param: &Param) -> QueryResult<FieldValue> {
        match param.key() {
            None => {
                self.consumed += 1;
                self.positional
                    .pop_front()
                    .or_else(|| param.default_value().cloned())
                    .ok_or_else(|| QueryError::QueryParameterUnresolved {
                        parameter: format!("positional argument {}", self.consumed),
                    })
            }
            Some(key) => self
                .keyword
                .get(key)
                .cloned()
                .or_else(|| param.default_value().cloned())
                .ok_or_else(|| QueryError::QueryParameterUnresolved {
                    parameter: key.to_string(),
                }),
        }
    }
}

/// A comparison whose operand has been resolved and validated.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundComparison {
    property: Arc<PropertyDescriptor>,
    operator: Operator,
    value: FieldValue,
}

impl BoundComparison {
    /// The compared property.
    pub fn property(&self) -> &Arc<PropertyDescriptor> {
        &self.property
    }

    /// The operator.
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// The resolved operand.
    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    /// A view of this comparison for analysis.
    pub fn leaf(&self) -> Leaf<'_> {
        Leaf {
            property: &self.property,
            operator: self.operator,
            value: Some(&self.value),
        }
    }
}

impl fmt::Display for BoundComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.property.name(),
            self.operator,
            self.value
        )
    }
}

/// A predicate tree with every operand resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundNode {
    /// A resolved comparison.
    Comparison(BoundComparison),
    /// An AND/OR of resolved children, never empty.
    Logical(Connective, Vec<BoundNode>),
}

impl BoundNode {
    /// Analysis views of every comparison, in document order.
    pub fn leaves(&self) -> Vec<Leaf<'_>> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<Leaf<'a>>) {
        match self {
            BoundNode::Comparison(c) => out.push(c.leaf()),
            BoundNode::Logical(_, children) => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
        }
    }
}

impl fmt::Display for BoundNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundNode::Comparison(c) => write!(f, "{}", c),
            BoundNode::Logical(connective, children) => {
                write!(f, "(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {} ", connective)?;
                    }
                    write!(f, "{}", child)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Binds the top-level nodes of a query against `args`.
///
/// Top-level nodes are implicitly joined with AND. Returns `None` for a
/// query with no nodes. Parameters are resolved in document order, so
/// positional arguments are consumed left to right.
pub fn bind(nodes: &[Node], args: &QueryArgs) -> QueryResult<Option<BoundNode>> {
    let mut pool = ArgumentPool::new(args);
    let mut bound = nodes
        .iter()
        .map(|node| bind_node(node, &mut pool))
        .collect::<QueryResult<Vec<_>>>()?;

    if !pool.positional.is_empty() {
        trace!(
            unused = pool.positional.len(),
            "ignoring unused positional arguments"
        );
    }

    Ok(match bound.len() {
        0 => None,
        1 => bound.pop(),
        _ => Some(BoundNode::Logical(Connective::And, bound)),
    })
}

fn bind_node(node: &Node, pool: &mut ArgumentPool) -> QueryResult<BoundNode> {
    match node {
        Node::Comparison(c) => bind_comparison(c, pool).map(BoundNode::Comparison),
        Node::Logical(op) => {
            let children = op
                .children()
                .iter()
                .map(|child| bind_node(child, pool))
                .collect::<QueryResult<Vec<_>>>()?;
            Ok(BoundNode::Logical(op.connective(), children))
        }
    }
}

fn bind_comparison(c: &Comparison, pool: &mut ArgumentPool) -> QueryResult<BoundComparison> {
    let value = match c.operand() {
        Operand::Literal(value) => value.clone(),
        Operand::Param(param) => {
            let raw = pool.resolve(param)?;
            c.property().validate_operand(c.operator(), &raw)?
        }
    };
    Ok(BoundComparison {
        property: Arc::clone(c.property()),
        operator: c.operator(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::node::and;

    fn name() -> Arc<PropertyDescriptor> {
        PropertyDescriptor::text("name").max_len(50).build().unwrap()
    }

    fn age() -> Arc<PropertyDescriptor> {
        PropertyDescriptor::integer("age").build().unwrap()
    }

    #[test]
    fn test_positional_consumed_in_order() {
        let nodes = vec![
            name().eq(Param::positional()).unwrap(),
            age().gt(Param::positional()).unwrap(),
        ];
        let bound = bind(&nodes, &QueryArgs::new().arg("bob").arg(30))
            .unwrap()
            .unwrap();
        assert_eq!(bound.to_string(), "(name = \"bob\" AND age > 30)");
    }

    #[test]
    fn test_keyword_and_default() {
        let nodes = vec![
            and([
                age().ge(Param::named("min")).unwrap(),
                age().le(Param::named("max").with_default(99)).unwrap(),
            ])
            .unwrap(),
        ];
        let bound = bind(&nodes, &QueryArgs::new().kwarg("min", 18))
            .unwrap()
            .unwrap();
        assert_eq!(bound.to_string(), "(age >= 18 AND age <= 99)");
    }

    #[test]
    fn test_missing_argument_fails() {
        let nodes = vec![name().eq(Param::named("username")).unwrap()];
        let err = bind(&nodes, &QueryArgs::new()).unwrap_err();
        assert_eq!(
            err,
            QueryError::QueryParameterUnresolved {
                parameter: "username".to_string()
            }
        );

        let nodes = vec![name().eq(Param::positional()).unwrap()];
        assert!(matches!(
            bind(&nodes, &QueryArgs::new()),
            Err(QueryError::QueryParameterUnresolved { .. })
        ));
    }

    #[test]
    fn test_bound_argument_validated() {
        let nodes = vec![age().eq(Param::positional()).unwrap()];
        let err = bind(&nodes, &QueryArgs::new().arg("old")).unwrap_err();
        assert!(matches!(err, QueryError::InvalidOperand(_)));
    }

    #[test]
    fn test_invocations_do_not_share_state() {
        let nodes = vec![name().eq(Param::positional()).unwrap()];
        let args = QueryArgs::new().arg("a");
        let first = bind(&nodes, &args).unwrap();
        let second = bind(&nodes, &args).unwrap();
        assert_eq!(first, second);
        assert_eq!(args.positional().len(), 1);
    }

    #[test]
    fn test_empty_query_binds_to_none() {
        assert_eq!(bind(&[], &QueryArgs::new()).unwrap(), None);
    }
}
