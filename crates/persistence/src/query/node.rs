//! Predicate tree nodes.
//!
//! A query is a tree of [`Node`]s. Leaves are [`Comparison`]s of a property
//! against an [`Operand`], which is either a literal value or a deferred
//! [`Param`] resolved when the query is invoked. Inner nodes are
//! [`LogicalOperator`]s joining their children with AND or OR.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};
use crate::schema::PropertyDescriptor;
use crate::schema::property::unsupported_operator;
use crate::types::{Distance, EntityKey, FieldValue, GeoPoint};

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// Membership in a list of values.
    In,
}

impl Operator {
    /// The operator's textual symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::In => "IN",
        }
    }

    /// Returns true for every operator other than equality.
    ///
    /// The primary store treats IN as an inequality when enforcing its
    /// single-inequality-property rule.
    pub fn is_inequality(&self) -> bool {
        !matches!(self, Operator::Eq)
    }

    /// Evaluates `ordering` (left compared to right) under this operator.
    ///
    /// IN is not an ordering test and always returns false here.
    pub fn accepts(&self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Operator::Eq => ordering == Equal,
            Operator::Ne => ordering != Equal,
            Operator::Lt => ordering == Less,
            Operator::Le => ordering != Greater,
            Operator::Gt => ordering == Greater,
            Operator::Ge => ordering != Less,
            Operator::In => false,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A deferred query parameter.
///
/// Positional parameters consume the next positional argument at invocation.
/// Named parameters look up their key among the keyword arguments and fall
/// back to the default, if one was declared.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Param {
    key: Option<String>,
    default: Option<FieldValue>,
}

impl Param {
    /// A parameter bound to the next positional argument.
    pub fn positional() -> Self {
        Self::default()
    }

    /// A parameter bound to the keyword argument `key`.
    pub fn named(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            default: None,
        }
    }

    /// Sets the value used when no matching argument is supplied.
    pub fn with_default(mut self, value: impl Into<FieldValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// The keyword key, if named.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// The declared default value.
    pub fn default_value(&self) -> Option<&FieldValue> {
        self.default.as_ref()
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, ":{}", key),
            None => f.write_str("?"),
        }
    }
}

/// The right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A value fixed at definition time.
    Literal(FieldValue),
    /// A value supplied at invocation time.
    Param(Param),
}

impl Operand {
    /// The literal value, if known at definition time.
    pub fn literal(&self) -> Option<&FieldValue> {
        match self {
            Operand::Literal(value) => Some(value),
            Operand::Param(_) => None,
        }
    }
}

impl From<Param> for Operand {
    fn from(param: Param) -> Self {
        Operand::Param(param)
    }
}

impl From<FieldValue> for Operand {
    fn from(value: FieldValue) -> Self {
        Operand::Literal(value)
    }
}

macro_rules! literal_operand {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Operand {
                fn from(value: $ty) -> Self {
                    Operand::Literal(FieldValue::from(value))
                }
            }
        )*
    };
}

literal_operand!(
    bool,
    i32,
    i64,
    f64,
    &str,
    String,
    DateTime<Utc>,
    GeoPoint,
    Distance,
    EntityKey,
);

impl<T: Into<FieldValue>> From<Vec<T>> for Operand {
    fn from(values: Vec<T>) -> Self {
        Operand::Literal(FieldValue::from(values))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Literal(value) => write!(f, "{}", value),
            Operand::Param(param) => write!(f, "{}", param),
        }
    }
}

/// A single `property operator operand` predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    property: Arc<PropertyDescriptor>,
    operator: Operator,
    operand: Operand,
}

impl Comparison {
    /// Creates a comparison, rejecting operators the property does not allow
    /// and literals that do not fit the property.
    pub fn new(
        property: Arc<PropertyDescriptor>,
        operator: Operator,
        operand: Operand,
    ) -> QueryResult<Self> {
        if !property.allows(operator) {
            return Err(unsupported_operator(&property, operator));
        }
        let operand = match operand {
            Operand::Literal(value) => {
                Operand::Literal(property.validate_operand(operator, &value)?)
            }
            param => param,
        };
        Ok(Self {
            property,
            operator,
            operand,
        })
    }

    /// The compared property.
    pub fn property(&self) -> &Arc<PropertyDescriptor> {
        &self.property
    }

    /// The operator.
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// The operand.
    pub fn operand(&self) -> &Operand {
        &self.operand
    }

    /// A view of this comparison for analysis.
    pub fn leaf(&self) -> Leaf<'_> {
        Leaf {
            property: &self.property,
            operator: self.operator,
            value: self.operand.literal(),
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.property.name(),
            self.operator,
            self.operand
        )
    }
}

/// How a logical operator joins its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Connective {
    /// All children must hold.
    And,
    /// At least one child must hold.
    Or,
}

impl fmt::Display for Connective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connective::And => f.write_str("AND"),
            Connective::Or => f.write_str("OR"),
        }
    }
}

/// An AND/OR over one or more child nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalOperator {
    connective: Connective,
    children: Vec<Node>,
}

impl LogicalOperator {
    /// Creates a logical operator; fails when `children` is empty.
    pub fn new(connective: Connective, children: Vec<Node>) -> QueryResult<Self> {
        if children.is_empty() {
            return Err(QueryError::EmptyLogicalOperator {
                operator: connective.to_string(),
            });
        }
        Ok(Self {
            connective,
            children,
        })
    }

    /// AND or OR.
    pub fn connective(&self) -> Connective {
        self.connective
    }

    /// The child nodes, never empty.
    pub fn children(&self) -> &[Node] {
        &self.children
    }
}

/// A node of the predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A leaf comparison.
    Comparison(Comparison),
    /// An AND/OR of child nodes.
    Logical(LogicalOperator),
}

impl Node {
    /// Every comparison in the tree, in document order.
    pub fn comparisons(&self) -> Vec<&Comparison> {
        let mut out = Vec::new();
        self.collect_comparisons(&mut out);
        out
    }

    fn collect_comparisons<'a>(&'a self, out: &mut Vec<&'a Comparison>) {
        match self {
            Node::Comparison(c) => out.push(c),
            Node::Logical(op) => {
                for child in &op.children {
                    child.collect_comparisons(out);
                }
            }
        }
    }

    /// Names of every property referenced by the tree.
    pub fn property_names(&self) -> BTreeSet<&str> {
        self.comparisons()
            .into_iter()
            .map(|c| c.property.name())
            .collect()
    }
}

impl From<Comparison> for Node {
    fn from(comparison: Comparison) -> Self {
        Node::Comparison(comparison)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Comparison(c) => write!(f, "{}", c),
            Node::Logical(op) => {
                write!(f, "(")?;
                for (i, child) in op.children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {} ", op.connective)?;
                    }
                    write!(f, "{}", child)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Joins `nodes` with AND.
pub fn and(nodes: impl IntoIterator<Item = Node>) -> QueryResult<Node> {
    LogicalOperator::new(Connective::And, nodes.into_iter().collect()).map(Node::Logical)
}

/// Joins `nodes` with OR.
pub fn or(nodes: impl IntoIterator<Item = Node>) -> QueryResult<Node> {
    LogicalOperator::new(Connective::Or, nodes.into_iter().collect()).map(Node::Logical)
}

/// A borrowed view of a comparison used by the analyzer.
///
/// `value` is `None` when the operand is a parameter that has not been bound.
#[derive(Debug, Clone, Copy)]
pub struct Leaf<'a> {
    /// The compared property.
    pub property: &'a PropertyDescriptor,
    /// The operator.
    pub operator: Operator,
    /// The operand value, when known.
    pub value: Option<&'a FieldValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn age() -> Arc<PropertyDescriptor> {
        PropertyDescriptor::integer("age").build().unwrap()
    }

    fn name() -> Arc<PropertyDescriptor> {
        PropertyDescriptor::text("name").max_len(50).build().unwrap()
    }

    #[test]
    fn test_operator_symbols() {
        assert_eq!(Operator::Eq.to_string(), "=");
        assert_eq!(Operator::Ne.to_string(), "!=");
        assert_eq!(Operator::Le.to_string(), "<=");
        assert_eq!(Operator::In.to_string(), "IN");
        assert!(Operator::In.is_inequality());
        assert!(!Operator::Eq.is_inequality());
    }

    #[test]
    fn test_operator_accepts_ordering() {
        use std::cmp::Ordering;
        assert!(Operator::Le.accepts(Ordering::Equal));
        assert!(Operator::Le.accepts(Ordering::Less));
        assert!(!Operator::Gt.accepts(Ordering::Equal));
        assert!(Operator::Ne.accepts(Ordering::Greater));
    }

    #[test]
    fn test_comparison_display() {
        assert_eq!(name().eq("bob").unwrap().to_string(), "name = \"bob\"");
        assert_eq!(age().gt(Param::named("min")).unwrap().to_string(), "age > :min");
        assert_eq!(age().le(Param::positional()).unwrap().to_string(), "age <= ?");
    }

    #[test]
    fn test_literal_validated_against_property() {
        let err = age().eq("thirty").unwrap_err();
        assert!(matches!(err, QueryError::InvalidOperand(_)));
    }

    #[test]
    fn test_logical_requires_children() {
        let err = and(Vec::new()).unwrap_err();
        assert_eq!(
            err,
            QueryError::EmptyLogicalOperator {
                operator: "AND".to_string()
            }
        );
    }

    #[test]
    fn test_nested_display_and_comparisons() {
        let tree = or([
            name().eq("a").unwrap(),
            and([age().gt(18).unwrap(), age().lt(65).unwrap()]).unwrap(),
        ])
        .unwrap();
        assert_eq!(
            tree.to_string(),
            "(name = \"a\" OR (age > 18 AND age < 65))"
        );
        assert_eq!(tree.comparisons().len(), 3);
        assert_eq!(
            tree.property_names().into_iter().collect::<Vec<_>>(),
            vec!["age", "name"]
        );
    }

    #[test]
    fn test_param_defaults() {
        let param = Param::named("limit").with_default(10);
        assert_eq!(param.key(), Some("limit"));
        assert_eq!(param.default_value(), Some(&FieldValue::Integer(10)));
        assert_eq!(Param::positional().to_string(), "?");
    }
}
