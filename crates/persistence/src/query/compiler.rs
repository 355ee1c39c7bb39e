//! Compilation of bound predicate trees into backend queries.
//!
//! The primary store receives a structured [`PrimaryFilter`]. The search
//! index receives a query string in its grammar:
//!
//! - comparisons render as `field op value`; text values are double-quoted
//!   with `"` and `\` escaped
//! - inequality renders as `(NOT field = value)`
//! - IN renders as `(field = a OR field = b)`
//! - geo comparisons render as `distance(field, geopoint(lat, lon)) op meters`
//! - AND/OR groups are parenthesized

use std::fmt;

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::query::binding::{BoundComparison, BoundNode};
use crate::query::node::{Connective, Operator};
use crate::types::FieldValue;

/// A filter in the primary store's structured query form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PrimaryFilter {
    /// All filters must match.
    And {
        /// Child filters.
        filters: Vec<PrimaryFilter>,
    },
    /// At least one filter must match.
    Or {
        /// Child filters.
        filters: Vec<PrimaryFilter>,
    },
    /// A single field comparison.
    Compare {
        /// Field name.
        field: String,
        /// Operator.
        operator: Operator,
        /// Value in the primary store encoding.
        value: FieldValue,
    },
}

impl PrimaryFilter {
    /// Fields compared with an inequality operator anywhere in the filter.
    pub fn inequality_fields(&self) -> std::collections::BTreeSet<&str> {
        let mut out = std::collections::BTreeSet::new();
        self.collect_inequality_fields(&mut out);
        out
    }

    fn collect_inequality_fields<'a>(&'a self, out: &mut std::collections::BTreeSet<&'a str>) {
        match self {
            PrimaryFilter::And { filters } | PrimaryFilter::Or { filters } => {
                for filter in filters {
                    filter.collect_inequality_fields(out);
                }
            }
            PrimaryFilter::Compare {
                field, operator, ..
            } => {
                if operator.is_inequality() {
                    out.insert(field);
                }
            }
        }
    }
}

impl fmt::Display for PrimaryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimaryFilter::And { filters } => write_group(f, "AND", filters),
            PrimaryFilter::Or { filters } => write_group(f, "OR", filters),
            PrimaryFilter::Compare {
                field,
                operator,
                value,
            } => write!(f, "{} {} {}", field, operator, value),
        }
    }
}

fn write_group(f: &mut fmt::Formatter<'_>, joiner: &str, filters: &[PrimaryFilter]) -> fmt::Result {
    write!(f, "(")?;
    for (i, filter) in filters.iter().enumerate() {
        if i > 0 {
            write!(f, " {} ", joiner)?;
        }
        write!(f, "{}", filter)?;
    }
    write!(f, ")")
}

/// Compiles a bound tree into a primary store filter.
pub fn compile_primary(node: &BoundNode) -> PrimaryFilter {
    match node {
        BoundNode::Comparison(c) => PrimaryFilter::Compare {
            field: c.property().name().to_string(),
            operator: c.operator(),
            value: c.property().encode_for_primary(c.value()),
        },
        BoundNode::Logical(connective, children) => {
            let filters = children.iter().map(compile_primary).collect();
            match connective {
                Connective::And => PrimaryFilter::And { filters },
                Connective::Or => PrimaryFilter::Or { filters },
            }
        }
    }
}

/// Compiles a bound tree into a search index query string.
pub fn compile_search(node: &BoundNode) -> String {
    match node {
        BoundNode::Comparison(c) => render_comparison(c),
        BoundNode::Logical(connective, children) => {
            let parts: Vec<String> = children.iter().map(compile_search).collect();
            format!("({})", parts.join(&format!(" {} ", connective)))
        }
    }
}

fn render_comparison(c: &BoundComparison) -> String {
    let name = c.property().name();
    let encoded = c.property().encode_for_search(c.value());

    match (c.operator(), &encoded) {
        (operator, FieldValue::Distance(distance)) => format!(
            "distance({}, {}) {} {}",
            name, distance.center, operator, distance.meters
        ),
        (Operator::In, FieldValue::List(items)) => {
            let alternatives: Vec<String> = items
                .iter()
                .map(|item| format!("{} = {}", name, render_value(item)))
                .collect();
            format!("({})", alternatives.join(" OR "))
        }
        (Operator::Ne, value) => format!("(NOT {} = {})", name, render_value(value)),
        (operator, value) => format!("{} {} {}", name, operator, render_value(value)),
    }
}

/// Renders a search-encoded value as a grammar literal.
pub fn render_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Text(text) => quote(text),
        FieldValue::DateTime(dt) => dt.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        other => other.to_string(),
    }
}

/// Quotes text for the search grammar.
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}
