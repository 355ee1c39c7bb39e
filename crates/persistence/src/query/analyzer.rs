//! Backend eligibility analysis.
//!
//! The analyzer decides which backend can serve a predicate tree.
//!
//! | Backend | Condition |
//! |---------|-----------|
//! | Primary store | every comparison is primary-eligible and at most one property is compared with an inequality |
//! | Search index | every comparison's property allows search fallback |
//!
//! The primary store is preferred whenever it qualifies. IN counts as an
//! inequality for the single-inequality rule.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::HybridConfig;
use crate::query::node::Leaf;
use crate::schema::property::DEFAULT_MAX_PRIMARY_IN_VALUES;

/// The backend chosen to execute a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetBackend {
    /// The primary store.
    Primary,
    /// The search index.
    Search,
}

/// Result of analyzing a predicate tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryAnalysis {
    /// Properties compared with an inequality operator.
    pub inequality_properties: BTreeSet<String>,
    /// Comparisons the primary store cannot serve, as `property operator`.
    pub primary_ineligible: Vec<String>,
    /// Properties whose comparisons may not fall back to the search index.
    pub search_ineligible: Vec<String>,
}

impl QueryAnalysis {
    /// Whether the primary store can serve the whole tree.
    pub fn uses_primary_store(&self) -> bool {
        self.primary_ineligible.is_empty() && self.inequality_properties.len() <= 1
    }

    /// Whether the search index can serve the whole tree.
    pub fn is_search_eligible(&self) -> bool {
        self.search_ineligible.is_empty()
    }

    /// The backend to use, or `None` when neither qualifies.
    pub fn target(&self) -> Option<TargetBackend> {
        if self.uses_primary_store() {
            Some(TargetBackend::Primary)
        } else if self.is_search_eligible() {
            Some(TargetBackend::Search)
        } else {
            None
        }
    }

    /// Explains why the primary store was not chosen.
    pub fn primary_rejection(&self) -> Option<String> {
        if !self.primary_ineligible.is_empty() {
            Some(format!(
                "primary store cannot serve {}",
                self.primary_ineligible.join(", ")
            ))
        } else if self.inequality_properties.len() > 1 {
            Some(format!(
                "inequality filters on multiple properties: {}",
                self.inequality_properties
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        } else {
            None
        }
    }

    /// Explains why neither backend qualifies.
    pub fn rejection_reason(&self) -> String {
        let mut reasons = Vec::new();
        if let Some(primary) = self.primary_rejection() {
            reasons.push(primary);
        }
        if !self.search_ineligible.is_empty() {
            reasons.push(format!(
                "search fallback disabled for {}",
                self.search_ineligible.join(", ")
            ));
        }
        reasons.join("; ")
    }
}

/// Computes [`QueryAnalysis`] for predicate trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryAnalyzer {
    max_primary_in_values: usize,
}

impl Default for QueryAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PRIMARY_IN_VALUES)
    }
}

impl QueryAnalyzer {
    /// Creates an analyzer with the given IN-list size limit.
    pub fn new(max_primary_in_values: usize) -> Self {
        Self {
            max_primary_in_values,
        }
    }

    /// Creates an analyzer from the store configuration.
    pub fn from_config(config: &HybridConfig) -> Self {
        Self::new(config.max_primary_in_values)
    }

    /// Analyzes the comparisons of a tree.
    pub fn analyze<'a>(&self, leaves: impl IntoIterator<Item = Leaf<'a>>) -> QueryAnalysis {
        let mut analysis = QueryAnalysis::default();

        for leaf in leaves {
            let name = leaf.property.name();

            if leaf.operator.is_inequality() {
                analysis.inequality_properties.insert(name.to_string());
            }

            if !leaf.property.is_primary_eligible_within(
                leaf.operator,
                leaf.value,
                self.max_primary_in_values,
            ) {
                analysis
                    .primary_ineligible
                    .push(format!("{} {}", name, leaf.operator));
            }

            if !leaf.property.is_search_eligible(leaf.operator)
                && !analysis.search_ineligible.iter().any(|p| p == name)
            {
                analysis.search_ineligible.push(name.to_string());
            }
        }

        analysis
    }
}
