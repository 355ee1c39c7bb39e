//! Assertion helpers for entities and query results.

use hybrid_persistence::hybrid::Entity;
use hybrid_persistence::query::QueryPlan;
use hybrid_persistence::types::FieldValue;

/// Asserts that `entity` holds `expected` in field `name`.
pub fn assert_field(entity: &Entity, name: &str, expected: impl Into<FieldValue>) {
    let expected = expected.into();
    assert_eq!(
        entity.get(name),
        Some(&expected),
        "Field '{}' mismatch on {:?}",
        name,
        entity.key()
    );
}

/// Returns the usernames of `entities` in order.
pub fn usernames(entities: &[Entity]) -> Vec<String> {
    entities
        .iter()
        .map(|e| {
            e.get("username")
                .and_then(|v| v.as_text())
                .unwrap_or_default()
                .to_string()
        })
        .collect()
}

/// Asserts that `plan` targets the primary store.
pub fn assert_primary(plan: &QueryPlan) {
    assert!(
        matches!(plan, QueryPlan::Primary { .. }),
        "Expected a primary store plan, got {}",
        plan
    );
}

/// Asserts that `plan` targets the search index.
pub fn assert_search(plan: &QueryPlan) {
    assert!(
        matches!(plan, QueryPlan::Search { .. }),
        "Expected a search index plan, got {}",
        plan
    );
}
