//! Property descriptors.
//!
//! A [`PropertyDescriptor`] is the per-field metadata of a model: its kind,
//! validation constraints, storage destination, which comparison operators it
//! supports and, for each `(operator, value)` pair, whether the primary store
//! can serve the comparison. It also owns the per-backend encodings.
//!
//! Descriptors are immutable once built and shared through `Arc`, so query
//! nodes and schemas can reference the same descriptor.
//!
//! # Example
//!
//! ```
//! use hybrid_persistence::query::{Operator, Param};
//! use hybrid_persistence::schema::PropertyDescriptor;
//! use hybrid_persistence::types::FieldValue;
//!
//! let username = PropertyDescriptor::text("username").max_len(50).required().build().unwrap();
//! let bio = PropertyDescriptor::text("bio").max_len(1000).build().unwrap();
//!
//! assert!(username.is_primary_eligible(Operator::Eq, Some(&FieldValue::from("alice"))));
//! assert!(!bio.is_primary_eligible(Operator::Eq, None));
//!
//! let node = username.eq(Param::positional()).unwrap();
//! assert_eq!(node.to_string(), "username = ?");
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult, SchemaError, ValidationError, ValidationResult};
use crate::query::{Comparison, Node, Operand, Operator};
use crate::types::{EntityKey, FieldValue};

/// Text properties with a declared maximum length above this are indexed
/// differently by the primary store and cannot be filtered there.
pub const PRIMARY_TEXT_MAX_LEN: usize = 500;

/// Default IN-list size limit for primary store comparisons.
pub const DEFAULT_MAX_PRIMARY_IN_VALUES: usize = 30;

const TEXT_OPERATORS: &[Operator] = &[Operator::Eq, Operator::Ne, Operator::In];
const ORDERED_OPERATORS: &[Operator] = &[
    Operator::Eq,
    Operator::Ne,
    Operator::Lt,
    Operator::Le,
    Operator::Gt,
    Operator::Ge,
    Operator::In,
];
const BOOLEAN_OPERATORS: &[Operator] = &[Operator::Eq, Operator::Ne];
const GEO_OPERATORS: &[Operator] = &[Operator::Lt, Operator::Le, Operator::Gt, Operator::Ge];
const REFERENCE_OPERATORS: &[Operator] = &[Operator::Eq, Operator::Ne, Operator::In];

/// Where a property's value is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageDestination {
    /// Primary store only.
    #[default]
    Primary,
    /// Search index only.
    Search,
    /// Both backends.
    Both,
}

impl StorageDestination {
    /// Returns true if the value is written to the primary store.
    pub fn includes_primary(&self) -> bool {
        matches!(self, StorageDestination::Primary | StorageDestination::Both)
    }

    /// Returns true if the value is written to the search index.
    pub fn includes_search(&self) -> bool {
        matches!(self, StorageDestination::Search | StorageDestination::Both)
    }

    /// Returns this destination widened to include the search index.
    pub fn with_search(self) -> Self {
        match self {
            StorageDestination::Primary | StorageDestination::Both => StorageDestination::Both,
            StorageDestination::Search => StorageDestination::Search,
        }
    }
}

/// The type of a property, with its type-specific constraints.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKind {
    /// Text with optional length bounds and allowed character set.
    Text {
        /// Minimum length in characters.
        min_len: Option<usize>,
        /// Maximum length in characters; `None` means unbounded.
        max_len: Option<usize>,
        /// Allowed characters; `None` allows all.
        characters: Option<BTreeSet<char>>,
    },
    /// Signed integer with optional bounds.
    Integer {
        /// Inclusive lower bound.
        min: Option<i64>,
        /// Inclusive upper bound.
        max: Option<i64>,
    },
    /// Floating point number with optional bounds.
    Float {
        /// Inclusive lower bound.
        min: Option<f64>,
        /// Inclusive upper bound.
        max: Option<f64>,
    },
    /// Boolean.
    Boolean,
    /// UTC timestamp.
    DateTime,
    /// Geographic point; queried only by distance.
    GeoPoint,
    /// Key of another entity.
    Reference {
        /// Kind the key must belong to; `None` accepts any kind.
        kind: Option<String>,
    },
}

impl PropertyKind {
    /// Short name of the kind, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyKind::Text { .. } => "text",
            PropertyKind::Integer { .. } => "integer",
            PropertyKind::Float { .. } => "float",
            PropertyKind::Boolean => "bool",
            PropertyKind::DateTime => "datetime",
            PropertyKind::GeoPoint => "geopoint",
            PropertyKind::Reference { .. } => "reference",
        }
    }

    /// Operators this kind supports.
    pub fn allowed_operators(&self) -> &'static [Operator] {
        match self {
            PropertyKind::Text { .. } => TEXT_OPERATORS,
            PropertyKind::Integer { .. } | PropertyKind::Float { .. } | PropertyKind::DateTime => {
                ORDERED_OPERATORS
            }
            PropertyKind::Boolean => BOOLEAN_OPERATORS,
            PropertyKind::GeoPoint => GEO_OPERATORS,
            PropertyKind::Reference { .. } => REFERENCE_OPERATORS,
        }
    }
}

/// Metadata for one field of a model.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    name: String,
    kind: PropertyKind,
    required: bool,
    default: Option<FieldValue>,
    choices: Option<Vec<FieldValue>>,
    destination: StorageDestination,
    search_fallback: bool,
}

impl PropertyDescriptor {
    /// Starts a text property. The maximum length defaults to
    /// [`PRIMARY_TEXT_MAX_LEN`].
    pub fn text(name: impl Into<String>) -> PropertyBuilder {
        PropertyBuilder::new(
            name,
            PropertyKind::Text {
                min_len: None,
                max_len: Some(PRIMARY_TEXT_MAX_LEN),
                characters: None,
            },
        )
    }

    /// Starts an integer property.
    pub fn integer(name: impl Into<String>) -> PropertyBuilder {
        PropertyBuilder::new(name, PropertyKind::Integer { min: None, max: None })
    }

    /// Starts a float property.
    pub fn float(name: impl Into<String>) -> PropertyBuilder {
        PropertyBuilder::new(name, PropertyKind::Float { min: None, max: None })
    }

    /// Starts a boolean property.
    pub fn boolean(name: impl Into<String>) -> PropertyBuilder {
        PropertyBuilder::new(name, PropertyKind::Boolean)
    }

    /// Starts a timestamp property.
    pub fn datetime(name: impl Into<String>) -> PropertyBuilder {
        PropertyBuilder::new(name, PropertyKind::DateTime)
    }

    /// Starts a geo-point property. Geo-points live in the search index.
    pub fn geo_point(name: impl Into<String>) -> PropertyBuilder {
        PropertyBuilder::new(name, PropertyKind::GeoPoint).destination(StorageDestination::Both)
    }

    /// Starts a reference property holding keys of `kind`.
    pub fn reference(name: impl Into<String>, kind: impl Into<String>) -> PropertyBuilder {
        PropertyBuilder::new(
            name,
            PropertyKind::Reference {
                kind: Some(kind.into()),
            },
        )
    }

    /// The property name, unique per model.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The property kind.
    pub fn kind(&self) -> &PropertyKind {
        &self.kind
    }

    /// Whether a value is required on save.
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// The value assigned to new model instances.
    pub fn default_value(&self) -> Option<&FieldValue> {
        self.default.as_ref()
    }

    /// The declared storage destination.
    pub fn destination(&self) -> StorageDestination {
        self.destination
    }

    /// Whether comparisons on this property may fall back to the search index.
    pub fn search_fallback(&self) -> bool {
        self.search_fallback
    }

    /// Operators this property supports.
    pub fn allowed_operators(&self) -> &'static [Operator] {
        self.kind.allowed_operators()
    }

    /// Returns true if `operator` is in the allowed set.
    pub fn allows(&self, operator: Operator) -> bool {
        self.allowed_operators().contains(&operator)
    }

    /// Whether the primary store can serve `self {operator} value`.
    ///
    /// `value` is `None` when the operand is not known yet (a deferred
    /// parameter at definition time); value-dependent checks then pass.
    pub fn is_primary_eligible(&self, operator: Operator, value: Option<&FieldValue>) -> bool {
        self.is_primary_eligible_within(operator, value, DEFAULT_MAX_PRIMARY_IN_VALUES)
    }

    /// [`is_primary_eligible`](Self::is_primary_eligible) with an explicit
    /// IN-list size limit.
    pub fn is_primary_eligible_within(
        &self,
        operator: Operator,
        value: Option<&FieldValue>,
        max_in_values: usize,
    ) -> bool {
        if !self.allows(operator) || !self.destination.includes_primary() {
            return false;
        }
        if operator == Operator::In {
            if let Some(FieldValue::List(items)) = value {
                if items.len() > max_in_values {
                    return false;
                }
            }
        }
        match &self.kind {
            PropertyKind::Text { max_len, .. } => {
                max_len.is_some_and(|max| max <= PRIMARY_TEXT_MAX_LEN)
            }
            PropertyKind::GeoPoint => false,
            PropertyKind::Reference { .. } => operator == Operator::Eq,
            PropertyKind::Integer { .. }
            | PropertyKind::Float { .. }
            | PropertyKind::Boolean
            | PropertyKind::DateTime => true,
        }
    }

    /// Whether the search index can serve a comparison with `operator`.
    pub fn is_search_eligible(&self, operator: Operator) -> bool {
        self.search_fallback && self.allows(operator)
    }

    /// Encodes a value for the primary store.
    pub fn encode_for_primary(&self, value: &FieldValue) -> FieldValue {
        match (&self.kind, value) {
            (_, FieldValue::List(items)) => {
                FieldValue::List(items.iter().map(|v| self.encode_for_primary(v)).collect())
            }
            (PropertyKind::Float { .. }, FieldValue::Integer(i)) => FieldValue::Float(*i as f64),
            _ => value.clone(),
        }
    }

    /// Encodes a value for the search index.
    ///
    /// The index only knows numbers, text, timestamps and geo-points.
    /// Booleans become `"true"`/`"false"` atoms and references become
    /// url-safe key tokens. Integers stay exact.
    pub fn encode_for_search(&self, value: &FieldValue) -> FieldValue {
        match (&self.kind, value) {
            (_, FieldValue::List(items)) => {
                FieldValue::List(items.iter().map(|v| self.encode_for_search(v)).collect())
            }
            (PropertyKind::Float { .. }, FieldValue::Integer(i)) => FieldValue::Float(*i as f64),
            (_, FieldValue::Bool(b)) => FieldValue::Text(b.to_string()),
            (_, FieldValue::Reference(key)) => FieldValue::Text(key.to_urlsafe()),
            (_, other) => other.clone(),
        }
    }

    /// Decodes a value read from either backend into the property's type.
    pub fn decode(&self, stored: &FieldValue) -> ValidationResult<FieldValue> {
        if stored.is_null() {
            return Ok(FieldValue::Null);
        }
        let decoded = match (&self.kind, stored) {
            (PropertyKind::Integer { .. }, FieldValue::Float(f)) if f.fract() == 0.0 => {
                Some(FieldValue::Integer(*f as i64))
            }
            (PropertyKind::Boolean, FieldValue::Text(s)) => match s.as_str() {
                "true" => Some(FieldValue::Bool(true)),
                "false" => Some(FieldValue::Bool(false)),
                _ => None,
            },
            (PropertyKind::Reference { .. }, FieldValue::Text(token)) => {
                EntityKey::from_urlsafe(token).map(FieldValue::Reference)
            }
            _ => self.coerce(stored).ok(),
        };
        decoded.ok_or_else(|| ValidationError::DecodeFailed {
            field: self.name.clone(),
            message: format!(
                "{} value {} is not a valid {}",
                stored.type_name(),
                stored,
                self.kind.type_name()
            ),
        })
    }

    /// Validates a field value, returning it coerced to the property's type.
    ///
    /// Checks required-ness, type, choices, numeric range, text length and the
    /// allowed character set.
    pub fn validate(&self, value: &FieldValue) -> ValidationResult<FieldValue> {
        if value.is_null() {
            if self.required {
                return Err(ValidationError::MissingRequiredField {
                    field: self.name.clone(),
                });
            }
            return Ok(FieldValue::Null);
        }

        let value = self.coerce(value)?;

        if let Some(ref choices) = self.choices {
            if !choices.contains(&value) {
                return Err(ValidationError::NotInChoices {
                    field: self.name.clone(),
                    value: value.to_string(),
                });
            }
        }

        match (&self.kind, &value) {
            (
                PropertyKind::Text {
                    min_len,
                    max_len,
                    characters,
                },
                FieldValue::Text(text),
            ) => {
                let length = text.chars().count();
                let min = min_len.unwrap_or(0);
                let max = max_len.unwrap_or(usize::MAX);
                if length < min || length > max {
                    return Err(ValidationError::LengthOutOfRange {
                        field: self.name.clone(),
                        length,
                        min,
                        max,
                    });
                }
                if let Some(allowed) = characters {
                    let invalid: BTreeSet<char> =
                        text.chars().filter(|c| !allowed.contains(c)).collect();
                    if !invalid.is_empty() {
                        return Err(ValidationError::InvalidCharacters {
                            field: self.name.clone(),
                            invalid: invalid.into_iter().collect(),
                        });
                    }
                }
            }
            (PropertyKind::Integer { min, max }, FieldValue::Integer(i)) => {
                if min.is_some_and(|m| *i < m) || max.is_some_and(|m| *i > m) {
                    return Err(ValidationError::OutOfRange {
                        field: self.name.clone(),
                        value: i.to_string(),
                    });
                }
            }
            (PropertyKind::Float { min, max }, FieldValue::Float(f)) => {
                if f.is_nan() || min.is_some_and(|m| *f < m) || max.is_some_and(|m| *f > m) {
                    return Err(ValidationError::OutOfRange {
                        field: self.name.clone(),
                        value: f.to_string(),
                    });
                }
            }
            (PropertyKind::GeoPoint, FieldValue::GeoPoint(point)) if !point.is_valid() => {
                return Err(ValidationError::OutOfRange {
                    field: self.name.clone(),
                    value: point.to_string(),
                });
            }
            _ => {}
        }

        Ok(value)
    }

    /// Validates a query operand for `operator`, returning it coerced.
    ///
    /// IN expects a list of property values, geo comparisons expect a
    /// distance bound, every other operator a single property value.
    pub fn validate_operand(
        &self,
        operator: Operator,
        value: &FieldValue,
    ) -> ValidationResult<FieldValue> {
        match (operator, &self.kind, value) {
            (Operator::In, _, FieldValue::List(items)) if items.is_empty() => {
                Err(self.mismatch("non-empty list", value))
            }
            (Operator::In, _, FieldValue::List(items)) => items
                .iter()
                .map(|item| self.coerce(item))
                .collect::<ValidationResult<Vec<_>>>()
                .map(FieldValue::List),
            (Operator::In, _, other) => Err(self.mismatch("list", other)),
            (_, PropertyKind::GeoPoint, FieldValue::Distance(d)) => {
                if d.center.is_valid() && d.meters >= 0.0 {
                    Ok(value.clone())
                } else {
                    Err(ValidationError::OutOfRange {
                        field: self.name.clone(),
                        value: value.to_string(),
                    })
                }
            }
            (_, PropertyKind::GeoPoint, other) => Err(self.mismatch("distance", other)),
            _ => self.coerce(value),
        }
    }

    /// Type-checks a single value, widening integers for float properties.
    fn coerce(&self, value: &FieldValue) -> ValidationResult<FieldValue> {
        match (&self.kind, value) {
            (PropertyKind::Text { .. }, FieldValue::Text(_))
            | (PropertyKind::Integer { .. }, FieldValue::Integer(_))
            | (PropertyKind::Float { .. }, FieldValue::Float(_))
            | (PropertyKind::Boolean, FieldValue::Bool(_))
            | (PropertyKind::DateTime, FieldValue::DateTime(_))
            | (PropertyKind::GeoPoint, FieldValue::GeoPoint(_)) => Ok(value.clone()),
            (PropertyKind::Float { .. }, FieldValue::Integer(i)) => {
                Ok(FieldValue::Float(*i as f64))
            }
            (PropertyKind::Reference { kind }, FieldValue::Reference(key)) => match kind {
                Some(expected) if key.kind() != expected => {
                    Err(self.mismatch(&format!("reference to {}", expected), value))
                }
                _ => Ok(value.clone()),
            },
            _ => Err(self.mismatch(self.kind.type_name(), value)),
        }
    }

    fn mismatch(&self, expected: &str, actual: &FieldValue) -> ValidationError {
        ValidationError::TypeMismatch {
            field: self.name.clone(),
            expected: expected.to_string(),
            actual: actual.type_name().to_string(),
        }
    }

    fn compare(self: &Arc<Self>, operator: Operator, operand: Operand) -> QueryResult<Node> {
        Comparison::new(Arc::clone(self), operator, operand).map(Node::Comparison)
    }

    /// Builds `self = operand`.
    pub fn eq(self: &Arc<Self>, operand: impl Into<Operand>) -> QueryResult<Node> {
        self.compare(Operator::Eq, operand.into())
    }

    /// Builds `self != operand`.
    pub fn ne(self: &Arc<Self>, operand: impl Into<Operand>) -> QueryResult<Node> {
        self.compare(Operator::Ne, operand.into())
    }

    /// Builds `self < operand`.
    pub fn lt(self: &Arc<Self>, operand: impl Into<Operand>) -> QueryResult<Node> {
        self.compare(Operator::Lt, operand.into())
    }

    /// Builds `self <= operand`.
    pub fn le(self: &Arc<Self>, operand: impl Into<Operand>) -> QueryResult<Node> {
        self.compare(Operator::Le, operand.into())
    }

    /// Builds `self > operand`.
    pub fn gt(self: &Arc<Self>, operand: impl Into<Operand>) -> QueryResult<Node> {
        self.compare(Operator::Gt, operand.into())
    }

    /// Builds `self >= operand`.
    pub fn ge(self: &Arc<Self>, operand: impl Into<Operand>) -> QueryResult<Node> {
        self.compare(Operator::Ge, operand.into())
    }

    /// Builds `self IN operand`.
    pub fn is_in(self: &Arc<Self>, operand: impl Into<Operand>) -> QueryResult<Node> {
        self.compare(Operator::In, operand.into())
    }

    /// Builds `distance(self, center) < meters` for geo-point properties.
    pub fn within(
        self: &Arc<Self>,
        center: crate::types::GeoPoint,
        meters: f64,
    ) -> QueryResult<Node> {
        self.lt(FieldValue::Distance(crate::types::Distance::new(center, meters)))
    }
}

impl fmt::Display for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.kind.type_name())
    }
}

/// Builder for [`PropertyDescriptor`].
#[derive(Debug, Clone)]
pub struct PropertyBuilder {
    descriptor: PropertyDescriptor,
}

impl PropertyBuilder {
    fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            descriptor: PropertyDescriptor {
                name: name.into(),
                kind,
                required: false,
                default: None,
                choices: None,
                destination: StorageDestination::default(),
                search_fallback: true,
            },
        }
    }

    /// Requires a value on save.
    pub fn required(mut self) -> Self {
        self.descriptor.required = true;
        self
    }

    /// Sets the value assigned to new model instances.
    pub fn default(mut self, value: impl Into<FieldValue>) -> Self {
        self.descriptor.default = Some(value.into());
        self
    }

    /// Restricts values to a fixed set.
    pub fn choices<V: Into<FieldValue>>(mut self, choices: impl IntoIterator<Item = V>) -> Self {
        self.descriptor.choices = Some(choices.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the storage destination.
    pub fn destination(mut self, destination: StorageDestination) -> Self {
        self.descriptor.destination = destination;
        self
    }

    /// Forbids serving comparisons on this property from the search index.
    pub fn without_search_fallback(mut self) -> Self {
        self.descriptor.search_fallback = false;
        self
    }

    /// Sets the minimum text length.
    pub fn min_len(mut self, min: usize) -> Self {
        if let PropertyKind::Text { min_len, .. } = &mut self.descriptor.kind {
            *min_len = Some(min);
        }
        self
    }

    /// Sets the maximum text length.
    pub fn max_len(mut self, max: usize) -> Self {
        if let PropertyKind::Text { max_len, .. } = &mut self.descriptor.kind {
            *max_len = Some(max);
        }
        self
    }

    /// Removes the maximum text length.
    pub fn unbounded(mut self) -> Self {
        if let PropertyKind::Text { max_len, .. } = &mut self.descriptor.kind {
            *max_len = None;
        }
        self
    }

    /// Restricts text to the given characters.
    pub fn characters(mut self, allowed: &str) -> Self {
        if let PropertyKind::Text { characters, .. } = &mut self.descriptor.kind {
            *characters = Some(allowed.chars().collect());
        }
        self
    }

    /// Sets inclusive integer bounds.
    pub fn int_range(mut self, lower: Option<i64>, upper: Option<i64>) -> Self {
        if let PropertyKind::Integer { min, max } = &mut self.descriptor.kind {
            *min = lower;
            *max = upper;
        }
        self
    }

    /// Sets inclusive float bounds.
    pub fn float_range(mut self, lower: Option<f64>, upper: Option<f64>) -> Self {
        if let PropertyKind::Float { min, max } = &mut self.descriptor.kind {
            *min = lower;
            *max = upper;
        }
        self
    }

    /// Validates the declaration and returns the shared descriptor.
    pub fn build(self) -> Result<Arc<PropertyDescriptor>, SchemaError> {
        let descriptor = self.descriptor;
        let invalid = |message: &str| SchemaError::InvalidProperty {
            property: descriptor.name.clone(),
            message: message.to_string(),
        };

        if descriptor.name.is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if descriptor.required && descriptor.default.is_some() {
            return Err(invalid("a required property cannot have a default"));
        }
        match &descriptor.kind {
            PropertyKind::Text {
                min_len: Some(min),
                max_len: Some(max),
                ..
            } if min > max => return Err(invalid("min_len exceeds max_len")),
            PropertyKind::Integer {
                min: Some(min),
                max: Some(max),
            } if min > max => return Err(invalid("min exceeds max")),
            PropertyKind::Float {
                min: Some(min),
                max: Some(max),
            } if min > max => return Err(invalid("min exceeds max")),
            _ => {}
        }
        if let Some(ref default) = descriptor.default {
            descriptor
                .validate(default)
                .map_err(|e| invalid(&format!("default is invalid: {}", e)))?;
        }

        Ok(Arc::new(descriptor))
    }
}

/// Raised when a comparison uses an operator outside the allowed set.
pub(crate) fn unsupported_operator(
    property: &PropertyDescriptor,
    operator: Operator,
) -> QueryError {
    QueryError::InvalidComparisonOperator {
        property: property.name().to_string(),
        operator,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Param;
    use crate::types::{Distance, GeoPoint};

    #[test]
    fn test_text_eligibility_follows_max_len() {
        let short = PropertyDescriptor::text("a").max_len(50).build().unwrap();
        let default = PropertyDescriptor::text("b").build().unwrap();
        let long = PropertyDescriptor::text("c").max_len(1000).build().unwrap();
        let unbounded = PropertyDescriptor::text("d").unbounded().build().unwrap();

        assert!(short.is_primary_eligible(Operator::Eq, None));
        assert!(default.is_primary_eligible(Operator::Eq, None));
        assert!(!long.is_primary_eligible(Operator::Eq, None));
        assert!(!unbounded.is_primary_eligible(Operator::Eq, None));
    }

    #[test]
    fn test_geo_never_primary_eligible() {
        let location = PropertyDescriptor::geo_point("location").build().unwrap();
        for op in location.allowed_operators() {
            assert!(!location.is_primary_eligible(*op, None));
            assert!(location.is_search_eligible(*op));
        }
        assert!(!location.allows(Operator::Eq));
    }

    #[test]
    fn test_search_only_destination_not_primary_eligible() {
        let tag = PropertyDescriptor::text("tag")
            .max_len(20)
            .destination(StorageDestination::Search)
            .build()
            .unwrap();
        assert!(!tag.is_primary_eligible(Operator::Eq, None));
        assert!(tag.is_search_eligible(Operator::Eq));
    }

    #[test]
    fn test_reference_eligible_for_equality_only() {
        let owner = PropertyDescriptor::reference("owner", "User").build().unwrap();
        assert!(owner.is_primary_eligible(Operator::Eq, None));
        assert!(!owner.is_primary_eligible(Operator::Ne, None));
        assert!(!owner.is_primary_eligible(Operator::In, None));
    }

    #[test]
    fn test_in_list_size_limits_eligibility() {
        let age = PropertyDescriptor::integer("age").build().unwrap();
        let small = FieldValue::from(vec![1, 2, 3]);
        let large = FieldValue::from((0..31).collect::<Vec<i64>>());
        assert!(age.is_primary_eligible(Operator::In, Some(&small)));
        assert!(!age.is_primary_eligible(Operator::In, Some(&large)));
        assert!(age.is_primary_eligible_within(Operator::In, Some(&large), 50));
    }

    #[test]
    fn test_disallowed_operator_fails_at_construction() {
        let username = PropertyDescriptor::text("username").build().unwrap();
        let err = username.lt(Param::positional()).unwrap_err();
        assert_eq!(
            err,
            QueryError::InvalidComparisonOperator {
                property: "username".to_string(),
                operator: Operator::Lt,
            }
        );
        assert!(username.eq("alice").is_ok());
    }

    #[test]
    fn test_validate_required_and_choices() {
        let role = PropertyDescriptor::text("role")
            .required()
            .choices(["admin", "member"])
            .build()
            .unwrap();
        assert!(matches!(
            role.validate(&FieldValue::Null),
            Err(ValidationError::MissingRequiredField { .. })
        ));
        assert!(matches!(
            role.validate(&"guest".into()),
            Err(ValidationError::NotInChoices { .. })
        ));
        assert_eq!(role.validate(&"admin".into()).unwrap(), "admin".into());
    }

    #[test]
    fn test_validate_text_constraints() {
        let code = PropertyDescriptor::text("code")
            .min_len(2)
            .max_len(4)
            .characters("ABC")
            .build()
            .unwrap();
        assert!(matches!(
            code.validate(&"A".into()),
            Err(ValidationError::LengthOutOfRange { length: 1, .. })
        ));
        assert!(matches!(
            code.validate(&"ABD".into()),
            Err(ValidationError::InvalidCharacters { .. })
        ));
        assert!(code.validate(&"ABCA".into()).is_ok());
    }

    #[test]
    fn test_validate_numeric_range_and_coercion() {
        let age = PropertyDescriptor::integer("age")
            .int_range(Some(0), Some(150))
            .build()
            .unwrap();
        assert!(matches!(
            age.validate(&FieldValue::Integer(200)),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(matches!(
            age.validate(&"12".into()),
            Err(ValidationError::TypeMismatch { .. })
        ));

        let score = PropertyDescriptor::float("score").build().unwrap();
        assert_eq!(
            score.validate(&FieldValue::Integer(3)).unwrap(),
            FieldValue::Float(3.0)
        );
    }

    #[test]
    fn test_search_encoding_roundtrips_through_decode() {
        let active = PropertyDescriptor::boolean("active").build().unwrap();
        let age = PropertyDescriptor::integer("age").build().unwrap();
        let owner = PropertyDescriptor::reference("owner", "User").build().unwrap();

        let key = EntityKey::new("User", "u1");
        for (prop, value) in [
            (&active, FieldValue::Bool(true)),
            (&owner, FieldValue::Reference(key)),
        ] {
            let encoded = prop.encode_for_search(&value);
            assert_ne!(encoded, value);
            assert_eq!(prop.decode(&encoded).unwrap(), value);
            assert_eq!(prop.decode(&prop.encode_for_primary(&value)).unwrap(), value);
        }

        // Whole-number floats written by older documents still decode.
        assert_eq!(age.decode(&FieldValue::Float(42.0)).unwrap(), FieldValue::Integer(42));
    }

    #[test]
    fn test_search_encoding_keeps_large_integers_exact() {
        let big = PropertyDescriptor::integer("big").build().unwrap();
        let value = FieldValue::Integer(9_007_199_254_740_993);
        let encoded = big.encode_for_search(&value);
        assert_eq!(encoded, value);
        assert_eq!(big.decode(&encoded).unwrap(), value);

        let score = PropertyDescriptor::float("score").build().unwrap();
        assert_eq!(
            score.encode_for_search(&FieldValue::Integer(3)),
            FieldValue::Float(3.0)
        );
    }

    #[test]
    fn test_decode_rejects_wrong_type() {
        let age = PropertyDescriptor::integer("age").build().unwrap();
        assert!(matches!(
            age.decode(&FieldValue::Float(1.5)),
            Err(ValidationError::DecodeFailed { .. })
        ));
    }

    #[test]
    fn test_validate_operand_shapes() {
        let age = PropertyDescriptor::integer("age").build().unwrap();
        assert!(age.validate_operand(Operator::In, &FieldValue::Integer(1)).is_err());
        assert!(
            age.validate_operand(Operator::In, &FieldValue::from(vec![1, 2]))
                .is_ok()
        );

        let location = PropertyDescriptor::geo_point("location").build().unwrap();
        let near = FieldValue::Distance(Distance::new(GeoPoint::new(1.0, 2.0), 500.0));
        assert!(location.validate_operand(Operator::Lt, &near).is_ok());
        assert!(
            location
                .validate_operand(Operator::Lt, &FieldValue::Integer(5))
                .is_err()
        );
    }

    #[test]
    fn test_builder_rejects_required_with_default() {
        let err = PropertyDescriptor::integer("age")
            .required()
            .default(1)
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidProperty { .. }));
    }

    #[test]
    fn test_destination_widening() {
        assert_eq!(
            StorageDestination::Primary.with_search(),
            StorageDestination::Both
        );
        assert_eq!(
            StorageDestination::Search.with_search(),
            StorageDestination::Search
        );
        assert!(StorageDestination::Both.includes_primary());
        assert!(!StorageDestination::Search.includes_primary());
    }
}
