//! Error types for the hybrid persistence layer.
//!
//! Errors are grouped by the stage that raises them: query composition and
//! binding, property validation, schema registration, entity state, and the
//! backends themselves. Backend errors are produced by the backend clients and
//! propagated unchanged; this layer never retries or translates them.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

use crate::query::Operator;

/// The top-level error type for all hybrid persistence operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Query composition, analysis and parameter binding errors
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Field value validation errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Schema registration errors
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Entity state errors
    #[error(transparent)]
    Entity(#[from] EntityError),

    /// Backend errors, propagated as produced by the client
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Errors raised while building, binding or planning a query.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// The operator is not in the property's allowed set.
    #[error("operator {operator} not supported for property '{property}'")]
    InvalidComparisonOperator { property: String, operator: Operator },

    /// Neither backend can satisfy the predicate tree.
    #[error("query '{query}' has no satisfiable backend: {reason}")]
    IllegalQueryComposition { query: String, reason: String },

    /// A deferred parameter found no positional argument, keyword or default.
    #[error("query parameter not found: {parameter}")]
    QueryParameterUnresolved { parameter: String },

    /// The query was invoked before being registered on a model.
    #[error("query '{query}' cannot execute before it is registered on a model")]
    UnboundQuery { query: String },

    /// No query with this name is registered on the model.
    #[error("unknown query '{query}' on model '{kind}'")]
    UnknownQuery { kind: String, query: String },

    /// AND/OR with no children.
    #[error("{operator} requires at least one child node")]
    EmptyLogicalOperator { operator: String },

    /// A literal or bound argument does not fit the compared property.
    #[error("invalid operand: {0}")]
    InvalidOperand(#[from] ValidationError),
}

/// Field validation failures, detected before any backend write.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A required field has no value.
    #[error("missing required field: {field}")]
    MissingRequiredField { field: String },

    /// The value's type does not match the property.
    #[error("field '{field}' expects {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    /// A numeric value is outside the declared bounds.
    #[error("field '{field}' value {value} is out of range")]
    OutOfRange { field: String, value: String },

    /// A text value is shorter or longer than allowed.
    #[error("field '{field}' length {length} is outside {min}..={max}")]
    LengthOutOfRange {
        field: String,
        length: usize,
        min: usize,
        max: usize,
    },

    /// A text value contains characters outside the declared set.
    #[error("field '{field}' contains characters not permitted: {invalid}")]
    InvalidCharacters { field: String, invalid: String },

    /// The value is not one of the declared choices.
    #[error("field '{field}' value {value} is not one of the allowed choices")]
    NotInChoices { field: String, value: String },

    /// The field is not declared on the model.
    #[error("unknown field '{field}' on model '{kind}'")]
    UnknownField { kind: String, field: String },

    /// A stored value could not be decoded into the property's type.
    #[error("cannot decode stored value for field '{field}': {message}")]
    DecodeFailed { field: String, message: String },
}

/// Errors raised while registering a model schema.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// Two properties share a name.
    #[error("duplicate property '{property}' on model '{kind}'")]
    DuplicateProperty { kind: String, property: String },

    /// Two queries share a name.
    #[error("duplicate query '{query}' on model '{kind}'")]
    DuplicateQuery { kind: String, query: String },

    /// A query references a property that is not declared on the model.
    #[error("query '{query}' references property '{property}' not declared on model '{kind}'")]
    UnknownProperty {
        kind: String,
        query: String,
        property: String,
    },

    /// Two schemas share a kind.
    #[error("kind '{kind}' is already registered")]
    DuplicateKind { kind: String },

    /// No schema is registered for the kind.
    #[error("no schema registered for kind '{kind}'")]
    UnknownKind { kind: String },

    /// A property declaration is inconsistent.
    #[error("invalid property '{property}': {message}")]
    InvalidProperty { property: String, message: String },
}

/// Errors related to entity state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EntityError {
    /// The entity has no identifiers yet.
    #[error("entity of kind '{kind}' has not been persisted")]
    NotPersisted { kind: String },

    /// A key of another kind was used for this model.
    #[error("key {key} does not belong to kind '{expected}'")]
    KindMismatch { key: String, expected: String },
}

/// Errors originating from a backend client.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend is currently unavailable.
    #[error("backend unavailable: {backend_name}")]
    Unavailable {
        backend_name: String,
        message: String,
    },

    /// The backend rejected or failed to run a query.
    #[error("query execution failed in {backend_name}: {message}")]
    QueryError {
        backend_name: String,
        message: String,
    },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },

    /// A batch call returned a different number of results than requested.
    #[error("{backend_name} returned {actual} results for a batch of {expected}")]
    BatchMismatch {
        backend_name: String,
        expected: usize,
        actual: usize,
    },
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for query construction.
pub type QueryResult<T> = Result<T, QueryError>;

/// Result type alias for validation.
pub type ValidationResult<T> = Result<T, ValidationError>;

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

impl StorageError {
    /// Returns true for errors raised by this layer before any backend call.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, StorageError::Backend(_))
    }
}
