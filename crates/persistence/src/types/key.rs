//! Entity identity.
//!
//! A hybrid entity has two identifiers: the search index assigns a
//! [`DocumentId`] on first write, and the primary store key is derived from it.
//! The mapping is fixed and reversible, so either identifier reconstructs the
//! other:
//!
//! ```
//! use hybrid_persistence::types::{DocumentId, EntityKey};
//!
//! let doc_id = DocumentId::new("a1b2c3");
//! let key = EntityKey::from_document_id("User", &doc_id);
//!
//! assert_eq!(key.to_string(), "User/a1b2c3");
//! assert_eq!(key.document_id(), doc_id);
//! ```

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

/// Identifier assigned by the search index to a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Wraps a backend-assigned id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key of a record in the primary store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    kind: String,
    id: String,
}

impl EntityKey {
    /// Creates a key from its parts.
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Derives the primary key of an entity from its search document id.
    pub fn from_document_id(kind: impl Into<String>, document_id: &DocumentId) -> Self {
        Self::new(kind, document_id.as_str())
    }

    /// Returns the search document id this key was derived from.
    pub fn document_id(&self) -> DocumentId {
        DocumentId::new(self.id.clone())
    }

    /// Returns the entity kind.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns the id part of the key.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Encodes the key as an opaque url-safe token.
    ///
    /// Used where a key must be stored as an atom, e.g. reference fields in
    /// search documents.
    pub fn to_urlsafe(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.to_string())
    }

    /// Decodes a token produced by [`EntityKey::to_urlsafe`].
    pub fn from_urlsafe(token: &str) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(token).ok()?;
        let text = String::from_utf8(bytes).ok()?;
        let (kind, id) = text.split_once('/')?;
        if kind.is_empty() || id.is_empty() {
            return None;
        }
        Some(Self::new(kind, id))
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}
