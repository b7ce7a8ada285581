use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::Result;

/// Version number of a stored document, used for optimistic concurrency control.
///
/// A document that was never written is at version 0; every successful
/// write increments the version by one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the initial version (0) for a document that does not exist yet.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the first version (1) for the first write.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// A stored aggregate: its JSON state plus the bookkeeping the store needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Collection the document belongs to (e.g. "carts", "orders").
    pub collection: String,

    /// Identifier, unique within the collection.
    pub id: String,

    /// Owning user, used to list a user's documents.
    pub owner: Option<String>,

    /// Version after the last successful write.
    pub version: Version,

    /// Serialized aggregate state.
    pub state: serde_json::Value,

    /// When the document was first written.
    pub created_at: DateTime<Utc>,

    /// When the document was last written.
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Serializes `state` into a new, not yet persisted document.
    pub fn new<T: Serialize>(
        collection: impl Into<String>,
        id: impl Into<String>,
        state: &T,
    ) -> Result<Self> {
        let now = Utc::now();
        Ok(Self {
            collection: collection.into(),
            id: id.into(),
            owner: None,
            version: Version::initial(),
            state: serde_json::to_value(state)?,
            created_at: now,
            updated_at: now,
        })
    }

    /// Sets the owning user.
    pub fn owned_by(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Deserializes the document state.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.state.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, serde::Deserialize)]
    struct Sample {
        name: String,
        quantity: u32,
    }

    #[test]
    fn test_version_progression() {
        assert_eq!(Version::initial().as_i64(), 0);
        assert_eq!(Version::initial().next(), Version::first());
        assert!(Version::new(3) > Version::first());
    }

    #[test]
    fn test_document_encode_decode() {
        let sample = Sample {
            name: "Paracetamol".to_string(),
            quantity: 2,
        };
        let doc = Document::new("carts", "user-1", &sample)
            .unwrap()
            .owned_by("user-1");

        assert_eq!(doc.collection, "carts");
        assert_eq!(doc.owner.as_deref(), Some("user-1"));
        assert_eq!(doc.version, Version::initial());

        let decoded: Sample = doc.decode().unwrap();
        assert_eq!(decoded, sample);
    }
}
