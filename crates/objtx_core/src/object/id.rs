//! Object identifiers.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Type discriminator of an object (the "class" an identifier belongs to).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(Arc<str>);

impl ClassId {
    /// Creates a class identifier.
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Returns the class name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassId({})", self.0)
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClassId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Unique identifier for an object.
///
/// An object ID combines the class discriminator with a 128-bit storage key.
/// IDs are:
/// - Globally unique
/// - Immutable once assigned
/// - Stable across transactions (the same ID names the same logical object
///   in a root transaction and all of its sub-transactions)
///
/// The textual form is `<class>|<uuid>`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    class_id: ClassId,
    key: Uuid,
}

impl ObjectId {
    /// Creates an object ID from its parts.
    #[must_use]
    pub fn new(class_id: ClassId, key: Uuid) -> Self {
        Self { class_id, key }
    }

    /// Creates a new object ID with a random key.
    #[must_use]
    pub fn generate(class_id: ClassId) -> Self {
        Self::new(class_id, Uuid::new_v4())
    }

    /// Returns the class discriminator.
    #[must_use]
    pub fn class_id(&self) -> &ClassId {
        &self.class_id
    }

    /// Returns the storage key.
    #[inline]
    #[must_use]
    pub fn key(&self) -> Uuid {
        self.key
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({}|{})", self.class_id, self.key)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.class_id, self.key)
    }
}

impl FromStr for ObjectId {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        let (class, key) = s
            .split_once('|')
            .ok_or_else(|| CoreError::invalid_object_id(s, "expected '<class>|<uuid>'"))?;
        if class.is_empty() {
            return Err(CoreError::invalid_object_id(s, "class name is empty"));
        }
        let key = Uuid::parse_str(key)
            .map_err(|e| CoreError::invalid_object_id(s, e.to_string()))?;
        Ok(Self::new(ClassId::new(class), key))
    }
}
