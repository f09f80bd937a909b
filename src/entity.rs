//! Entity references and their mapping to remote file names
//!
//! Every application record that carries translatable attributes owns exactly
//! one remote file. The file is never addressed by path: its name is derived
//! from the entity type and id alone, so creating, updating and deleting always
//! land on the same remote file whatever revision is being uploaded.
//!
//! # Example
//!
//! ```
//! use tms_sync::entity::EntityRef;
//!
//! let entity = EntityRef::new("Blog::Post", "42");
//! assert_eq!(entity.base_name(), "Blog_Post-42");
//! assert_eq!(entity.file_name(), "Blog_Post-42.json");
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Extension of every uploaded source file
pub const FILE_EXTENSION: &str = "json";

/// Modification timestamp used to order snapshots of an entity's attributes
pub type Revision = i64;

/// Identifies an application-side record
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Qualified type name, e.g. `Blog::Post`
    pub entity_type: String,
    pub entity_id: String,
}

impl EntityRef {
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }

    /// Remote file name without extension, used for lookups
    pub fn base_name(&self) -> String {
        format!("{}-{}", sanitize_type(&self.entity_type), self.entity_id)
    }

    /// Remote file name used when creating the file
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.base_name(), FILE_EXTENSION)
    }

    /// Key used when reporting per-entity failures
    pub fn key(&self) -> String {
        format!("{} {}", self.entity_type, self.entity_id)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.entity_type, self.entity_id)
    }
}

/// Module separators are not allowed in remote file names
fn sanitize_type(entity_type: &str) -> String {
    entity_type.replace("::", "_")
}

/// Strip the extension from a remote file name
///
/// `Post-1.json` → `Post-1`. Names without an extension are returned as-is.
pub fn file_stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// Current state of an application record, as read from storage
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Last-modified time; `None` for records that do not track modification
    pub revision: Option<Revision>,
    /// Source-locale attribute values
    pub attributes: BTreeMap<String, String>,
}

impl EntityRecord {
    pub fn new(revision: Option<Revision>) -> Self {
        Self {
            revision,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }
}
