//! Remote file content: source snapshots and translation results
//!
//! A remote file holds a nested JSON document keyed by entity type and id.
//! For entities with a revision the attributes sit one level deeper, under
//! the revision key:
//!
//! ```json
//! { "Post": { "1": { "1700000000": { "title": "Hello", "body": ["One.", "Two."] } } } }
//! ```
//!
//! Entities without a revision store their attributes directly under the id.
//! Exported translations keep the same shape, possibly with several revision
//! snapshots side by side. [`resolve_translations`] collapses them into a
//! [`Translations`] map where every attribute carries its latest value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entity::{EntityRef, Revision};
use crate::error::{SyncError, SyncResult};
use crate::sentences;

/// Attribute name → value
pub type AttributeMap = BTreeMap<String, String>;

/// Per-attribute upload options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeOptions {
    /// Upload the value as a list of sentences
    #[serde(default)]
    pub split_into_sentences: bool,
}

/// Resolved translations: entity type → entity id → attribute → text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Translations(BTreeMap<String, BTreeMap<String, AttributeMap>>);

impl Translations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add attributes for an entity, merging with what is already there
    pub fn insert(&mut self, entity: &EntityRef, attributes: AttributeMap) {
        self.0
            .entry(entity.entity_type.clone())
            .or_default()
            .entry(entity.entity_id.clone())
            .or_default()
            .extend(attributes);
    }

    pub fn get(&self, entity: &EntityRef) -> Option<&AttributeMap> {
        self.0
            .get(&entity.entity_type)
            .and_then(|by_id| by_id.get(&entity.entity_id))
    }

    /// Merge another result into this one
    pub fn extend(&mut self, other: Translations) {
        for (entity_type, by_id) in other.0 {
            let target = self.0.entry(entity_type).or_default();
            for (entity_id, attributes) in by_id {
                target.entry(entity_id).or_default().extend(attributes);
            }
        }
    }

    /// Iterate over every entity and its attributes
    pub fn iter(&self) -> impl Iterator<Item = (EntityRef, &AttributeMap)> {
        self.0.iter().flat_map(|(entity_type, by_id)| {
            by_id
                .iter()
                .map(move |(entity_id, attributes)| {
                    (EntityRef::new(entity_type.clone(), entity_id.clone()), attributes)
                })
        })
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Build the JSON document uploaded for an entity
///
/// Attributes whose options ask for it are uploaded as sentence arrays; the
/// rest are uploaded as plain strings. The attribute map is wrapped under the
/// revision key only when the entity has a revision.
pub fn build_source_snapshot(
    entity: &EntityRef,
    revision: Option<Revision>,
    attributes: &AttributeMap,
    options: &BTreeMap<String, AttributeOptions>,
) -> Value {
    let mut fields = Map::new();
    for (name, text) in attributes {
        let split = options
            .get(name)
            .map(|o| o.split_into_sentences)
            .unwrap_or(false);
        let value = if split {
            Value::from(sentences::split(text))
        } else {
            Value::String(text.clone())
        };
        fields.insert(name.clone(), value);
    }

    let mut snapshot = Value::Object(fields);
    if let Some(revision) = revision {
        let mut wrapped = Map::new();
        wrapped.insert(revision.to_string(), snapshot);
        snapshot = Value::Object(wrapped);
    }

    let mut by_id = Map::new();
    by_id.insert(entity.entity_id.clone(), snapshot);
    let mut document = Map::new();
    document.insert(entity.entity_type.clone(), Value::Object(by_id));
    Value::Object(document)
}

/// How one entity's content is laid out in a remote file
#[derive(Debug, Clone, PartialEq)]
pub enum EntityContent<'a> {
    /// Snapshots keyed by revision, in the order they appear in the document
    Revisioned(Vec<(Revision, &'a Map<String, Value>)>),
    /// Attributes stored directly under the entity id
    Flat(&'a Map<String, Value>),
}

impl<'a> EntityContent<'a> {
    /// Classify the value stored under an entity id
    ///
    /// Attribute values are strings or arrays, never objects, so an entity
    /// whose values are all objects holds revision snapshots.
    pub fn parse(entity: &EntityRef, value: &'a Value) -> SyncResult<Self> {
        let fields = value.as_object().ok_or_else(|| {
            SyncError::Content(format!("{} is not an object", entity))
        })?;

        let snapshot_count = fields.values().filter(|v| v.is_object()).count();
        if snapshot_count == 0 {
            return Ok(EntityContent::Flat(fields));
        }
        if snapshot_count != fields.len() {
            return Err(SyncError::Content(format!(
                "{} mixes revision snapshots and attributes",
                entity
            )));
        }

        let mut snapshots = Vec::with_capacity(fields.len());
        for (key, snapshot) in fields {
            let revision = key.trim().parse::<Revision>().map_err(|_| {
                SyncError::Content(format!("{} has non-numeric revision key '{}'", entity, key))
            })?;
            if let Value::Object(attributes) = snapshot {
                snapshots.push((revision, attributes));
            }
        }
        Ok(EntityContent::Revisioned(snapshots))
    }

    /// Highest stored revision, if any
    pub fn max_revision(&self) -> Option<Revision> {
        match self {
            EntityContent::Revisioned(snapshots) => snapshots.iter().map(|(r, _)| *r).max(),
            EntityContent::Flat(_) => None,
        }
    }

    /// Collapse into one attribute map, latest revision winning per attribute
    ///
    /// Snapshots are visited in ascending revision order and later values
    /// overwrite earlier ones, so equal revisions resolve to the one seen last.
    /// Each attribute is resolved independently: an attribute missing from the
    /// newest snapshot keeps its value from an older one.
    pub fn resolve(&self) -> AttributeMap {
        let mut resolved = AttributeMap::new();
        match self {
            EntityContent::Flat(fields) => merge_fields(&mut resolved, fields),
            EntityContent::Revisioned(snapshots) => {
                let mut ordered: Vec<&(Revision, &Map<String, Value>)> = snapshots.iter().collect();
                ordered.sort_by_key(|(revision, _)| *revision);
                for (_, fields) in ordered {
                    merge_fields(&mut resolved, fields);
                }
            }
        }
        resolved
    }
}

fn merge_fields(resolved: &mut AttributeMap, fields: &Map<String, Value>) {
    for (name, value) in fields {
        if let Some(text) = sentences::join_value(value) {
            resolved.insert(name.clone(), text);
        }
    }
}

/// Find an entity's content inside a remote document
pub fn entity_content<'a>(document: &'a Value, entity: &EntityRef) -> Option<&'a Value> {
    document.get(&entity.entity_type)?.get(&entity.entity_id)
}

/// Resolve an exported document into translations
pub fn resolve_translations(document: &Value) -> SyncResult<Translations> {
    let by_type = document
        .as_object()
        .ok_or_else(|| SyncError::Content("document root is not an object".to_string()))?;

    let mut translations = Translations::new();
    for (entity_type, by_id) in by_type {
        let by_id = by_id.as_object().ok_or_else(|| {
            SyncError::Content(format!("entries for {} are not an object", entity_type))
        })?;
        for (entity_id, value) in by_id {
            let entity = EntityRef::new(entity_type.clone(), entity_id.clone());
            let content = EntityContent::parse(&entity, value)?;
            translations.insert(&entity, content.resolve());
        }
    }
    Ok(translations)
}
