//! Application storage as seen by the sync engines
//!
//! The engines never touch the application's database directly. They read
//! source values, write translations under a locale and look for existing
//! translations through [`TranslationStore`]. [`MemoryStore`] keeps everything
//! in memory and backs the tests and dry runs.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::content::AttributeMap;
use crate::entity::{EntityRecord, EntityRef, Revision};
use crate::error::{SyncError, SyncResult};

/// An existing translation that could be reused for an identical source value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateTranslation {
    /// Entity the translation belongs to
    pub entity: EntityRef,
    pub locale: String,
    pub value: String,
    /// When the translation was last written
    pub translated_at: i64,
    /// Modification time of the owning entity, if it tracks one
    pub source_modified_at: Option<Revision>,
}

/// Storage collaborator of the sync engines
///
/// Implementations raise [`SyncError::Storage`] or
/// [`SyncError::EntityNotFound`] on failure.
#[async_trait]
pub trait TranslationStore: Send + Sync {
    /// Current revision and source-locale attributes of an entity
    async fn load_entity(&self, entity: &EntityRef) -> SyncResult<Option<EntityRecord>>;

    /// Write translated attributes of an entity under a locale
    async fn apply_translations(
        &self,
        entity: &EntityRef,
        locale: &str,
        attributes: &AttributeMap,
    ) -> SyncResult<()>;

    /// Translations of `attribute` held by other entities of the same type
    /// whose current source value equals `value`
    async fn find_duplicate_translations(
        &self,
        entity: &EntityRef,
        attribute: &str,
        value: &str,
    ) -> SyncResult<Vec<CandidateTranslation>>;

    /// Entities of a type whose current source value of `attribute` equals `value`
    async fn entities_with_value(
        &self,
        entity_type: &str,
        attribute: &str,
        value: &str,
    ) -> SyncResult<Vec<EntityRef>>;
}

#[derive(Debug, Clone)]
struct StoredTranslation {
    value: String,
    translated_at: i64,
}

#[derive(Debug, Clone, Default)]
struct StoredEntity {
    record: EntityRecord,
    /// locale → attribute → translation
    translations: BTreeMap<String, BTreeMap<String, StoredTranslation>>,
}

#[derive(Debug, Default)]
struct StoreState {
    entities: BTreeMap<EntityRef, StoredEntity>,
    failing_writes: BTreeSet<EntityRef>,
    failing_queries: bool,
    /// Fixed write timestamp; wall clock when `None`
    clock: Option<i64>,
}

/// In-memory [`TranslationStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or replace an entity
    pub fn insert(&self, entity: EntityRef, record: EntityRecord) {
        self.state().entities.entry(entity).or_default().record = record;
    }

    /// Store a translation with an explicit timestamp
    ///
    /// Unknown entities are ignored.
    pub fn insert_translation(
        &self,
        entity: &EntityRef,
        locale: &str,
        attribute: &str,
        value: &str,
        translated_at: i64,
    ) {
        if let Some(stored) = self.state().entities.get_mut(entity) {
            stored
                .translations
                .entry(locale.to_string())
                .or_default()
                .insert(
                    attribute.to_string(),
                    StoredTranslation {
                        value: value.to_string(),
                        translated_at,
                    },
                );
        }
    }

    /// Translated value of an attribute
    pub fn translation(&self, entity: &EntityRef, locale: &str, attribute: &str) -> Option<String> {
        self.state()
            .entities
            .get(entity)?
            .translations
            .get(locale)?
            .get(attribute)
            .map(|t| t.value.clone())
    }

    /// Every translated attribute of an entity under a locale
    pub fn translations(&self, entity: &EntityRef, locale: &str) -> AttributeMap {
        self.state()
            .entities
            .get(entity)
            .and_then(|stored| stored.translations.get(locale))
            .map(|by_attribute| {
                by_attribute
                    .iter()
                    .map(|(name, t)| (name.clone(), t.value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Use a fixed timestamp for translation writes
    pub fn set_clock(&self, now: i64) {
        self.state().clock = Some(now);
    }

    /// Make writes for an entity fail
    pub fn fail_writes_for(&self, entity: EntityRef) {
        self.state().failing_writes.insert(entity);
    }

    /// Make duplicate and value queries fail
    pub fn fail_queries(&self) {
        self.state().failing_queries = true;
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[async_trait]
impl TranslationStore for MemoryStore {
    async fn load_entity(&self, entity: &EntityRef) -> SyncResult<Option<EntityRecord>> {
        Ok(self
            .state()
            .entities
            .get(entity)
            .map(|stored| stored.record.clone()))
    }

    async fn apply_translations(
        &self,
        entity: &EntityRef,
        locale: &str,
        attributes: &AttributeMap,
    ) -> SyncResult<()> {
        let mut state = self.state();
        if state.failing_writes.contains(entity) {
            return Err(SyncError::Storage(format!("write rejected for {}", entity)));
        }
        let now = state.clock.unwrap_or_else(unix_now);
        let stored = state
            .entities
            .get_mut(entity)
            .ok_or_else(|| SyncError::EntityNotFound(entity.clone()))?;

        let by_attribute = stored.translations.entry(locale.to_string()).or_default();
        for (name, value) in attributes {
            by_attribute.insert(
                name.clone(),
                StoredTranslation {
                    value: value.clone(),
                    translated_at: now,
                },
            );
        }
        Ok(())
    }

    async fn find_duplicate_translations(
        &self,
        entity: &EntityRef,
        attribute: &str,
        value: &str,
    ) -> SyncResult<Vec<CandidateTranslation>> {
        let state = self.state();
        if state.failing_queries {
            return Err(SyncError::Storage("duplicate query failed".to_string()));
        }

        let mut candidates = Vec::new();
        for (other, stored) in &state.entities {
            if other == entity
                || other.entity_type != entity.entity_type
                || stored.record.attributes.get(attribute).map(String::as_str) != Some(value)
            {
                continue;
            }
            for (locale, by_attribute) in &stored.translations {
                if let Some(translation) = by_attribute.get(attribute) {
                    candidates.push(CandidateTranslation {
                        entity: other.clone(),
                        locale: locale.clone(),
                        value: translation.value.clone(),
                        translated_at: translation.translated_at,
                        source_modified_at: stored.record.revision,
                    });
                }
            }
        }
        Ok(candidates)
    }

    async fn entities_with_value(
        &self,
        entity_type: &str,
        attribute: &str,
        value: &str,
    ) -> SyncResult<Vec<EntityRef>> {
        let state = self.state();
        if state.failing_queries {
            return Err(SyncError::Storage("value query failed".to_string()));
        }
        Ok(state
            .entities
            .iter()
            .filter(|(entity, stored)| {
                entity.entity_type == entity_type
                    && stored.record.attributes.get(attribute).map(String::as_str) == Some(value)
            })
            .map(|(entity, _)| entity.clone())
            .collect())
    }
}
