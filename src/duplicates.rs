//! Reuse of existing translations for identical source values
//!
//! Before an entity is uploaded, each of its attributes is looked up among
//! other entities of the same type. When another entity has exactly the same
//! source value and a translation that is not older than that entity's last
//! modification, the translation is copied over directly and the attribute no
//! longer needs to go to the translation service for that locale.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::content::AttributeMap;
use crate::entity::EntityRef;
use crate::storage::{CandidateTranslation, TranslationStore};

/// Result of a duplicate scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DuplicateResolution {
    /// Attributes that still need uploading
    pub remaining: AttributeMap,
    /// Translations copied onto the entity, per locale
    pub applied: BTreeMap<String, AttributeMap>,
}

/// Copies existing translations onto an entity before upload
pub struct DuplicateResolver {
    store: Arc<dyn TranslationStore>,
    target_locales: BTreeSet<String>,
}

impl DuplicateResolver {
    pub fn new(store: Arc<dyn TranslationStore>, target_locales: &[String]) -> Self {
        Self {
            store,
            target_locales: target_locales.iter().cloned().collect(),
        }
    }

    /// Apply duplicate translations and return what is left to upload
    ///
    /// Never fails: a failed lookup or write is logged and the affected
    /// attribute stays in [`DuplicateResolution::remaining`].
    pub async fn resolve(&self, entity: &EntityRef, attributes: &AttributeMap) -> DuplicateResolution {
        let mut by_locale: BTreeMap<String, AttributeMap> = BTreeMap::new();

        for (attribute, value) in attributes {
            let candidates = match self
                .store
                .find_duplicate_translations(entity, attribute, value)
                .await
            {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!(entity = %entity, attribute = %attribute, error = %e, "duplicate lookup failed");
                    continue;
                }
            };

            for (locale, candidate) in self.best_per_locale(candidates) {
                by_locale
                    .entry(locale)
                    .or_default()
                    .insert(attribute.clone(), candidate.value);
            }
        }

        let mut applied = BTreeMap::new();
        let mut covered: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for (locale, translations) in &by_locale {
            match self
                .store
                .apply_translations(entity, locale, translations)
                .await
            {
                Ok(()) => {
                    debug!(entity = %entity, locale = %locale, count = translations.len(), "applied duplicate translations");
                    for attribute in translations.keys() {
                        covered
                            .entry(attribute.as_str())
                            .or_default()
                            .insert(locale.as_str());
                    }
                    applied.insert(locale.clone(), translations.clone());
                }
                Err(e) => {
                    warn!(entity = %entity, locale = %locale, error = %e, "applying duplicate translations failed");
                }
            }
        }

        let remaining = attributes
            .iter()
            .filter(|(attribute, _)| !self.fully_covered(covered.get(attribute.as_str())))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        DuplicateResolution { remaining, applied }
    }

    /// Most recent non-stale candidate for each target locale
    fn best_per_locale(
        &self,
        candidates: Vec<CandidateTranslation>,
    ) -> BTreeMap<String, CandidateTranslation> {
        let mut best: BTreeMap<String, CandidateTranslation> = BTreeMap::new();
        for candidate in candidates {
            if !self.target_locales.contains(&candidate.locale) || is_stale(&candidate) {
                continue;
            }
            let newer = best
                .get(&candidate.locale)
                .map(|current| candidate.translated_at >= current.translated_at)
                .unwrap_or(true);
            if newer {
                best.insert(candidate.locale.clone(), candidate);
            }
        }
        best
    }

    fn fully_covered(&self, locales: Option<&BTreeSet<&str>>) -> bool {
        if self.target_locales.is_empty() {
            return false;
        }
        let Some(locales) = locales else {
            return false;
        };
        self.target_locales
            .iter()
            .all(|locale| locales.contains(locale.as_str()))
    }
}

/// A translation written before its source entity last changed
///
/// The reference time is the modification time of the entity that owns the
/// candidate translation, not of the entity copying it: a translation older
/// than its own source text may no longer match that text.
fn is_stale(candidate: &CandidateTranslation) -> bool {
    candidate
        .source_modified_at
        .map(|modified| candidate.translated_at < modified)
        .unwrap_or(false)
}
