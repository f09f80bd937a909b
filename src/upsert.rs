//! Single translation upsert
//!
//! Used when the translation service reports that one string was approved.
//! The translation and its source string are fetched by id, the entity is
//! recovered from the source string's context and the translation is written
//! without waiting for the next full sync pass.

use std::sync::Arc;

use tracing::{info, warn};

use crate::content::{AttributeMap, Translations};
use crate::entity::{EntityRef, Revision};
use crate::error::{FilesError, SyncError, SyncResult};
use crate::failures::FailureCollector;
use crate::provider::TranslationProvider;
use crate::storage::TranslationStore;

const CONTEXT_SEPARATOR: &str = " -> ";

/// Entity coordinates carried in a source string's context
///
/// The context has the form `Type -> id -> revision -> attribute`; the
/// revision is absent for entities that do not track one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextCoordinates {
    pub entity: EntityRef,
    pub revision: Option<Revision>,
    pub attribute: String,
}

impl ContextCoordinates {
    pub fn parse(context: &str) -> SyncResult<Self> {
        let parts: Vec<&str> = context.trim().split(CONTEXT_SEPARATOR).map(str::trim).collect();
        let malformed = || SyncError::Content(format!("unexpected string context '{}'", context));

        let (entity_type, entity_id, attribute) = match parts.as_slice() {
            [entity_type, entity_id, .., attribute] => (*entity_type, *entity_id, *attribute),
            _ => return Err(malformed()),
        };
        if entity_type.is_empty() || entity_id.is_empty() || attribute.is_empty() {
            return Err(malformed());
        }

        let revision = if parts.len() >= 4 {
            parts[2].parse::<Revision>().ok()
        } else {
            None
        };

        Ok(Self {
            entity: EntityRef::new(entity_type, entity_id),
            revision,
            attribute: attribute.to_string(),
        })
    }
}

/// A translation unit resolved to the entity attribute it translates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTranslation {
    pub coordinates: ContextCoordinates,
    /// One-attribute result holding the source text
    pub source_text: Translations,
    /// One-attribute result holding the translated text
    pub translation: Translations,
}

impl ResolvedTranslation {
    fn attribute_value<'a>(&self, translations: &'a Translations) -> Option<&'a str> {
        translations
            .get(&self.coordinates.entity)?
            .get(&self.coordinates.attribute)
            .map(String::as_str)
    }

    pub fn source_value(&self) -> Option<&str> {
        self.attribute_value(&self.source_text)
    }

    pub fn translated_value(&self) -> Option<&str> {
        self.attribute_value(&self.translation)
    }
}

/// Outcome of an upsert
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertReport {
    /// Entities that received the translation
    pub written: Vec<EntityRef>,
    pub failures: Option<FilesError>,
}

/// Resolves and writes single translations
pub struct TranslationUpserter {
    provider: Arc<dyn TranslationProvider>,
    store: Arc<dyn TranslationStore>,
}

impl TranslationUpserter {
    pub fn new(provider: Arc<dyn TranslationProvider>, store: Arc<dyn TranslationStore>) -> Self {
        Self { provider, store }
    }

    /// Fetch a translation and its source string and locate the entity
    ///
    /// # Errors
    ///
    /// [`SyncError::Argument`] when either id is missing, the provider's
    /// error when a fetch fails, [`SyncError::Content`] for an unreadable
    /// context.
    pub async fn resolve(
        &self,
        translation_id: Option<&str>,
        source_string_id: Option<&str>,
    ) -> SyncResult<ResolvedTranslation> {
        let (Some(translation_id), Some(source_string_id)) = (
            translation_id.filter(|id| !id.is_empty()),
            source_string_id.filter(|id| !id.is_empty()),
        ) else {
            return Err(SyncError::Argument(
                "translation_id and/or source_string_id params not present".to_string(),
            ));
        };

        let (source, unit) = self
            .provider
            .resolve_source_string_and_translation(translation_id, source_string_id)
            .await?;
        let coordinates = ContextCoordinates::parse(&source.context)?;

        Ok(ResolvedTranslation {
            source_text: single(&coordinates, source.text),
            translation: single(&coordinates, unit.text),
            coordinates,
        })
    }

    /// Resolve a translation and write it under `locale`
    ///
    /// The translation goes to every entity of the type whose current source
    /// value still equals the translated source text. An entity edited since
    /// the string was uploaded is left alone.
    pub async fn upsert(
        &self,
        locale: &str,
        translation_id: Option<&str>,
        source_string_id: Option<&str>,
    ) -> SyncResult<UpsertReport> {
        let resolved = self.resolve(translation_id, source_string_id).await?;
        let coordinates = &resolved.coordinates;
        let (Some(source_text), Some(translated)) =
            (resolved.source_value(), resolved.translated_value())
        else {
            return Ok(UpsertReport::default());
        };

        let entities = self
            .store
            .entities_with_value(&coordinates.entity.entity_type, &coordinates.attribute, source_text)
            .await?;

        let mut attributes = AttributeMap::new();
        attributes.insert(coordinates.attribute.clone(), translated.to_string());

        let mut report = UpsertReport::default();
        let mut failures = FailureCollector::new();
        for entity in entities {
            match self.store.apply_translations(&entity, locale, &attributes).await {
                Ok(()) => report.written.push(entity),
                Err(e) => {
                    warn!(entity = %entity, locale = %locale, error = %e, "upsert write failed");
                    failures.record(entity.key(), e);
                }
            }
        }

        info!(
            entity_type = %coordinates.entity.entity_type,
            attribute = %coordinates.attribute,
            locale = %locale,
            written = report.written.len(),
            "upserted translation"
        );
        report.failures = failures.into_error();
        Ok(report)
    }
}

fn single(coordinates: &ContextCoordinates, text: String) -> Translations {
    let mut attributes = AttributeMap::new();
    attributes.insert(coordinates.attribute.clone(), text);
    let mut translations = Translations::new();
    translations.insert(&coordinates.entity, attributes);
    translations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRecord;
    use crate::error::ProviderError;
    use crate::provider::{MockProvider, Operation};
    use crate::storage::MemoryStore;

    fn setup() -> (Arc<MockProvider>, Arc<MemoryStore>, TranslationUpserter) {
        let mock = Arc::new(MockProvider::new());
        let store = Arc::new(MemoryStore::new());
        mock.add_source_string("222", "source text", "Model -> 123 -> 1111 -> field");
        mock.add_translation_unit("333", "dummy translation");
        let upserter = TranslationUpserter::new(mock.clone(), store.clone());
        (mock, store, upserter)
    }

    // ========== Context Tests ==========

    #[test]
    fn test_parse_context_with_revision() {
        let coordinates = ContextCoordinates::parse("Model -> 123 -> 1111 -> field").unwrap();
        assert_eq!(coordinates.entity, EntityRef::new("Model", "123"));
        assert_eq!(coordinates.revision, Some(1111));
        assert_eq!(coordinates.attribute, "field");
    }

    #[test]
    fn test_parse_context_without_revision() {
        let coordinates = ContextCoordinates::parse("Foo::Bar -> 7 -> title").unwrap();
        assert_eq!(coordinates.entity, EntityRef::new("Foo::Bar", "7"));
        assert_eq!(coordinates.revision, None);
        assert_eq!(coordinates.attribute, "title");
    }

    #[test]
    fn test_parse_context_too_short() {
        assert!(matches!(
            ContextCoordinates::parse("Model -> 123"),
            Err(SyncError::Content(_))
        ));
        assert!(ContextCoordinates::parse("").is_err());
    }

    // ========== Resolve Tests ==========

    #[tokio::test]
    async fn test_resolve_builds_one_attribute_results() {
        let (_, _, upserter) = setup();
        let resolved = upserter.resolve(Some("333"), Some("222")).await.unwrap();

        let entity = EntityRef::new("Model", "123");
        assert_eq!(resolved.source_text.get(&entity).unwrap()["field"], "source text");
        assert_eq!(resolved.translation.get(&entity).unwrap()["field"], "dummy translation");
        assert_eq!(resolved.translation.len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_requires_both_ids() {
        let (mock, _, upserter) = setup();
        for (translation_id, source_string_id) in [(None, Some("222")), (Some("333"), None), (Some(""), Some("222"))] {
            let error = upserter.resolve(translation_id, source_string_id).await.unwrap_err();
            assert_eq!(
                error.to_string(),
                "Argument error: translation_id and/or source_string_id params not present"
            );
        }
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_propagates_provider_error() {
        let (mock, _, upserter) = setup();
        mock.fail(Operation::Translation, ProviderError::new(404, "not found"));
        let error = upserter.resolve(Some("333"), Some("222")).await.unwrap_err();
        assert_eq!(error, SyncError::Provider(ProviderError::new(404, "not found")));
    }

    // ========== Upsert Tests ==========

    #[tokio::test]
    async fn test_upsert_writes_matching_entities_only() {
        let (_, store, upserter) = setup();
        store.insert(
            EntityRef::new("Model", "123"),
            EntityRecord::new(Some(1111)).with_attribute("field", "source text"),
        );
        store.insert(
            EntityRef::new("Model", "124"),
            EntityRecord::new(Some(1200)).with_attribute("field", "source text"),
        );
        store.insert(
            EntityRef::new("Model", "125"),
            EntityRecord::new(Some(1300)).with_attribute("field", "edited since"),
        );

        let report = upserter.upsert("fr", Some("333"), Some("222")).await.unwrap();
        assert_eq!(
            report.written,
            vec![EntityRef::new("Model", "123"), EntityRef::new("Model", "124")]
        );
        assert!(report.failures.is_none());
        assert_eq!(
            store.translation(&EntityRef::new("Model", "124"), "fr", "field").as_deref(),
            Some("dummy translation")
        );
        assert_eq!(store.translation(&EntityRef::new("Model", "125"), "fr", "field"), None);
    }

    #[tokio::test]
    async fn test_upsert_records_write_failures() {
        let (_, store, upserter) = setup();
        let entity = EntityRef::new("Model", "123");
        store.insert(entity.clone(), EntityRecord::new(None).with_attribute("field", "source text"));
        store.fail_writes_for(entity.clone());

        let report = upserter.upsert("fr", Some("333"), Some("222")).await.unwrap();
        assert!(report.written.is_empty());
        assert!(report.failures.unwrap().contains("Model 123"));
    }
}
