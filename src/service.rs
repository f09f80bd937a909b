//! Operations meant to be triggered from outside
//!
//! [`SyncService`] wires the engines to one provider, one store and one
//! configuration. Job runners, the CLI and the write hooks call into it. Every
//! failure it returns has already been logged.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::SyncConfig;
use crate::content::{AttributeMap, AttributeOptions};
use crate::duplicates::DuplicateResolver;
use crate::entity::EntityRef;
use crate::error::{SyncError, SyncResult};
use crate::provider::{FileId, TranslationProvider};
use crate::storage::TranslationStore;
use crate::sync::{SyncFilter, SyncMode, SyncReport, TranslationSyncEngine};
use crate::upload::{SourceUploader, UploadOutcome, UploadRequest};
use crate::upsert::{TranslationUpserter, UpsertReport};

/// Per-call upload settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOptions {
    /// Directory path for a new remote file; the configured one when `None`
    pub namespace: Option<Vec<String>>,
}

pub struct SyncService {
    provider: Arc<dyn TranslationProvider>,
    store: Arc<dyn TranslationStore>,
    config: SyncConfig,
}

impl SyncService {
    pub fn new(
        provider: Arc<dyn TranslationProvider>,
        store: Arc<dyn TranslationStore>,
        config: SyncConfig,
    ) -> Self {
        Self {
            provider,
            store,
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn sync_engine(&self) -> TranslationSyncEngine {
        TranslationSyncEngine::new(
            self.provider.clone(),
            self.store.clone(),
            self.config.target_locales(),
        )
        .with_batch_size(self.config.batch_size)
    }

    /// Upload the current source values of an entity
    ///
    /// The entity is read from storage when the job runs, so a delayed
    /// upload always sends the latest values. With duplicate handling on,
    /// attributes already translated elsewhere are copied first and left out
    /// of the upload.
    pub async fn upload_source_strings(
        &self,
        entity: &EntityRef,
        options: &UploadOptions,
    ) -> SyncResult<UploadOutcome> {
        let result = self.upload(entity, options).await;
        if let Err(e) = &result {
            error!(entity = %entity, error = %e, "uploading source strings failed");
        }
        result
    }

    async fn upload(&self, entity: &EntityRef, options: &UploadOptions) -> SyncResult<UploadOutcome> {
        let record = self
            .store
            .load_entity(entity)
            .await?
            .ok_or_else(|| SyncError::EntityNotFound(entity.clone()))?;

        let entity_config = self.config.entity(&entity.entity_type).cloned().unwrap_or_default();
        let attribute_options: BTreeMap<String, AttributeOptions> = if entity_config.attributes.is_empty() {
            record
                .attributes
                .keys()
                .map(|name| (name.clone(), AttributeOptions::default()))
                .collect()
        } else {
            entity_config.attributes
        };

        let mut attributes: AttributeMap = record
            .attributes
            .iter()
            .filter(|(name, _)| attribute_options.contains_key(name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        if self.config.duplicate_handling {
            let resolver = DuplicateResolver::new(self.store.clone(), &self.config.target_locales());
            let resolution = resolver.resolve(entity, &attributes).await;
            for (locale, applied) in &resolution.applied {
                info!(entity = %entity, locale = %locale, attributes = ?applied.keys().collect::<Vec<_>>(), "copied duplicate translations");
            }
            attributes = resolution.remaining;
        }

        info!(entity = %entity, attributes = ?attributes.keys().collect::<Vec<_>>(), "uploading attributes to translate");
        let request = UploadRequest::new(entity.clone(), record.revision, attributes)
            .with_options(attribute_options)
            .with_namespace(options.namespace.clone().unwrap_or(entity_config.namespace));

        SourceUploader::new(self.provider.clone()).upload(&request).await
    }

    /// Pull translations into storage
    ///
    /// `locales` restricts the pass to a subset of the target locales.
    pub async fn sync_translations(
        &self,
        locales: Option<&[String]>,
        filter: &SyncFilter,
        mode: SyncMode,
    ) -> SyncReport {
        let report = self.sync_engine().sync(locales, filter, mode).await;
        if let Some(failures) = &report.failures {
            for (item, message) in &failures.errors_by_item {
                error!(item = %item, error = %message, "sync failure");
            }
        }
        report
    }

    /// Write one approved translation right away
    pub async fn upsert_single_translation(
        &self,
        locale: &str,
        translation_id: Option<&str>,
        source_string_id: Option<&str>,
    ) -> SyncResult<UpsertReport> {
        let upserter = TranslationUpserter::new(self.provider.clone(), self.store.clone());
        let result = upserter.upsert(locale, translation_id, source_string_id).await;
        match &result {
            Ok(report) => {
                if let Some(failures) = &report.failures {
                    warn!(locale = %locale, failures = %failures, "upsert partially failed");
                }
            }
            Err(e) => error!(locale = %locale, error = %e, "upsert failed"),
        }
        result
    }

    /// Remove an entity's remote file
    pub async fn delete_source_strings(&self, entity: &EntityRef) -> SyncResult<Option<FileId>> {
        let result = self.sync_engine().delete_source_files_for_entity(entity).await;
        if let Err(e) = &result {
            error!(entity = %entity, error = %e, "deleting source strings failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRecord;
    use crate::provider::{MockProvider, Operation};
    use crate::storage::MemoryStore;
    use serde_json::json;

    const CONFIG: &str = r#"
default_locale = "en"
target_locales = ["en", "es", "fr"]

[provider]
project_id = "1"

[entities.Post]
namespace = ["posts"]
attributes = { title = {}, body = { split_into_sentences = true } }
"#;

    fn setup(duplicate_handling: bool) -> (Arc<MockProvider>, Arc<MemoryStore>, SyncService) {
        let mut config = SyncConfig::from_toml_str(CONFIG).unwrap().validated().unwrap();
        config.duplicate_handling = duplicate_handling;
        let mock = Arc::new(MockProvider::new());
        let store = Arc::new(MemoryStore::new());
        store.set_clock(2_000);
        let service = SyncService::new(mock.clone(), store.clone(), config);
        (mock, store, service)
    }

    fn post(id: &str) -> EntityRef {
        EntityRef::new("Post", id)
    }

    #[tokio::test]
    async fn test_upload_uses_configured_attributes_and_namespace() {
        let (mock, store, service) = setup(false);
        store.insert(
            post("1"),
            EntityRecord::new(Some(1000))
                .with_attribute("title", "Hello")
                .with_attribute("body", "One. Two.")
                .with_attribute("slug", "hello"),
        );

        let outcome = service
            .upload_source_strings(&post("1"), &UploadOptions::default())
            .await
            .unwrap();
        let UploadOutcome::Created { file_id } = outcome else {
            panic!("expected a created file, got {:?}", outcome);
        };
        assert_eq!(
            mock.source_content(&file_id).unwrap(),
            json!({ "Post": { "1": { "1000": { "title": "Hello", "body": ["One.", "Two."] } } } })
        );
        assert_eq!(mock.directories()[0].name, "posts");
    }

    #[tokio::test]
    async fn test_upload_missing_entity() {
        let (_, _, service) = setup(false);
        let error = service
            .upload_source_strings(&post("404"), &UploadOptions::default())
            .await
            .unwrap_err();
        assert_eq!(error.to_string(), "Can't find Post 404");
    }

    #[tokio::test]
    async fn test_upload_namespace_override() {
        let (mock, store, service) = setup(false);
        store.insert(post("1"), EntityRecord::new(None).with_attribute("title", "Hello"));

        let options = UploadOptions {
            namespace: Some(vec!["news".to_string()]),
        };
        service.upload_source_strings(&post("1"), &options).await.unwrap();
        assert_eq!(mock.directories()[0].name, "news");
    }

    #[tokio::test]
    async fn test_upload_with_duplicates_skips_covered_attributes() {
        let (mock, store, service) = setup(true);
        store.insert(post("1"), EntityRecord::new(Some(1000)).with_attribute("title", "Hello"));
        store.insert(post("2"), EntityRecord::new(Some(500)).with_attribute("title", "Hello"));
        store.insert_translation(&post("2"), "es", "title", "Hola", 600);
        store.insert_translation(&post("2"), "fr", "title", "Bonjour", 600);

        let outcome = service
            .upload_source_strings(&post("1"), &UploadOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome, UploadOutcome::Skipped);
        assert_eq!(mock.write_count(), 0);
        assert_eq!(store.translation(&post("1"), "fr", "title").as_deref(), Some("Bonjour"));
    }

    #[tokio::test]
    async fn test_sync_uses_targets_without_default_locale() {
        let (mock, store, service) = setup(false);
        store.insert(post("1"), EntityRecord::new(None).with_attribute("title", "Hello"));
        let file_id = mock.add_file("Post-1.json", json!({ "Post": { "1": { "title": "Hello" } } }));
        mock.set_translation(&file_id, "es", json!({ "Post": { "1": { "title": "Hola" } } }));

        let report = service
            .sync_translations(None, &SyncFilter::default(), SyncMode::All)
            .await;
        assert_eq!(report.written, 2);
        let exported: Vec<_> = mock
            .calls()
            .into_iter()
            .filter(|call| call.operation == Operation::Export)
            .filter_map(|call| call.locale)
            .collect();
        assert_eq!(exported, vec!["es", "fr"]);
    }

    #[tokio::test]
    async fn test_delete_source_strings() {
        let (mock, _, service) = setup(false);
        let file_id = mock.add_file("Post-1.json", json!({}));

        assert_eq!(service.delete_source_strings(&post("1")).await.unwrap(), Some(file_id));
        assert_eq!(service.delete_source_strings(&post("1")).await.unwrap(), None);
    }
}
