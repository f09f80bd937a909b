//! Translation sync engine
//!
//! A sync pass pulls translations back from the translation service and
//! writes them to storage, one target locale after another:
//!
//! 1. **Candidates** - every file, or only files fully approved for the locale
//! 2. **Export** - translated content per file, in batches
//! 3. **Resolve** - latest revision wins per attribute, sentences rejoined
//! 4. **Write** - one storage write per entity
//! 5. **Accumulate** - successful writes go into the [`SyncLedger`]
//!
//! In approved-only mode a cleanup step runs after the last locale: remote
//! files of entities written in every target locale are deleted. Failures of
//! single files or entities are collected and reported; they never stop the
//! rest of the pass.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::content::{self, Translations};
use crate::entity::EntityRef;
use crate::error::{FilesError, ProviderResult, SyncResult};
use crate::failures::FailureCollector;
use crate::provider::{DirectoryId, FileId, FileMeta, TranslationProvider};
use crate::storage::TranslationStore;

/// Default number of files exported per batch
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Which files a pass exports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncMode {
    /// Every file, whatever its approval state
    #[default]
    All,
    /// Only files fully approved for the locale; enables cleanup
    ApprovedOnly,
}

/// Restricts the files considered by a pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncFilter {
    /// Only files directly inside this directory path, outermost first
    pub namespace: Option<Vec<String>>,
}

impl SyncFilter {
    pub fn namespace(segments: Vec<String>) -> Self {
        Self {
            namespace: Some(segments),
        }
    }
}

/// Locales each entity was successfully written in during one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncLedger {
    locales_by_entity: BTreeMap<EntityRef, BTreeSet<String>>,
}

impl SyncLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entity: EntityRef, locale: &str) {
        self.locales_by_entity
            .entry(entity)
            .or_default()
            .insert(locale.to_string());
    }

    pub fn locales(&self, entity: &EntityRef) -> Option<&BTreeSet<String>> {
        self.locales_by_entity.get(entity)
    }

    /// Entities whose locale set equals `targets`
    pub fn fully_synced(&self, targets: &[String]) -> Vec<EntityRef> {
        let targets: BTreeSet<&str> = targets.iter().map(String::as_str).collect();
        if targets.is_empty() {
            return Vec::new();
        }
        self.locales_by_entity
            .iter()
            .filter(|(_, locales)| {
                locales.len() == targets.len()
                    && locales.iter().all(|locale| targets.contains(locale.as_str()))
            })
            .map(|(entity, _)| entity.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.locales_by_entity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locales_by_entity.is_empty()
    }
}

/// Outcome of a sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Entity writes that succeeded, summed over locales
    pub written: usize,
    /// Remote files deleted by cleanup
    pub deleted: Vec<FileId>,
    pub ledger: SyncLedger,
    pub failures: Option<FilesError>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_none()
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} writes, {} files deleted, {} failures",
            self.written,
            self.deleted.len(),
            self.failures.as_ref().map(FilesError::len).unwrap_or(0)
        )
    }
}

/// Translations exported from a batch of files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportedBatch {
    pub translations: Translations,
    /// Files that could not be exported or resolved, keyed by file id
    pub failures: Option<FilesError>,
}

/// Pulls translations from the provider into storage
pub struct TranslationSyncEngine {
    provider: Arc<dyn TranslationProvider>,
    store: Arc<dyn TranslationStore>,
    target_locales: Vec<String>,
    batch_size: usize,
}

impl TranslationSyncEngine {
    pub fn new(
        provider: Arc<dyn TranslationProvider>,
        store: Arc<dyn TranslationStore>,
        target_locales: Vec<String>,
    ) -> Self {
        Self {
            provider,
            store,
            target_locales,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn target_locales(&self) -> &[String] {
        &self.target_locales
    }

    /// Run a full pass
    ///
    /// `locales` overrides the configured target locales for this pass;
    /// locales outside the target set (the source locale among them) are
    /// skipped. A pass over fewer locales than configured never deletes
    /// anything, since no entity can reach the full locale set.
    ///
    /// Per-file failures are keyed `"{file_id} [{locale}]"`, so a file failing
    /// in several locales is reported once per locale.
    pub async fn sync(
        &self,
        locales: Option<&[String]>,
        filter: &SyncFilter,
        mode: SyncMode,
    ) -> SyncReport {
        let locales = self.pass_locales(locales);
        let mut report = SyncReport::default();
        let mut failures = FailureCollector::new();
        self.provider.begin_operation();

        for locale in &locales {
            info!(locale = %locale, mode = ?mode, "syncing translations");
            let file_ids = match self.candidate_files(locale, filter, mode, &mut failures).await {
                Ok(file_ids) => file_ids,
                Err(e) => {
                    error!(locale = %locale, error = %e, "listing files failed");
                    failures.record(format!("files [{}]", locale), e);
                    continue;
                }
            };
            debug!(locale = %locale, count = file_ids.len(), "candidate files");

            for batch in file_ids.chunks(self.batch_size) {
                let exported = self.export_files(batch, locale).await;
                if let Some(batch_failures) = exported.failures {
                    failures.absorb_for_locale(batch_failures, locale);
                }
                report.written += self
                    .write_translations(&exported.translations, locale, &mut report.ledger, &mut failures)
                    .await;
            }
        }

        if mode == SyncMode::ApprovedOnly {
            report.deleted = self.cleanup(&report.ledger, &mut failures).await;
        }

        report.failures = failures.into_error();
        info!(report = %report, "sync finished");
        report
    }

    /// Locales of one pass: the override restricted to the target locales
    fn pass_locales(&self, requested: Option<&[String]>) -> Vec<String> {
        let Some(requested) = requested else {
            return self.target_locales.clone();
        };
        let mut locales = Vec::new();
        for locale in requested {
            if !self.target_locales.contains(locale) {
                warn!(locale = %locale, "not a target locale, skipped");
            } else if !locales.contains(locale) {
                locales.push(locale.clone());
            }
        }
        locales
    }

    /// Candidate files of one locale exported and resolved, nothing written
    pub async fn preview(&self, locale: &str, filter: &SyncFilter, mode: SyncMode) -> SyncResult<ExportedBatch> {
        let mut failures = FailureCollector::new();
        self.provider.begin_operation();
        let file_ids = self.candidate_files(locale, filter, mode, &mut failures).await?;

        let mut preview = ExportedBatch::default();
        for batch in file_ids.chunks(self.batch_size) {
            let exported = self.export_files(batch, locale).await;
            preview.translations.extend(exported.translations);
            if let Some(batch_failures) = exported.failures {
                failures.absorb(batch_failures);
            }
        }
        preview.failures = failures.into_error();
        Ok(preview)
    }

    /// Export and resolve a batch of files, continuing past failures
    pub async fn export_files(&self, file_ids: &[FileId], locale: &str) -> ExportedBatch {
        let mut translations = Translations::new();
        let mut failures = FailureCollector::new();

        for file_id in file_ids {
            let resolved = self.translations_for_file(file_id, locale).await;
            match resolved {
                Ok(file_translations) => translations.extend(file_translations),
                Err(e) => {
                    warn!(file_id = %file_id, locale = %locale, error = %e, "export failed");
                    failures.record(file_id.clone(), e);
                }
            }
        }

        ExportedBatch {
            translations,
            failures: failures.into_error(),
        }
    }

    /// Export one file and resolve its revisions
    pub async fn translations_for_file(&self, file_id: &str, locale: &str) -> SyncResult<Translations> {
        let document = self.provider.export_translated_content(file_id, locale).await?;
        content::resolve_translations(&document)
    }

    /// Delete a remote file
    pub async fn cleanup_file(&self, file_id: &str) -> SyncResult<()> {
        self.provider.delete_file(file_id).await?;
        info!(file_id = %file_id, "deleted remote file");
        Ok(())
    }

    /// Delete the remote file of an entity, if there is one
    ///
    /// Returns the id of the deleted file.
    pub async fn delete_source_files_for_entity(&self, entity: &EntityRef) -> SyncResult<Option<FileId>> {
        self.provider.begin_operation();
        let Some(file_id) = self.provider.find_file_by_base_name(&entity.base_name()).await? else {
            debug!(entity = %entity, "no remote file to delete");
            return Ok(None);
        };
        self.cleanup_file(&file_id).await?;
        Ok(Some(file_id))
    }

    async fn candidate_files(
        &self,
        locale: &str,
        filter: &SyncFilter,
        mode: SyncMode,
        failures: &mut FailureCollector,
    ) -> ProviderResult<Vec<FileId>> {
        let mut files = self.provider.list_files().await?;

        if let Some(namespace) = &filter.namespace {
            match self.find_namespace(namespace).await? {
                Some(directory_id) => files.retain(|file| file.directory_id.as_deref() == Some(directory_id.as_str())),
                None => files.clear(),
            }
        }

        if mode == SyncMode::All {
            return Ok(files.into_iter().map(|file| file.id).collect());
        }

        let mut approved = Vec::new();
        for FileMeta { id, .. } in files {
            let status = self.provider.file_approval_status(&id, locale).await;
            if let Some(Some(info)) = failures.capture(format!("{} [{}]", id, locale), status) {
                if info.is_fully_approved() {
                    approved.push(id);
                }
            }
        }
        Ok(approved)
    }

    /// Existing directory for a namespace path, without creating anything
    async fn find_namespace(&self, namespace: &[String]) -> ProviderResult<Option<DirectoryId>> {
        let mut parent: Option<DirectoryId> = None;
        for segment in namespace {
            match self
                .provider
                .find_directory_by_name(segment, parent.as_deref())
                .await?
            {
                Some(id) => parent = Some(id),
                None => return Ok(None),
            }
        }
        Ok(parent)
    }

    async fn write_translations(
        &self,
        translations: &Translations,
        locale: &str,
        ledger: &mut SyncLedger,
        failures: &mut FailureCollector,
    ) -> usize {
        let mut written = 0;
        for (entity, attributes) in translations.iter() {
            match self.store.apply_translations(&entity, locale, attributes).await {
                Ok(()) => {
                    ledger.record(entity, locale);
                    written += 1;
                }
                Err(e) => {
                    warn!(entity = %entity, locale = %locale, error = %e, "writing translations failed");
                    failures.record(format!("{} [{}]", entity.key(), locale), e);
                }
            }
        }
        written
    }

    async fn cleanup(&self, ledger: &SyncLedger, failures: &mut FailureCollector) -> Vec<FileId> {
        let mut deleted = Vec::new();
        for entity in ledger.fully_synced(&self.target_locales) {
            match self.delete_source_files_for_entity(&entity).await {
                Ok(Some(file_id)) => deleted.push(file_id),
                Ok(None) => {}
                Err(e) => {
                    warn!(entity = %entity, error = %e, "cleanup failed");
                    failures.record(entity.base_name(), e);
                }
            }
        }
        deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locales(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_ledger_full_set_only() {
        let mut ledger = SyncLedger::new();
        ledger.record(EntityRef::new("Model", "1"), "fr");
        ledger.record(EntityRef::new("Model", "2"), "es");
        ledger.record(EntityRef::new("Model", "2"), "fr");
        ledger.record(EntityRef::new("Model", "3"), "fr");
        ledger.record(EntityRef::new("Model", "3"), "es");

        assert_eq!(
            ledger.fully_synced(&locales(&["es", "fr"])),
            vec![EntityRef::new("Model", "2"), EntityRef::new("Model", "3")]
        );
    }

    #[test]
    fn test_ledger_order_independent() {
        let mut ledger = SyncLedger::new();
        ledger.record(EntityRef::new("Post", "1"), "fr");
        ledger.record(EntityRef::new("Post", "1"), "es");
        assert_eq!(ledger.fully_synced(&locales(&["fr", "es"])).len(), 1);
    }

    #[test]
    fn test_ledger_superset_is_not_equal() {
        let mut ledger = SyncLedger::new();
        ledger.record(EntityRef::new("Post", "1"), "fr");
        ledger.record(EntityRef::new("Post", "1"), "de");
        assert!(ledger.fully_synced(&locales(&["fr"])).is_empty());
        assert!(ledger.fully_synced(&[]).is_empty());
    }

    #[test]
    fn test_ledger_records_once_per_locale() {
        let mut ledger = SyncLedger::new();
        let entity = EntityRef::new("Post", "1");
        ledger.record(entity.clone(), "fr");
        ledger.record(entity.clone(), "fr");
        assert_eq!(ledger.locales(&entity).unwrap().len(), 1);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_report_display() {
        let report = SyncReport {
            written: 3,
            deleted: vec!["1".to_string()],
            ledger: SyncLedger::new(),
            failures: Some(FilesError::single("9", "boom")),
        };
        assert_eq!(report.to_string(), "3 writes, 1 files deleted, 1 failures");
        assert!(!report.is_success());
    }
}
