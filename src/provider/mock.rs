//! In-memory translation provider for testing
//!
//! This module provides a deterministic, network-free provider holding a fake
//! project: files with source content, per-locale exports and approval
//! progress, directories, source strings and translation units. Every call is
//! logged so tests can assert which remote writes happened, and failures can
//! be injected per operation or per item.
//!
//! # Example
//!
//! ```ignore
//! use serde_json::json;
//! use tms_sync::provider::{MockProvider, Operation, TranslationProvider};
//!
//! #[tokio::test]
//! async fn test_export() {
//!     let mock = MockProvider::new();
//!     let id = mock.add_file("Post-1.json", json!({ "Post": { "1": { "title": "Hi" } } }));
//!     mock.set_translation(&id, "fr", json!({ "Post": { "1": { "title": "Salut" } } }));
//!     let content = mock.export_translated_content(&id, "fr").await.unwrap();
//!     assert_eq!(mock.count_calls(Operation::Export), 1);
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::traits::{
    ApprovalInfo, DirectoryId, DirectoryMeta, FileId, FileMeta, SourceString, TranslationProvider,
    TranslationUnit,
};

/// Provider operations, used for call logging and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListFiles,
    FileProgress,
    Export,
    DownloadSource,
    CreateFile,
    UpdateFile,
    DeleteFile,
    FindDirectory,
    CreateDirectory,
    SourceString,
    Translation,
}

/// One recorded provider call
///
/// `key` is the item the call was about: a file id, a file or directory name,
/// or a string id. Listing calls have an empty key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCall {
    pub operation: Operation,
    pub key: String,
    /// Locale for exports
    pub locale: Option<String>,
}

#[derive(Debug, Clone)]
struct MockFile {
    meta: FileMeta,
    source: Value,
    translations: BTreeMap<String, Value>,
    approvals: BTreeMap<String, u32>,
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    operation: Operation,
    /// `None` fails every call of the operation
    key: Option<String>,
    error: ProviderError,
}

#[derive(Debug, Default)]
struct MockState {
    files: Vec<MockFile>,
    directories: Vec<DirectoryMeta>,
    source_strings: BTreeMap<String, SourceString>,
    translation_units: BTreeMap<String, TranslationUnit>,
    failures: Vec<InjectedFailure>,
    calls: Vec<ProviderCall>,
    operations_begun: usize,
    next_id: u64,
}

impl MockState {
    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }

    fn file(&self, file_id: &str) -> ProviderResult<&MockFile> {
        self.files
            .iter()
            .find(|file| file.meta.id == file_id)
            .ok_or_else(|| not_found("File", file_id))
    }

    fn file_mut(&mut self, file_id: &str) -> ProviderResult<&mut MockFile> {
        self.files
            .iter_mut()
            .find(|file| file.meta.id == file_id)
            .ok_or_else(|| not_found("File", file_id))
    }

    /// Log the call, then fail it if a matching failure was injected
    fn enter(&mut self, operation: Operation, key: &str, locale: Option<&str>) -> ProviderResult<()> {
        self.calls.push(ProviderCall {
            operation,
            key: key.to_string(),
            locale: locale.map(str::to_string),
        });
        let injected = self.failures.iter().find(|failure| {
            failure.operation == operation
                && failure.key.as_deref().map(|k| k == key).unwrap_or(true)
        });
        match injected {
            Some(failure) => Err(failure.error.clone()),
            None => Ok(()),
        }
    }
}

fn not_found(kind: &str, id: &str) -> ProviderError {
    ProviderError::new(404, format!("{} {} not found", kind, id))
}

/// Provider backed by an in-memory project
///
/// Exports for a locale without a stored translation return the source
/// content, like an untranslated file on a real service.
#[derive(Debug, Default)]
pub struct MockProvider {
    state: Mutex<MockState>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a file at the project root and return its id
    pub fn add_file(&self, name: &str, source: Value) -> FileId {
        self.add_file_in(name, source, None)
    }

    /// Add a file inside a directory and return its id
    pub fn add_file_in(&self, name: &str, source: Value, directory_id: Option<&str>) -> FileId {
        let mut state = self.state();
        let id = state.allocate_id();
        state.files.push(MockFile {
            meta: FileMeta {
                id: id.clone(),
                name: name.to_string(),
                directory_id: directory_id.map(str::to_string),
            },
            source,
            translations: BTreeMap::new(),
            approvals: BTreeMap::new(),
        });
        id
    }

    /// Set the exported content of a file for a locale
    ///
    /// Unknown file ids are ignored.
    pub fn set_translation(&self, file_id: &str, locale: &str, content: Value) {
        if let Ok(file) = self.state().file_mut(file_id) {
            file.translations.insert(locale.to_string(), content);
        }
    }

    /// Set the approval progress (0-100) of a file for a locale
    pub fn set_approval(&self, file_id: &str, locale: &str, progress: u32) {
        if let Ok(file) = self.state().file_mut(file_id) {
            file.approvals.insert(locale.to_string(), progress);
        }
    }

    pub fn add_directory(&self, name: &str, parent_id: Option<&str>) -> DirectoryId {
        let mut state = self.state();
        let id = state.allocate_id();
        state.directories.push(DirectoryMeta {
            id: id.clone(),
            name: name.to_string(),
            parent_id: parent_id.map(str::to_string),
        });
        id
    }

    pub fn add_source_string(&self, string_id: &str, text: &str, context: &str) {
        self.state().source_strings.insert(
            string_id.to_string(),
            SourceString {
                text: text.to_string(),
                context: context.to_string(),
            },
        );
    }

    pub fn add_translation_unit(&self, translation_id: &str, text: &str) {
        self.state().translation_units.insert(
            translation_id.to_string(),
            TranslationUnit {
                text: text.to_string(),
            },
        );
    }

    /// Current source content of a file, without logging a call
    pub fn source_content(&self, file_id: &str) -> Option<Value> {
        self.state().file(file_id).ok().map(|file| file.source.clone())
    }

    /// Files currently in the project, without logging a call
    pub fn files(&self) -> Vec<FileMeta> {
        self.state().files.iter().map(|file| file.meta.clone()).collect()
    }

    pub fn directories(&self) -> Vec<DirectoryMeta> {
        self.state().directories.clone()
    }

    /// Fail every call of an operation
    pub fn fail(&self, operation: Operation, error: ProviderError) {
        self.state().failures.push(InjectedFailure {
            operation,
            key: None,
            error,
        });
    }

    /// Fail calls of an operation about one item
    pub fn fail_for(&self, operation: Operation, key: &str, error: ProviderError) {
        self.state().failures.push(InjectedFailure {
            operation,
            key: Some(key.to_string()),
            error,
        });
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.state().calls.clone()
    }

    pub fn count_calls(&self, operation: Operation) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call.operation == operation)
            .count()
    }

    /// Number of calls that changed remote state
    pub fn write_count(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| {
                matches!(
                    call.operation,
                    Operation::CreateFile
                        | Operation::UpdateFile
                        | Operation::DeleteFile
                        | Operation::CreateDirectory
                )
            })
            .count()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// How many logical operations were started against this provider
    pub fn operations_begun(&self) -> usize {
        self.state().operations_begun
    }
}

#[async_trait]
impl TranslationProvider for MockProvider {
    async fn list_files(&self) -> ProviderResult<Vec<FileMeta>> {
        let mut state = self.state();
        state.enter(Operation::ListFiles, "", None)?;
        Ok(state.files.iter().map(|file| file.meta.clone()).collect())
    }

    async fn file_progress(&self, file_id: &str) -> ProviderResult<Vec<ApprovalInfo>> {
        let mut state = self.state();
        state.enter(Operation::FileProgress, file_id, None)?;
        let file = state.file(file_id)?;
        Ok(file
            .approvals
            .iter()
            .map(|(locale, progress)| ApprovalInfo {
                language_id: locale.clone(),
                approval_progress: *progress,
                translation_progress: *progress,
            })
            .collect())
    }

    async fn export_translated_content(&self, file_id: &str, locale: &str) -> ProviderResult<Value> {
        let mut state = self.state();
        state.enter(Operation::Export, file_id, Some(locale))?;
        let file = state.file(file_id)?;
        Ok(file
            .translations
            .get(locale)
            .unwrap_or(&file.source)
            .clone())
    }

    async fn download_source_content(&self, file_id: &str) -> ProviderResult<Value> {
        let mut state = self.state();
        state.enter(Operation::DownloadSource, file_id, None)?;
        Ok(state.file(file_id)?.source.clone())
    }

    async fn create_file(
        &self,
        name: &str,
        content: &Value,
        directory_id: Option<&str>,
    ) -> ProviderResult<FileMeta> {
        let mut state = self.state();
        state.enter(Operation::CreateFile, name, None)?;
        if let Some(directory_id) = directory_id {
            if !state.directories.iter().any(|dir| dir.id == directory_id) {
                return Err(not_found("Directory", directory_id));
            }
        }

        let meta = FileMeta {
            id: state.allocate_id(),
            name: name.to_string(),
            directory_id: directory_id.map(str::to_string),
        };
        state.files.push(MockFile {
            meta: meta.clone(),
            source: content.clone(),
            translations: BTreeMap::new(),
            approvals: BTreeMap::new(),
        });
        Ok(meta)
    }

    async fn update_file(&self, file_id: &str, content: &Value) -> ProviderResult<FileMeta> {
        let mut state = self.state();
        state.enter(Operation::UpdateFile, file_id, None)?;
        let file = state.file_mut(file_id)?;
        file.source = content.clone();
        Ok(file.meta.clone())
    }

    async fn delete_file(&self, file_id: &str) -> ProviderResult<()> {
        let mut state = self.state();
        state.enter(Operation::DeleteFile, file_id, None)?;
        let before = state.files.len();
        state.files.retain(|file| file.meta.id != file_id);
        if state.files.len() == before {
            return Err(not_found("File", file_id));
        }
        Ok(())
    }

    async fn find_directory_by_name(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> ProviderResult<Option<DirectoryId>> {
        let mut state = self.state();
        state.enter(Operation::FindDirectory, name, None)?;
        Ok(state
            .directories
            .iter()
            .find(|dir| dir.name == name && dir.parent_id.as_deref() == parent_id)
            .map(|dir| dir.id.clone()))
    }

    async fn create_directory(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> ProviderResult<DirectoryId> {
        let mut state = self.state();
        state.enter(Operation::CreateDirectory, name, None)?;
        let id = state.allocate_id();
        state.directories.push(DirectoryMeta {
            id: id.clone(),
            name: name.to_string(),
            parent_id: parent_id.map(str::to_string),
        });
        Ok(id)
    }

    async fn source_string(&self, string_id: &str) -> ProviderResult<SourceString> {
        let mut state = self.state();
        state.enter(Operation::SourceString, string_id, None)?;
        state
            .source_strings
            .get(string_id)
            .cloned()
            .ok_or_else(|| not_found("String", string_id))
    }

    async fn translation(&self, translation_id: &str) -> ProviderResult<TranslationUnit> {
        let mut state = self.state();
        state.enter(Operation::Translation, translation_id, None)?;
        state
            .translation_units
            .get(translation_id)
            .cloned()
            .ok_or_else(|| not_found("Translation", translation_id))
    }

    fn begin_operation(&self) {
        self.state().operations_begun += 1;
    }

    fn provider_name(&self) -> &str {
        "Mock Provider"
    }
}
