//! Translation provider trait and the remote value types
//!
//! This module defines the `TranslationProvider` trait, the narrow interface
//! between the sync engines and a translation management service. Keeping
//! the engines behind it means they can run against the Crowdin client, the
//! in-memory mock, or any other backend.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::entity::file_stem;
use crate::error::ProviderResult;

/// Provider-assigned file identifier
pub type FileId = String;

/// Provider-assigned directory identifier
pub type DirectoryId = String;

/// A file as listed by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    #[serde(deserialize_with = "id_string")]
    pub id: FileId,
    #[serde(default)]
    pub name: String,
    #[serde(
        default,
        rename = "directoryId",
        deserialize_with = "optional_id_string"
    )]
    pub directory_id: Option<DirectoryId>,
}

/// A directory as listed by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryMeta {
    #[serde(deserialize_with = "id_string")]
    pub id: DirectoryId,
    pub name: String,
    #[serde(
        default,
        rename = "directoryId",
        deserialize_with = "optional_id_string"
    )]
    pub parent_id: Option<DirectoryId>,
}

/// Translation and approval progress of one file in one language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalInfo {
    #[serde(rename = "languageId")]
    pub language_id: String,
    #[serde(rename = "approvalProgress", default)]
    pub approval_progress: u32,
    #[serde(rename = "translationProgress", default)]
    pub translation_progress: u32,
}

impl ApprovalInfo {
    /// Every string in the file is translated and approved
    pub fn is_fully_approved(&self) -> bool {
        self.approval_progress >= 100
    }
}

/// A source string together with its structured context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceString {
    pub text: String,
    /// `Type -> id -> revision -> attribute`
    #[serde(default)]
    pub context: String,
}

/// A single translation of a source string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationUnit {
    pub text: String,
}

/// Operations the sync engines need from a translation management service
///
/// Every method fails with a single [`ProviderError`](crate::error::ProviderError);
/// callers must not assume partial success within one call. Read operations
/// never change remote state.
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    /// List every file in the project
    async fn list_files(&self) -> ProviderResult<Vec<FileMeta>>;

    /// Approval and translation progress of a file for every target language
    async fn file_progress(&self, file_id: &str) -> ProviderResult<Vec<ApprovalInfo>>;

    /// Approval and translation progress of a file for one language
    ///
    /// `Ok(None)` when the provider reports nothing for that language.
    async fn file_approval_status(
        &self,
        file_id: &str,
        locale: &str,
    ) -> ProviderResult<Option<ApprovalInfo>> {
        let progress = self.file_progress(file_id).await?;
        Ok(progress.into_iter().find(|info| info.language_id == locale))
    }

    /// Translated content of a file for a language
    async fn export_translated_content(&self, file_id: &str, locale: &str) -> ProviderResult<Value>;

    /// Current source content of a file
    async fn download_source_content(&self, file_id: &str) -> ProviderResult<Value>;

    /// Create a file, optionally inside a directory
    async fn create_file(
        &self,
        name: &str,
        content: &Value,
        directory_id: Option<&str>,
    ) -> ProviderResult<FileMeta>;

    /// Replace the content of a file, keeping existing translations and approvals
    async fn update_file(&self, file_id: &str, content: &Value) -> ProviderResult<FileMeta>;

    async fn delete_file(&self, file_id: &str) -> ProviderResult<()>;

    /// Find a file whose name without extension equals `base_name`
    async fn find_file_by_base_name(&self, base_name: &str) -> ProviderResult<Option<FileId>> {
        let files = self.list_files().await?;
        Ok(files
            .into_iter()
            .find(|file| file_stem(&file.name) == base_name)
            .map(|file| file.id))
    }

    /// Find a directory by exact name under `parent_id` (project root when `None`)
    async fn find_directory_by_name(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> ProviderResult<Option<DirectoryId>>;

    async fn create_directory(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> ProviderResult<DirectoryId>;

    async fn source_string(&self, string_id: &str) -> ProviderResult<SourceString>;

    async fn translation(&self, translation_id: &str) -> ProviderResult<TranslationUnit>;

    /// Fetch a translation and the source string it translates
    async fn resolve_source_string_and_translation(
        &self,
        translation_id: &str,
        source_string_id: &str,
    ) -> ProviderResult<(SourceString, TranslationUnit)> {
        let source = self.source_string(source_string_id).await?;
        let translation = self.translation(translation_id).await?;
        Ok((source, translation))
    }

    /// Start a logical operation
    ///
    /// Remote state a provider caches (such as the file listing) lives at
    /// most until the next call, so each upload, sync pass or deletion sees
    /// files created or removed by other processes.
    fn begin_operation(&self) {}

    /// Name used in logs
    fn provider_name(&self) -> &str;
}

/// Providers hand out ids as numbers or strings; keep them as strings
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_to_id(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid identifier: {}", value)))
}

fn optional_id_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    value_to_id(&value)
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid identifier: {}", value)))
}

/// Identifier carried by a JSON value, if it is a string or a number
pub fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_file_meta_accepts_numeric_and_string_ids() {
        let numeric: FileMeta =
            serde_json::from_value(json!({ "id": 12, "name": "Post-1.json", "directoryId": 4 }))
                .unwrap();
        assert_eq!(numeric.id, "12");
        assert_eq!(numeric.directory_id.as_deref(), Some("4"));

        let string: FileMeta = serde_json::from_value(json!({ "id": "12" })).unwrap();
        assert_eq!(string.id, "12");
        assert_eq!(string.name, "");
        assert_eq!(string.directory_id, None);
    }

    #[test]
    fn test_file_meta_null_directory() {
        let meta: FileMeta =
            serde_json::from_value(json!({ "id": 1, "name": "a.json", "directoryId": null }))
                .unwrap();
        assert_eq!(meta.directory_id, None);
    }

    #[test]
    fn test_file_meta_rejects_object_id() {
        let result = serde_json::from_value::<FileMeta>(json!({ "id": { "x": 1 } }));
        assert!(result.is_err());
    }

    #[test]
    fn test_approval_info_parsing() {
        let info: ApprovalInfo = serde_json::from_value(json!({
            "languageId": "fr",
            "approvalProgress": 100,
            "translationProgress": 100,
            "phrases": { "total": 3 }
        }))
        .unwrap();
        assert!(info.is_fully_approved());

        let partial: ApprovalInfo =
            serde_json::from_value(json!({ "languageId": "es", "approvalProgress": 75 })).unwrap();
        assert!(!partial.is_fully_approved());
        assert_eq!(partial.translation_progress, 0);
    }
}
