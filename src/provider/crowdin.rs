//! Crowdin v2 REST API provider
//!
//! This module talks to the Crowdin v2 API on behalf of the sync engines.
//!
//! # Authentication
//!
//! Requests carry a personal access token as a bearer token. The token, the
//! project id and the base URL come from [`ProviderConfig`].
//!
//! # Example
//!
//! ```ignore
//! use tms_sync::provider::{CrowdinClient, TranslationProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = CrowdinClient::new("token", "42", "https://api.crowdin.com")?;
//!     let content = client.export_translated_content("12", "fr").await?;
//!     println!("{}", content);
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::provider::envelope;
use crate::provider::traits::{
    ApprovalInfo, DirectoryId, DirectoryMeta, FileMeta, SourceString, TranslationProvider,
    TranslationUnit, value_to_id,
};

/// Crowdin v2 API provider
///
/// The file listing is cached until the next write through this client or the
/// start of the next logical operation
/// ([`TranslationProvider::begin_operation`]), so one operation pays for the
/// paginated listing once.
#[derive(Clone)]
pub struct CrowdinClient {
    /// Personal access token
    api_token: String,
    project_id: String,
    /// e.g. `https://api.crowdin.com` or `https://acme.crowdin.com`
    base_url: String,
    http: reqwest::Client,
    files: Arc<Mutex<Option<Vec<FileMeta>>>>,
}

impl CrowdinClient {
    /// Listing page size; a shorter page ends pagination
    pub const PAGE_SIZE: usize = 500;

    /// Keep existing translations and approvals when replacing file content
    const UPDATE_OPTION: &'static str = "keep_translations_and_approvals";

    /// Create a client for a project
    ///
    /// # Errors
    ///
    /// Fails when the token or project id is empty, or when the HTTP client
    /// cannot be built.
    pub fn new(api_token: &str, project_id: &str, base_url: &str) -> ProviderResult<Self> {
        Self::with_timeout(api_token, project_id, base_url, Duration::from_secs(30))
    }

    pub fn with_timeout(
        api_token: &str,
        project_id: &str,
        base_url: &str,
        timeout: Duration,
    ) -> ProviderResult<Self> {
        if api_token.trim().is_empty() {
            return Err(ProviderError::local("API token cannot be empty"));
        }
        if project_id.trim().is_empty() {
            return Err(ProviderError::local("Project id cannot be empty"));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::local(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_token: api_token.to_string(),
            project_id: project_id.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            files: Arc::new(Mutex::new(None)),
        })
    }

    pub fn from_config(config: &ProviderConfig) -> ProviderResult<Self> {
        Self::with_timeout(
            &config.api_token,
            &config.project_id,
            &config.base_url,
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Drop the cached file listing
    pub fn refresh_files(&self) {
        *self.files.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn project_url(&self, path: &str) -> String {
        format!("{}/api/v2/projects/{}{}", self.base_url, self.project_id, path)
    }

    fn url_with_params(&self, path: &str, params: &[(&str, String)]) -> ProviderResult<Url> {
        Url::parse_with_params(&self.project_url(path), params)
            .map_err(|e| ProviderError::local(format!("Invalid URL: {}", e)))
    }

    /// Send an authenticated API request and return the flattened payload
    async fn send(&self, request: reqwest::RequestBuilder) -> ProviderResult<Value> {
        let response = request.bearer_auth(&self.api_token).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(envelope::error_from_body(status.as_u16(), &body));
        }
        envelope::parse_body(status.as_u16(), &body)
    }

    async fn send_as<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> ProviderResult<T> {
        let value = self.send(request).await?;
        serde_json::from_value(value)
            .map_err(|e| ProviderError::local(format!("Unexpected response shape: {}", e)))
    }

    /// Download a JSON document from a URL handed out by the API
    ///
    /// Download links are pre-signed, so no credentials are sent.
    async fn follow(&self, url: &str) -> ProviderResult<Value> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ProviderError::new(i64::from(status.as_u16()), body));
        }
        serde_json::from_str(&body)
            .map_err(|e| ProviderError::local(format!("Unparsable file content: {}", e)))
    }

    fn download_url(payload: &Value) -> ProviderResult<&str> {
        payload
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::local("No URL given to follow to export file"))
    }

    /// Upload raw content to storage and return the storage id
    async fn add_storage(&self, name: &str, content: &Value) -> ProviderResult<Value> {
        let body = serde_json::to_vec(content)
            .map_err(|e| ProviderError::local(format!("Failed to encode file content: {}", e)))?;
        let request = self
            .http
            .post(format!("{}/api/v2/storages", self.base_url))
            .header("Crowdin-API-FileName", name)
            .header("Content-Type", "application/json")
            .body(body);
        let storage = self.send(request).await?;
        storage
            .get("id")
            .cloned()
            .ok_or_else(|| ProviderError::local("Storage response has no id"))
    }

    fn cached_files(&self) -> Option<Vec<FileMeta>> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Numeric ids are sent back as numbers
fn id_value(id: &str) -> Value {
    id.parse::<u64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(id))
}

impl std::fmt::Debug for CrowdinClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrowdinClient")
            .field("api_token", &"***")
            .field("project_id", &self.project_id)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[async_trait]
impl TranslationProvider for CrowdinClient {
    async fn list_files(&self) -> ProviderResult<Vec<FileMeta>> {
        if let Some(files) = self.cached_files() {
            return Ok(files);
        }

        let mut files = Vec::new();
        let mut offset = 0;
        loop {
            let url = self.url_with_params(
                "/files",
                &[
                    ("limit", Self::PAGE_SIZE.to_string()),
                    ("offset", offset.to_string()),
                ],
            )?;
            let page: Vec<FileMeta> = self.send_as(self.http.get(url)).await?;
            let page_len = page.len();
            files.extend(page);
            if page_len < Self::PAGE_SIZE {
                break;
            }
            offset += Self::PAGE_SIZE;
        }

        debug!(count = files.len(), "listed remote files");
        *self.files.lock().unwrap_or_else(PoisonError::into_inner) = Some(files.clone());
        Ok(files)
    }

    async fn file_progress(&self, file_id: &str) -> ProviderResult<Vec<ApprovalInfo>> {
        let url = self.url_with_params(
            &format!("/files/{}/languages/progress", file_id),
            &[("limit", Self::PAGE_SIZE.to_string())],
        )?;
        self.send_as(self.http.get(url)).await
    }

    async fn export_translated_content(&self, file_id: &str, locale: &str) -> ProviderResult<Value> {
        let request = self
            .http
            .post(self.project_url(&format!("/translations/builds/files/{}", file_id)))
            .json(&json!({ "targetLanguageId": locale }));
        let build = self.send(request).await?;
        self.follow(Self::download_url(&build)?).await
    }

    async fn download_source_content(&self, file_id: &str) -> ProviderResult<Value> {
        let request = self
            .http
            .get(self.project_url(&format!("/files/{}/download", file_id)));
        let download = self.send(request).await?;
        self.follow(Self::download_url(&download)?).await
    }

    async fn create_file(
        &self,
        name: &str,
        content: &Value,
        directory_id: Option<&str>,
    ) -> ProviderResult<FileMeta> {
        let storage_id = self.add_storage(name, content).await?;
        let mut body = json!({ "storageId": storage_id, "name": name });
        if let Some(directory_id) = directory_id {
            body["directoryId"] = id_value(directory_id);
        }

        let request = self.http.post(self.project_url("/files")).json(&body);
        let created = self.send_as(request).await;
        self.refresh_files();
        created
    }

    async fn update_file(&self, file_id: &str, content: &Value) -> ProviderResult<FileMeta> {
        let name = format!("{}.json", file_id);
        let storage_id = self.add_storage(&name, content).await?;
        let body = json!({ "storageId": storage_id, "updateOption": Self::UPDATE_OPTION });

        let request = self
            .http
            .put(self.project_url(&format!("/files/{}", file_id)))
            .json(&body);
        let updated = self.send_as(request).await;
        self.refresh_files();
        updated
    }

    async fn delete_file(&self, file_id: &str) -> ProviderResult<()> {
        let request = self
            .http
            .delete(self.project_url(&format!("/files/{}", file_id)));
        let deleted = self.send(request).await.map(|_| ());
        self.refresh_files();
        deleted
    }

    async fn find_directory_by_name(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> ProviderResult<Option<DirectoryId>> {
        let url = self.url_with_params(
            "/directories",
            &[
                ("filter", name.to_string()),
                ("limit", Self::PAGE_SIZE.to_string()),
            ],
        )?;
        let directories: Vec<DirectoryMeta> = self.send_as(self.http.get(url)).await?;
        Ok(directories
            .into_iter()
            .find(|dir| dir.name == name && dir.parent_id.as_deref() == parent_id)
            .map(|dir| dir.id))
    }

    async fn create_directory(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> ProviderResult<DirectoryId> {
        let mut body = json!({ "name": name });
        if let Some(parent_id) = parent_id {
            body["directoryId"] = id_value(parent_id);
        }
        let request = self.http.post(self.project_url("/directories")).json(&body);
        let created = self.send(request).await?;
        created
            .get("id")
            .and_then(value_to_id)
            .ok_or_else(|| ProviderError::local("Directory response has no id"))
    }

    async fn source_string(&self, string_id: &str) -> ProviderResult<SourceString> {
        let request = self
            .http
            .get(self.project_url(&format!("/strings/{}", string_id)));
        self.send_as(request).await
    }

    async fn translation(&self, translation_id: &str) -> ProviderResult<TranslationUnit> {
        let request = self
            .http
            .get(self.project_url(&format!("/translations/{}", translation_id)));
        self.send_as(request).await
    }

    fn begin_operation(&self) {
        self.refresh_files();
    }

    fn provider_name(&self) -> &str {
        "Crowdin"
    }
}
