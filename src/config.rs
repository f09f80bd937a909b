//! Configuration loaded from a TOML file
//!
//! ```toml
//! default_locale = "en"
//! target_locales = ["es", "fr"]
//! batch_size = 500
//! upload_delay_secs = 300
//! duplicate_handling = true
//!
//! [provider]
//! project_id = "42"
//! base_url = "https://api.crowdin.com"
//!
//! [entities."Blog::Post"]
//! namespace = ["blog"]
//! attributes = { title = {}, body = { split_into_sentences = true } }
//! ```
//!
//! The API token is usually left out of the file and supplied through the
//! `TMS_API_TOKEN` environment variable.

use std::collections::BTreeMap;
use std::path::Path;

use icu_locale::Locale;
use serde::{Deserialize, Serialize};

use crate::content::AttributeOptions;
use crate::error::{SyncError, SyncResult};
use crate::sync::DEFAULT_BATCH_SIZE;

/// Environment variable overriding `provider.api_token`
pub const API_TOKEN_ENV: &str = "TMS_API_TOKEN";

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_upload_delay_secs() -> u64 {
    300
}

fn default_base_url() -> String {
    "https://api.crowdin.com".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Connection settings for the translation service
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_token: String,
    pub project_id: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_token", &"***")
            .field("project_id", &self.project_id)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Upload settings for one entity type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityConfig {
    /// Translatable attributes and how to upload them
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeOptions>,
    /// Directory path of the remote files, outermost first
    #[serde(default)]
    pub namespace: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Locale the source values are written in
    pub default_locale: String,
    pub target_locales: Vec<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Delay before a scheduled upload runs
    #[serde(default = "default_upload_delay_secs")]
    pub upload_delay_secs: u64,
    /// Copy existing translations of identical values before uploading
    #[serde(default)]
    pub duplicate_handling: bool,
    pub provider: ProviderConfig,
    /// Entity type → upload settings
    #[serde(default)]
    pub entities: BTreeMap<String, EntityConfig>,
}

impl SyncConfig {
    /// Load, apply the environment override and validate
    pub fn from_file(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)?
            .with_api_token_override(std::env::var(API_TOKEN_ENV).ok())
            .validated()
    }

    /// Parse without validating
    pub fn from_toml_str(text: &str) -> SyncResult<Self> {
        toml::from_str(text).map_err(|e| SyncError::Config(e.to_string()))
    }

    /// Replace the API token when an override is present and not blank
    pub fn with_api_token_override(mut self, token: Option<String>) -> Self {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.provider.api_token = token;
        }
        self
    }

    /// Canonicalize locales and check the numeric settings
    pub fn validated(mut self) -> SyncResult<Self> {
        self.default_locale = canonical_locale(&self.default_locale)?;
        self.target_locales = self
            .target_locales
            .iter()
            .map(|locale| canonical_locale(locale))
            .collect::<SyncResult<_>>()?;
        if self.batch_size == 0 {
            return Err(SyncError::Config("batch_size must be positive".to_string()));
        }
        if self.provider.project_id.trim().is_empty() {
            return Err(SyncError::Config("provider.project_id is required".to_string()));
        }
        Ok(self)
    }

    /// Target locales without the default locale, in configured order
    pub fn target_locales(&self) -> Vec<String> {
        let mut locales: Vec<String> = Vec::new();
        for locale in &self.target_locales {
            if *locale != self.default_locale && !locales.contains(locale) {
                locales.push(locale.clone());
            }
        }
        locales
    }

    pub fn entity(&self, entity_type: &str) -> Option<&EntityConfig> {
        self.entities.get(entity_type)
    }
}

/// Canonical form of a BCP 47 locale, e.g. `EN_us` → `en-US`
pub fn canonical_locale(locale: &str) -> SyncResult<String> {
    let parsed: Locale = locale
        .replace('_', "-")
        .parse()
        .map_err(|e| SyncError::Config(format!("invalid locale '{}': {:?}", locale, e)))?;
    Ok(parsed.to_string())
}

/// Language subtag of a locale, `None` when it does not parse
pub fn language_of(locale: &str) -> Option<String> {
    let parsed: Locale = locale.replace('_', "-").parse().ok()?;
    Some(parsed.id.language.as_str().to_string())
}
