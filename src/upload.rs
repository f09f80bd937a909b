//! Source upload engine
//!
//! Uploads the source-locale attributes of one entity to its remote file.
//! The file is created on first upload and replaced afterwards, unless the
//! remote copy already holds the same or a newer revision. That rule makes
//! repeated or delayed uploads of the same edit harmless.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::content::{self, AttributeMap, AttributeOptions, EntityContent};
use crate::entity::{EntityRef, Revision};
use crate::error::{FilesError, ProviderResult, SyncResult};
use crate::provider::{DirectoryId, TranslationProvider};

/// Everything needed to upload one entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub entity: EntityRef,
    /// Modification time of the entity, when it tracks one
    pub revision: Option<Revision>,
    /// Source-locale attribute values to upload
    pub attributes: AttributeMap,
    pub options: BTreeMap<String, AttributeOptions>,
    /// Directory path for a newly created file, outermost first
    pub namespace: Vec<String>,
}

impl UploadRequest {
    pub fn new(entity: EntityRef, revision: Option<Revision>, attributes: AttributeMap) -> Self {
        Self {
            entity,
            revision,
            attributes,
            options: BTreeMap::new(),
            namespace: Vec::new(),
        }
    }

    /// Upload an attribute as a list of sentences
    pub fn split_attribute(mut self, attribute: &str) -> Self {
        self.options.insert(
            attribute.to_string(),
            AttributeOptions {
                split_into_sentences: true,
            },
        );
        self
    }

    pub fn with_options(mut self, options: BTreeMap<String, AttributeOptions>) -> Self {
        self.options = options;
        self
    }

    pub fn with_namespace(mut self, namespace: Vec<String>) -> Self {
        self.namespace = namespace;
        self
    }
}

/// What an upload did remotely
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Nothing to upload
    Skipped,
    Created { file_id: String },
    Updated { file_id: String },
    /// The remote file already holds this revision or a newer one
    Unchanged { file_id: String },
}

impl UploadOutcome {
    /// Whether the upload changed remote state
    pub fn wrote(&self) -> bool {
        matches!(self, UploadOutcome::Created { .. } | UploadOutcome::Updated { .. })
    }
}

impl fmt::Display for UploadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadOutcome::Skipped => write!(f, "skipped"),
            UploadOutcome::Created { file_id } => write!(f, "created file {}", file_id),
            UploadOutcome::Updated { file_id } => write!(f, "updated file {}", file_id),
            UploadOutcome::Unchanged { file_id } => write!(f, "file {} already up to date", file_id),
        }
    }
}

/// Uploads entity snapshots to their remote files
pub struct SourceUploader {
    provider: Arc<dyn TranslationProvider>,
}

impl SourceUploader {
    pub fn new(provider: Arc<dyn TranslationProvider>) -> Self {
        Self { provider }
    }

    /// Upload one entity
    ///
    /// # Errors
    ///
    /// Provider errors are returned as soon as they happen. An existing file
    /// that does not contain the entity is reported as a [`FilesError`] keyed
    /// by the file id.
    pub async fn upload(&self, request: &UploadRequest) -> SyncResult<UploadOutcome> {
        if request.attributes.is_empty() {
            debug!(entity = %request.entity, "no attributes to upload");
            return Ok(UploadOutcome::Skipped);
        }
        self.provider.begin_operation();

        let entity = &request.entity;
        let snapshot = content::build_source_snapshot(
            entity,
            request.revision,
            &request.attributes,
            &request.options,
        );

        let Some(file_id) = self.provider.find_file_by_base_name(&entity.base_name()).await? else {
            let directory_id = self.resolve_directory(&request.namespace).await?;
            let meta = self
                .provider
                .create_file(&entity.file_name(), &snapshot, directory_id.as_deref())
                .await?;
            info!(entity = %entity, file_id = %meta.id, "created source file");
            return Ok(UploadOutcome::Created { file_id: meta.id });
        };

        if let Some(revision) = request.revision {
            let stored = self.provider.download_source_content(&file_id).await?;
            let Some(entity_value) = content::entity_content(&stored, entity) else {
                return Err(FilesError::single(
                    file_id,
                    format!("Could not find {} {}", entity.entity_type, entity.entity_id),
                )
                .into());
            };
            let stored_revision = EntityContent::parse(entity, entity_value)?.max_revision();
            if let Some(stored_revision) = stored_revision {
                if revision <= stored_revision {
                    debug!(
                        entity = %entity,
                        revision,
                        stored_revision,
                        "remote file is up to date"
                    );
                    return Ok(UploadOutcome::Unchanged { file_id });
                }
            }
        }

        self.provider.update_file(&file_id, &snapshot).await?;
        info!(entity = %entity, file_id = %file_id, "updated source file");
        Ok(UploadOutcome::Updated { file_id })
    }

    /// Find or create the nested directory for a namespace
    ///
    /// Each segment is looked up under the previous one and created when
    /// missing. An empty namespace means the project root.
    async fn resolve_directory(&self, namespace: &[String]) -> ProviderResult<Option<DirectoryId>> {
        let mut parent: Option<DirectoryId> = None;
        for segment in namespace {
            let found = self
                .provider
                .find_directory_by_name(segment, parent.as_deref())
                .await?;
            let id = match found {
                Some(id) => id,
                None => {
                    let id = self
                        .provider
                        .create_directory(segment, parent.as_deref())
                        .await?;
                    debug!(directory = %segment, id = %id, "created directory");
                    id
                }
            };
            parent = Some(id);
        }
        Ok(parent)
    }
}
