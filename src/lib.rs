//! Synchronization of translatable entity attributes with a translation
//! management service.
//!
//! Application records ("entities") carry attributes written in a default
//! locale. This crate keeps them in step with a remote translation service:
//!
//! * source values are uploaded to one remote file per entity, with the
//!   entity's modification time as revision so stale uploads are skipped
//!   ([`upload`], [`duplicates`])
//! * translations are exported per locale, resolved to the latest revision of
//!   each attribute and written back to storage ([`sync`], [`upsert`])
//! * remote files of entities synced in every target locale are removed
//!
//! The remote service sits behind [`provider::TranslationProvider`] and the
//! application's storage behind [`storage::TranslationStore`].
//! [`service::SyncService`] ties both to a [`config::SyncConfig`].

pub mod config;
pub mod content;
pub mod duplicates;
pub mod entity;
pub mod error;
pub mod failures;
pub mod hooks;
pub mod provider;
pub mod scheduler;
pub mod sentences;
pub mod service;
pub mod storage;
pub mod sync;
pub mod upload;
pub mod upsert;


pub use config::SyncConfig;
pub use content::{AttributeMap, Translations};
pub use entity::{EntityRecord, EntityRef, Revision};
pub use error::{FilesError, ProviderError, SyncError, SyncResult};
pub use provider::{CrowdinClient, MockProvider, TranslationProvider};
pub use service::{SyncService, UploadOptions};
pub use storage::{MemoryStore, TranslationStore};
pub use sync::{SyncFilter, SyncMode, SyncReport};
pub use upload::{UploadOutcome, UploadRequest};
