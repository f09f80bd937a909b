/// Translation Management Service providers
///
/// The sync engines never talk HTTP directly. They go through the
/// [`TranslationProvider`] trait, which exposes the handful of file, directory
/// and string operations the synchronization needs.
///
/// # Overview
///
/// 1. **Provider trait** - [`TranslationProvider`] and the value types it returns
/// 2. **Envelope handling** - flattening of nested `data` envelopes and error parsing
/// 3. **Crowdin client** - [`CrowdinClient`], a `reqwest` implementation of the v2 REST API
/// 4. **Mock provider** - [`MockProvider`], an in-memory project for tests and dry runs
///
/// # Example
///
/// ```ignore
/// use tms_sync::provider::{CrowdinClient, TranslationProvider};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = CrowdinClient::new("token", "42", "https://api.crowdin.com")?;
///     for file in client.list_files().await? {
///         println!("{} {}", file.id, file.name);
///     }
///     Ok(())
/// }
/// ```
pub mod crowdin;
pub mod envelope;
pub mod mock;
pub mod traits;

pub use crowdin::CrowdinClient;
pub use envelope::flatten;
pub use mock::{MockProvider, Operation, ProviderCall};
pub use traits::{
    ApprovalInfo, DirectoryId, DirectoryMeta, FileId, FileMeta, SourceString, TranslationProvider,
    TranslationUnit,
};
