//! Write-path hooks
//!
//! The application calls [`WritePath::before_write`] whenever it is about to
//! store a translatable attribute value. Registered [`WriteHook`]s see the
//! write and react to it:
//!
//! * [`UploadOnWrite`] schedules an upload of the entity when its source text
//!   changes
//! * [`WriteCallback`] hands translated writes to an injected handler
//!
//! # Example
//!
//! ```ignore
//! let mut write_path = WritePath::new();
//! write_path.register(Arc::new(UploadOnWrite::new(service, scheduler)));
//! write_path.before_write(&WriteEvent::new(entity, "en", "title", Some("Old"), Some("New")));
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::language_of;
use crate::entity::EntityRef;
use crate::scheduler::JobScheduler;
use crate::service::{SyncService, UploadOptions};

/// A pending write of one attribute value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteEvent {
    pub entity: EntityRef,
    pub locale: String,
    pub attribute: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl WriteEvent {
    pub fn new(
        entity: EntityRef,
        locale: &str,
        attribute: &str,
        old_value: Option<&str>,
        new_value: Option<&str>,
    ) -> Self {
        Self {
            entity,
            locale: locale.to_string(),
            attribute: attribute.to_string(),
            old_value: old_value.map(str::to_string),
            new_value: new_value.map(str::to_string),
        }
    }

    pub fn is_change(&self) -> bool {
        self.old_value != self.new_value
    }

    /// The entity has been persisted and has an id
    pub fn has_id(&self) -> bool {
        !self.entity.entity_id.trim().is_empty()
    }
}

/// Extension point called before a value is written
pub trait WriteHook: Send + Sync {
    fn before_write(&self, event: &WriteEvent);
}

/// Hooks registered on the application's write path, run in order
#[derive(Default)]
pub struct WritePath {
    hooks: Vec<Arc<dyn WriteHook>>,
}

impl WritePath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: Arc<dyn WriteHook>) -> &mut Self {
        self.hooks.push(hook);
        self
    }

    pub fn before_write(&self, event: &WriteEvent) {
        for hook in &self.hooks {
            hook.before_write(event);
        }
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

/// Whether two locales share a language, ignoring region and script
fn same_language(a: &str, b: &str) -> bool {
    match (language_of(a), language_of(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

type Predicate = Box<dyn Fn(&WriteEvent) -> bool + Send + Sync>;
type NamespaceFn = Box<dyn Fn(&EntityRef) -> Vec<String> + Send + Sync>;

/// Schedules an upload when source text changes
///
/// A write triggers an upload when it is in the default locale (any region),
/// changes the value, targets an entity with an id, and passes the optional
/// predicate. The upload runs after the configured delay; later writes to the
/// same entity within the delay replace the pending upload.
pub struct UploadOnWrite {
    service: Arc<SyncService>,
    scheduler: Arc<dyn JobScheduler>,
    delay: Duration,
    predicate: Option<Predicate>,
    namespace: Option<NamespaceFn>,
}

impl UploadOnWrite {
    pub fn new(service: Arc<SyncService>, scheduler: Arc<dyn JobScheduler>) -> Self {
        let delay = Duration::from_secs(service.config().upload_delay_secs);
        Self {
            service,
            scheduler,
            delay,
            predicate: None,
            namespace: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Only upload writes the predicate accepts
    pub fn with_predicate(mut self, predicate: impl Fn(&WriteEvent) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Some(Box::new(predicate));
        self
    }

    /// Pick the remote directory per entity
    pub fn with_namespace(mut self, namespace: impl Fn(&EntityRef) -> Vec<String> + Send + Sync + 'static) -> Self {
        self.namespace = Some(Box::new(namespace));
        self
    }

    fn should_upload(&self, event: &WriteEvent) -> bool {
        same_language(&event.locale, &self.service.config().default_locale)
            && event.is_change()
            && event.has_id()
            && self.predicate.as_ref().map(|p| p(event)).unwrap_or(true)
    }
}

impl WriteHook for UploadOnWrite {
    fn before_write(&self, event: &WriteEvent) {
        if !self.should_upload(event) {
            return;
        }

        let entity = event.entity.clone();
        let options = UploadOptions {
            namespace: self.namespace.as_ref().map(|f| f(&entity)),
        };
        let service = self.service.clone();
        debug!(entity = %entity, attribute = %event.attribute, "scheduling upload");
        self.scheduler.schedule(
            entity.key(),
            self.delay,
            Box::pin(async move {
                // failures are logged by the service
                let _ = service.upload_source_strings(&entity, &options).await;
            }),
        );
    }
}

/// Passes changed non-default-locale writes to a handler
pub struct WriteCallback {
    default_locale: String,
    handler: Box<dyn Fn(&WriteEvent) + Send + Sync>,
}

impl WriteCallback {
    pub fn new(default_locale: &str, handler: impl Fn(&WriteEvent) + Send + Sync + 'static) -> Self {
        Self {
            default_locale: default_locale.to_string(),
            handler: Box::new(handler),
        }
    }
}

impl WriteHook for WriteCallback {
    fn before_write(&self, event: &WriteEvent) {
        if event.is_change() && !same_language(&event.locale, &self.default_locale) {
            (self.handler)(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::entity::EntityRecord;
    use crate::provider::MockProvider;
    use crate::scheduler::{DebouncedScheduler, Job};
    use crate::storage::MemoryStore;
    use std::sync::Mutex;

    /// Keeps scheduled jobs so a test can run them
    #[derive(Default)]
    struct RecordingScheduler {
        jobs: Mutex<Vec<(String, Duration, Job)>>,
    }

    impl RecordingScheduler {
        fn keys(&self) -> Vec<String> {
            self.jobs.lock().unwrap().iter().map(|(k, _, _)| k.clone()).collect()
        }

        async fn run_all(&self) {
            let jobs: Vec<_> = self.jobs.lock().unwrap().drain(..).collect();
            for (_, _, job) in jobs {
                job.await;
            }
        }
    }

    impl JobScheduler for RecordingScheduler {
        fn schedule(&self, key: String, delay: Duration, job: Job) {
            self.jobs.lock().unwrap().push((key, delay, job));
        }
    }

    const CONFIG: &str = r#"
default_locale = "en"
target_locales = ["en", "fr"]
upload_delay_secs = 60

[provider]
project_id = "1"
"#;

    fn setup() -> (Arc<MockProvider>, Arc<MemoryStore>, Arc<SyncService>) {
        let config = SyncConfig::from_toml_str(CONFIG).unwrap().validated().unwrap();
        let mock = Arc::new(MockProvider::new());
        let store = Arc::new(MemoryStore::new());
        let service = Arc::new(SyncService::new(mock.clone(), store.clone(), config));
        (mock, store, service)
    }

    fn post(id: &str) -> EntityRef {
        EntityRef::new("Post", id)
    }

    #[test]
    fn test_same_language_ignores_region() {
        assert!(same_language("en-GB", "en"));
        assert!(same_language("en", "en"));
        assert!(!same_language("fr", "en"));
    }

    #[test]
    fn test_upload_conditions() {
        let (_, _, service) = setup();
        let scheduler = Arc::new(RecordingScheduler::default());
        let hook = UploadOnWrite::new(service, scheduler.clone())
            .with_predicate(|event| event.attribute != "draft");

        hook.before_write(&WriteEvent::new(post("1"), "en-US", "title", Some("a"), Some("b")));
        // unchanged value
        hook.before_write(&WriteEvent::new(post("2"), "en", "title", Some("a"), Some("a")));
        // translated write
        hook.before_write(&WriteEvent::new(post("3"), "fr", "title", Some("a"), Some("b")));
        // no id yet
        hook.before_write(&WriteEvent::new(post(""), "en", "title", None, Some("b")));
        // rejected by predicate
        hook.before_write(&WriteEvent::new(post("5"), "en", "draft", None, Some("b")));

        assert_eq!(scheduler.keys(), vec!["Post 1"]);
        let delay = scheduler.jobs.lock().unwrap()[0].1;
        assert_eq!(delay, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_scheduled_upload_runs_with_namespace() {
        let (mock, store, service) = setup();
        store.insert(post("1"), EntityRecord::new(Some(10)).with_attribute("title", "Hello"));
        let scheduler = Arc::new(RecordingScheduler::default());
        let hook = UploadOnWrite::new(service, scheduler.clone())
            .with_namespace(|entity| vec![entity.entity_type.to_lowercase()]);

        let mut write_path = WritePath::new();
        write_path.register(Arc::new(hook));
        write_path.before_write(&WriteEvent::new(post("1"), "en", "title", None, Some("Hello")));
        scheduler.run_all().await;

        let files = mock.files();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "Post-1.json");
        assert_eq!(mock.directories()[0].name, "post");
    }

    #[tokio::test]
    async fn test_rapid_writes_upload_once() {
        let (mock, store, service) = setup();
        store.insert(post("1"), EntityRecord::new(Some(10)).with_attribute("title", "v3"));
        let scheduler = Arc::new(DebouncedScheduler::new());
        let hook = UploadOnWrite::new(service, scheduler.clone()).with_delay(Duration::from_millis(20));

        hook.before_write(&WriteEvent::new(post("1"), "en", "title", Some("v1"), Some("v2")));
        hook.before_write(&WriteEvent::new(post("1"), "en", "title", Some("v2"), Some("v3")));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(scheduler.pending(), 0);
        assert_eq!(mock.files().len(), 1);
        assert_eq!(mock.write_count(), 1);
    }

    #[test]
    fn test_write_callback_only_for_translated_changes() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback = WriteCallback::new("en", move |event| {
            sink.lock().unwrap().push(event.locale.clone());
        });

        let mut write_path = WritePath::new();
        write_path.register(Arc::new(callback));
        write_path.before_write(&WriteEvent::new(post("1"), "fr", "title", None, Some("Salut")));
        write_path.before_write(&WriteEvent::new(post("1"), "es", "title", Some("Hola"), Some("Hola")));
        write_path.before_write(&WriteEvent::new(post("1"), "en-GB", "title", None, Some("Hi")));

        assert_eq!(*seen.lock().unwrap(), vec!["fr"]);
        assert_eq!(write_path.len(), 1);
    }
}
