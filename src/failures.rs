//! Collects per-item failures while a batch keeps going

use std::collections::BTreeMap;
use std::fmt::Display;

use crate::error::FilesError;

/// Records failures keyed by item without interrupting the caller's loop
///
/// # Example
///
/// ```
/// use tms_sync::failures::FailureCollector;
///
/// let mut failures = FailureCollector::new();
/// for id in ["1", "2"] {
///     let result: Result<(), String> = if id == "2" { Err("gone".into()) } else { Ok(()) };
///     failures.capture(id, result);
/// }
/// let error = failures.into_error().unwrap();
/// assert!(error.contains("2"));
/// ```
#[derive(Debug, Default)]
pub struct FailureCollector {
    errors_by_item: BTreeMap<String, String>,
}

impl FailureCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure for an item; a later failure for the same item wins
    pub fn record(&mut self, item: impl Into<String>, error: impl Display) {
        self.errors_by_item.insert(item.into(), error.to_string());
    }

    /// Unwrap a result, recording the error under `item` when it failed
    pub fn capture<T, E: Display>(&mut self, item: impl Into<String>, result: Result<T, E>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.record(item, error);
                None
            }
        }
    }

    /// Fold in failures collected elsewhere
    pub fn absorb(&mut self, error: FilesError) {
        self.errors_by_item.extend(error.errors_by_item);
    }

    /// Fold in failures of one locale, keying each item as `"{item} [{locale}]"`
    pub fn absorb_for_locale(&mut self, error: FilesError, locale: &str) {
        for (item, message) in error.errors_by_item {
            self.errors_by_item.insert(format!("{} [{}]", item, locale), message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors_by_item.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors_by_item.len()
    }

    /// `None` when nothing failed
    pub fn into_error(self) -> Option<FilesError> {
        if self.errors_by_item.is_empty() {
            None
        } else {
            Some(FilesError::new(self.errors_by_item))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;

    #[test]
    fn test_empty_collector_has_no_error() {
        assert!(FailureCollector::new().into_error().is_none());
    }

    #[test]
    fn test_capture_passes_success_through() {
        let mut failures = FailureCollector::new();
        let value: Option<u32> = failures.capture("1", Ok::<_, ProviderError>(5));
        assert_eq!(value, Some(5));
        assert!(failures.is_empty());
    }

    #[test]
    fn test_capture_records_failure_message() {
        let mut failures = FailureCollector::new();
        let value: Option<()> = failures.capture("12", Err(ProviderError::new(404, "not found")));
        assert!(value.is_none());
        let error = failures.into_error().unwrap();
        assert_eq!(error.errors_by_item["12"], "404: not found");
    }

    #[test]
    fn test_absorb_merges() {
        let mut failures = FailureCollector::new();
        failures.record("a", "first");
        failures.absorb(FilesError::single("b", "second"));
        assert_eq!(failures.len(), 2);
    }

    #[test]
    fn test_absorb_for_locale_keeps_each_locale() {
        let mut failures = FailureCollector::new();
        failures.absorb_for_locale(FilesError::single("7", "500: boom"), "es");
        failures.absorb_for_locale(FilesError::single("7", "502: gateway"), "fr");

        let error = failures.into_error().unwrap();
        assert_eq!(error.len(), 2);
        assert_eq!(error.errors_by_item["7 [es]"], "500: boom");
        assert_eq!(error.errors_by_item["7 [fr]"], "502: gateway");
    }
}
