//! Delayed job scheduling
//!
//! Uploads triggered by writes are not run right away. They are scheduled
//! after a delay so that several quick edits of the same entity end up as a
//! single upload.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

/// A unit of scheduled work
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Runs jobs later
pub trait JobScheduler: Send + Sync {
    /// Run `job` after `delay`; `key` identifies what the job is about
    fn schedule(&self, key: String, delay: Duration, job: Job);
}

/// In-process scheduler where the latest job per key wins
///
/// Scheduling a job for a key that already has a pending job supersedes the
/// pending one: when the older job's delay expires it is dropped without
/// running. Must be used from within a tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct DebouncedScheduler {
    /// Generation of the pending job per key
    generations: Arc<Mutex<HashMap<String, u64>>>,
    /// Shared by all keys and never reset, so a generation is never reused
    next_generation: Arc<AtomicU64>,
}

impl DebouncedScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn generations(&self) -> MutexGuard<'_, HashMap<String, u64>> {
        self.generations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedule a job and return a handle resolving to whether it ran
    pub fn schedule_job(&self, key: String, delay: Duration, job: Job) -> JoinHandle<bool> {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        self.generations().insert(key.clone(), generation);

        let generations = self.generations.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let current = {
                let mut generations = generations.lock().unwrap_or_else(PoisonError::into_inner);
                let current = generations.get(&key) == Some(&generation);
                if current {
                    generations.remove(&key);
                }
                current
            };
            if !current {
                debug!(key = %key, "superseded job dropped");
                return false;
            }

            job.await;
            true
        })
    }

    /// Keys with a job waiting to run
    pub fn pending(&self) -> usize {
        self.generations().len()
    }
}

impl JobScheduler for DebouncedScheduler {
    fn schedule(&self, key: String, delay: Duration, job: Job) {
        debug!(key = %key, delay_secs = delay.as_secs(), "job scheduled");
        drop(self.schedule_job(key, delay, job));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_job(counter: &Arc<AtomicUsize>) -> Job {
        let counter = counter.clone();
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_job_runs_after_delay() {
        let scheduler = DebouncedScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let handle = scheduler.schedule_job("Post 1".to_string(), Duration::from_millis(5), counting_job(&counter));
        assert_eq!(scheduler.pending(), 1);
        assert!(handle.await.unwrap());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test]
    async fn test_latest_schedule_wins() {
        let scheduler = DebouncedScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let first = scheduler.schedule_job("Post 1".to_string(), Duration::from_millis(5), counting_job(&counter));
        let second = scheduler.schedule_job("Post 1".to_string(), Duration::from_millis(20), counting_job(&counter));

        assert!(!first.await.unwrap());
        assert!(second.await.unwrap());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let scheduler = DebouncedScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let a = scheduler.schedule_job("Post 1".to_string(), Duration::from_millis(5), counting_job(&counter));
        let b = scheduler.schedule_job("Post 2".to_string(), Duration::from_millis(5), counting_job(&counter));

        assert!(a.await.unwrap());
        assert!(b.await.unwrap());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_superseded_job_never_replaces_a_later_one() {
        let scheduler = DebouncedScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let key = "Post 1".to_string();

        let slow = scheduler.schedule_job(key.clone(), Duration::from_millis(100), counting_job(&counter));
        let quick = scheduler.schedule_job(key.clone(), Duration::from_millis(5), counting_job(&counter));
        assert!(quick.await.unwrap());
        assert_eq!(scheduler.pending(), 0);

        let latest = scheduler.schedule_job(key, Duration::from_millis(300), counting_job(&counter));
        assert!(!slow.await.unwrap());
        assert_eq!(scheduler.pending(), 1);
        assert!(latest.await.unwrap());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
