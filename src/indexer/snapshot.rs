use anyhow::Result;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

struct Snapshot<T> {
    value: Arc<T>,
    built_at: Instant,
    root_key: PathBuf,
}

/// A read-only in-memory snapshot with a time-to-live.
///
/// Rebuilding replaces the snapshot wholesale; readers holding the previous
/// `Arc` keep a consistent view. Concurrent callers during a rebuild wait on
/// the same build instead of starting another.
pub struct SnapshotCache<T> {
    ttl: Duration,
    root_key: PathBuf,
    slot: Mutex<Option<Snapshot<T>>>,
}

impl<T> SnapshotCache<T> {
    pub fn new(root_key: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            ttl,
            root_key: root_key.into(),
            slot: Mutex::new(None),
        }
    }

    pub fn root_key(&self) -> &Path {
        &self.root_key
    }

    pub async fn get_or_build<F, Fut>(&self, build: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(snapshot) = slot.as_ref() {
            if snapshot.root_key == self.root_key && snapshot.built_at.elapsed() < self.ttl {
                return Ok(Arc::clone(&snapshot.value));
            }
        }
        let value = Arc::new(build().await?);
        *slot = Some(Snapshot {
            value: Arc::clone(&value),
            built_at: Instant::now(),
            root_key: self.root_key.clone(),
        });
        Ok(value)
    }

    /// The current snapshot, fresh or not, without building.
    pub async fn peek(&self) -> Option<(Arc<T>, Duration)> {
        self.slot
            .lock()
            .await
            .as_ref()
            .map(|s| (Arc::clone(&s.value), s.built_at.elapsed()))
    }

    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}
