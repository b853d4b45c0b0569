//! Incremental refresh: file-system events are debounced into bounded
//! re-embedding batches.

use anyhow::Result;
use async_trait::async_trait;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::indexer::RefreshOutcome;
use crate::path::RepoPaths;
use crate::retrieval::Retriever;

/// Re-embeds a batch of root-relative paths and drops stale snapshots.
#[async_trait]
pub trait Refresher: Send + Sync {
    async fn refresh(&self, rel_paths: &[String]) -> Result<RefreshOutcome>;
}

#[async_trait]
impl Refresher for Retriever {
    async fn refresh(&self, rel_paths: &[String]) -> Result<RefreshOutcome> {
        self.refresh_paths(rel_paths).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerOptions {
    pub debounce: Duration,
    pub batch_size: usize,
}

impl TrackerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            debounce: Duration::from_millis(config.watch_debounce_ms),
            batch_size: config.watch_batch_size.max(1),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackerStatus {
    pub enabled: bool,
    pub pending: usize,
    pub flushes: u64,
    pub refreshed_files: u64,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Another flush holds the busy flag; `remaining` is still pending.
    Busy { remaining: usize },
    /// Nothing was pending.
    Idle,
    Flushed {
        outcome: RefreshOutcome,
        remaining: usize,
    },
    Failed {
        error: String,
        remaining: usize,
    },
}

impl FlushOutcome {
    fn remaining(&self) -> usize {
        match self {
            FlushOutcome::Busy { remaining }
            | FlushOutcome::Flushed { remaining, .. }
            | FlushOutcome::Failed { remaining, .. } => *remaining,
            FlushOutcome::Idle => 0,
        }
    }
}

struct Shared {
    paths: RepoPaths,
    refresher: Arc<dyn Refresher>,
    options: TrackerOptions,
    pending: Mutex<BTreeSet<String>>,
    busy: AtomicBool,
    enabled: AtomicBool,
    flushes: AtomicU64,
    refreshed: AtomicU64,
    last_error: Mutex<Option<String>>,
    wake: Notify,
    /// Signalled whenever the busy flag is released.
    idle: Notify,
}

impl Shared {
    async fn enqueue(&self, path: &Path) -> bool {
        let rel = match self.paths.relative(path) {
            Ok(rel) => rel,
            Err(err) => {
                tracing::debug!(
                    path = %path.display(),
                    error = %err,
                    "Ignoring change outside root"
                );
                return false;
            }
        };
        if rel == "." || rel.is_empty() || self.paths.is_ignored(&rel) {
            return false;
        }
        if self.paths.absolute(&rel).is_dir() {
            return false;
        }
        self.pending.lock().await.insert(rel);
        self.wake.notify_one();
        true
    }

    async fn flush(&self) -> FlushOutcome {
        if self.busy.swap(true, Ordering::SeqCst) {
            let remaining = self.pending.lock().await.len();
            return FlushOutcome::Busy { remaining };
        }
        let batch: Vec<String> = {
            let mut pending = self.pending.lock().await;
            let batch: Vec<String> = pending
                .iter()
                .take(self.options.batch_size)
                .cloned()
                .collect();
            for path in &batch {
                pending.remove(path);
            }
            batch
        };
        if batch.is_empty() {
            self.release();
            return FlushOutcome::Idle;
        }

        let result = self.refresher.refresh(&batch).await;
        let remaining = self.pending.lock().await.len();
        self.flushes.fetch_add(1, Ordering::SeqCst);
        let outcome = match result {
            Ok(outcome) => {
                self.refreshed
                    .fetch_add(outcome.refreshed as u64, Ordering::SeqCst);
                tracing::debug!(
                    files = batch.len(),
                    embedded = outcome.embedded,
                    remaining,
                    "Refreshed changed files"
                );
                FlushOutcome::Flushed { outcome, remaining }
            }
            Err(err) => {
                let error = format!("{err:#}");
                tracing::warn!(
                    files = batch.len(),
                    error = %error,
                    "Refresh of changed files failed"
                );
                *self.last_error.lock().await = Some(error.clone());
                FlushOutcome::Failed { error, remaining }
            }
        };
        self.release();
        outcome
    }

    fn release(&self) {
        self.busy.store(false, Ordering::SeqCst);
        self.idle.notify_one();
    }

    /// Waits for a first event, then for a quiet period, then flushes until
    /// nothing is pending.
    async fn debounce_loop(self: Arc<Self>) {
        loop {
            self.wake.notified().await;
            while tokio::time::timeout(self.options.debounce, self.wake.notified())
                .await
                .is_ok()
            {}
            loop {
                let outcome = self.flush().await;
                if outcome.remaining() == 0 {
                    break;
                }
                if matches!(outcome, FlushOutcome::Busy { .. }) {
                    self.idle.notified().await;
                }
            }
        }
    }
}

/// Tracks changed files and keeps the disk cache current in the background.
pub struct RefreshTracker {
    shared: Arc<Shared>,
    tasks: Vec<JoinHandle<()>>,
    /// Dropping the watcher stops event delivery.
    _watcher: std::sync::Mutex<Option<RecommendedWatcher>>,
}

impl RefreshTracker {
    /// A tracker fed only through [`enqueue`](Self::enqueue).
    pub fn new(paths: RepoPaths, refresher: Arc<dyn Refresher>, options: TrackerOptions) -> Self {
        let shared = Arc::new(Shared {
            paths,
            refresher,
            options,
            pending: Mutex::new(BTreeSet::new()),
            busy: AtomicBool::new(false),
            enabled: AtomicBool::new(true),
            flushes: AtomicU64::new(0),
            refreshed: AtomicU64::new(0),
            last_error: Mutex::new(None),
            wake: Notify::new(),
            idle: Notify::new(),
        });
        let task = tokio::spawn(Arc::clone(&shared).debounce_loop());
        Self {
            shared,
            tasks: vec![task],
            _watcher: std::sync::Mutex::new(None),
        }
    }

    /// Watches the root recursively. If the watcher cannot be set up the
    /// tracker still exists but reports itself disabled.
    pub fn start(paths: RepoPaths, refresher: Arc<dyn Refresher>, options: TrackerOptions) -> Self {
        let root = paths.root().to_path_buf();
        let mut tracker = Self::new(paths, refresher, options);
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();

        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(err) => tracing::warn!(error = %err, "File watcher error"),
            },
            notify::Config::default(),
        )
        .and_then(|mut watcher| {
            watcher.watch(&root, RecursiveMode::Recursive)?;
            Ok(watcher)
        });

        match watcher {
            Ok(watcher) => {
                let shared = Arc::clone(&tracker.shared);
                tracker.tasks.push(tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        if event.kind.is_access() {
                            continue;
                        }
                        for path in &event.paths {
                            shared.enqueue(path).await;
                        }
                    }
                }));
                tracker._watcher = std::sync::Mutex::new(Some(watcher));
                tracing::info!(root = %root.display(), "Watching for file changes");
            }
            Err(err) => {
                tracker.shared.enabled.store(false, Ordering::SeqCst);
                tracing::warn!(
                    root = %root.display(),
                    error = %err,
                    "File watcher unavailable, change tracking disabled"
                );
            }
        }
        tracker
    }

    /// Queues a changed path, absolute or root-relative. Returns false when
    /// it is outside the root, ignored, or a directory.
    pub async fn enqueue(&self, path: impl AsRef<Path>) -> bool {
        self.shared.enqueue(path.as_ref()).await
    }

    /// Runs one flush right away, honoring the busy flag.
    pub async fn flush_now(&self) -> FlushOutcome {
        self.shared.flush().await
    }

    pub async fn status(&self) -> TrackerStatus {
        TrackerStatus {
            enabled: self.shared.enabled.load(Ordering::SeqCst),
            pending: self.shared.pending.lock().await.len(),
            flushes: self.shared.flushes.load(Ordering::SeqCst),
            refreshed_files: self.shared.refreshed.load(Ordering::SeqCst),
            last_error: self.shared.last_error.lock().await.clone(),
        }
    }
}

impl Drop for RefreshTracker {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recording {
        batches: StdMutex<Vec<Vec<String>>>,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl Refresher for Recording {
        async fn refresh(&self, rel_paths: &[String]) -> Result<RefreshOutcome> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.batches.lock().unwrap().push(rel_paths.to_vec());
            Ok(RefreshOutcome {
                refreshed: rel_paths.len(),
                ..RefreshOutcome::default()
            })
        }
    }

    fn repo() -> (TempDir, RepoPaths) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        let paths = RepoPaths::new(dir.path(), &["node_modules".to_string()]);
        (dir, paths)
    }

    fn options(batch_size: usize, debounce_ms: u64) -> TrackerOptions {
        TrackerOptions {
            debounce: Duration::from_millis(debounce_ms),
            batch_size,
        }
    }

    #[tokio::test]
    async fn rejects_ignored_outside_and_directory_paths() {
        let (dir, paths) = repo();
        let refresher = Arc::new(Recording::default());
        let tracker = RefreshTracker::new(paths, refresher, options(8, 60_000));
        assert!(tracker.enqueue("src/lib.rs").await);
        assert!(tracker.enqueue(dir.path().join("src/main.rs")).await);
        assert!(!tracker.enqueue("node_modules/x/index.js").await);
        assert!(!tracker.enqueue("/somewhere/else.rs").await);
        assert!(!tracker.enqueue("src").await);
        assert_eq!(tracker.status().await.pending, 2);
    }

    #[tokio::test]
    async fn flushes_in_bounded_batches() {
        let (_dir, paths) = repo();
        let refresher = Arc::new(Recording::default());
        let tracker = RefreshTracker::new(paths, refresher.clone(), options(2, 60_000));
        for name in ["a.rs", "b.rs", "c.rs"] {
            tracker.enqueue(format!("src/{name}")).await;
        }
        let first = tracker.flush_now().await;
        assert!(matches!(first, FlushOutcome::Flushed { remaining: 1, .. }));
        let second = tracker.flush_now().await;
        assert!(matches!(second, FlushOutcome::Flushed { remaining: 0, .. }));
        assert_eq!(tracker.flush_now().await, FlushOutcome::Idle);
        assert_eq!(
            *refresher.batches.lock().unwrap(),
            vec![
                vec!["src/a.rs".to_string(), "src/b.rs".to_string()],
                vec!["src/c.rs".to_string()]
            ]
        );
        let status = tracker.status().await;
        assert_eq!(status.flushes, 2);
        assert_eq!(status.refreshed_files, 3);
    }

    #[tokio::test]
    async fn busy_flag_blocks_reentrant_flushes() {
        let (_dir, paths) = repo();
        let gate = Arc::new(Notify::new());
        let refresher = Arc::new(Recording {
            gate: Some(gate.clone()),
            ..Recording::default()
        });
        let tracker = Arc::new(RefreshTracker::new(paths, refresher, options(8, 60_000)));
        tracker.enqueue("src/a.rs").await;

        let running = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move { tracker.flush_now().await })
        };
        while !tracker.shared.busy.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        tracker.enqueue("src/b.rs").await;
        assert_eq!(
            tracker.flush_now().await,
            FlushOutcome::Busy { remaining: 1 }
        );

        gate.notify_one();
        let outcome = running.await.unwrap();
        assert!(matches!(outcome, FlushOutcome::Flushed { remaining: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn drain_resumes_once_a_manual_flush_finishes() {
        let (_dir, paths) = repo();
        let gate = Arc::new(Notify::new());
        let refresher = Arc::new(Recording {
            gate: Some(gate.clone()),
            ..Recording::default()
        });
        let tracker = Arc::new(RefreshTracker::new(
            paths,
            refresher.clone(),
            options(1, 100),
        ));
        tracker.enqueue("src/a.rs").await;
        let running = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move { tracker.flush_now().await })
        };
        while !tracker.shared.busy.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        tracker.enqueue("src/b.rs").await;

        // The debounce fires while the manual flush still holds the flag.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(refresher.batches.lock().unwrap().is_empty());
        assert_eq!(tracker.status().await.pending, 1);

        gate.notify_one();
        running.await.unwrap();
        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            *refresher.batches.lock().unwrap(),
            vec![vec!["src/a.rs".to_string()], vec!["src/b.rs".to_string()]]
        );
        assert_eq!(tracker.status().await.pending, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_waits_for_quiet_then_drains() {
        let (_dir, paths) = repo();
        let refresher = Arc::new(Recording::default());
        let tracker = RefreshTracker::new(paths, refresher.clone(), options(1, 500));

        tracker.enqueue("src/a.rs").await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        tracker.enqueue("src/b.rs").await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        // timer restarted by the second event
        assert!(refresher.batches.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(refresher.batches.lock().unwrap().len(), 2);
        assert_eq!(tracker.status().await.pending, 0);
    }
}
