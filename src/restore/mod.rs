//! File snapshots taken before writes, restorable by id.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

use crate::path::RepoPaths;

const LOG_FILE: &str = "restore-points.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestorePoint {
    pub id: String,
    /// Unix milliseconds.
    pub timestamp: u64,
    pub files: Vec<String>,
    pub message: String,
}

/// Append-only log of restore points under `<cache_dir>/restore/`, capped at
/// `max_points` with the oldest evicted first.
pub struct RestoreStore {
    paths: RepoPaths,
    dir: PathBuf,
    max_points: usize,
    counter: AtomicU64,
    /// Serializes log read-modify-write.
    lock: Mutex<()>,
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl RestoreStore {
    pub fn new(paths: RepoPaths, cache_dir: &Path, max_points: usize) -> Self {
        Self {
            paths,
            dir: cache_dir.join("restore"),
            max_points: max_points.max(1),
            counter: AtomicU64::new(0),
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn log_path(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }

    fn point_dir(&self, id: &str) -> PathBuf {
        self.dir.join(id)
    }

    async fn load(&self) -> Vec<RestorePoint> {
        let path = self.log_path();
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "Failed to read restore log");
                return Vec::new();
            }
        };
        serde_json::from_slice(&bytes).unwrap_or_else(|err| {
            tracing::warn!(path = %path.display(), error = %err, "Corrupt restore log, starting empty");
            Vec::new()
        })
    }

    async fn save(&self, points: &[RestorePoint]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let path = self.log_path();
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(points).context("Failed to serialize restore log")?;
        tokio::fs::write(&tmp, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    /// Copies `files` (absolute or root-relative) aside and records them.
    pub async fn create(&self, files: &[String], message: &str) -> Result<RestorePoint> {
        if files.is_empty() {
            bail!("A restore point needs at least one file");
        }
        let mut rels = Vec::with_capacity(files.len());
        for file in files {
            let rel = self.paths.relative(Path::new(file))?;
            if !self.paths.absolute(&rel).is_file() {
                bail!("Not a file: {rel}");
            }
            if !rels.contains(&rel) {
                rels.push(rel);
            }
        }

        let _guard = self.lock.lock().await;
        let id = format!(
            "rp-{}-{}",
            unix_millis(),
            self.counter.fetch_add(1, Ordering::SeqCst)
        );
        let target = self.point_dir(&id);
        for rel in &rels {
            let dest = target.join(rel);
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            tokio::fs::copy(self.paths.absolute(rel), &dest)
                .await
                .with_context(|| format!("Failed to back up {rel}"))?;
        }

        let point = RestorePoint {
            id,
            timestamp: unix_millis(),
            files: rels,
            message: message.to_string(),
        };
        let mut points = self.load().await;
        points.push(point.clone());
        let excess = points.len().saturating_sub(self.max_points);
        for evicted in points.drain(..excess) {
            if let Err(err) = tokio::fs::remove_dir_all(self.point_dir(&evicted.id)).await {
                tracing::warn!(id = %evicted.id, error = %err, "Failed to remove evicted restore point");
            }
        }
        self.save(&points).await?;
        tracing::info!(id = %point.id, files = point.files.len(), "Restore point created");
        Ok(point)
    }

    /// Newest first.
    pub async fn list(&self) -> Vec<RestorePoint> {
        let mut points = self.load().await;
        points.reverse();
        points
    }

    /// Copies a restore point's files back over the tree. An unknown id is
    /// an error.
    pub async fn restore(&self, id: &str) -> Result<RestorePoint> {
        let _guard = self.lock.lock().await;
        let points = self.load().await;
        let Some(point) = points.into_iter().find(|p| p.id == id) else {
            bail!("Unknown restore point: {id}");
        };
        for rel in &point.files {
            self.paths
                .relative(Path::new(rel))
                .with_context(|| format!("Restore point {} names an unsafe path", point.id))?;
        }
        let source = self.point_dir(&point.id);
        for rel in &point.files {
            let dest = self.paths.absolute(rel);
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            tokio::fs::copy(source.join(rel), &dest)
                .await
                .with_context(|| format!("Failed to restore {rel} from {}", point.id))?;
        }
        tracing::info!(id = %point.id, files = point.files.len(), "Restore point applied");
        Ok(point)
    }
}
