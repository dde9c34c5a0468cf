//! Snapshots and their stores
//!
//! A [`Snapshot`] is everything needed to resume an orchestrator: state,
//! context, plan, outputs so far and the report log. Stores are keyed by
//! orchestrator id; saving again overwrites.

use crate::aggregate::OutputTree;
use crate::cleanup::CleanupReport;
use crate::context::OrchestratorContext;
use crate::report::ReportLog;
use crate::state_machine::OrchestratorState;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use matflow_composer::ComposedWorkflow;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use ulid::Ulid;

/// Persisted orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Orchestrator id
    pub id: Ulid,
    /// When it was taken
    pub saved_at: DateTime<Utc>,
    /// State at the time
    pub state: OrchestratorState,
    /// Working context
    pub context: OrchestratorContext,
    /// Plan being executed
    pub workflow: ComposedWorkflow,
    /// Outputs attached so far
    pub outputs: OutputTree,
    /// Report log so far
    pub report: ReportLog,
    /// Cleanup result, once terminated
    pub cleanup: Option<CleanupReport>,
}

/// Snapshot persistence failures
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Filesystem error
    #[error("snapshot I/O error at {path}: {source}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Snapshot could not be encoded or decoded
    #[error("snapshot encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// No snapshot with this id
    #[error("snapshot not found: {0}")]
    NotFound(Ulid),
}

/// Snapshot persistence seam
#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Save, replacing any earlier snapshot with the same id
    async fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError>;

    /// Load the latest snapshot of an orchestrator
    async fn load(&self, id: Ulid) -> Result<Snapshot, SnapshotError>;

    /// Ids of every stored orchestrator
    async fn list(&self) -> Result<Vec<Ulid>, SnapshotError>;
}

/// In-memory store that also keeps every save, for inspection
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    latest: DashMap<Ulid, Snapshot>,
    history: Mutex<Vec<Snapshot>>,
}

impl MemorySnapshotStore {
    /// Empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every save in order
    #[must_use]
    pub fn history(&self) -> Vec<Snapshot> {
        self.history.lock().clone()
    }
}

#[async_trait::async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        self.latest.insert(snapshot.id, snapshot.clone());
        self.history.lock().push(snapshot.clone());
        Ok(())
    }

    async fn load(&self, id: Ulid) -> Result<Snapshot, SnapshotError> {
        self.latest
            .get(&id)
            .map(|snapshot| snapshot.value().clone())
            .ok_or(SnapshotError::NotFound(id))
    }

    async fn list(&self) -> Result<Vec<Ulid>, SnapshotError> {
        let mut ids: Vec<Ulid> = self.latest.iter().map(|entry| *entry.key()).collect();
        ids.sort();
        Ok(ids)
    }
}

/// One JSON file per orchestrator, written atomically
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    /// Store rooted at `dir`, created on first save
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the snapshots
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of an orchestrator's snapshot
    #[must_use]
    pub fn path_of(&self, id: Ulid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> SnapshotError + '_ {
        move |source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[async_trait::async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(Self::io(&self.dir))?;
        let path = self.path_of(snapshot.id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        tokio::fs::write(&tmp, bytes).await.map_err(Self::io(&tmp))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(Self::io(&path))?;
        tracing::debug!(id = %snapshot.id, path = %path.display(), "snapshot saved");
        Ok(())
    }

    async fn load(&self, id: Ulid) -> Result<Snapshot, SnapshotError> {
        let path = self.path_of(id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(SnapshotError::NotFound(id))
            }
            Err(err) => return Err(Self::io(&path)(err)),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn list(&self) -> Result<Vec<Ulid>, SnapshotError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(Self::io(&self.dir)(err)),
        };
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(Self::io(&self.dir))? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| Ulid::from_string(stem).ok())
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}
