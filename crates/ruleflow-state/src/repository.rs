//! State persistence
//!
//! One JSON file per snapshot, one directory per session. Snapshot ids embed
//! the session id (`{session}_iter_{n}`), so `load` can locate the session
//! directory without an index.

use crate::state::WorkflowState;
use ruleflow_core::{Result, RuleflowError};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Storage for workflow state snapshots
pub trait StateRepository: Send + Sync {
    /// Persist one snapshot
    fn save(&self, state: &WorkflowState) -> Result<()>;

    /// Load a snapshot by id, `None` if absent
    fn load(&self, id: &str) -> Result<Option<WorkflowState>>;

    /// All snapshots of a session, ordered by iteration
    fn history(&self, session_id: &str) -> Result<Vec<WorkflowState>>;
}

/// Directory-of-JSON-files repository
pub struct JsonFileRepository {
    root: PathBuf,
}

impl JsonFileRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn session_dir(&self, session_id: &str) -> PathBuf {
        self.root.join(session_id)
    }

    fn snapshot_path(&self, session_id: &str, snapshot_id: &str) -> PathBuf {
        self.session_dir(session_id).join(format!("{}.json", snapshot_id))
    }

    /// Session id embedded in a snapshot id
    fn session_of(snapshot_id: &str) -> &str {
        match snapshot_id.rfind("_iter_") {
            Some(pos) => &snapshot_id[..pos],
            None => snapshot_id,
        }
    }
}

impl StateRepository for JsonFileRepository {
    fn save(&self, state: &WorkflowState) -> Result<()> {
        let dir = self.session_dir(&state.session_id);
        std::fs::create_dir_all(&dir)?;

        let path = self.snapshot_path(&state.session_id, &state.id);
        let content = serde_json::to_string_pretty(state)?;
        std::fs::write(&path, content)?;
        debug!("Saved snapshot {} to {}", state.id, path.display());
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Option<WorkflowState>> {
        let path = self.snapshot_path(Self::session_of(id), id);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        let state = serde_json::from_str(&content)
            .map_err(|e| RuleflowError::Repository(format!("Corrupt snapshot {}: {}", id, e)))?;
        Ok(Some(state))
    }

    fn history(&self, session_id: &str) -> Result<Vec<WorkflowState>> {
        let dir = self.session_dir(session_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut snapshots = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_snapshot(&path) {
                Ok(state) => snapshots.push(state),
                Err(e) => {
                    tracing::warn!("Skipping unreadable snapshot {}: {}", path.display(), e);
                }
            }
        }

        snapshots.sort_by_key(|s| s.iteration_count);
        Ok(snapshots)
    }
}

fn read_snapshot(path: &Path) -> Result<WorkflowState> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
