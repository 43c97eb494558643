//! Durable run checkpoints.
//!
//! One indented JSON file per run under `<base>/agent/runs/`, written after
//! every turn so a crash between turns loses at most the in-flight turn.

use std::path::{Path, PathBuf};

use chrono::Utc;

use super::state::{RunState, RunSummary};
use crate::error::{CelesteError, Result};

/// Filesystem store for [`RunState`] snapshots.
///
/// Concurrent saves to the same run id are not supported; the runner
/// guarantees a single writer per run.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    runs_dir: PathBuf,
}

impl CheckpointStore {
    /// Open (creating if needed) a store under `base_dir`, defaulting to
    /// `~/.celeste`. The runs directory is created with owner-only traversal
    /// where the platform supports it.
    pub fn new(base_dir: Option<PathBuf>) -> Result<Self> {
        let base = match base_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .ok_or_else(|| {
                    CelesteError::Configuration("cannot resolve home directory".to_string())
                })?
                .join(".celeste"),
        };
        let runs_dir = base.join("agent").join("runs");
        create_private_dir(&runs_dir)?;
        Ok(Self { runs_dir })
    }

    pub fn runs_dir(&self) -> &Path {
        &self.runs_dir
    }

    fn path_for(&self, run_id: &str) -> PathBuf {
        self.runs_dir.join(format!("{run_id}.json"))
    }

    /// Persist a snapshot, stamping `updated_at`. Failures are returned to
    /// the caller, which treats them as non-fatal.
    pub fn save(&self, state: &mut RunState) -> Result<()> {
        state.updated_at = Utc::now();
        let data = serde_json::to_vec_pretty(state)?;
        std::fs::write(self.path_for(&state.run_id), data)?;
        Ok(())
    }

    /// Load a snapshot. Missing files are `NotFound`; unparseable files are
    /// `CorruptState`.
    pub fn load(&self, run_id: &str) -> Result<RunState> {
        if run_id.trim().is_empty() {
            return Err(CelesteError::InvalidInput("run id is required".to_string()));
        }
        let path = self.path_for(run_id);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(CelesteError::NotFound(format!("no checkpoint for run {run_id}")));
            }
            Err(err) => return Err(err.into()),
        };
        serde_json::from_slice(&data)
            .map_err(|err| CelesteError::CorruptState(format!("{}: {err}", path.display())))
    }

    /// List run summaries, newest first by `updated_at`. Unreadable or
    /// corrupt files are skipped. A positive `limit` truncates the result.
    pub fn list(&self, limit: usize) -> Vec<RunSummary> {
        let Ok(entries) = std::fs::read_dir(&self.runs_dir) else {
            return Vec::new();
        };
        let mut summaries: Vec<RunSummary> = entries
            .flatten()
            .filter(|entry| {
                entry.path().extension().and_then(|e| e.to_str()) == Some("json")
            })
            .filter_map(|entry| {
                let data = std::fs::read(entry.path()).ok()?;
                let state: RunState = serde_json::from_slice(&data).ok()?;
                Some(state.summary())
            })
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        if limit > 0 && summaries.len() > limit {
            summaries.truncate(limit);
        }
        summaries
    }
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(path)?;
    Ok(())
}

#[cfg(not(unix))]
fn create_private_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}
