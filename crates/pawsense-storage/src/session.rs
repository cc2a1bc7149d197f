//! Session persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pawsense_models::{AnalysisReport, SessionId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};

/// File name of the persisted report inside a session directory.
pub const ANALYSIS_FILE: &str = "combo_analysis.json";

/// Listing entry for one stored session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub modified_at: DateTime<Utc>,
    pub video: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dominant: Option<String>,
    pub keyframes: usize,
    pub no_signal: bool,
}

/// Where finished reports go.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a report under its session id, replacing any previous one.
    async fn save(&self, report: &AnalysisReport) -> StorageResult<()>;

    async fn load(&self, id: &SessionId) -> StorageResult<AnalysisReport>;

    /// Sessions with a saved report, newest first.
    async fn list(&self) -> StorageResult<Vec<SessionSummary>>;

    /// Remove a session and everything in its directory.
    async fn delete(&self, id: &SessionId) -> StorageResult<()>;
}

/// `<root>/<session_id>/combo_analysis.json` on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalSessionStore {
    root: PathBuf,
}

impl LocalSessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, id: &SessionId) -> StorageResult<PathBuf> {
        if !id.is_valid() {
            return Err(StorageError::invalid_key(id.as_str()));
        }
        Ok(self.root.join(id.as_str()))
    }

    fn report_path(&self, id: &SessionId) -> StorageResult<PathBuf> {
        Ok(self.session_dir(id)?.join(ANALYSIS_FILE))
    }

    async fn read_report(path: &Path) -> StorageResult<AnalysisReport> {
        let bytes = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl SessionStore for LocalSessionStore {
    async fn save(&self, report: &AnalysisReport) -> StorageResult<()> {
        let dir = self.session_dir(&report.session_id)?;
        tokio::fs::create_dir_all(&dir).await?;

        let json = serde_json::to_vec_pretty(report)?;
        let tmp = dir.join(format!("{ANALYSIS_FILE}.tmp"));
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, dir.join(ANALYSIS_FILE)).await?;

        info!(
            session_id = %report.session_id,
            job_id = %report.job_id,
            bytes = json.len(),
            "Analysis saved"
        );
        Ok(())
    }

    async fn load(&self, id: &SessionId) -> StorageResult<AnalysisReport> {
        let path = self.report_path(id)?;
        if !tokio::fs::try_exists(&path).await? {
            return Err(StorageError::not_found(id.as_str()));
        }
        Self::read_report(&path).await
    }

    async fn list(&self) -> StorageResult<Vec<SessionSummary>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut sessions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let path = entry.path().join(ANALYSIS_FILE);
            let modified = match tokio::fs::metadata(&path).await {
                Ok(meta) => meta.modified()?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            match Self::read_report(&path).await {
                Ok(report) => sessions.push(SessionSummary {
                    session_id: report.session_id.clone(),
                    modified_at: DateTime::<Utc>::from(modified),
                    video: report.video.clone(),
                    dominant: report.dominant().map(|(label, _)| label.to_string()),
                    keyframes: report.keyframes,
                    no_signal: report.no_signal,
                }),
                Err(e) => warn!(path = %path.display(), "Skipping unreadable session: {}", e),
            }
        }

        sessions.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
        debug!(count = sessions.len(), "Listed sessions");
        Ok(sessions)
    }

    async fn delete(&self, id: &SessionId) -> StorageResult<()> {
        let dir = self.session_dir(id)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!(session_id = %id, "Session deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::not_found(id.as_str()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
