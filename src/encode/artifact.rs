use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::foundation::core::JobId;
use crate::foundation::error::{ReelError, ReelResult};
use crate::progress::log::ProgressLog;

/// A finished, retrievable video.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub job_id: JobId,
    pub path: PathBuf,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Directory of published artifacts and the URL prefix it is served under.
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
    base_url: String,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            base_url: base_url.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(job_id: JobId) -> String {
        format!("{job_id}.mp4")
    }

    pub fn final_path(&self, job_id: JobId) -> PathBuf {
        self.dir.join(Self::file_name(job_id))
    }

    /// Hidden path the encoder writes to until it has finished.
    pub fn partial_path(&self, job_id: JobId) -> PathBuf {
        self.dir.join(format!(".{job_id}.mp4.partial"))
    }

    pub fn url_for(&self, job_id: JobId) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            Self::file_name(job_id)
        )
    }

    /// Move a finished partial file into place and describe it.
    pub async fn publish(&self, job_id: JobId, ttl: Duration) -> ReelResult<Artifact> {
        let partial = self.partial_path(job_id);
        let len = tokio::fs::metadata(&partial)
            .await
            .map_err(|e| {
                ReelError::encoding_failed(format!(
                    "encoder reported success but '{}' is missing: {e}",
                    partial.display()
                ))
            })?
            .len();
        if len == 0 {
            self.discard(job_id).await;
            return Err(ReelError::encoding_failed("encoder produced an empty file"));
        }

        let path = self.final_path(job_id);
        tokio::fs::rename(&partial, &path)
            .await
            .with_context(|| format!("publish '{}'", path.display()))?;

        let created_at = Utc::now();
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| ReelError::validation(format!("artifact ttl out of range: {e}")))?;
        Ok(Artifact {
            job_id,
            path,
            url: self.url_for(job_id),
            created_at,
            expires_at: created_at + ttl,
        })
    }

    /// Remove a job's partial output, if any.
    pub async fn discard(&self, job_id: JobId) {
        let partial = self.partial_path(job_id);
        match tokio::fs::remove_file(&partial).await {
            Ok(()) => tracing::debug!(job = %job_id, "partial artifact removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(job = %job_id, path = %partial.display(), "failed to remove partial artifact: {e}")
            }
        }
    }
}

/// Delete `artifact` after `ttl` and note it on the job's progress log.
///
/// Runs detached; the job has already returned by the time this fires.
pub fn schedule_expiry(artifact: &Artifact, ttl: Duration, progress: ProgressLog) -> JoinHandle<()> {
    let path = artifact.path.clone();
    let job_id = artifact.job_id;
    tokio::spawn(async move {
        tokio::time::sleep(ttl).await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(job = %job_id, "artifact expired");
                progress.append("Video expired and is no longer available.");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(job = %job_id, "artifact already gone at expiry");
                progress.append("Video expired and is no longer available.");
            }
            Err(e) => {
                tracing::warn!(job = %job_id, path = %path.display(), "failed to expire artifact: {e}");
            }
        }
    })
}

#[cfg(test)]
#[path = "../../tests/unit/encode/artifact.rs"]
mod tests;
