//! Per-job progress log.
//!
//! Handlers write human-readable lines here; the lines are also emitted as
//! `tracing` events. Without a log directory only the tracing side is kept.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Location of the log file for `job_id` under `dir`.
pub fn log_path(dir: &Path, job_id: i64) -> PathBuf {
    dir.join(format!("job_{job_id}.log"))
}

/// Reads the whole log of a job.
pub async fn read_log(dir: &Path, job_id: i64) -> std::io::Result<String> {
    tokio::fs::read_to_string(log_path(dir, job_id)).await
}

#[derive(Debug, Clone)]
pub struct JobLog {
    job_id: i64,
    // None when no log directory is configured.
    path: Option<PathBuf>,
}

impl JobLog {
    pub fn open(dir: Option<&Path>, job_id: i64) -> Self {
        Self {
            job_id,
            path: dir.map(|dir| log_path(dir, job_id)),
        }
    }

    /// Appends one timestamped line. Write failures are logged, not returned.
    pub async fn line(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        info!(job_id = self.job_id, "{message}");

        let Some(path) = &self.path else {
            return;
        };
        let line = format!(
            "{} [job {}] {message}\n",
            Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.job_id
        );
        if let Err(e) = append(path, line.as_bytes()).await {
            warn!(job_id = self.job_id, path = %path.display(), error = %e, "failed to write job log");
        }
    }
}

async fn append(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await
}
