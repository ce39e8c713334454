//! Per-submission scratch directory lifecycle (C4).
//!
//! Mirrors the original judge's `save_to_temp` / `delete_temp` pair: one
//! directory per `(username, submission_id)`, destroyed on every exit path.

use std::path::PathBuf;

use olympus_common::{JudgeError, JudgeResult, Language, SubmissionId};
use tokio::fs;

/// Owns the directory layout under `temp_dir`.
pub struct WorkspaceManager {
    temp_dir: PathBuf,
}

/// A materialized workspace: the source file is already on disk.
pub struct Workspace {
    pub dir: PathBuf,
    pub source_path: PathBuf,
}

impl WorkspaceManager {
    pub fn new(temp_dir: PathBuf) -> Self {
        Self { temp_dir }
    }

    fn user_dir(&self, username: &str) -> PathBuf {
        self.temp_dir.join(username)
    }

    fn submission_dir(&self, username: &str, submission_id: SubmissionId) -> PathBuf {
        self.user_dir(username).join(submission_id.to_string())
    }

    /// Write `source` to `Main.<ext>` inside a fresh submission directory.
    pub async fn materialize(
        &self,
        source: &str,
        submission_id: SubmissionId,
        username: &str,
        language: Language,
    ) -> JudgeResult<Workspace> {
        let dir = self.submission_dir(username, submission_id);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| JudgeError::Workspace(format!("create_dir_all {}: {e}", dir.display())))?;

        let source_path = dir.join(format!("Main.{}", language.extension()));
        // UTF-8, LF line endings — normalize any CRLF the submitter sent.
        let normalized = source.replace("\r\n", "\n");
        fs::write(&source_path, normalized)
            .await
            .map_err(|e| JudgeError::Workspace(format!("write {}: {e}", source_path.display())))?;

        Ok(Workspace { dir, source_path })
    }

    /// Remove the submission directory and, best-effort, the now-empty
    /// parent user directory. Idempotent: a missing directory is not an
    /// error.
    pub async fn destroy(&self, submission_id: SubmissionId, username: &str) {
        let dir = self.submission_dir(username, submission_id);
        if let Err(e) = fs::remove_dir_all(&dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(error = %e, dir = %dir.display(), "workspace cleanup failed");
            }
        }
        // Best-effort: only succeeds if the user directory is now empty.
        let _ = fs::remove_dir(self.user_dir(username)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn materialize_then_destroy_round_trip() {
        let root = tempfile::tempdir().unwrap();
        let mgr = WorkspaceManager::new(root.path().to_path_buf());

        let ws = mgr
            .materialize("print(1)\r\n", 101, "alice", Language::Python)
            .await
            .unwrap();
        assert!(ws.source_path.ends_with("Main.py"));
        let contents = fs::read_to_string(&ws.source_path).await.unwrap();
        assert_eq!(contents, "print(1)\n");

        mgr.destroy(101, "alice").await;
        assert!(!ws.dir.exists());
    }

    #[tokio::test]
    async fn destroy_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let mgr = WorkspaceManager::new(root.path().to_path_buf());
        mgr.destroy(999, "nobody").await;
    }
}
