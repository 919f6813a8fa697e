//! Per-user workspaces.
//!
//! Every user owns one directory tree under `<data_dir>/users/<username>`
//! holding uploads, translation outputs, a settings document, and the
//! translation history. Paths are derived from the authenticated username
//! only — the username charset enforced at registration is what makes the
//! join safe — and client-supplied path fragments never participate.
//!
//! History and settings are JSON documents written via temp-file-then-
//! rename, with a per-user async lock serializing read-modify-write
//! cycles. Different users share nothing and need no coordination.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Task not found")]
    NotFound,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Corrupt workspace document: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Per-user translation settings document.
///
/// Unrecognized fields land in `advanced`; missing fields fall back to
/// the fixed baseline below on first access.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UserSettings {
    /// Translation service name (e.g. "google", "openai").
    pub service: String,

    /// Custom service endpoint, when the service supports one.
    pub endpoint: Option<String>,

    /// Service API key. Stored per user, never logged.
    pub api_key: Option<String>,

    pub lang_from: String,

    pub lang_to: String,

    /// Page-range selection ("1-5,8"), empty means all pages.
    pub pages: Option<String>,

    /// Bypass the engine's translation cache.
    pub ignore_cache: bool,

    /// Free-form advanced options passed through to the engine.
    pub advanced: HashMap<String, serde_json::Value>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            service: "google".to_string(),
            endpoint: None,
            api_key: None,
            lang_from: "English".to_string(),
            lang_to: "Simplified Chinese".to_string(),
            pages: None,
            ignore_cache: false,
            advanced: HashMap::new(),
        }
    }
}

/// Output PDFs produced by a completed translation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutputs {
    /// Translated-only document.
    pub mono: String,

    /// Side-by-side original/translated document.
    pub dual: String,
}

/// One entry in a user's translation history, append-order
/// (most-recent-last).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub task_id: Uuid,
    pub file_id: Uuid,
    pub filename: String,
    pub created_at: String,
    pub completed_at: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<JobOutputs>,
}

/// Resolved handle to one user's directory tree.
#[derive(Debug, Clone)]
pub struct Workspace {
    dir: PathBuf,
}

impl Workspace {
    #[must_use]
    pub fn uploads_dir(&self) -> PathBuf {
        self.dir.join("uploads")
    }

    #[must_use]
    pub fn outputs_dir(&self) -> PathBuf {
        self.dir.join("outputs")
    }

    #[must_use]
    pub fn task_output_dir(&self, task_id: Uuid) -> PathBuf {
        self.outputs_dir().join(task_id.to_string())
    }

    fn settings_path(&self) -> PathBuf {
        self.dir.join("settings.json")
    }

    fn history_path(&self) -> PathBuf {
        self.dir.join("history.json")
    }
}

pub struct WorkspaceManager {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Idempotently create the user's directory tree and return a handle.
    pub async fn resolve(&self, username: &str) -> Result<Workspace, WorkspaceError> {
        let workspace = Workspace {
            dir: self.root.join(username),
        };

        tokio::fs::create_dir_all(workspace.uploads_dir()).await?;
        tokio::fs::create_dir_all(workspace.outputs_dir()).await?;

        Ok(workspace)
    }

    pub async fn get_settings(&self, username: &str) -> Result<UserSettings, WorkspaceError> {
        let workspace = self.resolve(username).await?;
        let path = workspace.settings_path();

        if !path.exists() {
            return Ok(UserSettings::default());
        }

        let content = tokio::fs::read_to_string(&path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    pub async fn set_settings(
        &self,
        username: &str,
        settings: &UserSettings,
    ) -> Result<(), WorkspaceError> {
        let workspace = self.resolve(username).await?;
        let lock = self.user_lock(username).await;
        let _guard = lock.lock().await;

        write_json_atomic(&workspace.settings_path(), settings).await
    }

    pub async fn reset_settings(&self, username: &str) -> Result<UserSettings, WorkspaceError> {
        let defaults = UserSettings::default();
        self.set_settings(username, &defaults).await?;
        Ok(defaults)
    }

    /// The user's history in append order (most-recent-last).
    pub async fn history(&self, username: &str) -> Result<Vec<HistoryRecord>, WorkspaceError> {
        let workspace = self.resolve(username).await?;
        read_history(&workspace.history_path()).await
    }

    /// Append one record to the user's history. Appends for the same
    /// user are serialized; a reader never observes a torn document.
    pub async fn record_history(
        &self,
        username: &str,
        record: HistoryRecord,
    ) -> Result<(), WorkspaceError> {
        let workspace = self.resolve(username).await?;
        let lock = self.user_lock(username).await;
        let _guard = lock.lock().await;

        let path = workspace.history_path();
        let mut history = read_history(&path).await?;
        history.push(record);
        write_json_atomic(&path, &history).await
    }

    /// Look up one history entry by task id.
    pub async fn find_history_item(
        &self,
        username: &str,
        task_id: Uuid,
    ) -> Result<HistoryRecord, WorkspaceError> {
        self.history(username)
            .await?
            .into_iter()
            .find(|r| r.task_id == task_id)
            .ok_or(WorkspaceError::NotFound)
    }

    /// Remove a history entry along with its output directory and the
    /// upload it referenced. Unknown task ids leave everything untouched.
    pub async fn delete_history_item(
        &self,
        username: &str,
        task_id: Uuid,
    ) -> Result<HistoryRecord, WorkspaceError> {
        let workspace = self.resolve(username).await?;
        let lock = self.user_lock(username).await;
        let _guard = lock.lock().await;

        let path = workspace.history_path();
        let mut history = read_history(&path).await?;

        let index = history
            .iter()
            .position(|r| r.task_id == task_id)
            .ok_or(WorkspaceError::NotFound)?;
        let removed = history.remove(index);

        write_json_atomic(&path, &history).await?;

        let output_dir = workspace.task_output_dir(task_id);
        if output_dir.exists() {
            tokio::fs::remove_dir_all(&output_dir).await?;
        }
        if let Some(upload) = self.find_upload(username, removed.file_id).await? {
            tokio::fs::remove_file(&upload).await?;
        }

        Ok(removed)
    }

    /// Store an uploaded PDF as `<file_id>_<sanitized name>` under the
    /// user's uploads area.
    pub async fn save_upload(
        &self,
        username: &str,
        file_id: Uuid,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, WorkspaceError> {
        let workspace = self.resolve(username).await?;
        let name = sanitize_filename(original_name);
        let path = workspace.uploads_dir().join(format!("{file_id}_{name}"));

        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Locate an upload by its file id prefix.
    pub async fn find_upload(
        &self,
        username: &str,
        file_id: Uuid,
    ) -> Result<Option<PathBuf>, WorkspaceError> {
        let workspace = self.resolve(username).await?;
        let prefix = format!("{file_id}_");

        let mut entries = tokio::fs::read_dir(workspace.uploads_dir()).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(&prefix))
            {
                return Ok(Some(entry.path()));
            }
        }

        Ok(None)
    }

    async fn user_lock(&self, username: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(username.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

async fn read_history(path: &Path) -> Result<Vec<HistoryRecord>, WorkspaceError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

/// Write the serialized document to a sibling temp file, then rename it
/// into place so readers only ever see a complete document.
async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), WorkspaceError> {
    let content = serde_json::to_string_pretty(value)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;

    Ok(())
}

/// Reduce an uploaded filename to a safe basename: path separators and
/// leading dots stripped, control characters replaced.
fn sanitize_filename(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .trim_start_matches('.');

    let cleaned: String = base
        .chars()
        .map(|c| if c.is_control() { '_' } else { c })
        .collect();

    if cleaned.is_empty() {
        "upload.pdf".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (tempfile::TempDir, WorkspaceManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(dir.path().join("users"));
        (dir, manager)
    }

    fn record(task_id: Uuid, file_id: Uuid, filename: &str) -> HistoryRecord {
        HistoryRecord {
            task_id,
            file_id,
            filename: filename.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            completed_at: None,
            status: "completed".to_string(),
            outputs: None,
        }
    }

    #[tokio::test]
    async fn resolve_is_idempotent() {
        let (_dir, manager) = manager();

        let first = manager.resolve("alice").await.unwrap();
        let second = manager.resolve("alice").await.unwrap();

        assert!(first.uploads_dir().is_dir());
        assert!(first.outputs_dir().is_dir());
        assert_eq!(first.uploads_dir(), second.uploads_dir());
    }

    #[tokio::test]
    async fn settings_baseline_and_round_trip() {
        let (_dir, manager) = manager();

        let baseline = manager.get_settings("alice").await.unwrap();
        assert_eq!(baseline, UserSettings::default());
        assert_eq!(baseline.lang_from, "English");

        let mut updated = baseline.clone();
        updated.service = "openai".to_string();
        updated.lang_to = "German".to_string();
        updated.ignore_cache = true;
        manager.set_settings("alice", &updated).await.unwrap();

        assert_eq!(manager.get_settings("alice").await.unwrap(), updated);

        manager.reset_settings("alice").await.unwrap();
        assert_eq!(
            manager.get_settings("alice").await.unwrap(),
            UserSettings::default()
        );
    }

    #[tokio::test]
    async fn history_preserves_append_order() {
        let (_dir, manager) = manager();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        manager
            .record_history("alice", record(first, Uuid::new_v4(), "a.pdf"))
            .await
            .unwrap();
        manager
            .record_history("alice", record(second, Uuid::new_v4(), "b.pdf"))
            .await
            .unwrap();

        let history = manager.history("alice").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].task_id, first);
        assert_eq!(history[1].task_id, second);
    }

    #[tokio::test]
    async fn histories_are_isolated_per_user() {
        let (_dir, manager) = manager();

        manager
            .record_history("alice", record(Uuid::new_v4(), Uuid::new_v4(), "a.pdf"))
            .await
            .unwrap();

        assert!(manager.history("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_appends_do_not_lose_records() {
        let (_dir, manager) = manager();
        let manager = Arc::new(manager);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                manager
                    .record_history("alice", record(Uuid::new_v4(), Uuid::new_v4(), "x.pdf"))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(manager.history("alice").await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn delete_unknown_task_leaves_history_untouched() {
        let (_dir, manager) = manager();
        let known = Uuid::new_v4();

        manager
            .record_history("alice", record(known, Uuid::new_v4(), "a.pdf"))
            .await
            .unwrap();

        let result = manager.delete_history_item("alice", Uuid::new_v4()).await;
        assert!(matches!(result, Err(WorkspaceError::NotFound)));
        assert_eq!(manager.history("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_record_and_artifacts() {
        let (_dir, manager) = manager();
        let task_id = Uuid::new_v4();
        let file_id = Uuid::new_v4();

        let upload = manager
            .save_upload("alice", file_id, "doc.pdf", b"%PDF-1.4")
            .await
            .unwrap();
        let workspace = manager.resolve("alice").await.unwrap();
        let output_dir = workspace.task_output_dir(task_id);
        tokio::fs::create_dir_all(&output_dir).await.unwrap();
        tokio::fs::write(output_dir.join("translated.pdf"), b"%PDF-1.4")
            .await
            .unwrap();

        manager
            .record_history("alice", record(task_id, file_id, "doc.pdf"))
            .await
            .unwrap();

        manager.delete_history_item("alice", task_id).await.unwrap();

        assert!(manager.history("alice").await.unwrap().is_empty());
        assert!(!output_dir.exists());
        assert!(!upload.exists());
    }

    #[tokio::test]
    async fn uploads_are_found_by_file_id() {
        let (_dir, manager) = manager();
        let file_id = Uuid::new_v4();

        manager
            .save_upload("alice", file_id, "paper.pdf", b"%PDF-1.4")
            .await
            .unwrap();

        let found = manager.find_upload("alice", file_id).await.unwrap();
        assert!(found.is_some());
        assert!(manager
            .find_upload("alice", Uuid::new_v4())
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(sanitize_filename("paper.pdf"), "paper.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("dir\\evil.pdf"), "evil.pdf");
        assert_eq!(sanitize_filename("..."), "upload.pdf");
    }
}
