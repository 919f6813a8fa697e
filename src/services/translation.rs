//! Translation job orchestration.
//!
//! Jobs run as background tokio tasks against the engine. The in-memory
//! registry tracks live progress for the status endpoint; the durable
//! record is the workspace history entry appended when a job reaches a
//! terminal state. Every lookup is scoped to the owning user — a foreign
//! task id is indistinguishable from an unknown one.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::services::engine::{EngineRequest, TranslationEngine};
use crate::workspace::{HistoryRecord, UserSettings, WorkspaceError, WorkspaceManager};

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("Task not found")]
    NotFound,

    #[error("File not found")]
    FileNotFound,

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

/// Registry entry for one job. Volatile: lost on restart, at which point
/// the history entry is the surviving record.
#[derive(Debug, Clone, Serialize)]
pub struct TaskState {
    pub task_id: Uuid,
    #[serde(skip)]
    pub username: String,
    pub file_id: Uuid,
    pub filename: String,
    pub status: TaskStatus,
    pub progress: u8,
    pub message: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<crate::workspace::JobOutputs>,
}

/// Per-request setting overrides, applied over the user's stored
/// settings document for a single job.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SettingsOverlay {
    pub service: Option<String>,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub lang_from: Option<String>,
    pub lang_to: Option<String>,
    pub pages: Option<String>,
    pub ignore_cache: Option<bool>,
}

impl SettingsOverlay {
    fn apply(self, mut settings: UserSettings) -> UserSettings {
        if let Some(service) = self.service {
            settings.service = service;
        }
        if let Some(endpoint) = self.endpoint {
            settings.endpoint = Some(endpoint);
        }
        if let Some(api_key) = self.api_key {
            settings.api_key = Some(api_key);
        }
        if let Some(lang_from) = self.lang_from {
            settings.lang_from = lang_from;
        }
        if let Some(lang_to) = self.lang_to {
            settings.lang_to = lang_to;
        }
        if let Some(pages) = self.pages {
            settings.pages = Some(pages);
        }
        if let Some(ignore_cache) = self.ignore_cache {
            settings.ignore_cache = ignore_cache;
        }
        settings
    }
}

pub struct TranslationService {
    engine: Arc<dyn TranslationEngine>,
    workspaces: Arc<WorkspaceManager>,
    tasks: RwLock<HashMap<Uuid, TaskState>>,
}

impl TranslationService {
    #[must_use]
    pub fn new(engine: Arc<dyn TranslationEngine>, workspaces: Arc<WorkspaceManager>) -> Self {
        Self {
            engine,
            workspaces,
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Queue a translation job for an uploaded file and spawn the worker.
    pub async fn start(
        self: &Arc<Self>,
        username: &str,
        file_id: Uuid,
        overlay: SettingsOverlay,
    ) -> Result<Uuid, TranslateError> {
        let input = self
            .workspaces
            .find_upload(username, file_id)
            .await?
            .ok_or(TranslateError::FileNotFound)?;

        let filename = input
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.splitn(2, '_').nth(1).unwrap_or(n).to_string())
            .unwrap_or_else(|| "upload.pdf".to_string());

        let settings = overlay.apply(self.workspaces.get_settings(username).await?);

        let task_id = Uuid::new_v4();
        let workspace = self.workspaces.resolve(username).await?;
        let output_dir = workspace.task_output_dir(task_id);
        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(WorkspaceError::from)?;

        let state = TaskState {
            task_id,
            username: username.to_string(),
            file_id,
            filename: filename.clone(),
            status: TaskStatus::Queued,
            progress: 0,
            message: "Translation queued".to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            outputs: None,
        };
        self.tasks.write().await.insert(task_id, state);

        let service = Arc::clone(self);
        let username = username.to_string();
        let request = EngineRequest {
            input,
            output_dir,
            settings,
        };
        tokio::spawn(async move {
            service.run_job(&username, task_id, request).await;
        });

        Ok(task_id)
    }

    /// Live status of a job, owner only.
    pub async fn status(&self, username: &str, task_id: Uuid) -> Result<TaskState, TranslateError> {
        let tasks = self.tasks.read().await;
        tasks
            .get(&task_id)
            .filter(|t| t.username == username)
            .cloned()
            .ok_or(TranslateError::NotFound)
    }

    async fn run_job(&self, username: &str, task_id: Uuid, request: EngineRequest) {
        self.update(task_id, |t| {
            t.status = TaskStatus::Processing;
            t.progress = 10;
            t.message = "Translation in progress".to_string();
        })
        .await;

        tracing::info!("Starting translation task {task_id} for user {username}");

        let result = self.engine.translate(&request).await;

        let (status, message, outputs) = match result {
            Ok(outputs) => (
                TaskStatus::Completed,
                "Translation completed".to_string(),
                Some(outputs),
            ),
            Err(e) => {
                tracing::error!("Translation task {task_id} failed: {e}");
                (TaskStatus::Failed, format!("Translation failed: {e}"), None)
            }
        };

        let (filename, file_id, created_at) = {
            let tasks = self.tasks.read().await;
            let Some(task) = tasks.get(&task_id) else {
                return;
            };
            (task.filename.clone(), task.file_id, task.created_at.clone())
        };

        // History first, registry second: once the status endpoint
        // reports a terminal state the durable record already exists.
        let record = HistoryRecord {
            task_id,
            file_id,
            filename,
            created_at,
            completed_at: Some(chrono::Utc::now().to_rfc3339()),
            status: match status {
                TaskStatus::Completed => "completed".to_string(),
                _ => "failed".to_string(),
            },
            outputs: outputs.clone(),
        };
        if let Err(e) = self.workspaces.record_history(username, record).await {
            tracing::error!("Failed to record history for task {task_id}: {e}");
        }

        self.update(task_id, |t| {
            t.status = status;
            t.progress = if status == TaskStatus::Completed { 100 } else { t.progress };
            t.message = message;
            t.outputs = outputs;
        })
        .await;
    }

    async fn update(&self, task_id: Uuid, f: impl FnOnce(&mut TaskState)) {
        let mut tasks = self.tasks.write().await;
        if let Some(task) = tasks.get_mut(&task_id) {
            f(task);
        }
    }
}
