//! The seam to the PDF translation engine.
//!
//! The engine is an external collaborator: this crate hands it an input
//! PDF, an output directory, and the effective settings, and expects two
//! output documents back. The default implementation shells out to a
//! configured command; tests substitute their own implementation.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio::process::Command;

use crate::config::TranslationConfig;
use crate::workspace::{JobOutputs, UserSettings};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Translation engine failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Everything the engine needs for one job.
#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub settings: UserSettings,
}

#[async_trait]
pub trait TranslationEngine: Send + Sync {
    async fn translate(&self, request: &EngineRequest) -> Result<JobOutputs, EngineError>;
}

/// Runs the configured translation command (e.g. `pdf2zh`) as a child
/// process and collects the two output documents it writes into the
/// job's output directory.
pub struct CommandEngine {
    config: TranslationConfig,
}

impl CommandEngine {
    #[must_use]
    pub const fn new(config: TranslationConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TranslationEngine for CommandEngine {
    async fn translate(&self, request: &EngineRequest) -> Result<JobOutputs, EngineError> {
        let settings = &request.settings;

        let mut command = Command::new(&self.config.command);
        command
            .arg(&request.input)
            .arg("--output")
            .arg(&request.output_dir)
            .arg("--service")
            .arg(&settings.service)
            .arg("--lang-in")
            .arg(&settings.lang_from)
            .arg("--lang-out")
            .arg(&settings.lang_to);

        if let Some(endpoint) = &settings.endpoint {
            command.arg("--endpoint").arg(endpoint);
        }
        if let Some(pages) = &settings.pages {
            command.arg("--pages").arg(pages);
        }
        if settings.ignore_cache {
            command.arg("--ignore-cache");
        }
        // Advanced options become `--key value` flags; bare `true`
        // becomes a switch, `false`/null is omitted.
        for (key, value) in &settings.advanced {
            match value {
                serde_json::Value::Bool(true) => {
                    command.arg(format!("--{key}"));
                }
                serde_json::Value::Bool(false) | serde_json::Value::Null => {}
                serde_json::Value::String(s) => {
                    command.arg(format!("--{key}")).arg(s);
                }
                other => {
                    command.arg(format!("--{key}")).arg(other.to_string());
                }
            }
        }
        for arg in &self.config.extra_args {
            command.arg(arg);
        }

        // argv is visible to every local process; the key goes through
        // the environment instead.
        if let Some(api_key) = &settings.api_key {
            command.env("TRANSLATION_API_KEY", api_key);
        }

        tracing::debug!(
            "Running translation engine: {} {}",
            self.config.command,
            request.input.file_name().and_then(|n| n.to_str()).unwrap_or("")
        );

        let output = command.output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(EngineError::Failed(format!(
                "exit status {}: {tail}",
                output.status
            )));
        }

        let mono = request.output_dir.join("translated.pdf");
        let dual = request.output_dir.join("dual.pdf");

        if !mono.exists() {
            return Err(EngineError::Failed(
                "engine reported success but produced no output".to_string(),
            ));
        }

        Ok(JobOutputs {
            mono: mono.to_string_lossy().into_owned(),
            dual: dual.to_string_lossy().into_owned(),
        })
    }
}
