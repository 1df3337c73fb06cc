use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::FfmpegSection;
use crate::exec::{
    build_command, diagnostic_output, render_command, CommandExecutor, SystemCommandExecutor,
};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to launch {program}: {source}")]
    Io { source: io::Error, program: PathBuf },
    #[error("command failed ({command}): {stderr}")]
    CommandFailure {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub output: PathBuf,
    pub elapsed_secs: f64,
}

/// Stream-copies a live source into one growing local file.
pub struct IngestionTask {
    ffmpeg: PathBuf,
    settings: FfmpegSection,
    media_url: String,
    output: PathBuf,
    executor: Arc<dyn CommandExecutor>,
}

impl std::fmt::Debug for IngestionTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionTask")
            .field("ffmpeg", &self.ffmpeg)
            .field("output", &self.output)
            .finish()
    }
}

impl IngestionTask {
    pub fn new(
        ffmpeg: PathBuf,
        settings: FfmpegSection,
        media_url: impl Into<String>,
        output: PathBuf,
        executor: Option<Arc<dyn CommandExecutor>>,
    ) -> Self {
        let executor = executor.unwrap_or_else(|| Arc::new(SystemCommandExecutor));
        Self {
            ffmpeg,
            settings,
            media_url: media_url.into(),
            output,
            executor,
        }
    }

    fn args(&self) -> Vec<String> {
        let mut args = self.settings.base_args();
        args.extend([
            "-i".to_string(),
            self.media_url.clone(),
            "-c".to_string(),
            "copy".to_string(),
            self.output.to_string_lossy().to_string(),
        ]);
        args
    }

    /// Blocks until the source ends or the capture fails. Never restarts.
    pub async fn run(&self) -> Result<IngestReport, IngestError> {
        let args = self.args();
        let mut command = build_command(&self.ffmpeg, &args);
        info!(output = %self.output.display(), "stream capture started");
        let started = Instant::now();
        let output = self
            .executor
            .run(&mut command)
            .await
            .map_err(|source| IngestError::Io {
                source,
                program: self.ffmpeg.clone(),
            })?;
        if !output.status.success() {
            return Err(IngestError::CommandFailure {
                command: render_command(&self.ffmpeg, &args),
                status: output.status.code(),
                stderr: diagnostic_output(&output),
            });
        }
        let report = IngestReport {
            output: self.output.clone(),
            elapsed_secs: started.elapsed().as_secs_f64(),
        };
        info!(
            output = %report.output.display(),
            elapsed_secs = report.elapsed_secs,
            "stream capture finished"
        );
        Ok(report)
    }

    /// Runs the capture on its own task. Failures are logged and the task simply ends,
    /// leaving whatever was captured for the segmenter.
    pub fn spawn(self) -> JoinHandle<Option<IngestReport>> {
        tokio::spawn(async move {
            match self.run().await {
                Ok(report) => Some(report),
                Err(err) => {
                    error!(output = %self.output.display(), error = %err, "stream capture failed");
                    None
                }
            }
        })
    }
}
