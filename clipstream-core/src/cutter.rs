use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;
use tracing::debug;

use crate::addressing::ClipWindow;
use crate::config::FfmpegSection;
use crate::exec::{
    build_command, diagnostic_output, render_command, CommandExecutor, SystemCommandExecutor,
};

/// Containers that need ADTS AAC rewritten to ASC when stream-copying out of MPEG-TS.
const ASC_CONTAINERS: &[&str] = &["mp4", "m4a", "mov"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CutOutcome {
    Produced { path: PathBuf, bytes: u64 },
    /// The engine reported success but left nothing on disk.
    NoOutput,
}

impl CutOutcome {
    pub fn is_produced(&self) -> bool {
        matches!(self, CutOutcome::Produced { .. })
    }
}

#[derive(Debug, Error)]
pub enum CutError {
    #[error("io error at {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
    #[error("command failed ({command}): {stderr}")]
    CommandFailure {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
}

#[async_trait]
pub trait SegmentCutter: Send + Sync {
    async fn cut(
        &self,
        source: &Path,
        output: &Path,
        window: ClipWindow,
    ) -> Result<CutOutcome, CutError>;
}

pub struct FfmpegCutter {
    ffmpeg: PathBuf,
    settings: FfmpegSection,
    executor: Arc<dyn CommandExecutor>,
}

impl std::fmt::Debug for FfmpegCutter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegCutter")
            .field("ffmpeg", &self.ffmpeg)
            .field("settings", &self.settings)
            .finish()
    }
}

impl FfmpegCutter {
    pub fn new(
        ffmpeg: PathBuf,
        settings: FfmpegSection,
        executor: Option<Arc<dyn CommandExecutor>>,
    ) -> Self {
        let executor = executor.unwrap_or_else(|| Arc::new(SystemCommandExecutor));
        Self {
            ffmpeg,
            settings,
            executor,
        }
    }

    fn args(&self, source: &Path, output: &Path, window: ClipWindow) -> Vec<String> {
        let mut args = self.settings.base_args();
        args.extend([
            "-y".to_string(),
            "-i".to_string(),
            source.to_string_lossy().to_string(),
            "-ss".to_string(),
            window.start.to_string(),
            "-to".to_string(),
            window.end.to_string(),
            "-c".to_string(),
            "copy".to_string(),
        ]);
        if needs_asc_fixup(output) {
            args.push("-bsf:a".to_string());
            args.push("aac_adtstoasc".to_string());
        }
        args.push(output.to_string_lossy().to_string());
        args
    }
}

fn needs_asc_fixup(output: &Path) -> bool {
    output
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            ASC_CONTAINERS
                .iter()
                .any(|candidate| ext.eq_ignore_ascii_case(candidate))
        })
        .unwrap_or(false)
}

#[async_trait]
impl SegmentCutter for FfmpegCutter {
    async fn cut(
        &self,
        source: &Path,
        output: &Path,
        window: ClipWindow,
    ) -> Result<CutOutcome, CutError> {
        let args = self.args(source, output, window);
        let mut command = build_command(&self.ffmpeg, &args);
        let result = self
            .executor
            .run(&mut command)
            .await
            .map_err(|source| CutError::Io {
                source,
                path: self.ffmpeg.clone(),
            })?;
        if !result.status.success() {
            return Err(CutError::CommandFailure {
                command: render_command(&self.ffmpeg, &args),
                status: result.status.code(),
                stderr: diagnostic_output(&result),
            });
        }
        artifact_outcome(output).await
    }
}

/// Checks the output independently of the exit status.
pub async fn artifact_outcome(output: &Path) -> Result<CutOutcome, CutError> {
    match fs::metadata(output).await {
        Ok(meta) if meta.is_file() => Ok(CutOutcome::Produced {
            path: output.to_path_buf(),
            bytes: meta.len(),
        }),
        Ok(_) => Ok(CutOutcome::NoOutput),
        Err(source) if source.kind() == io::ErrorKind::NotFound => {
            debug!(output = %output.display(), "cut finished without output");
            Ok(CutOutcome::NoOutput)
        }
        Err(source) => Err(CutError::Io {
            source,
            path: output.to_path_buf(),
        }),
    }
}
