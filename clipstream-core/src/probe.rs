use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;

use crate::exec::{
    build_command, diagnostic_output, render_command, CommandExecutor, SystemCommandExecutor,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    /// Whole seconds currently playable, truncated.
    Ready { seconds: u64 },
    /// Nothing playable has landed yet; expected to resolve with time.
    NotReady,
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("io error at {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
    #[error("command failed ({command}): {stderr}")]
    CommandFailure {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
    #[error("unparseable duration {output:?} for {path}")]
    InvalidOutput { output: String, path: PathBuf },
}

#[async_trait]
pub trait DurationProber: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<ProbeStatus, ProbeError>;
}

pub struct FfprobeProber {
    ffprobe: PathBuf,
    executor: Arc<dyn CommandExecutor>,
}

impl std::fmt::Debug for FfprobeProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfprobeProber")
            .field("ffprobe", &self.ffprobe)
            .finish()
    }
}

impl FfprobeProber {
    pub fn new(ffprobe: PathBuf, executor: Option<Arc<dyn CommandExecutor>>) -> Self {
        let executor = executor.unwrap_or_else(|| Arc::new(SystemCommandExecutor));
        Self { ffprobe, executor }
    }

    fn args(path: &Path) -> Vec<String> {
        vec![
            "-v".to_string(),
            "error".to_string(),
            "-show_entries".to_string(),
            "format=duration".to_string(),
            "-of".to_string(),
            "default=noprint_wrappers=1:nokey=1".to_string(),
            path.to_string_lossy().to_string(),
        ]
    }
}

#[async_trait]
impl DurationProber for FfprobeProber {
    async fn probe(&self, path: &Path) -> Result<ProbeStatus, ProbeError> {
        match fs::metadata(path).await {
            Ok(meta) if meta.len() == 0 => return Ok(ProbeStatus::NotReady),
            Ok(_) => {}
            Err(source) if source.kind() == io::ErrorKind::NotFound => {
                return Ok(ProbeStatus::NotReady)
            }
            Err(source) => {
                return Err(ProbeError::Io {
                    source,
                    path: path.to_path_buf(),
                })
            }
        }

        let args = Self::args(path);
        let mut command = build_command(&self.ffprobe, &args);
        let output = self
            .executor
            .run(&mut command)
            .await
            .map_err(|source| ProbeError::Io {
                source,
                path: self.ffprobe.clone(),
            })?;
        if !output.status.success() {
            return Err(ProbeError::CommandFailure {
                command: render_command(&self.ffprobe, &args),
                status: output.status.code(),
                stderr: diagnostic_output(&output),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_duration_output(&stdout).ok_or_else(|| ProbeError::InvalidOutput {
            output: stdout.trim().to_string(),
            path: path.to_path_buf(),
        })
    }
}

/// Parses ffprobe's bare `format=duration` value. `N/A` means the container has no duration yet.
pub fn parse_duration_output(output: &str) -> Option<ProbeStatus> {
    let value = output.lines().map(str::trim).find(|line| !line.is_empty())?;
    if value.eq_ignore_ascii_case("n/a") {
        return Some(ProbeStatus::NotReady);
    }
    let seconds = value.parse::<f64>().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(ProbeStatus::Ready {
        seconds: seconds.trunc() as u64,
    })
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::exec::testing::{output, MockExecutor};

    #[test]
    fn durations_are_truncated_not_rounded() {
        assert_eq!(
            parse_duration_output("29.97\n"),
            Some(ProbeStatus::Ready { seconds: 29 })
        );
        assert_eq!(
            parse_duration_output("10.000000"),
            Some(ProbeStatus::Ready { seconds: 10 })
        );
        assert_eq!(parse_duration_output("N/A"), Some(ProbeStatus::NotReady));
        assert_eq!(parse_duration_output("-1.0"), None);
        assert_eq!(parse_duration_output("garbage"), None);
        assert_eq!(parse_duration_output(""), None);
    }

    #[tokio::test]
    async fn missing_file_is_not_ready_without_running_ffprobe() {
        let temp = TempDir::new().unwrap();
        let executor = Arc::new(MockExecutor::default());
        let prober = FfprobeProber::new("ffprobe".into(), Some(executor.clone()));
        let status = prober
            .probe(&temp.path().join("livestream_1.ts"))
            .await
            .unwrap();
        assert_eq!(status, ProbeStatus::NotReady);
        assert!(executor.recorded().is_empty());
    }

    #[tokio::test]
    async fn empty_file_is_not_ready() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("livestream_1.ts");
        std::fs::write(&path, b"").unwrap();
        let prober = FfprobeProber::new(
            "ffprobe".into(),
            Some(Arc::new(MockExecutor::default())),
        );
        assert_eq!(prober.probe(&path).await.unwrap(), ProbeStatus::NotReady);
    }

    #[tokio::test]
    async fn reports_duration_from_ffprobe() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("livestream_1.ts");
        std::fs::write(&path, b"ts-bytes").unwrap();
        let executor = Arc::new(MockExecutor::new(vec![Ok(output(0, "25.48\n", ""))]));
        let prober = FfprobeProber::new("ffprobe".into(), Some(executor.clone()));
        assert_eq!(
            prober.probe(&path).await.unwrap(),
            ProbeStatus::Ready { seconds: 25 }
        );
        let calls = executor.recorded();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][3], "format=duration");
        assert_eq!(calls[0].last().unwrap(), &path.to_string_lossy().to_string());
    }

    #[tokio::test]
    async fn tool_failure_on_existing_file_is_hard_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("livestream_1.ts");
        std::fs::write(&path, b"corrupt").unwrap();
        let executor = Arc::new(MockExecutor::new(vec![Ok(output(
            1,
            "",
            "Invalid data found when processing input",
        ))]));
        let prober = FfprobeProber::new("ffprobe".into(), Some(executor));
        let err = prober.probe(&path).await.unwrap_err();
        match err {
            ProbeError::CommandFailure { status, stderr, .. } => {
                assert_eq!(status, Some(1));
                assert!(stderr.contains("Invalid data"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unparseable_output_is_hard_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("livestream_1.ts");
        std::fs::write(&path, b"ts").unwrap();
        let executor = Arc::new(MockExecutor::new(vec![Ok(output(0, "abc", ""))]));
        let prober = FfprobeProber::new("ffprobe".into(), Some(executor));
        assert!(matches!(
            prober.probe(&path).await,
            Err(ProbeError::InvalidOutput { .. })
        ));
    }
}
