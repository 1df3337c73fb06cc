use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::config::ResolverSection;
use crate::exec::{
    build_command, diagnostic_output, render_command, CommandExecutor, SystemCommandExecutor,
};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to launch {program}: {source}")]
    Io { source: io::Error, program: PathBuf },
    #[error("command failed ({command}): {stderr}")]
    CommandFailure {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
    #[error("resolver returned no media url for {0}")]
    EmptyOutput(String),
}

#[async_trait]
pub trait SourceResolver: Send + Sync {
    /// Turns a user-supplied reference into a fetchable media URL.
    async fn resolve(&self, reference: &str) -> Result<String, ResolveError>;
}

/// Delegates references on configured hosts to `yt-dlp -g`; passes everything else through.
pub struct YtDlpResolver {
    ytdlp: PathBuf,
    hosts: Vec<String>,
    executor: Arc<dyn CommandExecutor>,
}

impl std::fmt::Debug for YtDlpResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YtDlpResolver")
            .field("ytdlp", &self.ytdlp)
            .field("hosts", &self.hosts)
            .finish()
    }
}

impl YtDlpResolver {
    pub fn new(
        ytdlp: PathBuf,
        config: &ResolverSection,
        executor: Option<Arc<dyn CommandExecutor>>,
    ) -> Self {
        let executor = executor.unwrap_or_else(|| Arc::new(SystemCommandExecutor));
        Self {
            ytdlp,
            hosts: config
                .hosts
                .iter()
                .map(|host| host.to_ascii_lowercase())
                .collect(),
            executor,
        }
    }

    pub fn requires_resolution(&self, reference: &str) -> bool {
        let Ok(url) = Url::parse(reference) else {
            return false;
        };
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        url.host_str()
            .map(|host| {
                let host = host.to_ascii_lowercase();
                self.hosts.iter().any(|candidate| *candidate == host)
            })
            .unwrap_or(false)
    }
}

#[async_trait]
impl SourceResolver for YtDlpResolver {
    async fn resolve(&self, reference: &str) -> Result<String, ResolveError> {
        if !self.requires_resolution(reference) {
            debug!(reference, "using reference as media url");
            return Ok(reference.to_string());
        }

        let args = vec!["-g".to_string(), reference.to_string()];
        let mut command = build_command(&self.ytdlp, &args);
        let output = self
            .executor
            .run(&mut command)
            .await
            .map_err(|source| ResolveError::Io {
                source,
                program: self.ytdlp.clone(),
            })?;
        if !output.status.success() {
            return Err(ResolveError::CommandFailure {
                command: render_command(&self.ytdlp, &args),
                status: output.status.code(),
                stderr: diagnostic_output(&output),
            });
        }
        // yt-dlp prints one URL per selected format; the first is the primary stream.
        let stdout = String::from_utf8_lossy(&output.stdout);
        let resolved = stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| ResolveError::EmptyOutput(reference.to_string()))?;
        info!(reference, "resolved stream url through yt-dlp");
        Ok(resolved.to_string())
    }
}
