use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::addressing::{AddressingError, RunId, StorageLayout};
use crate::config::ClipstreamConfig;
use crate::cutter::{FfmpegCutter, SegmentCutter};
use crate::exec::CommandExecutor;
use crate::ingest::{IngestReport, IngestionTask};
use crate::probe::{DurationProber, FfprobeProber};
use crate::resolver::{ResolveError, SourceResolver, YtDlpResolver};
use crate::segmenter::{ClipArtifact, Segmenter, SegmenterSettings};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to resolve source: {0}")]
    Resolve(#[from] ResolveError),
    #[error("failed to prepare storage: {0}")]
    Storage(#[from] AddressingError),
}

/// What an operator needs to find a live run's files.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub run: RunId,
    pub source: PathBuf,
    pub clips_dir: PathBuf,
    pub clip_length_seconds: u64,
}

/// One live capture run: a resolved source feeding a growing file, and a segmenter
/// slicing it. The two share nothing but the file.
pub struct LiveSession {
    info: SessionInfo,
    ingest: Option<IngestionTask>,
    segmenter: Segmenter,
}

impl std::fmt::Debug for LiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSession")
            .field("info", &self.info)
            .field("segmenter", &self.segmenter)
            .finish()
    }
}

pub struct LiveSessionBuilder {
    config: ClipstreamConfig,
    layout: StorageLayout,
    run: Option<RunId>,
    executor: Option<Arc<dyn CommandExecutor>>,
    resolver: Option<Arc<dyn SourceResolver>>,
    prober: Option<Arc<dyn DurationProber>>,
    cutter: Option<Arc<dyn SegmentCutter>>,
}

impl LiveSessionBuilder {
    pub fn new(config: ClipstreamConfig) -> Self {
        let layout = StorageLayout::from_config(&config);
        Self {
            config,
            layout,
            run: None,
            executor: None,
            resolver: None,
            prober: None,
            cutter: None,
        }
    }

    pub fn layout(mut self, layout: StorageLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn run_id(mut self, run: RunId) -> Self {
        self.run = Some(run);
        self
    }

    /// Executor shared by every default subprocess adapter.
    pub fn executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn SourceResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn prober(mut self, prober: Arc<dyn DurationProber>) -> Self {
        self.prober = Some(prober);
        self
    }

    pub fn cutter(mut self, cutter: Arc<dyn SegmentCutter>) -> Self {
        self.cutter = Some(cutter);
        self
    }

    /// Resolves the reference and creates the storage directories. Nothing is spawned yet.
    pub async fn prepare(self, reference: &str) -> Result<LiveSession, SessionError> {
        let tools = &self.config.tools;
        let resolver = self.resolver.unwrap_or_else(|| {
            Arc::new(YtDlpResolver::new(
                tools.ytdlp.clone(),
                &self.config.resolver,
                self.executor.clone(),
            ))
        });
        let media_url = resolver.resolve(reference).await?;

        self.layout.ensure_dirs()?;
        let run = self.run.unwrap_or_else(RunId::now);
        let source = self.layout.source_path(&run);

        let prober = self.prober.unwrap_or_else(|| {
            Arc::new(FfprobeProber::new(
                tools.ffprobe.clone(),
                self.executor.clone(),
            ))
        });
        let cutter = self.cutter.unwrap_or_else(|| {
            Arc::new(FfmpegCutter::new(
                tools.ffmpeg.clone(),
                self.config.ffmpeg.clone(),
                self.executor.clone(),
            ))
        });
        let ingest = IngestionTask::new(
            tools.ffmpeg.clone(),
            self.config.ffmpeg.clone(),
            media_url,
            source.clone(),
            self.executor.clone(),
        );
        let settings = SegmenterSettings::from(&self.config.segmenter);
        let info = SessionInfo {
            run: run.clone(),
            source,
            clips_dir: self.layout.clips_dir.clone(),
            clip_length_seconds: settings.clip_length_seconds,
        };
        let segmenter = Segmenter::new(run, self.layout, prober, cutter, settings);
        Ok(LiveSession {
            info,
            ingest: Some(ingest),
            segmenter,
        })
    }
}

impl LiveSession {
    pub fn builder(config: ClipstreamConfig) -> LiveSessionBuilder {
        LiveSessionBuilder::new(config)
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn with_events(mut self, sender: mpsc::UnboundedSender<ClipArtifact>) -> Self {
        self.segmenter = self.segmenter.with_events(sender);
        self
    }

    /// Starts the capture in the background. Calling it again is a no-op.
    pub fn start_ingest(&mut self) -> Option<JoinHandle<Option<IngestReport>>> {
        self.ingest.take().map(IngestionTask::spawn)
    }

    pub fn segmenter_mut(&mut self) -> &mut Segmenter {
        &mut self.segmenter
    }

    /// Starts the capture and drives the segmenter until the process ends.
    pub async fn run(mut self) {
        info!(
            run = %self.info.run,
            source = %self.info.source.display(),
            "live session started"
        );
        let _ingest = self.start_ingest();
        self.segmenter.run().await;
    }
}
