//! Segmentation control loop.
//!
//! Walks a cursor over fixed-width windows of a growing source file. A window is cut only
//! once the probed duration reaches its upper bound, and the cursor moves forward only when
//! the artifact for that window is confirmed on disk. Everything else stalls for a fixed
//! interval and retries the same window, indefinitely.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::addressing::{ClipWindow, RunId, StorageLayout};
use crate::config::SegmenterSection;
use crate::cutter::{CutOutcome, SegmentCutter};
use crate::probe::{DurationProber, ProbeStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmenterState {
    Probing,
    Ready,
    Cutting,
    Advanced,
    Stalled,
}

impl fmt::Display for SegmenterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SegmenterState::Probing => "probing",
            SegmenterState::Ready => "ready",
            SegmenterState::Cutting => "cutting",
            SegmenterState::Advanced => "advanced",
            SegmenterState::Stalled => "stalled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
pub struct SegmenterSettings {
    pub clip_length_seconds: u64,
    pub retry_interval: Duration,
}

impl From<&SegmenterSection> for SegmenterSettings {
    fn from(section: &SegmenterSection) -> Self {
        Self {
            clip_length_seconds: section.clip_length_seconds.max(1),
            retry_interval: section.retry_interval(),
        }
    }
}

impl Default for SegmenterSettings {
    fn default() -> Self {
        Self::from(&SegmenterSection::default())
    }
}

/// A confirmed clip on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClipArtifact {
    pub run: RunId,
    pub index: u64,
    pub window: ClipWindow,
    pub path: PathBuf,
    pub bytes: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StallReason {
    /// Source file absent or nothing parseable yet.
    SourceNotReady,
    /// Known duration does not cover the window's upper bound.
    WindowPending { known_seconds: u64, needed_seconds: u64 },
    ProbeFailed(String),
    CutFailed(String),
    /// Cut reported success but no artifact exists.
    MissingArtifact,
}

impl StallReason {
    /// Hard reasons are surfaced to the operator; the rest are routine waiting.
    pub fn is_hard(&self) -> bool {
        matches!(
            self,
            StallReason::ProbeFailed(_) | StallReason::CutFailed(_) | StallReason::MissingArtifact
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Advanced(ClipArtifact),
    Stalled(StallReason),
}

pub struct Segmenter {
    run: RunId,
    source: PathBuf,
    layout: StorageLayout,
    prober: Arc<dyn DurationProber>,
    cutter: Arc<dyn SegmentCutter>,
    settings: SegmenterSettings,
    cursor: u64,
    state: SegmenterState,
    events: Option<mpsc::UnboundedSender<ClipArtifact>>,
}

impl fmt::Debug for Segmenter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segmenter")
            .field("run", &self.run)
            .field("source", &self.source)
            .field("settings", &self.settings)
            .field("cursor", &self.cursor)
            .field("state", &self.state)
            .finish()
    }
}

impl Segmenter {
    pub fn new(
        run: RunId,
        layout: StorageLayout,
        prober: Arc<dyn DurationProber>,
        cutter: Arc<dyn SegmentCutter>,
        settings: SegmenterSettings,
    ) -> Self {
        let source = layout.source_path(&run);
        Self {
            run,
            source,
            layout,
            prober,
            cutter,
            settings,
            cursor: 0,
            state: SegmenterState::Probing,
            events: None,
        }
    }

    /// Publishes every confirmed artifact on `sender`. A closed receiver is ignored.
    pub fn with_events(mut self, sender: mpsc::UnboundedSender<ClipArtifact>) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn state(&self) -> SegmenterState {
        self.state
    }

    pub fn source(&self) -> &PathBuf {
        &self.source
    }

    pub fn next_window(&self) -> ClipWindow {
        ClipWindow::at_index(self.cursor, self.settings.clip_length_seconds)
    }

    /// Runs forever: step, and sleep the retry interval after every stall.
    pub async fn run(&mut self) {
        info!(
            run = %self.run,
            source = %self.source.display(),
            clip_length = self.settings.clip_length_seconds,
            "segmenter started"
        );
        loop {
            if let StepOutcome::Stalled(_) = self.step().await {
                sleep(self.settings.retry_interval).await;
                self.state = SegmenterState::Probing;
            }
        }
    }

    /// One probe, and a cut if the window is covered. Does not sleep.
    pub async fn step(&mut self) -> StepOutcome {
        self.state = SegmenterState::Probing;
        let window = self.next_window();

        let known_seconds = match self.prober.probe(&self.source).await {
            Ok(ProbeStatus::Ready { seconds }) => seconds,
            Ok(ProbeStatus::NotReady) => return self.stall(window, StallReason::SourceNotReady),
            Err(err) => {
                return self.stall(window, StallReason::ProbeFailed(err.to_string()));
            }
        };
        if !window.is_covered_by(known_seconds) {
            return self.stall(
                window,
                StallReason::WindowPending {
                    known_seconds,
                    needed_seconds: window.end,
                },
            );
        }

        self.state = SegmenterState::Ready;
        let output = self.layout.clip_path(&self.run, window);

        self.state = SegmenterState::Cutting;
        let bytes = match self.cutter.cut(&self.source, &output, window).await {
            Ok(CutOutcome::Produced { bytes, .. }) => bytes,
            Ok(CutOutcome::NoOutput) => return self.stall(window, StallReason::MissingArtifact),
            Err(err) => return self.stall(window, StallReason::CutFailed(err.to_string())),
        };
        // The artifact on disk is the only proof of success, whatever the cutter said.
        match fs::try_exists(&output).await {
            Ok(true) => {}
            _ => return self.stall(window, StallReason::MissingArtifact),
        }

        let artifact = ClipArtifact {
            run: self.run.clone(),
            index: self.cursor,
            window,
            path: output,
            bytes,
            created_at: Utc::now(),
        };
        self.state = SegmenterState::Advanced;
        self.cursor += 1;
        info!(
            run = %artifact.run,
            index = artifact.index,
            window = %artifact.window,
            path = %artifact.path.display(),
            "clipped"
        );
        if let Some(events) = &self.events {
            let _ = events.send(artifact.clone());
        }
        StepOutcome::Advanced(artifact)
    }

    fn stall(&mut self, window: ClipWindow, reason: StallReason) -> StepOutcome {
        self.state = SegmenterState::Stalled;
        match &reason {
            StallReason::SourceNotReady => {
                debug!(source = %self.source.display(), "source not ready")
            }
            StallReason::WindowPending {
                known_seconds,
                needed_seconds,
            } => debug!(
                window = %window,
                known_seconds,
                needed_seconds,
                "window not yet covered"
            ),
            StallReason::ProbeFailed(message) => {
                error!(source = %self.source.display(), error = %message, "duration probe failed")
            }
            StallReason::CutFailed(message) => {
                error!(window = %window, error = %message, "clip cut failed")
            }
            StallReason::MissingArtifact => {
                warn!(window = %window, "cut produced no artifact; retrying")
            }
        }
        StepOutcome::Stalled(reason)
    }
}
