use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::addressing::{AddressingError, ClipWindow, RunId, StorageLayout};
use crate::cutter::{CutError, CutOutcome, SegmentCutter};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Addressing(#[from] AddressingError),
    #[error("source file {} does not exist", path.display())]
    SourceMissing { path: PathBuf },
    #[error("error clipping video: {0}")]
    Cut(#[from] CutError),
    #[error("failed to create clip {}", path.display())]
    NoOutput { path: PathBuf },
}

#[derive(Debug, Clone)]
pub struct ExtractRequest {
    pub window: ClipWindow,
    /// Explicit run; the newest source file is used when absent.
    pub run: Option<RunId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractedClip {
    pub run: Option<RunId>,
    pub window: ClipWindow,
    pub source: PathBuf,
    pub path: PathBuf,
    pub bytes: u64,
}

/// One-shot cut of an arbitrary range from a stored source file.
pub async fn extract_clip(
    layout: &StorageLayout,
    cutter: &dyn SegmentCutter,
    request: &ExtractRequest,
) -> Result<ExtractedClip, ExtractError> {
    let (source, run) = match &request.run {
        Some(run) => {
            let source = layout.source_path(run);
            if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
                return Err(ExtractError::SourceMissing { path: source });
            }
            (source, Some(run.clone()))
        }
        None => {
            let located = layout.latest_source()?;
            (located.path, located.run)
        }
    };

    let output = layout.extract_path(run.as_ref(), request.window);
    info!(
        source = %source.display(),
        window = %request.window,
        output = %output.display(),
        "extracting clip"
    );
    match cutter.cut(&source, &output, request.window).await? {
        CutOutcome::Produced { path, bytes } => Ok(ExtractedClip {
            run,
            window: request.window,
            source,
            path,
            bytes,
        }),
        CutOutcome::NoOutput => Err(ExtractError::NoOutput { path: output }),
    }
}
