pub mod addressing;
pub mod config;
pub mod cutter;
pub mod error;
pub mod exec;
pub mod extract;
pub mod ingest;
pub mod live;
pub mod probe;
pub mod resolver;
pub mod segmenter;

pub use addressing::{
    clip_file_name, parse_clip_file_name, parse_source_file_name, source_file_name,
    AddressingError, ClipAddress, ClipWindow, LocatedSource, RunId, StorageLayout,
};
pub use config::{load_clipstream_config, ClipstreamConfig, DEFAULT_CONFIG_PATH};
pub use cutter::{CutError, CutOutcome, FfmpegCutter, SegmentCutter};
pub use error::{ConfigError, Result};
pub use exec::{CommandExecutor, SystemCommandExecutor};
pub use extract::{extract_clip, ExtractError, ExtractRequest, ExtractedClip};
pub use ingest::{IngestError, IngestReport, IngestionTask};
pub use live::{LiveSession, LiveSessionBuilder, SessionError, SessionInfo};
pub use probe::{DurationProber, FfprobeProber, ProbeError, ProbeStatus};
pub use resolver::{ResolveError, SourceResolver, YtDlpResolver};
pub use segmenter::{
    ClipArtifact, Segmenter, SegmenterSettings, SegmenterState, StallReason, StepOutcome,
};
