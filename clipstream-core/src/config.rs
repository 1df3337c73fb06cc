use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "configs/clipstream.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ClipstreamConfig {
    pub paths: PathsSection,
    pub tools: ToolsSection,
    pub ffmpeg: FfmpegSection,
    pub segmenter: SegmenterSection,
    pub resolver: ResolverSection,
}

impl ClipstreamConfig {
    pub fn validate(&self) -> Result<()> {
        if self.segmenter.clip_length_seconds == 0 {
            return Err(ConfigError::Invalid {
                key: "segmenter.clip_length_seconds",
                reason: "must be greater than zero".into(),
            });
        }
        if self.segmenter.retry_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "segmenter.retry_interval_ms",
                reason: "must be greater than zero".into(),
            });
        }
        let extension = self.segmenter.clip_extension.trim_start_matches('.');
        if extension.is_empty() {
            return Err(ConfigError::Invalid {
                key: "segmenter.clip_extension",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    pub source_dir: PathBuf,
    pub clips_dir: PathBuf,
    pub extract_dir: PathBuf,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("livestream-source"),
            clips_dir: PathBuf::from("clips"),
            extract_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub ytdlp: PathBuf,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            ytdlp: PathBuf::from("yt-dlp"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FfmpegSection {
    pub log_level: String,
}

impl Default for FfmpegSection {
    fn default() -> Self {
        Self {
            log_level: "error".to_string(),
        }
    }
}

impl FfmpegSection {
    /// Arguments placed before every ffmpeg invocation.
    pub fn base_args(&self) -> Vec<String> {
        let mut args = vec!["-hide_banner".to_string(), "-nostdin".to_string()];
        if !self.log_level.is_empty() {
            args.push("-loglevel".to_string());
            args.push(self.log_level.clone());
        }
        args
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SegmenterSection {
    pub clip_length_seconds: u64,
    pub retry_interval_ms: u64,
    pub clip_extension: String,
}

impl Default for SegmenterSection {
    fn default() -> Self {
        Self {
            clip_length_seconds: 10,
            retry_interval_ms: 1000,
            clip_extension: "mp4".to_string(),
        }
    }
}

impl SegmenterSection {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverSection {
    pub hosts: Vec<String>,
}

impl Default for ResolverSection {
    fn default() -> Self {
        Self {
            hosts: vec![
                "www.youtube.com".to_string(),
                "youtube.com".to_string(),
                "m.youtube.com".to_string(),
                "youtu.be".to_string(),
            ],
        }
    }
}

pub fn load_clipstream_config<P: AsRef<Path>>(path: P) -> Result<ClipstreamConfig> {
    let config: ClipstreamConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
