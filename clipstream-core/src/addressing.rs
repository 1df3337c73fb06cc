//! File naming shared by the live segmenter and standalone extraction.
//!
//! Source files are `livestream_<run>.ts`; clip artifacts are
//! `clip_<run>_<start>_<end>.<ext>` with both bounds zero-padded to five digits so that a
//! directory listing sorts chronologically. The run field is dropped when the run is unknown.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;

use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use walkdir::WalkDir;

use crate::config::{ClipstreamConfig, PathsSection};

pub const SOURCE_PREFIX: &str = "livestream";
pub const SOURCE_EXTENSION: &str = "ts";
pub const CLIP_PREFIX: &str = "clip";
pub const BOUND_WIDTH: usize = 5;

#[derive(Debug, Error)]
pub enum AddressingError {
    #[error("no livestream files found in {}", dir.display())]
    NoSourceFiles { dir: PathBuf },
    #[error("invalid run identifier {0:?}: expected ASCII letters, digits or '-'")]
    InvalidRunId(String),
    #[error("invalid clip window [{start}, {end}): end must be greater than start")]
    InvalidWindow { start: u64, end: u64 },
    #[error("io error at {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
}

pub type AddressingResult<T> = Result<T, AddressingError>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new(value: impl Into<String>) -> AddressingResult<Self> {
        let value = value.into();
        let valid = !value.is_empty()
            && value
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-');
        if valid {
            Ok(Self(value))
        } else {
            Err(AddressingError::InvalidRunId(value))
        }
    }

    /// Identifier for a run starting now: Unix seconds.
    pub fn now() -> Self {
        Self(Utc::now().timestamp().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Half-open `[start, end)` range in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ClipWindow {
    pub start: u64,
    pub end: u64,
}

impl ClipWindow {
    pub fn new(start: u64, end: u64) -> AddressingResult<Self> {
        if end <= start {
            return Err(AddressingError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// Window `index` of a timeline tiled by `length`-second windows from zero.
    pub fn at_index(index: u64, length: u64) -> Self {
        let start = index * length;
        Self {
            start,
            end: start + length,
        }
    }

    pub fn length(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_covered_by(&self, known_seconds: u64) -> bool {
        known_seconds >= self.end
    }
}

impl fmt::Display for ClipWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipAddress {
    pub run: Option<RunId>,
    pub window: ClipWindow,
    pub extension: String,
}

pub fn source_file_name(run: &RunId) -> String {
    format!("{SOURCE_PREFIX}_{run}.{SOURCE_EXTENSION}")
}

pub fn clip_file_name(run: Option<&RunId>, window: ClipWindow, extension: &str) -> String {
    let extension = extension.trim_start_matches('.');
    match run {
        Some(run) => format!(
            "{CLIP_PREFIX}_{run}_{:0width$}_{:0width$}.{extension}",
            window.start,
            window.end,
            width = BOUND_WIDTH
        ),
        None => format!(
            "{CLIP_PREFIX}_{:0width$}_{:0width$}.{extension}",
            window.start,
            window.end,
            width = BOUND_WIDTH
        ),
    }
}

/// Recovers the run identifier from a source file name by field position: the field after
/// the first `_`, minus the `.ts` suffix.
pub fn parse_source_file_name(name: &str) -> Option<RunId> {
    let mut fields = name.splitn(2, '_');
    if fields.next()? != SOURCE_PREFIX {
        return None;
    }
    let run = fields
        .next()?
        .strip_suffix(&format!(".{SOURCE_EXTENSION}"))?;
    RunId::new(run).ok()
}

pub fn parse_clip_file_name(name: &str) -> Option<ClipAddress> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^clip_(?:([A-Za-z0-9-]+)_)?(\d{5,})_(\d{5,})\.([A-Za-z0-9]+)$")
            .expect("clip name pattern is valid")
    });
    let captures = pattern.captures(name)?;
    let run = match captures.get(1) {
        Some(run) => Some(RunId::new(run.as_str()).ok()?),
        None => None,
    };
    let start = captures.get(2)?.as_str().parse().ok()?;
    let end = captures.get(3)?.as_str().parse().ok()?;
    let window = ClipWindow::new(start, end).ok()?;
    Some(ClipAddress {
        run,
        window,
        extension: captures.get(4)?.as_str().to_string(),
    })
}

/// Directory layout for one invocation, resolved from configuration.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub source_dir: PathBuf,
    pub clips_dir: PathBuf,
    pub extract_dir: PathBuf,
    pub clip_extension: String,
}

impl StorageLayout {
    pub fn from_config(config: &ClipstreamConfig) -> Self {
        Self::resolve(&config.paths, &config.segmenter.clip_extension, None)
    }

    /// Relative directories are joined onto `base` when one is given.
    pub fn resolve(paths: &PathsSection, clip_extension: &str, base: Option<&Path>) -> Self {
        let resolve = |candidate: &Path| match base {
            Some(base) if candidate.is_relative() => base.join(candidate),
            _ => candidate.to_path_buf(),
        };
        Self {
            source_dir: resolve(&paths.source_dir),
            clips_dir: resolve(&paths.clips_dir),
            extract_dir: resolve(&paths.extract_dir),
            clip_extension: clip_extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn source_path(&self, run: &RunId) -> PathBuf {
        self.source_dir.join(source_file_name(run))
    }

    pub fn clip_path(&self, run: &RunId, window: ClipWindow) -> PathBuf {
        self.clips_dir
            .join(clip_file_name(Some(run), window, &self.clip_extension))
    }

    pub fn extract_path(&self, run: Option<&RunId>, window: ClipWindow) -> PathBuf {
        self.extract_dir
            .join(clip_file_name(run, window, &self.clip_extension))
    }

    pub fn ensure_dirs(&self) -> AddressingResult<()> {
        for dir in [&self.source_dir, &self.clips_dir] {
            std::fs::create_dir_all(dir).map_err(|source| AddressingError::Io {
                source,
                path: dir.clone(),
            })?;
        }
        Ok(())
    }

    /// Most recently modified source file and the run decoded from its name.
    ///
    /// Racy when several runs write into the same directory; the newest file wins.
    pub fn latest_source(&self) -> AddressingResult<LocatedSource> {
        if !self.source_dir.exists() {
            return Err(AddressingError::NoSourceFiles {
                dir: self.source_dir.clone(),
            });
        }
        let mut newest: Option<(SystemTime, PathBuf)> = None;
        for entry in WalkDir::new(&self.source_dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|err| AddressingError::Io {
                path: err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| self.source_dir.clone()),
                source: err
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::other("directory walk failed")),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let modified = entry
                .metadata()
                .ok()
                .and_then(|meta| meta.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            let is_newer = newest
                .as_ref()
                .map(|(current, _)| modified > *current)
                .unwrap_or(true);
            if is_newer {
                newest = Some((modified, entry.into_path()));
            }
        }
        let Some((_, path)) = newest else {
            return Err(AddressingError::NoSourceFiles {
                dir: self.source_dir.clone(),
            });
        };
        let run = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(parse_source_file_name);
        Ok(LocatedSource { path, run })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedSource {
    pub path: PathBuf,
    pub run: Option<RunId>,
}

#[cfg(test)]
mod tests {
    use std::fs::{self, File};
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;

    fn layout(root: &Path) -> StorageLayout {
        StorageLayout::resolve(&PathsSection::default(), "mp4", Some(root))
    }

    #[test]
    fn bounds_are_zero_padded_to_five_digits() {
        let run = RunId::new("1700000000").unwrap();
        let window = ClipWindow::new(5, 15).unwrap();
        assert_eq!(
            clip_file_name(Some(&run), window, "mp4"),
            "clip_1700000000_00005_00015.mp4"
        );
        assert_eq!(clip_file_name(None, window, ".mp4"), "clip_00005_00015.mp4");
    }

    #[test]
    fn clip_name_round_trips() {
        let run = RunId::new("1700000000").unwrap();
        let window = ClipWindow::new(10, 20).unwrap();
        let name = clip_file_name(Some(&run), window, "mp4");
        let decoded = parse_clip_file_name(&name).unwrap();
        assert_eq!(decoded.run, Some(run));
        assert_eq!(decoded.window.start, 10);
        assert_eq!(decoded.window.end, 20);
        assert_eq!(decoded.extension, "mp4");

        let anonymous = parse_clip_file_name("clip_00005_00015.mp4").unwrap();
        assert_eq!(anonymous.run, None);
        assert_eq!(anonymous.window, ClipWindow::new(5, 15).unwrap());
    }

    #[test]
    fn bounds_wider_than_padding_still_decode() {
        let run = RunId::new("42").unwrap();
        let window = ClipWindow::new(99_990, 100_000).unwrap();
        let name = clip_file_name(Some(&run), window, "mp4");
        assert_eq!(name, "clip_42_99990_100000.mp4");
        assert_eq!(parse_clip_file_name(&name).unwrap().window, window);
    }

    #[test]
    fn source_name_round_trips() {
        let run = RunId::new("1700000000").unwrap();
        let name = source_file_name(&run);
        assert_eq!(name, "livestream_1700000000.ts");
        assert_eq!(parse_source_file_name(&name), Some(run));
        assert_eq!(parse_source_file_name("livestream.ts"), None);
        assert_eq!(parse_source_file_name("other_1700000000.ts"), None);
        assert_eq!(parse_source_file_name("livestream_1700000000.mp4"), None);
    }

    #[test]
    fn run_ids_reject_separators() {
        assert!(RunId::new("abc-123").is_ok());
        assert!(matches!(
            RunId::new("a_b"),
            Err(AddressingError::InvalidRunId(_))
        ));
        assert!(RunId::new("").is_err());
        assert!(RunId::new("../x").is_err());
    }

    #[test]
    fn windows_tile_the_timeline() {
        assert_eq!(ClipWindow::at_index(0, 10), ClipWindow::new(0, 10).unwrap());
        assert_eq!(ClipWindow::at_index(2, 10), ClipWindow::new(20, 30).unwrap());
        let window = ClipWindow::at_index(1, 10);
        assert!(!window.is_covered_by(19));
        assert!(window.is_covered_by(20));
        assert!(ClipWindow::new(10, 10).is_err());
    }

    #[test]
    fn latest_source_fails_when_directory_is_empty() {
        let temp = TempDir::new().unwrap();
        let layout = layout(temp.path());
        assert!(matches!(
            layout.latest_source(),
            Err(AddressingError::NoSourceFiles { .. })
        ));
        layout.ensure_dirs().unwrap();
        let err = layout.latest_source().unwrap_err();
        assert!(err.to_string().starts_with("no livestream files found"));
    }

    #[test]
    fn latest_source_picks_newest_file() {
        let temp = TempDir::new().unwrap();
        let layout = layout(temp.path());
        layout.ensure_dirs().unwrap();
        let older = layout.source_path(&RunId::new("100").unwrap());
        let newer = layout.source_path(&RunId::new("200").unwrap());
        fs::write(&newer, b"new").unwrap();
        fs::write(&older, b"old").unwrap();
        let base = SystemTime::now();
        File::options()
            .write(true)
            .open(&older)
            .unwrap()
            .set_modified(base - Duration::from_secs(60))
            .unwrap();
        File::options()
            .write(true)
            .open(&newer)
            .unwrap()
            .set_modified(base)
            .unwrap();
        fs::create_dir_all(layout.source_dir.join("nested")).unwrap();

        let located = layout.latest_source().unwrap();
        assert_eq!(located.path, newer);
        assert_eq!(located.run, Some(RunId::new("200").unwrap()));
    }

    #[test]
    fn latest_source_tolerates_foreign_names() {
        let temp = TempDir::new().unwrap();
        let layout = layout(temp.path());
        layout.ensure_dirs().unwrap();
        let path = layout.source_dir.join("capture.ts");
        fs::write(&path, b"data").unwrap();
        let located = layout.latest_source().unwrap();
        assert_eq!(located.path, path);
        assert_eq!(located.run, None);
        assert_eq!(
            layout.extract_path(None, ClipWindow::new(0, 5).unwrap()),
            temp.path().join(".").join("clip_00000_00005.mp4")
        );
    }
}
