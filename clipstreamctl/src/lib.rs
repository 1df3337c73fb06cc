use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::error;
use tracing_subscriber::EnvFilter;

use clipstream_core::{
    extract_clip, load_clipstream_config, AddressingError, ClipArtifact, ClipWindow,
    ClipstreamConfig, ExtractError, ExtractRequest, ExtractedClip, FfmpegCutter, LiveSession,
    RunId, SessionError, SessionInfo, StorageLayout, DEFAULT_CONFIG_PATH,
};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] clipstream_core::ConfigError),
    #[error("{0}")]
    Session(#[from] SessionError),
    #[error("{0}")]
    Extract(#[from] ExtractError),
    #[error("{0}")]
    Addressing(#[from] AddressingError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Live stream capture and clip slicing", long_about = None)]
pub struct Cli {
    /// Path to clipstream.toml (defaults to configs/clipstream.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Capture a live stream and cut it into fixed-length clips as it grows
    Live(LiveArgs),
    /// Cut an arbitrary range out of a stored capture
    Extract(ExtractArgs),
}

#[derive(Args, Debug)]
pub struct LiveArgs {
    /// Stream URL or site page (e.g. https://www.youtube.com/watch?v=12345)
    #[arg(short = 'u', long = "url", value_name = "URL")]
    pub url: String,
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Start of the range, in seconds
    pub start: u64,
    /// End of the range, in seconds (exclusive)
    pub end: u64,
    /// Run identifier of the capture; the newest capture is used when omitted
    pub run_id: Option<String>,
}

pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub async fn run(cli: Cli) -> Result<()> {
    let context = AppContext::new(&cli)?;

    match &cli.command {
        Commands::Live(args) => context.live(args, cli.format).await,
        Commands::Extract(args) => {
            let clip = context.extract(args).await?;
            render(&clip, cli.format)
        }
    }
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
struct AppContext {
    config: ClipstreamConfig,
    layout: StorageLayout,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let config = load_config(cli.config.as_deref())?;
        let layout = StorageLayout::from_config(&config);
        Ok(Self { config, layout })
    }

    async fn live(&self, args: &LiveArgs, format: OutputFormat) -> Result<()> {
        let session = LiveSession::builder(self.config.clone())
            .layout(self.layout.clone())
            .prepare(&args.url)
            .await?;
        render(session.info(), format)?;

        let (tx, mut rx) = mpsc::unbounded_channel::<ClipArtifact>();
        let session = session.with_events(tx);
        tokio::spawn(async move {
            while let Some(artifact) = rx.recv().await {
                if let Err(err) = render(&artifact, format) {
                    error!(error = %err, "failed to render clip notice");
                }
            }
        });
        session.run().await;
        Ok(())
    }

    async fn extract(&self, args: &ExtractArgs) -> Result<ExtractedClip> {
        let window = ClipWindow::new(args.start, args.end)?;
        let run = args.run_id.clone().map(RunId::new).transpose()?;
        let cutter = FfmpegCutter::new(
            self.config.tools.ffmpeg.clone(),
            self.config.ffmpeg.clone(),
            None,
        );
        let request = ExtractRequest { window, run };
        Ok(extract_clip(&self.layout, &cutter, &request).await?)
    }
}

/// Explicit path must load; the default path is optional.
fn load_config(explicit: Option<&Path>) -> Result<ClipstreamConfig> {
    match explicit {
        Some(path) => Ok(load_clipstream_config(path)?),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            Ok(load_clipstream_config(DEFAULT_CONFIG_PATH)?)
        }
        None => Ok(ClipstreamConfig::default()),
    }
}

impl DisplayFallback for SessionInfo {
    fn display(&self) -> String {
        format!(
            "capturing run {run} into {source}; {length}s clips in {clips}",
            run = self.run,
            source = self.source.display(),
            length = self.clip_length_seconds,
            clips = self.clips_dir.display()
        )
    }
}

impl DisplayFallback for ClipArtifact {
    fn display(&self) -> String {
        format!("clipped {}", self.path.display())
    }
}

impl DisplayFallback for ExtractedClip {
    fn display(&self) -> String {
        format!("Clip created successfully: {}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> std::result::Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("clipstreamctl").chain(args.iter().copied()))
    }

    #[test]
    fn live_requires_url() {
        assert!(parse(&["live"]).is_err());
        let cli = parse(&["live", "-u", "https://www.youtube.com/watch?v=12345"]).unwrap();
        match cli.command {
            Commands::Live(args) => assert_eq!(args.url, "https://www.youtube.com/watch?v=12345"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn extract_positionals_must_be_numeric() {
        assert!(parse(&["extract", "10"]).is_err());
        assert!(parse(&["extract", "ten", "20"]).is_err());
        let cli = parse(&["extract", "10", "20", "1700000000", "--format", "json"]).unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Commands::Extract(args) => {
                assert_eq!((args.start, args.end), (10, 20));
                assert_eq!(args.run_id.as_deref(), Some("1700000000"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    fn context_in(temp: &TempDir) -> AppContext {
        let config_path = temp.path().join("clipstream.toml");
        fs::write(
            &config_path,
            format!(
                "[paths]\nsource_dir = {:?}\nclips_dir = {:?}\nextract_dir = {:?}\n",
                temp.path().join("livestream-source"),
                temp.path().join("clips"),
                temp.path(),
            ),
        )
        .unwrap();
        let cli = Cli {
            config: Some(config_path),
            format: OutputFormat::Text,
            verbose: false,
            command: Commands::Extract(ExtractArgs {
                start: 0,
                end: 10,
                run_id: None,
            }),
        };
        AppContext::new(&cli).unwrap()
    }

    #[tokio::test]
    async fn extract_without_captures_reports_no_files() {
        let temp = TempDir::new().unwrap();
        let context = context_in(&temp);
        let err = context
            .extract(&ExtractArgs {
                start: 0,
                end: 10,
                run_id: None,
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no livestream files found"));
    }

    #[tokio::test]
    async fn extract_rejects_inverted_range_and_bad_run_id() {
        let temp = TempDir::new().unwrap();
        let context = context_in(&temp);
        let err = context
            .extract(&ExtractArgs {
                start: 20,
                end: 10,
                run_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Addressing(AddressingError::InvalidWindow { .. })
        ));
        let err = context
            .extract(&ExtractArgs {
                start: 0,
                end: 10,
                run_id: Some("../etc".into()),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Addressing(AddressingError::InvalidRunId(_))
        ));
    }

    #[test]
    fn explicit_config_path_must_exist() {
        let temp = TempDir::new().unwrap();
        let err = load_config(Some(&temp.path().join("missing.toml"))).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn text_rendering_matches_operator_messages() {
        let clip = ExtractedClip {
            run: None,
            window: ClipWindow::new(5, 15).unwrap(),
            source: PathBuf::from("livestream-source/capture.ts"),
            path: PathBuf::from("clip_00005_00015.mp4"),
            bytes: 1,
        };
        assert_eq!(
            clip.display(),
            "Clip created successfully: clip_00005_00015.mp4"
        );
        let json = serde_json::to_value(&clip).unwrap();
        assert_eq!(json["window"]["start"], 5);
        assert_eq!(json["run"], serde_json::Value::Null);
    }
}
