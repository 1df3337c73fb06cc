use std::path::Path;
use std::process::Output;

use tokio::process::Command;

#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, command: &mut Command) -> std::io::Result<Output>;
}

#[derive(Debug, Default)]
pub struct SystemCommandExecutor;

#[async_trait::async_trait]
impl CommandExecutor for SystemCommandExecutor {
    async fn run(&self, command: &mut Command) -> std::io::Result<Output> {
        command.output().await
    }
}

pub(crate) fn build_command(program: &Path, args: &[String]) -> Command {
    let mut command = Command::new(program);
    for arg in args {
        command.arg(arg);
    }
    command
}

pub(crate) fn render_command(program: &Path, args: &[String]) -> String {
    format!("{} {}", program.display(), args.join(" "))
}

/// Stderr first since that is where ffmpeg and friends report; stdout as a fallback.
pub(crate) fn diagnostic_output(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !stderr.is_empty() {
        return stderr;
    }
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}
