use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::command::{CommandEnd, run_streaming};
use crate::progress::StageSink;

/// Version-control collaborator used by the sync stage.
///
/// `clone_fresh` reports fractional progress, `pull` reports its transcript
/// line by line. Both observe `cancel` between units of work.
#[async_trait]
pub trait SourceRepository: Send + Sync {
    async fn clone_fresh(
        &self,
        destination: &Path,
        sink: &StageSink,
        cancel: &CancellationToken,
    ) -> Result<(), String>;

    async fn pull(&self, path: &Path, sink: &StageSink, cancel: &CancellationToken) -> Result<(), String>;
}

/// Drives the `git` command line.
pub struct GitRepository {
    git: PathBuf,
    url: String,
    branch: String,
}

impl GitRepository {
    pub fn new(git: impl Into<PathBuf>, url: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            git: git.into(),
            url: url.into(),
            branch: branch.into(),
        }
    }
}

#[async_trait]
impl SourceRepository for GitRepository {
    async fn clone_fresh(
        &self,
        destination: &Path,
        sink: &StageSink,
        cancel: &CancellationToken,
    ) -> Result<(), String> {
        info!("cloning {} ({}) into {}", self.url, self.branch, destination.display());
        let mut cmd = Command::new(&self.git);
        cmd.arg("clone")
            .arg("--progress")
            .arg("--branch")
            .arg(&self.branch)
            .arg(&self.url)
            .arg(destination);

        let end = run_streaming(cmd, cancel, |line| match clone_progress(line) {
            Some(percent) => sink.percent(percent),
            None => sink.line(line),
        })
        .await
        .map_err(|err| format!("failed to run git: {err}"))?;
        check_exit(end, "git clone")
    }

    async fn pull(&self, path: &Path, sink: &StageSink, cancel: &CancellationToken) -> Result<(), String> {
        info!("pulling {} in {}", self.branch, path.display());
        let mut cmd = Command::new(&self.git);
        cmd.arg("-C")
            .arg(path)
            .arg("pull")
            .arg("--progress")
            .arg("origin")
            .arg(&self.branch);

        let end = run_streaming(cmd, cancel, |line| sink.line(line))
            .await
            .map_err(|err| format!("failed to run git: {err}"))?;
        check_exit(end, "git pull")
    }
}

fn check_exit(end: CommandEnd, what: &str) -> Result<(), String> {
    match end {
        CommandEnd::Exited(status) if status.success() => Ok(()),
        CommandEnd::Exited(status) => Err(format!("{what} exited with {status}")),
        CommandEnd::Cancelled => Err(format!("{what} cancelled")),
    }
}

/// Map git's transfer progress onto one 0-100 scale: receiving objects
/// covers the first 90%, resolving deltas the rest.
fn clone_progress(line: &str) -> Option<f64> {
    let (phase, rest) = line.split_once(':')?;
    let percent = rest.trim_start().split('%').next()?.trim().parse::<f64>().ok()?;
    match phase.trim() {
        "Receiving objects" => Some(percent * 0.9),
        "Resolving deltas" => Some(90.0 + percent * 0.1),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_progress_spans_both_phases() {
        assert_eq!(clone_progress("Receiving objects:  50% (500/1000), 1.2 MiB"), Some(45.0));
        assert_eq!(clone_progress("Resolving deltas: 100% (20/20), done."), Some(100.0));
        assert_eq!(clone_progress("remote: Counting objects: 12% (1/8)"), None);
        assert_eq!(clone_progress("Cloning into 'TrinityCore'..."), None);
    }
}
