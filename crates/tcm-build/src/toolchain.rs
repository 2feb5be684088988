use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tcm_core::proto::Platform;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::command::{CommandEnd, run_streaming};
use crate::progress::StageSink;

/// Native build collaborator: generates build files into the scratch
/// directory, then compiles them in place.
#[async_trait]
pub trait BuildToolchain: Send + Sync {
    async fn generate(
        &self,
        source_root: &Path,
        scratch: &Path,
        platform: Platform,
        sink: &StageSink,
        cancel: &CancellationToken,
    ) -> Result<(), String>;

    async fn compile(
        &self,
        scratch: &Path,
        platform: Platform,
        sink: &StageSink,
        cancel: &CancellationToken,
    ) -> Result<(), String>;
}

pub struct CmakeToolchain {
    cmake: PathBuf,
    extra_args: Vec<String>,
}

impl CmakeToolchain {
    pub fn new(cmake: impl Into<PathBuf>, extra_args: Vec<String>) -> Self {
        Self {
            cmake: cmake.into(),
            extra_args,
        }
    }

    fn generate_command(&self, source_root: &Path, scratch: &Path, platform: Platform) -> Command {
        let mut cmd = Command::new(&self.cmake);
        cmd.arg("-S").arg(source_root).arg("-B").arg(scratch);
        cmd.arg("-DCMAKE_BUILD_TYPE=Release");

        // multi-config generators append the config name themselves, so both
        // layouts end up in <scratch>/bin/Release
        if cfg!(windows) {
            cmd.arg("-A").arg(match platform {
                Platform::X64 => "x64",
                Platform::X86 => "Win32",
            });
            cmd.arg(format!("-DCMAKE_RUNTIME_OUTPUT_DIRECTORY={}", scratch.join("bin").display()));
        } else {
            if platform == Platform::X86 {
                cmd.arg("-DCMAKE_C_FLAGS=-m32").arg("-DCMAKE_CXX_FLAGS=-m32");
            }
            cmd.arg(format!(
                "-DCMAKE_RUNTIME_OUTPUT_DIRECTORY={}",
                scratch.join("bin").join("Release").display()
            ));
        }
        cmd.args(&self.extra_args);
        cmd
    }

    fn compile_command(&self, scratch: &Path) -> Command {
        let mut cmd = Command::new(&self.cmake);
        cmd.arg("--build")
            .arg(scratch)
            .arg("--config")
            .arg("Release")
            .arg("--parallel");
        cmd
    }
}

#[async_trait]
impl BuildToolchain for CmakeToolchain {
    async fn generate(
        &self,
        source_root: &Path,
        scratch: &Path,
        platform: Platform,
        sink: &StageSink,
        cancel: &CancellationToken,
    ) -> Result<(), String> {
        info!("generating {platform} build files for {}", source_root.display());
        let cmd = self.generate_command(source_root, scratch, platform);
        run_to_completion(cmd, sink, cancel, "cmake").await
    }

    async fn compile(
        &self,
        scratch: &Path,
        platform: Platform,
        sink: &StageSink,
        cancel: &CancellationToken,
    ) -> Result<(), String> {
        info!("compiling {platform} build in {}", scratch.display());
        let cmd = self.compile_command(scratch);
        run_to_completion(cmd, sink, cancel, "cmake --build").await
    }
}

async fn run_to_completion(
    cmd: Command,
    sink: &StageSink,
    cancel: &CancellationToken,
    what: &str,
) -> Result<(), String> {
    let end = run_streaming(cmd, cancel, |line| sink.line(line))
        .await
        .map_err(|err| format!("failed to run {what}: {err}"))?;
    match end {
        CommandEnd::Exited(status) if status.success() => Ok(()),
        CommandEnd::Exited(status) => Err(format!("{what} exited with {status}")),
        CommandEnd::Cancelled => Err(format!("{what} cancelled")),
    }
}
