//! Source sync, build-file generation, compilation and deployment of the
//! server binaries as one cancellable pipeline.

mod command;
mod deploy;
mod error;
mod pipeline;
mod progress;
mod scratch;
mod state;
mod toolchain;
mod vcs;

pub use error::BuildError;
pub use pipeline::{CompileRequest, Pipeline, PipelineConfig, RunHandle, Submitted};
pub use progress::{ProgressThrottle, StageSink};
pub use scratch::ScratchDir;
pub use toolchain::{BuildToolchain, CmakeToolchain};
pub use vcs::{GitRepository, SourceRepository};
