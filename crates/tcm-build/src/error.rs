use tcm_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("source root is not configured")]
    SourceRootNotConfigured,

    #[error("this host cannot build for {0}")]
    UnsupportedPlatform(tcm_core::proto::Platform),

    #[error("source sync in progress, wait until it has finished")]
    SyncInProgress,

    #[error("compile in progress, wait until it has finished")]
    CompileInProgress,

    #[error("deploying build artifacts, the run can no longer be cancelled")]
    DeployInProgress,

    #[error("compile aborted")]
    Cancelled,
}

impl From<BuildError> for CoreError {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::SourceRootNotConfigured | BuildError::UnsupportedPlatform(_) => {
                CoreError::InvalidConfig(err.to_string())
            }
            BuildError::SyncInProgress
            | BuildError::CompileInProgress
            | BuildError::DeployInProgress => CoreError::Busy(err.to_string()),
            BuildError::Cancelled => CoreError::Cancelled(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_conflicts_surface_as_busy() {
        for err in [
            BuildError::SyncInProgress,
            BuildError::CompileInProgress,
            BuildError::DeployInProgress,
        ] {
            assert!(matches!(CoreError::from(err), CoreError::Busy(_)));
        }
        assert!(matches!(
            CoreError::from(BuildError::Cancelled),
            CoreError::Cancelled(_)
        ));
    }
}
