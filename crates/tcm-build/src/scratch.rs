use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Uniquely named working directory for one pipeline run.
///
/// `remove` reclaims it explicitly; dropping the value reclaims it as well,
/// so an unwinding run never leaks the directory.
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    pub async fn create(base: &Path) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(base).await?;
        let base = base.to_path_buf();
        let dir = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new().prefix("tcm-build-").tempdir_in(base)
        })
        .await
        .map_err(std::io::Error::other)??;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub async fn remove(self) -> std::io::Result<PathBuf> {
        let path = self.dir.path().to_path_buf();
        tokio::task::spawn_blocking(move || self.dir.close())
            .await
            .map_err(std::io::Error::other)??;
        Ok(path)
    }
}
