use std::fs;
use std::path::{Path, PathBuf};

/// Copy the release artifacts into the server folder; returns the number of
/// files written. Runs to completion once started.
pub(crate) async fn deploy_artifacts(artifacts: PathBuf, server_folder: PathBuf) -> Result<usize, String> {
    tokio::task::spawn_blocking(move || {
        if !artifacts.is_dir() {
            return Err(format!("no build artifacts at {}", artifacts.display()));
        }
        let mut copied = 0;
        copy_dir_recursive(&artifacts, &server_folder, &mut copied)?;
        Ok(copied)
    })
    .await
    .map_err(|e| format!("join error: {e}"))?
}

fn copy_dir_recursive(src: &Path, dst: &Path, copied: &mut usize) -> Result<(), String> {
    fs::create_dir_all(dst).map_err(|e| format!("create {}: {e}", dst.display()))?;
    for entry in fs::read_dir(src).map_err(|e| format!("read_dir {}: {e}", src.display()))? {
        let entry = entry.map_err(|e| format!("read_dir entry: {e}"))?;
        let path = entry.path();
        let dest = dst.join(entry.file_name());
        if path.is_dir() {
            copy_dir_recursive(&path, &dest, copied)?;
        } else if path.is_file() {
            fs::copy(&path, &dest).map_err(|e| format!("copy {}: {e}", path.display()))?;
            *copied += 1;
        }
    }
    Ok(())
}
