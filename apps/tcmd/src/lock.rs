use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::Path;

/// Held for the lifetime of the daemon; the OS releases the lock on exit.
pub struct InstanceLock {
    _file: File,
}

/// `Ok(None)` when another daemon already holds the lock.
pub fn acquire(path: &Path) -> std::io::Result<Option<InstanceLock>> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(path)?;

    match file.try_lock_exclusive() {
        Ok(()) => Ok(Some(InstanceLock { _file: file })),
        Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(None),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_reports_held_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tcmd.lock");

        let first = acquire(&path).unwrap();
        assert!(first.is_some());
        assert!(acquire(&path).unwrap().is_none());

        drop(first);
        assert!(acquire(&path).unwrap().is_some());
    }
}
