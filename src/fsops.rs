//! Low-level filesystem primitives shared by the executor (C5) and the
//! trash store (C6): atomic moves with a cross-device fallback, and a copy
//! that fsyncs before returning so callers can trust the bytes landed.

use std::fs::{self, File};
use std::path::Path;

use crate::error::{Error, Result};

/// Renames `src` to `dst`. On `EXDEV` (cross-filesystem), falls back to
/// copy + fsync(file) + fsync(parent dir) + remove so a crash mid-fallback
/// never leaves both a partial copy and the original gone.
pub fn move_path_atomic(src: &Path, dst: &Path) -> Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => return Ok(()),
        Err(e) if e.raw_os_error() == Some(libc_exdev()) => {}
        Err(e) => return Err(Error::filesystem(src, e)),
    }

    copy_file_fsynced(src, dst)?;
    fs::remove_file(src).map_err(|e| Error::filesystem(src, e))?;
    Ok(())
}

/// Copies `src` to `dst`, fsyncing the new file and its parent directory
/// before returning, so the bytes are durable even across a crash.
pub fn copy_file_fsynced(src: &Path, dst: &Path) -> Result<()> {
    fs::copy(src, dst).map_err(|e| Error::filesystem(src, e))?;

    let file = File::open(dst).map_err(|e| Error::filesystem(dst, e))?;
    file.sync_all().map_err(|e| Error::filesystem(dst, e))?;
    drop(file);

    if let Some(parent) = dst.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

// EXDEV is 18 on Linux and most other unices; avoid a libc dependency for
// a single constant.
#[cfg(unix)]
fn libc_exdev() -> i32 {
    18
}

#[cfg(not(unix))]
fn libc_exdev() -> i32 {
    i32::MIN
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::filesystem(parent, e))?;
    }
    Ok(())
}

pub fn path_exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn move_path_atomic_moves_file_within_same_filesystem() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("b.txt");
        std::fs::write(&src, b"hello").unwrap();

        move_path_atomic(&src, &dst).unwrap();
        assert!(!src.exists());
        assert_eq!(std::fs::read(&dst).unwrap(), b"hello");
    }

    #[test]
    fn copy_file_fsynced_preserves_bytes() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("b.txt");
        std::fs::write(&src, b"preserved").unwrap();

        copy_file_fsynced(&src, &dst).unwrap();
        assert!(src.exists());
        assert_eq!(std::fs::read(&dst).unwrap(), b"preserved");
    }

    #[test]
    fn ensure_parent_dir_creates_missing_directories() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("nested/deep/file.txt");
        ensure_parent_dir(&target).unwrap();
        assert!(target.parent().unwrap().is_dir());
    }
}
