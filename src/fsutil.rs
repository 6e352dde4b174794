//! Filesystem helpers shared by the packaging stages.

use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::{ShipError, ShipResult};

/// Copy the contents of `src` into `dst`, creating `dst` if needed.
///
/// Symlinks are recreated on Unix and followed elsewhere.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> ShipResult<()> {
    fs::create_dir_all(dst).map_err(|err| ShipError::io("Failed to create directory", dst, err))?;

    for entry in WalkDir::new(src).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|err| {
            ShipError::Execution(format!("Failed to read directory {}: {err}", src.display()))
        })?;
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)
                .map_err(|err| ShipError::io("Failed to create directory", &target, err))?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)
                .map_err(|err| ShipError::io("Failed to copy file", entry.path(), err))?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> ShipResult<()> {
    let link = fs::read_link(src).map_err(|err| ShipError::io("Failed to read symlink", src, err))?;
    if dst.symlink_metadata().is_ok() {
        fs::remove_file(dst).map_err(|err| ShipError::io("Failed to replace file", dst, err))?;
    }
    std::os::unix::fs::symlink(&link, dst)
        .map_err(|err| ShipError::io("Failed to create symlink", dst, err))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> ShipResult<()> {
    if src.is_dir() {
        copy_dir_recursive(src, dst)
    } else {
        fs::copy(src, dst)
            .map(|_| ())
            .map_err(|err| ShipError::io("Failed to copy file", src, err))
    }
}

/// Remove a file, symlink or whole directory tree.
pub fn remove_path(path: &Path) -> ShipResult<()> {
    let metadata = path
        .symlink_metadata()
        .map_err(|err| ShipError::io("Failed to inspect path", path, err))?;
    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|err| ShipError::io("Failed to remove path", path, err))
}

/// Delete every directory below `root` that is empty once its own empty
/// children are gone. `root` itself is kept. Returns the number removed.
pub fn prune_empty_directories(root: &Path) -> ShipResult<usize> {
    let mut removed = 0usize;
    for entry in WalkDir::new(root).min_depth(1).contents_first(true) {
        let entry = entry.map_err(|err| {
            ShipError::Execution(format!("Failed to read directory {}: {err}", root.display()))
        })?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let is_empty = fs::read_dir(entry.path())
            .map_err(|err| ShipError::io("Failed to read directory", entry.path(), err))?
            .next()
            .is_none();
        if is_empty {
            fs::remove_dir(entry.path())
                .map_err(|err| ShipError::io("Failed to remove directory", entry.path(), err))?;
            removed += 1;
        }
    }
    Ok(removed)
}
