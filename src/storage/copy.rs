//! Recursive directory copy
//!
//! Used by backups, but independent of what is being copied: it knows nothing
//! about progress files or section indexes.

use crate::storage::traits::{StorageError, StorageResult};
use std::fs;
use std::path::Path;

/// Copies the tree at `src` into `dst`, creating `dst` and any parents
///
/// Returns the number of regular files copied. Symbolic links are skipped.
/// Existing files in `dst` with the same name are overwritten.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> StorageResult<u64> {
    let metadata = fs::metadata(src).map_err(|e| StorageError::from_io(src, e))?;
    if !metadata.is_dir() {
        return Err(StorageError::invalid_format(src, "not a directory"));
    }

    fs::create_dir_all(dst).map_err(|e| StorageError::from_io(dst, e))?;

    let mut copied = 0;
    let entries = fs::read_dir(src).map_err(|e| StorageError::from_io(src, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| StorageError::from_io(src, e))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|e| StorageError::from_io(&from, e))?;

        if file_type.is_dir() {
            copied += copy_dir_recursive(&from, &to)?;
        } else if file_type.is_file() {
            fs::copy(&from, &to).map_err(|e| StorageError::from_io(&to, e))?;
            copied += 1;
        } else {
            tracing::debug!("Skipping non-regular file {}", from.display());
        }
    }

    Ok(copied)
}
