//! Write-then-rename file replacement

use crate::storage::{StorageError, StorageResult};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::Path;

/// Atomically replaces `path` with `contents`
///
/// The bytes are written and synced to a sibling temporary file which is then
/// renamed over the target, so readers observe either the old or the new
/// contents and never a torn write.
pub fn write_atomic(path: &Path, contents: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = Path::new(&tmp_name);

    let mut file = File::create(tmp).map_err(|e| StorageError::io(tmp, e))?;
    file.write_all(contents)
        .and_then(|_| file.sync_all())
        .map_err(|e| StorageError::io(tmp, e))?;
    drop(file);

    fs::rename(tmp, path).map_err(|e| StorageError::io(path, e))?;

    sync_parent_dir(path);
    Ok(())
}

/// Persists the rename itself; not every platform can open a directory
#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}

/// Reads a file, returning None when it does not exist
pub fn read_optional(path: &Path) -> StorageResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::io(path, e)),
    }
}
