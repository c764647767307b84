//! Primitives for the runtime files shared with `guild`.

use std::fs::{self, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tempfile::Builder;

const RUNTIME_FILE_MODE: u32 = 0o600;

/// Replaces `path` with `contents` through a synced sibling temp file, so
/// `guild status` never reads a torn pid or health record.
pub(super) fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    let (Some(directory), Some(name)) = (path.parent(), path.file_name()) else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("runtime file {} has no parent directory", path.display()),
        ));
    };
    let mut staged = Builder::new()
        .prefix(name)
        .suffix(".tmp")
        .permissions(Permissions::from_mode(RUNTIME_FILE_MODE))
        .tempfile_in(directory)?;
    staged.write_all(contents)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|error| error.error)?;
    Ok(())
}

/// Removes `path`; returns whether a file was there.
pub(super) fn remove_if_present(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(error) => Err(error),
    }
}

/// Reads a pid record; unreadable or malformed records yield `None`.
pub(super) fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}
