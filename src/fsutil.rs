//! Filesystem helpers shared by the library store, index store, and ledger.
//!
//! Every artifact this crate writes goes through [`atomic_write_with`]: the
//! bytes land in a temp file in the destination directory, are synced, and
//! are renamed over the target. A reader of the target sees either the old
//! file or the new one, never a partial write.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::fs::{File, Permissions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Write `path` atomically using `write` to fill the temp file.
///
/// The target gets `permissions` when given. Otherwise it gets the mode of a
/// freshly created file (`0o666` less the umask), not the owner-only mode of
/// a temp file. If `write` fails the temp file is removed and `path` is
/// untouched.
pub fn atomic_write_with<F>(path: &Path, permissions: Option<&Permissions>, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let mut builder = tempfile::Builder::new();
    builder.prefix(".librarian-").suffix(".tmp");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(Permissions::from_mode(0o666));
    }
    let mut tmp = builder
        .tempfile_in(&dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;

    write(tmp.as_file_mut())?;
    tmp.as_file_mut().flush()?;
    if let Some(permissions) = permissions {
        tmp.as_file()
            .set_permissions(permissions.clone())
            .with_context(|| format!("failed to set permissions for {}", path.display()))?;
    }
    tmp.as_file().sync_all()?;

    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("failed to rename temp file onto {}", path.display()))?;
    Ok(())
}

pub fn atomic_write(path: &Path, bytes: &[u8], permissions: Option<&Permissions>) -> Result<()> {
    atomic_write_with(path, permissions, |file| {
        file.write_all(bytes)?;
        Ok(())
    })
}

/// Pretty-printed JSON with a trailing newline, written atomically.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut data = serde_json::to_vec_pretty(value)?;
    data.push(b'\n');
    atomic_write(path, &data, None)
}

/// Modification time of `path`.
pub fn mtime(path: &Path) -> Result<DateTime<Utc>> {
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .with_context(|| format!("failed to stat {}", path.display()))?;
    Ok(to_utc(modified))
}

pub fn to_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

/// Ledger representation of a modification time. Nanosecond precision so
/// two writes within the same second still compare unequal.
pub fn format_mtime(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// `path` made absolute against the current directory, without requiring
/// it to exist.
pub fn absolutize(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("failed to resolve {}", path.display()))
}
