//! Filesystem helpers shared by the writers.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path;

/// Write `contents` next to `path` and rename over it, so readers never see a
/// partially written file.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("path without parent '{}'", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("creating parent directory '{}'", parent.display()))?;
    let tmp = path.with_extension(format!("tmp-{}", std::process::id()));
    fs::write(&tmp, contents).with_context(|| format!("writing temp file '{}'", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| {
        format!(
            "renaming temp file '{}' to '{}'",
            tmp.display(),
            path.display()
        )
    })?;
    Ok(())
}

/// Create `path` (and its parents) as an empty file unless it already exists.
pub(crate) fn ensure_placeholder(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory '{}'", parent.display()))?;
    }
    fs::write(path, b"").with_context(|| format!("creating placeholder '{}'", path.display()))?;
    Ok(true)
}

/// Remove a file or directory tree; missing paths are not an error.
pub(crate) fn remove_path(path: &Path) -> Result<bool> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(err) => {
            return Err(err).with_context(|| format!("inspecting '{}'", path.display()));
        }
    };
    if meta.is_dir() {
        fs::remove_dir_all(path)
            .with_context(|| format!("removing directory '{}'", path.display()))?;
    } else {
        fs::remove_file(path).with_context(|| format!("removing file '{}'", path.display()))?;
    }
    Ok(true)
}
