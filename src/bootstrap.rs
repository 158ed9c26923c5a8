//! Seeding the plugin directory from plugins baked into the image
//!
//! Build images often ship plugins under the default plugin directory while
//! the build itself points PACKER_PLUGIN_PATH somewhere else. Copying them
//! over first lets the installer treat them as already installed.

use crate::Result;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Copy every file below `source` into `target`, keeping relative paths
///
/// Returns the number of files copied. A missing `source` copies nothing;
/// a `source` that is the same directory as `target` is left alone.
pub fn copy_prestaged(source: &Path, target: &Path) -> Result<usize> {
    if !source.is_dir() {
        tracing::debug!(source = %source.display(), "no pre-staged plugins");
        return Ok(0);
    }
    if target.exists() && fs::canonicalize(source)? == fs::canonicalize(target)? {
        tracing::debug!(dir = %source.display(), "pre-staged directory is the plugin directory");
        return Ok(0);
    }

    tracing::info!(
        "Copying pre-installed plugins from {} into {}",
        source.display(),
        target.display()
    );

    let mut copied = 0;
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(std::io::Error::from)?;
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = path
            .strip_prefix(source)
            .map_err(|e| crate::Error::Other(format!("{}: {}", path.display(), e)))?;
        let destination = target.join(relative);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::copy(path, &destination)?;
        set_executable(&destination)?;
        tracing::debug!(file = %relative.display(), "copied");
        copied += 1;
    }

    Ok(copied)
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}
