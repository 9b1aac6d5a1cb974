// kiln-core/src/install/stage.rs
//! Moves a finished build from the staging root into the install prefix.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use kiln_common::error::{KilnError, Result};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::receipt::is_prefix_relative;

/// Relative paths of every non-directory entry under `stage_dir`, sorted.
/// Entries named in `ignored` at the staging root are skipped.
pub fn collect_staged_files(stage_dir: &Path, ignored: &[&str]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(stage_dir).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            KilnError::Install(format!(
                "Failed to walk staging directory {}: {}",
                stage_dir.display(),
                e
            ))
        })?;
        if entry.file_type().is_dir() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(stage_dir)
            .map_err(|e| KilnError::Install(format!("Staged path outside stage root: {e}")))?
            .to_path_buf();
        if ignored.iter().any(|name| relative == Path::new(name)) {
            debug!("Skipping toolchain bookkeeping file {}", relative.display());
            continue;
        }
        files.push(relative);
    }

    if files.is_empty() {
        return Err(KilnError::Install(format!(
            "Build produced no files in {}",
            stage_dir.display()
        )));
    }
    Ok(files)
}

/// Copies `files` (relative to `stage_dir`) into `prefix` and returns their
/// absolute destinations.
///
/// Existing files in `prefix` are refused unless listed in `owned`, the file
/// set of a previous install of the same formula. On any failure the files
/// copied so far are removed again.
pub fn commit_staged(
    stage_dir: &Path,
    prefix: &Path,
    files: &[PathBuf],
    owned: &HashSet<PathBuf>,
) -> Result<Vec<PathBuf>> {
    for relative in files {
        let dest = prefix.join(relative);
        if dest.symlink_metadata().is_ok() && !owned.contains(relative) {
            return Err(KilnError::Install(format!(
                "Refusing to overwrite {}: it is not part of a previous install of this formula",
                dest.display()
            )));
        }
    }

    let mut copied: Vec<PathBuf> = Vec::with_capacity(files.len());
    for relative in files {
        let src = stage_dir.join(relative);
        let dest = prefix.join(relative);
        if let Err(e) = copy_entry(&src, &dest) {
            warn!(
                "Copy of {} failed ({}); rolling back {} installed files",
                relative.display(),
                e,
                copied.len()
            );
            remove_installed_files(&copied, prefix);
            return Err(KilnError::Install(format!(
                "Failed to install {} into {}: {}",
                relative.display(),
                prefix.display(),
                e
            )));
        }
        copied.push(dest);
    }
    debug!("Installed {} files into {}", copied.len(), prefix.display());
    Ok(copied)
}

fn copy_entry(src: &Path, dest: &Path) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    if dest.symlink_metadata().is_ok() {
        fs::remove_file(dest)?;
    }
    let metadata = src.symlink_metadata()?;
    if metadata.file_type().is_symlink() {
        let target = fs::read_link(src)?;
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(&target, dest)?;
        }
        #[cfg(not(unix))]
        {
            fs::copy(src.parent().unwrap_or(src).join(&target), dest)?;
        }
    } else {
        // fs::copy carries the permission bits over.
        fs::copy(src, dest)?;
    }
    Ok(())
}

/// Removes `files` and then any directories under `prefix` they leave empty.
/// Already-missing files are ignored. Returns the number of files removed.
pub fn remove_installed_files(files: &[PathBuf], prefix: &Path) -> usize {
    let mut removed = 0;
    let mut parents: Vec<PathBuf> = Vec::new();
    for file in files {
        let inside = file
            .strip_prefix(prefix)
            .map(is_prefix_relative)
            .unwrap_or(false);
        if !inside {
            warn!("Not removing {}: outside {}", file.display(), prefix.display());
            continue;
        }
        match fs::remove_file(file) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Already gone: {}", file.display());
            }
            Err(e) => warn!("Failed to remove {}: {}", file.display(), e),
        }
        if let Some(parent) = file.parent() {
            parents.push(parent.to_path_buf());
        }
    }
    // Deepest directories first so nested empties collapse upward.
    parents.sort_by_key(|p| std::cmp::Reverse(p.components().count()));
    parents.dedup();
    for dir in parents {
        prune_empty_dirs(&dir, prefix);
    }
    removed
}

/// Removes `start` and its ancestors while they are empty, stopping at
/// `stop_at` (which is never removed).
pub fn prune_empty_dirs(start: &Path, stop_at: &Path) {
    let mut current = Some(start);
    while let Some(dir) = current {
        if dir == stop_at || !dir.starts_with(stop_at) {
            break;
        }
        match fs::remove_dir(dir) {
            Ok(()) => debug!("Removed empty directory {}", dir.display()),
            // Not empty, or already removed by an earlier pass.
            Err(_) => break,
        }
        current = dir.parent();
    }
}
