// Path: kiln-core/src/install/extract.rs
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Read, Seek};
use std::path::{Component, Path, PathBuf};

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use kiln_common::error::{KilnError, Result};
use tar::{Archive, EntryType};
use tracing::{debug, error, warn};
use xz2::read::XzDecoder;
use zip::read::ZipArchive;

const SUPPORTED_ARCHIVE_TYPES: [&str; 5] = ["gz", "bz2", "xz", "tar", "zip"];

/// Detects the archive type from content, falling back to the file extension.
pub fn determine_archive_type(archive_path: &Path) -> Result<&'static str> {
    let inferred = infer::get_from_path(archive_path)?.map(|kind| kind.extension());
    let ext = match inferred {
        Some(ext) => ext.to_string(),
        None => {
            let name = archive_path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("")
                .to_ascii_lowercase();
            match name.rsplit('.').next().unwrap_or("") {
                "tgz" => "gz".to_string(),
                "tbz" | "tbz2" => "bz2".to_string(),
                "txz" => "xz".to_string(),
                other => other.to_string(),
            }
        }
    };
    SUPPORTED_ARCHIVE_TYPES
        .iter()
        .find(|&&s| s == ext)
        .copied()
        .ok_or_else(|| {
            KilnError::Extract(format!(
                "Unsupported archive type '{}' for {}",
                ext,
                archive_path.display()
            ))
        })
}

/// Unpacks a source archive into `target_dir`, stripping the single top-level
/// directory most source tarballs carry.
pub fn extract_source(archive_path: &Path, target_dir: &Path) -> Result<()> {
    let archive_type = determine_archive_type(archive_path)?;
    let root = infer_archive_root_dir(archive_path, archive_type)?;
    let strip_components = usize::from(root.is_some());
    extract_archive(archive_path, target_dir, strip_components, archive_type)
}

fn open_archive(archive_path: &Path) -> Result<File> {
    File::open(archive_path).map_err(|e| {
        KilnError::Extract(format!(
            "Failed to open archive {}: {}",
            archive_path.display(),
            e
        ))
    })
}

pub(crate) fn infer_archive_root_dir(
    archive_path: &Path,
    archive_type: &str,
) -> Result<Option<PathBuf>> {
    debug!(
        "Inferring root directory for archive: {}",
        archive_path.display()
    );
    let file = open_archive(archive_path)?;
    let paths = match archive_type {
        "zip" => zip_entry_paths(file, archive_path)?,
        "gz" => tar_entry_paths(GzDecoder::new(file), archive_path)?,
        "bz2" => tar_entry_paths(BzDecoder::new(file), archive_path)?,
        "xz" => tar_entry_paths(XzDecoder::new(file), archive_path)?,
        "tar" => tar_entry_paths(file, archive_path)?,
        _ => {
            return Err(KilnError::Extract(format!(
                "Cannot infer root dir for unsupported archive type '{}' in {}",
                archive_type,
                archive_path.display()
            )))
        }
    };
    Ok(single_root(&paths, archive_path))
}

fn single_root(paths: &[PathBuf], archive_path_for_log: &Path) -> Option<PathBuf> {
    let mut unique_roots = HashSet::new();
    let mut has_nested_entry = false;

    for path in paths {
        let mut components = path.components();
        match components.next() {
            Some(Component::Normal(name)) => {
                unique_roots.insert(PathBuf::from(name));
                if components.next().is_some() {
                    has_nested_entry = true;
                }
            }
            Some(Component::CurDir) | None => continue,
            Some(other) => {
                debug!(
                    "Non-standard top-level component ({:?}) found in {}, cannot infer single root.",
                    other,
                    archive_path_for_log.display()
                );
                return None;
            }
        }
        if unique_roots.len() > 1 {
            debug!(
                "Multiple top-level items found in {}, cannot infer single root.",
                archive_path_for_log.display()
            );
            return None;
        }
    }

    // A lone top-level file is not a wrapper directory.
    if unique_roots.len() == 1 && has_nested_entry {
        let root = unique_roots.into_iter().next();
        debug!(
            "Inferred single root directory {:?} in {}",
            root,
            archive_path_for_log.display()
        );
        root
    } else {
        if unique_roots.is_empty() {
            warn!(
                "Archive {} appears to be empty or contain only metadata.",
                archive_path_for_log.display()
            );
        }
        None
    }
}

fn is_metadata_entry(entry_type: EntryType) -> bool {
    matches!(
        entry_type,
        EntryType::XGlobalHeader | EntryType::XHeader | EntryType::GNULongName | EntryType::GNULongLink
    )
}

fn tar_entry_paths<R: Read>(reader: R, archive_path_for_log: &Path) -> Result<Vec<PathBuf>> {
    let mut archive = Archive::new(reader);
    let mut paths = Vec::new();
    for entry_result in archive.entries()? {
        let entry = entry_result.map_err(|e| {
            KilnError::Extract(format!(
                "Error reading TAR entry from {}: {}",
                archive_path_for_log.display(),
                e
            ))
        })?;
        if is_metadata_entry(entry.header().entry_type()) {
            continue;
        }
        let path = entry.path().map_err(|e| {
            KilnError::Extract(format!(
                "Invalid path in TAR entry from {}: {}",
                archive_path_for_log.display(),
                e
            ))
        })?;
        paths.push(path.into_owned());
    }
    Ok(paths)
}

fn zip_entry_paths<R: Read + Seek>(reader: R, archive_path_for_log: &Path) -> Result<Vec<PathBuf>> {
    let mut archive = ZipArchive::new(reader).map_err(|e| {
        KilnError::Extract(format!(
            "Failed to open ZIP {}: {}",
            archive_path_for_log.display(),
            e
        ))
    })?;
    let mut paths = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let file = archive.by_index_raw(i).map_err(|e| {
            KilnError::Extract(format!(
                "Error reading ZIP index {} in {}: {}",
                i,
                archive_path_for_log.display(),
                e
            ))
        })?;
        paths.push(PathBuf::from(file.name()));
    }
    Ok(paths)
}

/// Maps an archive path onto `target_dir` after stripping leading components.
/// Returns `Ok(None)` for entries consumed entirely by the strip.
fn destination_for(
    path_in_archive: &Path,
    target_dir: &Path,
    strip_components: usize,
) -> Result<Option<PathBuf>> {
    let mut out = target_dir.to_path_buf();
    let mut pushed = false;
    for comp in path_in_archive.components().skip(strip_components) {
        match comp {
            Component::Normal(p) => {
                out.push(p);
                pushed = true;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) | Component::RootDir => {
                let msg = format!(
                    "Disallowed component {:?} in archive path {}",
                    comp,
                    path_in_archive.display()
                );
                error!("{}", msg);
                return Err(KilnError::Extract(msg));
            }
        }
    }
    Ok(pushed.then_some(out))
}

/// Refuses to write `dest` if any directory between `target_dir` and it is a
/// symlink already on disk.
fn ensure_no_symlinked_ancestor(dest: &Path, target_dir: &Path) -> Result<()> {
    let Ok(rel) = dest.strip_prefix(target_dir) else {
        return Err(KilnError::Extract(format!(
            "Entry destination {} is outside {}",
            dest.display(),
            target_dir.display()
        )));
    };
    let mut current = target_dir.to_path_buf();
    let mut components = rel.components().peekable();
    while let Some(comp) = components.next() {
        if components.peek().is_none() {
            break;
        }
        current.push(comp);
        if current
            .symlink_metadata()
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
        {
            let msg = format!(
                "Archive entry {} would be written through symlink {}",
                dest.display(),
                current.display()
            );
            error!("{}", msg);
            return Err(KilnError::Extract(msg));
        }
    }
    Ok(())
}

/// Symlink targets must be relative and resolve inside `target_dir`.
fn check_symlink_target(link: &Path, link_target: &Path, target_dir: &Path) -> Result<()> {
    let escapes = || {
        let msg = format!(
            "Symlink {} -> {} points outside the extracted tree",
            link.display(),
            link_target.display()
        );
        error!("{}", msg);
        KilnError::Extract(msg)
    };

    let parent = link.parent().unwrap_or(target_dir);
    let mut resolved: Vec<_> = match parent.strip_prefix(target_dir) {
        Ok(rel) => rel.components().collect(),
        Err(_) => return Err(escapes()),
    };
    for comp in link_target.components() {
        match comp {
            Component::Normal(_) => resolved.push(comp),
            Component::CurDir => {}
            Component::ParentDir => {
                if resolved.pop().is_none() {
                    return Err(escapes());
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(escapes()),
        }
    }
    Ok(())
}

pub fn extract_archive(
    archive_path: &Path,
    target_dir: &Path,
    strip_components: usize,
    archive_type: &str,
) -> Result<()> {
    debug!(
        "Extracting archive '{}' (type: {}) to '{}' (strip_components={})",
        archive_path.display(),
        archive_type,
        target_dir.display(),
        strip_components
    );

    fs::create_dir_all(target_dir).map_err(|e| {
        KilnError::Extract(format!(
            "Failed to create target directory {}: {}",
            target_dir.display(),
            e
        ))
    })?;

    let file = open_archive(archive_path)?;
    match archive_type {
        "zip" => extract_zip_archive(file, target_dir, strip_components, archive_path),
        "gz" => extract_tar_archive(GzDecoder::new(file), target_dir, strip_components, archive_path),
        "bz2" => extract_tar_archive(BzDecoder::new(file), target_dir, strip_components, archive_path),
        "xz" => extract_tar_archive(XzDecoder::new(file), target_dir, strip_components, archive_path),
        "tar" => extract_tar_archive(file, target_dir, strip_components, archive_path),
        _ => Err(KilnError::Extract(format!(
            "Unsupported archive type provided for extraction: '{}' for file {}",
            archive_type,
            archive_path.display()
        ))),
    }
}

fn extract_tar_archive<R: Read>(
    reader: R,
    target_dir: &Path,
    strip_components: usize,
    archive_path_for_log: &Path,
) -> Result<()> {
    let mut archive = Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);

    // Hardlinks name their target by archive path, so they are created after
    // every regular entry is on disk.
    let mut deferred_hardlinks: Vec<(PathBuf, PathBuf)> = Vec::new();

    for entry_result in archive.entries()? {
        let mut entry = entry_result.map_err(|e| {
            KilnError::Extract(format!(
                "Error reading TAR entry from {}: {}",
                archive_path_for_log.display(),
                e
            ))
        })?;
        let entry_type = entry.header().entry_type();
        if is_metadata_entry(entry_type) {
            continue;
        }

        let path_in_archive = entry
            .path()
            .map_err(|e| {
                KilnError::Extract(format!(
                    "Invalid path in TAR entry from {}: {}",
                    archive_path_for_log.display(),
                    e
                ))
            })?
            .into_owned();

        let Some(dest) = destination_for(&path_in_archive, target_dir, strip_components)? else {
            continue;
        };

        ensure_no_symlinked_ancestor(&dest, target_dir)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        if entry_type == EntryType::Symlink {
            let link_target = entry.link_name()?.ok_or_else(|| {
                KilnError::Extract(format!(
                    "Symlink entry '{}' in {} has no link target.",
                    path_in_archive.display(),
                    archive_path_for_log.display()
                ))
            })?;
            check_symlink_target(&dest, &link_target, target_dir)?;
        }

        if entry_type == EntryType::Link {
            let link_target = entry.link_name()?.ok_or_else(|| {
                KilnError::Extract(format!(
                    "Hardlink entry '{}' in {} has no link target name.",
                    path_in_archive.display(),
                    archive_path_for_log.display()
                ))
            })?;
            let target = destination_for(&link_target, target_dir, strip_components)?
                .ok_or_else(|| {
                    KilnError::Extract(format!(
                        "Hardlink target '{}' is outside the extracted tree",
                        link_target.display()
                    ))
                })?;
            deferred_hardlinks.push((dest, target));
            continue;
        }

        entry.unpack(&dest).map_err(|e| {
            KilnError::Extract(format!(
                "Failed to unpack entry {} to {}: {}",
                path_in_archive.display(),
                dest.display(),
                e
            ))
        })?;
    }

    for (link, target) in deferred_hardlinks {
        if link.symlink_metadata().is_ok() {
            fs::remove_file(&link)?;
        }
        fs::hard_link(&target, &link).map_err(|e| {
            KilnError::Extract(format!(
                "Failed to create hardlink '{}' -> '{}': {}",
                link.display(),
                target.display(),
                e
            ))
        })?;
    }

    debug!(
        "Finished TAR extraction for {}",
        archive_path_for_log.display()
    );
    Ok(())
}

fn extract_zip_archive<R: Read + Seek>(
    reader: R,
    target_dir: &Path,
    strip_components: usize,
    archive_path_for_log: &Path,
) -> Result<()> {
    let mut archive = ZipArchive::new(reader).map_err(|e| {
        KilnError::Extract(format!(
            "Failed to open ZIP {}: {}",
            archive_path_for_log.display(),
            e
        ))
    })?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(|e| {
            KilnError::Extract(format!(
                "Failed to access ZIP entry {} in {}: {}",
                i,
                archive_path_for_log.display(),
                e
            ))
        })?;
        let path_in_archive = file.enclosed_name().ok_or_else(|| {
            KilnError::Extract(format!(
                "Unsafe ZIP entry path '{}' in {}",
                file.name(),
                archive_path_for_log.display()
            ))
        })?;
        let Some(dest) = destination_for(&path_in_archive, target_dir, strip_components)? else {
            continue;
        };

        ensure_no_symlinked_ancestor(&dest, target_dir)?;
        if file.is_dir() {
            fs::create_dir_all(&dest)?;
            continue;
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = File::create(&dest)?;
        io::copy(&mut file, &mut outfile)?;

        #[cfg(unix)]
        if let Some(mode) = file.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&dest, fs::Permissions::from_mode(mode & 0o7777))?;
        }
    }

    debug!(
        "Finished ZIP extraction for {}",
        archive_path_for_log.display()
    );
    Ok(())
}
