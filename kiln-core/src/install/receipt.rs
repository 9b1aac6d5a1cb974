// kiln-core/src/install/receipt.rs
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use kiln_common::config::Config;
use kiln_common::error::{KilnError, Result};
use kiln_common::model::InstallReceipt;
use tracing::debug;

/// Writes `<prefix>/.kiln/<name>.json`. The output depends only on the
/// receipt contents.
pub fn write_receipt(prefix: &Path, receipt: &InstallReceipt) -> Result<PathBuf> {
    let receipt_path = Config::receipt_path(prefix, &receipt.name);
    if let Some(parent) = receipt_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut json = serde_json::to_string_pretty(receipt)?;
    json.push('\n');
    fs::write(&receipt_path, json).map_err(|e| {
        KilnError::Install(format!(
            "Failed to write receipt {}: {}",
            receipt_path.display(),
            e
        ))
    })?;
    debug!("Wrote install receipt {}", receipt_path.display());
    Ok(receipt_path)
}

pub fn read_receipt(prefix: &Path, name: &str) -> Result<InstallReceipt> {
    let receipt_path = Config::receipt_path(prefix, name);
    let contents = match fs::read_to_string(&receipt_path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(KilnError::NotFound(format!(
                "'{}' is not installed in {} (no receipt at {})",
                name,
                prefix.display(),
                receipt_path.display()
            )))
        }
        Err(e) => return Err(e.into()),
    };
    let receipt: InstallReceipt = serde_json::from_str(&contents).map_err(|e| {
        KilnError::Install(format!(
            "Corrupt receipt {}: {}",
            receipt_path.display(),
            e
        ))
    })?;
    if let Some(bad) = receipt.files.iter().find(|f| !is_prefix_relative(f)) {
        return Err(KilnError::Install(format!(
            "Corrupt receipt {}: '{}' is not a path inside the prefix",
            receipt_path.display(),
            bad.display()
        )));
    }
    Ok(receipt)
}

/// True for non-empty relative paths made only of normal components.
pub(crate) fn is_prefix_relative(path: &Path) -> bool {
    path.components().next().is_some()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Like [`read_receipt`], but a missing receipt is `Ok(None)`.
pub fn find_receipt(prefix: &Path, name: &str) -> Result<Option<InstallReceipt>> {
    match read_receipt(prefix, name) {
        Ok(receipt) => Ok(Some(receipt)),
        Err(KilnError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}
