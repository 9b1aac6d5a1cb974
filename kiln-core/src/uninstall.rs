// kiln-core/src/uninstall.rs
use std::fs;
use std::path::{Path, PathBuf};

use kiln_common::config::Config;
use kiln_common::error::Result;
use tracing::{debug, info};

use crate::install::read_receipt;
use crate::install::stage::{prune_empty_dirs, remove_installed_files};

/// Removes every file the receipt of `name` lists under `prefix`, the
/// directories that leaves empty, and finally the receipt itself.
///
/// Returns the absolute paths the receipt listed.
pub fn uninstall(name: &str, prefix: &Path) -> Result<Vec<PathBuf>> {
    let receipt = read_receipt(prefix, name)?;
    let artifact = receipt.to_artifact(prefix);
    debug!(
        "Uninstalling {} {} ({} files) from {}",
        receipt.name,
        receipt.version,
        artifact.files.len(),
        prefix.display()
    );

    let removed = remove_installed_files(&artifact.files, prefix);

    let receipt_path = Config::receipt_path(prefix, name);
    fs::remove_file(&receipt_path)?;
    prune_empty_dirs(&Config::receipts_dir(prefix), prefix);

    info!(
        "Uninstalled {} {} ({} of {} files removed)",
        receipt.name,
        receipt.version,
        removed,
        artifact.files.len()
    );
    Ok(artifact.files)
}

#[cfg(test)]
mod tests {
    use kiln_common::error::KilnError;
    use kiln_common::model::{Checksum, InstallReceipt};

    use super::*;
    use crate::install::write_receipt;

    #[test]
    fn removes_listed_files_and_receipt() {
        let prefix = tempfile::tempdir().unwrap();
        let p = prefix.path();
        fs::create_dir_all(p.join("bin")).unwrap();
        fs::create_dir_all(p.join("share/doc")).unwrap();
        fs::write(p.join("bin/leadr"), b"x").unwrap();
        fs::write(p.join("bin/other-tool"), b"y").unwrap();
        fs::write(p.join("share/doc/README"), b"z").unwrap();

        write_receipt(
            p,
            &InstallReceipt {
                name: "leadr".into(),
                version: "2.6.1".into(),
                source_url: "https://example.com/leadr-2.6.1.tar.gz".into(),
                checksum: Checksum::sha256(&"0".repeat(64)).unwrap(),
                toolchain: "cargo".into(),
                files: vec![PathBuf::from("bin/leadr"), PathBuf::from("share/doc/README")],
            },
        )
        .unwrap();

        let listed = uninstall("leadr", p).unwrap();
        assert_eq!(listed.len(), 2);
        assert!(!p.join("bin/leadr").exists());
        assert!(p.join("bin/other-tool").exists());
        assert!(!p.join("share").exists());
        assert!(!p.join(".kiln").exists());
    }

    #[test]
    fn receipt_listing_outside_paths_is_refused() {
        let root = tempfile::tempdir().unwrap();
        let prefix = root.path().join("prefix");
        fs::create_dir_all(prefix.join("bin")).unwrap();
        fs::write(prefix.join("bin/leadr"), b"x").unwrap();
        let victim = root.path().join("victim.txt");
        fs::write(&victim, b"keep me").unwrap();

        for bad in [victim.clone(), PathBuf::from("../../victim.txt")] {
            write_receipt(
                &prefix,
                &InstallReceipt {
                    name: "leadr".into(),
                    version: "2.6.1".into(),
                    source_url: "https://example.com/leadr-2.6.1.tar.gz".into(),
                    checksum: Checksum::sha256(&"0".repeat(64)).unwrap(),
                    toolchain: "cargo".into(),
                    files: vec![PathBuf::from("bin/leadr"), bad],
                },
            )
            .unwrap();

            let err = uninstall("leadr", &prefix).unwrap_err();
            assert!(err.to_string().contains("Corrupt receipt"), "{err}");
            assert!(victim.exists());
            assert!(prefix.join("bin/leadr").exists());
            assert!(Config::receipt_path(&prefix, "leadr").exists());
        }
    }

    #[test]
    fn unknown_formula_is_not_found() {
        let prefix = tempfile::tempdir().unwrap();
        assert!(matches!(
            uninstall("leadr", prefix.path()),
            Err(KilnError::NotFound(_))
        ));
    }
}
