// kiln-common/src/model/artifact.rs
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::checksum::Checksum;

/// The files an install wrote under its prefix.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstalledArtifact {
    pub name: String,
    pub version: String,
    pub prefix: PathBuf,
    /// Absolute, sorted file paths under `prefix`. Directories are not listed.
    pub files: Vec<PathBuf>,
}

impl InstalledArtifact {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        prefix: impl Into<PathBuf>,
        mut files: Vec<PathBuf>,
    ) -> Self {
        files.sort();
        files.dedup();
        Self {
            name: name.into(),
            version: version.into(),
            prefix: prefix.into(),
            files,
        }
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.prefix.join("bin")
    }

    /// Locates `bin/<name>` among the installed files.
    pub fn executable(&self, name: &str) -> Option<&Path> {
        let wanted = self.bin_dir().join(name);
        self.files
            .iter()
            .find(|f| **f == wanted)
            .map(PathBuf::as_path)
    }

    pub fn relative_files(&self) -> Vec<PathBuf> {
        self.files
            .iter()
            .filter_map(|f| f.strip_prefix(&self.prefix).ok().map(Path::to_path_buf))
            .collect()
    }
}

/// JSON record of a completed install, stored at `<prefix>/.kiln/<name>.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstallReceipt {
    pub name: String,
    pub version: String,
    pub source_url: String,
    pub checksum: Checksum,
    pub toolchain: String,
    /// Installed files relative to the prefix.
    pub files: Vec<PathBuf>,
}

impl InstallReceipt {
    pub fn to_artifact(&self, prefix: &Path) -> InstalledArtifact {
        InstalledArtifact::new(
            self.name.clone(),
            self.version.clone(),
            prefix,
            self.files.iter().map(|f| prefix.join(f)).collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_executable_in_bin() {
        let artifact = InstalledArtifact::new(
            "leadr",
            "2.6.1",
            "/opt/leadr",
            vec![
                PathBuf::from("/opt/leadr/share/doc/README.md"),
                PathBuf::from("/opt/leadr/bin/leadr"),
            ],
        );
        assert_eq!(
            artifact.executable("leadr"),
            Some(Path::new("/opt/leadr/bin/leadr"))
        );
        assert!(artifact.executable("README.md").is_none());
        assert_eq!(artifact.files[0], PathBuf::from("/opt/leadr/bin/leadr"));
    }

    #[test]
    fn receipt_rebuilds_artifact_under_prefix() {
        let receipt = InstallReceipt {
            name: "leadr".into(),
            version: "2.6.1".into(),
            source_url: "https://example/leadr-2.6.1.tar.gz".into(),
            checksum: Checksum::sha256(&"a".repeat(64)).unwrap(),
            toolchain: "cargo".into(),
            files: vec![PathBuf::from("bin/leadr")],
        };
        let artifact = receipt.to_artifact(Path::new("/tmp/p"));
        assert_eq!(artifact.files, vec![PathBuf::from("/tmp/p/bin/leadr")]);
        assert_eq!(artifact.relative_files(), receipt.files);
    }
}
