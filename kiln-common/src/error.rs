use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// The stage of an install an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPhase {
    Load,
    Fetch,
    Verify,
    Extract,
    Build,
    Stage,
    Test,
    Other,
}

impl fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Load => "load",
            Self::Fetch => "fetch",
            Self::Verify => "verify",
            Self::Extract => "extract",
            Self::Build => "build",
            Self::Stage => "stage",
            Self::Test => "test",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone)]
pub enum KilnError {
    #[error("I/O Error: {0}")]
    Io(#[from] Arc<std::io::Error>),

    #[error("HTTP Request Error: {0}")]
    Http(#[from] Arc<reqwest::Error>),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] Arc<serde_json::Error>),

    #[error("TOML Parsing Error: {0}")]
    Toml(#[from] Arc<toml::de::Error>),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Descriptor Error: {0}")]
    Descriptor(String),

    #[error("Validation Error: {0}")]
    Validation(String),

    #[error("Download failed for '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("Checksum mismatch for '{url}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("Extraction Error: {0}")]
    Extract(String),

    #[error("Toolchain not found: {0}")]
    ToolchainNotFound(String),

    #[error("{toolchain} {step} failed (exit code: {}):\n{output}", .code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    BuildFailed {
        toolchain: String,
        step: String,
        code: Option<i32>,
        output: String,
    },

    #[error("Installation Error: {0}")]
    Install(String),

    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    #[error("Resource Not Found: {0}")]
    NotFound(String),
}

impl KilnError {
    pub fn phase(&self) -> InstallPhase {
        match self {
            Self::Descriptor(_) | Self::Validation(_) | Self::Json(_) | Self::Toml(_) => {
                InstallPhase::Load
            }
            Self::DownloadFailed { .. } | Self::Http(_) => InstallPhase::Fetch,
            Self::ChecksumMismatch { .. } => InstallPhase::Verify,
            Self::Extract(_) => InstallPhase::Extract,
            Self::ToolchainNotFound(_) | Self::BuildFailed { .. } => InstallPhase::Build,
            Self::Install(_) => InstallPhase::Stage,
            Self::VerificationFailed(_) => InstallPhase::Test,
            Self::Io(_) | Self::Config(_) | Self::NotFound(_) => InstallPhase::Other,
        }
    }
}

impl From<std::io::Error> for KilnError {
    fn from(err: std::io::Error) -> Self {
        KilnError::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for KilnError {
    fn from(err: reqwest::Error) -> Self {
        KilnError::Http(Arc::new(err))
    }
}

impl From<serde_json::Error> for KilnError {
    fn from(err: serde_json::Error) -> Self {
        KilnError::Json(Arc::new(err))
    }
}

impl From<toml::de::Error> for KilnError {
    fn from(err: toml::de::Error) -> Self {
        KilnError::Toml(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, KilnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_failure_message_carries_code_and_output() {
        let err = KilnError::BuildFailed {
            toolchain: "cargo".to_string(),
            step: "install".to_string(),
            code: Some(101),
            output: "error[E0425]: cannot find value".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("exit code: 101"), "{msg}");
        assert!(msg.contains("E0425"), "{msg}");
        assert_eq!(err.phase(), InstallPhase::Build);
    }

    #[test]
    fn killed_build_reports_no_code() {
        let err = KilnError::BuildFailed {
            toolchain: "make".to_string(),
            step: "make".to_string(),
            code: None,
            output: String::new(),
        };
        assert!(err.to_string().contains("exit code: none"));
    }

    #[test]
    fn phases_follow_the_install_pipeline() {
        let mismatch = KilnError::ChecksumMismatch {
            url: "https://example/leadr-2.6.1.tar.gz".to_string(),
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        };
        assert_eq!(mismatch.phase(), InstallPhase::Verify);
        assert_eq!(
            KilnError::DownloadFailed {
                url: "u".into(),
                reason: "r".into()
            }
            .phase(),
            InstallPhase::Fetch
        );
        assert_eq!(
            KilnError::VerificationFailed("x".into()).phase(),
            InstallPhase::Test
        );
        assert_eq!(InstallPhase::Verify.to_string(), "verify");
    }
}
