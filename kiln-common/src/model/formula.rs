// kiln-common/src/model/formula.rs
// Formula descriptors: the static record describing how to obtain, build and
// smoke-test one piece of software.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::dependency::{Dependency, DependencyExt};
use crate::error::{KilnError, Result};
use crate::model::checksum::Checksum;

const DEFAULT_TEST_ARGS: &[&str] = &["--help"];

static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._+@-]*$").unwrap());

// `leadr-2.6.1.tar.gz`, `v2.6.1.tar.gz`, `2.6.1.zip`, `tool_1.0-rc1.tgz`
static URL_VERSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:^|[-_/vV])(\d+(?:\.\d+)+(?:[-.]?(?:alpha|beta|rc|pre)\.?\d*)?)(?:\.tar\.(?:gz|bz2|xz)|\.tgz|\.tbz2?|\.txz|\.tar|\.zip)$",
    )
    .unwrap()
});

/// What the post-install smoke test runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmokeTestSpec {
    /// Executable name under `<prefix>/bin`. Defaults to the formula name.
    #[serde(default)]
    pub executable: Option<String>,
    #[serde(default = "default_test_args")]
    pub args: Vec<String>,
}

fn default_test_args() -> Vec<String> {
    DEFAULT_TEST_ARGS.iter().map(|s| s.to_string()).collect()
}

impl Default for SmokeTestSpec {
    fn default() -> Self {
        Self {
            executable: None,
            args: default_test_args(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaDescriptor {
    pub name: String,
    #[serde(default, alias = "desc")]
    pub description: String,
    #[serde(alias = "homepage")]
    pub homepage_url: String,
    #[serde(alias = "url")]
    pub source_url: String,
    #[serde(alias = "sha256")]
    pub checksum: Checksum,
    pub license: String,
    #[serde(default)]
    pub build_dependencies: Vec<Dependency>,
    /// Explicit version; inferred from the source URL when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Alternative source URLs tried when the primary download fails.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mirrors: Vec<String>,
    #[serde(default)]
    pub test: SmokeTestSpec,
}

impl FormulaDescriptor {
    /// Creates a descriptor with the required fields; primarily for tests and
    /// programmatic construction. The result is validated.
    pub fn new(
        name: impl Into<String>,
        homepage_url: impl Into<String>,
        source_url: impl Into<String>,
        checksum: Checksum,
        license: impl Into<String>,
        build_dependencies: Vec<Dependency>,
    ) -> Result<Self> {
        let descriptor = Self {
            name: name.into(),
            description: String::new(),
            homepage_url: homepage_url.into(),
            source_url: source_url.into(),
            checksum,
            license: license.into(),
            build_dependencies,
            version: None,
            mirrors: Vec::new(),
            test: SmokeTestSpec::default(),
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The explicit version, or the one embedded in the source URL's file name.
    pub fn version(&self) -> Option<String> {
        self.version
            .clone()
            .or_else(|| version_from_url(&self.source_url))
    }

    pub fn version_str(&self) -> String {
        self.version().unwrap_or_else(|| "unknown".to_string())
    }

    /// The URLs to try for the source archive, primary first.
    pub fn source_urls(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.source_url.as_str()).chain(self.mirrors.iter().map(String::as_str))
    }

    pub fn test_executable(&self) -> &str {
        self.test.executable.as_deref().unwrap_or(&self.name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(KilnError::Validation("Formula name must not be empty".to_string()));
        }
        if !NAME_RE.is_match(&self.name) {
            return Err(KilnError::Validation(format!(
                "Invalid formula name '{}'",
                self.name
            )));
        }
        validate_uri("homepageUrl", &self.homepage_url)?;
        validate_uri("sourceUrl", &self.source_url)?;
        for mirror in &self.mirrors {
            validate_uri("mirrors", mirror)?;
        }
        if self.license.trim().is_empty() {
            return Err(KilnError::Validation(format!(
                "Formula '{}' has no license",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for dep in &self.build_dependencies {
            if dep.name.trim().is_empty() {
                return Err(KilnError::Validation(format!(
                    "Formula '{}' declares a dependency with an empty name",
                    self.name
                )));
            }
            if !seen.insert((dep.name.as_str(), dep.kind)) {
                return Err(KilnError::Validation(format!(
                    "Formula '{}' declares {} dependency '{}' more than once",
                    self.name, dep.kind, dep.name
                )));
            }
        }

        if let Some(exe) = &self.test.executable {
            if exe.is_empty() || exe.contains('/') || exe.contains('\\') {
                return Err(KilnError::Validation(format!(
                    "Smoke test executable must be a bare file name, got '{exe}'"
                )));
            }
        }
        Ok(())
    }

    pub fn build_time_dependencies(&self) -> Vec<&Dependency> {
        self.build_dependencies.build_time()
    }
}

fn validate_uri(field: &str, value: &str) -> Result<()> {
    let url = Url::parse(value)
        .map_err(|e| KilnError::Validation(format!("{field} '{value}' is not a valid URI: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(KilnError::Validation(format!(
            "{field} '{value}' is not a hierarchical URI"
        )));
    }
    Ok(())
}

/// Extracts a version from an archive URL's last path segment.
pub fn version_from_url(url: &str) -> Option<String> {
    let file_name = url.split(['?', '#']).next()?.rsplit('/').next()?;
    URL_VERSION_RE
        .captures(file_name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
