// kiln-common/src/formulary.rs
// Loads formula descriptors from disk.

use std::fs;
use std::path::Path;

use tracing::debug;

use super::error::{KilnError, Result};
use super::model::formula::FormulaDescriptor;

pub mod ruby;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorFormat {
    Json,
    Toml,
    /// Homebrew-style `.rb` formula (the declarative subset).
    Ruby,
}

impl DescriptorFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match ext.as_str() {
            "json" => Ok(Self::Json),
            "toml" => Ok(Self::Toml),
            "rb" => Ok(Self::Ruby),
            other => Err(KilnError::Descriptor(format!(
                "Unsupported descriptor extension '{other}' for {} (expected .json, .toml or .rb)",
                path.display()
            ))),
        }
    }
}

pub struct Formulary;

impl Formulary {
    /// Reads, parses and validates the descriptor at `path`.
    pub fn load(path: &Path) -> Result<FormulaDescriptor> {
        let format = DescriptorFormat::from_path(path)?;
        debug!(
            "Loading {:?} formula descriptor from {}",
            format,
            path.display()
        );
        let contents = fs::read_to_string(path).map_err(|e| {
            KilnError::Descriptor(format!("Failed to read {}: {e}", path.display()))
        })?;
        let name_hint = path.file_stem().and_then(|s| s.to_str());
        Self::parse(&contents, format, name_hint)
    }

    pub fn parse(
        contents: &str,
        format: DescriptorFormat,
        name_hint: Option<&str>,
    ) -> Result<FormulaDescriptor> {
        let descriptor: FormulaDescriptor = match format {
            DescriptorFormat::Json => serde_json::from_str(contents)?,
            DescriptorFormat::Toml => toml::from_str(contents)?,
            DescriptorFormat::Ruby => ruby::parse_formula(contents, name_hint)?,
        };
        descriptor.validate()?;
        debug!(
            "Loaded formula '{}' version {}",
            descriptor.name,
            descriptor.version_str()
        );
        Ok(descriptor)
    }
}
