// kiln-common/src/model/mod.rs
pub mod artifact;
pub mod checksum;
pub mod formula;

pub use artifact::{InstallReceipt, InstalledArtifact};
pub use checksum::{Checksum, ChecksumAlgorithm};
pub use formula::{FormulaDescriptor, SmokeTestSpec};
