// kiln/src/cli/install.rs
use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use kiln_common::config::Config;
use kiln_common::error::Result;
use kiln_common::Formulary;
use kiln_core::{install_and_verify, InstallOptions};
use tracing::instrument;

use crate::cli::ohai;

#[derive(Debug, Args)]
pub struct InstallArgs {
    /// Formula descriptor (.json, .toml or .rb)
    descriptor: PathBuf,

    /// Directory to install into
    #[arg(long)]
    prefix: PathBuf,

    /// Skip the post-install smoke test
    #[arg(long)]
    skip_test: bool,

    /// Keep the temporary work directory for debugging
    #[arg(long)]
    keep_tmp: bool,
}

impl InstallArgs {
    #[instrument(skip(self, config), fields(descriptor = %self.descriptor.display()))]
    pub async fn run(&self, config: &Config) -> Result<()> {
        let descriptor = Formulary::load(&self.descriptor)?;
        ohai(&format!(
            "Installing {} {} into {}",
            descriptor.name,
            descriptor.version_str(),
            self.prefix.display()
        ));

        let options = InstallOptions {
            skip_smoke_test: self.skip_test,
            keep_work_dir: self.keep_tmp,
        };
        let artifact = install_and_verify(&descriptor, &self.prefix, config, &options).await?;

        println!(
            "{} Installed {} {} ({} files)",
            "✓".green(),
            artifact.name.green(),
            artifact.version,
            artifact.files.len()
        );
        for file in &artifact.files {
            println!("  {}", file.display());
        }
        Ok(())
    }
}
