// kiln/src/cli/test.rs
use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use kiln_common::config::Config;
use kiln_common::error::Result;
use kiln_common::Formulary;
use kiln_core::install::read_receipt;
use kiln_core::verify_default;
use tracing::instrument;

use crate::cli::ohai;

#[derive(Debug, Args)]
pub struct Test {
    /// Formula descriptor (.json, .toml or .rb)
    descriptor: PathBuf,

    /// Directory the formula was installed into
    #[arg(long)]
    prefix: PathBuf,
}

impl Test {
    #[instrument(skip(self, config), fields(descriptor = %self.descriptor.display()))]
    pub async fn run(&self, config: &Config) -> Result<()> {
        let descriptor = Formulary::load(&self.descriptor)?;
        let receipt = read_receipt(&self.prefix, &descriptor.name)?;
        let artifact = receipt.to_artifact(&self.prefix);

        ohai(&format!("Testing {} {}", artifact.name, artifact.version));
        verify_default(&artifact, &descriptor, config).await?;
        println!("{} {} passed", "✓".green(), artifact.name.green());
        Ok(())
    }
}
