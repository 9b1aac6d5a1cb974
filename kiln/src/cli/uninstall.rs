// kiln/src/cli/uninstall.rs
use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use kiln_common::config::Config;
use kiln_common::error::{KilnError, Result};
use tracing::instrument;

use crate::cli::ohai;

#[derive(Args, Debug)]
pub struct Uninstall {
    /// Name of the installed formula
    name: String,

    /// Directory the formula was installed into
    #[arg(long)]
    prefix: PathBuf,
}

impl Uninstall {
    #[instrument(skip(self, _config), fields(name = %self.name))]
    pub async fn run(&self, _config: &Config) -> Result<()> {
        if self.name.contains('/') || self.name.contains("..") {
            return Err(KilnError::Validation(format!(
                "Invalid formula name '{}' contains disallowed characters",
                self.name
            )));
        }

        ohai(&format!("Uninstalling {}", self.name));
        let name = self.name.clone();
        let prefix = self.prefix.clone();
        let files = tokio::task::spawn_blocking(move || kiln_core::uninstall(&name, &prefix))
            .await
            .map_err(|e| KilnError::Install(format!("Uninstall task failed: {e}")))??;

        println!(
            "{} Uninstalled {} ({} files)",
            "✓".green(),
            self.name.green(),
            files.len()
        );
        Ok(())
    }
}
