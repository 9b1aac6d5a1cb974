// kiln/src/cli/fetch.rs
use std::env;
use std::path::PathBuf;

use clap::Args;
use kiln_common::config::Config;
use kiln_common::error::{KilnError, Result};
use kiln_common::Formulary;
use kiln_net::fetch_formula_source;
use tracing::{debug, instrument};

use crate::cli::ohai;

#[derive(Debug, Args)]
pub struct Fetch {
    /// Formula descriptor (.json, .toml or .rb)
    descriptor: PathBuf,

    /// Where to put the verified archive (default: current directory, keeping
    /// the download's file name)
    #[arg(long, short)]
    output: Option<PathBuf>,
}

impl Fetch {
    #[instrument(skip(self, config), fields(descriptor = %self.descriptor.display()))]
    pub async fn run(&self, config: &Config) -> Result<()> {
        let descriptor = Formulary::load(&self.descriptor)?;
        ohai(&format!(
            "Fetching {} {}",
            descriptor.name,
            descriptor.version_str()
        ));

        let dest_dir = match self.output.as_deref().and_then(|p| p.parent()) {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => env::current_dir()?,
        };
        let fetched = fetch_formula_source(&descriptor, &dest_dir, config).await?;

        let final_path = match &self.output {
            Some(output) if *output != fetched => {
                tokio::fs::rename(&fetched, output).await.map_err(|e| {
                    KilnError::Install(format!(
                        "Failed to move {} to {}: {}",
                        fetched.display(),
                        output.display(),
                        e
                    ))
                })?;
                output.clone()
            }
            _ => fetched,
        };
        debug!("Verified archive at {}", final_path.display());
        println!("{}", final_path.display());
        Ok(())
    }
}
