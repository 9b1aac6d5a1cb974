// kiln/src/cli/info.rs
use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use kiln_common::config::Config;
use kiln_common::dependency::{DependencyExt, DependencyKind};
use kiln_common::error::Result;
use kiln_common::{FormulaDescriptor, Formulary};

#[derive(Debug, Args)]
pub struct Info {
    /// Formula descriptor (.json, .toml or .rb)
    descriptor: PathBuf,

    /// Print the normalized descriptor as JSON
    #[arg(long)]
    json: bool,
}

impl Info {
    pub async fn run(&self, _config: &Config) -> Result<()> {
        let descriptor = Formulary::load(&self.descriptor)?;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&descriptor)?);
        } else {
            print_formula_info(&descriptor);
        }
        Ok(())
    }
}

fn print_formula_info(descriptor: &FormulaDescriptor) {
    println!(
        "{} {}",
        descriptor.name.green().bold(),
        descriptor.version_str()
    );
    if !descriptor.description.is_empty() {
        println!("{}", descriptor.description);
    }
    println!("{}", descriptor.homepage_url.blue().underline());
    println!("License: {}", descriptor.license);

    println!("\n{}", "Source".bold());
    println!("  {}", descriptor.source_url);
    for mirror in &descriptor.mirrors {
        println!("  {} (mirror)", mirror);
    }
    println!("  {}", descriptor.checksum);

    let deps = &descriptor.build_dependencies;
    if !deps.is_empty() {
        println!("\n{}", "Dependencies".bold());
        for kind in [DependencyKind::Build, DependencyKind::Runtime] {
            let names: Vec<&str> = deps.of_kind(kind).into_iter().map(|d| d.name.as_str()).collect();
            if !names.is_empty() {
                println!("  {}: {}", kind, names.join(", "));
            }
        }
    }

    println!("\n{}", "Test".bold());
    println!(
        "  bin/{} {}",
        descriptor.test_executable(),
        descriptor.test.args.join(" ")
    );
}
