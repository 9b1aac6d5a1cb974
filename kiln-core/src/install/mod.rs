// kiln-core/src/install/mod.rs
pub mod extract;
pub mod receipt;
pub mod stage;

use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};

use kiln_common::config::Config;
use kiln_common::error::{KilnError, Result};
use kiln_common::model::{FormulaDescriptor, InstallReceipt, InstalledArtifact};
use tracing::{debug, info, instrument, warn};

use crate::build::{self, Toolchain};
use crate::check::smoke;

pub use self::receipt::{find_receipt, read_receipt, write_receipt};

#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Do not run the post-install smoke test.
    pub skip_smoke_test: bool,
    /// Leave the work directory on disk and log its location.
    pub keep_work_dir: bool,
}

/// Fetches, verifies, builds and installs `descriptor` into `prefix`.
///
/// Nothing is written under `prefix` until the source has been verified and
/// built; a failure while copying removes whatever was copied.
#[instrument(skip(descriptor, config, options), fields(formula = %descriptor.name))]
pub async fn install(
    descriptor: &FormulaDescriptor,
    prefix: &Path,
    config: &Config,
    options: &InstallOptions,
) -> Result<InstalledArtifact> {
    descriptor.validate()?;
    let prefix = absolute_prefix(prefix)?;

    tokio::fs::create_dir_all(config.tmp_root()).await?;
    let work_dir = tempfile::Builder::new()
        .prefix(&format!("kiln-{}-", descriptor.name))
        .tempdir_in(config.tmp_root())
        .map_err(|e| {
            KilnError::Install(format!(
                "Failed to create work directory under {}: {}",
                config.tmp_root().display(),
                e
            ))
        })?;
    debug!("Work directory: {}", work_dir.path().display());

    let result = install_in(descriptor, &prefix, config, work_dir.path()).await;

    if options.keep_work_dir {
        let kept = work_dir.keep();
        info!("Keeping work directory {}", kept.display());
    }
    result
}

/// [`install`] followed by the smoke test unless `options` skips it.
///
/// A failed smoke test removes the installed files and the receipt again.
pub async fn install_and_verify(
    descriptor: &FormulaDescriptor,
    prefix: &Path,
    config: &Config,
    options: &InstallOptions,
) -> Result<InstalledArtifact> {
    let artifact = install(descriptor, prefix, config, options).await?;
    if options.skip_smoke_test {
        info!("Skipping smoke test for {}", descriptor.name);
        return Ok(artifact);
    }
    if let Err(e) = smoke::verify_default(&artifact, descriptor, config).await {
        warn!(
            "Smoke test failed, removing {} {} from {}",
            artifact.name,
            artifact.version,
            artifact.prefix.display()
        );
        let discarded = artifact.clone();
        blocking(move || discard(&discarded)).await?;
        return Err(e);
    }
    Ok(artifact)
}

/// Removes an artifact's files and its receipt from the prefix.
fn discard(artifact: &InstalledArtifact) -> Result<()> {
    stage::remove_installed_files(&artifact.files, &artifact.prefix);
    let receipt_path = Config::receipt_path(&artifact.prefix, &artifact.name);
    match std::fs::remove_file(&receipt_path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    stage::prune_empty_dirs(&Config::receipts_dir(&artifact.prefix), &artifact.prefix);
    Ok(())
}

async fn install_in(
    descriptor: &FormulaDescriptor,
    prefix: &Path,
    config: &Config,
    work_dir: &Path,
) -> Result<InstalledArtifact> {
    let name = descriptor.name.clone();
    let version = descriptor.version_str();

    info!("Downloading {} {}", name, version);
    let archive_path =
        kiln_net::fetch_formula_source(descriptor, &work_dir.join("download"), config).await?;

    info!("Extracting {}", archive_path.display());
    let source_dir = work_dir.join("src");
    {
        let archive_path = archive_path.clone();
        let source_dir = source_dir.clone();
        blocking(move || extract::extract_source(&archive_path, &source_dir)).await?;
    }

    let toolchain = Toolchain::select(descriptor, &source_dir)?;
    let stage_dir = work_dir.join("stage");
    build::build_source(toolchain, &source_dir, &stage_dir, &name, config).await?;

    // Files a previous install of this formula owns may be replaced.
    let owned: HashSet<PathBuf> = find_receipt(prefix, &name)?
        .map(|r| r.files.into_iter().collect())
        .unwrap_or_default();

    info!("Installing {} into {}", name, prefix.display());
    let ignored = toolchain.ignored_outputs();
    let files = {
        let stage_dir = stage_dir.clone();
        blocking(move || stage::collect_staged_files(&stage_dir, ignored)).await?
    };
    let stale: Vec<PathBuf> = owned
        .iter()
        .filter(|f| !files.contains(f))
        .map(|f| prefix.join(f))
        .collect();
    let installed = {
        let stage_dir = stage_dir.clone();
        let prefix = prefix.to_path_buf();
        let files = files.clone();
        blocking(move || stage::commit_staged(&stage_dir, &prefix, &files, &owned)).await?
    };

    let receipt = InstallReceipt {
        name: name.clone(),
        version: version.clone(),
        source_url: descriptor.source_url.clone(),
        checksum: descriptor.checksum.clone(),
        toolchain: toolchain.to_string(),
        files,
    };
    if let Err(e) = write_receipt(prefix, &receipt) {
        warn!("Receipt could not be written, removing installed files");
        stage::remove_installed_files(&installed, prefix);
        return Err(e);
    }

    if !stale.is_empty() {
        debug!("Removing {} files left over from the previous install", stale.len());
        let prefix = prefix.to_path_buf();
        blocking(move || Ok(stage::remove_installed_files(&stale, &prefix))).await?;
    }

    info!("Installed {} {} ({} files)", name, version, installed.len());
    Ok(InstalledArtifact::new(name, version, prefix, installed))
}

fn absolute_prefix(prefix: &Path) -> Result<PathBuf> {
    if prefix.is_absolute() {
        Ok(prefix.to_path_buf())
    } else {
        Ok(env::current_dir()?.join(prefix))
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| KilnError::Install(format!("Blocking task failed: {e}")))?
}
