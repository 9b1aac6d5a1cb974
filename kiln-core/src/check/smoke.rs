// kiln-core/src/check/smoke.rs
use std::process::Stdio;
use std::time::Duration;

use kiln_common::config::Config;
use kiln_common::error::{KilnError, Result};
use kiln_common::model::{FormulaDescriptor, InstalledArtifact, SmokeTestSpec};
use tokio::process::Command;
use tracing::{debug, info};

/// Runs the installed executable once with the fixed arguments of `spec`.
///
/// Passes only if the executable is part of `artifact` and exits 0 within
/// `timeout`.
pub async fn verify(
    artifact: &InstalledArtifact,
    spec: &SmokeTestSpec,
    timeout: Duration,
) -> Result<()> {
    let exe_name = spec.executable.as_deref().unwrap_or(&artifact.name);
    let executable = artifact.executable(exe_name).ok_or_else(|| {
        KilnError::VerificationFailed(format!(
            "{} was not installed into {}",
            exe_name,
            artifact.bin_dir().display()
        ))
    })?;
    let described = format!("{} {}", exe_name, spec.args.join(" "));
    info!("Testing {}: {}", artifact.name, described.trim_end());

    let mut cmd = Command::new(executable);
    cmd.args(&spec.args)
        .current_dir(&artifact.prefix)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(KilnError::VerificationFailed(format!(
                "Failed to run {}: {}",
                executable.display(),
                e
            )))
        }
        Err(_) => {
            return Err(KilnError::VerificationFailed(format!(
                "`{}` did not finish within {}s",
                described.trim_end(),
                timeout.as_secs()
            )))
        }
    };

    if output.status.success() {
        debug!("Smoke test passed for {}", artifact.name);
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(KilnError::VerificationFailed(format!(
            "`{}` exited with {}{}",
            described.trim_end(),
            output.status,
            if stderr.trim().is_empty() {
                String::new()
            } else {
                format!(":\n{}", stderr.trim_end())
            }
        )))
    }
}

/// [`verify`] with the descriptor's test stanza (`--help` by default) and the
/// configured timeout.
pub async fn verify_default(
    artifact: &InstalledArtifact,
    descriptor: &FormulaDescriptor,
    config: &Config,
) -> Result<()> {
    let spec = SmokeTestSpec {
        executable: Some(descriptor.test_executable().to_string()),
        args: descriptor.test.args.clone(),
    };
    verify(artifact, &spec, config.smoke_test_timeout).await
}
