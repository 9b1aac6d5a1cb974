// kiln-core/src/build/mod.rs
pub mod env;
pub mod toolchain;

use std::path::{Path, PathBuf};
use std::process::Stdio;

use kiln_common::config::Config;
use kiln_common::error::{KilnError, Result};
use tokio::process::Command;
use tracing::{debug, error, info};

pub use self::env::BuildEnvironment;
pub use self::toolchain::{BuildStep, Toolchain};

/// Lines of combined output kept in a `BuildFailed` error.
const FAILURE_OUTPUT_LINES: usize = 200;

/// Runs every step of `toolchain` in `source_dir`, installing into `stage_dir`.
pub async fn build_source(
    toolchain: Toolchain,
    source_dir: &Path,
    stage_dir: &Path,
    formula_name: &str,
    config: &Config,
) -> Result<()> {
    let mut build_env = BuildEnvironment::new();
    let executable = resolve_executable(toolchain, &build_env, source_dir, config)?;
    if let Some(tool_dir) = executable.parent() {
        build_env.prepend_path(tool_dir);
    }

    tokio::fs::create_dir_all(stage_dir).await?;
    info!(
        "Building {} with {} ({})",
        formula_name,
        toolchain,
        executable.display()
    );

    for step in toolchain.steps(source_dir, stage_dir, formula_name) {
        run_step(toolchain, &executable, &step, source_dir, &build_env).await?;
    }
    debug!("Build of {} completed successfully.", formula_name);
    Ok(())
}

/// Finds the toolchain executable: an explicit override first, then `PATH`.
pub fn resolve_executable(
    toolchain: Toolchain,
    build_env: &BuildEnvironment,
    cwd: &Path,
    config: &Config,
) -> Result<PathBuf> {
    let command = toolchain.command();
    if let Some(path) = config.toolchain_override(command) {
        return if path.is_file() {
            debug!("Using {} override at {}", command, path.display());
            Ok(path.to_path_buf())
        } else {
            Err(KilnError::ToolchainNotFound(format!(
                "{} override {} does not exist",
                command,
                path.display()
            )))
        };
    }
    which::which_in(command, build_env.get_path_string(), cwd).map_err(|_| {
        KilnError::ToolchainNotFound(format!(
            "{command} command not found in build environment PATH"
        ))
    })
}

async fn run_step(
    toolchain: Toolchain,
    executable: &Path,
    step: &BuildStep,
    cwd: &Path,
    build_env: &BuildEnvironment,
) -> Result<()> {
    let program = step.program.as_deref().unwrap_or(executable);
    let mut cmd = Command::new(program);
    cmd.args(&step.args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    build_env.apply_to_command(&mut cmd);

    debug!(
        "Running {} {} in [{}]: {:?}",
        toolchain,
        step.name,
        cwd.display(),
        cmd.as_std()
    );

    let output = cmd.output().await.map_err(|e| KilnError::BuildFailed {
        toolchain: toolchain.to_string(),
        step: step.name.clone(),
        code: None,
        output: format!("failed to execute {}: {}", program.display(), e),
    })?;

    if !output.status.success() {
        let combined = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        error!(
            "{} {} failed in [{}]. Status: {}",
            toolchain,
            step.name,
            cwd.display(),
            output.status
        );
        return Err(KilnError::BuildFailed {
            toolchain: toolchain.to_string(),
            step: step.name.clone(),
            code: output.status.code(),
            output: tail_lines(&combined, FAILURE_OUTPUT_LINES),
        });
    }
    debug!("{} {} succeeded", toolchain, step.name);
    Ok(())
}

fn tail_lines(text: &str, max: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(max);
    lines[start..].join("\n")
}
