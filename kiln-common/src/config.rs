// kiln-common/src/config.rs
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use tracing::debug;

use super::error::{KilnError, Result};

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;
const DEFAULT_TEST_TIMEOUT_SECS: u64 = 60;

/// Toolchain names that accept a `KILN_<NAME>` executable override.
const OVERRIDABLE_TOOLCHAINS: &[&str] = &["cargo", "go", "cmake", "make"];

#[derive(Debug, Clone)]
pub struct Config {
    /// Root for scoped per-install work directories.
    pub tmp_root: PathBuf,
    pub logs_dir: PathBuf,
    pub connect_timeout: Duration,
    pub download_timeout: Duration,
    pub smoke_test_timeout: Duration,
    /// Permit plain-http source URLs (local mirrors, tests).
    pub allow_insecure_http: bool,
    /// Explicit executable paths keyed by toolchain command name.
    pub toolchain_overrides: HashMap<String, PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        debug!("Loading kiln configuration");

        let project_dirs = ProjectDirs::from("", "", "kiln");

        let tmp_root = env::var("KILN_TMPDIR")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(env::temp_dir);
        debug!("Effective temp root: {}", tmp_root.display());

        let logs_dir = env::var("KILN_LOG_DIR")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .or_else(|| project_dirs.as_ref().map(|d| d.data_local_dir().join("logs")))
            .unwrap_or_else(|| tmp_root.join("kiln-logs"));

        let connect_timeout = secs_from_env("KILN_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)?;
        let download_timeout =
            secs_from_env("KILN_DOWNLOAD_TIMEOUT_SECS", DEFAULT_DOWNLOAD_TIMEOUT_SECS)?;
        let smoke_test_timeout = secs_from_env("KILN_TEST_TIMEOUT_SECS", DEFAULT_TEST_TIMEOUT_SECS)?;

        let allow_insecure_http = env::var("KILN_ALLOW_HTTP").is_ok_and(|v| v == "1");

        let mut toolchain_overrides = HashMap::new();
        for tool in OVERRIDABLE_TOOLCHAINS {
            let var = format!("KILN_{}", tool.to_uppercase());
            if let Some(path) = env::var(&var).ok().filter(|s| !s.is_empty()) {
                debug!("Toolchain override {var}={path}");
                toolchain_overrides.insert((*tool).to_string(), PathBuf::from(path));
            }
        }

        debug!("Configuration loaded successfully.");
        Ok(Self {
            tmp_root,
            logs_dir,
            connect_timeout,
            download_timeout,
            smoke_test_timeout,
            allow_insecure_http,
            toolchain_overrides,
        })
    }

    pub fn tmp_root(&self) -> &Path {
        &self.tmp_root
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    pub fn toolchain_override(&self, command: &str) -> Option<&Path> {
        self.toolchain_overrides.get(command).map(PathBuf::as_path)
    }

    /// Receipt directory inside an install prefix.
    pub fn receipts_dir(prefix: &Path) -> PathBuf {
        prefix.join(".kiln")
    }

    pub fn receipt_path(prefix: &Path, formula_name: &str) -> PathBuf {
        Self::receipts_dir(prefix).join(format!("{formula_name}.json"))
    }
}

impl Default for Config {
    fn default() -> Self {
        let tmp_root = env::temp_dir();
        Self {
            logs_dir: tmp_root.join("kiln-logs"),
            tmp_root,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            download_timeout: Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
            smoke_test_timeout: Duration::from_secs(DEFAULT_TEST_TIMEOUT_SECS),
            allow_insecure_http: false,
            toolchain_overrides: HashMap::new(),
        }
    }
}

fn secs_from_env(var: &str, default: u64) -> Result<Duration> {
    match env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| KilnError::Config(format!("{var} must be a number of seconds: {e}"))),
        _ => Ok(Duration::from_secs(default)),
    }
}

pub fn load_config() -> Result<Config> {
    Config::load()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_lives_under_prefix() {
        let path = Config::receipt_path(Path::new("/opt/leadr"), "leadr");
        assert_eq!(path, PathBuf::from("/opt/leadr/.kiln/leadr.json"));
    }

    #[test]
    fn default_config_rejects_plain_http() {
        let config = Config::default();
        assert!(!config.allow_insecure_http);
        assert_eq!(config.smoke_test_timeout, Duration::from_secs(60));
        assert!(config.toolchain_override("cargo").is_none());
    }

    #[test]
    fn unset_timeout_falls_back_to_default() {
        let d = secs_from_env("KILN_TEST_UNSET_TIMEOUT_VAR", 7).unwrap();
        assert_eq!(d, Duration::from_secs(7));
    }

    #[test]
    fn malformed_timeout_is_a_config_error() {
        env::set_var("KILN_TEST_MALFORMED_TIMEOUT_SECS", "ten");
        let err = secs_from_env("KILN_TEST_MALFORMED_TIMEOUT_SECS", 7).unwrap_err();
        env::remove_var("KILN_TEST_MALFORMED_TIMEOUT_SECS");
        assert!(matches!(err, KilnError::Config(_)), "{err}");
        assert!(err.to_string().contains("KILN_TEST_MALFORMED_TIMEOUT_SECS"), "{err}");
    }
}
