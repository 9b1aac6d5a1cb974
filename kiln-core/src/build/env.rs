// kiln-core/src/build/env.rs
use std::collections::HashMap;
use std::env;
use std::path::Path;

use tokio::process::Command;
use tracing::{debug, trace};

// Passed through from the caller's environment. Everything else is dropped.
const ENV_VARS_TO_KEEP: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "LOGNAME",
    "SHELL",
    "TERM",
    "TZ",
    "LANG",
    "LC_ALL",
    "LC_CTYPE",
    "TMPDIR",
    // Toolchain installs and caches
    "CARGO_HOME",
    "RUSTUP_HOME",
    "RUSTUP_TOOLCHAIN",
    "GOROOT",
    "GOPATH",
    "GOCACHE",
    "GOMODCACHE",
    "GOPROXY",
    "GOFLAGS",
    // Network access for dependency fetches
    "SSL_CERT_FILE",
    "SSL_CERT_DIR",
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "NO_PROXY",
    "http_proxy",
    "https_proxy",
    "no_proxy",
];

/// Sanitized environment applied to every build step.
#[derive(Debug, Clone)]
pub struct BuildEnvironment {
    vars: HashMap<String, String>,
}

impl BuildEnvironment {
    /// Builds the environment from the current process environment.
    pub fn new() -> Self {
        Self::from_vars(env::vars())
    }

    /// Builds the environment from an explicit set of variables.
    pub fn from_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut kept = HashMap::new();
        for (key, value) in vars {
            if ENV_VARS_TO_KEEP.contains(&key.as_str()) {
                trace!("Keeping env var: {}", key);
                kept.insert(key, value);
            }
        }
        kept.insert("MAKEFLAGS".to_string(), format!("-j{}", num_cpus::get()));
        kept.insert("CMAKE_BUILD_PARALLEL_LEVEL".to_string(), num_cpus::get().to_string());
        debug!("Build environment prepared with {} variables", kept.len());
        Self { vars: kept }
    }

    pub fn set_var(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn apply_to_command(&self, command: &mut Command) {
        command.env_clear();
        command.envs(&self.vars);
    }

    pub fn get_path_string(&self) -> Option<&str> {
        self.vars.get("PATH").map(String::as_str)
    }

    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Puts `dir` at the front of `PATH`.
    pub fn prepend_path(&mut self, dir: &Path) {
        let dir = dir.to_string_lossy();
        let path = match self.get_path_string() {
            Some(existing) if !existing.is_empty() => format!("{dir}:{existing}"),
            _ => dir.into_owned(),
        };
        self.vars.insert("PATH".to_string(), path);
    }
}

impl Default for BuildEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn drops_unlisted_variables() {
        let env = BuildEnvironment::from_vars(vars(&[
            ("PATH", "/usr/bin"),
            ("HOME", "/home/u"),
            ("RUSTFLAGS", "-C target-cpu=native"),
            ("LD_PRELOAD", "/tmp/evil.so"),
        ]));
        assert_eq!(env.get_path_string(), Some("/usr/bin"));
        assert_eq!(env.get_var("HOME"), Some("/home/u"));
        assert!(env.get_var("RUSTFLAGS").is_none());
        assert!(env.get_var("LD_PRELOAD").is_none());
        assert!(env.get_var("MAKEFLAGS").unwrap().starts_with("-j"));
    }

    #[test]
    fn prepend_path_handles_missing_path() {
        let mut env = BuildEnvironment::from_vars(Vec::new());
        env.prepend_path(Path::new("/opt/tools/bin"));
        assert_eq!(env.get_path_string(), Some("/opt/tools/bin"));
        env.prepend_path(Path::new("/x"));
        assert_eq!(env.get_path_string(), Some("/x:/opt/tools/bin"));
    }
}
