// kiln-core/src/build/toolchain.rs
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use kiln_common::dependency::Dependency;
use kiln_common::error::{KilnError, Result};
use kiln_common::model::FormulaDescriptor;
use tracing::debug;

/// Build system driver used to turn a source tree into installed files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toolchain {
    Cargo,
    Go,
    CMake,
    Make,
}

/// One command of a toolchain's build sequence, run from the source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStep {
    /// Short label used in logs and `BuildFailed` errors.
    pub name: String,
    /// `None` runs the toolchain executable itself.
    pub program: Option<PathBuf>,
    pub args: Vec<OsString>,
}

impl BuildStep {
    fn tool<I, S>(name: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            name: name.to_string(),
            program: None,
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

fn prefixed(flag: &str, path: &Path) -> OsString {
    let mut arg = OsString::from(flag);
    arg.push(path);
    arg
}

impl Toolchain {
    /// Maps a build dependency name onto a toolchain.
    pub fn from_dependency(name: &str) -> Option<Self> {
        match name {
            "rust" | "cargo" => Some(Self::Cargo),
            "go" => Some(Self::Go),
            "cmake" => Some(Self::CMake),
            "make" | "autoconf" | "automake" | "libtool" => Some(Self::Make),
            _ => None,
        }
    }

    /// Guesses the toolchain from the files at the root of the source tree.
    pub fn detect(source_dir: &Path) -> Option<Self> {
        let has = |name: &str| source_dir.join(name).exists();
        if has("CMakeLists.txt") {
            Some(Self::CMake)
        } else if has("configure") {
            Some(Self::Make)
        } else if has("go.mod") {
            Some(Self::Go)
        } else if has("Cargo.toml") {
            Some(Self::Cargo)
        } else if has("Makefile") || has("makefile") || has("GNUmakefile") {
            Some(Self::Make)
        } else {
            None
        }
    }

    /// The first build-time dependency naming a known toolchain wins; the
    /// source tree is inspected only when none is declared.
    pub fn select(descriptor: &FormulaDescriptor, source_dir: &Path) -> Result<Self> {
        let declared = descriptor
            .build_time_dependencies()
            .into_iter()
            .find_map(|dep: &Dependency| Self::from_dependency(&dep.name));
        if let Some(toolchain) = declared {
            debug!("Using declared toolchain {} for {}", toolchain, descriptor.name);
            return Ok(toolchain);
        }
        let detected = Self::detect(source_dir).ok_or_else(|| {
            KilnError::ToolchainNotFound(format!(
                "No build toolchain declared for '{}' and none detected in {}",
                descriptor.name,
                source_dir.display()
            ))
        })?;
        debug!("Detected toolchain {} for {}", detected, descriptor.name);
        Ok(detected)
    }

    /// Executable name looked up on `PATH` and used as the override key.
    pub fn command(&self) -> &'static str {
        match self {
            Self::Cargo => "cargo",
            Self::Go => "go",
            Self::CMake => "cmake",
            Self::Make => "make",
        }
    }

    /// Toolchain bookkeeping files written into the staging root that are not
    /// part of the install.
    pub fn ignored_outputs(&self) -> &'static [&'static str] {
        match self {
            Self::Cargo => &[".crates.toml", ".crates2.json"],
            _ => &[],
        }
    }

    pub fn steps(&self, source_dir: &Path, stage_dir: &Path, formula_name: &str) -> Vec<BuildStep> {
        match self {
            Self::Cargo => vec![BuildStep::tool(
                "install",
                [
                    OsString::from("install"),
                    "--locked".into(),
                    "--root".into(),
                    stage_dir.into(),
                    "--path".into(),
                    ".".into(),
                ],
            )],
            Self::Go => {
                let output = stage_dir.join("bin").join(formula_name);
                let cmd_pkg = Path::new("cmd").join(formula_name);
                let package = if source_dir.join(&cmd_pkg).is_dir() {
                    format!("./{}", cmd_pkg.display())
                } else {
                    ".".to_string()
                };
                vec![BuildStep::tool(
                    "build",
                    [
                        OsString::from("build"),
                        "-trimpath".into(),
                        "-o".into(),
                        output.into(),
                        package.into(),
                    ],
                )]
            }
            Self::CMake => vec![
                BuildStep::tool(
                    "configure",
                    [
                        OsString::from("-S"),
                        ".".into(),
                        "-B".into(),
                        "build".into(),
                        prefixed("-DCMAKE_INSTALL_PREFIX=", stage_dir),
                        "-DCMAKE_BUILD_TYPE=Release".into(),
                    ],
                ),
                BuildStep::tool("build", ["--build", "build"]),
                BuildStep::tool("install", ["--install", "build"]),
            ],
            Self::Make => {
                let configure = source_dir.join("configure");
                if configure.is_file() {
                    vec![
                        BuildStep {
                            name: "configure".to_string(),
                            program: Some(configure),
                            args: vec![
                                prefixed("--prefix=", stage_dir),
                                "--disable-dependency-tracking".into(),
                            ],
                        },
                        BuildStep::tool("build", Vec::<OsString>::new()),
                        BuildStep::tool("install", ["install"]),
                    ]
                } else {
                    let prefix_arg = prefixed("PREFIX=", stage_dir);
                    vec![
                        BuildStep::tool("build", [prefix_arg.clone()]),
                        BuildStep::tool("install", [OsString::from("install"), prefix_arg]),
                    ]
                }
            }
        }
    }
}

impl fmt::Display for Toolchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use kiln_common::model::Checksum;

    use super::*;

    fn descriptor(deps: Vec<Dependency>) -> FormulaDescriptor {
        FormulaDescriptor::new(
            "leadr",
            "https://github.com/ll-nick/leadr",
            "https://github.com/ll-nick/leadr/archive/refs/tags/v2.6.1.tar.gz",
            Checksum::sha256("aaf23e5f521911ab766876e96dd75422499db7f4d1316539bbfc36cbadabfa71")
                .unwrap(),
            "MIT",
            deps,
        )
        .unwrap()
    }

    #[test]
    fn declared_build_dependency_selects_toolchain() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("CMakeLists.txt"), "").unwrap();
        let d = descriptor(vec![
            Dependency::new_runtime("go"),
            Dependency::new_build("pkgconf"),
            Dependency::new_build("rust"),
        ]);
        assert_eq!(Toolchain::select(&d, dir.path()).unwrap(), Toolchain::Cargo);
    }

    #[test]
    fn falls_back_to_detection() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("go.mod"), "module example.com/leadr\n").unwrap();
        let d = descriptor(Vec::new());
        assert_eq!(Toolchain::select(&d, dir.path()).unwrap(), Toolchain::Go);

        let empty = tempfile::tempdir().unwrap();
        assert!(matches!(
            Toolchain::select(&d, empty.path()),
            Err(KilnError::ToolchainNotFound(_))
        ));
    }

    #[test]
    fn cargo_installs_into_stage_root() {
        let steps = Toolchain::Cargo.steps(Path::new("/src"), Path::new("/work/stage"), "leadr");
        assert_eq!(steps.len(), 1);
        let args: Vec<_> = steps[0].args.iter().map(|a| a.to_string_lossy()).collect();
        assert_eq!(
            args,
            ["install", "--locked", "--root", "/work/stage", "--path", "."]
        );
        assert!(Toolchain::Cargo.ignored_outputs().contains(&".crates.toml"));
    }

    #[test]
    fn make_without_configure_passes_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let steps = Toolchain::Make.steps(dir.path(), Path::new("/stage"), "tool");
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].args, vec![OsString::from("install"), "PREFIX=/stage".into()]);

        fs::write(dir.path().join("configure"), "#!/bin/sh\n").unwrap();
        let steps = Toolchain::Make.steps(dir.path(), Path::new("/stage"), "tool");
        assert_eq!(steps[0].name, "configure");
        assert_eq!(steps[0].program.as_deref(), Some(dir.path().join("configure").as_path()));
    }
}
