// kiln-common/src/dependency/definition.rs
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DependencyKind {
    #[serde(rename = "build", alias = "build-time")]
    Build,
    #[default]
    #[serde(rename = "runtime", alias = "run-time")]
    Runtime,
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build => f.write_str("build"),
            Self::Runtime => f.write_str("runtime"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    #[serde(default)]
    pub kind: DependencyKind,
}

impl Dependency {
    pub fn new_runtime(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DependencyKind::Runtime,
        }
    }

    pub fn new_build(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DependencyKind::Build,
        }
    }
}

pub trait DependencyExt {
    fn of_kind(&self, kind: DependencyKind) -> Vec<&Dependency>;
    fn runtime(&self) -> Vec<&Dependency>;
    fn build_time(&self) -> Vec<&Dependency>;
}

impl DependencyExt for [Dependency] {
    fn of_kind(&self, kind: DependencyKind) -> Vec<&Dependency> {
        self.iter().filter(|dep| dep.kind == kind).collect()
    }

    fn runtime(&self) -> Vec<&Dependency> {
        self.of_kind(DependencyKind::Runtime)
    }

    fn build_time(&self) -> Vec<&Dependency> {
        self.of_kind(DependencyKind::Build)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_accepts_spelled_out_aliases() {
        let dep: Dependency =
            serde_json::from_str(r#"{"name":"rust","kind":"build-time"}"#).unwrap();
        assert_eq!(dep, Dependency::new_build("rust"));
        let dep: Dependency = serde_json::from_str(r#"{"name":"openssl"}"#).unwrap();
        assert_eq!(dep.kind, DependencyKind::Runtime);
    }

    #[test]
    fn splits_build_and_runtime() {
        let deps = vec![
            Dependency::new_build("rust"),
            Dependency::new_runtime("openssl@3"),
            Dependency::new_build("pkgconf"),
        ];
        let build: Vec<_> = deps.build_time().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(build, ["rust", "pkgconf"]);
        assert_eq!(deps.runtime().len(), 1);
    }
}
