use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use httpmock::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

const LEADR_RB: &str = r##"class Leadr < Formula
  desc "Leader-key inspired command runner"
  homepage "https://github.com/ll-nick/leadr"
  url "https://github.com/ll-nick/leadr/archive/refs/tags/v2.6.1.tar.gz"
  sha256 "aaf23e5f521911ab766876e96dd75422499db7f4d1316539bbfc36cbadabfa71"
  license "MIT"

  depends_on "rust" => :build

  def install
    system "cargo", "install", *std_cargo_args
  end

  test do
    system "#{bin}/leadr", "--help"
  end
end
"##;

/// Isolated environment: scratch temp root, log dir and descriptor dir.
struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("tmp")).unwrap();
        Self { dir }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    fn kiln(&self) -> Command {
        let mut cmd = Command::cargo_bin("kiln").unwrap();
        cmd.env_remove("KILN_LOG")
            .env("KILN_TMPDIR", self.path("tmp"))
            .env("KILN_LOG_DIR", self.path("logs"))
            .env("NO_COLOR", "1");
        cmd
    }

    fn write(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.path(rel);
        fs::write(&path, contents).unwrap();
        path
    }
}

#[cfg(unix)]
fn fake_cargo(sandbox: &Sandbox) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = sandbox.write(
        "cargo",
        r#"#!/bin/sh
root=""
while [ $# -gt 0 ]; do
  case "$1" in
    --root) root="$2"; shift 2 ;;
    *) shift ;;
  esac
done
mkdir -p "$root/bin"
cp leadr.sh "$root/bin/leadr"
chmod 755 "$root/bin/leadr"
echo '[v1]' > "$root/.crates.toml"
"#,
    );
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn leadr_archive() -> Vec<u8> {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let entries: [(&str, &[u8]); 2] = [
        ("leadr-2.6.1/Cargo.toml", b"[package]\nname = \"leadr\"\n"),
        (
            "leadr-2.6.1/leadr.sh",
            b"#!/bin/sh\n[ \"$1\" = \"--help\" ] && echo 'Usage: leadr' && exit 0\nexit 1\n",
        ),
    ];
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, name, data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(bytes))
}

fn json_descriptor(sandbox: &Sandbox, url: &str, sha256: &str) -> PathBuf {
    sandbox.write(
        "leadr.json",
        &format!(
            r#"{{
  "name": "leadr",
  "description": "Leader-key inspired command runner",
  "homepageUrl": "https://github.com/ll-nick/leadr",
  "sourceUrl": "{url}",
  "checksum": "sha256:{sha256}",
  "license": "MIT",
  "buildDependencies": [{{ "name": "rust", "kind": "build" }}]
}}"#
        ),
    )
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path).map(|mut d| d.next().is_none()).unwrap_or(true)
}

#[test]
fn info_reads_ruby_formula() {
    let sandbox = Sandbox::new();
    let rb = sandbox.write("leadr.rb", LEADR_RB);

    sandbox
        .kiln()
        .arg("info")
        .arg(&rb)
        .assert()
        .success()
        .stdout(predicate::str::contains("leadr"))
        .stdout(predicate::str::contains("2.6.1"))
        .stdout(predicate::str::contains("build: rust"))
        .stdout(predicate::str::contains("bin/leadr --help"));
}

#[test]
fn info_json_is_normalized() {
    let sandbox = Sandbox::new();
    let rb = sandbox.write("leadr.rb", LEADR_RB);

    sandbox
        .kiln()
        .args(["info", "--json"])
        .arg(&rb)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"sourceUrl\""))
        .stdout(predicate::str::contains(
            "sha256:aaf23e5f521911ab766876e96dd75422499db7f4d1316539bbfc36cbadabfa71",
        ));
}

#[test]
fn invalid_descriptor_fails_with_error() {
    let sandbox = Sandbox::new();
    let bad = sandbox.write(
        "broken.json",
        r#"{"name": "leadr", "homepageUrl": "https://e.com", "sourceUrl": "https://e.com/a.tar.gz", "checksum": "nothex", "license": "MIT"}"#,
    );

    sandbox
        .kiln()
        .arg("info")
        .arg(&bad)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn install_rejects_altered_archive() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/leadr-2.6.1.tar.gz");
        then.status(200).body(leadr_archive());
    });

    let sandbox = Sandbox::new();
    let descriptor = json_descriptor(
        &sandbox,
        &server.url("/leadr-2.6.1.tar.gz"),
        "aaf23e5f521911ab766876e96dd75422499db7f4d1316539bbfc36cbadabfa71",
    );
    let prefix = sandbox.path("prefix");

    sandbox
        .kiln()
        .env("KILN_ALLOW_HTTP", "1")
        .arg("install")
        .arg(&descriptor)
        .arg("--prefix")
        .arg(&prefix)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Checksum mismatch"));

    assert!(is_empty_dir(&prefix));
    assert!(is_empty_dir(&sandbox.path("tmp")));
}

#[cfg(unix)]
#[test]
fn install_test_and_uninstall() {
    let archive = leadr_archive();
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/leadr-2.6.1.tar.gz");
        then.status(200).body(archive.clone());
    });

    let sandbox = Sandbox::new();
    let cargo = fake_cargo(&sandbox);
    let descriptor = json_descriptor(
        &sandbox,
        &server.url("/leadr-2.6.1.tar.gz"),
        &sha256_hex(&archive),
    );
    let prefix = sandbox.path("prefix");

    sandbox
        .kiln()
        .env("KILN_ALLOW_HTTP", "1")
        .env("KILN_CARGO", &cargo)
        .arg("install")
        .arg(&descriptor)
        .arg("--prefix")
        .arg(&prefix)
        .assert()
        .success()
        .stdout(predicate::str::contains("Installed leadr 2.6.1"));
    assert!(prefix.join("bin/leadr").is_file());

    sandbox
        .kiln()
        .arg("test")
        .arg(&descriptor)
        .arg("--prefix")
        .arg(&prefix)
        .assert()
        .success()
        .stdout(predicate::str::contains("passed"));

    sandbox
        .kiln()
        .args(["uninstall", "leadr", "--prefix"])
        .arg(&prefix)
        .assert()
        .success();
    assert!(is_empty_dir(&prefix));
}

#[test]
fn missing_toolchain_is_a_build_failure() {
    let archive = leadr_archive();
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/leadr-2.6.1.tar.gz");
        then.status(200).body(archive.clone());
    });

    let sandbox = Sandbox::new();
    let descriptor = json_descriptor(
        &sandbox,
        &server.url("/leadr-2.6.1.tar.gz"),
        &sha256_hex(&archive),
    );
    let prefix = sandbox.path("prefix");

    sandbox
        .kiln()
        .env("KILN_ALLOW_HTTP", "1")
        .env("KILN_CARGO", sandbox.path("no-such-cargo"))
        .arg("install")
        .arg(&descriptor)
        .arg("--prefix")
        .arg(&prefix)
        .assert()
        .failure()
        .stderr(predicate::str::contains("build failed"))
        .stderr(predicate::str::contains("Toolchain not found"));
    assert!(is_empty_dir(&prefix));
}

#[test]
fn fetch_prints_verified_path() {
    let archive = leadr_archive();
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/leadr-2.6.1.tar.gz");
        then.status(200).body(archive.clone());
    });

    let sandbox = Sandbox::new();
    let descriptor = json_descriptor(
        &sandbox,
        &server.url("/leadr-2.6.1.tar.gz"),
        &sha256_hex(&archive),
    );
    let output = sandbox.path("leadr.tar.gz");

    sandbox
        .kiln()
        .env("KILN_ALLOW_HTTP", "1")
        .arg("fetch")
        .arg(&descriptor)
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("leadr.tar.gz"));
    assert_eq!(fs::read(&output).unwrap(), archive);
}

#[test]
fn uninstall_unknown_formula_fails() {
    let sandbox = Sandbox::new();
    sandbox
        .kiln()
        .args(["uninstall", "leadr", "--prefix"])
        .arg(sandbox.path("prefix"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("not installed"));
}
