// kiln-net/src/validation.rs
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use kiln_common::error::{KilnError, Result};
use kiln_common::model::{Checksum, ChecksumAlgorithm};
use sha2::{Digest, Sha256, Sha512};
use url::Url;

/// Hex digest of the file at `path` using `algorithm`.
pub fn compute_digest(path: &Path, algorithm: ChecksumAlgorithm) -> Result<String> {
    let file = File::open(path)?;
    let mut reader = io::BufReader::new(file);
    let (actual, bytes_read) = match algorithm {
        ChecksumAlgorithm::Sha256 => hash_reader::<Sha256, _>(&mut reader)?,
        ChecksumAlgorithm::Sha512 => hash_reader::<Sha512, _>(&mut reader)?,
    };
    tracing::debug!(
        "Calculated {}: {} ({} bytes read) for {}",
        algorithm,
        actual,
        bytes_read,
        path.display()
    );
    Ok(actual)
}

fn hash_reader<D: Digest + io::Write, R: Read>(reader: &mut R) -> Result<(String, u64)> {
    let mut hasher = D::new();
    let bytes = io::copy(reader, &mut hasher)?;
    Ok((hex::encode(hasher.finalize()), bytes))
}

/// Verifies the file at `path` against `expected`. `url` names the origin in
/// the error.
pub fn verify_checksum(path: &Path, expected: &Checksum, url: &str) -> Result<()> {
    tracing::debug!("Verifying checksum for: {}", path.display());
    let actual = compute_digest(path, expected.algorithm())?;
    tracing::debug!("Expected {}:   {}", expected.algorithm(), expected.digest());
    if expected.matches(&actual) {
        Ok(())
    } else {
        Err(KilnError::ChecksumMismatch {
            url: url.to_string(),
            expected: expected.to_string(),
            actual: format!("{}:{}", expected.algorithm(), actual),
        })
    }
}

/// Validates a source URL. Only `https` is accepted unless `allow_http` is set.
pub fn validate_url(url_str: &str, allow_http: bool) -> Result<()> {
    let url = Url::parse(url_str)
        .map_err(|e| KilnError::Validation(format!("Failed to parse URL '{url_str}': {e}")))?;
    match url.scheme() {
        "https" => Ok(()),
        "http" if allow_http => {
            tracing::warn!("Using insecure http URL: {}", url_str);
            Ok(())
        }
        scheme => Err(KilnError::Validation(format!(
            "Invalid URL scheme for '{url_str}': Must be https, but got '{scheme}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    // sha256("hello\n")
    const HELLO_SHA256: &str = "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03";

    #[test]
    fn verifies_matching_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        fs::write(&path, b"hello\n").unwrap();

        let expected = Checksum::sha256(HELLO_SHA256).unwrap();
        verify_checksum(&path, &expected, "https://example/hello.txt").unwrap();
        assert_eq!(
            compute_digest(&path, ChecksumAlgorithm::Sha512).unwrap().len(),
            128
        );
    }

    #[test]
    fn altered_bytes_are_a_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leadr-2.6.1.tar.gz");
        fs::write(&path, b"tampered").unwrap();

        let expected = Checksum::sha256(HELLO_SHA256).unwrap();
        let err = verify_checksum(&path, &expected, "https://example/leadr-2.6.1.tar.gz")
            .unwrap_err();
        match err {
            KilnError::ChecksumMismatch {
                url,
                expected,
                actual,
            } => {
                assert!(url.ends_with("leadr-2.6.1.tar.gz"));
                assert_eq!(expected, format!("sha256:{HELLO_SHA256}"));
                assert_ne!(actual, expected);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn url_scheme_policy() {
        assert!(validate_url("https://example.com/a.tar.gz", false).is_ok());
        assert!(validate_url("http://example.com/a.tar.gz", false).is_err());
        assert!(validate_url("http://127.0.0.1:8080/a.tar.gz", true).is_ok());
        assert!(validate_url("ftp://example.com/a.tar.gz", true).is_err());
        assert!(validate_url("not a url", true).is_err());
    }
}
