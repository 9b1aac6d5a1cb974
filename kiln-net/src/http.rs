use std::path::{Path, PathBuf};

use futures::StreamExt;
use kiln_common::config::Config;
use kiln_common::error::{KilnError, Result};
use kiln_common::model::formula::FormulaDescriptor;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Client;
use tokio::fs::{self, File as TokioFile};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, warn};

use crate::validation::{validate_url, verify_checksum};

const USER_AGENT_STRING: &str = concat!("kiln/", env!("CARGO_PKG_VERSION"), " (Rust)");
const MAX_REDIRECTS: usize = 10;

/// Downloads the formula's source archive into `dest_dir` and verifies it
/// against the declared checksum.
///
/// The primary URL is tried first, then each mirror. Transport failures and
/// non-2xx responses move on to the next URL; a checksum mismatch on a
/// completed download is final. Nothing is left in `dest_dir` on failure.
pub async fn fetch_formula_source(
    descriptor: &FormulaDescriptor,
    dest_dir: &Path,
    config: &Config,
) -> Result<PathBuf> {
    let file_name = archive_file_name(&descriptor.source_url)
        .unwrap_or_else(|| format!("{}-download", descriptor.name));
    let dest_path = dest_dir.join(&file_name);

    debug!(
        "Preparing to fetch source for '{}' into {}",
        descriptor.name,
        dest_path.display()
    );
    debug!("Expected checksum: {}", descriptor.checksum);

    fs::create_dir_all(dest_dir).await.map_err(|e| {
        KilnError::Install(format!(
            "Failed to create download directory {}: {}",
            dest_dir.display(),
            e
        ))
    })?;

    let urls: Vec<&str> = descriptor.source_urls().collect();
    for url in &urls {
        validate_url(url, config.allow_insecure_http)?;
    }

    let client = build_http_client(config)?;
    let mut last_error: Option<KilnError> = None;

    for url in urls {
        debug!("Attempting download from: {}", url);
        match download_to(&client, url, &dest_path).await {
            Ok(()) => {}
            Err(e) => {
                error!("Download attempt failed from {}: {}", url, e);
                last_error = Some(e);
                continue;
            }
        }

        let verify_path = dest_path.clone();
        let expected = descriptor.checksum.clone();
        let origin = url.to_string();
        let verified = tokio::task::spawn_blocking(move || {
            verify_checksum(&verify_path, &expected, &origin)
        })
        .await
        .map_err(|e| KilnError::Install(format!("Checksum task failed: {e}")))?;

        return match verified {
            Ok(()) => {
                debug!("Checksum verified for {}", dest_path.display());
                Ok(dest_path)
            }
            Err(e) => {
                remove_quietly(&dest_path).await;
                Err(e)
            }
        };
    }

    Err(last_error.unwrap_or_else(|| KilnError::DownloadFailed {
        url: descriptor.source_url.clone(),
        reason: "All download attempts failed.".to_string(),
    }))
}

pub fn build_http_client(config: &Config) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    Client::builder()
        .timeout(config.download_timeout)
        .connect_timeout(config.connect_timeout)
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .build()
        .map_err(|e| KilnError::Config(format!("Failed to build HTTP client: {e}")))
}

/// Streams `url` into `final_path` via a sibling temp file that is renamed
/// into place once the body is complete.
async fn download_to(client: &Client, url: &str, final_path: &Path) -> Result<()> {
    let temp_filename = format!(
        ".{}.download",
        final_path.file_name().unwrap_or_default().to_string_lossy()
    );
    let temp_path = final_path.with_file_name(temp_filename);
    debug!("Downloading to temporary path: {}", temp_path.display());

    let result = stream_to_file(client, url, &temp_path).await;
    if let Err(e) = result {
        remove_quietly(&temp_path).await;
        return Err(e);
    }

    fs::rename(&temp_path, final_path).await.map_err(|e| {
        KilnError::Install(format!(
            "Failed to move temp file {} to {}: {}",
            temp_path.display(),
            final_path.display(),
            e
        ))
    })?;
    debug!("Moved download to final location: {}", final_path.display());
    Ok(())
}

async fn stream_to_file(client: &Client, url: &str, temp_path: &Path) -> Result<()> {
    let download_failed = |reason: String| KilnError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| download_failed(format!("HTTP request failed: {e}")))?;
    let status = response.status();
    debug!("Received HTTP status: {} for {}", status, url);

    if !status.is_success() {
        return Err(download_failed(format!("HTTP status {status}")));
    }

    let mut temp_file = TokioFile::create(temp_path).await.map_err(|e| {
        KilnError::Install(format!(
            "Failed to create temp file {}: {}",
            temp_path.display(),
            e
        ))
    })?;

    let mut total: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| download_failed(format!("Failed to read response body: {e}")))?;
        total += chunk.len() as u64;
        temp_file.write_all(&chunk).await.map_err(|e| {
            KilnError::Install(format!(
                "Failed to write download stream to {}: {}",
                temp_path.display(),
                e
            ))
        })?;
    }
    temp_file.flush().await?;
    debug!("Finished writing {} bytes from {}", total, url);
    Ok(())
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove {}: {}", path.display(), e);
        }
    }
}

/// Last path segment of `url`, without query or fragment.
fn archive_file_name(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .next_back()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}
