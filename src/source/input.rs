//! Input resolution: turn a user-supplied path or URL into PDF bytes.
//!
//! The pipeline works on in-memory bytes, so URLs are downloaded straight
//! into memory and local files are read whole. Both paths validate the PDF
//! magic bytes (`%PDF`) before returning so callers get a meaningful error
//! rather than a pdfium failure.

use crate::error::PipelineError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// PDF bytes plus a human-readable description of where they came from.
#[derive(Debug, Clone)]
pub struct SourceBytes {
    pub origin: String,
    pub bytes: Vec<u8>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to PDF bytes.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<SourceBytes, PipelineError> {
    if input.trim().is_empty() {
        return Err(PipelineError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(Path::new(input)).await
    }
}

/// Fail with [`PipelineError::NotAPdf`] unless `bytes` starts with `%PDF`.
pub fn ensure_pdf_magic(origin: &str, bytes: &[u8]) -> Result<(), PipelineError> {
    if bytes.len() >= 4 && &bytes[..4] == b"%PDF" {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = bytes.len().min(4);
    magic[..n].copy_from_slice(&bytes[..n]);
    Err(PipelineError::NotAPdf {
        origin: origin.to_string(),
        magic,
    })
}

async fn read_local(path: &Path) -> Result<SourceBytes, PipelineError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => PipelineError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => PipelineError::FileNotFound {
            path: PathBuf::from(path),
        },
    })?;

    let origin = path.display().to_string();
    ensure_pdf_magic(&origin, &bytes)?;
    debug!("Read local PDF: {} ({} bytes)", origin, bytes.len());

    Ok(SourceBytes { origin, bytes })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<SourceBytes, PipelineError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| PipelineError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let classify = |e: reqwest::Error| {
        if e.is_timeout() {
            PipelineError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            PipelineError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(classify)?;

    if !response.status().is_success() {
        return Err(PipelineError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(classify)?.to_vec();
    ensure_pdf_magic(url, &bytes)?;
    info!("Downloaded {} bytes", bytes.len());

    Ok(SourceBytes {
        origin: url.to_string(),
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn magic_check() {
        assert!(ensure_pdf_magic("x", b"%PDF-1.7\n").is_ok());
        match ensure_pdf_magic("x", b"PK") {
            Err(PipelineError::NotAPdf { magic, .. }) => assert_eq!(magic, [b'P', b'K', 0, 0]),
            other => panic!("expected NotAPdf, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let err = resolve_input("/definitely/not/a/real/file.pdf", 5)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn local_file_round_trip() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"%PDF-1.5\n%fake").unwrap();
        let src = resolve_input(tmp.path().to_str().unwrap(), 5).await.unwrap();
        assert_eq!(src.bytes, b"%PDF-1.5\n%fake");
    }

    #[tokio::test]
    async fn non_pdf_file_is_rejected() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"hello world").unwrap();
        let err = resolve_input(tmp.path().to_str().unwrap(), 5)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotAPdf { .. }));
    }
}
