//! Smart-HTTP plumbing: spawning the stateless-rpc git services and framing
//! their output. Requests only reach this module after the access gate has
//! allowed them.

use std::path::Path;
use std::process::Output;
use std::time::Duration;

use async_compression::tokio::bufread::GzipDecoder;
use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use axum::response::{IntoResponse, Response};
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::warn;

use crate::error::{Error, Result};

const GIT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// The two smart-HTTP services. Download covers clone/fetch, upload covers
/// push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitService {
    UploadPack,
    ReceivePack,
}

impl GitService {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "git-upload-pack" => Some(Self::UploadPack),
            "git-receive-pack" => Some(Self::ReceivePack),
            _ => None,
        }
    }

    pub fn command_name(&self) -> &'static str {
        match self {
            Self::UploadPack => "git-upload-pack",
            Self::ReceivePack => "git-receive-pack",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::UploadPack => "application/x-git-upload-pack-result",
            Self::ReceivePack => "application/x-git-receive-pack-result",
        }
    }

    pub fn advertisement_content_type(&self) -> &'static str {
        match self {
            Self::UploadPack => "application/x-git-upload-pack-advertisement",
            Self::ReceivePack => "application/x-git-receive-pack-advertisement",
        }
    }

    /// True for the push service.
    pub fn is_upload(&self) -> bool {
        matches!(self, Self::ReceivePack)
    }
}

pub async fn run_git_command(
    repo_path: &Path,
    service: GitService,
    advertise_refs: bool,
    input: Option<&[u8]>,
) -> Result<Output> {
    let mut cmd = Command::new(service.command_name());
    cmd.arg("--stateless-rpc");

    if advertise_refs {
        cmd.arg("--advertise-refs");
    }

    cmd.arg(repo_path);
    cmd.stdin(std::process::Stdio::piped());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());

    let mut child = cmd.spawn().map_err(Error::Io)?;

    if let Some(data) = input {
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(data).await.map_err(Error::Io)?;
        }
    }

    let output = tokio::time::timeout(GIT_COMMAND_TIMEOUT, child.wait_with_output())
        .await
        .map_err(|_| Error::BadRequest("Git command timed out".into()))?
        .map_err(Error::Io)?;

    Ok(output)
}

pub fn format_pkt_line_header(service: GitService) -> Vec<u8> {
    let service_name = service.command_name();
    let service_line = format!("# service={service_name}\n");
    let length = service_line.len() + 4;
    let mut result = format!("{length:04x}{service_line}").into_bytes();
    result.extend_from_slice(b"0000");
    result
}

fn build_git_response(body: Vec<u8>, content_type: &str) -> Response {
    let mut response = body.into_response();
    response
        .headers_mut()
        .insert("Content-Type", content_type.parse().unwrap());
    response
        .headers_mut()
        .insert("Cache-Control", "no-cache".parse().unwrap());
    response
}

/// Serves `GET .../info/refs?service=...`.
pub async fn advertise_refs(repo_path: &Path, service: GitService) -> Response {
    let output = match run_git_command(repo_path, service, true, None).await {
        Ok(o) => o,
        Err(e) => {
            warn!("git command failed: {e}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Git command failed").into_response();
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!("git command failed: {stderr}");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Git command failed").into_response();
    }

    let mut body = format_pkt_line_header(service);
    body.extend_from_slice(&output.stdout);

    build_git_response(body, service.advertisement_content_type())
}

/// Serves `POST .../git-upload-pack` and `POST .../git-receive-pack`.
pub async fn service_rpc(
    repo_path: &Path,
    service: GitService,
    headers: &HeaderMap,
    body: Bytes,
) -> Response {
    let input = match decompress_if_gzip(headers, body).await {
        Ok(data) => data,
        Err(e) => return e,
    };

    let output = match run_git_command(repo_path, service, false, Some(&input)).await {
        Ok(o) => o,
        Err(e) => {
            warn!("{} failed: {e}", service.command_name());
            return (StatusCode::INTERNAL_SERVER_ERROR, "Git command failed").into_response();
        }
    };

    build_git_response(output.stdout, service.content_type())
}

async fn decompress_if_gzip(headers: &HeaderMap, body: Bytes) -> std::result::Result<Vec<u8>, Response> {
    let content_encoding = headers
        .get("Content-Encoding")
        .and_then(|v| v.to_str().ok());

    if content_encoding == Some("gzip") {
        let reader = std::io::Cursor::new(body);
        let mut decoder = GzipDecoder::new(tokio::io::BufReader::new(reader));
        let mut decompressed = Vec::new();

        decoder
            .read_to_end(&mut decompressed)
            .await
            .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid gzip body").into_response())?;

        Ok(decompressed)
    } else {
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_service_from_str() {
        assert_eq!(
            GitService::from_str("git-upload-pack"),
            Some(GitService::UploadPack)
        );
        assert_eq!(
            GitService::from_str("git-receive-pack"),
            Some(GitService::ReceivePack)
        );
        assert_eq!(GitService::from_str("invalid"), None);
    }

    #[test]
    fn test_service_classification() {
        assert!(!GitService::UploadPack.is_upload());
        assert!(GitService::ReceivePack.is_upload());
    }

    #[test]
    fn test_format_pkt_line_header() {
        let header = format_pkt_line_header(GitService::UploadPack);
        let header_str = String::from_utf8_lossy(&header);
        assert!(header_str.starts_with("001e# service=git-upload-pack\n"));
        assert!(header_str.ends_with("0000"));
    }
}
