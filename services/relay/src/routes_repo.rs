use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, Json};
use modelops::{UploadRepoRequest, UploadRepoResponse};
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::error::{api_error, ApiFailure};
use crate::state::SharedState;
use crate::stores::Snippet;

const SOURCE_EXTENSIONS: &[&str] = &["py", "js", "ts", "java", "cpp", "h", "cs", "rs", "go"];
const MAX_FILE_BYTES: u64 = 256 * 1024;
const INSERT_BATCH: usize = 32;
const CLONE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid repository url: {0}")]
    InvalidUrl(String),
    #[error("git clone failed: {0}")]
    Clone(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("vector store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl From<IngestError> for ApiFailure {
    fn from(e: IngestError) -> Self {
        let status = match e {
            IngestError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        api_error(status, e.to_string())
    }
}

pub async fn upload_repo(
    State(st): State<SharedState>,
    Json(req): Json<UploadRepoRequest>,
) -> Result<Json<UploadRepoResponse>, ApiFailure> {
    let repo_url = req.repo_url.trim();
    validate_repo_url(repo_url)?;

    let inserted = ingest(&st, repo_url).await.map_err(|e| {
        warn!(repo_url, error = %e, "upload_repo failed");
        ApiFailure::from(e)
    })?;

    info!(repo_url, inserted, "upload_repo: done");
    Ok(Json(UploadRepoResponse {
        message: "Repository uploaded and embedded successfully".to_string(),
    }))
}

async fn ingest(st: &SharedState, repo_url: &str) -> Result<usize, IngestError> {
    let checkout = tempfile::tempdir()?;
    git_clone(repo_url, checkout.path()).await?;

    let root = checkout.path().to_path_buf();
    let snippets = tokio::task::spawn_blocking(move || collect_sources(&root))
        .await
        .map_err(|e| IngestError::Io(std::io::Error::other(e)))??;
    info!(repo_url, files = snippets.len(), "upload_repo: embedding sources");

    let mut inserted = 0;
    for batch in snippets.chunks(INSERT_BATCH) {
        inserted += st.vector.insert(batch).await?;
    }
    Ok(inserted)
}

pub fn validate_repo_url(url: &str) -> Result<(), IngestError> {
    if url.is_empty() {
        return Err(IngestError::InvalidUrl("repo_url is empty".into()));
    }
    let allowed = ["https://", "http://", "ssh://", "git@"];
    if !allowed.iter().any(|p| url.starts_with(p)) || url.chars().any(char::is_whitespace) {
        return Err(IngestError::InvalidUrl(url.to_string()));
    }
    Ok(())
}

async fn git_clone(url: &str, into: &Path) -> Result<(), IngestError> {
    let mut cmd = Command::new("git");
    cmd.arg("clone").arg("--depth").arg("1").arg("--").arg(url).arg(into);
    run_bounded(cmd, CLONE_TIMEOUT).await
}

/// Runs `cmd` to completion, killing it once `limit` elapses.
async fn run_bounded(mut cmd: Command, limit: Duration) -> Result<(), IngestError> {
    cmd.stdin(Stdio::null()).kill_on_drop(true);
    let out = match timeout(limit, cmd.output()).await {
        Ok(out) => out?,
        Err(_) => return Err(IngestError::Clone(format!("timed out after {}s", limit.as_secs_f32()))),
    };

    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        return Err(IngestError::Clone(stderr.trim().to_string()));
    }
    Ok(())
}

/// Source files under `root` with repo-relative paths. Skips `.git`,
/// oversized files and anything that is not UTF-8.
pub fn collect_sources(root: &Path) -> std::io::Result<Vec<Snippet>> {
    let mut out = Vec::new();
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let ty = entry.file_type()?;
            if ty.is_dir() {
                if entry.file_name() != ".git" {
                    pending.push(path);
                }
                continue;
            }
            if !ty.is_file() || !is_source(&path) || entry.metadata()?.len() > MAX_FILE_BYTES {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(&path) else { continue };
            let rel = path.strip_prefix(root).unwrap_or(&path);
            out.push(Snippet {
                file_path: rel.to_string_lossy().replace('\\', "/"),
                content,
            });
        }
    }

    out.sort_by(|a, b| a.file_path.cmp(&b.file_path));
    Ok(out)
}

fn is_source(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SOURCE_EXTENSIONS.contains(&e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_repo_url() {
        assert!(validate_repo_url("https://github.com/a/b.git").is_ok());
        assert!(validate_repo_url("git@github.com:a/b.git").is_ok());
        assert!(validate_repo_url("").is_err());
        assert!(validate_repo_url("--upload-pack=touch /tmp/x").is_err());
        assert!(validate_repo_url("file:///etc").is_err());
    }

    #[tokio::test]
    async fn test_hung_clone_is_killed_after_limit() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let started = std::time::Instant::now();

        let err = run_bounded(cmd, Duration::from_millis(100)).await.unwrap_err();

        assert!(matches!(&err, IngestError::Clone(msg) if msg.starts_with("timed out")), "got {err}");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_failed_command_reports_stderr() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo 'repository not found' >&2; exit 128");

        let err = run_bounded(cmd, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, IngestError::Clone(msg) if msg == "repository not found"));
    }

    #[test]
    fn test_collect_sources_filters_and_relativizes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src/nested")).unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(root.join("main.py"), "print('hi')").unwrap();
        std::fs::write(root.join("src/nested/lib.rs"), "fn x() {}").unwrap();
        std::fs::write(root.join("README.md"), "# readme").unwrap();
        std::fs::write(root.join(".git/hook.py"), "ignored").unwrap();
        std::fs::write(root.join("blob.js"), [0xffu8, 0xfe, 0x00]).unwrap();

        let got = collect_sources(root).unwrap();
        let paths: Vec<&str> = got.iter().map(|s| s.file_path.as_str()).collect();
        assert_eq!(paths, vec!["main.py", "src/nested/lib.rs"]);
        assert_eq!(got[0].content, "print('hi')");
    }
}
