pub mod first_pass;
pub mod init_db;
pub mod second_pass;

use crate::catalog::CatalogError;
use crate::matcher::{IndexError, MatcherError};
use crate::source::ReaderError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input io error: {0}")]
    Reader(#[from] ReaderError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("matcher error: {0}")]
    Matcher(#[from] MatcherError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// First 32 hex chars of SHA-256 over `path|mtime|size`. Re-running over an
/// unchanged file yields the same id, which keeps re-registration idempotent.
pub fn compute_file_id(path: &Path) -> Result<String, std::io::Error> {
    let meta = std::fs::metadata(path)?;
    let mtime = meta
        .modified()?
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let key = format!("{}|{}|{}", path.display(), mtime, meta.len());
    let digest = Sha256::digest(key.as_bytes());
    Ok(format!("{:x}", digest)[..32].to_string())
}

/// `<base>.normal.txt` where `<base>` is the input path minus `.gz` minus
/// its final extension.
pub fn derive_normal_path(path: &Path, override_path: Option<&Path>) -> PathBuf {
    if let Some(p) = override_path {
        return p.to_path_buf();
    }
    let s = path.to_string_lossy();
    let without_gz = s.strip_suffix(".gz").unwrap_or(&s);
    let base = match without_gz.rfind('.') {
        // Keep directory dots intact: only strip after the last separator.
        Some(idx) if !without_gz[idx..].contains('/') => &without_gz[..idx],
        _ => without_gz,
    };
    let base = if base.is_empty() { without_gz } else { base };
    PathBuf::from(format!("{}.normal.txt", base))
}

/// Sibling uniq outputs of a normal file: `<stem>_uniq.txt` and
/// `<stem>_uniq_with_count.tsv`.
pub fn derive_uniq_paths(normal_path: &Path) -> (PathBuf, PathBuf) {
    let s = normal_path.to_string_lossy();
    let base = match s.rfind('.') {
        Some(idx) if !s[idx..].contains('/') => &s[..idx],
        _ => s.as_ref(),
    };
    (
        PathBuf::from(format!("{}_uniq.txt", base)),
        PathBuf::from(format!("{}_uniq_with_count.tsv", base)),
    )
}
