// src/fetch/download.rs
use anyhow::{bail, Context, Result};
use glob::glob;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::DownloadConfig;

/// Save downloaded bytes under `dest_dir/filename`. The bytes land in a
/// `.part` file first and are renamed once complete.
pub async fn save_download(dest_dir: &Path, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(dest_dir)
        .await
        .with_context(|| format!("creating download dir {}", dest_dir.display()))?;
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("download.xls");
    let dest = dest_dir.join(name);
    let part = dest_dir.join(format!("{name}.part"));
    fs::write(&part, bytes)
        .await
        .with_context(|| format!("writing {}", part.display()))?;
    fs::rename(&part, &dest)
        .await
        .with_context(|| format!("renaming {} to {}", part.display(), dest.display()))?;
    Ok(dest)
}

/// Waits for a new, completed file to show up in a download directory.
pub struct DownloadWatcher {
    dir: PathBuf,
    before: HashSet<PathBuf>,
}

impl DownloadWatcher {
    /// Record what the directory holds right now; only files appearing
    /// after this call count as new.
    pub fn snapshot(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating download dir {}", dir.display()))?;
        let before = list_files(&dir)?;
        debug!(dir = %dir.display(), existing = before.len(), "download dir snapshot");
        Ok(Self { dir, before })
    }

    /// Poll until a new complete file with an accepted extension appears,
    /// giving up after the configured number of attempts.
    pub async fn wait_for_new(&self, policy: &DownloadConfig) -> Result<PathBuf> {
        for attempt in 1..=policy.poll_attempts {
            let mut fresh: Vec<PathBuf> = list_files(&self.dir)?
                .into_iter()
                .filter(|p| !self.before.contains(p))
                .filter(|p| is_complete(p, policy))
                .collect();
            fresh.sort();
            if let Some(path) = fresh.into_iter().next() {
                info!(path = %path.display(), attempt, "download complete");
                return Ok(path);
            }
            sleep(policy.poll_interval()).await;
        }
        bail!(
            "no completed download appeared in {} after {} attempts",
            self.dir.display(),
            policy.poll_attempts
        )
    }
}

fn list_files(dir: &Path) -> Result<HashSet<PathBuf>> {
    let pattern = format!("{}/*", glob::Pattern::escape(&dir.to_string_lossy()));
    Ok(glob(&pattern)
        .with_context(|| format!("invalid glob pattern {pattern}"))?
        .filter_map(|entry| entry.ok())
        .filter(|p| p.is_file())
        .collect())
}

/// Partial downloads carry a transient suffix; anything else must have one
/// of the accepted extensions.
fn is_complete(path: &Path, policy: &DownloadConfig) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let lower = name.to_lowercase();
    if policy
        .partial_suffixes
        .iter()
        .any(|s| lower.ends_with(&s.to_lowercase()))
    {
        return false;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |ext| {
            policy
                .accepted_extensions
                .iter()
                .any(|a| a.trim_start_matches('.').eq_ignore_ascii_case(ext))
        })
}
