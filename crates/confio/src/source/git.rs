//! Git-backed source adapter.
//!
//! Maintains one shallow working copy per label under the configured workdir.
//! Every fetch starts with a cheap `ls-remote` probe; the working copy is only
//! cloned or refreshed when the upstream revision moved. Fetches of the same
//! label are serialized through a per-label async mutex; distinct labels
//! refresh concurrently.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::ConfigError;
use crate::model::{FileFormat, RawFile};
use crate::settings::Settings;
use crate::source::{ConfigSource, SourceSnapshot};

pub struct GitSource {
    uri: String,
    workdir: PathBuf,
    /// Per-label fetch locks. The outer map is touched briefly and never
    /// across an await.
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    /// Last version materialized per label.
    versions: RwLock<HashMap<String, String>>,
}

impl GitSource {
    pub fn new(settings: &Settings) -> Self {
        Self {
            uri: settings.source_uri.clone(),
            workdir: settings.workdir.clone(),
            locks: Mutex::new(HashMap::new()),
            versions: RwLock::new(HashMap::new()),
        }
    }

    fn label_lock(&self, label: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(label.to_owned())
            .or_default()
            .clone()
    }

    fn label_dir(&self, label: &str) -> PathBuf {
        self.workdir.join(workdir_name(label))
    }

    async fn run_git(args: &[&str], cwd: Option<&Path>) -> Result<Output, ConfigError> {
        let mut cmd = Command::new("git");
        cmd.args(args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        cmd.kill_on_drop(false);
        cmd.output()
            .await
            .map_err(|e| ConfigError::source_unavailable(format!("failed to run git: {e}")))
    }

    /// `ls-remote` probe: resolves the label's current upstream revision
    /// without touching the working copy.
    async fn remote_version(&self, label: &str) -> Result<String, ConfigError> {
        let heads = format!("refs/heads/{label}");
        let tags = format!("refs/tags/{label}");
        let output = Self::run_git(&["ls-remote", &self.uri, &heads, &tags], None).await?;

        if !output.status.success() {
            return Err(ConfigError::source_unavailable(format!(
                "git ls-remote {} failed: {}",
                self.uri,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_ls_remote(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| ConfigError::label_not_found(label))
    }

    async fn materialize(&self, label: &str, dir: &Path) -> Result<String, ConfigError> {
        let git_dir = dir.join(".git");
        if tokio::fs::try_exists(&git_dir).await.unwrap_or(false) {
            debug!(label, "refreshing working copy");
            let fetch = Self::run_git(&["fetch", "--depth", "1", "origin", label], Some(dir)).await?;
            if !fetch.status.success() {
                return Err(ConfigError::source_unavailable(format!(
                    "git fetch for label `{label}` failed: {}",
                    String::from_utf8_lossy(&fetch.stderr).trim()
                )));
            }
            let reset = Self::run_git(&["reset", "--hard", "FETCH_HEAD"], Some(dir)).await?;
            if !reset.status.success() {
                return Err(ConfigError::source_unavailable(format!(
                    "git reset for label `{label}` failed: {}",
                    String::from_utf8_lossy(&reset.stderr).trim()
                )));
            }
        } else {
            info!(label, uri = %self.uri, "cloning working copy");
            tokio::fs::create_dir_all(&self.workdir).await?;
            let dir_str = dir.to_string_lossy().into_owned();
            let clone = Self::run_git(
                &[
                    "clone",
                    "--depth",
                    "1",
                    "--branch",
                    label,
                    "--single-branch",
                    &self.uri,
                    &dir_str,
                ],
                None,
            )
            .await?;
            if !clone.status.success() {
                return Err(ConfigError::source_unavailable(format!(
                    "git clone of `{}` (label `{label}`) failed: {}",
                    self.uri,
                    String::from_utf8_lossy(&clone.stderr).trim()
                )));
            }
        }

        let head = Self::run_git(&["rev-parse", "HEAD"], Some(dir)).await?;
        if !head.status.success() {
            return Err(ConfigError::source_unavailable(format!(
                "git rev-parse for label `{label}` failed: {}",
                String::from_utf8_lossy(&head.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&head.stdout).trim().to_owned())
    }

    /// Reads the recognized configuration files at the root of the working
    /// copy, sorted by name for deterministic snapshots.
    async fn read_files(&self, label: &str, dir: &Path) -> Result<Vec<RawFile>, ConfigError> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let Some(format) = FileFormat::from_name(&name) else {
                continue;
            };
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let content = tokio::fs::read(entry.path()).await?;
            files.push(RawFile {
                name,
                label: label.to_owned(),
                content,
                format,
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }
}

#[async_trait]
impl ConfigSource for GitSource {
    async fn fetch(&self, label: &str) -> Result<SourceSnapshot, ConfigError> {
        let lock = self.label_lock(label);
        let _guard = lock.lock().await;

        let remote = self.remote_version(label).await?;
        let dir = self.label_dir(label);
        let cached = self.versions.read().get(label).cloned();
        let have_copy = tokio::fs::try_exists(dir.join(".git")).await.unwrap_or(false);

        let version = if cached.as_deref() == Some(remote.as_str()) && have_copy {
            debug!(label, version = %remote, "upstream unchanged, serving working copy");
            remote
        } else {
            let head = self.materialize(label, &dir).await?;
            if head != remote {
                // A push raced our probe; the working copy is what we serve.
                warn!(label, probed = %remote, checked_out = %head, "revision moved during fetch");
            }
            self.versions.write().insert(label.to_owned(), head.clone());
            head
        };

        let files = self.read_files(label, &dir).await?;
        Ok(SourceSnapshot { version, files })
    }

    fn cached_version(&self, label: &str) -> Option<String> {
        self.versions.read().get(label).cloned()
    }
}

/// First column of the first `ls-remote` output line, i.e. the revision the
/// queried ref points at. `None` when the ref does not exist.
fn parse_ls_remote(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.split_whitespace().next())
        .filter(|hash| !hash.is_empty())
        .map(str::to_owned)
}

/// Labels may contain `/` (e.g. `feature/x`); encode them into a single
/// directory component.
fn workdir_name(label: &str) -> String {
    label.replace(['/', '\\'], "_")
}
