//! In-memory source adapter, used by tests and demos where a real backing
//! repository is not wanted. Supports version bumps and failure injection so
//! cache and health behavior can be exercised deterministically.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::ConfigError;
use crate::model::{FileFormat, RawFile};
use crate::source::{ConfigSource, SourceSnapshot};

#[derive(Default)]
struct LabelData {
    version: String,
    files: Vec<RawFile>,
}

#[derive(Default)]
pub struct MemorySource {
    labels: RwLock<HashMap<String, LabelData>>,
    unavailable: RwLock<Option<String>>,
    fetches: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Installs (or replaces) a label's snapshot.
    pub fn set_label(
        &self,
        label: &str,
        version: &str,
        files: impl IntoIterator<Item = (&'static str, &'static str)>,
    ) {
        let files = files
            .into_iter()
            .map(|(name, content)| RawFile {
                name: name.to_owned(),
                label: label.to_owned(),
                content: content.as_bytes().to_vec(),
                format: FileFormat::from_name(name)
                    .unwrap_or(FileFormat::Properties),
            })
            .collect();
        self.labels.write().insert(
            label.to_owned(),
            LabelData {
                version: version.to_owned(),
                files,
            },
        );
    }

    /// All subsequent fetches fail with `SourceUnavailable` until cleared.
    pub fn set_unavailable(&self, reason: &str) {
        *self.unavailable.write() = Some(reason.to_owned());
    }

    pub fn set_available(&self) {
        *self.unavailable.write() = None;
    }

    /// Number of fetches served so far, across all labels.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigSource for MemorySource {
    async fn fetch(&self, label: &str) -> Result<SourceSnapshot, ConfigError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if let Some(reason) = self.unavailable.read().clone() {
            return Err(ConfigError::source_unavailable(reason));
        }

        let labels = self.labels.read();
        let data = labels
            .get(label)
            .ok_or_else(|| ConfigError::label_not_found(label))?;
        Ok(SourceSnapshot {
            version: data.version.clone(),
            files: data.files.clone(),
        })
    }

    fn cached_version(&self, label: &str) -> Option<String> {
        self.labels.read().get(label).map(|d| d.version.clone())
    }
}
