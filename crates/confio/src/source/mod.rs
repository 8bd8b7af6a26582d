//! Source adapters: where raw configuration files come from.

pub mod git;
pub mod memory;

use async_trait::async_trait;

use crate::error::ConfigError;
use crate::model::RawFile;

/// The files of one label at one revision, as returned by a fetch.
#[derive(Debug, Clone)]
pub struct SourceSnapshot {
    /// Commit identifier of the revision the files were read from.
    pub version: String,
    pub files: Vec<RawFile>,
}

impl SourceSnapshot {
    pub fn file(&self, name: &str) -> Option<&RawFile> {
        self.files.iter().find(|f| f.name == name)
    }
}

/// A backing store of versioned configuration files.
///
/// Implementations must serialize concurrent fetches of the *same* label
/// (the working copy refresh is not reentrant) while letting distinct labels
/// proceed in parallel. A fetch performs a cheap upstream staleness check and
/// only re-materializes the working copy when the revision moved.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Fetches the current snapshot for `label`.
    ///
    /// Fails with [`ConfigError::LabelNotFound`] when the label does not
    /// exist upstream and [`ConfigError::SourceUnavailable`] when the store
    /// cannot be reached.
    async fn fetch(&self, label: &str) -> Result<SourceSnapshot, ConfigError>;

    /// Last version observed for `label`, if any fetch has succeeded.
    /// Does not touch the upstream store.
    fn cached_version(&self, label: &str) -> Option<String>;
}
