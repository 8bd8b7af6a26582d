use std::collections::HashSet;

use serde::Serialize;
use serde::ser::{SerializeMap, SerializeStruct, Serializer};

/// Recognized configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Properties,
    Yaml,
    Json,
}

impl FileFormat {
    /// Maps a file name to its format by extension. Unknown extensions
    /// (and extension-less names) are not configuration files.
    pub fn from_name(name: &str) -> Option<Self> {
        let ext = name.rsplit_once('.')?.1;
        match ext {
            "properties" => Some(Self::Properties),
            "yml" | "yaml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Extensions the resolver appends to a file-name pattern, tried in order.
    pub const EXTENSIONS: [&'static str; 4] = ["properties", "yml", "yaml", "json"];
}

/// A client lookup: which application's configuration, layered with which
/// profiles, at which revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigRequest {
    pub application: String,
    /// Most specific first; the first profile wins key conflicts.
    pub profiles: Vec<String>,
    /// Branch or tag; `None` falls back to the configured default.
    pub label: Option<String>,
}

impl ConfigRequest {
    pub fn new(application: impl Into<String>, profiles: Vec<String>) -> Self {
        Self {
            application: application.into(),
            profiles,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// One file as fetched from the backing store. Immutable for a given
/// label + version; the adapter re-materializes it on refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFile {
    pub name: String,
    pub label: String,
    pub content: Vec<u8>,
    pub format: FileFormat,
}

/// An ordered key/value set originating from a single file.
///
/// Entry order within a source is the file's own order. Order *across*
/// sources in a [`ConfigResponse`] encodes override precedence: earlier wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySource {
    /// File identity, e.g. `orders-prod.yml@main`.
    pub origin: String,
    pub entries: Vec<(String, String)>,
}

impl PropertySource {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

// Serialized as `{"name": ..., "source": {k: v, ...}}` so HTTP layers can
// emit the conventional config-server document shape.
impl Serialize for PropertySource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct Entries<'a>(&'a [(String, String)]);

        impl Serialize for Entries<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(Some(self.0.len()))?;
                for (key, value) in self.0 {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }

        let mut state = serializer.serialize_struct("PropertySource", 2)?;
        state.serialize_field("name", &self.origin)?;
        state.serialize_field("source", &Entries(&self.entries))?;
        state.end()
    }
}

/// The resolved configuration document. Immutable; shared between concurrent
/// readers behind an `Arc` and safe to cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    pub name: String,
    pub profiles: Vec<String>,
    pub label: String,
    /// Commit identifier of the source revision this was resolved from.
    pub version: String,
    /// Precedence order: earlier sources override later ones.
    pub property_sources: Vec<PropertySource>,
}

impl ConfigResponse {
    /// Folds the property sources into the effective key/value view,
    /// first occurrence of a key winning. Key order follows first sight.
    pub fn effective(&self) -> Vec<(String, String)> {
        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        for source in &self.property_sources {
            for (key, value) in &source.entries {
                if seen.insert(key.as_str()) {
                    merged.push((key.clone(), value.clone()));
                }
            }
        }
        merged
    }

    /// Effective value for a single key, honoring override precedence.
    pub fn effective_value(&self, key: &str) -> Option<&str> {
        self.property_sources.iter().find_map(|s| s.get(key))
    }
}

/// Cache identity of a resolved document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub application: String,
    pub profiles: Vec<String>,
    pub label: String,
}

impl CacheKey {
    pub fn new(application: &str, profiles: &[String], label: &str) -> Self {
        Self {
            application: application.to_owned(),
            profiles: profiles.to_vec(),
            label: label.to_owned(),
        }
    }
}
