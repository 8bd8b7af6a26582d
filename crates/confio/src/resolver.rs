//! Locates and merges the files applicable to a lookup into an ordered
//! property-source list.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::model::{ConfigResponse, FileFormat};
use crate::parser::parse_file;
use crate::settings::Settings;
use crate::source::ConfigSource;

#[derive(Clone)]
pub struct Resolver {
    source: Arc<dyn ConfigSource>,
    settings: Arc<Settings>,
}

impl Resolver {
    pub fn new(source: Arc<dyn ConfigSource>, settings: Arc<Settings>) -> Self {
        Self { source, settings }
    }

    /// Resolves `(application, profiles, label)` into a config document.
    ///
    /// Candidate file names are expanded from the configured pattern list,
    /// most specific first; matches are parsed and appended in that order, so
    /// the resulting property-source order *is* the override precedence.
    /// Missing candidates are skipped silently. Unparseable matches are
    /// logged and skipped, unless nothing else matched at all.
    pub async fn resolve(
        &self,
        application: &str,
        profiles: &[String],
        label: &str,
    ) -> Result<ConfigResponse, ConfigError> {
        let snapshot = self.source.fetch(label).await?;

        let mut property_sources = Vec::new();
        let mut first_parse_error = None;
        for name in candidate_names(&self.settings.search_patterns, application, profiles) {
            let Some(file) = snapshot.file(&name) else {
                continue;
            };
            match parse_file(file) {
                Ok(source) => {
                    debug!(application, label, file = %name, "selected property source");
                    property_sources.push(source);
                }
                Err(err) => {
                    warn!(application, label, file = %name, error = %err, "skipping unparseable file");
                    first_parse_error.get_or_insert(err);
                }
            }
        }

        if property_sources.is_empty() {
            return Err(match first_parse_error {
                // Every match was unparseable: surface that, not a 404.
                Some(err) => err,
                None => ConfigError::application_not_found(application),
            });
        }

        Ok(ConfigResponse {
            name: application.to_owned(),
            profiles: profiles.to_vec(),
            label: label.to_owned(),
            version: snapshot.version,
            property_sources,
        })
    }
}

/// Expands the pattern list into concrete file names, in precedence order.
///
/// Patterns containing `{profile}` expand once per requested profile, in
/// request order (the first-listed profile stays the most specific). Each
/// expanded stem is tried with every recognized extension. Duplicates keep
/// their first (highest-precedence) position.
fn candidate_names(patterns: &[String], application: &str, profiles: &[String]) -> Vec<String> {
    let mut names = Vec::new();
    let mut seen = HashSet::new();

    let mut push = |stem: String| {
        for ext in FileFormat::EXTENSIONS {
            let name = format!("{stem}.{ext}");
            if seen.insert(name.clone()) {
                names.push(name);
            }
        }
    };

    for pattern in patterns {
        let stem = pattern.replace("{application}", application);
        if stem.contains("{profile}") {
            for profile in profiles {
                push(stem.replace("{profile}", profile));
            }
        } else {
            push(stem);
        }
    }

    names
}
