//! Public entry point: validates lookups, drives the cache and resolver, and
//! carries the readiness signal the embedding layer's `/health` endpoint
//! reports.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cache::ResponseCache;
use crate::error::ConfigError;
use crate::model::{CacheKey, ConfigRequest, ConfigResponse};
use crate::resolver::Resolver;
use crate::settings::Settings;
use crate::source::ConfigSource;

/// Readiness of the engine, derived from the default label's fetch history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Up,
    Down,
}

#[derive(Default)]
struct State {
    /// When the default label last fetched successfully.
    last_success: Mutex<Option<Instant>>,
    /// Last version observed per label, for change detection.
    seen_versions: Mutex<HashMap<String, String>>,
}

impl State {
    fn mark_success(&self, label: &str, default_label: &str) {
        if label == default_label {
            *self.last_success.lock() = Some(Instant::now());
        }
    }

    /// Records `version` for `label`; true when it differs from the
    /// previously recorded one.
    fn record_version(&self, label: &str, version: &str) -> bool {
        let mut seen = self.seen_versions.lock();
        match seen.insert(label.to_owned(), version.to_owned()) {
            Some(previous) => previous != version,
            None => false,
        }
    }

    fn known_labels(&self) -> Vec<String> {
        self.seen_versions.lock().keys().cloned().collect()
    }
}

pub struct ConfigService {
    settings: Arc<Settings>,
    source: Arc<dyn ConfigSource>,
    resolver: Resolver,
    cache: ResponseCache,
    state: Arc<State>,
}

impl ConfigService {
    pub fn new(source: Arc<dyn ConfigSource>, settings: Settings) -> Self {
        let settings = Arc::new(settings);
        Self {
            resolver: Resolver::new(Arc::clone(&source), Arc::clone(&settings)),
            settings,
            source,
            cache: ResponseCache::new(),
            state: Arc::new(State::default()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Resolves one lookup, serving from cache when possible.
    ///
    /// Errors surface unchanged from the source and resolver so the embedding
    /// layer can map them: [`ConfigError::is_not_found`] to 404,
    /// [`ConfigError::is_retryable`] to 503, the rest to 400.
    pub async fn lookup(
        &self,
        request: &ConfigRequest,
    ) -> Result<Arc<ConfigResponse>, ConfigError> {
        let application = request.application.trim();
        if application.is_empty() {
            return Err(ConfigError::invalid_request("application must be non-empty"));
        }

        let label = request
            .label
            .clone()
            .unwrap_or_else(|| self.settings.default_label.clone());
        let profiles = if request.profiles.is_empty() {
            vec!["default".to_owned()]
        } else {
            request.profiles.clone()
        };

        debug!(application, ?profiles, %label, "lookup");
        let key = CacheKey::new(application, &profiles, &label);

        let resolver = self.resolver.clone();
        let state = Arc::clone(&self.state);
        let default_label = self.settings.default_label.clone();
        let application = application.to_owned();
        let closure_label = label.clone();
        self.cache
            .get_or_resolve(key, move || async move {
                let result = resolver
                    .resolve(&application, &profiles, &closure_label)
                    .await;
                match &result {
                    Ok(response) => {
                        state.mark_success(&closure_label, &default_label);
                        state.record_version(&closure_label, &response.version);
                    }
                    // The store was reached and the label materialized;
                    // only the requested content was missing or broken.
                    Err(ConfigError::ApplicationNotFound { .. } | ConfigError::Parse { .. }) => {
                        state.mark_success(&closure_label, &default_label);
                    }
                    Err(_) => {}
                }
                result
            })
            .await
    }

    /// Checks upstream for `label` and invalidates its cached documents when
    /// the version moved. A lookup arriving after this returns sees the new
    /// revision.
    pub async fn refresh(&self, label: &str) -> Result<String, ConfigError> {
        let snapshot = self.source.fetch(label).await?;
        self.state.mark_success(label, &self.settings.default_label);
        if self.state.record_version(label, &snapshot.version) {
            info!(label, version = %snapshot.version, "source moved, invalidating cache");
            self.cache.invalidate(label);
        }
        Ok(snapshot.version)
    }

    /// Drops every cached document for `label` without touching the source.
    pub fn invalidate(&self, label: &str) {
        self.cache.invalidate(label);
    }

    /// Up while the default label fetched successfully within the configured
    /// freshness window; Down before the first fetch and after an outage
    /// outlives the window.
    pub fn health(&self) -> Health {
        match *self.state.last_success.lock() {
            Some(at) if at.elapsed() <= self.settings.freshness_window => Health::Up,
            _ => Health::Down,
        }
    }

    /// Spawns the background loop polling every known label (the default one
    /// included) each `refresh_interval`.
    pub fn spawn_refresh_loop(self: Arc<Self>) -> JoinHandle<()> {
        let service = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(service.settings.refresh_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let mut labels = service.state.known_labels();
                if !labels.contains(&service.settings.default_label) {
                    labels.push(service.settings.default_label.clone());
                }
                for label in labels {
                    if let Err(err) = service.refresh(&label).await {
                        warn!(label, error = %err, "background refresh failed");
                    }
                }
            }
        })
    }
}
