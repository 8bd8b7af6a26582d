use std::path::PathBuf;
use std::time::Duration;

/// Immutable engine configuration, built once at startup and shared by
/// reference. There is no ambient registry: every component receives the
/// settings it needs through its constructor.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Location of the backing store (git URI or local path).
    pub source_uri: String,

    /// Directory holding the per-label working copies.
    pub workdir: PathBuf,

    /// Label served when a request carries none.
    pub default_label: String,

    /// File-name patterns tried in order, most specific first.
    ///
    /// `{application}` and `{profile}` are substituted from the request;
    /// patterns containing `{profile}` expand once per requested profile,
    /// in request order. Extensions are appended by the resolver.
    pub search_patterns: Vec<String>,

    /// How long a successful default-label fetch keeps the engine healthy.
    pub freshness_window: Duration,

    /// Cadence of the background upstream check per label.
    pub refresh_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source_uri: String::new(),
            workdir: std::env::temp_dir().join("confio"),
            default_label: "main".to_owned(),
            search_patterns: vec![
                "{application}-{profile}".to_owned(),
                "{application}".to_owned(),
                "application-{profile}".to_owned(),
                "application".to_owned(),
            ],
            freshness_window: Duration::from_secs(300),
            refresh_interval: Duration::from_secs(30),
        }
    }
}

impl Settings {
    pub fn new(source_uri: impl Into<String>) -> Self {
        Self {
            source_uri: source_uri.into(),
            ..Self::default()
        }
    }
}
