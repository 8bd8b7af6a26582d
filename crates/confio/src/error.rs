/// Error taxonomy for the engine.
///
/// Every failure a lookup can surface is represented here so the embedding
/// layer (HTTP or CLI) can map variants to exit codes / status codes without
/// string matching. Variants carry owned reasons rather than wrapped source
/// errors so the type stays `Clone`: coalesced waiters on a shared resolution
/// all receive the same failure value.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("no configuration found for application `{application}`")]
    ApplicationNotFound { application: String },

    #[error("label `{label}` does not exist in the backing store")]
    LabelNotFound { label: String },

    #[error("configuration source unavailable: {reason}")]
    SourceUnavailable { reason: String },

    #[error("failed to parse `{origin}`: {reason}")]
    Parse { origin: String, reason: String },

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl ConfigError {
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    pub fn application_not_found(application: impl Into<String>) -> Self {
        Self::ApplicationNotFound {
            application: application.into(),
        }
    }

    pub fn label_not_found(label: impl Into<String>) -> Self {
        Self::LabelNotFound {
            label: label.into(),
        }
    }

    pub fn source_unavailable(reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            reason: reason.into(),
        }
    }

    pub fn parse(origin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            origin: origin.into(),
            reason: reason.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Transient failures the caller may retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable { .. } | Self::Internal { .. }
        )
    }

    /// Failures that map to a not-found response (404) rather than a fault.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ApplicationNotFound { .. } | Self::LabelNotFound { .. }
        )
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        Self::SourceUnavailable {
            reason: err.to_string(),
        }
    }
}
