//! Explicit routing table for the one logical operation the engine exposes.
//!
//! Paths of the shape `/{application}/{profile}[/{label}]` translate to a
//! [`ConfigRequest`]; anything else is an invalid request. The profile
//! segment may list several profiles comma-separated, most specific first.
//! A label containing `/` (e.g. `feature/x`) is written `feature(_)x` in the
//! path, since the label occupies a single segment.

use crate::error::ConfigError;
use crate::model::ConfigRequest;

/// Encoded form of `/` inside a label path segment.
const LABEL_SLASH: &str = "(_)";

pub fn parse_path(path: &str) -> Result<ConfigRequest, ConfigError> {
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(ConfigError::invalid_request(format!(
            "empty segment in path `{path}`"
        )));
    }

    let (application, profile_segment, label) = match segments.as_slice() {
        [app, profiles] => (*app, *profiles, None),
        [app, profiles, label] => (*app, *profiles, Some(*label)),
        _ => {
            return Err(ConfigError::invalid_request(format!(
                "expected /{{application}}/{{profile}}[/{{label}}], got `{path}`"
            )));
        }
    };

    let profiles: Vec<String> = profile_segment
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_owned)
        .collect();
    if profiles.is_empty() {
        return Err(ConfigError::invalid_request(format!(
            "no profiles in path `{path}`"
        )));
    }

    let mut request = ConfigRequest::new(application, profiles);
    if let Some(label) = label {
        request = request.with_label(label.replace(LABEL_SLASH, "/"));
    }
    Ok(request)
}
