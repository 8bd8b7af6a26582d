//! Per-format parsing of raw configuration files into property sources.
//!
//! All values are kept as strings; type coercion is the client's business.
//! Nested structures flatten to dotted keys, sequence elements to `key[i]`,
//! matching the conventional flattened-properties view of a config document.

use crate::error::ConfigError;
use crate::model::{FileFormat, PropertySource, RawFile};

/// Parses one fetched file. The origin recorded on the resulting source is
/// `name@label`, which is stable across refetches of the same revision.
pub fn parse_file(file: &RawFile) -> Result<PropertySource, ConfigError> {
    let origin = format!("{}@{}", file.name, file.label);
    let text = std::str::from_utf8(&file.content)
        .map_err(|e| ConfigError::parse(&origin, format!("not valid UTF-8: {e}")))?;

    let entries = match file.format {
        FileFormat::Properties => parse_properties(text),
        FileFormat::Yaml => parse_yaml(&origin, text)?,
        FileFormat::Json => parse_json(&origin, text)?,
    };

    Ok(PropertySource { origin, entries })
}

/// Line-oriented `.properties` parser: `#`/`!` comments, `=` or `:`
/// separators, trailing-backslash line continuations. A line with no
/// separator is a key with an empty value.
fn parse_properties(text: &str) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
            continue;
        }

        let mut logical = trimmed.to_owned();
        while logical.ends_with('\\') {
            logical.pop();
            match lines.next() {
                Some(cont) => logical.push_str(cont.trim_start()),
                None => break,
            }
        }

        let split_at = logical
            .char_indices()
            .find(|&(_, c)| c == '=' || c == ':')
            .map(|(i, _)| i);
        let (key, value) = match split_at {
            Some(i) => (logical[..i].trim_end(), logical[i + 1..].trim_start()),
            None => (logical.as_str(), ""),
        };
        if !key.is_empty() {
            entries.push((key.to_owned(), value.to_owned()));
        }
    }

    entries
}

fn parse_yaml(origin: &str, text: &str) -> Result<Vec<(String, String)>, ConfigError> {
    let value: serde_yaml::Value =
        serde_yaml::from_str(text).map_err(|e| ConfigError::parse(origin, e.to_string()))?;

    let mut entries = Vec::new();
    match value {
        serde_yaml::Value::Null => {}
        serde_yaml::Value::Mapping(_) => flatten_yaml("", &value, &mut entries),
        other => {
            return Err(ConfigError::parse(
                origin,
                format!("top-level value must be a mapping, got {}", yaml_kind(&other)),
            ));
        }
    }
    Ok(entries)
}

fn parse_json(origin: &str, text: &str) -> Result<Vec<(String, String)>, ConfigError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ConfigError::parse(origin, e.to_string()))?;

    let mut entries = Vec::new();
    match &value {
        serde_json::Value::Object(_) => flatten_json("", &value, &mut entries),
        other => {
            return Err(ConfigError::parse(
                origin,
                format!("top-level value must be an object, got {}", json_kind(other)),
            ));
        }
    }
    Ok(entries)
}

fn flatten_yaml(prefix: &str, value: &serde_yaml::Value, out: &mut Vec<(String, String)>) {
    use serde_yaml::Value;
    match value {
        Value::Mapping(map) => {
            for (k, v) in map {
                let key = yaml_scalar(k);
                let path = join_key(prefix, &key);
                flatten_yaml(&path, v, out);
            }
        }
        Value::Sequence(seq) => {
            for (i, v) in seq.iter().enumerate() {
                flatten_yaml(&format!("{prefix}[{i}]"), v, out);
            }
        }
        Value::Tagged(tagged) => flatten_yaml(prefix, &tagged.value, out),
        scalar => out.push((prefix.to_owned(), yaml_scalar(scalar))),
    }
}

fn flatten_json(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
    use serde_json::Value;
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let path = join_key(prefix, k);
                flatten_json(&path, v, out);
            }
        }
        Value::Array(arr) => {
            for (i, v) in arr.iter().enumerate() {
                flatten_json(&format!("{prefix}[{i}]"), v, out);
            }
        }
        Value::String(s) => out.push((prefix.to_owned(), s.clone())),
        Value::Null => out.push((prefix.to_owned(), String::new())),
        other => out.push((prefix.to_owned(), other.to_string())),
    }
}

fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_owned()
    } else {
        format!("{prefix}.{key}")
    }
}

fn yaml_scalar(value: &serde_yaml::Value) -> String {
    use serde_yaml::Value;
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        // Non-scalar mapping keys are rare; fall back to their YAML rendering.
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_owned())
            .unwrap_or_default(),
    }
}

fn yaml_kind(value: &serde_yaml::Value) -> &'static str {
    use serde_yaml::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
