//! Package tags (`name:version`) and model-id normalisation.

use serde::{Deserialize, Serialize};

use crate::error::{LlmBundlerError, LlmBundlerResult};

/// A validated `name:version` pair addressing a record in the package store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageTag {
    name: String,
    version: String,
}

impl PackageTag {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> LlmBundlerResult<Self> {
        let name = name.into();
        let version = version.into();
        validate_component("package name", &name)?;
        validate_component("package version", &version)?;
        Ok(Self { name, version })
    }

    /// Parse `name[:version]`; a missing version means `latest`.
    pub fn from_taglike(taglike: &str) -> LlmBundlerResult<Self> {
        match taglike.split_once(':') {
            Some((name, version)) => Self::new(name, version),
            None => Self::new(taglike, "latest"),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl std::fmt::Display for PackageTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

impl TryFrom<&str> for PackageTag {
    type Error = LlmBundlerError;
    fn try_from(value: &str) -> LlmBundlerResult<Self> {
        Self::from_taglike(value)
    }
}

// lowercase alphanumeric plus `.`, `_`, `-`; must start alphanumeric
fn validate_component(field: &'static str, value: &str) -> LlmBundlerResult<()> {
    let starts_ok = value
        .chars()
        .next()
        .map_or(false, |c| c.is_ascii_lowercase() || c.is_ascii_digit());
    let chars_ok = value.chars().all(|c| {
        c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-')
    });
    if !starts_ok || !chars_ok {
        return Err(LlmBundlerError::InvalidConfig {
            field,
            reason: format!(
                "`{value}` must be lowercase alphanumeric (plus `.`, `_`, `-`) and start with a letter or digit"
            ),
        });
    }
    Ok(())
}

/// Canonical package-name form of a model identifier.
///
/// Local paths reduce to their final component; repo ids keep the
/// `owner--model` shape with `/` mapped to `--`, `_` to `-`, and anything
/// else non-alphanumeric squeezed to `-`.
pub fn normalise_model_name(model_id: &str) -> String {
    let base = if std::path::Path::new(model_id).is_dir() {
        std::path::Path::new(model_id)
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| model_id.to_string())
    } else {
        model_id.replace('/', "--")
    };

    let mut out = String::with_capacity(base.len());
    for c in base.to_lowercase().chars() {
        match c {
            'a'..='z' | '0'..='9' | '.' | '-' => out.push(c),
            '_' => out.push('-'),
            _ => out.push('-'),
        }
    }
    // tag components must start and end alphanumeric
    let out = out
        .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string();
    debug_assert!(sanitize_filename::is_sanitized(&out));
    out
}
