//! The persisted package manifest: everything the external runtime needs to
//! rebuild and serve the bundle, assembled once per build and written as the
//! store's commit point.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{model::CachedModelRef, resolver::FamilyProfile};

/// Packages every generated service needs, before family- and caller-specific
/// additions.
pub const BASE_RUNTIME_PACKAGES: &[&str] = &["scipy", "bentoml[tracing]>=1.2.8", "vllm>=0.3"];

/// Build artifacts never copied into a package.
pub const EXCLUDE_PATTERNS: &[&str] = &["/venv", "/.venv", "__pycache__/", "*.py[cod]", "*$py.class"];

/// Python version the runtime image is pinned to.
pub const RUNTIME_PYTHON_VERSION: &str = "3.11";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentEntry {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeOptions {
    pub python_version: String,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            python_version: RUNTIME_PYTHON_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageManifest {
    /// Service entry reference, `<service file>:<class>`.
    pub service: String,
    pub name: String,
    pub version: String,
    pub labels: BTreeMap<String, String>,
    pub models: Vec<CachedModelRef>,
    pub envs: Vec<EnvironmentEntry>,
    pub description: String,
    /// Relative paths of every staged file.
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub packages: Vec<String>,
    pub runtime: RuntimeOptions,
}

/// Base packages + family-mandated requirements + caller extras, deduplicated
/// while preserving first-seen order.
pub fn runtime_packages(profile: &FamilyProfile, extras: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for pkg in BASE_RUNTIME_PACKAGES
        .iter()
        .map(|p| p.to_string())
        .chain(profile.requirements.iter().map(|p| p.to_string()))
        .chain(extras.iter().cloned())
    {
        if !out.contains(&pkg) {
            out.push(pkg);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::family_profile;

    #[test]
    fn packages_merge_and_dedupe_in_order() {
        let profile = family_profile("chatglm").unwrap();
        let extras = vec!["cpm-kernels".to_string(), "sentencepiece".to_string()];
        let packages = runtime_packages(profile, &extras);

        assert_eq!(
            packages,
            vec![
                "scipy",
                "bentoml[tracing]>=1.2.8",
                "vllm>=0.3",
                "cpm-kernels",
                "sentencepiece",
            ]
        );
    }

    #[test]
    fn base_packages_only_for_plain_families() {
        let profile = family_profile("llama").unwrap();
        assert_eq!(runtime_packages(profile, &[]).len(), BASE_RUNTIME_PACKAGES.len());
    }
}
