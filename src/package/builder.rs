//! Package Descriptor Builder
//! ==========================
//!
//! Decides what to do about an existing record first, then assembles and
//! persists the manifest:
//!
//! * absent → build, outcome `ADDED`;
//! * present + `overwrite` → delete, rebuild, outcome `OVERWRITE`;
//! * present otherwise → outcome `EXISTS`, the existing record is returned
//!   untouched and nothing is persisted.
//!
//! Any failure while assembling or persisting the manifest is logged with its
//! full cause and re-raised as a single [`BuildError`] wrapping the original;
//! callers never see raw store errors.

use std::collections::BTreeMap;

use bon::Builder;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::{
    bundle::{self, BundleDescriptor},
    config::{env, ResolvedConfig},
    error::{LlmBundlerError, LlmBundlerResult},
    model::CachedModelRef,
    package::{
        manifest::{
            runtime_packages, EnvironmentEntry, PackageManifest, RuntimeOptions, EXCLUDE_PATTERNS,
        },
        store::{PackageRecord, PackageStore},
        tag::PackageTag,
    },
    resolver::FamilyProfile,
};

/// Existence state of the target record, reported alongside the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageState {
    NotFound,
    Added,
    Exists,
    Overwrite,
}

impl std::fmt::Display for PackageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PackageState::NotFound => "NOT_FOUND",
            PackageState::Added => "ADDED",
            PackageState::Exists => "EXISTS",
            PackageState::Overwrite => "OVERWRITE",
        };
        f.write_str(s)
    }
}

/// Wraps whatever went wrong during manifest assembly or persistence. The
/// original cause is preserved for diagnostics but not shown raw to the end
/// user.
#[derive(Debug, thiserror::Error, Serialize)]
#[error("failed to build service package: could not {context}")]
pub struct BuildError {
    pub context: String,
    #[source]
    #[serde(serialize_with = "crate::error::std_io_error_to_string")]
    source: Box<dyn std::error::Error + Send + Sync>,
}

impl BuildError {
    pub(crate) fn wrap(
        context: impl Into<String>,
        err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            context: context.into(),
            source: err.into(),
        }
    }
}

#[derive(Debug)]
pub struct BuildOutcome {
    pub state: PackageState,
    pub record: PackageRecord,
}

/// One package build, existence check through persistence.
///
/// The existence-check-then-act sequence is logically atomic from this tool's
/// perspective only: two concurrent invocations targeting the same tag may
/// both observe `NOT_FOUND` and both persist, with the store's last-writer-
/// wins behavior governing which record survives.
#[derive(Builder)]
pub struct PackageBuild<'a> {
    pub store: &'a dyn PackageStore,
    pub tag: PackageTag,
    #[builder(default)]
    pub overwrite: bool,
    pub model_id: &'a str,
    pub config: &'a ResolvedConfig,
    pub profile: &'static FamilyProfile,
    #[builder(default)]
    pub models: Vec<CachedModelRef>,
    #[builder(default)]
    pub extra_packages: Vec<String>,
}

impl PackageBuild<'_> {
    pub fn run(self) -> LlmBundlerResult<BuildOutcome> {
        let state = match self.store.get(&self.tag) {
            Ok(Some(existing)) => {
                if self.overwrite {
                    if let Err(e) = self.store.delete(&self.tag) {
                        return Err(self.fail("delete the existing package record", e));
                    }
                    debug!("rebuilding existing package {}", self.tag);
                    PackageState::Overwrite
                } else {
                    debug!("package {} already exists, skipping build", self.tag);
                    return Ok(BuildOutcome {
                        state: PackageState::Exists,
                        record: existing,
                    });
                }
            }
            Ok(None) => PackageState::Added,
            Err(e) => return Err(self.fail("query the package store", e)),
        };

        let bundle = bundle::synthesize(
            self.model_id,
            self.config,
            self.profile,
            self.models.clone(),
        )?;

        let manifest = self.assemble_manifest(&bundle)?;
        let record = match self.store.put(&manifest, bundle.dir()) {
            Ok(record) => record,
            Err(e) => return Err(self.fail("persist the package record", e)),
        };

        Ok(BuildOutcome { state, record })
    }

    fn assemble_manifest(&self, bundle: &BundleDescriptor) -> LlmBundlerResult<PackageManifest> {
        let include = bundle
            .files()
            .map_err(|e| self.fail("list the staged bundle files", e.into()))?;
        let config_json = self
            .config
            .to_json()
            .map_err(|e| self.fail("serialize the resolved config", e))?;

        Ok(PackageManifest {
            service: format!("{}:LLMService", bundle.service_file_name),
            name: self.tag.name().to_string(),
            version: self.tag.version().to_string(),
            labels: BTreeMap::from([(
                "library".to_string(),
                self.config.family.clone(),
            )]),
            models: bundle.models.clone(),
            envs: vec![
                EnvironmentEntry {
                    name: env::LLM_CONFIG_ENV.to_string(),
                    value: config_json,
                },
                EnvironmentEntry {
                    name: env::NVIDIA_DRIVER_CAPABILITIES_ENV.to_string(),
                    value: "compute,utility".to_string(),
                },
            ],
            description: format!("LLM service for {}", self.profile.start_name),
            include,
            exclude: EXCLUDE_PATTERNS.iter().map(|p| p.to_string()).collect(),
            packages: runtime_packages(self.profile, &self.extra_packages),
            runtime: RuntimeOptions::default(),
        })
    }

    fn fail(&self, context: &str, err: LlmBundlerError) -> LlmBundlerError {
        error!(cause = %err, "package build for {} failed while trying to {context}", self.tag);
        BuildError::wrap(context, err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Dtype, ResourceSpec, Serialisation},
        fs::BundlerHome,
        package::store::LocalPackageStore,
        resolver::family_profile,
    };

    fn config() -> ResolvedConfig {
        ResolvedConfig {
            family: "llama".to_string(),
            quantise: None,
            dtype: Dtype::Auto,
            serialisation: Serialisation::Safetensors,
            max_model_len: None,
            gpu_memory_utilization: 0.9,
            trust_remote_code: false,
            resources: ResourceSpec::Cpu,
            timeout_secs: 360_000,
        }
    }

    fn build(
        store: &LocalPackageStore,
        tag: &str,
        overwrite: bool,
    ) -> LlmBundlerResult<BuildOutcome> {
        let cfg = config();
        PackageBuild::builder()
            .store(store)
            .tag(PackageTag::from_taglike(tag)?)
            .overwrite(overwrite)
            .model_id("meta/llama-model")
            .config(&cfg)
            .profile(family_profile("llama").unwrap())
            .build()
            .run()
    }

    #[test]
    fn added_exists_overwrite_sequence() -> LlmBundlerResult<()> {
        let tmp = tempfile::tempdir().unwrap();
        let home = BundlerHome::at(tmp.path())?;
        let store = LocalPackageStore::open(&home)?;

        let first = build(&store, "llama-service:v1", false)?;
        assert_eq!(first.state, PackageState::Added);

        let second = build(&store, "llama-service:v1", false)?;
        assert_eq!(second.state, PackageState::Exists);
        assert_eq!(second.record.manifest, first.record.manifest);

        let third = build(&store, "llama-service:v1", true)?;
        assert_eq!(third.state, PackageState::Overwrite);

        let fetched = store.get(&PackageTag::from_taglike("llama-service:v1")?)?;
        assert!(fetched.is_some());
        Ok(())
    }

    #[test]
    fn manifest_carries_labels_envs_and_packages() -> LlmBundlerResult<()> {
        let tmp = tempfile::tempdir().unwrap();
        let home = BundlerHome::at(tmp.path())?;
        let store = LocalPackageStore::open(&home)?;

        let outcome = build(&store, "llama-service:v1", false)?;
        let manifest = &outcome.record.manifest;

        assert_eq!(manifest.service, "llama_service.py:LLMService");
        assert_eq!(manifest.labels.get("library").map(String::as_str), Some("llama"));
        assert!(manifest
            .envs
            .iter()
            .any(|e| e.name == env::LLM_CONFIG_ENV && e.value.contains("\"family\":\"llama\"")));
        assert!(manifest
            .envs
            .iter()
            .any(|e| e.name == env::NVIDIA_DRIVER_CAPABILITIES_ENV && e.value == "compute,utility"));
        assert_eq!(
            manifest.include,
            vec!["llama_service.py", "service_vars.json"]
        );
        assert!(manifest.packages.iter().any(|p| p.starts_with("vllm")));
        Ok(())
    }

    #[test]
    fn exists_outcome_mutates_nothing() -> LlmBundlerResult<()> {
        let tmp = tempfile::tempdir().unwrap();
        let home = BundlerHome::at(tmp.path())?;
        let store = LocalPackageStore::open(&home)?;

        let first = build(&store, "llama-service:v1", false)?;
        let manifest_path = first.record.path.join("manifest.json");
        let before = std::fs::read_to_string(&manifest_path).unwrap();

        build(&store, "llama-service:v1", false)?;
        let after = std::fs::read_to_string(&manifest_path).unwrap();
        assert_eq!(before, after);
        Ok(())
    }
}
