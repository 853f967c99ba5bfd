//! Bundle Synthesizer
//! ==================
//!
//! Renders the deployable service bundle into an ephemeral staging area:
//!
//! * `service_vars.json`: the resolved configuration as a flat typed
//!   document, with a `generated_by` provenance marker naming the originating
//!   model identifier. Every field can be overridden at external-load time by
//!   the same-named environment variable.
//! * the service entry artifact: the static template shipped with this
//!   crate, copied verbatim under the family's canonical service name.
//!
//! The staging area is a [`tempfile::TempDir`]: it is released when the
//! returned [`BundleDescriptor`] is dropped, success or not, so callers must
//! never assume it survives past the build operation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    config::{Dtype, Quantise, ResolvedConfig, Serialisation, ServicesConfig},
    logging::debug_mode,
    model::CachedModelRef,
    resolver::FamilyProfile,
};

/// Static service entry template, staged verbatim.
pub const SERVICE_TEMPLATE: &str = include_str!("../../assets/service.py");

/// File name of the generated configuration-variables artifact.
pub const SERVICE_VARS_FILE: &str = "service_vars.json";

/// Staging area or template rendering failed.
#[derive(Debug, Clone, Serialize, thiserror::Error)]
pub enum SynthesisError {
    #[error("failed to create staging area: {reason}")]
    Staging { reason: String },

    #[error("failed to render '{artifact}' into staging area: {reason}")]
    Render { artifact: String, reason: String },

    #[error("failed to encode service variables: {reason}")]
    Encode { reason: String },
}

/// The flat configuration document embedded in every bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceVars {
    /// Provenance marker; generated bundles must not be edited by hand.
    pub generated_by: String,
    pub model_id: String,
    pub model_name: String,
    pub quantize: Option<Quantise>,
    pub serialisation: Serialisation,
    pub dtype: Dtype,
    pub trust_remote_code: bool,
    pub max_model_len: Option<u32>,
    pub gpu_memory_utilization: f32,
    pub services_config: ServicesConfig,
}

impl ServiceVars {
    pub fn new(model_id: &str, config: &ResolvedConfig) -> Self {
        Self {
            generated_by: format!("llm-bundler build {model_id}. DO NOT EDIT"),
            model_id: model_id.to_string(),
            model_name: config.family.clone(),
            quantize: config.quantise,
            serialisation: config.serialisation,
            dtype: config.dtype,
            trust_remote_code: config.trust_remote_code,
            max_model_len: config.max_model_len,
            gpu_memory_utilization: config.gpu_memory_utilization,
            services_config: config.services_config(),
        }
    }
}

/// The synthesized staging layout. Owns the staging directory; dropping the
/// descriptor discards the staging area.
#[derive(Debug)]
pub struct BundleDescriptor {
    staging: tempfile::TempDir,
    pub vars_path: PathBuf,
    pub service_path: PathBuf,
    pub service_file_name: String,
    pub models: Vec<CachedModelRef>,
}

impl BundleDescriptor {
    pub fn dir(&self) -> &Path {
        self.staging.path()
    }

    /// Every staged file as sorted relative paths.
    pub fn files(&self) -> Result<Vec<String>, SynthesisError> {
        let dir = crate::fs::ValidDir::new(self.dir()).map_err(|e| SynthesisError::Staging {
            reason: e.to_string(),
        })?;
        dir.files().map_err(|e| SynthesisError::Staging {
            reason: e.to_string(),
        })
    }
}

/// Render the two bundle artifacts into a fresh staging area.
pub fn synthesize(
    model_id: &str,
    config: &ResolvedConfig,
    profile: &FamilyProfile,
    models: Vec<CachedModelRef>,
) -> Result<BundleDescriptor, SynthesisError> {
    let staging = tempfile::Builder::new()
        .prefix("llm_bundle_")
        .tempdir()
        .map_err(|e| SynthesisError::Staging {
            reason: e.to_string(),
        })?;

    let vars = ServiceVars::new(model_id, config);
    let rendered =
        serde_json::to_string_pretty(&vars).map_err(|e| SynthesisError::Encode {
            reason: e.to_string(),
        })?;

    // Inspectability only; the written content is exactly `rendered`.
    if debug_mode() {
        debug!("rendered {SERVICE_VARS_FILE} (dir={}):\n{rendered}", staging.path().display());
    }

    let vars_path = staging.path().join(SERVICE_VARS_FILE);
    std::fs::write(&vars_path, &rendered).map_err(|e| SynthesisError::Render {
        artifact: SERVICE_VARS_FILE.to_string(),
        reason: e.to_string(),
    })?;

    let service_path = staging.path().join(profile.service_name);
    std::fs::write(&service_path, SERVICE_TEMPLATE).map_err(|e| SynthesisError::Render {
        artifact: profile.service_name.to_string(),
        reason: e.to_string(),
    })?;

    Ok(BundleDescriptor {
        staging,
        vars_path,
        service_path,
        service_file_name: profile.service_name.to_string(),
        models,
    })
}
