//! Launch Orchestrator
//! ===================
//!
//! The immediate-run path: mirror every field of the resolved configuration
//! into process-wide environment variables (the same fixed names the
//! generated artifacts are re-configured with), then hand control to an
//! external server loader with the staging directory as working context.
//!
//! This is one-shot and non-retrying: if the loader fails, the failure
//! propagates directly and the exit status is the caller's to report.

use std::{path::Path, process::ExitStatus};

use bon::Builder;
use tracing::info;

use crate::{
    bundle::BundleDescriptor,
    config::{env, ResolvedConfig},
    error::{LlmBundlerError, LlmBundlerResult},
    logging::{debug_mode, quiet_mode},
};

/// Program the bundled loader spawns when none is configured.
pub const DEFAULT_LOADER_PROGRAM: &str = "bentoml";

/// The external server-start seam. Implementations receive the staging
/// directory holding the synthesized bundle and block until the server
/// process exits.
pub trait ServerLoader {
    fn serve(&self, working_dir: &Path) -> LlmBundlerResult<ExitStatus>;
}

/// Spawns the external serving runtime as a child process, inheriting the
/// exported environment.
#[derive(Debug, Clone, Builder)]
#[builder(derive(Debug, Clone), on(String, into))]
pub struct ProcessLoader {
    #[builder(default = DEFAULT_LOADER_PROGRAM.to_string())]
    pub program: String,
    #[builder(default = vec!["serve".to_string(), ".".to_string()])]
    pub args: Vec<String>,
}

impl Default for ProcessLoader {
    fn default() -> Self {
        ProcessLoader::builder().build()
    }
}

impl ServerLoader for ProcessLoader {
    fn serve(&self, working_dir: &Path) -> LlmBundlerResult<ExitStatus> {
        info!(
            "starting server: {} {} (dir={})",
            self.program,
            self.args.join(" "),
            working_dir.display()
        );
        std::process::Command::new(&self.program)
            .args(&self.args)
            .current_dir(working_dir)
            .status()
            .map_err(|e| {
                LlmBundlerError::ServerLaunch(format!(
                    "could not spawn `{}`: {e}",
                    self.program
                ))
            })
    }
}

/// The full environment mirror of one resolved configuration, as name/value
/// pairs in a fixed order. Optional fields (`MAX_MODEL_LEN`, `QUANTIZE`) are
/// present only when set.
pub fn environment_mirror(
    model_id: &str,
    config: &ResolvedConfig,
) -> LlmBundlerResult<Vec<(String, String)>> {
    let services_config = serde_json::to_string(&config.services_config()).map_err(|e| {
        LlmBundlerError::InvalidConfig {
            field: "services config",
            reason: e.to_string(),
        }
    })?;

    let mut vars = vec![
        (env::QUIET_ENV_VAR.to_string(), quiet_mode().to_string()),
        (env::DEBUG_ENV_VAR.to_string(), debug_mode().to_string()),
        (env::MODEL_ID_ENV.to_string(), model_id.to_string()),
        (env::MODEL_NAME_ENV.to_string(), config.family.clone()),
        (
            env::SERIALIZATION_ENV.to_string(),
            config.serialisation.to_string(),
        ),
        (env::LLM_CONFIG_ENV.to_string(), config.to_json()?),
        (env::DTYPE_ENV.to_string(), config.dtype.to_string()),
        (
            env::TRUST_REMOTE_CODE_ENV.to_string(),
            config.trust_remote_code.to_string(),
        ),
        (
            env::GPU_MEMORY_UTILIZATION_ENV.to_string(),
            // JSON-encoded so the loader parses it the same way as the
            // generated artifact field.
            config.gpu_memory_utilization.to_string(),
        ),
        (env::SERVICES_CONFIG_ENV.to_string(), services_config),
    ];
    if let Some(max_model_len) = config.max_model_len {
        vars.push((env::MAX_MODEL_LEN_ENV.to_string(), max_model_len.to_string()));
    }
    if let Some(quantise) = config.quantise {
        vars.push((env::QUANTIZE_ENV.to_string(), quantise.to_string()));
    }
    Ok(vars)
}

/// Export the environment mirror process-wide, then delegate to the loader.
pub fn launch(
    model_id: &str,
    config: &ResolvedConfig,
    bundle: &BundleDescriptor,
    loader: &dyn ServerLoader,
) -> LlmBundlerResult<ExitStatus> {
    for (name, value) in environment_mirror(model_id, config)? {
        std::env::set_var(name, value);
    }
    loader.serve(bundle.dir())
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;
    use crate::config::{Dtype, Quantise, ResourceSpec, Serialisation};

    fn config() -> ResolvedConfig {
        ResolvedConfig {
            family: "mistral".to_string(),
            quantise: Some(Quantise::Awq),
            dtype: Dtype::Float16,
            serialisation: Serialisation::Safetensors,
            max_model_len: Some(8192),
            gpu_memory_utilization: 0.85,
            trust_remote_code: true,
            resources: ResourceSpec::Gpu(2),
            timeout_secs: 600,
        }
    }

    #[test]
    #[serial]
    fn mirror_contains_every_fixed_name() {
        let vars = environment_mirror("mistralai/mistral-7b", &config()).unwrap();
        let get = |name: &str| {
            vars.iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
        };

        assert_eq!(get(env::MODEL_ID_ENV).as_deref(), Some("mistralai/mistral-7b"));
        assert_eq!(get(env::MODEL_NAME_ENV).as_deref(), Some("mistral"));
        assert_eq!(get(env::SERIALIZATION_ENV).as_deref(), Some("safetensors"));
        assert_eq!(get(env::DTYPE_ENV).as_deref(), Some("float16"));
        assert_eq!(get(env::TRUST_REMOTE_CODE_ENV).as_deref(), Some("true"));
        assert_eq!(get(env::GPU_MEMORY_UTILIZATION_ENV).as_deref(), Some("0.85"));
        assert_eq!(get(env::MAX_MODEL_LEN_ENV).as_deref(), Some("8192"));
        assert_eq!(get(env::QUANTIZE_ENV).as_deref(), Some("awq"));

        let services: serde_json::Value =
            serde_json::from_str(&get(env::SERVICES_CONFIG_ENV).unwrap()).unwrap();
        assert_eq!(
            services,
            serde_json::json!({"resources": {"gpu": 2}, "traffic": {"timeout": 600}})
        );

        let llm_config: serde_json::Value =
            serde_json::from_str(&get(env::LLM_CONFIG_ENV).unwrap()).unwrap();
        assert_eq!(llm_config["family"], "mistral");
    }

    #[test]
    #[serial]
    fn optional_fields_absent_when_unset() {
        let mut cfg = config();
        cfg.max_model_len = None;
        cfg.quantise = None;
        let vars = environment_mirror("mistralai/mistral-7b", &cfg).unwrap();
        assert!(!vars.iter().any(|(n, _)| n == env::MAX_MODEL_LEN_ENV));
        assert!(!vars.iter().any(|(n, _)| n == env::QUANTIZE_ENV));
    }
}
