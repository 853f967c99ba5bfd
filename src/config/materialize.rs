//! Config Materializer
//! ===================
//!
//! Produces the fully-populated [`ResolvedConfig`] for one invocation by
//! layering, per field and independently of every other field:
//!
//! 1. the explicit override (CLI flag),
//! 2. the environment variable,
//! 3. the family default.
//!
//! Numeric fields are validated here, before any artifact is written: a
//! supplied max sequence length must be positive, and the GPU memory
//! utilization fraction must lie in (0, 1]. A missing serialisation format
//! is not an error: it falls back to the family default and the fallback is
//! reported back to the caller as a warning.

use bon::Builder;
use serde::Serialize;
use tracing::warn;

use crate::{
    config::{env, Dtype, Quantise, ResolvedConfig, ResourceSpec, Serialisation},
    resolver::FamilyProfile,
};

pub const DEFAULT_GPU_MEMORY_UTILIZATION: f32 = 0.9;
pub const DEFAULT_TIMEOUT_SECS: u64 = 360_000;

/// A malformed numeric or enum override; names the offending field.
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

/// Non-fatal diagnostics recorded while materializing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MaterializeWarning {
    /// No serialisation format was supplied; the family default was used.
    /// The model may not actually ship in this format.
    SerialisationFallback { fallback: Serialisation },
}

impl std::fmt::Display for MaterializeWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaterializeWarning::SerialisationFallback { fallback } => write!(
                f,
                "Serialisation format is not specified. Defaulting to '{fallback}'. Your model \
                 might not work with this format; pass an explicit serialisation format to be sure."
            ),
        }
    }
}

/// Explicit, highest-priority override values. Every field is optional;
/// `None` means "consult the environment, then the family default".
#[derive(Debug, Clone, Default, Builder)]
#[builder(derive(Debug, Clone))]
pub struct ConfigOverrides {
    pub quantise: Option<Quantise>,
    pub dtype: Option<Dtype>,
    pub serialisation: Option<Serialisation>,
    pub max_model_len: Option<i64>,
    pub gpu_memory_utilization: Option<f32>,
    /// Explicit device list; the single value `all` expands to every device
    /// named by `CUDA_VISIBLE_DEVICES`.
    pub devices: Option<Vec<String>>,
    pub timeout_secs: Option<u64>,
}

/// A resolved configuration together with the warnings produced on the way.
#[derive(Debug, Clone)]
pub struct Materialized {
    pub config: ResolvedConfig,
    pub warnings: Vec<MaterializeWarning>,
}

/// Layer overrides, environment, and family defaults into a [`ResolvedConfig`].
pub fn materialize(
    profile: &FamilyProfile,
    overrides: &ConfigOverrides,
) -> Result<Materialized, ValidationError> {
    let mut warnings = Vec::new();

    let quantise = match &overrides.quantise {
        Some(q) => Some(*q),
        None => parse_env_field(env::QUANTIZE_ENV, &[], "quantize")?,
    };

    let dtype = match &overrides.dtype {
        Some(d) => *d,
        None => parse_env_field(env::DTYPE_ENV, &[], "dtype")?.unwrap_or_default(),
    };

    let serialisation = match &overrides.serialisation {
        Some(s) => *s,
        None => {
            match parse_env_field(
                env::SERIALIZATION_ENV,
                env::SERIALIZATION_ENV_ALIASES,
                "serialisation",
            )? {
                Some(s) => s,
                None => {
                    let fallback = profile.serialisation;
                    let warning = MaterializeWarning::SerialisationFallback { fallback };
                    warn!("{warning}");
                    warnings.push(warning);
                    fallback
                }
            }
        }
    };

    let max_model_len = {
        let raw = match overrides.max_model_len {
            Some(n) => Some(n),
            None => match env::var(env::MAX_MODEL_LEN_ENV) {
                Some(s) => Some(s.trim().parse::<i64>().map_err(|_| ValidationError {
                    field: "max_model_len",
                    reason: format!("`{s}` is not an integer"),
                })?),
                None => None,
            },
        };
        match raw {
            Some(n) if n > 0 => Some(n as u32),
            Some(n) => {
                return Err(ValidationError {
                    field: "max_model_len",
                    reason: format!("must be a positive integer, got {n}"),
                });
            }
            None => None,
        }
    };

    let gpu_memory_utilization = {
        let raw = match overrides.gpu_memory_utilization {
            Some(f) => f,
            None => match env::var_with_aliases(
                env::GPU_MEMORY_UTILIZATION_ENV,
                env::GPU_MEMORY_UTILIZATION_ENV_ALIASES,
            ) {
                Some(s) => s.trim().parse::<f32>().map_err(|_| ValidationError {
                    field: "gpu_memory_utilization",
                    reason: format!("`{s}` is not a number"),
                })?,
                None => DEFAULT_GPU_MEMORY_UTILIZATION,
            },
        };
        if raw.is_nan() || raw <= 0.0 || raw > 1.0 {
            return Err(ValidationError {
                field: "gpu_memory_utilization",
                reason: format!("must lie in (0, 1], got {raw}"),
            });
        }
        raw
    };

    let trust_remote_code = env::check_bool_env(env::TRUST_REMOTE_CODE_ENV, false);

    let resources = resolve_devices(overrides.devices.as_deref())?;

    let timeout_secs = overrides.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);

    Ok(Materialized {
        config: ResolvedConfig {
            family: profile.family.to_string(),
            quantise,
            dtype,
            serialisation,
            max_model_len,
            gpu_memory_utilization,
            trust_remote_code,
            resources,
            timeout_secs,
        },
        warnings,
    })
}

fn parse_env_field<T: std::str::FromStr<Err = String>>(
    primary: &str,
    aliases: &[&str],
    field: &'static str,
) -> Result<Option<T>, ValidationError> {
    match env::var_with_aliases(primary, aliases) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|reason| ValidationError { field, reason }),
        None => Ok(None),
    }
}

/// Explicit device list > `CUDA_VISIBLE_DEVICES` > CPU.
///
/// `all` asks for every visible device and therefore requires
/// `CUDA_VISIBLE_DEVICES` to name them.
fn resolve_devices(devices: Option<&[String]>) -> Result<ResourceSpec, ValidationError> {
    let visible = || -> Option<Vec<String>> {
        env::var(env::CUDA_VISIBLE_DEVICES_ENV).map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
    };

    let list = match devices {
        Some([only]) if only == "all" => visible().ok_or_else(|| ValidationError {
            field: "device",
            reason: format!(
                "`all` requires {} to name the visible devices",
                env::CUDA_VISIBLE_DEVICES_ENV
            ),
        })?,
        Some(explicit) => explicit.to_vec(),
        None => visible().unwrap_or_default(),
    };

    if list.is_empty() {
        Ok(ResourceSpec::Cpu)
    } else {
        Ok(ResourceSpec::Gpu(list.len()))
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;
    use crate::resolver::family_profile;

    fn clear_env() {
        for name in [
            env::QUANTIZE_ENV,
            env::DTYPE_ENV,
            env::SERIALIZATION_ENV,
            "SERIALISATION",
            env::MAX_MODEL_LEN_ENV,
            env::GPU_MEMORY_UTILIZATION_ENV,
            "GPU_MEMORY_UTILISATION",
            env::TRUST_REMOTE_CODE_ENV,
            env::CUDA_VISIBLE_DEVICES_ENV,
        ] {
            std::env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn defaults_with_fallback_warning() {
        clear_env();
        let profile = family_profile("flan_t5").unwrap();
        let materialized = materialize(profile, &ConfigOverrides::default()).unwrap();

        assert_eq!(
            materialized.config.serialisation,
            Serialisation::Safetensors
        );
        assert_eq!(
            materialized.warnings,
            vec![MaterializeWarning::SerialisationFallback {
                fallback: Serialisation::Safetensors
            }]
        );
        assert_eq!(materialized.config.dtype, Dtype::Auto);
        assert_eq!(materialized.config.quantise, None);
        assert_eq!(materialized.config.resources, ResourceSpec::Cpu);
        assert_eq!(materialized.config.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    #[serial]
    fn override_beats_environment_beats_default_per_field() {
        clear_env();
        // dtype: override wins over env; quantise: env applies (no override);
        // serialisation: explicit override, so no fallback warning.
        std::env::set_var(env::DTYPE_ENV, "float32");
        std::env::set_var(env::QUANTIZE_ENV, "awq");

        let profile = family_profile("llama").unwrap();
        let overrides = ConfigOverrides::builder()
            .dtype(Dtype::Bfloat16)
            .serialisation(Serialisation::Legacy)
            .build();
        let materialized = materialize(profile, &overrides).unwrap();

        assert_eq!(materialized.config.dtype, Dtype::Bfloat16);
        assert_eq!(materialized.config.quantise, Some(Quantise::Awq));
        assert_eq!(materialized.config.serialisation, Serialisation::Legacy);
        assert!(materialized.warnings.is_empty());
        clear_env();
    }

    #[test]
    #[serial]
    fn serialisation_env_alias_counts_as_specified() {
        clear_env();
        std::env::set_var("SERIALISATION", "legacy");
        let profile = family_profile("llama").unwrap();
        let materialized = materialize(profile, &ConfigOverrides::default()).unwrap();
        assert_eq!(materialized.config.serialisation, Serialisation::Legacy);
        assert!(materialized.warnings.is_empty());
        clear_env();
    }

    #[test]
    #[serial]
    fn max_model_len_bounds() {
        clear_env();
        let profile = family_profile("llama").unwrap();

        for bad in [-1i64, 0] {
            let overrides = ConfigOverrides::builder().max_model_len(bad).build();
            let err = materialize(profile, &overrides).unwrap_err();
            assert_eq!(err.field, "max_model_len");
        }

        let overrides = ConfigOverrides::builder().max_model_len(2048).build();
        let materialized = materialize(profile, &overrides).unwrap();
        assert_eq!(materialized.config.max_model_len, Some(2048));
    }

    #[test]
    #[serial]
    fn gpu_memory_utilization_bounds() {
        clear_env();
        let profile = family_profile("llama").unwrap();

        for bad in [0.0f32, -0.5, 1.5] {
            let overrides = ConfigOverrides::builder()
                .gpu_memory_utilization(bad)
                .build();
            let err = materialize(profile, &overrides).unwrap_err();
            assert_eq!(err.field, "gpu_memory_utilization");
        }

        for good in [1.0f32, 0.5, 0.0001] {
            let overrides = ConfigOverrides::builder()
                .gpu_memory_utilization(good)
                .build();
            let materialized = materialize(profile, &overrides).unwrap();
            assert_eq!(materialized.config.gpu_memory_utilization, good);
        }
    }

    #[test]
    #[serial]
    fn malformed_env_numeric_is_a_validation_error() {
        clear_env();
        std::env::set_var(env::MAX_MODEL_LEN_ENV, "lots");
        let profile = family_profile("llama").unwrap();
        let err = materialize(profile, &ConfigOverrides::default()).unwrap_err();
        assert_eq!(err.field, "max_model_len");
        clear_env();
    }

    #[test]
    #[serial]
    fn devices_explicit_env_and_all_expansion() {
        clear_env();
        let profile = family_profile("llama").unwrap();

        let overrides = ConfigOverrides::builder()
            .devices(vec!["0".to_string(), "1".to_string()])
            .build();
        let materialized = materialize(profile, &overrides).unwrap();
        assert_eq!(materialized.config.resources, ResourceSpec::Gpu(2));

        std::env::set_var(env::CUDA_VISIBLE_DEVICES_ENV, "0,1,2");
        let materialized = materialize(profile, &ConfigOverrides::default()).unwrap();
        assert_eq!(materialized.config.resources, ResourceSpec::Gpu(3));

        let overrides = ConfigOverrides::builder()
            .devices(vec!["all".to_string()])
            .build();
        let materialized = materialize(profile, &overrides).unwrap();
        assert_eq!(materialized.config.resources, ResourceSpec::Gpu(3));

        std::env::remove_var(env::CUDA_VISIBLE_DEVICES_ENV);
        let overrides = ConfigOverrides::builder()
            .devices(vec!["all".to_string()])
            .build();
        let err = materialize(profile, &overrides).unwrap_err();
        assert_eq!(err.field, "device");
    }

    #[test]
    #[serial]
    fn trust_remote_code_env_toggle() {
        clear_env();
        let profile = family_profile("llama").unwrap();

        let materialized = materialize(profile, &ConfigOverrides::default()).unwrap();
        assert!(!materialized.config.trust_remote_code);

        std::env::set_var(env::TRUST_REMOTE_CODE_ENV, "true");
        let materialized = materialize(profile, &ConfigOverrides::default()).unwrap();
        assert!(materialized.config.trust_remote_code);
        clear_env();
    }
}
