//! Resolved Serving Configuration
//! ==============================
//!
//! The typed configuration handed to the bundle synthesizer and the launch
//! orchestrator. A [`ResolvedConfig`] is produced once per invocation by the
//! [materializer](crate::config::materialize) and is immutable afterwards; it
//! is never persisted directly, only serialized into generated artifacts or
//! mirrored into environment variables.
//!
//! Every field is `serde`-serialisable so a resolved configuration can be
//! logged, embedded in a manifest, or shipped to the external serving runtime
//! without loss of information.

pub mod env;
mod materialize;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use materialize::{
    ConfigOverrides, Materialized, MaterializeWarning, ValidationError, materialize,
    DEFAULT_GPU_MEMORY_UTILIZATION, DEFAULT_TIMEOUT_SECS,
};

use crate::logging::i_nlns;

/// Dynamic quantization strategy requested for the served model. Absence
/// means "serve the weights as stored".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
#[clap(rename_all = "lowercase")]
pub enum Quantise {
    Int8,
    Int4,
    Gptq,
    Awq,
    Squeezellm,
}

/// Tensor dtype used for inference casting.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum, Default,
)]
#[serde(rename_all = "lowercase")]
#[clap(rename_all = "lowercase")]
pub enum Dtype {
    #[default]
    Auto,
    Float16,
    Float32,
    Bfloat16,
    Int8,
    Int16,
}

/// On-disk weight storage format expected by the serving runtime. Orthogonal
/// to the packaging format.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum, Default,
)]
#[serde(rename_all = "lowercase")]
#[clap(rename_all = "lowercase")]
pub enum Serialisation {
    #[default]
    Safetensors,
    Legacy,
}

impl fmt::Display for Quantise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Quantise::Int8 => "int8",
            Quantise::Int4 => "int4",
            Quantise::Gptq => "gptq",
            Quantise::Awq => "awq",
            Quantise::Squeezellm => "squeezellm",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Dtype::Auto => "auto",
            Dtype::Float16 => "float16",
            Dtype::Float32 => "float32",
            Dtype::Bfloat16 => "bfloat16",
            Dtype::Int8 => "int8",
            Dtype::Int16 => "int16",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Serialisation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Serialisation::Safetensors => "safetensors",
            Serialisation::Legacy => "legacy",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Quantise {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "int8" => Ok(Quantise::Int8),
            "int4" => Ok(Quantise::Int4),
            "gptq" => Ok(Quantise::Gptq),
            "awq" => Ok(Quantise::Awq),
            "squeezellm" => Ok(Quantise::Squeezellm),
            other => Err(format!(
                "unknown quantization strategy `{other}` (expected int8, int4, gptq, awq, or squeezellm)"
            )),
        }
    }
}

impl std::str::FromStr for Dtype {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Dtype::Auto),
            "float16" | "half" => Ok(Dtype::Float16),
            "float32" | "float" => Ok(Dtype::Float32),
            "bfloat16" => Ok(Dtype::Bfloat16),
            "int8" => Ok(Dtype::Int8),
            "int16" => Ok(Dtype::Int16),
            other => Err(format!(
                "unknown dtype `{other}` (expected auto, float16, float32, bfloat16, int8, or int16)"
            )),
        }
    }
}

impl std::str::FromStr for Serialisation {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "safetensors" => Ok(Serialisation::Safetensors),
            "legacy" => Ok(Serialisation::Legacy),
            other => Err(format!(
                "unknown serialisation format `{other}` (expected safetensors or legacy)"
            )),
        }
    }
}

/// Compute resources the generated service asks the runtime for: either a
/// number of GPU devices or the host's CPUs.
///
/// Serializes to the single-key map the runtime expects:
/// `{"gpu": 2}` or `{"cpu": "cpu_count"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawResources", into = "RawResources")]
pub enum ResourceSpec {
    Gpu(usize),
    Cpu,
}

#[derive(Serialize, Deserialize, Clone)]
struct RawResources {
    #[serde(skip_serializing_if = "Option::is_none")]
    gpu: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cpu: Option<String>,
}

impl From<RawResources> for ResourceSpec {
    fn from(raw: RawResources) -> Self {
        match raw.gpu {
            Some(count) => ResourceSpec::Gpu(count),
            None => ResourceSpec::Cpu,
        }
    }
}

impl From<ResourceSpec> for RawResources {
    fn from(spec: ResourceSpec) -> Self {
        match spec {
            ResourceSpec::Gpu(count) => RawResources {
                gpu: Some(count),
                cpu: None,
            },
            ResourceSpec::Cpu => RawResources {
                gpu: None,
                cpu: Some("cpu_count".to_string()),
            },
        }
    }
}

impl fmt::Display for ResourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceSpec::Gpu(count) => write!(f, "gpu x{count}"),
            ResourceSpec::Cpu => f.write_str("cpu"),
        }
    }
}

/// Traffic shaping forwarded to the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficSpec {
    pub timeout: u64,
}

/// The `resources` + `traffic` descriptor embedded in generated artifacts and
/// the `SERVICES_CONFIG` environment variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicesConfig {
    pub resources: ResourceSpec,
    pub traffic: TrafficSpec,
}

/// The fully-populated serving configuration for one invocation.
///
/// Created once by [`materialize`], immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedConfig {
    /// Model-family key selected by the architecture resolver.
    pub family: String,
    pub quantise: Option<Quantise>,
    pub dtype: Dtype,
    pub serialisation: Serialisation,
    /// Maximum sequence length; positive when present.
    pub max_model_len: Option<u32>,
    /// Fraction of GPU memory handed to the model executor, in (0, 1].
    pub gpu_memory_utilization: f32,
    pub trust_remote_code: bool,
    pub resources: ResourceSpec,
    pub timeout_secs: u64,
}

impl ResolvedConfig {
    pub fn services_config(&self) -> ServicesConfig {
        ServicesConfig {
            resources: self.resources.clone(),
            traffic: TrafficSpec {
                timeout: self.timeout_secs,
            },
        }
    }

    pub fn to_json(&self) -> crate::error::LlmBundlerResult<String> {
        serde_json::to_string(self).map_err(|e| crate::error::LlmBundlerError::InvalidConfig {
            field: "resolved config",
            reason: e.to_string(),
        })
    }
}

impl fmt::Display for ResolvedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let quantise = self.quantise.map_or("none".to_string(), |q| q.to_string());
        let max_model_len = self
            .max_model_len
            .map_or("model default".to_string(), |n| n.to_string());
        writeln!(f, "ResolvedConfig:")?;
        i_nlns(
            f,
            &[
                format_args!("family:                 {}", self.family),
                format_args!("quantise:               {}", quantise),
                format_args!("dtype:                  {}", self.dtype),
                format_args!("serialisation:          {}", self.serialisation),
                format_args!("max_model_len:          {}", max_model_len),
                format_args!("gpu_memory_utilization: {}", self.gpu_memory_utilization),
                format_args!("trust_remote_code:      {}", self.trust_remote_code),
                format_args!("resources:              {}", self.resources),
                format_args!("timeout_secs:           {}", self.timeout_secs),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ResolvedConfig {
        ResolvedConfig {
            family: "llama".to_string(),
            quantise: None,
            dtype: Dtype::Auto,
            serialisation: Serialisation::Safetensors,
            max_model_len: Some(4096),
            gpu_memory_utilization: 0.9,
            trust_remote_code: false,
            resources: ResourceSpec::Gpu(2),
            timeout_secs: 360_000,
        }
    }

    #[test]
    fn resources_serialize_as_single_key_map() {
        let gpu = serde_json::to_value(ResourceSpec::Gpu(2)).unwrap();
        assert_eq!(gpu, serde_json::json!({"gpu": 2}));

        let cpu = serde_json::to_value(ResourceSpec::Cpu).unwrap();
        assert_eq!(cpu, serde_json::json!({"cpu": "cpu_count"}));
    }

    #[test]
    fn services_config_shape() {
        let value = serde_json::to_value(config().services_config()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "resources": {"gpu": 2},
                "traffic": {"timeout": 360_000},
            })
        );
    }

    #[test]
    fn config_json_round_trip() {
        let cfg = config();
        let json = cfg.to_json().unwrap();
        let back: ResolvedConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn enum_spellings_round_trip_from_str() {
        for (s, q) in [("gptq", Quantise::Gptq), ("AWQ", Quantise::Awq)] {
            assert_eq!(s.parse::<Quantise>().unwrap(), q);
        }
        assert_eq!("bfloat16".parse::<Dtype>().unwrap(), Dtype::Bfloat16);
        assert_eq!(
            "legacy".parse::<Serialisation>().unwrap(),
            Serialisation::Legacy
        );
        assert!("spicy".parse::<Serialisation>().is_err());
    }
}
