//! Static per-family serving profiles: the canonical service artifact name,
//! the default weight serialisation format, and the runtime requirements a
//! family always carries. The profile supplies the defaults the
//! [materializer](crate::config::materialize) layers CLI and environment
//! overrides on top of.

use crate::config::Serialisation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyProfile {
    /// Family key as produced by the architecture resolver.
    pub family: &'static str,
    /// Name the static service entry artifact is staged under.
    pub service_name: &'static str,
    /// Human-readable name used in descriptions and summaries.
    pub start_name: &'static str,
    /// Weight format the family ships in when the caller does not specify one.
    pub serialisation: Serialisation,
    /// Runtime packages this family always needs, merged into every manifest.
    pub requirements: &'static [&'static str],
}

pub const FAMILY_PROFILES: &[FamilyProfile] = &[
    FamilyProfile {
        family: "llama",
        service_name: "llama_service.py",
        start_name: "llama",
        serialisation: Serialisation::Safetensors,
        requirements: &[],
    },
    FamilyProfile {
        family: "mistral",
        service_name: "mistral_service.py",
        start_name: "mistral",
        serialisation: Serialisation::Safetensors,
        requirements: &[],
    },
    FamilyProfile {
        family: "mixtral",
        service_name: "mixtral_service.py",
        start_name: "mixtral",
        serialisation: Serialisation::Safetensors,
        requirements: &[],
    },
    FamilyProfile {
        family: "gemma",
        service_name: "gemma_service.py",
        start_name: "gemma",
        serialisation: Serialisation::Safetensors,
        requirements: &[],
    },
    FamilyProfile {
        family: "qwen",
        service_name: "qwen_service.py",
        start_name: "qwen",
        serialisation: Serialisation::Safetensors,
        requirements: &["tiktoken"],
    },
    FamilyProfile {
        family: "phi",
        service_name: "phi_service.py",
        start_name: "phi",
        serialisation: Serialisation::Safetensors,
        requirements: &[],
    },
    FamilyProfile {
        family: "falcon",
        service_name: "falcon_service.py",
        start_name: "falcon",
        serialisation: Serialisation::Safetensors,
        requirements: &["einops"],
    },
    FamilyProfile {
        family: "gpt_neox",
        service_name: "gpt_neox_service.py",
        start_name: "gpt-neox",
        serialisation: Serialisation::Safetensors,
        requirements: &[],
    },
    FamilyProfile {
        family: "starcoder",
        service_name: "starcoder_service.py",
        start_name: "starcoder",
        serialisation: Serialisation::Safetensors,
        requirements: &[],
    },
    FamilyProfile {
        family: "stablelm",
        service_name: "stablelm_service.py",
        start_name: "stablelm",
        serialisation: Serialisation::Safetensors,
        requirements: &[],
    },
    FamilyProfile {
        family: "opt",
        service_name: "opt_service.py",
        start_name: "opt",
        serialisation: Serialisation::Safetensors,
        requirements: &[],
    },
    FamilyProfile {
        family: "mpt",
        service_name: "mpt_service.py",
        start_name: "mpt",
        serialisation: Serialisation::Legacy,
        requirements: &["einops", "triton"],
    },
    FamilyProfile {
        family: "baichuan",
        service_name: "baichuan_service.py",
        start_name: "baichuan",
        serialisation: Serialisation::Legacy,
        requirements: &["cpm-kernels"],
    },
    FamilyProfile {
        family: "chatglm",
        service_name: "chatglm_service.py",
        start_name: "chatglm",
        serialisation: Serialisation::Legacy,
        requirements: &["cpm-kernels"],
    },
    FamilyProfile {
        family: "flan_t5",
        service_name: "flan_t5_service.py",
        start_name: "flan-t5",
        serialisation: Serialisation::Safetensors,
        requirements: &[],
    },
];

pub fn family_profile(family: &str) -> Option<&'static FamilyProfile> {
    FAMILY_PROFILES.iter().find(|p| p.family == family)
}
