//! Architecture Resolver
//! =====================
//!
//! Maps the architecture class names a model declares in its own metadata to
//! the internal model-family key that selects a serving profile.
//!
//! The table is frozen at construction and handed to callers by reference; it
//! is an ordered list scanned linearly so the tie-break stays with the *first
//! declared* architecture when a model lists several recognized ones. Matching
//! is exact and case-sensitive; an unrecognized architecture is a hard
//! failure, never coerced.

use serde::Serialize;

/// Built-in (architecture class name → family key) pairs.
///
/// Class-name keys follow the model metadata convention; the short-form keys
/// some model configs declare instead (`flan_t5`, `chatglm`) are listed too.
const ARCHITECTURE_MAPPINGS: &[(&str, &str)] = &[
    ("LlamaForCausalLM", "llama"),
    ("MistralForCausalLM", "mistral"),
    ("MixtralForCausalLM", "mixtral"),
    ("GemmaForCausalLM", "gemma"),
    ("Qwen2ForCausalLM", "qwen"),
    ("PhiForCausalLM", "phi"),
    ("FalconForCausalLM", "falcon"),
    ("GPTNeoXForCausalLM", "gpt_neox"),
    ("GPTBigCodeForCausalLM", "starcoder"),
    ("StableLmForCausalLM", "stablelm"),
    ("OPTForCausalLM", "opt"),
    ("MPTForCausalLM", "mpt"),
    ("BaichuanForCausalLM", "baichuan"),
    ("ChatGLMModel", "chatglm"),
    ("chatglm", "chatglm"),
    ("T5ForConditionalGeneration", "flan_t5"),
    ("flan_t5", "flan_t5"),
];

/// No declared architecture matched the mapping table.
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("no supported architecture for model '{model_id}': declared {architectures:?}")]
pub struct ResolutionError {
    pub model_id: String,
    pub architectures: Vec<String>,
}

/// Frozen, ordered architecture→family table.
#[derive(Debug, Clone)]
pub struct ArchitectureMap {
    entries: Vec<(String, String)>,
}

impl ArchitectureMap {
    /// The table bundled with this crate.
    pub fn bundled() -> Self {
        Self::from_entries(
            ARCHITECTURE_MAPPINGS
                .iter()
                .map(|(arch, family)| (arch.to_string(), family.to_string())),
        )
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Exact-match lookup of a single architecture class name.
    pub fn get(&self, architecture: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(arch, _)| arch == architecture)
            .map(|(_, family)| family.as_str())
    }

    /// Resolve a model's declared architecture list to a family key.
    ///
    /// The list is scanned in declaration order and the first mapped name
    /// wins, regardless of any unmapped names around it. Pure lookup, no side
    /// effects.
    pub fn resolve(
        &self,
        model_id: &str,
        architectures: &[String],
    ) -> Result<&str, ResolutionError> {
        architectures
            .iter()
            .find_map(|arch| self.get(arch))
            .ok_or_else(|| ResolutionError {
                model_id: model_id.to_string(),
                architectures: architectures.to_vec(),
            })
    }
}
