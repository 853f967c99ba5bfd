//! Fixed environment variable names shared between the config materializer,
//! the generated artifacts, and the launch path. Generated bundles are
//! re-configured at load time through these same names, so they must never
//! drift between the writer and the launcher.

pub const TRUST_REMOTE_CODE_ENV: &str = "TRUST_REMOTE_CODE";
pub const QUANTIZE_ENV: &str = "QUANTIZE";
pub const DTYPE_ENV: &str = "DTYPE";
pub const MAX_MODEL_LEN_ENV: &str = "MAX_MODEL_LEN";
pub const SERVICES_CONFIG_ENV: &str = "SERVICES_CONFIG";
pub const MODEL_ID_ENV: &str = "MODEL_ID";
pub const MODEL_NAME_ENV: &str = "MODEL_NAME";
pub const LLM_CONFIG_ENV: &str = "LLM_CONFIG";
pub const CUDA_VISIBLE_DEVICES_ENV: &str = "CUDA_VISIBLE_DEVICES";
pub const NVIDIA_DRIVER_CAPABILITIES_ENV: &str = "NVIDIA_DRIVER_CAPABILITIES";
pub const RELOAD_ENV: &str = "RELOAD";

pub const SERIALIZATION_ENV: &str = "SERIALIZATION";
/// Both spellings are accepted; the American one is written back.
pub const SERIALIZATION_ENV_ALIASES: &[&str] = &["SERIALISATION"];

pub const GPU_MEMORY_UTILIZATION_ENV: &str = "GPU_MEMORY_UTILIZATION";
pub const GPU_MEMORY_UTILIZATION_ENV_ALIASES: &[&str] = &["GPU_MEMORY_UTILISATION"];

pub const DEBUG_ENV_VAR: &str = "LLM_BUNDLER_DEBUG";
pub const QUIET_ENV_VAR: &str = "LLM_BUNDLER_QUIET";

/// First non-empty value among `primary` and its `aliases`.
pub fn var_with_aliases(primary: &str, aliases: &[&str]) -> Option<String> {
    std::iter::once(primary)
        .chain(aliases.iter().copied())
        .find_map(|name| match std::env::var(name) {
            Ok(v) if !v.trim().is_empty() => Some(v),
            _ => None,
        })
}

pub fn var(name: &str) -> Option<String> {
    var_with_aliases(name, &[])
}

/// Boolean environment toggle: `1`, `true`, `yes`, `on` (any case) are true,
/// everything else (including unset) is `default`.
pub fn check_bool_env(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}
