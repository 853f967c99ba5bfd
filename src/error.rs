// top-level error for the public API

#[derive(serde::Serialize, Debug, thiserror::Error)]
pub enum LlmBundlerError {
    #[error(transparent)]
    Resolution(#[from] crate::resolver::ResolutionError),

    #[error(transparent)]
    Validation(#[from] crate::config::ValidationError),

    #[error(transparent)]
    Synthesis(#[from] crate::bundle::SynthesisError),

    #[error(transparent)]
    Build(#[from] crate::package::BuildError),

    #[error("invalid {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("failed to load model metadata for '{model_id}': {reason}")]
    Metadata { model_id: String, reason: String },

    #[error("server launch failed: {0}")]
    ServerLaunch(String),

    #[error("{operation} failed for '{path}'")]
    FileSystem {
        operation: &'static str,
        path: std::path::PathBuf,
        #[source]
        #[serde(serialize_with = "std_io_error_to_string")]
        source: std::io::Error,
    },
}

pub type LlmBundlerResult<T> = std::result::Result<T, LlmBundlerError>;

impl LlmBundlerError {
    pub fn file_system(
        operation: &'static str,
        path: impl Into<std::path::PathBuf>,
        err: impl Into<std::io::Error>,
    ) -> Self {
        Self::FileSystem {
            operation,
            path: path.into(),
            source: err.into(),
        }
    }
}

pub(crate) fn std_io_error_to_string<S>(e: &impl std::fmt::Display, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_str(&e.to_string())
}
