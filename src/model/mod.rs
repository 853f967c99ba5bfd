//! Model Resolution
//! ================
//!
//! Turns an opaque model identifier into something the rest of the pipeline
//! can work with: the on-disk location of the model (when it is cached
//! locally) and the architecture metadata the model declares about itself.
//!
//! Resolution order mirrors how operators actually address models:
//!
//! 1. A record in the local model store (`<home>/models/...`), addressed by
//!    store key (`name` or `name:version`).
//! 2. A local directory containing the model's `config.json`.
//! 3. A remote repository, whose `config.json` is fetched (and cached) with
//!    the Hugging Face hub client.

use std::{
    cell::OnceCell,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use dotenvy::dotenv;
use hf_hub::{
    api::sync::{Api, ApiBuilder},
    Repo, RepoType,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{LlmBundlerError, LlmBundlerResult},
    fs::{BundlerHome, ValidDir, ValidFile},
};

pub const HF_TOKEN_ENV_VAR: &str = "HUGGING_FACE_TOKEN";

const MODEL_CONFIG_FILE: &str = "config.json";
const LATEST_MARKER_FILE: &str = "latest";

/// A model resolved from the local model store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedModelRef {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
}

/// The architecture metadata a model declares in its own `config.json`.
///
/// The declared architecture list is order-significant; the resolver honors
/// the declaration order when several entries are recognized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelMetadata {
    pub architectures: Vec<String>,
    pub commit_hash: Option<String>,
}

#[derive(Deserialize)]
struct RawModelConfig {
    #[serde(default)]
    architectures: Vec<String>,
    #[serde(default)]
    model_type: Option<String>,
    #[serde(default, rename = "_commit_hash")]
    commit_hash: Option<String>,
}

impl ModelMetadata {
    pub fn from_file(config_json_path: &Path) -> LlmBundlerResult<Self> {
        let config_json = ValidFile::new(config_json_path)?;
        let file = File::open(&config_json)
            .map_err(|e| LlmBundlerError::file_system("open model config", &*config_json, e))?;
        let raw: RawModelConfig = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            LlmBundlerError::Metadata {
                model_id: config_json_path.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        // Some configs carry only `model_type` in place of the class list.
        let architectures = if raw.architectures.is_empty() {
            raw.model_type.into_iter().collect()
        } else {
            raw.architectures
        };

        Ok(Self {
            architectures,
            commit_hash: raw.commit_hash,
        })
    }

    pub fn from_dir(model_dir: &Path) -> LlmBundlerResult<Self> {
        Self::from_file(&model_dir.join(MODEL_CONFIG_FILE))
    }
}

/// Local model store under `<home>/models/`.
///
/// Layout: one directory per record name, one subdirectory per version, plus
/// a `latest` marker file naming the most recently stored version.
#[derive(Debug, Clone)]
pub struct ModelStore {
    root: ValidDir,
}

impl ModelStore {
    pub fn open(home: &BundlerHome) -> LlmBundlerResult<Self> {
        Ok(Self {
            root: home.models_dir()?,
        })
    }

    /// Look up a store key of the form `name` or `name:version`.
    ///
    /// Identifiers that cannot be store keys at all (slashes, uppercase, …)
    /// resolve to `None` rather than an error so callers can fall through to
    /// path- or remote-based resolution.
    pub fn get(&self, key: &str) -> LlmBundlerResult<Option<CachedModelRef>> {
        let (name, version) = match key.split_once(':') {
            Some((n, v)) => (n, Some(v)),
            None => (key, None),
        };
        if !is_store_name(name) || !version.map_or(true, is_store_name) {
            return Ok(None);
        }

        let name_dir = self.root.join(name);
        if !name_dir.is_dir() {
            return Ok(None);
        }

        let version = match version {
            Some(v) => v.to_string(),
            None => match std::fs::read_to_string(name_dir.join(LATEST_MARKER_FILE)) {
                Ok(marker) => marker.trim().to_string(),
                Err(_) => return Ok(None),
            },
        };

        let version_dir = name_dir.join(&version);
        if !version_dir.is_dir() {
            return Ok(None);
        }

        Ok(Some(CachedModelRef {
            name: name.to_string(),
            version,
            path: version_dir,
        }))
    }

    /// Store the contents of `src_dir` as `name:version` and mark it latest.
    pub fn put(&self, name: &str, version: &str, src_dir: &Path) -> LlmBundlerResult<CachedModelRef> {
        if !is_store_name(name) || !is_store_name(version) {
            return Err(LlmBundlerError::InvalidConfig {
                field: "model store key",
                reason: format!(
                    "`{name}:{version}` must be lowercase alphanumeric with `.`, `_`, or `-`"
                ),
            });
        }
        let version_dir = self.root.join(name).join(version);
        crate::fs::copy_dir_all(src_dir, &version_dir)?;
        let marker = self.root.join(name).join(LATEST_MARKER_FILE);
        std::fs::write(&marker, version)
            .map_err(|e| LlmBundlerError::file_system("write latest marker", &marker, e))?;
        Ok(CachedModelRef {
            name: name.to_string(),
            version: version.to_string(),
            path: version_dir,
        })
    }
}

fn is_store_name(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
}

/// Lazy Hugging Face hub client for fetching model metadata.
#[derive(Default)]
pub struct HubLoader {
    pub hf_token: Option<String>,
    api: OnceCell<Api>,
}

impl HubLoader {
    pub fn new() -> Self {
        Self::default()
    }

    fn api(&self) -> LlmBundlerResult<&Api> {
        if let Some(api) = self.api.get() {
            return Ok(api);
        }
        let api = ApiBuilder::new()
            .with_progress(false)
            .with_token(self.load_hf_token())
            .build()
            .map_err(|e| LlmBundlerError::Metadata {
                model_id: "<hub client>".to_string(),
                reason: e.to_string(),
            })?;
        Ok(self.api.get_or_init(|| api))
    }

    fn load_hf_token(&self) -> Option<String> {
        if let Some(token) = &self.hf_token {
            return Some(token.to_owned());
        }
        dotenv().ok();
        match dotenvy::var(HF_TOKEN_ENV_VAR) {
            Ok(token) => Some(token),
            Err(_) => {
                tracing::trace!(
                    "{} not found in dotenv, nor was it set manually",
                    HF_TOKEN_ENV_VAR
                );
                None
            }
        }
    }

    /// Download (or reuse the cached copy of) a repo's `config.json`.
    pub fn fetch_config(
        &self,
        repo_id: &str,
        revision: Option<&str>,
    ) -> LlmBundlerResult<PathBuf> {
        let api = self.api()?;
        let repo = match revision {
            Some(rev) => api.repo(Repo::with_revision(
                repo_id.to_owned(),
                RepoType::Model,
                rev.to_owned(),
            )),
            None => api.repo(Repo::new(repo_id.to_owned(), RepoType::Model)),
        };
        repo.get(MODEL_CONFIG_FILE)
            .map_err(|e| LlmBundlerError::Metadata {
                model_id: repo_id.to_string(),
                reason: e.to_string(),
            })
    }
}

/// A model identifier carried through resolution. `model_id` is the working
/// value the rest of the pipeline uses: the cached record's path when the
/// store matched, otherwise the identifier as given.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedModel {
    pub model_id: String,
    pub metadata: ModelMetadata,
    pub cached: Option<CachedModelRef>,
}

impl ResolvedModel {
    /// Version pin implied by the resolved model, when one exists: the cached
    /// record's version, else the metadata commit hash.
    pub fn default_revision(&self) -> Option<String> {
        self.cached
            .as_ref()
            .map(|record| record.version.clone())
            .or_else(|| self.metadata.commit_hash.clone())
    }
}

/// Resolve `model_id` against the store, the local filesystem, and the hub,
/// in that order.
pub fn resolve_model(
    store: &ModelStore,
    hub: &HubLoader,
    model_id: &str,
    model_tag: Option<&str>,
    revision: Option<&str>,
) -> LlmBundlerResult<ResolvedModel> {
    let key = model_tag.unwrap_or(model_id).to_lowercase();
    if let Some(record) = store.get(&key)? {
        let metadata = ModelMetadata::from_dir(&record.path)?;
        return Ok(ResolvedModel {
            model_id: record.path.display().to_string(),
            metadata,
            cached: Some(record),
        });
    }

    let as_path = Path::new(model_id);
    if as_path.is_dir() {
        let metadata = ModelMetadata::from_dir(as_path)?;
        return Ok(ResolvedModel {
            model_id: model_id.to_string(),
            metadata,
            cached: None,
        });
    }

    let config_path = hub.fetch_config(model_id, revision)?;
    let metadata = ModelMetadata::from_file(&config_path)?;
    Ok(ResolvedModel {
        model_id: model_id.to_string(),
        metadata,
        cached: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, body: &str) {
        std::fs::write(dir.join(MODEL_CONFIG_FILE), body).unwrap();
    }

    #[test]
    fn metadata_reads_architectures_and_commit_hash() -> LlmBundlerResult<()> {
        let tmp = tempfile::tempdir().unwrap();
        write_config(
            tmp.path(),
            r#"{"architectures": ["LlamaForCausalLM"], "_commit_hash": "abc123", "model_type": "llama"}"#,
        );

        let metadata = ModelMetadata::from_dir(tmp.path())?;
        assert_eq!(metadata.architectures, vec!["LlamaForCausalLM"]);
        assert_eq!(metadata.commit_hash.as_deref(), Some("abc123"));
        Ok(())
    }

    #[test]
    fn metadata_falls_back_to_model_type() -> LlmBundlerResult<()> {
        let tmp = tempfile::tempdir().unwrap();
        write_config(tmp.path(), r#"{"model_type": "flan_t5"}"#);

        let metadata = ModelMetadata::from_dir(tmp.path())?;
        assert_eq!(metadata.architectures, vec!["flan_t5"]);
        Ok(())
    }

    #[test]
    fn store_round_trip_and_latest_marker() -> LlmBundlerResult<()> {
        let home_dir = tempfile::tempdir().unwrap();
        let home = BundlerHome::at(home_dir.path())?;
        let store = ModelStore::open(&home)?;

        let src = tempfile::tempdir().unwrap();
        write_config(src.path(), r#"{"architectures": ["OPTForCausalLM"]}"#);
        store.put("facebook-opt", "v1", src.path())?;
        store.put("facebook-opt", "v2", src.path())?;

        let latest = store.get("facebook-opt")?.unwrap();
        assert_eq!(latest.version, "v2");

        let pinned = store.get("facebook-opt:v1")?.unwrap();
        assert_eq!(pinned.version, "v1");
        assert!(pinned.path.join(MODEL_CONFIG_FILE).is_file());
        Ok(())
    }

    #[test]
    fn non_store_keys_resolve_to_none() -> LlmBundlerResult<()> {
        let home_dir = tempfile::tempdir().unwrap();
        let home = BundlerHome::at(home_dir.path())?;
        let store = ModelStore::open(&home)?;

        assert!(store.get("meta-llama/Llama-2-7b")?.is_none());
        assert!(store.get("Uppercase")?.is_none());
        assert!(store.get("missing-entirely")?.is_none());
        Ok(())
    }

    #[test]
    fn resolve_prefers_store_then_local_path() -> LlmBundlerResult<()> {
        let home_dir = tempfile::tempdir().unwrap();
        let home = BundlerHome::at(home_dir.path())?;
        let store = ModelStore::open(&home)?;
        let hub = HubLoader::new();

        let src = tempfile::tempdir().unwrap();
        write_config(src.path(), r#"{"architectures": ["MistralForCausalLM"]}"#);
        store.put("local-mistral", "r7", src.path())?;

        let resolved = resolve_model(&store, &hub, "local-mistral", None, None)?;
        assert!(resolved.cached.is_some());
        assert_eq!(resolved.default_revision().as_deref(), Some("r7"));
        assert_eq!(resolved.metadata.architectures, vec!["MistralForCausalLM"]);

        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), r#"{"architectures": ["GemmaForCausalLM"]}"#);
        let resolved = resolve_model(&store, &hub, &dir.path().display().to_string(), None, None)?;
        assert!(resolved.cached.is_none());
        assert_eq!(resolved.metadata.architectures, vec!["GemmaForCausalLM"]);
        Ok(())
    }
}
