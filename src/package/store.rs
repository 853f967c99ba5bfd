//! Package Store
//! =============
//!
//! The narrow seam to wherever finished packages live. The pipeline only ever
//! queries, deletes, and persists whole records, so the trait surface is
//! exactly those three operations; everything else about the store is an
//! implementation detail behind it.
//!
//! [`LocalPackageStore`] keeps records on the local filesystem under
//! `<home>/bundles/<name>/<version>/`, with the staged bundle files copied
//! below `files/` and `manifest.json` written last: a record without a
//! manifest is invisible, so the manifest write is the commit point. New
//! records are assembled in a temporary sibling directory and renamed into
//! place; concurrent writers targeting the same tag settle last-writer-wins
//! at the rename.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{
    error::{LlmBundlerError, LlmBundlerResult},
    fs::{copy_dir_all, BundlerHome, ValidDir},
    package::{manifest::PackageManifest, tag::PackageTag},
};

const MANIFEST_FILE: &str = "manifest.json";
const FILES_DIR: &str = "files";

/// A persisted, addressable package.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PackageRecord {
    pub tag: PackageTag,
    pub manifest: PackageManifest,
    /// Store location of the record.
    pub path: PathBuf,
}

pub trait PackageStore {
    fn get(&self, tag: &PackageTag) -> LlmBundlerResult<Option<PackageRecord>>;
    fn delete(&self, tag: &PackageTag) -> LlmBundlerResult<()>;
    fn put(&self, manifest: &PackageManifest, bundle_dir: &Path) -> LlmBundlerResult<PackageRecord>;
}

#[derive(Debug, Clone)]
pub struct LocalPackageStore {
    root: ValidDir,
}

impl LocalPackageStore {
    pub fn open(home: &BundlerHome) -> LlmBundlerResult<Self> {
        Ok(Self {
            root: home.bundles_dir()?,
        })
    }

    fn record_dir(&self, tag: &PackageTag) -> PathBuf {
        self.root.join(tag.name()).join(tag.version())
    }
}

impl PackageStore for LocalPackageStore {
    fn get(&self, tag: &PackageTag) -> LlmBundlerResult<Option<PackageRecord>> {
        let dir = self.record_dir(tag);
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&manifest_path)
            .map_err(|e| LlmBundlerError::file_system("read manifest", &manifest_path, e))?;
        let manifest: PackageManifest =
            serde_json::from_str(&raw).map_err(|e| LlmBundlerError::InvalidConfig {
                field: "package manifest",
                reason: format!("{}: {e}", manifest_path.display()),
            })?;
        Ok(Some(PackageRecord {
            tag: tag.clone(),
            manifest,
            path: dir,
        }))
    }

    fn delete(&self, tag: &PackageTag) -> LlmBundlerResult<()> {
        let dir = self.record_dir(tag);
        std::fs::remove_dir_all(&dir)
            .map_err(|e| LlmBundlerError::file_system("delete package record", &dir, e))?;
        // Drop the name directory too once its last version is gone.
        if let Some(parent) = dir.parent() {
            let _ = std::fs::remove_dir(parent);
        }
        Ok(())
    }

    fn put(&self, manifest: &PackageManifest, bundle_dir: &Path) -> LlmBundlerResult<PackageRecord> {
        let tag = PackageTag::new(&manifest.name, &manifest.version)?;
        let target = self.record_dir(&tag);

        let scratch = self
            .root
            .join(tag.name())
            .join(format!(".tmp-{}", uuid::Uuid::new_v4()));
        copy_dir_all(bundle_dir, &scratch.join(FILES_DIR))?;

        let raw = serde_json::to_string_pretty(manifest).map_err(|e| {
            LlmBundlerError::InvalidConfig {
                field: "package manifest",
                reason: e.to_string(),
            }
        })?;
        let manifest_path = scratch.join(MANIFEST_FILE);
        std::fs::write(&manifest_path, raw)
            .map_err(|e| LlmBundlerError::file_system("write manifest", &manifest_path, e))?;

        if target.exists() {
            std::fs::remove_dir_all(&target)
                .map_err(|e| LlmBundlerError::file_system("replace package record", &target, e))?;
        }
        std::fs::rename(&scratch, &target)
            .map_err(|e| LlmBundlerError::file_system("publish package record", &scratch, e))?;

        debug!("persisted package record {tag} at {}", target.display());
        Ok(PackageRecord {
            tag,
            manifest: manifest.clone(),
            path: target,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::package::manifest::RuntimeOptions;

    fn manifest(name: &str, version: &str) -> PackageManifest {
        PackageManifest {
            service: "llama_service.py:LLMService".to_string(),
            name: name.to_string(),
            version: version.to_string(),
            labels: BTreeMap::from([("library".to_string(), "llama".to_string())]),
            models: Vec::new(),
            envs: Vec::new(),
            description: "test package".to_string(),
            include: vec!["service_vars.json".to_string()],
            exclude: Vec::new(),
            packages: Vec::new(),
            runtime: RuntimeOptions::default(),
        }
    }

    fn store() -> (tempfile::TempDir, LocalPackageStore) {
        let tmp = tempfile::tempdir().unwrap();
        let home = BundlerHome::at(tmp.path()).unwrap();
        let store = LocalPackageStore::open(&home).unwrap();
        (tmp, store)
    }

    fn bundle_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("service_vars.json"), b"{}").unwrap();
        dir
    }

    #[test]
    fn put_get_delete_round_trip() -> LlmBundlerResult<()> {
        let (_tmp, store) = store();
        let bundle = bundle_dir();
        let tag = PackageTag::from_taglike("demo-service:v1")?;

        assert!(store.get(&tag)?.is_none());

        let record = store.put(&manifest("demo-service", "v1"), bundle.path())?;
        assert_eq!(record.tag, tag);
        assert!(record.path.join("files").join("service_vars.json").is_file());

        let fetched = store.get(&tag)?.unwrap();
        assert_eq!(fetched.manifest, record.manifest);

        store.delete(&tag)?;
        assert!(store.get(&tag)?.is_none());
        Ok(())
    }

    #[test]
    fn put_replaces_existing_record() -> LlmBundlerResult<()> {
        let (_tmp, store) = store();
        let bundle = bundle_dir();
        let tag = PackageTag::from_taglike("demo-service:v1")?;

        store.put(&manifest("demo-service", "v1"), bundle.path())?;
        let mut second = manifest("demo-service", "v1");
        second.description = "rebuilt".to_string();
        store.put(&second, bundle.path())?;

        let fetched = store.get(&tag)?.unwrap();
        assert_eq!(fetched.manifest.description, "rebuilt");
        Ok(())
    }

    #[test]
    fn delete_missing_record_is_an_error() -> LlmBundlerResult<()> {
        let (_tmp, store) = store();
        let tag = PackageTag::from_taglike("ghost-service:v1")?;
        assert!(store.delete(&tag).is_err());
        Ok(())
    }
}
