//! Filesystem primitives
//! =====================
//!
//! Canonical-path newtypes plus the resolution of the tool's home directory.
//!
//! * [`ValidDir`] is *always* an existing, canonical directory (auto-created
//!   with `mkdir -p` semantics).
//! * [`ValidFile`] is *always* an existing regular file.
//! * [`BundlerHome`] locates the on-disk root that holds the model store, the
//!   package store, and log output. `LLM_BUNDLER_HOME` overrides the
//!   platform-specific project data directory.
//!
//! The invariants are established once in the constructors and hold for the
//! lifetime of the value, so every `&Path` borrowed from these wrappers can be
//! handed to the standard library without re-checking.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{LlmBundlerError, LlmBundlerResult};

/// Environment variable that overrides the default home directory.
pub const HOME_ENV_VAR: &str = "LLM_BUNDLER_HOME";

const PROJECT_ORG: &str = "llm-bundler";
const PROJECT_APP: &str = "llm_bundler";

/// A *canonical* path guaranteed to reference an **existing directory**.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct ValidDir(pub PathBuf);

impl ValidDir {
    /// Construct a `ValidDir`, creating the directory tree if it does not yet
    /// exist.
    pub fn new<P: AsRef<Path>>(p: P) -> LlmBundlerResult<Self> {
        let path = p.as_ref();

        let canonical = match path.canonicalize() {
            Ok(abs) => abs,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                std::fs::create_dir_all(path)
                    .map_err(|e| LlmBundlerError::file_system("create dir", path, e))?;
                path.canonicalize()
                    .map_err(|e| LlmBundlerError::file_system("canonicalise dir", path, e))?
            }
            Err(e) => return Err(LlmBundlerError::file_system("canonicalise dir", path, e)),
        };

        if !canonical.is_dir() {
            return Err(LlmBundlerError::file_system(
                "ValidDir is_dir failed",
                path,
                std::io::Error::from(ErrorKind::NotADirectory),
            ));
        }

        Ok(Self(canonical))
    }

    /// Every regular file below this directory, as sorted *relative* paths
    /// with `/` separators.
    pub fn files(&self) -> LlmBundlerResult<Vec<String>> {
        fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) -> LlmBundlerResult<()> {
            for entry in std::fs::read_dir(dir)
                .map_err(|e| LlmBundlerError::file_system("read dir", dir, e))?
            {
                let path = entry
                    .map_err(|e| LlmBundlerError::file_system("read dir entry", dir, e))?
                    .path();
                if path.is_dir() {
                    walk(root, &path, out)?;
                } else if let Ok(rel) = path.strip_prefix(root) {
                    out.push(rel.to_string_lossy().replace('\\', "/"));
                }
            }
            Ok(())
        }

        let mut out = Vec::new();
        walk(&self.0, &self.0, &mut out)?;
        out.sort();
        Ok(out)
    }

}

impl std::ops::Deref for ValidDir {
    type Target = Path;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for ValidDir {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl TryFrom<PathBuf> for ValidDir {
    type Error = LlmBundlerError;
    fn try_from(value: PathBuf) -> LlmBundlerResult<Self> {
        Self::new(value)
    }
}

impl<'a> TryFrom<&'a Path> for ValidDir {
    type Error = LlmBundlerError;
    fn try_from(value: &'a Path) -> LlmBundlerResult<Self> {
        Self::new(value)
    }
}

/// A *canonical* path guaranteed to reference an **existing regular file**.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct ValidFile(pub PathBuf);

impl ValidFile {
    pub fn new<P: AsRef<Path>>(p: P) -> LlmBundlerResult<Self> {
        let mut path = p.as_ref().to_path_buf();
        if !path.is_absolute() {
            path = std::env::current_dir()
                .map_err(|e| LlmBundlerError::file_system("get current dir", &path, e))?
                .join(path);
        }

        let meta = std::fs::metadata(&path)
            .map_err(|e| LlmBundlerError::file_system("fetch metadata", &path, e))?;
        if !meta.is_file() {
            return Err(LlmBundlerError::file_system(
                "ValidFile is_file failed",
                &path,
                std::io::Error::from(ErrorKind::InvalidInput),
            ));
        }

        Ok(Self(path))
    }
}

impl std::ops::Deref for ValidFile {
    type Target = Path;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for ValidFile {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

/// The tool's on-disk root.
///
/// ```text
/// <home>/
/// ├── models/    # cached model records
/// ├── bundles/   # persisted service packages
/// └── logs/      # rolling log files
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundlerHome {
    root: ValidDir,
}

impl BundlerHome {
    /// Resolve the home directory from [`HOME_ENV_VAR`] or the platform
    /// project data directory, creating it if missing.
    pub fn resolve() -> LlmBundlerResult<Self> {
        if let Some(raw) = std::env::var_os(HOME_ENV_VAR) {
            return Ok(Self {
                root: ValidDir::new(raw)?,
            });
        }
        let pd = directories::ProjectDirs::from("", PROJECT_ORG, PROJECT_APP).ok_or_else(|| {
            LlmBundlerError::file_system(
                "resolve project directory",
                PathBuf::from(PROJECT_APP),
                std::io::Error::new(ErrorKind::Unsupported, "unsupported platform"),
            )
        })?;
        Ok(Self {
            root: ValidDir::new(pd.data_dir())?,
        })
    }

    /// Use an explicit root instead of the resolved default.
    pub fn at(path: impl AsRef<Path>) -> LlmBundlerResult<Self> {
        Ok(Self {
            root: ValidDir::new(path)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn models_dir(&self) -> LlmBundlerResult<ValidDir> {
        ValidDir::new(self.root.join("models"))
    }

    pub fn bundles_dir(&self) -> LlmBundlerResult<ValidDir> {
        ValidDir::new(self.root.join("bundles"))
    }

    pub fn logs_dir(&self) -> LlmBundlerResult<ValidDir> {
        ValidDir::new(self.root.join("logs"))
    }
}

/// Recursively copy `src` into `dst` (created if missing).
pub fn copy_dir_all(src: &Path, dst: &Path) -> LlmBundlerResult<()> {
    std::fs::create_dir_all(dst).map_err(|e| LlmBundlerError::file_system("create dir", dst, e))?;
    for entry in
        std::fs::read_dir(src).map_err(|e| LlmBundlerError::file_system("read dir", src, e))?
    {
        let entry = entry.map_err(|e| LlmBundlerError::file_system("read dir entry", src, e))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if from.is_dir() {
            copy_dir_all(&from, &to)?;
        } else {
            std::fs::copy(&from, &to)
                .map_err(|e| LlmBundlerError::file_system("copy file", &from, e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_dir_creates_missing_tree() -> LlmBundlerResult<()> {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("a").join("b");
        assert!(!target.exists());

        let dir = ValidDir::new(&target)?;
        assert!(dir.exists());
        assert!(dir.is_absolute());
        Ok(())
    }

    #[test]
    fn valid_dir_rejects_file() {
        let tmp_file = tempfile::NamedTempFile::new().unwrap();
        let err = ValidDir::new(tmp_file.path()).unwrap_err();
        assert!(err.to_string().contains("ValidDir is_dir failed"), "{err}");
    }

    #[test]
    fn valid_dir_lists_files_relative_and_sorted() -> LlmBundlerResult<()> {
        let tmp = tempfile::tempdir().unwrap();
        let dir = ValidDir::new(tmp.path())?;
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::write(dir.join("zz.txt"), b"z").unwrap();
        std::fs::write(dir.join("nested").join("aa.txt"), b"a").unwrap();

        assert_eq!(dir.files()?, vec!["nested/aa.txt", "zz.txt"]);
        Ok(())
    }

    #[test]
    fn valid_file_rejects_dir_and_missing() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(ValidFile::new(tmp.path()).is_err());
        assert!(ValidFile::new(tmp.path().join("nope")).is_err());
    }

    #[test]
    fn home_layout_subdirs() -> LlmBundlerResult<()> {
        let tmp = tempfile::tempdir().unwrap();
        let home = BundlerHome::at(tmp.path())?;
        assert!(home.models_dir()?.ends_with("models"));
        assert!(home.bundles_dir()?.ends_with("bundles"));
        assert!(home.logs_dir()?.ends_with("logs"));
        Ok(())
    }

    #[test]
    fn copy_dir_all_copies_nested_tree() -> LlmBundlerResult<()> {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("sub")).unwrap();
        std::fs::write(src.path().join("sub").join("f.txt"), b"hi").unwrap();

        let target = dst.path().join("out");
        copy_dir_all(src.path(), &target)?;
        assert_eq!(
            std::fs::read_to_string(target.join("sub").join("f.txt")).unwrap(),
            "hi"
        );
        Ok(())
    }
}
