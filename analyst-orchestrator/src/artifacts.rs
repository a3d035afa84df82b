//! Artifact storage for plans, generated code and execution logs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::debug;

/// Errors from artifact storage
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("Output location unavailable: {0}")]
    Unavailable(String),
}

/// Named artifacts in the output directory, plus read access to the fixed
/// summary scripts
pub trait ArtifactStore: Send + Sync {
    /// Make sure the output location exists
    fn prepare(&self) -> Result<(), ArtifactError>;

    /// Write (or overwrite) a named artifact
    fn write(&self, name: &str, content: &str) -> Result<(), ArtifactError>;

    /// Read a named artifact
    fn read(&self, name: &str) -> Result<String, ArtifactError>;

    /// Read a script from outside the output directory
    fn load_script(&self, path: &Path) -> Result<String, ArtifactError>;
}

/// Artifacts as files under a root directory
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn io_error(path: &Path, source: std::io::Error) -> ArtifactError {
        if source.kind() == std::io::ErrorKind::NotFound {
            ArtifactError::NotFound(path.display().to_string())
        } else {
            ArtifactError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

impl ArtifactStore for FsArtifactStore {
    fn prepare(&self) -> Result<(), ArtifactError> {
        std::fs::create_dir_all(&self.root).map_err(|e| ArtifactError::Io {
            path: self.root.clone(),
            source: e,
        })
    }

    fn write(&self, name: &str, content: &str) -> Result<(), ArtifactError> {
        let path = self.root.join(name);
        std::fs::write(&path, content).map_err(|e| Self::io_error(&path, e))?;
        debug!(path = ?path, bytes = content.len(), "Artifact written");
        Ok(())
    }

    fn read(&self, name: &str) -> Result<String, ArtifactError> {
        let path = self.root.join(name);
        std::fs::read_to_string(&path).map_err(|e| Self::io_error(&path, e))
    }

    fn load_script(&self, path: &Path) -> Result<String, ArtifactError> {
        std::fs::read_to_string(path).map_err(|e| Self::io_error(path, e))
    }
}

/// In-memory store for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    artifacts: Mutex<HashMap<String, String>>,
    scripts: HashMap<PathBuf, String>,
    unavailable: bool,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a script readable through [`ArtifactStore::load_script`]
    pub fn with_script(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.scripts.insert(path.into(), content.into());
        self
    }

    /// Make [`ArtifactStore::prepare`] fail
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Current content of an artifact
    pub fn get(&self, name: &str) -> Option<String> {
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Names of all written artifacts, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn prepare(&self) -> Result<(), ArtifactError> {
        if self.unavailable {
            return Err(ArtifactError::Unavailable("memory store marked unavailable".to_string()));
        }
        Ok(())
    }

    fn write(&self, name: &str, content: &str) -> Result<(), ArtifactError> {
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), content.to_string());
        Ok(())
    }

    fn read(&self, name: &str) -> Result<String, ArtifactError> {
        self.get(name)
            .ok_or_else(|| ArtifactError::NotFound(name.to_string()))
    }

    fn load_script(&self, path: &Path) -> Result<String, ArtifactError> {
        self.scripts
            .get(path)
            .cloned()
            .ok_or_else(|| ArtifactError::NotFound(path.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_store_roundtrip_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path().join("output"));
        store.prepare().unwrap();

        store.write("cleaning_code.py", "print(1)").unwrap();
        store.write("cleaning_code.py", "print(2)").unwrap();
        assert_eq!(store.read("cleaning_code.py").unwrap(), "print(2)");
        assert!(matches!(
            store.read("analysis_plan.md"),
            Err(ArtifactError::NotFound(_))
        ));
    }

    #[test]
    fn test_fs_store_prepare_fails_under_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let store = FsArtifactStore::new(blocker.join("output"));
        assert!(matches!(store.prepare(), Err(ArtifactError::Io { .. })));
    }

    #[test]
    fn test_fs_store_load_script() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("summary.py");
        std::fs::write(&script, "print('summary')").unwrap();

        let store = FsArtifactStore::new(dir.path());
        assert_eq!(store.load_script(&script).unwrap(), "print('summary')");
        assert!(store.load_script(&dir.path().join("missing.py")).is_err());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryArtifactStore::new().with_script("/scripts/a.py", "print('a')");
        store.prepare().unwrap();
        store.write("trends_plan.md", "1. look").unwrap();

        assert_eq!(store.read("trends_plan.md").unwrap(), "1. look");
        assert_eq!(store.names(), vec!["trends_plan.md".to_string()]);
        assert_eq!(
            store.load_script(Path::new("/scripts/a.py")).unwrap(),
            "print('a')"
        );
        assert!(MemoryArtifactStore::new().unavailable().prepare().is_err());
    }
}
