use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::info;

/// Filesystem home for finished transcripts, one JSON document per job key.
/// Writes go to a temp file in the same directory and are renamed into place,
/// so a crash mid-write never leaves a partial artifact visible.
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create artifact directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", key))
    }

    /// Writes the artifact and returns its path, for the job's `result` field.
    pub fn save(&self, key: &str, payload: &Value) -> Result<PathBuf> {
        let dest = self.path_for(key);
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(&serde_json::to_vec_pretty(payload)?)?;
        tmp.persist(&dest)
            .map_err(|e| e.error)
            .with_context(|| format!("failed to persist artifact {}", dest.display()))?;
        info!("Saved artifact for {} at {}", key, dest.display());
        Ok(dest)
    }

    pub fn load(&self, key: &str) -> Result<Value> {
        let path = self.path_for(key);
        let bytes = fs::read(&path)
            .with_context(|| format!("failed to read artifact {}", path.display()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn exists(&self, key: &str) -> bool {
        self.path_for(key).exists()
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove artifact {}", path.display()))?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
