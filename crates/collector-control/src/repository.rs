use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::ApplicationEntry;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("repository error: {0}")]
    Store(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

pub trait ApplicationRepository: Send + Sync {
    fn load(&self) -> Result<Vec<ApplicationEntry>, RepositoryError>;
    fn save(&self, entries: &[ApplicationEntry]) -> Result<(), RepositoryError>;
}

#[derive(Clone, Default)]
pub struct InMemoryApplicationRepository {
    entries: Arc<RwLock<Vec<ApplicationEntry>>>,
}

impl InMemoryApplicationRepository {
    pub fn new(entries: Vec<ApplicationEntry>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    pub fn shared(entries: Vec<ApplicationEntry>) -> Arc<Self> {
        Arc::new(Self::new(entries))
    }
}

impl ApplicationRepository for InMemoryApplicationRepository {
    fn load(&self) -> Result<Vec<ApplicationEntry>, RepositoryError> {
        Ok(self.entries.read().clone())
    }

    fn save(&self, entries: &[ApplicationEntry]) -> Result<(), RepositoryError> {
        *self.entries.write() = entries.to_vec();
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Default)]
struct ApplicationsFile {
    applications: Vec<ApplicationEntry>,
}

#[derive(Clone, Debug)]
pub struct FileApplicationRepository {
    path: PathBuf,
}

impl FileApplicationRepository {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ApplicationRepository for FileApplicationRepository {
    fn load(&self) -> Result<Vec<ApplicationEntry>, RepositoryError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read(&self.path).map_err(|err| RepositoryError::Store(err.to_string()))?;
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        let file: ApplicationsFile = serde_json::from_slice(&raw)
            .map_err(|err| RepositoryError::Serialization(err.to_string()))?;
        Ok(file.applications)
    }

    fn save(&self, entries: &[ApplicationEntry]) -> Result<(), RepositoryError> {
        let file = ApplicationsFile {
            applications: entries.to_vec(),
        };
        let payload = serde_json::to_vec_pretty(&file)
            .map_err(|err| RepositoryError::Serialization(err.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, payload).map_err(|err| RepositoryError::Store(err.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|err| RepositoryError::Store(err.to_string()))?;
        Ok(())
    }
}
