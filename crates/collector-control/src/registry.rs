use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::repository::{ApplicationRepository, RepositoryError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationEntry {
    pub name: String,
    pub instance_urls: Vec<String>,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("application name is required")]
    MissingName,
    #[error("at least one instance url is required")]
    EmptyUrls,
    #[error("invalid instance url {0}: {1}")]
    InvalidUrl(String, String),
    #[error("application not found: {0}")]
    NotFound(String),
}

impl RegistryError {
    pub fn field(&self) -> &'static str {
        match self {
            RegistryError::MissingName => "appName",
            RegistryError::EmptyUrls | RegistryError::InvalidUrl(_, _) => "appUrls",
            RegistryError::NotFound(_) => "application",
        }
    }
}

pub fn parse_instance_urls(raw: &str) -> Result<Vec<String>, RegistryError> {
    let urls: Vec<String> = raw
        .split([',', ';'])
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect();
    validate_urls(&urls)?;
    Ok(urls)
}

fn validate_urls(urls: &[String]) -> Result<(), RegistryError> {
    if urls.is_empty() {
        return Err(RegistryError::EmptyUrls);
    }
    for raw in urls {
        let parsed =
            Url::parse(raw).map_err(|err| RegistryError::InvalidUrl(raw.clone(), err.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RegistryError::InvalidUrl(
                raw.clone(),
                "only http and https are accepted".to_string(),
            ));
        }
        if parsed.host_str().is_none() {
            return Err(RegistryError::InvalidUrl(raw.clone(), "missing host".to_string()));
        }
    }
    Ok(())
}

pub trait ApplicationRegistry: Send + Sync {
    fn register(&self, name: &str, urls: Vec<String>) -> Result<ApplicationEntry, RegistryError>;
    fn remove(&self, name: &str) -> bool;
    fn lookup(&self, name: &str) -> Result<Arc<ApplicationEntry>, RegistryError>;
    fn list_names(&self) -> Vec<String>;
    fn entries(&self) -> Vec<ApplicationEntry>;
}

type Entries = Arc<DashMap<String, Arc<ApplicationEntry>>>;

enum PersistCommand {
    Save,
    Flush(mpsc::Sender<()>),
}

struct RegistryWriter {
    commands: mpsc::Sender<PersistCommand>,
    handle: JoinHandle<()>,
}

impl RegistryWriter {
    fn spawn(
        entries: Entries,
        repository: Arc<dyn ApplicationRepository>,
    ) -> Result<Self, RepositoryError> {
        let (commands, pending) = mpsc::channel::<PersistCommand>();
        let handle = thread::Builder::new()
            .name("registry-writer".to_string())
            .spawn(move || {
                while let Ok(first) = pending.recv() {
                    let mut waiters = Vec::new();
                    let mut next = Some(first);
                    while let Some(command) = next {
                        if let PersistCommand::Flush(done) = command {
                            waiters.push(done);
                        }
                        next = pending.try_recv().ok();
                    }
                    if let Err(err) = repository.save(&snapshot(&entries)) {
                        warn!(error = %err, "failed to persist registered applications");
                    }
                    for done in waiters {
                        let _ = done.send(());
                    }
                }
            })
            .map_err(|err| RepositoryError::Store(err.to_string()))?;
        Ok(Self { commands, handle })
    }
}

fn snapshot(entries: &DashMap<String, Arc<ApplicationEntry>>) -> Vec<ApplicationEntry> {
    let mut entries: Vec<ApplicationEntry> = entries
        .iter()
        .map(|entry| entry.value().as_ref().clone())
        .collect();
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    entries
}

pub struct InMemoryApplicationRegistry {
    entries: Entries,
    writer: Option<RegistryWriter>,
}

impl InMemoryApplicationRegistry {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            writer: None,
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn with_repository(
        repository: Arc<dyn ApplicationRepository>,
    ) -> Result<Self, RepositoryError> {
        let stored = repository.load()?;
        let entries: Entries = Arc::new(DashMap::new());
        for entry in stored {
            if entry.name.trim().is_empty() || validate_urls(&entry.instance_urls).is_err() {
                warn!(application = %entry.name, "skipping invalid stored application");
                continue;
            }
            entries.insert(entry.name.clone(), Arc::new(entry));
        }
        info!(count = entries.len(), "loaded registered applications");
        let writer = RegistryWriter::spawn(entries.clone(), repository)?;
        Ok(Self {
            entries,
            writer: Some(writer),
        })
    }

    pub fn flush(&self) {
        let Some(writer) = &self.writer else {
            return;
        };
        let (done, saved) = mpsc::channel();
        if writer.commands.send(PersistCommand::Flush(done)).is_ok() {
            let _ = saved.recv();
        }
    }

    fn schedule_save(&self) {
        if let Some(writer) = &self.writer {
            if writer.commands.send(PersistCommand::Save).is_err() {
                warn!("registry writer stopped, change not persisted");
            }
        }
    }
}

impl Default for InMemoryApplicationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InMemoryApplicationRegistry {
    fn drop(&mut self) {
        if let Some(RegistryWriter { commands, handle }) = self.writer.take() {
            drop(commands);
            let _ = handle.join();
        }
    }
}

impl ApplicationRegistry for InMemoryApplicationRegistry {
    fn register(&self, name: &str, urls: Vec<String>) -> Result<ApplicationEntry, RegistryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RegistryError::MissingName);
        }
        validate_urls(&urls)?;
        let entry = ApplicationEntry {
            name: name.to_string(),
            instance_urls: urls,
        };
        self.entries.insert(entry.name.clone(), Arc::new(entry.clone()));
        self.schedule_save();
        Ok(entry)
    }

    fn remove(&self, name: &str) -> bool {
        let removed = self.entries.remove(name).is_some();
        if removed {
            self.schedule_save();
        }
        removed
    }

    fn lookup(&self, name: &str) -> Result<Arc<ApplicationEntry>, RegistryError> {
        self.entries
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    fn entries(&self) -> Vec<ApplicationEntry> {
        snapshot(&self.entries)
    }
}
