use std::path::{Path, PathBuf};
use std::sync::Arc;

use collector_control::{
    ApplicationRegistry, CollectorSettings, FileApplicationRepository, InMemoryApplicationRegistry,
    InMemoryAuditSink, InMemoryHistorySink, SystemConfig, SystemConfigLoader,
};
use collector_kernel::{Collector, HttpInstanceClient, HttpInstanceClientConfig};
use tracing::info;

use crate::error::AppError;

pub struct AppState {
    pub config_path: PathBuf,
    pub collector: Collector,
}

impl AppState {
    pub fn new(config_path: PathBuf, collector: Collector) -> Self {
        Self {
            config_path,
            collector,
        }
    }
}

pub fn load_config(path: &Path) -> Result<SystemConfig, AppError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(SystemConfigLoader::from_str(&raw)?)
}

pub fn create_default_config(path: &Path) -> Result<String, AppError> {
    let content = default_config_template();
    std::fs::write(path, content.as_bytes())?;
    Ok(content)
}

pub fn default_config_template() -> String {
    let mut lines = Vec::new();
    lines.push("security = { allowed_addr_pattern = \"\" }");
    lines.push("collector = { timeout_ms = 10000, monitoring_path = \"/monitoring\", user_agent = \"monitoring-collector\", resolution_seconds = 60, history_limit = 120 }");
    lines.push("storage = { applications_path = \"applications.json\" }");
    lines.push("log = { requests = false }");
    format!("{}\n", lines.join("\n"))
}

pub fn build_collector(settings: CollectorSettings) -> Result<Collector, AppError> {
    let registry: Arc<dyn ApplicationRegistry> = match &settings.applications_path {
        Some(path) => {
            info!(path = %path, "registered applications persisted to file");
            let repository = Arc::new(FileApplicationRepository::new(path));
            Arc::new(InMemoryApplicationRegistry::with_repository(repository)?)
        }
        None => InMemoryApplicationRegistry::shared(),
    };
    let client = HttpInstanceClient::new(HttpInstanceClientConfig {
        monitoring_path: settings.monitoring_path.clone(),
        user_agent: settings.user_agent.clone(),
    })
    .map_err(|err| AppError::internal(format!("http client: {err}")))?;
    let history = InMemoryHistorySink::shared(settings.history_limit);
    let audit = InMemoryAuditSink::shared();
    Ok(Collector::new(settings, registry, Arc::new(client), history, audit))
}
