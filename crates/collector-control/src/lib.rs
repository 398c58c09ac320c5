pub mod access;
pub mod audit;
pub mod config;
pub mod history;
pub mod registry;
pub mod repository;
pub mod static_config;

pub use access::{AccessDecision, AccessGuard, AccessPattern};
pub use audit::{AuditEvent, AuditSink, InMemoryAuditSink};
pub use config::{CollectorSettings, ConfigError, SystemConfig, SystemConfigLoader};
pub use history::{HistorySink, InMemoryHistorySink, MetricPoint};
pub use registry::{
    parse_instance_urls, ApplicationEntry, ApplicationRegistry, InMemoryApplicationRegistry,
    RegistryError,
};
pub use repository::{
    ApplicationRepository, FileApplicationRepository, InMemoryApplicationRepository,
    RepositoryError,
};
