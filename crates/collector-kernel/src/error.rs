use collector_control::{ConfigError, RegistryError};
use thiserror::Error;

use crate::types::InstanceFailure;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("access denied for {address}")]
    AccessDenied { address: String },
    #[error("application not found: {0}")]
    ApplicationNotFound(String),
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },
    #[error("all instances of {application} are unreachable")]
    AllInstancesUnreachable {
        application: String,
        failures: Vec<InstanceFailure>,
    },
    #[error("target not found: {0}")]
    TargetNotFound(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl CollectorError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn missing(field: &'static str) -> Self {
        Self::validation(field, "missing parameter")
    }
}

impl From<RegistryError> for CollectorError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(name) => CollectorError::ApplicationNotFound(name),
            other => CollectorError::validation(other.field(), other.to_string()),
        }
    }
}
