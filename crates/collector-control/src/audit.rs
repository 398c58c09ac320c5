use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEvent {
    pub request_id: String,
    pub application: String,
    pub operation: String,
    pub detail: String,
    pub remote_addr: Option<String>,
    pub timestamp_ms: u64,
}

impl AuditEvent {
    pub fn new(
        request_id: impl Into<String>,
        application: impl Into<String>,
        operation: impl Into<String>,
        detail: impl Into<String>,
        remote_addr: Option<String>,
    ) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            request_id: request_id.into(),
            application: application.into(),
            operation: operation.into(),
            detail: detail.into(),
            remote_addr,
            timestamp_ms,
        }
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
    fn list(&self) -> Vec<AuditEvent>;
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }

    fn list(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }
}
