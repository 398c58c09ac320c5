use std::sync::Arc;

use collector_control::CollectorSettings;
use parking_lot::RwLock;

#[derive(Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<Arc<CollectorSettings>>>,
}

impl SharedSettings {
    pub fn new(settings: CollectorSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(settings))),
        }
    }

    pub fn current(&self) -> Arc<CollectorSettings> {
        self.inner.read().clone()
    }

    pub fn replace(&self, settings: CollectorSettings) {
        *self.inner.write() = Arc::new(settings);
    }
}
