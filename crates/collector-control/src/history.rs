use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub name: String,
    pub value: f64,
    pub timestamp_ms: u64,
    pub tags: BTreeMap<String, String>,
}

impl MetricPoint {
    pub fn now(name: impl Into<String>, value: f64, tags: BTreeMap<String, String>) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self::with_timestamp_ms(name, value, tags, timestamp_ms)
    }

    pub fn with_timestamp_ms(
        name: impl Into<String>,
        value: f64,
        tags: BTreeMap<String, String>,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            name: name.into(),
            value,
            timestamp_ms,
            tags,
        }
    }

    pub fn for_application(name: &str, application: &str, value: f64) -> Self {
        let tags = BTreeMap::from([("application".to_string(), application.to_string())]);
        Self::now(name, value, tags)
    }

    pub fn application(&self) -> Option<&str> {
        self.tags.get("application").map(String::as_str)
    }
}

pub trait HistorySink: Send + Sync {
    fn write(&self, point: MetricPoint);
    fn recent(&self, application: &str, limit: usize) -> Vec<MetricPoint>;
    fn forget(&self, application: &str);
    fn set_capacity(&self, per_application: usize);
}

#[derive(Clone)]
pub struct InMemoryHistorySink {
    capacity: Arc<AtomicUsize>,
    points: Arc<Mutex<HashMap<String, VecDeque<MetricPoint>>>>,
}

impl InMemoryHistorySink {
    pub fn new(per_application: usize) -> Self {
        Self {
            capacity: Arc::new(AtomicUsize::new(per_application.max(1))),
            points: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn shared(per_application: usize) -> Arc<Self> {
        Arc::new(Self::new(per_application))
    }

    pub fn len(&self) -> usize {
        self.points.lock().values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HistorySink for InMemoryHistorySink {
    fn write(&self, point: MetricPoint) {
        let capacity = self.capacity.load(Ordering::Relaxed);
        let key = point.application().unwrap_or_default().to_string();
        let mut points = self.points.lock();
        let ring = points.entry(key).or_default();
        ring.push_back(point);
        while ring.len() > capacity {
            ring.pop_front();
        }
    }

    fn recent(&self, application: &str, limit: usize) -> Vec<MetricPoint> {
        let points = self.points.lock();
        let Some(ring) = points.get(application) else {
            return Vec::new();
        };
        ring.iter().skip(ring.len().saturating_sub(limit)).cloned().collect()
    }

    fn forget(&self, application: &str) {
        self.points.lock().remove(application);
    }

    fn set_capacity(&self, per_application: usize) {
        let capacity = per_application.max(1);
        self.capacity.store(capacity, Ordering::Relaxed);
        for ring in self.points.lock().values_mut() {
            while ring.len() > capacity {
                ring.pop_front();
            }
        }
    }
}
