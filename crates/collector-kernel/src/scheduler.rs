use std::sync::Arc;
use std::time::{Duration, Instant};

use collector_control::{ApplicationRegistry, HistorySink, MetricPoint};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::aggregator::ReportAggregator;
use crate::error::CollectorError;
use crate::types::ReportRequest;

pub struct CollectionScheduler {
    handle: JoinHandle<()>,
}

impl CollectionScheduler {
    pub fn start(
        aggregator: ReportAggregator,
        registry: Arc<dyn ApplicationRegistry>,
        history: Arc<dyn HistorySink>,
        interval: Duration,
    ) -> Self {
        info!(interval_ms = interval.as_millis() as u64, "periodic collection started");
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                collect_all(&aggregator, registry.as_ref(), history.as_ref()).await;
            }
        });
        Self { handle }
    }

    pub fn stop(self) {
        self.handle.abort();
        info!("periodic collection stopped");
    }
}

pub async fn collect_all(
    aggregator: &ReportAggregator,
    registry: &dyn ApplicationRegistry,
    history: &dyn HistorySink,
) {
    for application in registry.list_names() {
        let start = Instant::now();
        let (up, down) = match aggregator.build_report(&application, &ReportRequest::main()).await {
            Ok(report) => (report.responded.len(), report.degraded.len()),
            Err(CollectorError::AllInstancesUnreachable { failures, .. }) => (0, failures.len()),
            Err(err) => {
                debug!(application = %application, error = %err, "collection skipped");
                continue;
            }
        };
        let elapsed_ms = start.elapsed().as_millis() as f64;
        history.write(MetricPoint::for_application("instances_up", &application, up as f64));
        history.write(MetricPoint::for_application("instances_down", &application, down as f64));
        history.write(MetricPoint::for_application("collect_duration_ms", &application, elapsed_ms));
        debug!(application = %application, up, down, "collection round done");
    }
}
