use std::sync::Arc;

use collector_control::{ApplicationEntry, ApplicationRegistry, HistorySink};
use tracing::{debug, warn};

use crate::client::RemoteInstanceClient;
use crate::error::CollectorError;
use crate::fanout::scatter;
use crate::settings::SharedSettings;
use crate::types::{
    Fragment, InstanceOutcome, MergedReport, PartScope, ReportPart, ReportRequest, TaggedItem,
};

#[derive(Clone)]
pub struct ReportAggregator {
    registry: Arc<dyn ApplicationRegistry>,
    client: Arc<dyn RemoteInstanceClient>,
    history: Arc<dyn HistorySink>,
    settings: SharedSettings,
}

impl ReportAggregator {
    pub fn new(
        registry: Arc<dyn ApplicationRegistry>,
        client: Arc<dyn RemoteInstanceClient>,
        history: Arc<dyn HistorySink>,
        settings: SharedSettings,
    ) -> Self {
        Self {
            registry,
            client,
            history,
            settings,
        }
    }

    pub async fn build_report(
        &self,
        application: &str,
        request: &ReportRequest,
    ) -> Result<MergedReport, CollectorError> {
        let entry = self.registry.lookup(application)?;
        let settings = self.settings.current();
        let targets = select_targets(&entry, request)?;
        debug!(
            application = %application,
            part = request.part.as_str(),
            instances = targets.len(),
            "collecting report part"
        );

        let timeout = settings.timeout;
        let outcomes = scatter(&targets, timeout, |url| {
            let client = self.client.clone();
            let request = request.clone();
            async move { client.fetch_part(&url, &request, timeout).await }
        })
        .await;

        let mut report = merge(application, request.part, outcomes)?;
        if request.part == ReportPart::Main {
            report.history = self.history.recent(application, settings.history_limit);
        }
        Ok(report)
    }
}

fn select_targets(
    entry: &ApplicationEntry,
    request: &ReportRequest,
) -> Result<Vec<String>, CollectorError> {
    if let Some(selected) = &request.instance {
        let wanted = selected.trim().trim_end_matches('/');
        return entry
            .instance_urls
            .iter()
            .find(|url| url.trim_end_matches('/') == wanted)
            .map(|url| vec![url.clone()])
            .ok_or_else(|| {
                CollectorError::TargetNotFound(format!(
                    "instance {selected} is not registered for {}",
                    entry.name
                ))
            });
    }
    match request.part.scope() {
        PartScope::Cluster => Ok(entry.instance_urls.clone()),
        PartScope::FirstInstance => Ok(entry.instance_urls.iter().take(1).cloned().collect()),
    }
}

fn merge(
    application: &str,
    part: ReportPart,
    outcomes: Vec<(String, InstanceOutcome<Fragment>)>,
) -> Result<MergedReport, CollectorError> {
    let mut responded = Vec::new();
    let mut items = Vec::new();
    let mut degraded = Vec::new();

    for (instance, outcome) in outcomes {
        match outcome {
            Ok(Fragment::Structured(serde_json::Value::Array(values))) => {
                items.extend(values.into_iter().map(|value| TaggedItem {
                    instance: instance.clone(),
                    item: Fragment::Structured(value),
                }));
                responded.push(instance);
            }
            Ok(fragment) => {
                items.push(TaggedItem {
                    instance: instance.clone(),
                    item: fragment,
                });
                responded.push(instance);
            }
            Err(failure) => {
                warn!(
                    application = %application,
                    instance = %failure.url,
                    part = part.as_str(),
                    kind = ?failure.kind,
                    error = %failure.detail,
                    "instance degraded"
                );
                degraded.push(failure);
            }
        }
    }

    if responded.is_empty() {
        return Err(CollectorError::AllInstancesUnreachable {
            application: application.to_string(),
            failures: degraded,
        });
    }

    Ok(MergedReport {
        application: application.to_string(),
        part,
        responded,
        items,
        degraded,
        history: Vec::new(),
    })
}
