use std::sync::Arc;

use collector_control::{ApplicationRegistry, HistorySink};
use tracing::{info, warn};

use crate::client::RemoteInstanceClient;
use crate::error::CollectorError;
use crate::fanout::{scatter, spawn_bounded};
use crate::settings::SharedSettings;
use crate::types::{
    ActionReply, ActionReport, ActionRequest, Delivery, InstanceAck, InstanceFailure,
};

#[derive(Clone)]
pub struct ActionDispatcher {
    registry: Arc<dyn ApplicationRegistry>,
    client: Arc<dyn RemoteInstanceClient>,
    history: Arc<dyn HistorySink>,
    settings: SharedSettings,
}

impl ActionDispatcher {
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

    pub async fn dispatch(&self, request: &ActionRequest) -> Result<ActionReport, CollectorError> {
        match request.action.delivery() {
            Delivery::Registry => Ok(self.remove_application(request)),
            Delivery::Broadcast => self.broadcast(request).await,
            Delivery::FirstOwner => self.first_owner(request).await,
        }
    }

    fn remove_application(&self, request: &ActionRequest) -> ActionReport {
        let removed = self.registry.remove(&request.application);
        let detail = if removed {
            self.history.forget(&request.application);
            info!(application = %request.application, "application removed");
            "application removed"
        } else {
            "application not registered"
        };
        empty_report(request, detail)
    }

    async fn broadcast(&self, request: &ActionRequest) -> Result<ActionReport, CollectorError> {
        let entry = self.registry.lookup(&request.application)?;
        let timeout = self.settings.current().timeout;

        let outcomes = scatter(&entry.instance_urls, timeout, |url| {
            let client = self.client.clone();
            let request = request.clone();
            async move { client.invoke_action(&url, &request, timeout).await }
        })
        .await;

        let mut report = empty_report(request, "");
        for (instance, outcome) in outcomes {
            match outcome {
                Ok(ActionReply::Acknowledged(message)) => {
                    report.acknowledged.push(InstanceAck { instance, message })
                }
                Ok(ActionReply::NotOwned) => report.unowned.push(instance),
                Err(failure) => {
                    log_failure(request, &failure);
                    report.degraded.push(failure);
                }
            }
        }

        if report.acknowledged.is_empty() && report.unowned.is_empty() {
            return Err(CollectorError::AllInstancesUnreachable {
                application: request.application.clone(),
                failures: report.degraded,
            });
        }
        if report.acknowledged.is_empty() {
            return Err(CollectorError::TargetNotFound(format!(
                "{:?} is not known by any instance of {}",
                request.target, request.application
            )));
        }
        report.detail = format!(
            "{} of {} instances acknowledged",
            report.acknowledged.len(),
            entry.instance_urls.len()
        );
        Ok(report)
    }

    async fn first_owner(&self, request: &ActionRequest) -> Result<ActionReport, CollectorError> {
        let entry = self.registry.lookup(&request.application)?;
        let timeout = self.settings.current().timeout;
        let mut report = empty_report(request, "");

        for url in &entry.instance_urls {
            let client = self.client.clone();
            let call_request = request.clone();
            let call_url = url.clone();
            let outcome = spawn_bounded(url.clone(), timeout, async move {
                client.invoke_action(&call_url, &call_request, timeout).await
            })
            .await;
            match outcome {
                Ok(ActionReply::Acknowledged(message)) => {
                    report.acknowledged.push(InstanceAck {
                        instance: url.clone(),
                        message,
                    });
                    report.detail = format!("handled by {url}");
                    return Ok(report);
                }
                Ok(ActionReply::NotOwned) => report.unowned.push(url.clone()),
                Err(failure) => {
                    log_failure(request, &failure);
                    report.degraded.push(failure);
                }
            }
        }

        if report.unowned.is_empty() {
            return Err(CollectorError::AllInstancesUnreachable {
                application: request.application.clone(),
                failures: report.degraded,
            });
        }
        Err(CollectorError::TargetNotFound(format!(
            "{:?} is not owned by any instance of {}",
            request.target, request.application
        )))
    }
}

fn empty_report(request: &ActionRequest, detail: &str) -> ActionReport {
    ActionReport {
        application: request.application.clone(),
        action: request.action,
        target: request.target.clone(),
        acknowledged: Vec::new(),
        unowned: Vec::new(),
        degraded: Vec::new(),
        detail: detail.to_string(),
    }
}

fn log_failure(request: &ActionRequest, failure: &InstanceFailure) {
    warn!(
        application = %request.application,
        action = request.action.as_str(),
        instance = %failure.url,
        kind = ?failure.kind,
        error = %failure.detail,
        "action failed on instance"
    );
}
