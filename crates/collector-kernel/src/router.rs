use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use collector_control::{
    parse_instance_urls, AccessGuard, ApplicationEntry, ApplicationRegistry, AuditEvent, AuditSink,
    CollectorSettings, HistorySink,
};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregator::ReportAggregator;
use crate::client::RemoteInstanceClient;
use crate::dispatcher::ActionDispatcher;
use crate::error::CollectorError;
use crate::scheduler::CollectionScheduler;
use crate::settings::SharedSettings;
use crate::types::{
    Action, ActionReport, ActionRequest, ActionTarget, MergedReport, PartSelector, ReportPart,
    ReportRequest, TargetKind,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RequestMethod {
    Get,
    Post,
}

#[derive(Clone, Debug)]
pub struct CollectorRequest {
    pub method: RequestMethod,
    pub remote_addr: Option<String>,
    pub params: HashMap<String, String>,
}

impl CollectorRequest {
    pub fn new(method: RequestMethod, remote_addr: Option<&str>) -> Self {
        Self {
            method,
            remote_addr: remote_addr.map(str::to_string),
            params: HashMap::new(),
        }
    }

    pub fn with_param(mut self, name: &str, value: &str) -> Self {
        self.params.insert(name.to_string(), value.to_string());
        self
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RequestFlow {
    Registration { name: String, urls: String },
    Report {
        application: Option<String>,
        request: ReportRequest,
    },
    Action(ActionRequest),
}

pub fn classify(request: &CollectorRequest) -> Result<RequestFlow, CollectorError> {
    let app_name = request.param("appName");
    let app_urls = request.param("appUrls");
    if request.method == RequestMethod::Post && (app_name.is_some() || app_urls.is_some()) {
        let name = app_name.ok_or_else(|| CollectorError::missing("appName"))?;
        let urls = app_urls.ok_or_else(|| CollectorError::missing("appUrls"))?;
        return Ok(RequestFlow::Registration {
            name: name.to_string(),
            urls: urls.to_string(),
        });
    }

    if let Some(raw_action) = request.param("action") {
        let action = Action::parse(raw_action)
            .ok_or_else(|| CollectorError::validation("action", format!("unknown action {raw_action}")))?;
        let application = request
            .param("application")
            .ok_or_else(|| CollectorError::missing("application"))?;
        let target = resolve_target(action, request)?;
        return Ok(RequestFlow::Action(ActionRequest {
            application: application.to_string(),
            action,
            target,
        }));
    }

    let raw_part = request.param("part");
    let part = ReportPart::parse(raw_part).ok_or_else(|| {
        CollectorError::validation("part", format!("unknown part {}", raw_part.unwrap_or_default()))
    })?;
    let selector = match part {
        ReportPart::Database => request
            .param("request")
            .map(|index| {
                index.parse::<u32>().map(PartSelector::RequestIndex).map_err(|_| {
                    CollectorError::validation("request", format!("not a query index: {index}"))
                })
            })
            .transpose()?,
        ReportPart::Sessions => request
            .param("sessionId")
            .map(|id| PartSelector::SessionId(id.to_string())),
        _ => None,
    };
    Ok(RequestFlow::Report {
        application: request.param("application").map(str::to_string),
        request: ReportRequest {
            part,
            selector,
            instance: request.param("instance").map(str::to_string),
        },
    })
}

fn resolve_target(action: Action, request: &CollectorRequest) -> Result<ActionTarget, CollectorError> {
    let Some(kind) = action.required_target() else {
        return Ok(ActionTarget::None);
    };
    let field = kind.param_name();
    let value = request.param(field).ok_or_else(|| CollectorError::missing(field))?;
    if value.eq_ignore_ascii_case("all") {
        if kind.accepts_all() {
            return Ok(ActionTarget::All);
        }
        return Err(CollectorError::validation(field, "`all` is not accepted here"));
    }
    let id = value.to_string();
    Ok(match kind {
        TargetKind::Counter => ActionTarget::Counter(id),
        TargetKind::Session => ActionTarget::Session(id),
        TargetKind::Thread => ActionTarget::Thread(id),
        TargetKind::Job => ActionTarget::Job(id),
    })
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct LocalSummary {
    pub applications: Vec<String>,
    pub uptime_ms: u64,
    pub version: &'static str,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum CollectorResponse {
    Registered(ApplicationEntry),
    Report(MergedReport),
    Action(ActionReport),
    Local(LocalSummary),
}

pub struct Collector {
    registry: Arc<dyn ApplicationRegistry>,
    history: Arc<dyn HistorySink>,
    audit: Arc<dyn AuditSink>,
    settings: SharedSettings,
    aggregator: ReportAggregator,
    dispatcher: ActionDispatcher,
    scheduler: Mutex<Option<CollectionScheduler>>,
    started_at: Instant,
}

impl Collector {
    pub fn new(
        settings: CollectorSettings,
        registry: Arc<dyn ApplicationRegistry>,
        client: Arc<dyn RemoteInstanceClient>,
        history: Arc<dyn HistorySink>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let settings = SharedSettings::new(settings);
        let aggregator =
            ReportAggregator::new(registry.clone(), client.clone(), history.clone(), settings.clone());
        let dispatcher =
            ActionDispatcher::new(registry.clone(), client, history.clone(), settings.clone());
        Self {
            registry,
            history,
            audit,
            settings,
            aggregator,
            dispatcher,
            scheduler: Mutex::new(None),
            started_at: Instant::now(),
        }
    }

    pub fn registry(&self) -> &Arc<dyn ApplicationRegistry> {
        &self.registry
    }

    pub fn audit(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }

    pub fn aggregator(&self) -> &ReportAggregator {
        &self.aggregator
    }

    pub fn settings(&self) -> Arc<CollectorSettings> {
        self.settings.current()
    }

    pub fn reload(&self, settings: CollectorSettings) {
        info!(
            pattern = settings
                .allowed_addr_pattern
                .as_ref()
                .map(|pattern| pattern.as_str())
                .unwrap_or(""),
            "collector settings reloaded"
        );
        self.history.set_capacity(settings.history_limit);
        self.settings.replace(settings);
    }

    pub fn start(&self) {
        let Some(interval) = self.settings.current().resolution else {
            return;
        };
        let mut scheduler = self.scheduler.lock();
        if scheduler.is_some() {
            return;
        }
        *scheduler = Some(CollectionScheduler::start(
            self.aggregator.clone(),
            self.registry.clone(),
            self.history.clone(),
            interval,
        ));
    }

    pub fn is_collecting(&self) -> bool {
        self.scheduler.lock().is_some()
    }

    pub fn shutdown(&self) {
        if let Some(scheduler) = self.scheduler.lock().take() {
            scheduler.stop();
        }
    }

    pub fn admit(&self, remote_addr: Option<&str>) -> Result<(), CollectorError> {
        let settings = self.settings.current();
        let decision = AccessGuard::evaluate(remote_addr, settings.allowed_addr_pattern.as_ref());
        if decision.allowed {
            return Ok(());
        }
        let address = remote_addr.unwrap_or("unknown").to_string();
        warn!(
            remote_addr = %address,
            pattern = decision.pattern.as_deref().unwrap_or(""),
            "request denied"
        );
        Err(CollectorError::AccessDenied { address })
    }

    pub async fn handle(&self, request: CollectorRequest) -> Result<CollectorResponse, CollectorError> {
        self.admit(request.remote_addr.as_deref())?;
        self.handle_admitted(request).await
    }

    pub async fn handle_admitted(
        &self,
        request: CollectorRequest,
    ) -> Result<CollectorResponse, CollectorError> {
        let request_id = Uuid::new_v4().to_string();
        let settings = self.settings.current();

        let flow = classify(&request)?;
        if settings.log_requests {
            info!(request_id = %request_id, remote_addr = ?request.remote_addr, flow = ?flow, "collector request");
        } else {
            debug!(request_id = %request_id, flow = ?flow, "collector request");
        }

        match flow {
            RequestFlow::Registration { name, urls } => {
                let urls = parse_instance_urls(&urls)?;
                let entry = self.registry.register(&name, urls)?;
                info!(application = %entry.name, instances = entry.instance_urls.len(), "application registered");
                self.audit.record(AuditEvent::new(
                    request_id,
                    entry.name.clone(),
                    "register",
                    entry.instance_urls.join(","),
                    request.remote_addr,
                ));
                Ok(CollectorResponse::Registered(entry))
            }
            RequestFlow::Report {
                application,
                request: report_request,
            } => {
                let application = application.or_else(|| self.registry.list_names().into_iter().next());
                let Some(application) = application else {
                    return Ok(CollectorResponse::Local(self.local_summary()));
                };
                let report = self.aggregator.build_report(&application, &report_request).await?;
                Ok(CollectorResponse::Report(report))
            }
            RequestFlow::Action(action_request) => {
                let result = self.dispatcher.dispatch(&action_request).await;
                let detail = match &result {
                    Ok(report) => report.detail.clone(),
                    Err(err) => err.to_string(),
                };
                self.audit.record(AuditEvent::new(
                    request_id,
                    action_request.application.clone(),
                    action_request.action.as_str(),
                    detail,
                    request.remote_addr,
                ));
                Ok(CollectorResponse::Action(result?))
            }
        }
    }

    fn local_summary(&self) -> LocalSummary {
        LocalSummary {
            applications: self.registry.list_names(),
            uptime_ms: self.started_at.elapsed().as_millis() as u64,
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.shutdown();
    }
}
