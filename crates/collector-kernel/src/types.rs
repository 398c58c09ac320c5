use collector_control::MetricPoint;
use serde::Serialize;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportPart {
    Main,
    WebDescriptor,
    BuildDescriptor,
    CurrentRequests,
    Processes,
    Database,
    Connections,
    HeapHistogram,
    Sessions,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PartScope {
    Cluster,
    FirstInstance,
}

impl ReportPart {
    pub const ALL: [ReportPart; 9] = [
        ReportPart::Main,
        ReportPart::WebDescriptor,
        ReportPart::BuildDescriptor,
        ReportPart::CurrentRequests,
        ReportPart::Processes,
        ReportPart::Database,
        ReportPart::Connections,
        ReportPart::HeapHistogram,
        ReportPart::Sessions,
    ];

    pub fn parse(value: Option<&str>) -> Option<Self> {
        let value = match value.map(str::trim) {
            None | Some("") => return Some(Self::Main),
            Some(value) => value,
        };
        match value.to_ascii_lowercase().as_str() {
            "main" | "none" => Some(Self::Main),
            "web-descriptor" | "web.xml" | "webxml" => Some(Self::WebDescriptor),
            "build-descriptor" | "pom.xml" | "pomxml" => Some(Self::BuildDescriptor),
            "current-requests" | "currentrequests" => Some(Self::CurrentRequests),
            "processes" => Some(Self::Processes),
            "database" => Some(Self::Database),
            "connections" => Some(Self::Connections),
            "heap-histogram" | "heaphisto" => Some(Self::HeapHistogram),
            "sessions" => Some(Self::Sessions),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::WebDescriptor => "web-descriptor",
            Self::BuildDescriptor => "build-descriptor",
            Self::CurrentRequests => "current-requests",
            Self::Processes => "processes",
            Self::Database => "database",
            Self::Connections => "connections",
            Self::HeapHistogram => "heap-histogram",
            Self::Sessions => "sessions",
        }
    }

    pub fn scope(&self) -> PartScope {
        match self {
            Self::WebDescriptor | Self::BuildDescriptor | Self::Database => PartScope::FirstInstance,
            Self::Main
            | Self::CurrentRequests
            | Self::Processes
            | Self::Connections
            | Self::HeapHistogram
            | Self::Sessions => PartScope::Cluster,
        }
    }

    pub fn is_structured(&self) -> bool {
        !matches!(self, Self::WebDescriptor | Self::BuildDescriptor)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PartSelector {
    RequestIndex(u32),
    SessionId(String),
}

impl PartSelector {
    pub fn query_pair(&self) -> (&'static str, String) {
        match self {
            Self::RequestIndex(index) => ("request", index.to_string()),
            Self::SessionId(id) => ("sessionId", id.clone()),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReportRequest {
    pub part: ReportPart,
    pub selector: Option<PartSelector>,
    pub instance: Option<String>,
}

impl ReportRequest {
    pub fn new(part: ReportPart) -> Self {
        Self {
            part,
            selector: None,
            instance: None,
        }
    }

    pub fn main() -> Self {
        Self::new(ReportPart::Main)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Gc,
    HeapDump,
    ClearCaches,
    InvalidateSessions,
    InvalidateSession,
    KillThread,
    ClearCounter,
    PauseJob,
    ResumeJob,
    RemoveApplication,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TargetKind {
    Counter,
    Session,
    Thread,
    Job,
}

impl TargetKind {
    pub fn param_name(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Session => "sessionId",
            Self::Thread => "threadId",
            Self::Job => "jobId",
        }
    }

    pub fn accepts_all(&self) -> bool {
        matches!(self, Self::Counter | Self::Job)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Delivery {
    Registry,
    Broadcast,
    FirstOwner,
}

impl Action {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "GC" => Some(Self::Gc),
            "HEAP_DUMP" => Some(Self::HeapDump),
            "CLEAR_CACHES" => Some(Self::ClearCaches),
            "INVALIDATE_SESSIONS" => Some(Self::InvalidateSessions),
            "INVALIDATE_SESSION" => Some(Self::InvalidateSession),
            "KILL_THREAD" => Some(Self::KillThread),
            "CLEAR_COUNTER" => Some(Self::ClearCounter),
            "PAUSE_JOB" => Some(Self::PauseJob),
            "RESUME_JOB" => Some(Self::ResumeJob),
            "REMOVE_APPLICATION" => Some(Self::RemoveApplication),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gc => "GC",
            Self::HeapDump => "HEAP_DUMP",
            Self::ClearCaches => "CLEAR_CACHES",
            Self::InvalidateSessions => "INVALIDATE_SESSIONS",
            Self::InvalidateSession => "INVALIDATE_SESSION",
            Self::KillThread => "KILL_THREAD",
            Self::ClearCounter => "CLEAR_COUNTER",
            Self::PauseJob => "PAUSE_JOB",
            Self::ResumeJob => "RESUME_JOB",
            Self::RemoveApplication => "REMOVE_APPLICATION",
        }
    }

    pub fn required_target(&self) -> Option<TargetKind> {
        match self {
            Self::ClearCounter => Some(TargetKind::Counter),
            Self::InvalidateSession => Some(TargetKind::Session),
            Self::KillThread => Some(TargetKind::Thread),
            Self::PauseJob | Self::ResumeJob => Some(TargetKind::Job),
            Self::Gc
            | Self::HeapDump
            | Self::ClearCaches
            | Self::InvalidateSessions
            | Self::RemoveApplication => None,
        }
    }

    pub fn delivery(&self) -> Delivery {
        match self {
            Self::RemoveApplication => Delivery::Registry,
            Self::InvalidateSession | Self::KillThread => Delivery::FirstOwner,
            Self::Gc
            | Self::HeapDump
            | Self::ClearCaches
            | Self::InvalidateSessions
            | Self::ClearCounter
            | Self::PauseJob
            | Self::ResumeJob => Delivery::Broadcast,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ActionTarget {
    None,
    All,
    Counter(String),
    Session(String),
    Thread(String),
    Job(String),
}

impl ActionTarget {
    pub fn query_pair(&self) -> Option<(&'static str, String)> {
        match self {
            Self::None | Self::All => None,
            Self::Counter(id) => Some(("counter", id.clone())),
            Self::Session(id) => Some(("sessionId", id.clone())),
            Self::Thread(id) => Some(("threadId", id.clone())),
            Self::Job(id) => Some(("jobId", id.clone())),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ActionRequest {
    pub application: String,
    pub action: Action,
    pub target: ActionTarget,
}

impl ActionRequest {
    pub fn remote_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("action", self.action.as_str().to_string())];
        match (&self.target, self.action.required_target()) {
            (ActionTarget::All, Some(kind)) => params.push((kind.param_name(), "all".to_string())),
            (target, _) => params.extend(target.query_pair()),
        }
        params
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Unreachable,
    Timeout,
    Protocol,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct InstanceFailure {
    pub url: String,
    pub kind: FailureKind,
    pub detail: String,
}

impl InstanceFailure {
    pub fn new(url: impl Into<String>, kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind,
            detail: detail.into(),
        }
    }

    pub fn unreachable(url: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(url, FailureKind::Unreachable, detail)
    }

    pub fn timeout(url: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(url, FailureKind::Timeout, detail)
    }

    pub fn protocol(url: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(url, FailureKind::Protocol, detail)
    }
}

pub type InstanceOutcome<T> = Result<T, InstanceFailure>;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Fragment {
    Structured(serde_json::Value),
    Opaque { content_type: String, body: String },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ActionReply {
    Acknowledged(String),
    NotOwned,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaggedItem {
    pub instance: String,
    pub item: Fragment,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MergedReport {
    pub application: String,
    pub part: ReportPart,
    pub responded: Vec<String>,
    pub items: Vec<TaggedItem>,
    pub degraded: Vec<InstanceFailure>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<MetricPoint>,
}

impl MergedReport {
    pub fn single_opaque(&self) -> Option<(&str, &str)> {
        match self.items.as_slice() {
            [TaggedItem {
                item: Fragment::Opaque { content_type, body },
                ..
            }] => Some((content_type.as_str(), body.as_str())),
            _ => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct InstanceAck {
    pub instance: String,
    pub message: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ActionReport {
    pub application: String,
    pub action: Action,
    pub target: ActionTarget,
    pub acknowledged: Vec<InstanceAck>,
    pub unowned: Vec<String>,
    pub degraded: Vec<InstanceFailure>,
    pub detail: String,
}
