mod aggregator;
mod client;
mod dispatcher;
mod error;
mod fanout;
mod router;
mod scheduler;
mod settings;
mod types;

pub use aggregator::ReportAggregator;
pub use client::{HttpInstanceClient, HttpInstanceClientConfig, RemoteInstanceClient};
pub use dispatcher::ActionDispatcher;
pub use error::CollectorError;
pub use router::{
    classify, Collector, CollectorRequest, CollectorResponse, LocalSummary, RequestFlow,
    RequestMethod,
};
pub use scheduler::{collect_all, CollectionScheduler};
pub use settings::SharedSettings;
pub use types::{
    Action, ActionReply, ActionReport, ActionRequest, ActionTarget, Delivery, FailureKind,
    Fragment, InstanceAck, InstanceFailure, InstanceOutcome, MergedReport, PartScope,
    PartSelector, ReportPart, ReportRequest, TaggedItem, TargetKind,
};
