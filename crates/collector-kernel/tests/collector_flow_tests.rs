use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use collector_control::{
    AccessPattern, ApplicationRegistry, AuditSink, CollectorSettings, HistorySink,
    InMemoryApplicationRegistry, InMemoryAuditSink, InMemoryHistorySink, MetricPoint,
};
use collector_kernel::{
    collect_all, Action, ActionReply, ActionRequest, ActionTarget, Collector, CollectorError,
    CollectorRequest, CollectorResponse, FailureKind, Fragment, InstanceFailure, InstanceOutcome,
    ReportPart, ReportRequest, RemoteInstanceClient, RequestMethod,
};
use parking_lot::Mutex;
use serde_json::json;

const REMOTE_ADDR: &str = "127.0.0.1";
const U1: &str = "http://node1:8080/test";
const U2: &str = "http://node2:8080/test";

#[derive(Default)]
struct MockInstances {
    down: HashSet<String>,
    slow: HashSet<String>,
    owned: HashMap<String, HashSet<String>>,
    parts: HashMap<String, Fragment>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockInstances {
    fn down(mut self, url: &str) -> Self {
        self.down.insert(url.to_string());
        self
    }

    fn slow(mut self, url: &str) -> Self {
        self.slow.insert(url.to_string());
        self
    }

    fn owns(mut self, url: &str, id: &str) -> Self {
        self.owned.entry(url.to_string()).or_default().insert(id.to_string());
        self
    }

    fn serves(mut self, url: &str, fragment: Fragment) -> Self {
        self.parts.insert(url.to_string(), fragment);
        self
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }

    fn called_urls(&self) -> Vec<String> {
        self.calls().into_iter().map(|(url, _)| url).collect()
    }

    async fn reach(&self, url: &str, op: String) -> InstanceOutcome<()> {
        self.calls.lock().push((url.to_string(), op));
        if self.slow.contains(url) {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        if self.down.contains(url) {
            return Err(InstanceFailure::unreachable(url, "connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteInstanceClient for MockInstances {
    async fn fetch_part(
        &self,
        url: &str,
        request: &ReportRequest,
        _timeout: Duration,
    ) -> InstanceOutcome<Fragment> {
        self.reach(url, format!("part:{}", request.part.as_str())).await?;
        if let Some(fragment) = self.parts.get(url) {
            return Ok(fragment.clone());
        }
        if request.part.is_structured() {
            Ok(Fragment::Structured(json!([{ "source": url, "part": request.part.as_str() }])))
        } else {
            Ok(Fragment::Opaque {
                content_type: "text/xml".to_string(),
                body: format!("<descriptor source=\"{url}\"/>"),
            })
        }
    }

    async fn invoke_action(
        &self,
        url: &str,
        request: &ActionRequest,
        _timeout: Duration,
    ) -> InstanceOutcome<ActionReply> {
        self.reach(url, format!("action:{}", request.action.as_str())).await?;
        let owned = self.owned.get(url);
        match &request.target {
            ActionTarget::Session(id) | ActionTarget::Thread(id) | ActionTarget::Counter(id) => {
                if owned.map(|ids| ids.contains(id)).unwrap_or(false) {
                    Ok(ActionReply::Acknowledged(format!("{id} done")))
                } else {
                    Ok(ActionReply::NotOwned)
                }
            }
            _ => Ok(ActionReply::Acknowledged("done".to_string())),
        }
    }
}

struct Harness {
    collector: Collector,
    instances: Arc<MockInstances>,
    registry: Arc<InMemoryApplicationRegistry>,
    history: Arc<InMemoryHistorySink>,
    audit: Arc<InMemoryAuditSink>,
}

fn settings(pattern: Option<&str>) -> CollectorSettings {
    CollectorSettings {
        allowed_addr_pattern: pattern.map(|value| AccessPattern::new(value).expect("pattern")),
        timeout: Duration::from_millis(200),
        resolution: None,
        ..CollectorSettings::default()
    }
}

fn harness(instances: MockInstances, pattern: Option<&str>) -> Harness {
    let instances = Arc::new(instances);
    let registry = InMemoryApplicationRegistry::shared();
    let history = InMemoryHistorySink::shared(64);
    let audit = InMemoryAuditSink::shared();
    let collector = Collector::new(
        settings(pattern),
        registry.clone(),
        instances.clone(),
        history.clone(),
        audit.clone(),
    );
    Harness {
        collector,
        instances,
        registry,
        history,
        audit,
    }
}

fn register(harness: &Harness, urls: &[&str]) {
    harness
        .registry
        .register("test", urls.iter().map(|url| url.to_string()).collect())
        .expect("register");
}

fn get() -> CollectorRequest {
    CollectorRequest::new(RequestMethod::Get, Some(REMOTE_ADDR))
}

fn post() -> CollectorRequest {
    CollectorRequest::new(RequestMethod::Post, Some(REMOTE_ADDR))
}

fn expect_report(response: CollectorResponse) -> collector_kernel::MergedReport {
    match response {
        CollectorResponse::Report(report) => report,
        other => panic!("expected report, got {other:?}"),
    }
}

fn expect_action(response: CollectorResponse) -> collector_kernel::ActionReport {
    match response {
        CollectorResponse::Action(report) => report,
        other => panic!("expected action report, got {other:?}"),
    }
}

#[tokio::test]
async fn denied_address_short_circuits_every_flow() {
    let h = harness(MockInstances::default(), Some("none"));
    register(&h, &[U1]);

    let requests = vec![
        post()
            .with_param("appName", "other")
            .with_param("appUrls", "http://localhost:8090/other"),
        get().with_param("application", "test").with_param("part", "processes"),
        post()
            .with_param("application", "test")
            .with_param("action", "REMOVE_APPLICATION"),
    ];
    for request in requests {
        let err = h.collector.handle(request).await.expect_err("denied");
        assert!(matches!(err, CollectorError::AccessDenied { .. }));
    }
    assert_eq!(h.registry.list_names(), vec!["test".to_string()]);
    assert!(h.instances.calls().is_empty());
    assert!(h.audit.list().is_empty());
}

#[tokio::test]
async fn matching_pattern_admits_request() {
    let h = harness(MockInstances::default(), Some("127\\.0\\.0\\.1"));
    let response = h
        .collector
        .handle(
            post()
                .with_param("appName", "test")
                .with_param("appUrls", "http://localhost:8090/test"),
        )
        .await
        .expect("registered");
    assert!(matches!(response, CollectorResponse::Registered(_)));
}

#[tokio::test]
async fn missing_address_is_denied_when_pattern_set() {
    let h = harness(MockInstances::default(), Some(".*"));
    let request = CollectorRequest::new(RequestMethod::Get, None);
    let err = h.collector.handle(request).await.expect_err("denied");
    assert!(matches!(err, CollectorError::AccessDenied { .. }));
}

#[tokio::test]
async fn reload_applies_new_pattern_to_next_request() {
    let h = harness(MockInstances::default(), None);
    assert!(h.collector.handle(get()).await.is_ok());
    h.collector.reload(settings(Some("10\\.0\\.0\\.1")));
    assert!(matches!(
        h.collector.handle(get()).await,
        Err(CollectorError::AccessDenied { .. })
    ));
}

#[tokio::test]
async fn admit_runs_the_address_check_alone() {
    let h = harness(MockInstances::default(), Some("10\\.0\\.0\\.1"));
    assert!(matches!(
        h.collector.admit(Some(REMOTE_ADDR)),
        Err(CollectorError::AccessDenied { .. })
    ));
    assert!(h.collector.admit(Some("10.0.0.1")).is_ok());
    assert!(h.registry.list_names().is_empty());
}

#[tokio::test]
async fn reload_resizes_history_per_application() {
    let h = harness(MockInstances::default(), None);
    for value in 0..10 {
        h.history.write(MetricPoint::for_application("instances_up", "a", value as f64));
        h.history.write(MetricPoint::for_application("instances_up", "b", value as f64));
    }
    h.collector.reload(CollectorSettings {
        history_limit: 3,
        ..settings(None)
    });
    assert_eq!(h.history.recent("a", 10).len(), 3);
    assert_eq!(h.history.recent("b", 10).len(), 3);
    assert_eq!(h.history.recent("a", 10)[0].value, 7.0);
}
#[tokio::test]
async fn registration_then_current_requests_fetches_from_instance() {
    let h = harness(MockInstances::default(), None);
    let response = h
        .collector
        .handle(
            post()
                .with_param("appName", "test")
                .with_param("appUrls", "http://localhost:8090/test"),
        )
        .await
        .expect("register");
    match response {
        CollectorResponse::Registered(entry) => {
            assert_eq!(entry.name, "test");
            assert_eq!(entry.instance_urls, vec!["http://localhost:8090/test".to_string()]);
        }
        other => panic!("unexpected {other:?}"),
    }

    let report = expect_report(
        h.collector
            .handle(
                get()
                    .with_param("part", "current-requests")
                    .with_param("application", "test"),
            )
            .await
            .expect("report"),
    );
    assert_eq!(report.part, ReportPart::CurrentRequests);
    assert_eq!(report.responded, vec!["http://localhost:8090/test".to_string()]);
    assert_eq!(report.items.len(), 1);
    assert_eq!(report.items[0].instance, "http://localhost:8090/test");
    assert_eq!(
        h.instances.calls(),
        vec![("http://localhost:8090/test".to_string(), "part:current-requests".to_string())]
    );
}

#[tokio::test]
async fn registration_validates_scheme() {
    let h = harness(MockInstances::default(), None);
    let err = h
        .collector
        .handle(
            post()
                .with_param("appName", "test")
                .with_param("appUrls", "ftp://localhost:8090/test"),
        )
        .await
        .expect_err("ftp rejected");
    match err {
        CollectorError::Validation { field, .. } => assert_eq!(field, "appUrls"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(h.registry.list_names().is_empty());

    for url in ["http://localhost:8090/test", "https://localhost:8090/test"] {
        let request = post().with_param("appName", "test").with_param("appUrls", url);
        assert!(h.collector.handle(request).await.is_ok());
    }
}

#[tokio::test]
async fn registration_requires_both_fields() {
    let h = harness(MockInstances::default(), None);
    let err = h
        .collector
        .handle(post().with_param("appName", "test"))
        .await
        .expect_err("missing urls");
    assert!(matches!(err, CollectorError::Validation { field: "appUrls", .. }));
    let err = h
        .collector
        .handle(post().with_param("appUrls", "http://localhost/test"))
        .await
        .expect_err("missing name");
    assert!(matches!(err, CollectorError::Validation { field: "appName", .. }));
}

#[tokio::test]
async fn one_failing_instance_degrades_report() {
    let h = harness(MockInstances::default().down(U1), None);
    register(&h, &[U1, U2]);

    let report = expect_report(
        h.collector
            .handle(get().with_param("application", "test").with_param("part", "sessions"))
            .await
            .expect("report"),
    );
    assert_eq!(report.responded, vec![U2.to_string()]);
    assert!(report.items.iter().all(|item| item.instance == U2));
    assert_eq!(report.degraded.len(), 1);
    assert_eq!(report.degraded[0].url, U1);
    assert_eq!(report.degraded[0].kind, FailureKind::Unreachable);
}

#[tokio::test]
async fn all_failing_instances_is_an_error() {
    let h = harness(MockInstances::default().down(U1).down(U2), None);
    register(&h, &[U1, U2]);

    let err = h
        .collector
        .handle(get().with_param("application", "test").with_param("part", "processes"))
        .await
        .expect_err("unreachable");
    match err {
        CollectorError::AllInstancesUnreachable { application, failures } => {
            assert_eq!(application, "test");
            assert_eq!(failures.len(), 2);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn slow_instance_is_reported_as_timeout() {
    let h = harness(MockInstances::default().slow(U2), None);
    register(&h, &[U1, U2]);

    let report = expect_report(
        h.collector
            .handle(get().with_param("application", "test").with_param("part", "heap-histogram"))
            .await
            .expect("report"),
    );
    assert_eq!(report.responded, vec![U1.to_string()]);
    assert_eq!(report.degraded[0].kind, FailureKind::Timeout);
}

#[tokio::test]
async fn array_fragments_are_flattened_and_tagged() {
    let instances = MockInstances::default()
        .serves(U1, Fragment::Structured(json!([{ "id": 1 }, { "id": 2 }])))
        .serves(U2, Fragment::Structured(json!({ "id": 3 })));
    let h = harness(instances, None);
    register(&h, &[U1, U2]);

    let report = expect_report(
        h.collector
            .handle(get().with_param("application", "test").with_param("part", "currentRequests"))
            .await
            .expect("report"),
    );
    let tags: Vec<&str> = report.items.iter().map(|item| item.instance.as_str()).collect();
    assert_eq!(tags, vec![U1, U1, U2]);
}

#[tokio::test]
async fn single_instance_parts_call_first_instance_only() {
    let h = harness(MockInstances::default(), None);
    register(&h, &[U1, U2]);

    for part in ["web.xml", "pom.xml", "database"] {
        let request = get().with_param("application", "test").with_param("part", part);
        let report = expect_report(h.collector.handle(request).await.expect("report"));
        assert_eq!(report.responded, vec![U1.to_string()]);
    }
    assert!(h.instances.called_urls().iter().all(|url| url == U1));

    let report = expect_report(
        h.collector
            .handle(get().with_param("application", "test").with_param("part", "web-descriptor"))
            .await
            .expect("report"),
    );
    let (content_type, body) = report.single_opaque().expect("opaque");
    assert_eq!(content_type, "text/xml");
    assert!(body.contains(U1));
}

#[tokio::test]
async fn instance_selector_targets_one_instance() {
    let h = harness(MockInstances::default(), None);
    register(&h, &[U1, U2]);

    let report = expect_report(
        h.collector
            .handle(
                get()
                    .with_param("application", "test")
                    .with_param("part", "connections")
                    .with_param("instance", U2),
            )
            .await
            .expect("report"),
    );
    assert_eq!(report.responded, vec![U2.to_string()]);

    let err = h
        .collector
        .handle(
            get()
                .with_param("application", "test")
                .with_param("part", "connections")
                .with_param("instance", "http://elsewhere/test"),
        )
        .await
        .expect_err("unknown instance");
    assert!(matches!(err, CollectorError::TargetNotFound(_)));
}

#[tokio::test]
async fn database_request_index_is_validated() {
    let h = harness(MockInstances::default(), None);
    register(&h, &[U1]);
    assert!(h
        .collector
        .handle(
            get()
                .with_param("application", "test")
                .with_param("part", "database")
                .with_param("request", "0"),
        )
        .await
        .is_ok());
    let err = h
        .collector
        .handle(
            get()
                .with_param("application", "test")
                .with_param("part", "database")
                .with_param("request", "first"),
        )
        .await
        .expect_err("bad index");
    assert!(matches!(err, CollectorError::Validation { field: "request", .. }));
}

#[tokio::test]
async fn unknown_application_is_not_found() {
    let h = harness(MockInstances::default(), None);
    let err = h
        .collector
        .handle(get().with_param("application", "missing"))
        .await
        .expect_err("not found");
    assert!(matches!(err, CollectorError::ApplicationNotFound(name) if name == "missing"));
}

#[tokio::test]
async fn no_application_and_no_registration_gives_local_summary() {
    let h = harness(MockInstances::default(), None);
    match h.collector.handle(get()).await.expect("local") {
        CollectorResponse::Local(summary) => assert!(summary.applications.is_empty()),
        other => panic!("unexpected {other:?}"),
    }
    assert!(h.instances.calls().is_empty());
}

#[tokio::test]
async fn no_application_uses_first_registered() {
    let h = harness(MockInstances::default(), None);
    register(&h, &[U1]);
    let report = expect_report(h.collector.handle(get()).await.expect("report"));
    assert_eq!(report.application, "test");
    assert_eq!(report.part, ReportPart::Main);
}

#[tokio::test]
async fn kill_thread_reaches_only_the_owner() {
    let h = harness(MockInstances::default().owns(U2, "12_node2_42"), None);
    register(&h, &[U1, U2]);

    let report = expect_action(
        h.collector
            .handle(
                post()
                    .with_param("application", "test")
                    .with_param("action", "KILL_THREAD")
                    .with_param("threadId", "12_node2_42"),
            )
            .await
            .expect("killed"),
    );
    assert_eq!(report.acknowledged.len(), 1);
    assert_eq!(report.acknowledged[0].instance, U2);
    assert_eq!(report.unowned, vec![U1.to_string()]);
}

#[tokio::test]
async fn kill_thread_without_owner_is_target_not_found() {
    let h = harness(MockInstances::default(), None);
    register(&h, &[U1, U2]);

    let err = h
        .collector
        .handle(
            post()
                .with_param("application", "test")
                .with_param("action", "KILL_THREAD")
                .with_param("threadId", "aThreadId"),
        )
        .await
        .expect_err("no owner");
    assert!(matches!(err, CollectorError::TargetNotFound(_)));
}

#[tokio::test]
async fn session_owner_search_stops_at_first_owner() {
    let instances = MockInstances::default()
        .owns(U1, "aSessionId")
        .owns(U2, "aSessionId");
    let h = harness(instances, None);
    register(&h, &[U1, U2]);

    let report = expect_action(
        h.collector
            .handle(
                post()
                    .with_param("application", "test")
                    .with_param("action", "INVALIDATE_SESSION")
                    .with_param("sessionId", "aSessionId"),
            )
            .await
            .expect("invalidated"),
    );
    assert_eq!(report.acknowledged[0].instance, U1);
    assert_eq!(h.instances.called_urls(), vec![U1.to_string()]);
}

#[tokio::test]
async fn owner_search_skips_unreachable_instance() {
    let h = harness(MockInstances::default().down(U1).owns(U2, "s1"), None);
    register(&h, &[U1, U2]);
    let report = expect_action(
        h.collector
            .handle(
                post()
                    .with_param("application", "test")
                    .with_param("action", "invalidate_session")
                    .with_param("sessionId", "s1"),
            )
            .await
            .expect("invalidated"),
    );
    assert_eq!(report.acknowledged[0].instance, U2);
    assert_eq!(report.degraded[0].url, U1);
}

#[tokio::test]
async fn missing_action_target_is_rejected_before_dispatch() {
    let h = harness(MockInstances::default(), None);
    register(&h, &[U1]);

    for (action, field) in [
        ("KILL_THREAD", "threadId"),
        ("INVALIDATE_SESSION", "sessionId"),
        ("CLEAR_COUNTER", "counter"),
        ("PAUSE_JOB", "jobId"),
    ] {
        let err = h
            .collector
            .handle(post().with_param("application", "test").with_param("action", action))
            .await
            .expect_err("missing target");
        match err {
            CollectorError::Validation { field: missing, .. } => assert_eq!(missing, field),
            other => panic!("unexpected {other:?}"),
        }
    }
    assert!(h.instances.calls().is_empty());
}

#[tokio::test]
async fn broadcast_actions_reach_every_instance() {
    let h = harness(MockInstances::default().down(U2), None);
    register(&h, &[U1, U2]);

    let cases = [
        ("GC", None),
        ("CLEAR_COUNTER", Some(("counter", "all"))),
        ("PAUSE_JOB", Some(("jobId", "all"))),
        ("RESUME_JOB", Some(("jobId", "all"))),
    ];
    for (action, target) in cases {
        let mut request = post().with_param("application", "test").with_param("action", action);
        if let Some((name, value)) = target {
            request = request.with_param(name, value);
        }
        let report = expect_action(h.collector.handle(request).await.expect("broadcast"));
        assert_eq!(report.acknowledged.len(), 1);
        assert_eq!(report.acknowledged[0].instance, U1);
        assert_eq!(report.degraded[0].url, U2);
    }
    let called: HashSet<String> = h.instances.called_urls().into_iter().collect();
    assert!(called.contains(U1) && called.contains(U2));
}

#[tokio::test]
async fn broadcast_to_unreachable_application_fails() {
    let h = harness(MockInstances::default().down(U1), None);
    register(&h, &[U1]);
    let err = h
        .collector
        .handle(post().with_param("application", "test").with_param("action", "GC"))
        .await
        .expect_err("unreachable");
    assert!(matches!(err, CollectorError::AllInstancesUnreachable { .. }));
}

#[tokio::test]
async fn unknown_action_is_rejected() {
    let h = harness(MockInstances::default(), None);
    let err = h
        .collector
        .handle(post().with_param("application", "test").with_param("action", "REBOOT"))
        .await
        .expect_err("unknown");
    assert!(matches!(err, CollectorError::Validation { field: "action", .. }));
}

#[tokio::test]
async fn remove_application_mutates_registry_only() {
    let h = harness(MockInstances::default(), None);
    register(&h, &[U1]);

    let request = || {
        post()
            .with_param("application", "test")
            .with_param("action", "remove_application")
    };
    let report = expect_action(h.collector.handle(request()).await.expect("removed"));
    assert_eq!(report.action, Action::RemoveApplication);
    assert!(h.registry.list_names().is_empty());
    assert!(h.instances.calls().is_empty());

    assert!(h.collector.handle(request()).await.is_ok());
}

#[tokio::test]
async fn actions_and_registrations_are_audited() {
    let h = harness(MockInstances::default(), None);
    h.collector
        .handle(
            post()
                .with_param("appName", "test")
                .with_param("appUrls", U1),
        )
        .await
        .expect("register");
    h.collector
        .handle(post().with_param("application", "test").with_param("action", "GC"))
        .await
        .expect("gc");
    let events = h.audit.list();
    let operations: Vec<&str> = events.iter().map(|event| event.operation.as_str()).collect();
    assert_eq!(operations, vec!["register", "GC"]);
    assert_eq!(events[0].remote_addr.as_deref(), Some(REMOTE_ADDR));
}

#[tokio::test]
async fn collection_round_feeds_main_report_history() {
    let h = harness(MockInstances::default().down(U2), None);
    register(&h, &[U1, U2]);

    collect_all(h.collector.aggregator(), h.registry.as_ref(), h.history.as_ref()).await;
    let points = h.history.recent("test", 10);
    let up = points.iter().find(|point| point.name == "instances_up").expect("up");
    let down = points.iter().find(|point| point.name == "instances_down").expect("down");
    assert_eq!(up.value, 1.0);
    assert_eq!(down.value, 1.0);

    let report = expect_report(
        h.collector
            .handle(get().with_param("application", "test"))
            .await
            .expect("report"),
    );
    assert_eq!(report.history.len(), 3);
}

#[tokio::test]
async fn removing_application_forgets_its_history() {
    let h = harness(MockInstances::default(), None);
    register(&h, &[U1]);
    collect_all(h.collector.aggregator(), h.registry.as_ref(), h.history.as_ref()).await;
    assert!(!h.history.recent("test", 10).is_empty());
    h.collector
        .handle(
            post()
                .with_param("application", "test")
                .with_param("action", "REMOVE_APPLICATION"),
        )
        .await
        .expect("removed");
    assert!(h.history.recent("test", 10).is_empty());
}

#[tokio::test]
async fn shutdown_is_safe_before_and_after_start() {
    let h = harness(MockInstances::default(), None);
    h.collector.shutdown();
    assert!(!h.collector.is_collecting());

    let collector = Collector::new(
        CollectorSettings {
            resolution: Some(Duration::from_secs(3600)),
            ..settings(None)
        },
        h.registry.clone(),
        h.instances.clone(),
        h.history.clone(),
        h.audit.clone(),
    );
    collector.start();
    assert!(collector.is_collecting());
    collector.start();
    collector.shutdown();
    collector.shutdown();
    assert!(!collector.is_collecting());
}
