use std::future::Future;
use std::time::Duration;

use futures_util::future::join_all;

use crate::types::{InstanceFailure, InstanceOutcome};

pub(crate) async fn spawn_bounded<T, Fut>(url: String, timeout: Duration, call: Fut) -> InstanceOutcome<T>
where
    T: Send + 'static,
    Fut: Future<Output = InstanceOutcome<T>> + Send + 'static,
{
    let task_url = url.clone();
    let handle = tokio::spawn(async move {
        match tokio::time::timeout(timeout, call).await {
            Ok(outcome) => outcome,
            Err(_) => Err(InstanceFailure::timeout(
                task_url,
                format!("no response within {} ms", timeout.as_millis()),
            )),
        }
    });
    match handle.await {
        Ok(outcome) => outcome,
        Err(err) => Err(InstanceFailure::protocol(url, format!("call aborted: {err}"))),
    }
}

pub(crate) async fn scatter<T, F, Fut>(
    urls: &[String],
    timeout: Duration,
    call: F,
) -> Vec<(String, InstanceOutcome<T>)>
where
    T: Send + 'static,
    F: Fn(String) -> Fut,
    Fut: Future<Output = InstanceOutcome<T>> + Send + 'static,
{
    let calls = urls.iter().map(|url| {
        let url = url.clone();
        let call = call(url.clone());
        async move {
            let outcome = spawn_bounded(url.clone(), timeout, call).await;
            (url, outcome)
        }
    });
    join_all(calls).await
}
