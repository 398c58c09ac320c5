use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::{StatusCode, Url};

use crate::types::{
    ActionReply, ActionRequest, FailureKind, Fragment, InstanceFailure, InstanceOutcome,
    ReportPart, ReportRequest,
};

#[async_trait]
pub trait RemoteInstanceClient: Send + Sync {
    async fn fetch_part(
        &self,
        url: &str,
        request: &ReportRequest,
        timeout: Duration,
    ) -> InstanceOutcome<Fragment>;

    async fn invoke_action(
        &self,
        url: &str,
        request: &ActionRequest,
        timeout: Duration,
    ) -> InstanceOutcome<ActionReply>;
}

#[derive(Clone, Debug)]
pub struct HttpInstanceClientConfig {
    pub monitoring_path: String,
    pub user_agent: String,
}

impl Default for HttpInstanceClientConfig {
    fn default() -> Self {
        Self {
            monitoring_path: "/monitoring".to_string(),
            user_agent: "monitoring-collector".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct HttpInstanceClient {
    client: reqwest::Client,
    config: HttpInstanceClientConfig,
}

impl HttpInstanceClient {
    pub fn new(config: HttpInstanceClientConfig) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Ok(value) = HeaderValue::from_str(&config.user_agent) {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert(USER_AGENT, value);
            builder = builder.default_headers(headers);
        }
        let client = builder.build()?;
        Ok(Self { client, config })
    }

    pub fn endpoint(&self, base: &str, params: &[(&str, String)]) -> Result<Url, InstanceFailure> {
        let base = base.trim_end_matches('/');
        let path = self.config.monitoring_path.trim_end_matches('/');
        let target = if path.is_empty() || base.ends_with(path) {
            base.to_string()
        } else if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        };
        Url::parse_with_params(&target, params)
            .map_err(|err| InstanceFailure::protocol(base, err.to_string()))
    }
}

#[async_trait]
impl RemoteInstanceClient for HttpInstanceClient {
    async fn fetch_part(
        &self,
        url: &str,
        request: &ReportRequest,
        timeout: Duration,
    ) -> InstanceOutcome<Fragment> {
        let mut params = vec![("format", "json".to_string())];
        if request.part != ReportPart::Main {
            params.push(("part", request.part.as_str().to_string()));
        }
        if let Some(selector) = &request.selector {
            params.push(selector.query_pair());
        }
        let endpoint = self.endpoint(url, &params)?;

        let response = self
            .client
            .get(endpoint)
            .header(ACCEPT, "application/json, text/plain, */*")
            .timeout(timeout)
            .send()
            .await
            .map_err(|err| classify(url, &err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(InstanceFailure::protocol(
                url,
                format!("unexpected status {}", status.as_u16()),
            ));
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("text/plain")
            .to_string();
        let body = response.bytes().await.map_err(|err| classify(url, &err))?;

        if request.part.is_structured() {
            let value: serde_json::Value = serde_json::from_slice(&body)
                .map_err(|err| InstanceFailure::protocol(url, format!("malformed response: {err}")))?;
            Ok(Fragment::Structured(value))
        } else {
            Ok(Fragment::Opaque {
                content_type,
                body: String::from_utf8_lossy(&body).into_owned(),
            })
        }
    }

    async fn invoke_action(
        &self,
        url: &str,
        request: &ActionRequest,
        timeout: Duration,
    ) -> InstanceOutcome<ActionReply> {
        let mut params = request.remote_params();
        params.push(("format", "json".to_string()));
        let endpoint = self.endpoint(url, &params)?;

        let response = self
            .client
            .post(endpoint)
            .timeout(timeout)
            .send()
            .await
            .map_err(|err| classify(url, &err))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(ActionReply::NotOwned);
        }
        if !status.is_success() {
            return Err(InstanceFailure::protocol(
                url,
                format!("unexpected status {}", status.as_u16()),
            ));
        }
        let body = response.text().await.map_err(|err| classify(url, &err))?;
        Ok(ActionReply::Acknowledged(body.trim().to_string()))
    }
}

fn classify(url: &str, err: &reqwest::Error) -> InstanceFailure {
    let kind = if err.is_timeout() {
        FailureKind::Timeout
    } else if err.is_decode() || err.is_body() {
        FailureKind::Protocol
    } else {
        FailureKind::Unreachable
    };
    InstanceFailure::new(url, kind, err.to_string())
}
