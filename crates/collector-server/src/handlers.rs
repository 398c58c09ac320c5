use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderValue, Method, Response};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::Json;
use collector_control::CollectorSettings;
use collector_kernel::{CollectorRequest, CollectorResponse, RequestMethod};
use serde::Serialize;
use tracing::info;

use crate::error::AppError;
use crate::state::{load_config, AppState};

const FORM_LIMIT: usize = 64 * 1024;

#[derive(Debug, Serialize)]
pub struct SimpleResponse {
    pub ok: bool,
}

pub async fn access_guard(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Result<Response<Body>, AppError> {
    let remote_addr = peer.ip().to_string();
    state.collector.admit(Some(&remote_addr))?;
    Ok(next.run(req).await)
}

pub async fn monitoring_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    req: Request,
) -> Result<Response<Body>, AppError> {
    let (parts, body) = req.into_parts();
    let method = if parts.method == Method::POST {
        RequestMethod::Post
    } else {
        RequestMethod::Get
    };

    let mut params: HashMap<String, String> = HashMap::new();
    if let Some(query) = parts.uri.query() {
        params.extend(serde_urlencoded::from_str::<Vec<(String, String)>>(query)?);
    }
    if method == RequestMethod::Post {
        let bytes = axum::body::to_bytes(body, FORM_LIMIT)
            .await
            .map_err(|err| AppError::bad_request(err.to_string()))?;
        if !bytes.is_empty() {
            params.extend(serde_urlencoded::from_bytes::<Vec<(String, String)>>(&bytes)?);
        }
    }

    let remote_addr = peer.ip().to_string();
    let mut request = CollectorRequest::new(method, Some(&remote_addr));
    request.params = params;

    let response = state.collector.handle_admitted(request).await?;
    Ok(render(response))
}

fn render(response: CollectorResponse) -> Response<Body> {
    if let CollectorResponse::Report(report) = &response {
        if let Some((content_type, body)) = report.single_opaque() {
            let mut raw = Response::new(Body::from(body.to_string()));
            if let Ok(value) = HeaderValue::from_str(content_type) {
                raw.headers_mut().insert(header::CONTENT_TYPE, value);
            }
            return raw;
        }
    }
    Json(response).into_response()
}

pub async fn reload_config(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SimpleResponse>, AppError> {
    let config = load_config(&state.config_path)?;
    let settings = CollectorSettings::from_config(&config)?;
    state.collector.reload(settings);
    info!(path = %state.config_path.display(), "config reloaded");
    Ok(Json(SimpleResponse { ok: true }))
}
