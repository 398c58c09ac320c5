mod error;
mod handlers;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use collector_control::CollectorSettings;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::handlers::{access_guard, monitoring_handler, reload_config};
use crate::state::{build_collector, create_default_config, load_config, AppState};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(long, default_value = "system.toml")]
    config: PathBuf,
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    if !args.config.exists() {
        warn!("config file missing, creating default config");
        let _ = create_default_config(&args.config);
    }

    let config = load_config(&args.config)?;
    let settings = CollectorSettings::from_config(&config)?;
    let collector = build_collector(settings)?;
    collector.start();
    let state = Arc::new(AppState::new(args.config.clone(), collector));
    let router = app(state.clone());

    info!("collector-server listening on {}", args.listen);
    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    state.collector.shutdown();
    info!("collector-server stopped");
    Ok(())
}

fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/monitoring", get(monitoring_handler).post(monitoring_handler))
        .route("/system/reload", post(reload_config))
        .layer(middleware::from_fn_with_state(state.clone(), access_guard))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
