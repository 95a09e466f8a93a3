//! Health and observability endpoints.
//!
//! Exposes `/` (service info), `/health` (readiness, 503 while any account
//! is unreachable) and `/metrics` (cumulative progress counters).

use std::time::Instant;

use anyhow::{Context, Result};
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::engine::{ProgressState, SharedProgress, SharedReachability};

#[derive(Clone)]
pub struct HealthState {
    progress: SharedProgress,
    reachability: SharedReachability,
    started_at: Instant,
}

impl HealthState {
    pub fn new(progress: SharedProgress, reachability: SharedReachability) -> Self {
        Self {
            progress,
            reachability,
            started_at: Instant::now(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ServiceInfo {
    name: &'static str,
    version: &'static str,
    git_hash: &'static str,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    accounts: Vec<AccountHealth>,
    progress: ProgressState,
}

#[derive(Debug, Serialize)]
struct AccountHealth {
    name: String,
    reachable: bool,
}

#[derive(Debug, Serialize)]
struct MetricsResponse {
    uptime_sec: u64,
    #[serde(flatten)]
    progress: ProgressState,
}

async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        git_hash: env!("GIT_HASH"),
    })
}

async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let reachability = state.reachability.read().await;
    let mut accounts: Vec<AccountHealth> = reachability
        .iter()
        .map(|(name, reachable)| AccountHealth {
            name: name.clone(),
            reachable: *reachable,
        })
        .collect();
    accounts.sort_by(|a, b| a.name.cmp(&b.name));

    let all_reachable = accounts.iter().all(|a| a.reachable);
    let (status_code, status) = if all_reachable {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };
    let progress = state.progress.read().await.clone();
    (
        status_code,
        Json(HealthResponse {
            status,
            accounts,
            progress,
        }),
    )
}

async fn metrics(State(state): State<HealthState>) -> Json<MetricsResponse> {
    let progress = state.progress.read().await.clone();
    Json(MetricsResponse {
        uptime_sec: state.started_at.elapsed().as_secs(),
        progress,
    })
}

fn make_app(state: HealthState) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

pub async fn run_health_server(
    state: HealthState,
    port: u16,
    cancel: CancellationToken,
) -> Result<()> {
    let app = make_app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind health server on port {}", port))?;
    info!("Health server listening on port {}", port);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}
