use std::sync::Arc;

use anyhow::{Error, Result};
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
};
use tokio::{net::TcpListener, sync::watch};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{clients::health::HealthChecker, models::health::HealthStatus};

pub struct AppState {
    health_checker: HealthChecker,
}

pub fn router(health_checker: HealthChecker) -> Router {
    let state = Arc::new(AppState { health_checker });

    Router::new()
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_api_server(
    port: u16,
    health_checker: HealthChecker,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Error> {
    let app = router(health_checker);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "Health check server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;

    info!("Health check server stopped");
    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_checker.check_all().await;

    let status_code = match health.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}
