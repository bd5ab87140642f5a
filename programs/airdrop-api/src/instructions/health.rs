use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use tracing::error;

use crate::constants::SERVICE_NAME;
use crate::contexts::{DatabaseHealth, HealthReport};
use crate::AppState;

pub async fn process(app: &AppState) -> HealthReport {
    let database = match app.store.ping().await {
        Ok(info) => DatabaseHealth {
            status: "connected",
            server_time: Some(info.server_time),
            version: Some(info.version),
            error: None,
        },
        Err(err) => {
            error!(error = %err, "database health check failed");
            DatabaseHealth {
                status: "disconnected",
                server_time: None,
                version: None,
                error: app
                    .config
                    .environment
                    .is_development()
                    .then(|| err.to_string()),
            }
        }
    };

    let status = if database.status == "connected" {
        "healthy"
    } else {
        "unhealthy"
    };
    HealthReport {
        status,
        timestamp: app.clock.now(),
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        database,
    }
}

pub async fn handler(State(app): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = process(&app).await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}
