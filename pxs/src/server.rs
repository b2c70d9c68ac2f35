use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Json, Router, http::StatusCode, routing::get};
use common::HealthReport;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::info;

/// Read handle on the supervisor's last health report. The supervisor task
/// is the only writer; the endpoint only ever reads.
pub type ReportSlot = Arc<RwLock<Option<HealthReport>>>;

/// Serve the liveness endpoint the surrounding orchestration layer polls.
/// `GET /healthz` answers 200 only when the last monitoring pass was fully
/// healthy.
pub async fn serve(admin_port: u16, report: ReportSlot) -> Result<()> {
    let app = Router::new().route(
        "/healthz",
        get(move || handle_healthz(report.clone())),
    );

    let addr = format!("0.0.0.0:{admin_port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding admin endpoint on {addr}"))?;
    info!("admin endpoint on {addr}");
    axum::serve(listener, app)
        .await
        .context("admin endpoint server")?;
    Ok(())
}

async fn handle_healthz(report: ReportSlot) -> (StatusCode, Json<serde_json::Value>) {
    let guard = report.read().await;
    match guard.as_ref() {
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "msg": "no health report yet" })),
        ),
        Some(r) if r.healthy() => (StatusCode::OK, Json(serde_json::to_value(r).unwrap())),
        Some(r) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::to_value(r).unwrap()),
        ),
    }
}
