//! Read-only REST API over a completed run.
//!
//! Provides two GET endpoints:
//! - `/state`: scenario timing, run summary, and latest report
//! - `/reports`: the report log with optional status-time filtering

mod handlers;
mod types;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use log::info;

use crate::sim::summary::RunSummary;
use crate::sim::types::ReportRecord;

/// Immutable application state shared across all request handlers.
///
/// Constructed once after the run completes and wrapped in `Arc`; all data
/// is read-only, so no locks are needed.
pub struct AppState {
    /// Seconds since epoch at simulation start.
    pub start_time: u32,
    /// Simulated seconds.
    pub seconds: u32,
    /// Aggregate counts of the run.
    pub summary: RunSummary,
    /// Every report sent, in send order.
    pub records: Vec<ReportRecord>,
}

/// Builds the axum router with all API routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/state", get(handlers::get_state))
        .route("/reports", get(handlers::get_reports))
        .with_state(state)
}

/// Binds to the given address and serves the API until the process ends.
///
/// # Errors
///
/// Returns an `io::Error` if the listener cannot bind or the server fails.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("[api] listening on http://{addr}");
    axum::serve(listener, app).await
}
