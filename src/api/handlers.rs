//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use super::AppState;
use super::types::{ErrorResponse, ReportsQuery, StateResponse};

/// Returns run timing, summary, and the latest report.
///
/// `GET /state` → 200 + `StateResponse` JSON
pub async fn get_state(State(state): State<Arc<AppState>>) -> Json<StateResponse> {
    Json(StateResponse {
        start_time: state.start_time,
        seconds: state.seconds,
        summary: state.summary.clone(),
        latest_report: state.records.last().cloned(),
    })
}

/// Returns reports, optionally filtered by status time.
///
/// `GET /reports` → 200 + `Vec<ReportRecord>` JSON
/// `GET /reports?from=N&to=M` → status times in `N..=M`
/// `GET /reports?from=10&to=5` → 400 + `ErrorResponse`
pub async fn get_reports(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReportsQuery>,
) -> impl IntoResponse {
    let from = query.from.unwrap_or(0);
    let to = query.to.unwrap_or(u32::MAX);

    if from > to {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("`from` ({from}) must be <= `to` ({to})"),
            }),
        ));
    }

    let records: Vec<_> = state
        .records
        .iter()
        .filter(|r| (from..=to).contains(&r.status_time))
        .cloned()
        .collect();

    Ok(Json(records))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    use super::*;
    use crate::api::router;
    use crate::config::ScenarioConfig;
    use crate::sim::engine::Engine;

    fn make_test_state() -> Arc<AppState> {
        let cfg = ScenarioConfig::baseline();
        let mut engine = Engine::from_config(&cfg);
        let records = engine.run();
        let summary = engine.summary(&records);
        Arc::new(AppState {
            start_time: cfg.simulation.start_time,
            seconds: cfg.simulation.seconds,
            summary,
            records,
        })
    }

    async fn get_json(uri: &str) -> (StatusCode, serde_json::Value) {
        let app = router(make_test_state());
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn state_returns_200() {
        let (status, json) = get_json("/state").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["summary"]["total_reports"], 3);
        assert_eq!(json["latest_report"]["status"], "event_completed");
    }

    #[tokio::test]
    async fn reports_returns_all() {
        let (status, json) = get_json("/reports").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn reports_range_query() {
        // Receipt and start at 1_000_005, completion at 1_000_305.
        let (status, json) = get_json("/reports?from=1000005&to=1000005").await;
        assert_eq!(status, StatusCode::OK);
        let json = json.as_array().cloned().unwrap_or_default();
        assert_eq!(json.len(), 2);
        assert_eq!(json[1]["status"], "event_started");
    }

    #[tokio::test]
    async fn reports_invalid_range_returns_400() {
        let (status, json) = get_json("/reports?from=10&to=5").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json.get("error").is_some());
    }
}
