//! API response and query types.

use serde::{Deserialize, Serialize};

use crate::sim::summary::RunSummary;
use crate::sim::types::ReportRecord;

/// Combined state response: run timing, summary, and latest report.
#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub start_time: u32,
    pub seconds: u32,
    pub summary: RunSummary,
    /// Most recent report, if any was sent.
    pub latest_report: Option<ReportRecord>,
}

/// Optional status-time range for the reports endpoint.
#[derive(Debug, Deserialize)]
pub struct ReportsQuery {
    /// Earliest status time (inclusive).
    pub from: Option<u32>,
    /// Latest status time (inclusive).
    pub to: Option<u32>,
}

/// Error response body for 400-class errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}
