//! Post-hoc summary of a run's report log.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::drlc::types::EventStatus;

use super::types::ReportRecord;

/// Aggregate counts derived from a complete report log.
///
/// Computed post-hoc from the records so the summary always agrees with
/// the exported log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// ReportEventStatus frames sent.
    pub total_reports: usize,
    /// Distinct event ids reported on.
    pub distinct_events: usize,
    /// Reports carrying a rejection status.
    pub rejections: usize,
    /// Reports per status.
    pub by_status: BTreeMap<EventStatus, usize>,
    /// Default Responses sent.
    pub default_responses: usize,
}

impl RunSummary {
    /// Computes the summary from the report log.
    ///
    /// # Arguments
    ///
    /// * `records` - Every report sent during the run
    /// * `default_responses` - Number of Default Responses sent alongside
    pub fn from_records(records: &[ReportRecord], default_responses: usize) -> Self {
        let mut by_status = BTreeMap::new();
        let mut events = BTreeSet::new();
        let mut rejections = 0;
        for r in records {
            *by_status.entry(r.status).or_insert(0) += 1;
            events.insert(r.event_id);
            if r.status.is_rejection() {
                rejections += 1;
            }
        }
        Self {
            total_reports: records.len(),
            distinct_events: events.len(),
            rejections,
            by_status,
            default_responses,
        }
    }

    /// Number of reports with `status`.
    pub fn count(&self, status: EventStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Run Summary ---")?;
        writeln!(f, "Reports sent:          {}", self.total_reports)?;
        writeln!(f, "Distinct events:       {}", self.distinct_events)?;
        writeln!(f, "Rejections:            {}", self.rejections)?;
        writeln!(f, "Default responses:     {}", self.default_responses)?;
        for (status, n) in &self.by_status {
            let name = status.to_string();
            writeln!(f, "  {name:<44} {n}")?;
        }
        Ok(())
    }
}
