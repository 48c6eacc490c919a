//! Records produced by a simulated run.

use std::fmt;

use serde::Serialize;

use crate::drlc::codec::ReportEventStatus;
use crate::drlc::types::EventStatus;
use crate::esi::EsiEntry;

/// One ReportEventStatus observed on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRecord {
    /// Seconds after simulation start at which the frame was sent.
    pub offset: u32,
    /// ZCL sequence number of the frame.
    pub sequence: u8,
    /// Node id of the receiving ESI.
    pub node_id: u16,
    /// Endpoint of the receiving ESI.
    pub esi_endpoint: u8,
    pub event_id: u32,
    pub status: EventStatus,
    /// Status time carried in the report (seconds since epoch).
    pub status_time: u32,
    pub criticality_level: u8,
    pub cooling_temp_set_point: i16,
    pub heating_temp_set_point: i16,
    pub avg_load_percentage: u8,
    pub duty_cycle: u8,
    pub event_control: u8,
}

impl ReportRecord {
    pub fn new(offset: u32, sequence: u8, destination: &EsiEntry, report: &ReportEventStatus) -> Self {
        Self {
            offset,
            sequence,
            node_id: destination.node_id,
            esi_endpoint: destination.endpoint,
            event_id: report.event_id,
            status: report.status,
            status_time: report.status_time,
            criticality_level: report.criticality_level,
            cooling_temp_set_point: report.cooling_temp_set_point,
            heating_temp_set_point: report.heating_temp_set_point,
            avg_load_percentage: report.avg_load_percentage,
            duty_cycle: report.duty_cycle,
            event_control: report.event_control,
        }
    }
}

impl fmt::Display for ReportRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t+{:>4}s | seq={:>3} -> node 0x{:04x}/{} | event 0x{:08x} crit={} | {}",
            self.offset,
            self.sequence,
            self.node_id,
            self.esi_endpoint,
            self.event_id,
            self.criticality_level,
            self.status,
        )
    }
}
