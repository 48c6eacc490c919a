//! Demand Response and Load Control client cluster.

pub mod client;
pub mod codec;
pub mod reporter;
/// Event table and tick-driven lifecycle.
pub mod table;
/// Event records, flags, and status codes.
pub mod types;

pub use client::{DrlcClient, Disposition};
pub use reporter::{AcceptAll, EventActionHook, StatusReporter};
pub use table::{EsiTarget, EventTable, NotificationSink};
pub use types::{EntryStatus, EventStatus, LoadControlEvent};

/// ZCL cluster id of Demand Response and Load Control.
pub const CLUSTER_ID: u16 = 0x0701;

/// Commands received from the ESI (server to client).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerCommand {
    LoadControlEvent = 0x00,
    CancelLoadControlEvent = 0x01,
    CancelAllLoadControlEvents = 0x02,
}

/// Commands sent to the ESI (client to server).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
    ReportEventStatus = 0x00,
    GetScheduledEvents = 0x01,
}

/// Client-side attributes of the cluster.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attributes {
    UtilityEnrollmentGroup = 0x0000,
    StartRandomizationMinutes = 0x0001,
    DurationRandomizationMinutes = 0x0002,
    DeviceClassValue = 0x0003,
}

impl Attributes {
    pub const fn id(self) -> u16 {
        self as u16
    }
}
