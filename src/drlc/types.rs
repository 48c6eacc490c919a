//! Load control event records and the status vocabulary reported to ESIs.

use std::fmt;

use bitflags::bitflags;
use serde::Serialize;

use crate::esi::MAX_ESI_TABLE_SIZE;

/// Start time meaning "start now".
pub const START_TIME_NOW: u32 = 0;
/// Start time value that is never valid in a LoadControlEvent.
pub const START_TIME_INVALID: u32 = 0xFFFF_FFFF;
/// Longest accepted event duration, in minutes.
pub const MAX_DURATION_MINUTES: u16 = 0x05A0;
/// Lowest valid criticality level (Green).
pub const CRITICALITY_MIN: u8 = 0x01;
/// Highest valid criticality level (Utility Defined 6).
pub const CRITICALITY_MAX: u8 = 0x0F;

bitflags! {
    /// Event control field of a LoadControlEvent.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
    pub struct EventControl: u8 {
        const RANDOMIZE_START_TIME = 0x01;
        const RANDOMIZE_DURATION_TIME = 0x02;
    }
}

bitflags! {
    /// Local opt state of an event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
    pub struct OptionControl: u8 {
        const OPT_IN = 0x01;
        /// The opt state changed after the event started.
        const PARTIAL = 0x02;
    }
}

bitflags! {
    /// Cancel control field of the cancel commands.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
    pub struct CancelControl: u8 {
        const CANCEL_WITH_RANDOMIZATION = 0x01;
    }
}

/// Set of ESI table indices, bounded by [`MAX_ESI_TABLE_SIZE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EsiBitmask(u32);

impl EsiBitmask {
    pub const EMPTY: Self = Self(0);

    /// A set holding only `index`; empty if the index is out of range.
    pub fn single(index: u8) -> Self {
        let mut set = Self::EMPTY;
        set.insert(index);
        set
    }

    /// Adds `index`. Returns `false` if it was already present or out of range.
    pub fn insert(&mut self, index: u8) -> bool {
        if usize::from(index) >= MAX_ESI_TABLE_SIZE || self.contains(index) {
            return false;
        }
        self.0 |= 1 << index;
        true
    }

    pub fn remove(&mut self, index: u8) {
        if usize::from(index) < MAX_ESI_TABLE_SIZE {
            self.0 &= !(1 << index);
        }
    }

    pub fn contains(&self, index: u8) -> bool {
        usize::from(index) < MAX_ESI_TABLE_SIZE && self.0 & (1 << index) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Members in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..MAX_ESI_TABLE_SIZE as u8).filter(|i| self.contains(*i))
    }
}

/// One utility-initiated demand-response event.
///
/// Device payload fields (set points, offsets, load adjustment, duty cycle)
/// are opaque to scheduling and are echoed back in status reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LoadControlEvent {
    pub event_id: u32,
    pub device_class: u16,
    pub utility_enrollment_group: u8,
    /// Seconds since epoch.
    pub start_time: u32,
    /// Minutes.
    pub duration: u16,
    pub criticality_level: u8,
    pub cooling_temp_offset: u8,
    pub heating_temp_offset: u8,
    pub cooling_temp_set_point: i16,
    pub heating_temp_set_point: i16,
    pub avg_load_percentage: u8,
    pub duty_cycle: u8,
    pub event_control: EventControl,
    pub option_control: OptionControl,
    /// Start randomization offset, seconds.
    pub start_rand: u16,
    /// Duration randomization offset, seconds.
    pub duration_rand: u16,
    /// Seconds the event began after its randomized start, e.g. while waiting
    /// for an earlier event to finish.
    pub start_delay: u32,
    /// Time at which a superseded or cancelled event is reported.
    pub trigger_time: u32,
    pub esi_bitmask: EsiBitmask,
    pub destination_endpoint: u8,
}

impl LoadControlEvent {
    /// End of the nominal window `[start_time, start_time + duration)`.
    pub fn scheduled_end(&self) -> u32 {
        self.start_time
            .saturating_add(u32::from(self.duration) * 60)
    }

    /// Time at which the event is due to start.
    pub fn randomized_start(&self) -> u32 {
        self.start_time.saturating_add(u32::from(self.start_rand))
    }

    /// Time at which a started event completes.
    pub fn effective_end(&self) -> u32 {
        self.randomized_start()
            .saturating_add(self.start_delay)
            .saturating_add(u32::from(self.duration) * 60)
            .saturating_add(u32::from(self.duration_rand))
    }

    pub fn is_opted_in(&self) -> bool {
        self.option_control.contains(OptionControl::OPT_IN)
    }

    /// Whether the targeting keys of two events intersect.
    ///
    /// A zero enrollment group on either side matches every group.
    pub fn targets_overlap(&self, other: &Self) -> bool {
        self.device_class & other.device_class != 0
            || self.utility_enrollment_group == 0
            || other.utility_enrollment_group == 0
            || self.utility_enrollment_group & other.utility_enrollment_group != 0
    }

    /// Whether the nominal windows of two events intersect.
    pub fn windows_overlap(&self, other: &Self) -> bool {
        self.start_time < other.scheduled_end() && other.start_time < self.scheduled_end()
    }

    /// Placeholder used to report on an event id that has no table entry.
    pub fn placeholder(endpoint: u8, event_id: u32) -> Self {
        Self {
            event_id,
            destination_endpoint: endpoint,
            ..Self::default()
        }
    }
}

/// Lifecycle state of a table slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum EntryStatus {
    #[default]
    Void,
    Scheduled,
    Started,
    Superseded,
    Cancelled,
}

impl EntryStatus {
    /// Scheduled or started.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Scheduled | Self::Started)
    }
}

/// An event slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Entry {
    pub event: LoadControlEvent,
    pub status: EntryStatus,
}

/// Event status codes carried in ReportEventStatus.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    LoadControlEventCommandRx = 0x01,
    EventStarted = 0x02,
    EventCompleted = 0x03,
    UserHasChooseToOptOut = 0x04,
    UserHasChooseToOptIn = 0x05,
    TheEventHasBeenCanceled = 0x06,
    TheEventHasBeenSuperseded = 0x07,
    EventPartiallyCompletedWithUserOptOut = 0x08,
    EventPartiallyCompletedDueToUserOptIn = 0x09,
    EventCompletedNoUserParticipationPreviousOptOut = 0x0A,
    /// Never sent by this client; kept so peer reports decode.
    RejectedInvalidCancelCommandDefault = 0xF8,
    RejectedInvalidCancelCommandInvalidEffectiveTime = 0xF9,
    RejectedEventExpired = 0xFB,
    RejectedInvalidCancelUndefinedEvent = 0xFD,
    LoadControlEventCommandRejected = 0xFE,
}

impl EventStatus {
    /// Completion status for an event that ran its full duration.
    pub fn completion(option_control: OptionControl) -> Self {
        const TABLE: [EventStatus; 4] = [
            EventStatus::EventCompletedNoUserParticipationPreviousOptOut,
            EventStatus::EventCompleted,
            EventStatus::EventPartiallyCompletedWithUserOptOut,
            EventStatus::EventPartiallyCompletedDueToUserOptIn,
        ];
        let opt_in = usize::from(option_control.contains(OptionControl::OPT_IN));
        let partial = usize::from(option_control.contains(OptionControl::PARTIAL));
        TABLE[(partial << 1) | opt_in]
    }

    pub fn from_code(code: u8) -> Option<Self> {
        use EventStatus::*;
        Some(match code {
            0x01 => LoadControlEventCommandRx,
            0x02 => EventStarted,
            0x03 => EventCompleted,
            0x04 => UserHasChooseToOptOut,
            0x05 => UserHasChooseToOptIn,
            0x06 => TheEventHasBeenCanceled,
            0x07 => TheEventHasBeenSuperseded,
            0x08 => EventPartiallyCompletedWithUserOptOut,
            0x09 => EventPartiallyCompletedDueToUserOptIn,
            0x0A => EventCompletedNoUserParticipationPreviousOptOut,
            0xF8 => RejectedInvalidCancelCommandDefault,
            0xF9 => RejectedInvalidCancelCommandInvalidEffectiveTime,
            0xFB => RejectedEventExpired,
            0xFD => RejectedInvalidCancelUndefinedEvent,
            0xFE => LoadControlEventCommandRejected,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Rejections are reported to the originating ESI only.
    pub fn is_rejection(self) -> bool {
        self.code() >= 0xF8
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LoadControlEventCommandRx => "command received",
            Self::EventStarted => "event started",
            Self::EventCompleted => "event completed",
            Self::UserHasChooseToOptOut => "user opted out",
            Self::UserHasChooseToOptIn => "user opted in",
            Self::TheEventHasBeenCanceled => "cancelled",
            Self::TheEventHasBeenSuperseded => "superseded",
            Self::EventPartiallyCompletedWithUserOptOut => "partially completed (opt out)",
            Self::EventPartiallyCompletedDueToUserOptIn => "partially completed (opt in)",
            Self::EventCompletedNoUserParticipationPreviousOptOut => {
                "completed without participation"
            }
            Self::RejectedInvalidCancelCommandDefault => "rejected: invalid cancel",
            Self::RejectedInvalidCancelCommandInvalidEffectiveTime => {
                "rejected: invalid effective time"
            }
            Self::RejectedEventExpired => "rejected: expired",
            Self::RejectedInvalidCancelUndefinedEvent => "rejected: undefined event",
            Self::LoadControlEventCommandRejected => "rejected",
        };
        write!(f, "{name} (0x{:02x})", self.code())
    }
}
