//! Per-endpoint load control event table and its once-per-second state machine.
//!
//! Every endpoint registered with [`EventTable::client_init`] owns a fixed
//! number of slots. Slots move through `Void -> Scheduled -> Started -> Void`,
//! or detour through `Superseded`/`Cancelled`, which are reported once and
//! then voided. A tick applies at most one transition so the slot array is
//! never mutated while a notification for it is in flight.

use std::collections::BTreeMap;
use std::fmt;

use log::debug;

use super::types::{
    CancelControl, Entry, EntryStatus, EsiBitmask, EventStatus, LoadControlEvent, MAX_DURATION_MINUTES,
    OptionControl, START_TIME_INVALID,
};

/// Which ESIs a status report is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EsiTarget {
    /// One ESI table index.
    Index(u8),
    /// Every ESI in the event's bitmask.
    All,
}

/// Receiver of table-driven status notifications.
pub trait NotificationSink {
    fn report(&mut self, event: &LoadControlEvent, status: EventStatus, target: EsiTarget, now: u32);
}

/// Bounded per-endpoint event table.
#[derive(Debug)]
pub struct EventTable<S> {
    endpoints: BTreeMap<u8, Vec<Entry>>,
    capacity: usize,
    sink: S,
}

impl<S: NotificationSink> EventTable<S> {
    /// Creates a table with `capacity` slots per endpoint that reports through `sink`.
    pub fn new(capacity: usize, sink: S) -> Self {
        Self {
            endpoints: BTreeMap::new(),
            capacity,
            sink,
        }
    }

    /// Registers `endpoint` as a DRLC client, voiding all of its slots.
    pub fn client_init(&mut self, endpoint: u8) {
        self.endpoints
            .insert(endpoint, vec![Entry::default(); self.capacity]);
    }

    pub fn is_client(&self, endpoint: u8) -> bool {
        self.endpoints.contains_key(&endpoint)
    }

    /// Registered client endpoints in ascending order.
    pub fn endpoints(&self) -> impl Iterator<Item = u8> + '_ {
        self.endpoints.keys().copied()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots of `endpoint`, in slot order.
    pub fn entries(&self, endpoint: u8) -> Option<&[Entry]> {
        self.endpoints.get(&endpoint).map(Vec::as_slice)
    }

    /// Printable view of one endpoint's slots.
    pub fn view(&self, endpoint: u8) -> Option<TableView<'_>> {
        self.entries(endpoint)
            .map(|entries| TableView { endpoint, entries })
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Accepts a new event from the ESI at `esi_index`.
    ///
    /// Invalid or expired events, and events arriving while every slot is in
    /// use, are rejected to the sender only. Existing entries are never
    /// evicted to make room. A repeat of an active event id is merged into the
    /// existing entry's ESI set.
    pub fn schedule(&mut self, endpoint: u8, event: LoadControlEvent, esi_index: u8, now: u32) {
        let Some(entries) = self.endpoints.get_mut(&endpoint) else {
            debug!("[drlc-table] endpoint {endpoint} is not a client, dropping event");
            return;
        };
        let sender = EsiTarget::Index(esi_index);

        if event.start_time == START_TIME_INVALID || event.duration > MAX_DURATION_MINUTES {
            self.sink.report(
                &event,
                EventStatus::LoadControlEventCommandRejected,
                sender,
                now,
            );
            return;
        }
        if now > event.scheduled_end() {
            self.sink
                .report(&event, EventStatus::RejectedEventExpired, sender, now);
            return;
        }

        if let Some(existing) = entries
            .iter_mut()
            .find(|e| e.status.is_active() && e.event.event_id == event.event_id)
        {
            if existing.event.esi_bitmask.insert(esi_index) {
                let existing = existing.event;
                self.sink.report(
                    &existing,
                    EventStatus::LoadControlEventCommandRx,
                    sender,
                    now,
                );
            } else {
                debug!(
                    "[drlc-table] duplicate event 0x{:08x} from esi {esi_index}",
                    event.event_id
                );
            }
            return;
        }

        let Some(slot) = entries.iter().position(|e| e.status == EntryStatus::Void) else {
            debug!(
                "[drlc-table] endpoint {endpoint} table full, rejecting event 0x{:08x}",
                event.event_id
            );
            self.sink.report(
                &event,
                EventStatus::LoadControlEventCommandRejected,
                sender,
                now,
            );
            return;
        };

        let mut event = event;
        event.esi_bitmask = EsiBitmask::single(esi_index);

        for (i, entry) in entries.iter_mut().enumerate() {
            if i == slot || !entry.status.is_active() {
                continue;
            }
            if entry.event.targets_overlap(&event) && entry.event.windows_overlap(&event) {
                entry.event.trigger_time = if entry.status == EntryStatus::Started {
                    event.randomized_start().saturating_sub(1)
                } else {
                    now
                };
                entry.status = EntryStatus::Superseded;
                debug!(
                    "[drlc-table] event 0x{:08x} superseded by 0x{:08x} at {}",
                    entry.event.event_id, event.event_id, entry.event.trigger_time
                );
            }
        }

        entries[slot] = Entry {
            event,
            status: EntryStatus::Scheduled,
        };
        debug!(
            "[drlc-table] endpoint {endpoint} slot {slot}: scheduled 0x{:08x} at {} (+{}s)",
            event.event_id, event.start_time, event.start_rand
        );
        self.sink
            .report(&event, EventStatus::LoadControlEventCommandRx, sender, now);
    }

    /// Advances the lifecycle of `endpoint` by at most one transition.
    pub fn tick(&mut self, endpoint: u8, now: u32) {
        let Some(entries) = self.endpoints.get_mut(&endpoint) else {
            return;
        };

        let finished = entries
            .iter()
            .find(|e| e.status == EntryStatus::Started && now >= e.event.effective_end())
            .map(|e| e.event);
        if let Some(event) = finished {
            let status = EventStatus::completion(event.option_control);
            debug!(
                "[drlc-table] event 0x{:08x} ended: {status}",
                event.event_id
            );
            self.sink.report(&event, status, EsiTarget::All, now);
            void_all_with_event_id(entries, event.event_id);
            return;
        }

        // Only one event may be running at a time.
        let any_started = entries.iter().any(|e| e.status == EntryStatus::Started);
        let due = entries.iter().position(|e| match e.status {
            EntryStatus::Scheduled => !any_started && e.event.randomized_start() <= now,
            EntryStatus::Superseded | EntryStatus::Cancelled => e.event.trigger_time <= now,
            EntryStatus::Void | EntryStatus::Started => false,
        });
        let Some(slot) = due else {
            return;
        };

        let entry = &mut entries[slot];
        if entry.status == EntryStatus::Scheduled {
            entry.event.start_delay = now - entry.event.randomized_start();
            entry.status = EntryStatus::Started;
            let event = entry.event;
            let status = if event.is_opted_in() {
                EventStatus::EventStarted
            } else {
                EventStatus::UserHasChooseToOptOut
            };
            debug!(
                "[drlc-table] event 0x{:08x} started {}s late",
                event.event_id, event.start_delay
            );
            self.sink.report(&event, status, EsiTarget::All, now);
            return;
        }

        let event = entry.event;
        let status = if entry.status == EntryStatus::Superseded {
            EventStatus::TheEventHasBeenSuperseded
        } else {
            EventStatus::TheEventHasBeenCanceled
        };
        self.sink.report(&event, status, EsiTarget::All, now);
        void_all_with_event_id(entries, event.event_id);
    }

    /// Applies a user opt-in or opt-out to an active event.
    ///
    /// Opting out of an event that has not started yet is silent; it is
    /// reported when the event would otherwise start.
    pub fn opt_in_or_out(&mut self, endpoint: u8, event_id: u32, opt_in: bool, now: u32) {
        let Some(entries) = self.endpoints.get_mut(&endpoint) else {
            return;
        };
        let Some(entry) = entries
            .iter_mut()
            .find(|e| e.status.is_active() && e.event.event_id == event_id)
        else {
            debug!("[drlc-table] opt request for unknown event 0x{event_id:08x}");
            return;
        };

        let was_opted_in = entry.event.is_opted_in();
        entry.event.option_control.set(OptionControl::OPT_IN, opt_in);
        let started = entry.status == EntryStatus::Started;
        if started && was_opted_in != opt_in {
            entry.event.option_control.insert(OptionControl::PARTIAL);
        }
        if !started && !opt_in {
            return;
        }

        let event = entry.event;
        let status = if opt_in {
            EventStatus::UserHasChooseToOptIn
        } else {
            EventStatus::UserHasChooseToOptOut
        };
        self.sink.report(&event, status, EsiTarget::All, now);
    }

    /// Marks an event cancelled; the cancellation is reported on the first
    /// tick at or after the computed cancel time.
    pub fn cancel(
        &mut self,
        endpoint: u8,
        event_id: u32,
        cancel_control: CancelControl,
        effective_time: u32,
        esi_index: u8,
        now: u32,
    ) {
        let Some(entries) = self.endpoints.get_mut(&endpoint) else {
            return;
        };
        let sender = EsiTarget::Index(esi_index);
        let Some(entry) = entries
            .iter_mut()
            .find(|e| e.status != EntryStatus::Void && e.event.event_id == event_id)
        else {
            self.sink.report(
                &LoadControlEvent::placeholder(endpoint, event_id),
                EventStatus::RejectedInvalidCancelUndefinedEvent,
                sender,
                now,
            );
            return;
        };

        if effective_time != START_TIME_INVALID && effective_time > entry.event.scheduled_end() {
            let event = entry.event;
            self.sink.report(
                &event,
                EventStatus::RejectedInvalidCancelCommandInvalidEffectiveTime,
                sender,
                now,
            );
            return;
        }

        let cancel_time = if cancel_control.contains(CancelControl::CANCEL_WITH_RANDOMIZATION) {
            let base = if effective_time == 0 { now } else { effective_time };
            let offset = if entry.event.duration_rand != 0 {
                entry.event.duration_rand
            } else {
                entry.event.start_rand
            };
            base.saturating_add(u32::from(offset))
        } else {
            effective_time
        };

        entry.status = EntryStatus::Cancelled;
        entry.event.trigger_time = cancel_time;
        debug!("[drlc-table] event 0x{event_id:08x} cancelled at {cancel_time}");
    }

    /// Cancels every non-void entry of `endpoint` effective immediately.
    ///
    /// Returns `false` when the endpoint held no entries.
    pub fn cancel_all(
        &mut self,
        endpoint: u8,
        cancel_control: CancelControl,
        esi_index: u8,
        now: u32,
    ) -> bool {
        let ids: Vec<u32> = self
            .entries(endpoint)
            .unwrap_or_default()
            .iter()
            .filter(|e| e.status != EntryStatus::Void)
            .map(|e| e.event.event_id)
            .collect();
        for &event_id in &ids {
            self.cancel(endpoint, event_id, cancel_control, 0, esi_index, now);
        }
        !ids.is_empty()
    }

    /// Forgets ESI `index` in every event of every endpoint.
    pub fn esi_deleted(&mut self, index: u8) {
        for entries in self.endpoints.values_mut() {
            for entry in entries.iter_mut() {
                entry.event.esi_bitmask.remove(index);
            }
        }
    }
}

fn void_all_with_event_id(entries: &mut [Entry], event_id: u32) {
    for entry in entries.iter_mut().filter(|e| e.event.event_id == event_id) {
        *entry = Entry::default();
    }
}

/// Display adapter listing the slots of one endpoint.
pub struct TableView<'a> {
    endpoint: u8,
    entries: &'a [Entry],
}

impl fmt::Display for TableView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "endpoint {} event table", self.endpoint)?;
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.status == EntryStatus::Void {
                writeln!(f, "  [{i}] void")?;
                continue;
            }
            let e = &entry.event;
            writeln!(
                f,
                "  [{i}] {:?} id=0x{:08x} start={} rand={}/{} dur={}min crit={} dc=0x{:04x} ueg={} opt=0x{:02x} esi=0x{:08x}",
                entry.status,
                e.event_id,
                e.start_time,
                e.start_rand,
                e.duration_rand,
                e.duration,
                e.criticality_level,
                e.device_class,
                e.utility_enrollment_group,
                e.option_control.bits(),
                e.esi_bitmask.bits(),
            )?;
        }
        Ok(())
    }
}
