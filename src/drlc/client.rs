//! DRLC client protocol handler.
//!
//! Decodes incoming cluster commands, applies the device-class and
//! enrollment-group filter, builds event records (including randomization
//! offsets) and drives the [`EventTable`]. Outbound notifications flow back
//! through the table's [`StatusReporter`].

use std::sync::mpsc::Receiver;

use bytes::Bytes;
use log::{debug, warn};

use super::codec::{CancelCommand, DrlcCommand, LoadControlEventCommand, encode_get_scheduled_events};
use super::reporter::{EventActionHook, StatusReporter};
use super::table::EventTable;
use super::types::{
    CRITICALITY_MAX, CRITICALITY_MIN, CancelControl, EventControl, LoadControlEvent, OptionControl, START_TIME_NOW,
};
use super::{Attributes, CLUSTER_ID};
use crate::error::{CodecError, DrlcError, TransportError};
use crate::esi::{CommandSource, EsiDirectory, INVALID_ESI_INDEX};
use crate::stack::{RandomSource, TimeSource, Transport};
use crate::zcl::attributes::AttributeStore;
use crate::zcl::{FRAME_CONTROL_DISABLE_DEFAULT_RESPONSE, ZclHeader, ZclStatus};

/// What the framework should do after a frame was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The command was consumed; any response is a ReportEventStatus.
    Accepted,
    /// The command was dropped without a response.
    Ignored,
    /// A ZCL Default Response with this status is owed to the sender.
    DefaultResponse(ZclStatus),
}

/// Client side of the Demand Response and Load Control cluster.
pub struct DrlcClient<D, T, H, A, K, R> {
    table: EventTable<StatusReporter<D, T, H>>,
    attributes: A,
    clock: K,
    random: R,
    deletions: Receiver<u8>,
}

impl<D, T, H, A, K, R> DrlcClient<D, T, H, A, K, R>
where
    D: EsiDirectory,
    T: Transport,
    H: EventActionHook,
    A: AttributeStore,
    K: TimeSource,
    R: RandomSource,
{
    /// Creates a client with `table_size` event slots per endpoint.
    ///
    /// The client subscribes to ESI deletions of `directory` and applies them
    /// before every command, tick and opt request.
    pub fn new(
        table_size: usize,
        mut directory: D,
        transport: T,
        hook: H,
        attributes: A,
        clock: K,
        random: R,
    ) -> Self {
        let deletions = directory.subscribe_to_deletion();
        Self {
            table: EventTable::new(table_size, StatusReporter::new(directory, transport, hook)),
            attributes,
            clock,
            random,
            deletions,
        }
    }

    /// Registers `endpoint` as a DRLC client with an empty event table.
    pub fn client_init(&mut self, endpoint: u8) {
        debug!("[drlc] client init on endpoint {endpoint}");
        self.table.client_init(endpoint);
    }

    /// Once-per-second lifecycle step of `endpoint`.
    pub fn client_tick(&mut self, endpoint: u8) {
        self.drain_deletions();
        let now = self.clock.current_time();
        self.table.tick(endpoint, now);
    }

    /// Applies a user opt-in (`true`) or opt-out (`false`) to an event.
    pub fn opt_in_or_out(&mut self, endpoint: u8, event_id: u32, opt_in: bool) {
        self.drain_deletions();
        let now = self.clock.current_time();
        self.table.opt_in_or_out(endpoint, event_id, opt_in, now);
    }

    /// Handles one incoming ZCL frame addressed to this cluster.
    ///
    /// # Errors
    ///
    /// Returns `DrlcError::Codec` if the ZCL header cannot be parsed and
    /// `DrlcError::UnknownEndpoint` if the destination endpoint was never
    /// registered. Malformed payloads are not errors; they produce a
    /// `MalformedCommand` default response.
    pub fn handle_frame(&mut self, source: &CommandSource, frame: &[u8]) -> Result<Disposition, DrlcError> {
        let (header, payload) = ZclHeader::parse(frame)?;
        if !header.is_cluster_specific() || !header.is_server_to_client() {
            debug!(
                "[drlc] ignoring frame control 0x{:02x} from node 0x{:04x}",
                header.frame_control, source.node_id
            );
            return Ok(Disposition::Ignored);
        }
        let endpoint = source.destination_endpoint;
        if !self.table.is_client(endpoint) {
            return Err(DrlcError::UnknownEndpoint(endpoint));
        }

        let command = match DrlcCommand::decode(header.command_id, payload) {
            Ok(command) => command,
            Err(CodecError::UnknownCommand(id)) => {
                debug!("[drlc] unsupported command 0x{id:02x}");
                return Ok(Disposition::DefaultResponse(ZclStatus::UnsupClusterCommand));
            }
            Err(err) => {
                warn!("[drlc] malformed command from node 0x{:04x}: {err}", source.node_id);
                return Ok(Disposition::DefaultResponse(ZclStatus::MalformedCommand));
            }
        };

        let esi_index = self.table.sink_mut().directory_mut().update_and_get_index(source);
        // Indexing may evict an ESI and hand its index to this sender.
        self.drain_deletions();
        if esi_index == INVALID_ESI_INDEX {
            warn!(
                "[drlc] no ESI slot for node 0x{:04x}, ignoring command 0x{:02x}",
                source.node_id, header.command_id
            );
            return Ok(Disposition::Ignored);
        }

        let disposition = match command {
            DrlcCommand::LoadControlEvent(cmd) => self.handle_load_control_event(endpoint, &cmd, esi_index),
            DrlcCommand::Cancel(cmd) => self.handle_cancel(endpoint, &cmd, esi_index),
            DrlcCommand::CancelAll { cancel_control } => self.handle_cancel_all(endpoint, cancel_control, esi_index),
        };
        if disposition == Disposition::DefaultResponse(ZclStatus::Success)
            && header.frame_control & FRAME_CONTROL_DISABLE_DEFAULT_RESPONSE != 0
        {
            return Ok(Disposition::Accepted);
        }
        Ok(disposition)
    }

    /// Filters, builds and schedules a LoadControlEvent.
    ///
    /// Mismatched targets and reserved criticality levels are dropped
    /// without a response.
    pub fn handle_load_control_event(
        &mut self,
        endpoint: u8,
        cmd: &LoadControlEventCommand,
        esi_index: u8,
    ) -> Disposition {
        if !self.matches_device_filter(endpoint, cmd.device_class, cmd.utility_enrollment_group) {
            debug!(
                "[drlc] event 0x{:08x} not for endpoint {endpoint} (class 0x{:04x}, ueg {})",
                cmd.event_id, cmd.device_class, cmd.utility_enrollment_group
            );
            return Disposition::Ignored;
        }
        if !(CRITICALITY_MIN..=CRITICALITY_MAX).contains(&cmd.criticality_level) {
            debug!(
                "[drlc] event 0x{:08x} has reserved criticality {}",
                cmd.event_id, cmd.criticality_level
            );
            return Disposition::Ignored;
        }

        let now = self.clock.current_time();
        let mut event = LoadControlEvent {
            event_id: cmd.event_id,
            device_class: cmd.device_class,
            utility_enrollment_group: cmd.utility_enrollment_group,
            start_time: if cmd.start_time == START_TIME_NOW { now } else { cmd.start_time },
            duration: cmd.duration,
            criticality_level: cmd.criticality_level,
            cooling_temp_offset: cmd.cooling_temp_offset,
            heating_temp_offset: cmd.heating_temp_offset,
            cooling_temp_set_point: cmd.cooling_temp_set_point,
            heating_temp_set_point: cmd.heating_temp_set_point,
            avg_load_percentage: cmd.avg_load_percentage,
            duty_cycle: cmd.duty_cycle,
            event_control: cmd.event_control,
            option_control: OptionControl::OPT_IN,
            destination_endpoint: endpoint,
            ..LoadControlEvent::default()
        };
        if event.event_control.contains(EventControl::RANDOMIZE_START_TIME) {
            event.start_rand = self.random_offset(endpoint, Attributes::StartRandomizationMinutes);
        }
        if event.event_control.contains(EventControl::RANDOMIZE_DURATION_TIME) {
            event.duration_rand = self.random_offset(endpoint, Attributes::DurationRandomizationMinutes);
        }

        self.table.schedule(endpoint, event, esi_index, now);
        Disposition::Accepted
    }

    /// Filters and applies a CancelLoadControlEvent.
    pub fn handle_cancel(&mut self, endpoint: u8, cmd: &CancelCommand, esi_index: u8) -> Disposition {
        if !self.matches_device_filter(endpoint, cmd.device_class, cmd.utility_enrollment_group) {
            debug!("[drlc] cancel of 0x{:08x} not for endpoint {endpoint}", cmd.event_id);
            return Disposition::Ignored;
        }
        let now = self.clock.current_time();
        self.table.cancel(
            endpoint,
            cmd.event_id,
            cmd.cancel_control,
            cmd.effective_time,
            esi_index,
            now,
        );
        Disposition::Accepted
    }

    /// Applies a CancelAllLoadControlEvents.
    ///
    /// An endpoint without entries owes the sender a successful default
    /// response since no status report will follow.
    pub fn handle_cancel_all(&mut self, endpoint: u8, cancel_control: CancelControl, esi_index: u8) -> Disposition {
        let now = self.clock.current_time();
        if self.table.cancel_all(endpoint, cancel_control, esi_index, now) {
            Disposition::Accepted
        } else {
            Disposition::DefaultResponse(ZclStatus::Success)
        }
    }

    /// Whether a command targeting `device_class`/`ueg` applies to `endpoint`.
    ///
    /// The device class must always intersect the configured one. The
    /// enrollment group matches when either side is zero or both are equal.
    /// An unreadable attribute is a mismatch.
    pub fn matches_device_filter(&self, endpoint: u8, device_class: u16, ueg: u8) -> bool {
        let Some(configured_ueg) = self
            .attributes
            .read_u8(endpoint, Attributes::UtilityEnrollmentGroup.id())
        else {
            return false;
        };
        let Some(configured_class) = self
            .attributes
            .read_u16(endpoint, Attributes::DeviceClassValue.id())
        else {
            return false;
        };
        if configured_class & device_class == 0 {
            return false;
        }
        configured_ueg == 0 || ueg == 0 || configured_ueg == ueg
    }

    /// Asks the ESI at `esi_index` to resend events starting at or after `start_time`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Unreachable(0xFFFF)` when the index does not
    /// resolve, or the transport's own error.
    pub fn request_scheduled_events(
        &mut self,
        esi_index: u8,
        start_time: u32,
        number_of_events: u8,
    ) -> Result<(), TransportError> {
        let reporter = self.table.sink_mut();
        let Some(destination) = reporter.directory().lookup_by_index(esi_index) else {
            return Err(TransportError::Unreachable(0xFFFF));
        };
        let sequence = reporter.transport_mut().next_sequence();
        let frame: Bytes = encode_get_scheduled_events(sequence, start_time, number_of_events);
        reporter
            .transport_mut()
            .send_unicast(&destination, CLUSTER_ID, frame)
    }

    pub fn table(&self) -> &EventTable<StatusReporter<D, T, H>> {
        &self.table
    }

    pub fn directory(&self) -> &D {
        self.table.sink().directory()
    }

    pub fn directory_mut(&mut self) -> &mut D {
        self.table.sink_mut().directory_mut()
    }

    pub fn transport(&self) -> &T {
        self.table.sink().transport()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.table.sink_mut().transport_mut()
    }

    pub fn attributes_mut(&mut self) -> &mut A {
        &mut self.attributes
    }

    pub fn clock(&self) -> &K {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut K {
        &mut self.clock
    }

    fn random_offset(&mut self, endpoint: u8, attribute: Attributes) -> u16 {
        let minutes = self.attributes.read_u8(endpoint, attribute.id()).unwrap_or(0);
        if minutes == 0 {
            return 0;
        }
        let window = u32::from(minutes) * 60;
        // Largest window is 255 minutes, which fits in u16.
        (u32::from(self.random.pseudo_random()) % window) as u16
    }

    fn drain_deletions(&mut self) {
        while let Ok(index) = self.deletions.try_recv() {
            debug!("[drlc] forgetting deleted esi {index}");
            self.table.esi_deleted(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drlc::codec::ReportEventStatus;
    use crate::drlc::reporter::AcceptAll;
    use crate::drlc::types::{EntryStatus, EventStatus};
    use crate::esi::EsiTable;
    use crate::sim::clock::SimClock;
    use crate::stack::{Outbox, SeededRandom};
    use crate::zcl::attributes::{AttributeTable, AttributeValue};

    type Client = DrlcClient<EsiTable, Outbox, AcceptAll, AttributeTable, SimClock, SeededRandom>;

    fn attributes(ueg: u8, class: u16, start_minutes: u8) -> AttributeTable {
        let mut a = AttributeTable::new();
        a.define(1, Attributes::UtilityEnrollmentGroup.id(), AttributeValue::U8(ueg));
        a.define(1, Attributes::DeviceClassValue.id(), AttributeValue::U16(class));
        a.define(1, Attributes::StartRandomizationMinutes.id(), AttributeValue::U8(start_minutes));
        a.define(1, Attributes::DurationRandomizationMinutes.id(), AttributeValue::U8(0));
        a
    }

    fn client(attrs: AttributeTable) -> Client {
        let mut c = DrlcClient::new(
            3,
            EsiTable::new(2, 4),
            Outbox::new(),
            AcceptAll,
            attrs,
            SimClock::new(1_000, 3_600),
            SeededRandom::new(1),
        );
        c.client_init(1);
        c
    }

    fn lce(event_id: u32, class: u16, ueg: u8) -> LoadControlEventCommand {
        LoadControlEventCommand {
            event_id,
            device_class: class,
            utility_enrollment_group: ueg,
            start_time: START_TIME_NOW,
            duration: 60,
            criticality_level: 1,
            ..LoadControlEventCommand::default()
        }
    }

    fn source(eui64: u64) -> CommandSource {
        CommandSource {
            eui64,
            node_id: eui64 as u16,
            source_endpoint: 1,
            destination_endpoint: 1,
            network_index: 0,
        }
    }

    #[test]
    fn filter_requires_device_class_overlap() {
        let c = client(attributes(0, 0x0001, 0));
        assert!(c.matches_device_filter(1, 0x0003, 7));
        assert!(!c.matches_device_filter(1, 0x0002, 0));
    }

    #[test]
    fn filter_matches_groups() {
        let c = client(attributes(4, 0x0001, 0));
        assert!(c.matches_device_filter(1, 0x0001, 0));
        assert!(c.matches_device_filter(1, 0x0001, 4));
        assert!(!c.matches_device_filter(1, 0x0001, 5));
    }

    #[test]
    fn filter_fails_on_missing_attribute() {
        let mut attrs = attributes(0, 0x0001, 0);
        attrs.undefine(1, Attributes::DeviceClassValue.id());
        let c = client(attrs);
        assert!(!c.matches_device_filter(1, 0x0001, 0));
    }

    #[test]
    fn start_now_uses_current_time_and_opts_in() {
        let mut c = client(attributes(0, 0x0001, 0));
        assert_eq!(c.handle_load_control_event(1, &lce(1, 1, 0), 0), Disposition::Accepted);
        let entry = c.table().entries(1).unwrap()[0];
        assert_eq!(entry.status, EntryStatus::Scheduled);
        assert_eq!(entry.event.start_time, 1_000);
        assert!(entry.event.is_opted_in());
        assert_eq!(entry.event.destination_endpoint, 1);
    }

    #[test]
    fn reserved_criticality_is_silently_dropped() {
        let mut c = client(attributes(0, 0x0001, 0));
        for level in [0x00, 0x10] {
            let mut cmd = lce(1, 1, 0);
            cmd.criticality_level = level;
            assert_eq!(c.handle_load_control_event(1, &cmd, 0), Disposition::Ignored);
        }
        assert!(c.transport().sent().is_empty());
    }

    #[test]
    fn start_randomization_stays_inside_window() {
        let mut c = client(attributes(0, 0x0001, 2));
        let mut cmd = lce(1, 1, 0);
        cmd.event_control = EventControl::RANDOMIZE_START_TIME | EventControl::RANDOMIZE_DURATION_TIME;
        c.handle_load_control_event(1, &cmd, 0);
        let event = c.table().entries(1).unwrap()[0].event;
        assert!(event.start_rand < 120);
        // Zero minutes disables duration randomization.
        assert_eq!(event.duration_rand, 0);
    }

    #[test]
    fn frame_from_new_sender_is_indexed_and_acknowledged() {
        let mut c = client(attributes(0, 0x0001, 0));
        let frame = DrlcCommand::LoadControlEvent(lce(9, 1, 0)).encode(1);
        assert_eq!(c.handle_frame(&source(0xA), &frame).unwrap(), Disposition::Accepted);
        let sent = c.transport().sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].destination.node_id, 0xA);
    }

    #[test]
    fn truncated_payload_owes_malformed_response() {
        let mut c = client(attributes(0, 0x0001, 0));
        let frame = [0x09, 0x01, 0x00, 0x01, 0x02];
        assert_eq!(
            c.handle_frame(&source(0xA), &frame).unwrap(),
            Disposition::DefaultResponse(ZclStatus::MalformedCommand)
        );
    }

    #[test]
    fn unknown_endpoint_is_an_error() {
        let mut c = client(attributes(0, 0x0001, 0));
        let mut src = source(0xA);
        src.destination_endpoint = 9;
        let frame = DrlcCommand::CancelAll {
            cancel_control: CancelControl::empty(),
        }
        .encode(1);
        assert!(matches!(
            c.handle_frame(&src, &frame),
            Err(DrlcError::UnknownEndpoint(9))
        ));
    }

    #[test]
    fn cancel_all_on_empty_table_owes_success() {
        let mut c = client(attributes(0, 0x0001, 0));
        let frame = DrlcCommand::CancelAll {
            cancel_control: CancelControl::empty(),
        }
        .encode(1);
        assert_eq!(
            c.handle_frame(&source(0xA), &frame).unwrap(),
            Disposition::DefaultResponse(ZclStatus::Success)
        );
    }

    #[test]
    fn sender_rejected_by_directory_is_ignored() {
        let mut c = client(attributes(0, 0x0001, 0));
        let frame = DrlcCommand::LoadControlEvent(lce(1, 1, 0)).encode(1);
        c.handle_frame(&source(0xA), &frame).unwrap();
        c.handle_frame(&source(0xB), &frame).unwrap();
        assert_eq!(
            c.handle_frame(&source(0xC), &frame).unwrap(),
            Disposition::Ignored
        );
    }

    #[test]
    fn evicted_esi_is_forgotten_before_next_tick() {
        let mut c = client(attributes(0, 0x0001, 0));
        let frame = DrlcCommand::LoadControlEvent(lce(1, 1, 0)).encode(1);
        c.handle_frame(&source(0xA), &frame).unwrap();
        c.directory_mut().remove(0);
        c.clock_mut().tick();
        c.client_tick(1);
        let entry = c.table().entries(1).unwrap()[0];
        assert_eq!(entry.status, EntryStatus::Started);
        assert!(entry.event.esi_bitmask.is_empty());
        // Only the receipt was sent; the start report had nobody to go to.
        assert_eq!(c.transport().sent().len(), 1);
    }

    fn reused_index_client() -> Client {
        let mut c = DrlcClient::new(
            3,
            EsiTable::new(2, 1),
            Outbox::new(),
            AcceptAll,
            attributes(0, 0x0001, 0),
            SimClock::new(1_000, 3_600),
            SeededRandom::new(1),
        );
        c.client_init(1);
        let frame = DrlcCommand::LoadControlEvent(lce(1, 1, 0)).encode(1);
        c.handle_frame(&source(0xA), &frame).unwrap();
        c.handle_frame(&source(0xB), &frame).unwrap();
        c.transport_mut().drain();
        c
    }

    fn sent_to(c: &Client, node_id: u16) -> Vec<(u32, EventStatus)> {
        c.transport()
            .sent()
            .iter()
            .filter(|s| s.destination.node_id == node_id)
            .filter_map(|s| ReportEventStatus::decode(&s.frame).ok())
            .map(|(_, r)| (r.event_id, r.status))
            .collect()
    }

    #[test]
    fn sender_taking_an_evicted_index_joins_shared_event() {
        let mut c = reused_index_client();
        let frame = DrlcCommand::LoadControlEvent(lce(1, 1, 0)).encode(2);
        c.handle_frame(&source(0xC), &frame).unwrap();

        assert_eq!(c.directory().lookup_by_index(0).map(|e| e.eui64), Some(0xC));
        assert_eq!(sent_to(&c, 0xC), vec![(1, EventStatus::LoadControlEventCommandRx)]);
        let entry = c.table().entries(1).unwrap()[0];
        assert_eq!(entry.event.esi_bitmask.bits(), 0b11);
    }

    #[test]
    fn sender_taking_an_evicted_index_keeps_its_own_event() {
        let mut c = reused_index_client();
        let frame = DrlcCommand::LoadControlEvent(lce(2, 1, 0)).encode(2);
        c.handle_frame(&source(0xC), &frame).unwrap();

        let second = |c: &Client| {
            c.table()
                .entries(1)
                .unwrap()
                .iter()
                .find(|e| e.event.event_id == 2)
                .map(|e| e.event.esi_bitmask.bits())
        };
        assert_eq!(second(&c), Some(0b01));
        c.clock_mut().tick();
        c.client_tick(1);
        assert_eq!(second(&c), Some(0b01));
    }

    #[test]
    fn scheduled_events_request_goes_to_resolved_esi() {
        let mut c = client(attributes(0, 0x0001, 0));
        assert_eq!(
            c.request_scheduled_events(0, 0, 5),
            Err(TransportError::Unreachable(0xFFFF))
        );
        let frame = DrlcCommand::CancelAll {
            cancel_control: CancelControl::empty(),
        }
        .encode(1);
        c.handle_frame(&source(0xA), &frame).unwrap();
        c.request_scheduled_events(0, 0, 5).unwrap();
        let sent = c.transport().sent().last().unwrap();
        assert_eq!(sent.frame[2], 0x01);
    }
}
