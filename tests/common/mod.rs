//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use drlc_client::drlc::codec::{DrlcCommand, LoadControlEventCommand, ReportEventStatus};
use drlc_client::drlc::types::{EventStatus, START_TIME_NOW};
use drlc_client::drlc::{AcceptAll, Attributes, Disposition, DrlcClient, EventActionHook};
use drlc_client::esi::{CommandSource, EsiTable};
use drlc_client::sim::clock::SimClock;
use drlc_client::stack::{Outbox, SeededRandom};
use drlc_client::zcl::attributes::{AttributeTable, AttributeValue};

/// Client endpoint used by every fixture.
pub const ENDPOINT: u8 = 1;
/// Clock value at the start of every fixture.
pub const NOW: u32 = 1_000_000;

pub type TestClient<H = AcceptAll> = DrlcClient<EsiTable, Outbox, H, AttributeTable, SimClock, SeededRandom>;

/// DRLC attributes of [`ENDPOINT`]: no randomization.
pub fn attributes(ueg: u8, device_class: u16) -> AttributeTable {
    let mut a = AttributeTable::new();
    a.define(ENDPOINT, Attributes::UtilityEnrollmentGroup.id(), AttributeValue::U8(ueg));
    a.define(ENDPOINT, Attributes::DeviceClassValue.id(), AttributeValue::U16(device_class));
    a.define(ENDPOINT, Attributes::StartRandomizationMinutes.id(), AttributeValue::U8(0));
    a.define(ENDPOINT, Attributes::DurationRandomizationMinutes.id(), AttributeValue::U8(0));
    a
}

/// Client on [`ENDPOINT`] with `table_size` slots, a 4-slot ESI directory,
/// and class 0x0003 / UEG 0 attributes.
pub fn client(table_size: usize) -> TestClient {
    client_with_hook(table_size, AcceptAll)
}

pub fn client_with_hook<H: EventActionHook>(table_size: usize, hook: H) -> TestClient<H> {
    let mut c = DrlcClient::new(
        table_size,
        EsiTable::new(4, 2),
        Outbox::new(),
        hook,
        attributes(0, 0x0003),
        SimClock::new(NOW, 86_400),
        SeededRandom::new(42),
    );
    c.client_init(ENDPOINT);
    c
}

/// Command source of ESI peer `n` (node id `n`).
pub fn esi(n: u16) -> CommandSource {
    CommandSource {
        eui64: 0x00AA_0000_0000_0000 | u64::from(n),
        node_id: n,
        source_endpoint: 1,
        destination_endpoint: ENDPOINT,
        network_index: 0,
    }
}

/// LoadControlEvent for device class 0x0001, any group, criticality 1.
pub fn lce(event_id: u32, start_time: u32, duration: u16) -> LoadControlEventCommand {
    LoadControlEventCommand {
        event_id,
        device_class: 0x0001,
        utility_enrollment_group: 0,
        start_time,
        duration,
        criticality_level: 1,
        ..LoadControlEventCommand::default()
    }
}

/// LoadControlEvent starting now.
pub fn lce_now(event_id: u32, duration: u16) -> LoadControlEventCommand {
    lce(event_id, START_TIME_NOW, duration)
}

/// Encodes `command` and hands it to the client as if sent by `source`.
pub fn send<H: EventActionHook>(client: &mut TestClient<H>, source: &CommandSource, command: DrlcCommand) -> Disposition {
    let frame = command.encode(0x10);
    client
        .handle_frame(source, &frame)
        .unwrap_or_else(|e| panic!("frame rejected: {e}"))
}

/// Advances the clock by `seconds`, ticking [`ENDPOINT`] after each second.
pub fn advance<H: EventActionHook>(client: &mut TestClient<H>, seconds: u32) {
    for _ in 0..seconds {
        client.clock_mut().tick();
        client.client_tick(ENDPOINT);
    }
}

/// Drains the outbox and decodes every ReportEventStatus as
/// `(node_id, event_id, status)`.
pub fn reports<H: EventActionHook>(client: &mut TestClient<H>) -> Vec<(u16, u32, EventStatus)> {
    client
        .transport_mut()
        .drain()
        .into_iter()
        .filter_map(|sent| {
            ReportEventStatus::decode(&sent.frame)
                .ok()
                .map(|(_, r)| (sent.destination.node_id, r.event_id, r.status))
        })
        .collect()
}
