//! Scripted scenario engine: plays ESI commands and user actions against a
//! DRLC client, ticks every endpoint once per second, and records the
//! reports that leave the client.

use log::{debug, info, warn};

use crate::config::{ActionConfig, EsiPeerConfig, ScenarioConfig};
use crate::drlc::codec::{CancelCommand, DrlcCommand, LoadControlEventCommand, ReportEventStatus};
use crate::drlc::reporter::AcceptAll;
use crate::drlc::types::{CancelControl, EventControl, START_TIME_NOW};
use crate::drlc::{Attributes, CLUSTER_ID, Disposition, DrlcClient};
use crate::esi::{CommandSource, EsiEntry, EsiTable};
use crate::stack::{Outbox, SeededRandom, TimeSource, Transport};
use crate::zcl::attributes::{AttributeTable, AttributeValue};
use crate::zcl::encode_default_response;

use super::clock::SimClock;
use super::summary::RunSummary;
use super::types::ReportRecord;

/// DRLC client wired to the in-memory collaborators.
pub type SimClient = DrlcClient<EsiTable, Outbox, AcceptAll, AttributeTable, SimClock, SeededRandom>;

/// Simulation engine owning the client, the ESI peers, and the action script.
pub struct Engine {
    client: SimClient,
    peers: Vec<EsiPeerConfig>,
    actions: Vec<ActionConfig>,
    next_action: usize,
    endpoints: Vec<u8>,
    start_time: u32,
    esi_sequence: u8,
    records: Vec<ReportRecord>,
    default_responses: usize,
}

impl Engine {
    /// Builds the client and its collaborators from a scenario.
    ///
    /// Every configured endpoint is registered and receives the configured
    /// DRLC attribute values. The configuration is assumed validated.
    pub fn from_config(config: &ScenarioConfig) -> Self {
        let s = &config.simulation;
        let mut attributes = AttributeTable::new();
        let a = &config.attributes;
        for &endpoint in &config.client.endpoints {
            attributes.define(
                endpoint,
                Attributes::UtilityEnrollmentGroup.id(),
                AttributeValue::U8(a.utility_enrollment_group),
            );
            attributes.define(
                endpoint,
                Attributes::StartRandomizationMinutes.id(),
                AttributeValue::U8(a.start_randomization_minutes),
            );
            attributes.define(
                endpoint,
                Attributes::DurationRandomizationMinutes.id(),
                AttributeValue::U8(a.duration_randomization_minutes),
            );
            attributes.define(
                endpoint,
                Attributes::DeviceClassValue.id(),
                AttributeValue::U16(a.device_class),
            );
        }

        let mut client = DrlcClient::new(
            config.client.table_size,
            EsiTable::new(config.esi.table_size, config.esi.min_erasing_age),
            Outbox::new(),
            AcceptAll,
            attributes,
            SimClock::new(s.start_time, s.seconds),
            SeededRandom::new(s.seed),
        );
        for &endpoint in &config.client.endpoints {
            client.client_init(endpoint);
        }

        let mut actions = config.actions.clone();
        actions.sort_by_key(ActionConfig::at);

        Self {
            client,
            peers: config.esis.clone(),
            actions,
            next_action: 0,
            endpoints: config.client.endpoints.clone(),
            start_time: s.start_time,
            esi_sequence: 0,
            records: Vec::new(),
            default_responses: 0,
        }
    }

    /// Processes the current second: due actions first, then one tick per
    /// endpoint, then collection of the frames sent.
    pub fn step(&mut self) {
        let now = self.client.clock().current_time();
        let offset = now.saturating_sub(self.start_time);

        while let Some(action) = self
            .actions
            .get(self.next_action)
            .filter(|a| a.at() <= offset)
            .cloned()
        {
            self.next_action += 1;
            self.apply(&action, now);
        }

        for i in 0..self.endpoints.len() {
            let endpoint = self.endpoints[i];
            self.client.client_tick(endpoint);
        }

        self.collect(offset);
    }

    /// Runs the whole scenario and returns the report log.
    pub fn run(&mut self) -> Vec<ReportRecord> {
        self.step();
        while self.client.clock_mut().tick().is_some() {
            self.step();
        }
        for &endpoint in &self.endpoints {
            if let Some(view) = self.client.table().view(endpoint) {
                debug!("[engine] final table\n{view}");
            }
        }
        std::mem::take(&mut self.records)
    }

    /// Reports collected since the last [`Engine::run`].
    pub fn records(&self) -> &[ReportRecord] {
        &self.records
    }

    /// Summary of `records` together with this engine's default responses.
    pub fn summary(&self, records: &[ReportRecord]) -> RunSummary {
        RunSummary::from_records(records, self.default_responses)
    }

    pub fn default_responses(&self) -> usize {
        self.default_responses
    }

    pub fn client(&self) -> &SimClient {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut SimClient {
        &mut self.client
    }

    fn apply(&mut self, action: &ActionConfig, now: u32) {
        match *action {
            ActionConfig::LoadControlEvent {
                esi,
                endpoint,
                event_id,
                start,
                duration,
                criticality,
                device_class,
                utility_enrollment_group,
                randomize_start,
                randomize_duration,
                ..
            } => {
                let mut event_control = EventControl::empty();
                event_control.set(EventControl::RANDOMIZE_START_TIME, randomize_start);
                event_control.set(EventControl::RANDOMIZE_DURATION_TIME, randomize_duration);
                let command = LoadControlEventCommand {
                    event_id,
                    device_class,
                    utility_enrollment_group,
                    start_time: start.map_or(START_TIME_NOW, |s| self.start_time.saturating_add(s)),
                    duration,
                    criticality_level: criticality,
                    // Unused device payload fields carry their "ignore" values.
                    cooling_temp_offset: 0xFF,
                    heating_temp_offset: 0xFF,
                    cooling_temp_set_point: i16::MIN,
                    heating_temp_set_point: i16::MIN,
                    avg_load_percentage: 0x80,
                    duty_cycle: 0xFF,
                    event_control,
                };
                self.deliver(esi, endpoint, DrlcCommand::LoadControlEvent(command));
            }
            ActionConfig::Cancel {
                esi,
                endpoint,
                event_id,
                device_class,
                utility_enrollment_group,
                randomize,
                effective,
                ..
            } => {
                let command = CancelCommand {
                    event_id,
                    device_class,
                    utility_enrollment_group,
                    cancel_control: cancel_control(randomize),
                    effective_time: effective.map_or(0, |e| self.start_time.saturating_add(e)),
                };
                self.deliver(esi, endpoint, DrlcCommand::Cancel(command));
            }
            ActionConfig::CancelAll {
                esi,
                endpoint,
                randomize,
                ..
            } => {
                let command = DrlcCommand::CancelAll {
                    cancel_control: cancel_control(randomize),
                };
                self.deliver(esi, endpoint, command);
            }
            ActionConfig::OptIn {
                endpoint, event_id, ..
            } => self.client.opt_in_or_out(endpoint, event_id, true),
            ActionConfig::OptOut {
                endpoint, event_id, ..
            } => self.client.opt_in_or_out(endpoint, event_id, false),
            ActionConfig::EvictEsi { index, .. } => {
                if self.client.directory_mut().remove(index).is_none() {
                    warn!("[engine] no ESI at index {index} to evict");
                }
            }
            ActionConfig::RequestScheduledEvents {
                index,
                number_of_events,
                ..
            } => match self
                .client
                .request_scheduled_events(index, now, number_of_events)
            {
                Ok(()) => info!("[engine] requested scheduled events from esi {index}"),
                Err(e) => warn!("[engine] scheduled events request to esi {index} failed: {e}"),
            },
        }
    }

    /// Hands a command from peer `esi` to the client as a ZCL frame.
    fn deliver(&mut self, esi: usize, endpoint: u8, command: DrlcCommand) {
        let Some(peer) = self.peers.get(esi).cloned() else {
            warn!("[engine] no ESI peer {esi}, command dropped");
            return;
        };
        let sequence = self.esi_sequence;
        self.esi_sequence = self.esi_sequence.wrapping_add(1);
        let frame = command.encode(sequence);
        let source = CommandSource {
            eui64: peer.eui64,
            node_id: peer.node_id,
            source_endpoint: peer.endpoint,
            destination_endpoint: endpoint,
            network_index: peer.network_index,
        };

        match self.client.handle_frame(&source, &frame) {
            Ok(Disposition::DefaultResponse(status)) => {
                let destination = EsiEntry {
                    eui64: peer.eui64,
                    node_id: peer.node_id,
                    endpoint: peer.endpoint,
                    network_index: peer.network_index,
                    age: 0,
                };
                let response = encode_default_response(sequence, command.command_id(), status);
                match self
                    .client
                    .transport_mut()
                    .send_unicast(&destination, CLUSTER_ID, response)
                {
                    Ok(()) => {
                        self.default_responses += 1;
                        info!(
                            "[engine] default response {status:?} -> node 0x{:04x}",
                            peer.node_id
                        );
                    }
                    Err(e) => warn!("[engine] default response failed: {e}"),
                }
            }
            Ok(disposition) => debug!(
                "[engine] command 0x{:02x} from node 0x{:04x}: {disposition:?}",
                command.command_id(),
                peer.node_id
            ),
            Err(e) => warn!("[engine] command from node 0x{:04x} failed: {e}", peer.node_id),
        }
    }

    fn collect(&mut self, offset: u32) {
        for sent in self.client.transport_mut().drain() {
            match ReportEventStatus::decode(&sent.frame) {
                Ok((header, report)) => {
                    self.records
                        .push(ReportRecord::new(offset, header.sequence, &sent.destination, &report));
                }
                Err(_) => debug!(
                    "[engine] non-report frame to node 0x{:04x}",
                    sent.destination.node_id
                ),
            }
        }
    }
}

fn cancel_control(randomize: bool) -> CancelControl {
    if randomize {
        CancelControl::CANCEL_WITH_RANDOMIZATION
    } else {
        CancelControl::empty()
    }
}
