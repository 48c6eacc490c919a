//! Turns table notifications into ReportEventStatus frames addressed to ESIs.

use log::{debug, info, warn};

use super::CLUSTER_ID;
use super::codec::ReportEventStatus;
use super::table::{EsiTarget, NotificationSink};
use super::types::{EventStatus, LoadControlEvent};
use crate::esi::{EsiDirectory, EsiEntry};
use crate::stack::Transport;

/// Application hook consulted before every status report.
///
/// Returning `false` suppresses the ReportEventStatus for that transition.
pub trait EventActionHook {
    fn event_action(&mut self, event: &LoadControlEvent, status: EventStatus, sequence_number: u8) -> bool;
}

/// Hook that lets every report through.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl EventActionHook for AcceptAll {
    fn event_action(&mut self, event: &LoadControlEvent, status: EventStatus, sequence_number: u8) -> bool {
        debug!(
            "[drlc] event 0x{:08x} on endpoint {}: {status} (seq {sequence_number})",
            event.event_id, event.destination_endpoint
        );
        true
    }
}

impl<F> EventActionHook for F
where
    F: FnMut(&LoadControlEvent, EventStatus, u8) -> bool,
{
    fn event_action(&mut self, event: &LoadControlEvent, status: EventStatus, sequence_number: u8) -> bool {
        self(event, status, sequence_number)
    }
}

/// [`NotificationSink`] that resolves ESI indices and sends reports.
///
/// One sequence number is drawn per notification and shared by every frame
/// it produces.
#[derive(Debug)]
pub struct StatusReporter<D, T, H = AcceptAll> {
    directory: D,
    transport: T,
    hook: H,
}

impl<D: EsiDirectory, T: Transport, H: EventActionHook> StatusReporter<D, T, H> {
    pub fn new(directory: D, transport: T, hook: H) -> Self {
        Self {
            directory,
            transport,
            hook,
        }
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn directory_mut(&mut self) -> &mut D {
        &mut self.directory
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn send(&mut self, index: u8, destination: &EsiEntry, report: &ReportEventStatus, sequence: u8) {
        let frame = report.encode(sequence);
        match self.transport.send_unicast(destination, CLUSTER_ID, frame) {
            Ok(()) => info!(
                "[drlc] report 0x{:08x} {} -> esi {index} (node 0x{:04x})",
                report.event_id, report.status, destination.node_id
            ),
            Err(err) => warn!(
                "[drlc] report 0x{:08x} to esi {index} failed: {err}",
                report.event_id
            ),
        }
    }
}

impl<D: EsiDirectory, T: Transport, H: EventActionHook> NotificationSink for StatusReporter<D, T, H> {
    fn report(&mut self, event: &LoadControlEvent, status: EventStatus, target: EsiTarget, now: u32) {
        let sequence = self.transport.next_sequence();
        if !self.hook.event_action(event, status, sequence) {
            debug!(
                "[drlc] report {status} for 0x{:08x} suppressed by application",
                event.event_id
            );
            return;
        }

        let report = ReportEventStatus::new(event, status, now);
        let indices: Vec<u8> = match target {
            EsiTarget::Index(index) => vec![index],
            EsiTarget::All => event.esi_bitmask.iter().collect(),
        };
        for index in indices {
            match self.directory.lookup_by_index(index) {
                Some(destination) => self.send(index, &destination, &report, sequence),
                None => debug!("[drlc] esi {index} no longer resolves, report dropped"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drlc::types::EsiBitmask;
    use crate::esi::{CommandSource, EsiTable};
    use crate::stack::Outbox;

    fn directory(peers: u64) -> EsiTable {
        let mut table = EsiTable::new(4, 4);
        for eui64 in 1..=peers {
            table.update_and_get_index(&CommandSource {
                eui64,
                node_id: 0x1000 + eui64 as u16,
                source_endpoint: 1,
                destination_endpoint: 1,
                network_index: 0,
            });
        }
        table
    }

    fn event(bits: &[u8]) -> LoadControlEvent {
        let mut esi_bitmask = EsiBitmask::EMPTY;
        for b in bits {
            esi_bitmask.insert(*b);
        }
        LoadControlEvent {
            event_id: 5,
            esi_bitmask,
            ..LoadControlEvent::default()
        }
    }

    #[test]
    fn broadcast_sends_one_frame_per_resolvable_esi() {
        let mut reporter = StatusReporter::new(directory(2), Outbox::new(), AcceptAll);
        reporter.report(&event(&[0, 1, 3]), EventStatus::EventStarted, EsiTarget::All, 10);
        let nodes: Vec<u16> = reporter
            .transport()
            .sent()
            .iter()
            .map(|f| f.destination.node_id)
            .collect();
        assert_eq!(nodes, vec![0x1001, 0x1002]);
        assert!(reporter.transport().sent().iter().all(|f| f.cluster_id == CLUSTER_ID));
    }

    #[test]
    fn single_target_ignores_bitmask() {
        let mut reporter = StatusReporter::new(directory(2), Outbox::new(), AcceptAll);
        reporter.report(
            &event(&[0, 1]),
            EventStatus::RejectedEventExpired,
            EsiTarget::Index(1),
            10,
        );
        let sent = reporter.transport().sent();
        assert_eq!(sent.len(), 1);
        let (_, report) = ReportEventStatus::decode(&sent[0].frame).unwrap();
        assert_eq!(report.status, EventStatus::RejectedEventExpired);
        assert_eq!(report.status_time, 10);
    }

    #[test]
    fn hook_can_swallow_reports() {
        let hook = |_: &LoadControlEvent, status: EventStatus, _: u8| status != EventStatus::EventStarted;
        let mut reporter = StatusReporter::new(directory(1), Outbox::new(), hook);
        reporter.report(&event(&[0]), EventStatus::EventStarted, EsiTarget::All, 10);
        assert!(reporter.transport().sent().is_empty());
        reporter.report(&event(&[0]), EventStatus::EventCompleted, EsiTarget::All, 70);
        assert_eq!(reporter.transport().sent().len(), 1);
    }

    #[test]
    fn transport_failure_does_not_stop_other_sends() {
        let mut outbox = Outbox::new();
        outbox.mark_unreachable(0x1001);
        let mut reporter = StatusReporter::new(directory(2), outbox, AcceptAll);
        reporter.report(&event(&[0, 1]), EventStatus::EventStarted, EsiTarget::All, 10);
        assert_eq!(reporter.transport().sent().len(), 1);
        assert_eq!(reporter.transport().sent()[0].destination.node_id, 0x1002);
    }
}
