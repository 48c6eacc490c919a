//! Host-stack collaborators consumed by the DRLC client: time, randomness,
//! and unicast transport.

use bytes::Bytes;
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::error::TransportError;
use crate::esi::EsiEntry;

/// Monotonic seconds-since-epoch source.
pub trait TimeSource {
    fn current_time(&self) -> u32;
}

/// Pseudo-random 16-bit source.
pub trait RandomSource {
    fn pseudo_random(&mut self) -> u16;
}

/// Unicast transport towards ESI peers.
pub trait Transport {
    /// Returns the next ZCL sequence number.
    fn next_sequence(&mut self) -> u8;

    /// Sends `frame` on `cluster_id` to the node described by `destination`.
    ///
    /// # Errors
    ///
    /// Returns a `TransportError` if the frame could not be queued.
    fn send_unicast(
        &mut self,
        destination: &EsiEntry,
        cluster_id: u16,
        frame: Bytes,
    ) -> Result<(), TransportError>;
}

/// Seeded `StdRng` wrapper for reproducible randomization offsets.
#[derive(Debug, Clone)]
pub struct SeededRandom {
    rng: StdRng,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl RandomSource for SeededRandom {
    fn pseudo_random(&mut self) -> u16 {
        self.rng.random::<u16>()
    }
}

/// A frame handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    pub destination: EsiEntry,
    pub cluster_id: u16,
    pub frame: Bytes,
}

/// Transport that records every frame instead of transmitting it.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    sequence: u8,
    sent: Vec<SentFrame>,
    unreachable: Vec<u16>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes sends to `node_id` fail with `TransportError::Unreachable`.
    pub fn mark_unreachable(&mut self, node_id: u16) {
        self.unreachable.push(node_id);
    }

    /// Frames sent so far.
    pub fn sent(&self) -> &[SentFrame] {
        &self.sent
    }

    /// Removes and returns all recorded frames.
    pub fn drain(&mut self) -> Vec<SentFrame> {
        std::mem::take(&mut self.sent)
    }
}

impl Transport for Outbox {
    fn next_sequence(&mut self) -> u8 {
        let seq = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        seq
    }

    fn send_unicast(
        &mut self,
        destination: &EsiEntry,
        cluster_id: u16,
        frame: Bytes,
    ) -> Result<(), TransportError> {
        if self.unreachable.contains(&destination.node_id) {
            return Err(TransportError::Unreachable(destination.node_id));
        }
        self.sent.push(SentFrame {
            destination: *destination,
            cluster_id,
            frame,
        });
        Ok(())
    }
}
