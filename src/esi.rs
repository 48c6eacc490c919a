//! Energy Service Interface directory: the utility-side peers that issue
//! DRLC events, indexed by a small table slot number.

use std::sync::mpsc::{self, Receiver, Sender};

use log::{debug, info};

/// Index value meaning "no ESI" (table full or unknown sender).
pub const INVALID_ESI_INDEX: u8 = 0xFF;
/// Upper bound on ESI table size; event records track ESIs in a 32-bit set.
pub const MAX_ESI_TABLE_SIZE: usize = 32;

/// One known ESI peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EsiEntry {
    pub eui64: u64,
    pub node_id: u16,
    pub endpoint: u8,
    pub network_index: u8,
    /// Number of newer ESIs admitted since this one was last heard from.
    pub age: u8,
}

/// Addressing information of an incoming command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSource {
    pub eui64: u64,
    pub node_id: u16,
    pub source_endpoint: u8,
    /// Local endpoint the command is addressed to.
    pub destination_endpoint: u8,
    pub network_index: u8,
}

/// Keyed lookup of ESI records.
pub trait EsiDirectory {
    fn lookup_by_index(&self, index: u8) -> Option<EsiEntry>;

    /// Finds or creates the record for the sender of a command.
    ///
    /// Returns [`INVALID_ESI_INDEX`] when the sender cannot be admitted.
    fn update_and_get_index(&mut self, source: &CommandSource) -> u8;

    /// Registers for eviction notices; each evicted index is sent on the channel.
    fn subscribe_to_deletion(&mut self) -> Receiver<u8>;
}

/// Bounded in-memory ESI table with age-based eviction.
#[derive(Debug)]
pub struct EsiTable {
    slots: Vec<Option<EsiEntry>>,
    min_erasing_age: u8,
    subscribers: Vec<Sender<u8>>,
}

impl EsiTable {
    /// Creates a table with `size` slots (clamped to `1..=MAX_ESI_TABLE_SIZE`).
    ///
    /// An entry becomes evictable once `min_erasing_age` newer ESIs have been
    /// admitted after it was last heard from.
    pub fn new(size: usize, min_erasing_age: u8) -> Self {
        Self {
            slots: vec![None; size.clamp(1, MAX_ESI_TABLE_SIZE)],
            min_erasing_age,
            subscribers: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evicts the entry at `index` and notifies deletion subscribers.
    pub fn remove(&mut self, index: u8) -> Option<EsiEntry> {
        let removed = self.slots.get_mut(usize::from(index))?.take()?;
        info!(
            "[esi] evicted index {index} (node 0x{:04x}, eui64 {:016x})",
            removed.node_id, removed.eui64
        );
        self.subscribers.retain(|tx| tx.send(index).is_ok());
        Some(removed)
    }

    fn find(&self, source: &CommandSource) -> Option<usize> {
        self.slots.iter().position(|slot| {
            slot.is_some_and(|e| e.eui64 == source.eui64 && e.endpoint == source.source_endpoint)
        })
    }

    fn oldest_evictable(&self) -> Option<usize> {
        let mut best: Option<(usize, u8)> = None;
        for (i, slot) in self.slots.iter().enumerate() {
            if let Some(e) = slot {
                if e.age >= self.min_erasing_age && best.is_none_or(|(_, age)| e.age > age) {
                    best = Some((i, e.age));
                }
            }
        }
        best.map(|(i, _)| i)
    }
}

impl EsiDirectory for EsiTable {
    fn lookup_by_index(&self, index: u8) -> Option<EsiEntry> {
        self.slots.get(usize::from(index)).copied().flatten()
    }

    fn update_and_get_index(&mut self, source: &CommandSource) -> u8 {
        if let Some(i) = self.find(source) {
            if let Some(e) = self.slots[i].as_mut() {
                e.node_id = source.node_id;
                e.network_index = source.network_index;
                e.age = 0;
            }
            return i as u8;
        }

        for e in self.slots.iter_mut().flatten() {
            e.age = e.age.saturating_add(1);
        }

        let index = match self.slots.iter().position(Option::is_none) {
            Some(i) => i,
            None => match self.oldest_evictable() {
                Some(i) => {
                    self.remove(i as u8);
                    i
                }
                None => {
                    debug!(
                        "[esi] table full, cannot admit node 0x{:04x}",
                        source.node_id
                    );
                    return INVALID_ESI_INDEX;
                }
            },
        };

        self.slots[index] = Some(EsiEntry {
            eui64: source.eui64,
            node_id: source.node_id,
            endpoint: source.source_endpoint,
            network_index: source.network_index,
            age: 0,
        });
        debug!(
            "[esi] admitted node 0x{:04x} at index {index}",
            source.node_id
        );
        index as u8
    }

    fn subscribe_to_deletion(&mut self) -> Receiver<u8> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn same_sender_keeps_its_index() {
        let mut table = EsiTable::new(4, 2);
        let a = table.update_and_get_index(&source(0xA));
        let b = table.update_and_get_index(&source(0xB));
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(table.update_and_get_index(&source(0xA)), 0);
        assert_eq!(table.lookup_by_index(0).map(|e| e.age), Some(0));
        assert_eq!(table.lookup_by_index(1).map(|e| e.age), Some(0));
    }

    #[test]
    fn full_table_without_old_entries_rejects() {
        let mut table = EsiTable::new(2, 5);
        table.update_and_get_index(&source(0xA));
        table.update_and_get_index(&source(0xB));
        assert_eq!(table.update_and_get_index(&source(0xC)), INVALID_ESI_INDEX);
    }

    #[test]
    fn full_table_evicts_oldest_and_notifies() {
        let mut table = EsiTable::new(2, 1);
        let rx = table.subscribe_to_deletion();
        table.update_and_get_index(&source(0xA));
        table.update_and_get_index(&source(0xB));
        // 0xA has age 1, 0xB age 0; admitting 0xC ages them to 2 and 1.
        let index = table.update_and_get_index(&source(0xC));
        assert_eq!(index, 0);
        assert_eq!(rx.try_recv(), Ok(0));
        assert_eq!(table.lookup_by_index(0).map(|e| e.eui64), Some(0xC));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn remove_out_of_range_is_noop() {
        let mut table = EsiTable::new(2, 1);
        assert!(table.remove(7).is_none());
        assert!(table.is_empty());
    }
}
