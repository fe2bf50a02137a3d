//! Bounded relay buffer
//!
//! A time-ordered window of envelopes this node has originated or accepted
//! for forwarding. It serves two purposes: replay to newly connected peers
//! and duplicate suppression for the flooding algorithm. It is a lossy
//! rebroadcast window, not a durable queue: insertion past capacity silently
//! evicts the oldest entries, and delivery never removes anything.

use std::collections::VecDeque;

use crate::envelope::Envelope;
use crate::types::Timestamp;

// ----------------------------------------------------------------------------
// Buffer Entry
// ----------------------------------------------------------------------------

/// One buffered envelope plus the local time this node took ownership of it
#[derive(Debug, Clone)]
pub struct BufferEntry {
    envelope: Envelope,
    received_at: Timestamp,
}

impl BufferEntry {
    /// Get the buffered envelope
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Get the local receipt timestamp
    pub fn received_at(&self) -> Timestamp {
        self.received_at
    }
}

// ----------------------------------------------------------------------------
// Relay Buffer
// ----------------------------------------------------------------------------

/// Bounded FIFO collection of recently seen/originated envelopes.
///
/// Invariant: `len() <= capacity()` after every `append`; survivors are
/// always the most recently appended entries in original relative order.
///
/// The buffer itself is not synchronized. The runtime wraps it in a single
/// mutex so that append, contains, and snapshot are mutually exclusive under
/// concurrent receives.
#[derive(Debug)]
pub struct RelayBuffer {
    entries: VecDeque<BufferEntry>,
    capacity: usize,
}

impl RelayBuffer {
    /// Create a buffer holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an envelope, evicting the oldest entries past capacity, and
    /// return the created entry.
    ///
    /// Always succeeds; eviction is unconditional and raises no event.
    pub fn append(&mut self, envelope: Envelope) -> &BufferEntry {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(BufferEntry {
            envelope,
            received_at: Timestamp::now(),
        });
        // capacity is at least 1, so the entry just pushed survives
        &self.entries[self.entries.len() - 1]
    }

    /// Iterate the buffered entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &BufferEntry> {
        self.entries.iter()
    }

    /// Whether some entry carries a byte-identical payload.
    ///
    /// Used purely for loop prevention in flooding; a linear scan over at
    /// most `capacity` entries.
    pub fn contains(&self, envelope: &Envelope) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.envelope.same_payload(envelope))
    }

    /// Insertion-ordered copy of the buffered envelopes, for replay to a
    /// newly connected peer. Does not mutate receipt order.
    pub fn snapshot(&self) -> Vec<Envelope> {
        self.entries
            .iter()
            .map(|entry| entry.envelope.clone())
            .collect()
    }

    /// Current entry count
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum entry count
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Ttl;

    fn envelope(tag: u8) -> Envelope {
        Envelope::new(vec![tag; 4], Ttl::DEFAULT)
    }

    #[test]
    fn test_append_returns_entry_with_receipt_time() {
        let mut buffer = RelayBuffer::new(4);
        let before = Timestamp::now();
        let entry = buffer.append(envelope(1));

        assert!(entry.received_at() >= before);
        assert_eq!(entry.envelope().payload(), &[1, 1, 1, 1]);
    }

    #[test]
    fn test_append_returns_entry_even_when_full() {
        let mut buffer = RelayBuffer::new(1);
        buffer.append(envelope(1));
        let entry = buffer.append(envelope(2));
        assert_eq!(entry.envelope().payload(), &[2, 2, 2, 2]);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_zero_capacity_clamps_to_one() {
        let mut buffer = RelayBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
        let entry = buffer.append(envelope(3));
        assert_eq!(entry.envelope().payload(), &[3, 3, 3, 3]);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_capacity_bound_holds_after_every_append() {
        let mut buffer = RelayBuffer::new(3);
        for tag in 0..10 {
            buffer.append(envelope(tag));
            assert!(buffer.len() <= 3);
        }
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_eviction_keeps_newest_in_order() {
        // Capacity 2, append a, b, c: snapshot must equal [b, c]
        let mut buffer = RelayBuffer::new(2);
        buffer.append(envelope(b'a'));
        buffer.append(envelope(b'b'));
        buffer.append(envelope(b'c'));

        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].payload(), &[b'b'; 4]);
        assert_eq!(snapshot[1].payload(), &[b'c'; 4]);
    }

    #[test]
    fn test_contains_matches_payload_not_ttl() {
        let mut buffer = RelayBuffer::new(4);
        buffer.append(Envelope::new(vec![7, 7], Ttl::new(9)));

        assert!(buffer.contains(&Envelope::new(vec![7, 7], Ttl::new(3))));
        assert!(!buffer.contains(&Envelope::new(vec![7, 8], Ttl::new(9))));
    }

    #[test]
    fn test_contains_false_after_eviction() {
        let mut buffer = RelayBuffer::new(1);
        buffer.append(envelope(1));
        buffer.append(envelope(2));

        assert!(!buffer.contains(&envelope(1)));
        assert!(buffer.contains(&envelope(2)));
    }

    #[test]
    fn test_snapshot_does_not_mutate() {
        let mut buffer = RelayBuffer::new(4);
        buffer.append(envelope(1));
        buffer.append(envelope(2));

        let first = buffer.snapshot();
        let second = buffer.snapshot();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0], second[0]);
        assert_eq!(buffer.len(), 2);
    }
}
