use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// One stored match, as raw as the engine produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SinkEntry {
    pub packet: u32,
    /// Start offset for Horspool passes, end offset for automaton passes
    pub offset: u32,
    pub pattern: u32,
}

/// Fixed-capacity match buffer shared by every lane of a launch.
///
/// Writers reserve a slot with a single `fetch_add` on the counter and store
/// into it only if the slot lies inside the buffer. The counter keeps going
/// past capacity, so after a launch it holds the number of matches found while
/// the buffer holds the first `capacity` of them in no particular order.
///
/// Stores are relaxed: a launch only returns once every lane has joined,
/// and reads go through `&mut self`.
#[derive(Debug)]
pub struct MatchSink {
    packets: Box<[AtomicU32]>,
    offsets: Box<[AtomicU32]>,
    patterns: Box<[AtomicU32]>,
    count: AtomicU64,
}

fn slots(capacity: usize) -> Box<[AtomicU32]> {
    (0..capacity).map(|_| AtomicU32::new(0)).collect()
}

impl MatchSink {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            packets: slots(capacity),
            offsets: slots(capacity),
            patterns: slots(capacity),
            count: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.packets.len()
    }

    /// Counts a match and stores it if there is room. Returns whether it was
    /// stored.
    #[inline]
    pub fn record(&self, packet: u32, offset: u32, pattern: u32) -> bool {
        let slot = self.count.fetch_add(1, Ordering::Relaxed);
        if slot >= self.capacity() as u64 {
            return false;
        }
        let slot = slot as usize;
        self.packets[slot].store(packet, Ordering::Relaxed);
        self.offsets[slot].store(offset, Ordering::Relaxed);
        self.patterns[slot].store(pattern, Ordering::Relaxed);
        true
    }

    /// Matches counted, stored or not
    pub fn found(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn recorded(&self) -> u64 {
        self.found().min(self.capacity() as u64)
    }

    pub fn overflowed(&self) -> bool {
        self.found() > self.capacity() as u64
    }

    /// Takes the found count and the stored entries, leaving the sink empty
    pub fn drain(&mut self) -> (u64, Vec<SinkEntry>) {
        let found = self.found();
        let entries = (0..self.recorded() as usize)
            .map(|i| SinkEntry {
                packet: *self.packets[i].get_mut(),
                offset: *self.offsets[i].get_mut(),
                pattern: *self.patterns[i].get_mut(),
            })
            .collect();
        self.reset();
        (found, entries)
    }

    pub fn reset(&mut self) {
        *self.count.get_mut() = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_record_and_drain() {
        let mut sink = MatchSink::with_capacity(4);
        assert!(sink.record(0, 10, 1));
        assert!(sink.record(2, 0, 0));
        assert_eq!(sink.found(), 2);
        assert!(!sink.overflowed());

        let (found, entries) = sink.drain();
        assert_eq!(found, 2);
        assert_eq!(
            entries,
            vec![
                SinkEntry { packet: 0, offset: 10, pattern: 1 },
                SinkEntry { packet: 2, offset: 0, pattern: 0 },
            ]
        );
        assert_eq!(sink.found(), 0);
    }

    #[test]
    fn test_overflow_counts_but_does_not_store() {
        let mut sink = MatchSink::with_capacity(2);
        assert!(sink.record(0, 0, 0));
        assert!(sink.record(0, 1, 0));
        assert!(!sink.record(0, 2, 0));
        assert!(!sink.record(0, 3, 0));

        assert!(sink.overflowed());
        assert_eq!(sink.recorded(), 2);
        let (found, entries) = sink.drain();
        assert_eq!(found, 4);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_zero_capacity() {
        let mut sink = MatchSink::with_capacity(0);
        assert!(!sink.record(1, 1, 1));
        let (found, entries) = sink.drain();
        assert_eq!(found, 1);
        assert!(entries.is_empty());
    }

    #[test]
    fn test_concurrent_records_fill_exactly_capacity() {
        let mut sink = MatchSink::with_capacity(500);
        let stored: usize = (0..2000u32)
            .into_par_iter()
            .filter(|&i| sink.record(i, i, 0))
            .count();
        assert_eq!(stored, 500);

        let (found, mut entries) = sink.drain();
        assert_eq!(found, 2000);
        assert_eq!(entries.len(), 500);
        entries.sort();
        entries.dedup();
        assert_eq!(entries.len(), 500);
        assert!(entries.iter().all(|e| e.packet == e.offset));
    }
}
